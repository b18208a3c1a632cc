use super::{KvBackend, KvError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// In-process KV store mirroring the Redis semantics the server relies on:
/// hash namespaces, per-key TTLs, and counters. Backs the test suite.
#[derive(Clone, Default)]
pub struct MemoryKv {
    hashes: Arc<DashMap<String, HashMap<String, String>>>,
    strings: Arc<DashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }

    async fn hash_exists(&self, set: &str, field: &str) -> Result<bool, KvError> {
        Ok(self
            .hashes
            .get(set)
            .map(|fields| fields.contains_key(field))
            .unwrap_or(false))
    }

    async fn hash_get(&self, set: &str, field: &str) -> Result<Option<String>, KvError> {
        Ok(self
            .hashes
            .get(set)
            .and_then(|fields| fields.get(field).cloned()))
    }

    async fn hash_set(&self, set: &str, field: &str, value: &str) -> Result<(), KvError> {
        self.hashes
            .entry(set.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_if_absent(
        &self,
        set: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        let mut fields = self.hashes.entry(set.to_string()).or_default();
        if fields.contains_key(field) {
            return Ok(false);
        }
        fields.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get_all(&self, set: &str) -> Result<Vec<(String, String)>, KvError> {
        Ok(self
            .hashes
            .get(set)
            .map(|fields| {
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn hash_delete(&self, set: &str, field: &str) -> Result<bool, KvError> {
        Ok(self
            .hashes
            .get_mut(set)
            .map(|mut fields| fields.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let live_value = match self.strings.get(key) {
            Some(entry) if entry.live() => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if live_value.is_none() {
            self.strings.remove(key);
        }
        Ok(live_value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        self.strings.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError> {
        let fresh = Entry {
            value: value.to_string(),
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
        };
        match self.strings.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) if occupied.get().live() => Ok(false),
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                occupied.insert(fresh);
                Ok(true)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut entry = self.strings.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if !entry.live() {
            entry.value = "0".to_string();
            entry.expires_at = None;
        }
        let count = entry
            .value
            .parse::<i64>()
            .map_err(|_| KvError::NotAnInteger)?
            + 1;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.strings.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_operations() {
        let kv = MemoryKv::new();

        assert!(!kv.hash_exists("set", "a").await.unwrap());
        assert!(kv.hash_set_if_absent("set", "a", "1").await.unwrap());
        assert!(!kv.hash_set_if_absent("set", "a", "2").await.unwrap());
        assert_eq!(kv.hash_get("set", "a").await.unwrap().as_deref(), Some("1"));

        kv.hash_set("set", "b", "2").await.unwrap();
        let mut all = kv.hash_get_all("set").await.unwrap();
        all.sort();
        assert_eq!(
            all,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );

        assert!(kv.hash_delete("set", "a").await.unwrap());
        assert!(!kv.hash_delete("set", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_counter_and_ttl() {
        let kv = MemoryKv::new();

        kv.set_ex("hits", "1", 60).await.unwrap();
        assert_eq!(kv.incr("hits").await.unwrap(), 2);
        assert_eq!(kv.incr("hits").await.unwrap(), 3);
        assert_eq!(kv.get("hits").await.unwrap().as_deref(), Some("3"));

        kv.set_ex("gone", "1", 0).await.unwrap();
        assert_eq!(kv.get("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_nx_ex() {
        let kv = MemoryKv::new();

        assert!(kv.set_nx_ex("lock", "1", 60).await.unwrap());
        assert!(!kv.set_nx_ex("lock", "1", 60).await.unwrap());

        kv.delete("lock").await.unwrap();
        assert!(kv.set_nx_ex("lock", "1", 60).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_on_missing_key() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("fresh").await.unwrap(), 1);
        assert_eq!(kv.incr("fresh").await.unwrap(), 2);
    }
}
