use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

/// Errors that can occur during KV operations
#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(String),
    #[error("value is not an integer")]
    NotAnInteger,
}

impl From<::redis::RedisError> for KvError {
    fn from(err: ::redis::RedisError) -> Self {
        KvError::Redis(err.to_string())
    }
}

/// The narrow, flow-agnostic surface the stores and the rate limiter need
/// from the key-value server: hash maps for token/grant namespaces, plus
/// flat TTL-backed keys for rate counters and locks.
///
/// Implementations must be thread-safe and cheap to clone so they can be
/// shared across request handlers and the housekeeping task.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Round-trip check used at startup; failure there is fatal.
    async fn ping(&self) -> Result<(), KvError>;

    async fn hash_exists(&self, set: &str, field: &str) -> Result<bool, KvError>;

    async fn hash_get(&self, set: &str, field: &str) -> Result<Option<String>, KvError>;

    async fn hash_set(&self, set: &str, field: &str, value: &str) -> Result<(), KvError>;

    /// Insert only if the field is absent. Returns whether the write happened.
    async fn hash_set_if_absent(
        &self,
        set: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, KvError>;

    async fn hash_get_all(&self, set: &str) -> Result<Vec<(String, String)>, KvError>;

    /// Delete a field. Returns whether the field was present; the caller can
    /// use the answer to decide a race between two deleters.
    async fn hash_delete(&self, set: &str, field: &str) -> Result<bool, KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError>;

    /// SET NX EX: set only if the key is absent, with a TTL. Returns whether
    /// the key was set. Used for short-lived refresh locks.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError>;

    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// KV handle with a uniform interface regardless of backend.
///
/// The Redis variant is what production runs against; the in-memory variant
/// backs the test suite so it needs no external server.
#[derive(Clone)]
pub enum Kv {
    Redis(redis::RedisKv),
    Memory(memory::MemoryKv),
}

impl Kv {
    /// Connect to a Redis server and verify the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        Ok(Kv::Redis(redis::RedisKv::connect(url).await?))
    }

    /// A process-local backend for tests.
    pub fn in_memory() -> Self {
        Kv::Memory(memory::MemoryKv::new())
    }
}

macro_rules! dispatch {
    ($self:ident, $kv:ident => $call:expr) => {
        match $self {
            Kv::Redis($kv) => $call,
            Kv::Memory($kv) => $call,
        }
    };
}

#[async_trait]
impl KvBackend for Kv {
    async fn ping(&self) -> Result<(), KvError> {
        dispatch!(self, kv => kv.ping().await)
    }

    async fn hash_exists(&self, set: &str, field: &str) -> Result<bool, KvError> {
        dispatch!(self, kv => kv.hash_exists(set, field).await)
    }

    async fn hash_get(&self, set: &str, field: &str) -> Result<Option<String>, KvError> {
        dispatch!(self, kv => kv.hash_get(set, field).await)
    }

    async fn hash_set(&self, set: &str, field: &str, value: &str) -> Result<(), KvError> {
        dispatch!(self, kv => kv.hash_set(set, field, value).await)
    }

    async fn hash_set_if_absent(
        &self,
        set: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        dispatch!(self, kv => kv.hash_set_if_absent(set, field, value).await)
    }

    async fn hash_get_all(&self, set: &str) -> Result<Vec<(String, String)>, KvError> {
        dispatch!(self, kv => kv.hash_get_all(set).await)
    }

    async fn hash_delete(&self, set: &str, field: &str) -> Result<bool, KvError> {
        dispatch!(self, kv => kv.hash_delete(set, field).await)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        dispatch!(self, kv => kv.get(key).await)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        dispatch!(self, kv => kv.set_ex(key, value, ttl_secs).await)
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError> {
        dispatch!(self, kv => kv.set_nx_ex(key, value, ttl_secs).await)
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        dispatch!(self, kv => kv.incr(key).await)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        dispatch!(self, kv => kv.delete(key).await)
    }
}
