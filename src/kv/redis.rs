use super::{KvBackend, KvError};
use async_trait::async_trait;
use log::error;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

/// Redis-backed KV store. The connection manager multiplexes a single
/// reconnecting connection; cloning it per operation is cheap and is the
/// intended usage pattern.
#[derive(Clone)]
pub struct RedisKv {
    conn_manager: ConnectionManager,
}

impl RedisKv {
    /// Connect to the Redis server at `url` and verify the connection.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = Client::open(url)?;
        let conn_manager = ConnectionManager::new(client).await?;

        let kv = Self { conn_manager };
        kv.ping().await?;
        Ok(kv)
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|err| {
                error!("Redis ping failed: {err}");
                KvError::from(err)
            })?;
        Ok(())
    }

    async fn hash_exists(&self, set: &str, field: &str) -> Result<bool, KvError> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.hexists(set, field).await?)
    }

    async fn hash_get(&self, set: &str, field: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.hget(set, field).await?)
    }

    async fn hash_set(&self, set: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn_manager.clone();
        conn.hset::<_, _, _, ()>(set, field, value)
            .await
            .map_err(|err| {
                error!("Redis error while writing {set}/{field}: {err}");
                KvError::from(err)
            })
    }

    async fn hash_set_if_absent(
        &self,
        set: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, KvError> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.hset_nx(set, field, value).await?)
    }

    async fn hash_get_all(&self, set: &str) -> Result<Vec<(String, String)>, KvError> {
        let mut conn = self.conn_manager.clone();
        let fields: std::collections::HashMap<String, String> = conn.hgetall(set).await?;
        Ok(fields.into_iter().collect())
    }

    async fn hash_delete(&self, set: &str, field: &str) -> Result<bool, KvError> {
        let mut conn = self.conn_manager.clone();
        let removed: i64 = conn.hdel(set, field).await?;
        Ok(removed > 0)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), KvError> {
        let mut conn = self.conn_manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|err| {
                error!("Redis error while setting key {key}: {err}");
                KvError::from(err)
            })
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, KvError> {
        let mut conn = self.conn_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.incr(key, 1i64).await?)
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(key).await.map_err(|err| {
            error!("Redis error while deleting key {key}: {err}");
            KvError::from(err)
        })
    }
}
