use async_trait::async_trait;
use std::collections::HashMap;

use ::redis::aio::ConnectionManager;
use ::redis::{cmd, Client};

use super::KeyValueBackend;
use crate::error::{BackendError, LifecycleError};

/// Redis-backed store. Every call is a single Redis command, so per-key
/// atomicity comes from the server.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self, LifecycleError> {
        let connect_err = |e: ::redis::RedisError| LifecycleError::Connect {
            endpoint: redis_url.to_string(),
            message: e.to_string(),
        };
        let client = Client::open(redis_url).map_err(connect_err)?;
        let conn = ConnectionManager::new(client).await.map_err(connect_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BackendError::store("hset", key, e))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BackendError> {
        let mut conn = self.conn.clone();
        cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::store("hgetall", key, e))
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BackendError::store("zadd", key, e))
    }

    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn.clone();
        cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::store("zrangebyscore", key, e))
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, BackendError> {
        let mut conn = self.conn.clone();
        cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::store("zremrangebyscore", key, e))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
        let mut conn = self.conn.clone();
        cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::store("keys", pattern, e))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), BackendError> {
        let mut conn = self.conn.clone();
        cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BackendError::store("expire", key, e))
    }
}
