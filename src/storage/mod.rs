use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::BackendError;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod series;
pub mod current;

pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;
pub use series::WindowedSeriesStore;
pub use current::CurrentValueStore;

/// The subset of a Redis-like key-value service the stores rely on.
///
/// Implementations must make each call atomic per key; the stores take no
/// locks of their own.
#[async_trait]
pub trait KeyValueBackend: Send + Sync + 'static {
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BackendError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, BackendError>;

    /// Adds `member` with `score`, overwriting the score if the member exists.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), BackendError>;

    /// Members with `min <= score <= max`, ascending by score.
    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, BackendError>;

    /// Removes members with `min <= score <= max` and returns how many went.
    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, BackendError>;

    /// Keys matching a glob pattern (`*` and `?`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError>;

    /// Sets a whole-key time-to-live.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), BackendError>;
}
