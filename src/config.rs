use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::storage::series::RetentionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Memory,
    Kafka,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    pub kind: BrokerKind,
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topic: String,
    pub poll_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub url: String,
    pub key_prefix: String,
    pub day_ttl_secs: u64,
    pub week_ttl_secs: u64,
}

impl StoreSettings {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            day_ttl_secs: self.day_ttl_secs,
            week_ttl_secs: self.week_ttl_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub current_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub addr: String,
}

/// Service settings: defaults, then an optional TOML file, then
/// `WEATHER__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub http: HttpSettings,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("WEATHER").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let retention = RetentionPolicy::default();
        Config::builder()
            .set_default("broker.kind", "memory")?
            .set_default("broker.bootstrap_servers", "localhost:9092")?
            .set_default("broker.group_id", "weather-metrics-consumer-group")?
            .set_default("broker.topic", "weather-data")?
            .set_default("broker.poll_timeout_ms", 60_000i64)?
            .set_default("store.kind", "memory")?
            .set_default("store.url", "redis://localhost:6379")?
            .set_default("store.key_prefix", "weather")?
            .set_default("store.day_ttl_secs", retention.day_ttl_secs as i64)?
            .set_default("store.week_ttl_secs", retention.week_ttl_secs as i64)?
            .set_default("cache.current_ttl_secs", 3_600i64)?
            .set_default("http.addr", "127.0.0.1:8080")
    }
}
