use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use super::series::{decode_temperature, encode_temperature};
use super::KeyValueBackend;
use crate::error::BackendError;

/// Latest temperature per location, kept in one hash with no expiry.
pub struct CurrentValueStore {
    backend: Arc<dyn KeyValueBackend>,
    key: String,
}

impl CurrentValueStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>, prefix: &str) -> Self {
        Self {
            backend,
            key: format!("{}:currentTemp", prefix),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn set(&self, location: &str, temperature: f64) -> Result<(), BackendError> {
        self.backend
            .hset(&self.key, location, &encode_temperature(temperature))
            .await
    }

    /// Snapshot of every location. Unparseable entries are logged and left out.
    pub async fn get_all(&self) -> Result<BTreeMap<String, f64>, BackendError> {
        let raw = self.backend.hgetall(&self.key).await?;
        let mut out = BTreeMap::new();
        for (location, value) in raw {
            match decode_temperature(&self.key, value) {
                Ok(t) => {
                    out.insert(location, t);
                }
                Err(e) => warn!(location = %location, error = %e, "skipping current value"),
            }
        }
        Ok(out)
    }
}
