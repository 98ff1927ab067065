use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::KeyValueBackend;
use crate::error::BackendError;
use crate::model::{WindowKind, ONE_WEEK_MILLIS};

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Whole-key TTL applied to each window's series after every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub day_ttl_secs: u64,
    pub week_ttl_secs: u64,
}

impl RetentionPolicy {
    pub fn ttl_secs(&self, kind: WindowKind) -> u64 {
        match kind {
            WindowKind::Day => self.day_ttl_secs,
            WindowKind::Week => self.week_ttl_secs,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            day_ttl_secs: SECONDS_PER_DAY,
            week_ttl_secs: 8 * SECONDS_PER_DAY,
        }
    }
}

/// Per-location temperature history kept in sorted sets scored by timestamp.
///
/// Keys look like `<prefix>:temps:<lastDay|lastWeek>:<location>`. The member of
/// each entry is the temperature string itself, so two readings with the same
/// value collapse into one entry carrying the latest timestamp.
pub struct WindowedSeriesStore {
    backend: Arc<dyn KeyValueBackend>,
    prefix: String,
    retention: RetentionPolicy,
}

impl WindowedSeriesStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>, prefix: impl Into<String>, retention: RetentionPolicy) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            retention,
        }
    }

    /// `<prefix>:temps:<window>`, shared by every key of that window.
    pub fn window_prefix(&self, kind: WindowKind) -> String {
        format!("{}:temps:{}", self.prefix, kind.token())
    }

    pub fn key(&self, kind: WindowKind, location: &str) -> String {
        format!("{}:{}", self.window_prefix(kind), location)
    }

    /// Location part of a composite key of the given window.
    pub fn location_of<'k>(&self, kind: WindowKind, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(&self.window_prefix(kind))?.strip_prefix(':')
    }

    /// Appends the reading to both windows, prunes both with the one-week
    /// threshold and refreshes each key's TTL.
    ///
    /// A failing step is logged and skipped; the remaining steps still run so
    /// that every written key gets its TTL. The first failure is returned.
    pub async fn record(&self, location: &str, temperature: f64, timestamp: i64) -> Result<(), BackendError> {
        let member = encode_temperature(temperature);
        let keys: Vec<(WindowKind, String)> = WindowKind::ALL
            .iter()
            .map(|kind| (*kind, self.key(*kind, location)))
            .collect();
        let mut first_error: Option<BackendError> = None;

        for (_, key) in &keys {
            if let Err(e) = self.backend.zadd(key, timestamp, &member).await {
                warn!(key = %key, error = %e, "append failed");
                first_error.get_or_insert(e);
            }
        }

        // The day series is pruned with the week threshold too.
        let threshold = timestamp - ONE_WEEK_MILLIS;
        for (_, key) in &keys {
            match self.backend.zrem_range_by_score(key, 0, threshold).await {
                Ok(0) => {}
                Ok(removed) => debug!(key = %key, removed, "pruned expired readings"),
                Err(e) => {
                    warn!(key = %key, error = %e, "prune failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        for (kind, key) in &keys {
            if let Err(e) = self.backend.expire(key, self.retention.ttl_secs(*kind)).await {
                warn!(key = %key, error = %e, "setting ttl failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Temperatures with `from_millis <= timestamp <= to_millis`, oldest first.
    pub async fn query_range(
        &self,
        kind: WindowKind,
        location: &str,
        from_millis: i64,
        to_millis: i64,
    ) -> Result<Vec<f64>, BackendError> {
        let key = self.key(kind, location);
        let members = self.backend.zrange_by_score(&key, from_millis, to_millis).await?;
        members
            .into_iter()
            .map(|member| decode_temperature(&key, member))
            .collect()
    }

    /// Every composite key currently present for the window.
    pub async fn list_keys(&self, kind: WindowKind) -> Result<BTreeSet<String>, BackendError> {
        let pattern = format!("{}:*", self.window_prefix(kind));
        Ok(self.backend.keys(&pattern).await?.into_iter().collect())
    }
}

/// Renders a temperature the way the JVM's `Double.toString` does (`10.0`,
/// `-4.5`, `1.0E-4`, `Infinity`), so members written by either service dedup.
pub(crate) fn encode_temperature(temperature: f64) -> String {
    if temperature.is_infinite() {
        return if temperature > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = temperature.abs();
    if temperature.is_nan() || magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        // Debug keeps the trailing `.0` on integral values
        return format!("{:?}", temperature);
    }
    let scientific = format!("{:e}", temperature);
    match scientific.split_once('e') {
        Some((mantissa, exponent)) if mantissa.contains('.') => format!("{}E{}", mantissa, exponent),
        Some((mantissa, exponent)) => format!("{}.0E{}", mantissa, exponent),
        None => scientific,
    }
}

pub(crate) fn decode_temperature(key: &str, value: String) -> Result<f64, BackendError> {
    match value.parse::<f64>() {
        Ok(t) => Ok(t),
        Err(_) => Err(BackendError::Corrupt { key: key.to_string(), value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ONE_DAY_MILLIS;
    use crate::storage::MemoryBackend;

    const NOW: i64 = 1_600_000_000_000;

    fn store() -> (Arc<ManualClock>, Arc<MemoryBackend>, WindowedSeriesStore) {
        let clock = Arc::new(ManualClock::new(NOW));
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        let store = WindowedSeriesStore::new(backend.clone(), "weather", RetentionPolicy::default());
        (clock, backend, store)
    }

    #[test]
    fn key_layout() {
        let (_, _, store) = store();
        assert_eq!(store.key(WindowKind::Day, "Paris"), "weather:temps:lastDay:Paris");
        assert_eq!(store.key(WindowKind::Week, "Paris"), "weather:temps:lastWeek:Paris");
        assert_eq!(
            store.location_of(WindowKind::Day, "weather:temps:lastDay:Saint:Denis"),
            Some("Saint:Denis")
        );
        assert_eq!(store.location_of(WindowKind::Week, "weather:temps:lastDay:Paris"), None);
    }

    #[tokio::test]
    async fn recorded_value_is_visible_in_both_windows() {
        let (_, _, store) = store();
        store.record("Paris", 22.5, NOW).await.unwrap();

        for kind in WindowKind::ALL {
            let values = store.query_range(kind, "Paris", NOW - 1, NOW + 1).await.unwrap();
            assert_eq!(values, vec![22.5]);
        }
    }

    #[tokio::test]
    async fn same_value_collapses_to_latest_timestamp() {
        let (_, backend, store) = store();
        store.record("Paris", 10.0, NOW - 2 * 3_600_000).await.unwrap();
        store.record("Paris", 10.0, NOW).await.unwrap();

        let values = store.query_range(WindowKind::Day, "Paris", 0, NOW).await.unwrap();
        assert_eq!(values, vec![10.0]);
        // the only entry now carries the later score
        let early = backend
            .zrange_by_score("weather:temps:lastDay:Paris", 0, NOW - 1)
            .await
            .unwrap();
        assert!(early.is_empty());
    }

    #[tokio::test]
    async fn both_windows_pruned_with_week_threshold() {
        let (_, _, store) = store();
        let old = NOW - ONE_WEEK_MILLIS;
        let recent = NOW - 2 * ONE_DAY_MILLIS;
        store.record("Oslo", 1.0, old).await.unwrap();
        store.record("Oslo", 2.0, recent).await.unwrap();
        store.record("Oslo", 3.0, NOW).await.unwrap();

        for kind in WindowKind::ALL {
            let values = store.query_range(kind, "Oslo", 0, NOW).await.unwrap();
            // the two-day-old reading survives even in the day series
            assert_eq!(values, vec![2.0, 3.0], "window {kind}");
        }
    }

    #[tokio::test]
    async fn keys_expire_after_retention() {
        let (clock, _, store) = store();
        store.record("Rome", 20.0, NOW).await.unwrap();
        assert_eq!(store.list_keys(WindowKind::Day).await.unwrap().len(), 1);

        clock.advance(SECONDS_PER_DAY as i64 * 1000);
        assert!(store.list_keys(WindowKind::Day).await.unwrap().is_empty());
        assert_eq!(
            store.list_keys(WindowKind::Week).await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["weather:temps:lastWeek:Rome".to_string()]
        );
    }

    #[test]
    fn temperatures_use_jvm_double_text() {
        assert_eq!(encode_temperature(10.0), "10.0");
        assert_eq!(encode_temperature(-4.5), "-4.5");
        assert_eq!(encode_temperature(0.0), "0.0");
        assert_eq!(encode_temperature(0.001), "0.001");
        assert_eq!(encode_temperature(0.0005), "5.0E-4");
        assert_eq!(encode_temperature(1.25e-5), "1.25E-5");
        assert_eq!(encode_temperature(1e21), "1.0E21");
        assert_eq!(encode_temperature(12_345_678.0), "1.2345678E7");
        assert_eq!(encode_temperature(f64::NEG_INFINITY), "-Infinity");

        for t in [10.0, -4.5, 0.0005, 1e21, f64::INFINITY] {
            assert_eq!(decode_temperature("k", encode_temperature(t)).unwrap(), t);
        }
    }

    struct WeekAppendFails {
        inner: Arc<MemoryBackend>,
    }

    #[async_trait::async_trait]
    impl KeyValueBackend for WeekAppendFails {
        async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), BackendError> {
            self.inner.hset(key, field, value).await
        }
        async fn hgetall(&self, key: &str) -> Result<std::collections::HashMap<String, String>, BackendError> {
            self.inner.hgetall(key).await
        }
        async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<(), BackendError> {
            if key.contains(":lastWeek:") {
                return Err(BackendError::store("zadd", key, "connection reset"));
            }
            self.inner.zadd(key, score, member).await
        }
        async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, BackendError> {
            self.inner.zrange_by_score(key, min, max).await
        }
        async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64, BackendError> {
            self.inner.zrem_range_by_score(key, min, max).await
        }
        async fn keys(&self, pattern: &str) -> Result<Vec<String>, BackendError> {
            self.inner.keys(pattern).await
        }
        async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), BackendError> {
            self.inner.expire(key, ttl_secs).await
        }
    }

    #[tokio::test]
    async fn partial_failure_still_sets_ttl_on_written_keys() {
        let clock = Arc::new(ManualClock::new(NOW));
        let inner = Arc::new(MemoryBackend::new(clock.clone()));
        let backend = Arc::new(WeekAppendFails { inner: inner.clone() });
        let store = WindowedSeriesStore::new(backend, "weather", RetentionPolicy::default());

        let err = store.record("Ghost", 5.0, NOW).await.unwrap_err();
        assert!(matches!(err, BackendError::Store { .. }));
        // the day append went through
        assert_eq!(store.query_range(WindowKind::Day, "Ghost", 0, NOW).await.unwrap(), vec![5.0]);

        clock.advance(30 * ONE_DAY_MILLIS);
        assert!(inner.keys("weather:temps:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_member_is_reported() {
        let (_, backend, store) = store();
        backend.zadd("weather:temps:lastDay:Bad", NOW, "warm").await.unwrap();
        let err = store.query_range(WindowKind::Day, "Bad", 0, NOW).await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { .. }));
    }
}
