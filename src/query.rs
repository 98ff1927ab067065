use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::clock::TimeSource;
use crate::error::BackendError;
use crate::model::WindowKind;
use crate::storage::{CurrentValueStore, WindowedSeriesStore};

/// Averages per group key plus the extremes over every contributing reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub averages: BTreeMap<String, f64>,
    /// `None` when no location had readings in the period.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Caller-visible name for a composite key: everything after the first `:`.
///
/// `weather:temps:lastDay:Paris` becomes `temps:lastDay:Paris`.
pub fn group_key(key: &str) -> &str {
    match key.split_once(':') {
        Some((_, rest)) => rest,
        None => key,
    }
}

struct CachedSnapshot {
    taken_at: i64,
    temperatures: BTreeMap<String, f64>,
}

/// Read side: current values and windowed aggregates.
///
/// Safe to share between request handlers and to run alongside ingestion;
/// the only state of its own is the memoized current snapshot.
pub struct AggregationQueryEngine {
    current: Arc<CurrentValueStore>,
    series: Arc<WindowedSeriesStore>,
    clock: Arc<dyn TimeSource>,
    current_ttl_millis: i64,
    cached_current: Mutex<Option<CachedSnapshot>>,
}

impl AggregationQueryEngine {
    pub fn new(
        current: Arc<CurrentValueStore>,
        series: Arc<WindowedSeriesStore>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            current,
            series,
            clock,
            current_ttl_millis: 0,
            cached_current: Mutex::new(None),
        }
    }

    /// Memoize [`current_temperatures`](Self::current_temperatures) for `ttl_secs`; 0 disables.
    pub fn with_current_cache(mut self, ttl_secs: u64) -> Self {
        self.current_ttl_millis = i64::try_from(ttl_secs).unwrap_or(i64::MAX).saturating_mul(1000);
        self
    }

    pub async fn current_temperatures(&self) -> Result<BTreeMap<String, f64>, BackendError> {
        if self.current_ttl_millis <= 0 {
            return self.current.get_all().await;
        }

        let now = self.clock.now_millis();
        let mut cached = self.cached_current.lock().await;
        if let Some(snapshot) = cached.as_ref() {
            if now - snapshot.taken_at < self.current_ttl_millis {
                return Ok(snapshot.temperatures.clone());
            }
        }
        let temperatures = self.current.get_all().await?;
        *cached = Some(CachedSnapshot {
            taken_at: now,
            temperatures: temperatures.clone(),
        });
        Ok(temperatures)
    }

    /// Mean temperature per group key over `[now - period, now]`.
    ///
    /// Keys without readings in range are omitted; a key whose read fails is
    /// logged and skipped.
    pub async fn average_for_period(&self, kind: WindowKind) -> BTreeMap<String, f64> {
        self.collect_period(kind)
            .await
            .into_iter()
            .map(|(group, values)| (group, mean(&values)))
            .collect()
    }

    /// Like [`average_for_period`](Self::average_for_period), plus the minimum
    /// and maximum across all locations' readings.
    pub async fn summary_for_period(&self, kind: WindowKind) -> PeriodSummary {
        let per_key = self.collect_period(kind).await;
        let all = per_key.values().flatten().copied();
        let min = all.clone().reduce(f64::min);
        let max = all.reduce(f64::max);
        let averages = per_key
            .iter()
            .map(|(group, values)| (group.clone(), mean(values)))
            .collect();
        PeriodSummary { averages, min, max }
    }

    // group key -> readings in range, non-empty only
    async fn collect_period(&self, kind: WindowKind) -> BTreeMap<String, Vec<f64>> {
        let now = self.clock.now_millis();
        let from = now - kind.period_millis();
        let mut out = BTreeMap::new();

        let keys = match self.series.list_keys(kind).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(window = %kind, error = %e, "failed to list series keys");
                return out;
            }
        };

        for key in keys {
            let Some(location) = self.series.location_of(kind, &key) else {
                warn!(key = %key, "ignoring key outside the window namespace");
                continue;
            };
            match self.series.query_range(kind, location, from, now).await {
                Ok(values) if values.is_empty() => {}
                Ok(values) => {
                    out.insert(group_key(&key).to_string(), values);
                }
                Err(e) => warn!(key = %key, error = %e, "skipping series"),
            }
        }
        out
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
