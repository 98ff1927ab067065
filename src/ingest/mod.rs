pub mod parser;
pub mod consumer;

pub use consumer::IngestionConsumer;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::TimeSource;
use crate::metrics::Metrics;
use crate::storage::{CurrentValueStore, WindowedSeriesStore};

/// Turns one raw message into writes against both stores.
pub struct IngestPipeline {
    pub current: Arc<CurrentValueStore>,
    pub series: Arc<WindowedSeriesStore>,
    pub clock: Arc<dyn TimeSource>,
    pub metrics: Arc<Metrics>,
}

impl IngestPipeline {
    /// Never fails: a bad message or a failed write is logged and counted.
    /// Each store write is attempted independently.
    pub async fn process(&self, raw: &str) {
        Metrics::incr(&self.metrics.messages_received);
        let reading = match parser::parse(raw, self.clock.now_millis()) {
            Ok(reading) => reading,
            Err(e) => {
                Metrics::incr(&self.metrics.parse_failures);
                warn!(error = %e, "skipping unparseable message");
                return;
            }
        };

        let mut stored = true;
        if let Err(e) = self.current.set(&reading.location, reading.temperature).await {
            stored = false;
            Metrics::incr(&self.metrics.store_failures);
            warn!(location = %reading.location, error = %e, "failed to store current temperature");
        }
        if let Err(e) = self
            .series
            .record(&reading.location, reading.temperature, reading.timestamp)
            .await
        {
            stored = false;
            Metrics::incr(&self.metrics.store_failures);
            warn!(location = %reading.location, error = %e, "failed to record windowed reading");
        }

        if stored {
            Metrics::incr(&self.metrics.readings_stored);
            debug!(location = %reading.location, temperature = reading.temperature, "reading stored");
        }
    }
}
