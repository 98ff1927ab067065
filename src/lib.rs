use std::sync::Arc;
use tracing::{error, info};

pub mod api;
pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;

use broker::{Broker, MemoryBroker};
use clock::{SystemClock, TimeSource};
use crate::config::{BrokerKind, Settings, StoreKind};
use ingest::{IngestPipeline, IngestionConsumer};
use metrics::Metrics;
use query::AggregationQueryEngine;
use storage::{CurrentValueStore, KeyValueBackend, MemoryBackend, WindowedSeriesStore};

/// Shared state handed to the HTTP layer.
pub struct AppState {
    pub engine: Arc<AggregationQueryEngine>,
    pub metrics: Arc<Metrics>,
    /// Set when the in-process broker is in use, so readings can be posted.
    pub publisher: Option<MemoryBroker>,
    pub topic: String,
}

/// Everything `run_server` wires together, minus the listener.
pub struct Service {
    pub state: Arc<AppState>,
    pub consumer: IngestionConsumer,
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> anyhow::Result<Arc<dyn KeyValueBackend>> {
    let backend = storage::RedisBackend::connect(url).await?;
    info!(url, "connected to redis");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> anyhow::Result<Arc<dyn KeyValueBackend>> {
    anyhow::bail!("store.kind = \"redis\" requires building with the `redis` feature")
}

#[cfg(feature = "kafka")]
fn kafka_broker(settings: &crate::config::BrokerSettings) -> anyhow::Result<Arc<dyn Broker>> {
    Ok(Arc::new(broker::KafkaBroker::new(
        settings.bootstrap_servers.clone(),
        settings.group_id.clone(),
    )))
}

#[cfg(not(feature = "kafka"))]
fn kafka_broker(_settings: &crate::config::BrokerSettings) -> anyhow::Result<Arc<dyn Broker>> {
    anyhow::bail!("broker.kind = \"kafka\" requires building with the `kafka` feature")
}

pub async fn build_service(settings: &Settings, clock: Arc<dyn TimeSource>) -> anyhow::Result<Service> {
    let backend: Arc<dyn KeyValueBackend> = match settings.store.kind {
        StoreKind::Memory => Arc::new(MemoryBackend::new(clock.clone())),
        StoreKind::Redis => connect_redis(&settings.store.url).await?,
    };

    let (broker, publisher): (Arc<dyn Broker>, Option<MemoryBroker>) = match settings.broker.kind {
        BrokerKind::Memory => {
            let memory = MemoryBroker::new();
            (Arc::new(memory.clone()) as Arc<dyn Broker>, Some(memory))
        }
        BrokerKind::Kafka => (kafka_broker(&settings.broker)?, None),
    };

    let prefix = settings.store.key_prefix.as_str();
    let current = Arc::new(CurrentValueStore::new(backend.clone(), prefix));
    let series = Arc::new(WindowedSeriesStore::new(backend, prefix, settings.store.retention()));
    let metrics = Arc::new(Metrics::default());

    let pipeline = Arc::new(IngestPipeline {
        current: current.clone(),
        series: series.clone(),
        clock: clock.clone(),
        metrics: metrics.clone(),
    });
    let consumer = IngestionConsumer::new(
        broker,
        pipeline,
        settings.broker.topic.clone(),
        settings.broker.poll_timeout(),
    );

    let engine = AggregationQueryEngine::new(current, series, clock)
        .with_current_cache(settings.cache.current_ttl_secs);

    Ok(Service {
        state: Arc::new(AppState {
            engine: Arc::new(engine),
            metrics,
            publisher,
            topic: settings.broker.topic.clone(),
        }),
        consumer,
    })
}

pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let service = build_service(&settings, Arc::new(SystemClock)).await?;
    service.consumer.start().await?;

    // broadcast channel for shutdown signaling
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let mut http = tokio::spawn(api::http::run(
        service.state.clone(),
        settings.http.addr.clone(),
        shutdown_tx.subscribe(),
    ));

    let served = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(());
            (&mut http).await
        }
        finished = &mut http => finished,
    };

    service.consumer.stop().await?;
    match served {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "http server failed");
            Err(e)
        }
        Err(e) => Err(e.into()),
    }
}
