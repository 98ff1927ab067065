use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::IngestPipeline;
use crate::broker::{Broker, Subscription};
use crate::error::LifecycleError;

// pause after a failed poll so a broken broker does not spin the worker
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(1);

struct Worker {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<Box<dyn Subscription>>,
}

/// Owns the topic subscription and the single background worker that feeds
/// messages to the [`IngestPipeline`].
///
/// `start` and `stop` may be called repeatedly; each `start` opens a fresh
/// subscription and each `stop` waits for the worker before closing it.
pub struct IngestionConsumer {
    broker: Arc<dyn Broker>,
    pipeline: Arc<IngestPipeline>,
    topic: String,
    poll_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl IngestionConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        pipeline: Arc<IngestPipeline>,
        topic: impl Into<String>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            pipeline,
            topic: topic.into(),
            poll_timeout,
            worker: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }

    pub async fn start(&self) -> Result<(), LifecycleError> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Err(LifecycleError::AlreadyRunning);
        }

        let subscription = self.broker.subscribe(&self.topic).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = tokio::spawn(run_loop(
            subscription,
            self.pipeline.clone(),
            self.poll_timeout,
            shutdown_rx,
        ));

        info!(topic = %self.topic, poll_timeout = ?self.poll_timeout, "ingestion consumer started");
        *worker = Some(Worker { shutdown: shutdown_tx, handle });
        Ok(())
    }

    /// Signals the worker, waits for it to exit, then releases the
    /// subscription. A no-op when not running.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let Some(Worker { shutdown, handle }) = self.worker.lock().await.take() else {
            return Ok(());
        };

        let _ = shutdown.send(());
        let subscription = handle
            .await
            .map_err(|e| LifecycleError::WorkerPanicked(e.to_string()))?;
        subscription.close().await?;

        info!(topic = %self.topic, "ingestion consumer stopped");
        Ok(())
    }
}

async fn run_loop(
    mut subscription: Box<dyn Subscription>,
    pipeline: Arc<IngestPipeline>,
    poll_timeout: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Box<dyn Subscription> {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            polled = subscription.poll(poll_timeout) => match polled {
                Ok(batch) => {
                    for raw in &batch {
                        pipeline.process(raw).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "poll failed");
                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(POLL_ERROR_PAUSE) => {}
                    }
                }
            },
        }
    }
    subscription
}
