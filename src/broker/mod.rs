//! Message-broker seam for the ingestion consumer.
//!
//! A [`Broker`] hands out [`Subscription`]s to a topic. Polling is bounded by
//! a timeout and can be abandoned at any point: dropping the future returned
//! by [`Subscription::poll`] is how a pending poll is woken at shutdown.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{BackendError, LifecycleError};

pub mod memory;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use memory::MemoryBroker;
#[cfg(feature = "kafka")]
pub use kafka::KafkaBroker;

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Joins the consumer group on `topic`. Offsets auto-commit and a new
    /// group starts from the earliest message.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, LifecycleError>;
}

#[async_trait]
pub trait Subscription: Send + 'static {
    /// Waits up to `timeout` for messages; an empty batch means none arrived.
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<String>, BackendError>;

    async fn close(self: Box<Self>) -> Result<(), LifecycleError>;
}
