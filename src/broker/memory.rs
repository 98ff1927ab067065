use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{Broker, Subscription};
use crate::error::{BackendError, LifecycleError};

/// Largest batch a single poll hands back.
pub const MAX_POLL_RECORDS: usize = 500;

#[derive(Default)]
struct Inner {
    // per-topic backlog not yet delivered to the (single) consumer group
    topics: Mutex<HashMap<String, Vec<String>>>,
    notify: Notify,
}

impl Inner {
    async fn take_batch(&self, topic: &str) -> Vec<String> {
        let mut topics = self.topics.lock().await;
        let backlog = topics.entry(topic.to_string()).or_default();
        let n = backlog.len().min(MAX_POLL_RECORDS);
        backlog.drain(..n).collect()
    }
}

/// In-process broker with one consumer group per broker.
///
/// Delivery commits immediately, so a message handed to a poll is never seen
/// again even if processing fails. A fresh subscription starts at the oldest
/// undelivered message.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, topic: &str, payload: impl Into<String>) {
        {
            let mut topics = self.inner.topics.lock().await;
            topics.entry(topic.to_string()).or_default().push(payload.into());
        }
        self.inner.notify.notify_waiters();
    }

    /// Messages published but not yet delivered.
    pub async fn backlog(&self, topic: &str) -> usize {
        let topics = self.inner.topics.lock().await;
        topics.get(topic).map_or(0, Vec::len)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, LifecycleError> {
        self.inner.topics.lock().await.entry(topic.to_string()).or_default();
        Ok(Box::new(MemorySubscription {
            inner: self.inner.clone(),
            topic: topic.to_string(),
        }))
    }
}

struct MemorySubscription {
    inner: Arc<Inner>,
    topic: String,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<String>, BackendError> {
        let deadline = Instant::now() + timeout;
        loop {
            // register interest before looking so a publish in between is not missed
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.inner.take_batch(&self.topic).await;
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), LifecycleError> {
        Ok(())
    }
}
