use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;

use super::memory::MAX_POLL_RECORDS;
use super::{Broker, Subscription};
use crate::error::{BackendError, LifecycleError};

/// Kafka consumer-group client.
pub struct KafkaBroker {
    bootstrap_servers: String,
    group_id: String,
}

impl KafkaBroker {
    pub fn new(bootstrap_servers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: group_id.into(),
        }
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, LifecycleError> {
        let subscribe_err = |e: rdkafka::error::KafkaError| LifecycleError::Subscribe {
            topic: topic.to_string(),
            message: e.to_string(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(subscribe_err)?;
        consumer.subscribe(&[topic]).map_err(subscribe_err)?;

        info!(
            brokers = %self.bootstrap_servers,
            group = %self.group_id,
            topic,
            "kafka consumer subscribed"
        );
        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

impl KafkaSubscription {
    fn payload(message: &impl Message) -> Option<String> {
        match message.payload_view::<str>() {
            Some(Ok(text)) => Some(text.to_string()),
            Some(Err(e)) => {
                warn!(offset = message.offset(), error = %e, "dropping non-utf8 message");
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<String>, BackendError> {
        let mut batch = Vec::new();
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(batch),
            Ok(Err(e)) => return Err(BackendError::Broker(e.to_string())),
            Ok(Ok(message)) => batch.extend(Self::payload(&message)),
        }

        // drain whatever the client already has buffered
        while batch.len() < MAX_POLL_RECORDS {
            match tokio::time::timeout(Duration::ZERO, self.consumer.recv()).await {
                Ok(Ok(message)) => batch.extend(Self::payload(&message)),
                Ok(Err(e)) => {
                    warn!(error = %e, "kafka receive failed mid-batch");
                    break;
                }
                Err(_) => break,
            }
        }
        debug!(count = batch.len(), "polled kafka batch");
        Ok(batch)
    }

    async fn close(self: Box<Self>) -> Result<(), LifecycleError> {
        self.consumer.unsubscribe();
        info!("kafka consumer unsubscribed");
        Ok(())
    }
}
