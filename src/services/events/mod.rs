use crate::config::Config;
use crate::error::{RecError, Result};
use crate::models::DomainEvent;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Publishes domain events to the shared event topic, keyed by the entity
/// id so per-entity ordering holds within a partition.
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(config: &Config) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka.brokers)
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .create()?;

        Ok(Self {
            producer,
            topic: config.kafka.event_topic.clone(),
        })
    }

    pub async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let key = event.partition_key();
        let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);

        match self.producer.send(record, Duration::from_secs(5)).await {
            Ok(_) => Ok(()),
            Err((e, _)) => {
                error!("failed to publish event to {}: {}", self.topic, e);
                Err(RecError::Event(e.to_string()))
            }
        }
    }
}

/// Consumes the event topic and forwards decoded events over a channel.
/// Undecodable payloads are logged and skipped; the closed event set means
/// an unknown event type is a deploy-ordering problem, not a crash.
pub struct EventConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl EventConsumer {
    pub fn new(config: &Config) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.kafka.group_id)
            .set("bootstrap.servers", &config.kafka.brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", &config.kafka.auto_offset_reset)
            .create()?;

        Ok(Self {
            consumer,
            topic: config.kafka.event_topic.clone(),
        })
    }

    pub async fn run(&self, tx: mpsc::Sender<DomainEvent>) -> Result<()> {
        self.consumer.subscribe(&[&self.topic])?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    if let Some(payload) = message.payload() {
                        match serde_json::from_slice::<DomainEvent>(payload) {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    // Receiver gone, nothing left to feed.
                                    return Ok(());
                                }
                            }
                            Err(e) => {
                                warn!("skipping undecodable event payload: {}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("event consumer error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}
