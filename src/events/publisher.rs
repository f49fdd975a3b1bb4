use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, PartitionClient, UnknownTopicHandling};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::KafkaSettings;
use crate::error::{AppError, Result};

/// External bus boundary consumed by the outbox relay.
///
/// Delivery is at-least-once: implementations may deliver duplicates and
/// consumers deduplicate on the key/aggregate id carried in the payload.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            retry_count: 3,
            retry_delay_ms: 100,
        }
    }
}

impl From<&KafkaSettings> for KafkaConfig {
    fn from(settings: &KafkaSettings) -> Self {
        Self {
            brokers: settings.broker_list(),
            retry_count: settings.retry_count,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

/// Kafka-backed publisher.
///
/// Partition clients are created lazily per topic and reused across
/// sends. Sends are retried internally a few times before the failure is
/// handed back to the relay, which owns the longer backoff schedule.
pub struct KafkaPublisher {
    config: KafkaConfig,
    client: Arc<rskafka::client::Client>,
    partition_clients: RwLock<BTreeMap<String, Arc<PartitionClient>>>,
}

impl KafkaPublisher {
    pub async fn connect(config: KafkaConfig) -> Result<Self> {
        info!("connecting to kafka brokers: {:?}", config.brokers);

        let client = ClientBuilder::new(config.brokers.clone())
            .build()
            .await
            .map_err(AppError::Kafka)?;

        info!("kafka connection established");
        Ok(Self {
            config,
            client: Arc::new(client),
            partition_clients: RwLock::new(BTreeMap::new()),
        })
    }

    async fn partition_client(&self, topic: &str) -> Result<Arc<PartitionClient>> {
        {
            let clients = self.partition_clients.read().await;
            if let Some(client) = clients.get(topic) {
                return Ok(client.clone());
            }
        }

        let partition_client = self
            .client
            .partition_client(topic.to_string(), 0, UnknownTopicHandling::Retry)
            .await
            .map_err(AppError::Kafka)?;
        let client = Arc::new(partition_client);

        let mut clients = self.partition_clients.write().await;
        Ok(clients.entry(topic.to_string()).or_insert(client).clone())
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let partition_client = self.partition_client(topic).await?;

        let record = Record {
            key: Some(key.as_bytes().to_vec()),
            value: Some(payload.to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let mut last_error = None;
        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                warn!(
                    topic,
                    attempt, "retrying kafka send ({}/{})", attempt, self.config.retry_count
                );
                tokio::time::sleep(Duration::from_millis(
                    self.config.retry_delay_ms * u64::from(attempt),
                ))
                .await;
            }

            match partition_client
                .produce(vec![record.clone()], Compression::NoCompression)
                .await
            {
                Ok(offsets) => {
                    debug!(
                        topic,
                        offset = offsets.first().copied().unwrap_or(0),
                        "record published"
                    );
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(AppError::Internal(anyhow!(
            "failed to publish to '{}' after {} retries: {:?}",
            topic,
            self.config.retry_count,
            last_error
        )))
    }
}
