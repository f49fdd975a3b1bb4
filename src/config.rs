use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub kafka: KafkaSettings,
    pub relay: RelaySettings,
    pub application: ApplicationSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KafkaSettings {
    pub brokers: String,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl KafkaSettings {
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers.split(',').map(|b| b.trim().to_string()).collect()
    }
}

/// Outbox relay schedule and retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// Seconds between drain cycles.
    pub interval_secs: u64,
    /// Maximum events fetched per cycle.
    pub batch_limit: i64,
    /// Publish attempts before an event is dead-lettered.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub base_backoff_ms: u64,
}

impl RelaySettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub log_level: String,
    pub log_format: String,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_list_splits_and_trims() {
        let kafka = KafkaSettings {
            brokers: "kafka-1:9092, kafka-2:9092".to_string(),
            retry_count: 3,
            retry_delay_ms: 100,
        };
        assert_eq!(kafka.broker_list(), vec!["kafka-1:9092", "kafka-2:9092"]);
    }

    #[test]
    fn test_relay_durations() {
        let relay = RelaySettings {
            interval_secs: 5,
            batch_limit: 100,
            max_attempts: 5,
            base_backoff_ms: 250,
        };
        assert_eq!(relay.interval(), Duration::from_secs(5));
        assert_eq!(relay.base_backoff(), Duration::from_millis(250));
    }
}
