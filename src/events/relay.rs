use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::RelaySettings;
use crate::error::Result;
use crate::events::publisher::Publisher;
use crate::models::OutboxStatus;
use crate::observability::metrics;
use crate::store::{LedgerStore, OutboxAttempt};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Time between drain cycles.
    pub interval: Duration,
    /// Maximum events fetched per cycle.
    pub batch_limit: i64,
    /// Publish attempts before an event is dead-lettered.
    pub max_attempts: u32,
    /// Base delay of the exponential retry backoff.
    pub base_backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            batch_limit: 100,
            max_attempts: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            interval: settings.interval(),
            batch_limit: settings.batch_limit,
            max_attempts: settings.max_attempts,
            base_backoff: settings.base_backoff(),
        }
    }
}

/// What one drain cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl DrainSummary {
    pub fn attempted(&self) -> usize {
        self.published + self.failed + self.dead_lettered
    }
}

/// Background outbox drain loop.
///
/// Runs on its own schedule, independent of request traffic: a slow or
/// unavailable bus degrades drain latency but never blocks new movements,
/// because the ledger mutation and the relay commit independently. One
/// event's publish failure never aborts the rest of the cycle.
pub struct OutboxRelay<S, P> {
    store: Arc<S>,
    publisher: Arc<P>,
    config: RelayConfig,
}

impl<S, P> Clone for OutboxRelay<S, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            publisher: Arc::clone(&self.publisher),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore, P: Publisher> OutboxRelay<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: RelayConfig) -> Self {
        Self {
            store,
            publisher,
            config,
        }
    }

    /// Drains forever at the configured interval. Cycle errors are logged
    /// and the schedule continues; uncommitted events stay pending and are
    /// picked up by the next cycle.
    pub async fn run(self) {
        info!(interval = ?self.config.interval, "outbox relay started");
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.drain_once().await {
                Ok(summary) if summary.attempted() > 0 => {
                    info!(
                        published = summary.published,
                        failed = summary.failed,
                        dead_lettered = summary.dead_lettered,
                        "outbox drain cycle complete"
                    );
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "outbox drain cycle failed"),
            }
        }
    }

    /// Fetches due events FIFO and attempts each one in isolation. Events
    /// still inside their backoff window are filtered out by the store and
    /// never take up batch slots.
    pub async fn drain_once(&self) -> Result<DrainSummary> {
        let events = self
            .store
            .due_outbox_events(self.config.batch_limit, self.config.base_backoff)
            .await?;

        let mut summary = DrainSummary::default();

        for event in events {
            let topic = event.topic();
            let payload = match serde_json::to_vec(&event.payload) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(event_id = %event.id, error = %err, "unserializable outbox payload");
                    self.record_failure(&mut summary, event.id, event.attempts, &topic)
                        .await;
                    continue;
                }
            };

            match self
                .publisher
                .publish(&topic, &event.aggregate_id, &payload)
                .await
            {
                Ok(()) => {
                    metrics::record_publish_success(&topic);
                    match self
                        .store
                        .record_outbox_attempt(event.id, OutboxAttempt::Delivered)
                        .await
                    {
                        Ok(_) => summary.published += 1,
                        Err(err) => {
                            // The publish went out; the event stays
                            // non-terminal and will be re-sent. Consumers
                            // deduplicate on the aggregate id.
                            warn!(event_id = %event.id, error = %err, "failed to mark outbox event sent");
                        }
                    }
                }
                Err(err) => {
                    warn!(event_id = %event.id, topic = %topic, error = %err, "outbox publish failed");
                    self.record_failure(&mut summary, event.id, event.attempts, &topic)
                        .await;
                }
            }
        }

        Ok(summary)
    }

    async fn record_failure(
        &self,
        summary: &mut DrainSummary,
        event_id: uuid::Uuid,
        prior_attempts: i32,
        topic: &str,
    ) {
        metrics::record_publish_failure(topic);
        let exhausted = prior_attempts.saturating_add(1) >= self.config.max_attempts as i32;
        match self
            .store
            .record_outbox_attempt(event_id, OutboxAttempt::Failed { exhausted })
            .await
        {
            Ok(updated) if updated.status == OutboxStatus::DeadLetter => {
                metrics::record_dead_letter();
                error!(event_id = %updated.id, "outbox event dead-lettered after {} attempts", updated.attempts);
                summary.dead_lettered += 1;
            }
            Ok(_) => summary.failed += 1,
            Err(err) => {
                warn!(event_id = %event_id, error = %err, "failed to record outbox attempt");
            }
        }
    }
}
