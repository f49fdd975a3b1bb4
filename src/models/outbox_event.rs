use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Delivery status of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Not yet attempted.
    Pending,
    /// Delivered to the bus. Terminal.
    Success,
    /// Last attempt failed; eligible for backoff retry.
    Failed,
    /// Retry budget exhausted. Terminal, operator-visible.
    DeadLetter,
}

impl OutboxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboxStatus::Success | OutboxStatus::DeadLetter)
    }
}

/// A durable record that an external party must be told something happened.
///
/// Created in the same atomic unit as the state change it describes: if the
/// transaction commits the event row exists, if it rolls back neither does.
/// Delivery is at-least-once; the payload carries the aggregate id so
/// consumers can deduplicate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    /// What this event is about, e.g. "Transaction" or "Account".
    pub aggregate_type: String,
    /// Stable id consumers key idempotent handling on: a transaction
    /// reference id or an account id.
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set only on successful relay.
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            sent_at: None,
        }
    }

    /// Destination derived from the aggregate type, e.g. "transaction.events".
    pub fn topic(&self) -> String {
        format!("{}.events", self.aggregate_type.to_lowercase())
    }

    /// Returns true if this event should be attempted now.
    ///
    /// First attempts are always due. Retries wait out an exponential
    /// backoff of `base_backoff * 2^(attempts - 1)` since the last attempt.
    pub fn is_due(&self, now: DateTime<Utc>, base_backoff: std::time::Duration) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.last_attempt_at {
            None => true,
            Some(last) => {
                let exponent = self.attempts.saturating_sub(1).clamp(0, 16) as u32;
                match Duration::from_std(base_backoff * 2u32.pow(exponent)) {
                    Ok(delay) => last
                        .checked_add_signed(delay)
                        .map_or(false, |due| now >= due),
                    Err(_) => false,
                }
            }
        }
    }
}
