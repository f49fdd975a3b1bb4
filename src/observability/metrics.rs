use metrics::counter;

use crate::models::TransactionStatus;

pub const MOVEMENTS_APPLIED: &str = "ledger_movements_applied_total";
pub const MOVEMENTS_REJECTED: &str = "ledger_movements_rejected_total";
pub const MOVEMENT_RETRIES: &str = "ledger_movement_conflict_retries_total";
pub const OUTBOX_PUBLISHED: &str = "outbox_events_published_total";
pub const OUTBOX_PUBLISH_FAILURES: &str = "outbox_publish_failures_total";
pub const OUTBOX_DEAD_LETTERED: &str = "outbox_events_dead_lettered_total";

/// Records the terminal status of a movement attempt.
pub fn record_movement(status: TransactionStatus) {
    match status {
        TransactionStatus::Success => counter!(MOVEMENTS_APPLIED).increment(1),
        TransactionStatus::Failed => counter!(MOVEMENTS_REJECTED).increment(1),
        TransactionStatus::Pending => {}
    }
}

pub fn record_movement_retry() {
    counter!(MOVEMENT_RETRIES).increment(1);
}

pub fn record_publish_success(topic: &str) {
    counter!(OUTBOX_PUBLISHED, "topic" => topic.to_string()).increment(1);
}

pub fn record_publish_failure(topic: &str) {
    counter!(OUTBOX_PUBLISH_FAILURES, "topic" => topic.to_string()).increment(1);
}

pub fn record_dead_letter() {
    counter!(OUTBOX_DEAD_LETTERED).increment(1);
}
