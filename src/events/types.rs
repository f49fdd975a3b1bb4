use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountType, MovementType};

/// Aggregate type for transaction events; topic "transaction.events".
pub const AGGREGATE_TRANSACTION: &str = "Transaction";
/// Aggregate type for account events; topic "account.events".
pub const AGGREGATE_ACCOUNT: &str = "Account";

pub const EVENT_TRANSACTION_SUCCESS: &str = "TRANSACTION_SUCCESS";
pub const EVENT_ACCOUNT_CREATED: &str = "ACCOUNT_CREATED";

/// Payload announcing a committed money movement.
///
/// Carries the reference id so consumers can handle duplicates
/// idempotently under at-least-once delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementCompleted {
    pub reference_id: String,
    pub movement_type: MovementType,
    pub amount: Decimal,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
}

/// Payload announcing a newly opened account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOpened {
    pub account_id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    pub account_type: AccountType,
    pub opened_at: DateTime<Utc>,
}
