use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Direction of a money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Money leaves an account. Source only.
    Debit,
    /// Money enters an account. Destination only.
    Credit,
    /// Money moves between two distinct accounts.
    Transfer,
}

impl MovementType {
    pub fn requires_source(&self) -> bool {
        matches!(self, MovementType::Debit | MovementType::Transfer)
    }

    pub fn requires_destination(&self) -> bool {
        matches!(self, MovementType::Credit | MovementType::Transfer)
    }
}

/// Lifecycle status of a transaction. Terminal states are write-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }
}

/// A completed decision about a requested movement.
///
/// Failed attempts are part of the ledger history: an insufficient-balance
/// rejection still produces a `Failed` row with its own reference id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    /// Caller-visible token for this attempt. Unique across all history,
    /// assigned exactly once; uniqueness enforced by the store.
    pub reference_id: String,
    #[sqlx(rename = "type")]
    pub movement_type: MovementType,
    pub status: TransactionStatus,
    /// Absent for credits.
    pub from_account_id: Option<Uuid>,
    /// Absent for debits.
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a pending transaction with a freshly generated reference id.
    pub fn new(
        movement_type: MovementType,
        from_account_id: Option<Uuid>,
        to_account_id: Option<Uuid>,
        amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference_id: generate_reference_id(),
            movement_type,
            status: TransactionStatus::Pending,
            from_account_id,
            to_account_id,
            amount,
            created_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }
}

/// Generates a human-readable reference id: a timestamp plus a random
/// 4-digit disambiguator, e.g. `TXN-20260825143015-4821`.
///
/// Uniqueness is enforced by the store's constraint, not assumed here; a
/// collision surfaces as a retryable conflict.
pub fn generate_reference_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let disambiguator: u16 = rand::thread_rng().gen_range(1000..10000);
    format!("TXN-{}-{}", timestamp, disambiguator)
}
