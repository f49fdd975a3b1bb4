pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Account, Audit, OutboxEvent, Transaction};
use crate::services::movement::{AppliedMovement, MovementPlan};

/// Outcome of one relay publish attempt, as recorded against the event row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxAttempt {
    /// Published to the bus; the event becomes terminal Success.
    Delivered,
    /// Publish failed. With `exhausted` the retry budget is spent and the
    /// event moves to the DeadLetter terminal state.
    Failed { exhausted: bool },
}

/// Persistence contract consumed by the ledger engine and the outbox relay.
///
/// Every method that writes more than one row does so in a single atomic
/// unit: `apply_movement` either commits balance deltas together with the
/// Transaction, LedgerEntry, Audit and OutboxEvent rows, or commits the
/// Failed Transaction plus Audit, or leaves no trace at all.
///
/// Implementations must enforce uniqueness of `Transaction.reference_id`
/// and `Account.account_number`, surfacing violations as a retryable
/// conflict, and must guard the balance check-and-mutate against concurrent
/// movements on the same account (exclusive row locks acquired in the
/// plan's ascending lock order).
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Persists a new account together with its ACCOUNT_CREATED outbox
    /// event and audit row, atomically.
    async fn insert_account(
        &self,
        account: Account,
        event: OutboxEvent,
        audit: Audit,
    ) -> Result<Account>;

    async fn account(&self, id: Uuid) -> Result<Option<Account>>;

    async fn account_by_number(&self, account_number: &str) -> Result<Option<Account>>;

    async fn transaction_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>>;

    /// Executes a movement plan inside one atomic unit. A missing account
    /// aborts with `NotFound` and writes nothing; an insufficient balance
    /// commits the Failed transaction and audit rows without touching any
    /// balance; otherwise balances, Transaction, LedgerEntry, Audit and
    /// OutboxEvent commit together.
    async fn apply_movement(&self, plan: MovementPlan) -> Result<AppliedMovement>;

    /// Non-terminal outbox events that are due for an attempt, FIFO by
    /// creation time. Events still waiting out their retry backoff are not
    /// returned and do not consume `limit` slots, so a backlog of failed
    /// events cannot head-of-line block fresh pending ones.
    async fn due_outbox_events(&self, limit: i64, base_backoff: Duration)
        -> Result<Vec<OutboxEvent>>;

    /// Records one publish attempt. Only the relay calls this; request
    /// handlers never update outbox status.
    async fn record_outbox_attempt(
        &self,
        event_id: Uuid,
        outcome: OutboxAttempt,
    ) -> Result<OutboxEvent>;
}
