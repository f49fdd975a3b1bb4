use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::AccountCache;
use crate::error::Result;
use crate::models::{Transaction, TransactionStatus};
use crate::observability::metrics;
use crate::services::movement::{MovementOutcome, MovementPlan, MovementRequest};
use crate::store::LedgerStore;

/// Default bound on automatic retries after a conflict (reference-id
/// collision or concurrent-mutation serialization failure).
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Validates and applies money movements against the account store.
///
/// Runs on caller tasks, one invocation per movement request. Balance
/// reads and writes happen inside the store's atomic unit; the engine
/// itself only validates shape, generates reference ids, bounds conflict
/// retries, and refreshes the write-through cache after commit.
pub struct LedgerEngine<S> {
    store: Arc<S>,
    cache: Arc<AccountCache>,
    max_retries: u32,
}

impl<S> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            max_retries: self.max_retries,
        }
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: Arc<S>, cache: Arc<AccountCache>) -> Self {
        Self {
            store,
            cache,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Credits `amount` to an account.
    pub async fn deposit(&self, to_account_id: Uuid, amount: Decimal) -> Result<MovementOutcome> {
        self.apply_movement(MovementRequest::deposit(to_account_id, amount))
            .await
    }

    /// Debits `amount` from an account.
    pub async fn withdraw(
        &self,
        from_account_id: Uuid,
        amount: Decimal,
    ) -> Result<MovementOutcome> {
        self.apply_movement(MovementRequest::withdrawal(from_account_id, amount))
            .await
    }

    /// Moves `amount` between two distinct accounts.
    pub async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
    ) -> Result<MovementOutcome> {
        self.apply_movement(MovementRequest::transfer(
            from_account_id,
            to_account_id,
            amount,
        ))
        .await
    }

    /// Applies a movement and returns its outcome.
    ///
    /// Business failures (insufficient balance) come back as a `Failed`
    /// status with a reference id, never as an error. Conflicts are retried
    /// with a fresh plan (and therefore a fresh reference id) up to the
    /// configured bound.
    pub async fn apply_movement(&self, request: MovementRequest) -> Result<MovementOutcome> {
        request.validate()?;

        let mut attempt = 0;
        loop {
            let plan = MovementPlan::new(&request);
            let reference_id = plan.transaction.reference_id.clone();
            debug!(
                reference_id = %reference_id,
                movement = ?request.movement_type,
                amount = %request.amount,
                attempt,
                "applying movement"
            );

            match self.store.apply_movement(plan).await {
                Ok(applied) => {
                    for account in &applied.accounts {
                        self.cache.put(account.clone());
                    }
                    metrics::record_movement(applied.transaction.status);
                    match applied.transaction.status {
                        TransactionStatus::Success => info!(
                            reference_id = %applied.transaction.reference_id,
                            "movement applied"
                        ),
                        _ => info!(
                            reference_id = %applied.transaction.reference_id,
                            "movement rejected: insufficient balance"
                        ),
                    }
                    return Ok(MovementOutcome {
                        status: applied.transaction.status,
                        reference_id: applied.transaction.reference_id,
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    metrics::record_movement_retry();
                    warn!(
                        reference_id = %reference_id,
                        attempt,
                        error = %err,
                        "movement conflicted, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Looks up a movement attempt by its caller-visible reference id.
    /// Works for failed attempts as well.
    pub async fn transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>> {
        self.store.transaction_by_reference(reference_id).await
    }
}
