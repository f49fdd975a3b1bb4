mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use uuid::Uuid;

use bankx_ledger::error::{AppError, Result};
use bankx_ledger::models::{
    Account, Audit, MovementType, OutboxEvent, OutboxStatus, Transaction, TransactionStatus,
};
use bankx_ledger::services::movement::{AppliedMovement, MovementPlan};
use bankx_ledger::services::LedgerEngine;
use bankx_ledger::store::{LedgerStore, MemoryStore, OutboxAttempt};

use common::{context, open_account, transaction_events};

#[tokio::test]
async fn test_deposit_credits_balance_and_queues_event() {
    let ctx = context();
    let account = open_account(&ctx, dec!(0.00)).await;

    let outcome = ctx.engine.deposit(account.id, dec!(100.00)).await.unwrap();
    assert_eq!(outcome.status, TransactionStatus::Success);

    assert_eq!(
        ctx.accounts.account(account.id).await.unwrap().balance,
        dec!(100.00)
    );

    let events = transaction_events(&ctx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, OutboxStatus::Pending);
    assert_eq!(events[0].aggregate_id, outcome.reference_id);
    assert_eq!(events[0].event_type, "TRANSACTION_SUCCESS");
    assert_eq!(events[0].topic(), "transaction.events");
}

#[tokio::test]
async fn test_insufficient_withdrawal_fails_without_balance_change() {
    let ctx = context();
    let account = open_account(&ctx, dec!(30.00)).await;

    let outcome = ctx.engine.withdraw(account.id, dec!(50.00)).await.unwrap();
    assert_eq!(outcome.status, TransactionStatus::Failed);

    assert_eq!(
        ctx.accounts.account(account.id).await.unwrap().balance,
        dec!(30.00)
    );

    let txn = ctx
        .engine
        .transaction_by_reference(&outcome.reference_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(txn.status, TransactionStatus::Failed);
    assert_eq!(txn.amount, dec!(50.00));

    // Nothing to announce downstream for a rejected movement.
    assert!(transaction_events(&ctx).is_empty());
    assert!(ctx.store.ledger_entries().is_empty());
}

#[tokio::test]
async fn test_transfer_records_balances_after_on_both_sides() {
    let ctx = context();
    let from = open_account(&ctx, dec!(100.00)).await;
    let to = open_account(&ctx, dec!(10.00)).await;

    let outcome = ctx
        .engine
        .transfer(from.id, to.id, dec!(20.00))
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Success);

    assert_eq!(ctx.accounts.account(from.id).await.unwrap().balance, dec!(80.00));
    assert_eq!(ctx.accounts.account(to.id).await.unwrap().balance, dec!(30.00));

    let entries = ctx.store.ledger_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reference_id, outcome.reference_id);
    assert_eq!(entries[0].movement_type, MovementType::Transfer);
    assert_eq!(entries[0].from_balance_after, Some(dec!(80.00)));
    assert_eq!(entries[0].to_balance_after, Some(dec!(30.00)));
}

#[tokio::test]
async fn test_transfers_conserve_total_balance() {
    let ctx = context();
    let a = open_account(&ctx, dec!(500.00)).await;
    let b = open_account(&ctx, dec!(250.00)).await;

    for _ in 0..10 {
        ctx.engine.transfer(a.id, b.id, dec!(17.35)).await.unwrap();
        ctx.engine.transfer(b.id, a.id, dec!(9.10)).await.unwrap();
    }

    let total = ctx.accounts.account(a.id).await.unwrap().balance
        + ctx.accounts.account(b.id).await.unwrap().balance;
    assert_eq!(total, dec!(750.00));
}

#[tokio::test]
async fn test_self_transfer_is_rejected_before_the_store() {
    let ctx = context();
    let account = open_account(&ctx, dec!(100.00)).await;

    let err = ctx
        .engine
        .transfer(account.id, account.id, dec!(10.00))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidMovement(_)));
    assert!(ctx.store.transactions().is_empty());
}

#[tokio::test]
async fn test_missing_account_leaves_no_trace() {
    let ctx = context();
    let funded = open_account(&ctx, dec!(100.00)).await;

    let err = ctx
        .engine
        .transfer(funded.id, Uuid::new_v4(), dec!(10.00))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(ctx.accounts.account(funded.id).await.unwrap().balance, dec!(100.00));
    assert!(ctx.store.transactions().is_empty());
    assert!(transaction_events(&ctx).is_empty());
}

#[tokio::test]
async fn test_sub_cent_amount_is_rejected() {
    let ctx = context();
    let account = open_account(&ctx, dec!(100.00)).await;

    let err = ctx.engine.deposit(account.id, dec!(0.001)).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidMovement(_)));
}

#[tokio::test]
async fn test_every_success_has_exactly_one_pending_event() {
    let ctx = context();
    let account = open_account(&ctx, dec!(20.00)).await;

    ctx.engine.deposit(account.id, dec!(5.00)).await.unwrap();
    ctx.engine.withdraw(account.id, dec!(100.00)).await.unwrap(); // rejected
    ctx.engine.withdraw(account.id, dec!(10.00)).await.unwrap();

    let successes: Vec<String> = ctx
        .store
        .transactions()
        .into_iter()
        .filter(|t| t.status == TransactionStatus::Success)
        .map(|t| t.reference_id)
        .collect();
    assert_eq!(successes.len(), 2);

    let events = transaction_events(&ctx);
    assert_eq!(events.len(), successes.len());
    for reference_id in &successes {
        assert_eq!(
            events.iter().filter(|e| &e.aggregate_id == reference_id).count(),
            1
        );
    }
}

#[tokio::test]
async fn test_reference_ids_are_unique_across_movements() {
    let ctx = context();
    let account = open_account(&ctx, dec!(0.00)).await;

    let mut seen = HashSet::new();
    for _ in 0..50 {
        let outcome = ctx.engine.deposit(account.id, dec!(1.00)).await.unwrap();
        assert!(seen.insert(outcome.reference_id));
    }
}

/// Store wrapper that reports a conflict on the first movement, as a
/// concurrent writer holding the same reference id would.
struct ConflictOnce {
    inner: MemoryStore,
    tripped: AtomicBool,
}

#[async_trait]
impl LedgerStore for ConflictOnce {
    async fn insert_account(
        &self,
        account: Account,
        event: OutboxEvent,
        audit: Audit,
    ) -> Result<Account> {
        self.inner.insert_account(account, event, audit).await
    }

    async fn account(&self, id: Uuid) -> Result<Option<Account>> {
        self.inner.account(id).await
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        self.inner.account_by_number(account_number).await
    }

    async fn transaction_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>> {
        self.inner.transaction_by_reference(reference_id).await
    }

    async fn apply_movement(&self, plan: MovementPlan) -> Result<AppliedMovement> {
        if !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(AppError::Conflict(format!(
                "reference id '{}' already exists",
                plan.transaction.reference_id
            )));
        }
        self.inner.apply_movement(plan).await
    }

    async fn due_outbox_events(
        &self,
        limit: i64,
        base_backoff: std::time::Duration,
    ) -> Result<Vec<OutboxEvent>> {
        self.inner.due_outbox_events(limit, base_backoff).await
    }

    async fn record_outbox_attempt(
        &self,
        event_id: Uuid,
        outcome: OutboxAttempt,
    ) -> Result<OutboxEvent> {
        self.inner.record_outbox_attempt(event_id, outcome).await
    }
}

#[tokio::test]
async fn test_conflict_retries_with_a_fresh_reference_id() {
    let store = Arc::new(ConflictOnce {
        inner: MemoryStore::new(),
        tripped: AtomicBool::new(false),
    });
    let cache = Arc::new(bankx_ledger::cache::AccountCache::new());
    let engine = LedgerEngine::new(Arc::clone(&store), cache);

    let account = Account::new(Uuid::new_v4(), bankx_ledger::models::AccountType::Savings, dec!(0));
    let event = OutboxEvent::new(
        "Account",
        account.id.to_string(),
        "ACCOUNT_CREATED",
        serde_json::json!({}),
    );
    let audit = Audit::new("Account", account.id.to_string(), "CREATE", "test", None, None);
    store.insert_account(account.clone(), event, audit).await.unwrap();

    let outcome = engine.deposit(account.id, dec!(25.00)).await.unwrap();
    assert_eq!(outcome.status, TransactionStatus::Success);

    // Only the surviving attempt left a row behind.
    assert_eq!(store.inner.transactions().len(), 1);
    assert_eq!(store.inner.transactions()[0].reference_id, outcome.reference_id);
}
