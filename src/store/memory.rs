use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Account, Audit, LedgerEntry, OutboxEvent, OutboxStatus, Transaction};
use crate::services::movement::{AppliedMovement, BalanceSnapshot, MovementPlan};
use crate::store::{LedgerStore, OutboxAttempt};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    reference_ids: HashSet<String>,
    account_numbers: HashSet<String>,
    ledger_entries: Vec<LedgerEntry>,
    outbox: Vec<OutboxEvent>,
    audits: Vec<Audit>,
}

/// In-memory ledger store.
///
/// One mutex guards the whole state, so every trait method is trivially an
/// atomic unit; concurrent movements on the same account serialize on the
/// lock instead of row locks. Backs the test suite and benches.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal(anyhow!("memory store lock poisoned")))
    }

    /// All transactions, in insertion order.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().map(|s| s.transactions.clone()).unwrap_or_default()
    }

    /// All ledger entries, in insertion order.
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().map(|s| s.ledger_entries.clone()).unwrap_or_default()
    }

    /// All outbox events regardless of status, in insertion order.
    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().map(|s| s.outbox.clone()).unwrap_or_default()
    }

    /// All audit rows, in insertion order.
    pub fn audits(&self) -> Vec<Audit> {
        self.state.lock().map(|s| s.audits.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_account(
        &self,
        account: Account,
        event: OutboxEvent,
        audit: Audit,
    ) -> Result<Account> {
        let mut state = self.lock()?;
        if !state.account_numbers.insert(account.account_number.clone()) {
            return Err(AppError::Conflict(format!(
                "account number '{}' already exists",
                account.account_number
            )));
        }
        state.accounts.insert(account.id, account.clone());
        state.outbox.push(event);
        state.audits.push(audit);
        Ok(account)
    }

    async fn account(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| a.account_number == account_number)
            .cloned())
    }

    async fn transaction_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .find(|t| t.reference_id == reference_id)
            .cloned())
    }

    async fn apply_movement(&self, plan: MovementPlan) -> Result<AppliedMovement> {
        let mut state = self.lock()?;

        if state.reference_ids.contains(&plan.transaction.reference_id) {
            return Err(AppError::Conflict(format!(
                "reference id '{}' already exists",
                plan.transaction.reference_id
            )));
        }

        // Resolve before writing anything: a missing account is a
        // request-level rejection, not a ledger failure.
        for id in plan.lock_order() {
            if !state.accounts.contains_key(&id) {
                return Err(AppError::NotFound(format!("account '{}' not found", id)));
            }
        }

        let amount = plan.transaction.amount;
        let from_id = plan.request.from_account_id;
        let to_id = plan.request.to_account_id;

        if let Some(from_id) = from_id {
            let available = state.accounts[&from_id].balance;
            if available < amount {
                let rejected = plan.rejected(available);
                let transaction = rejected.transaction.clone();
                state.reference_ids.insert(transaction.reference_id.clone());
                state.transactions.push(rejected.transaction);
                state.audits.push(rejected.audit);
                return Ok(AppliedMovement {
                    transaction,
                    entry: None,
                    accounts: Vec::new(),
                });
            }
        }

        let mut balances = BalanceSnapshot::default();
        let mut touched = Vec::new();

        if let Some(from_id) = from_id {
            let account = state
                .accounts
                .get_mut(&from_id)
                .ok_or_else(|| AppError::NotFound(format!("account '{}' not found", from_id)))?;
            balances.from_before = Some(account.balance);
            account.apply_delta(-amount);
            balances.from_after = Some(account.balance);
            touched.push(account.clone());
        }
        if let Some(to_id) = to_id {
            let account = state
                .accounts
                .get_mut(&to_id)
                .ok_or_else(|| AppError::NotFound(format!("account '{}' not found", to_id)))?;
            balances.to_before = Some(account.balance);
            account.apply_delta(amount);
            balances.to_after = Some(account.balance);
            touched.push(account.clone());
        }

        let committed = plan.committed(balances)?;
        let transaction = committed.transaction.clone();
        let entry = committed.entry.clone();

        state.reference_ids.insert(transaction.reference_id.clone());
        state.transactions.push(committed.transaction);
        state.ledger_entries.push(committed.entry);
        state.outbox.push(committed.outbox);
        state.audits.push(committed.audit);

        Ok(AppliedMovement {
            transaction,
            entry: Some(entry),
            accounts: touched,
        })
    }

    async fn due_outbox_events(
        &self,
        limit: i64,
        base_backoff: std::time::Duration,
    ) -> Result<Vec<OutboxEvent>> {
        let now = Utc::now();
        let state = self.lock()?;
        let mut events: Vec<OutboxEvent> = state
            .outbox
            .iter()
            .filter(|e| e.is_due(now, base_backoff))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn record_outbox_attempt(
        &self,
        event_id: Uuid,
        outcome: OutboxAttempt,
    ) -> Result<OutboxEvent> {
        let mut state = self.lock()?;
        let event = state
            .outbox
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| AppError::NotFound(format!("outbox event '{}' not found", event_id)))?;

        if event.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "outbox event '{}' is already terminal",
                event_id
            )));
        }

        let now = Utc::now();
        event.attempts += 1;
        event.last_attempt_at = Some(now);
        match outcome {
            OutboxAttempt::Delivered => {
                event.status = OutboxStatus::Success;
                event.sent_at = Some(now);
            }
            OutboxAttempt::Failed { exhausted: false } => {
                event.status = OutboxStatus::Failed;
            }
            OutboxAttempt::Failed { exhausted: true } => {
                event.status = OutboxStatus::DeadLetter;
            }
        }
        Ok(event.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountType, TransactionStatus};
    use crate::services::movement::MovementRequest;
    use rust_decimal_macros::dec;

    fn seeded_account(store: &MemoryStore, balance: rust_decimal::Decimal) -> Account {
        let account = Account::new(Uuid::new_v4(), AccountType::Savings, balance);
        let mut state = store.state.lock().unwrap();
        state.account_numbers.insert(account.account_number.clone());
        state.accounts.insert(account.id, account.clone());
        account
    }

    #[tokio::test]
    async fn test_duplicate_reference_id_is_a_conflict() {
        let store = MemoryStore::new();
        let account = seeded_account(&store, dec!(100.00));

        let plan = MovementPlan::new(&MovementRequest::deposit(account.id, dec!(1.00)));
        let duplicate = plan.clone();

        store.apply_movement(plan).await.unwrap();
        let err = store.apply_movement(duplicate).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_account_writes_nothing() {
        let store = MemoryStore::new();
        let plan = MovementPlan::new(&MovementRequest::withdrawal(Uuid::new_v4(), dec!(10.00)));

        let err = store.apply_movement(plan).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.transactions().is_empty());
        assert!(store.audits().is_empty());
        assert!(store.outbox_events().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_commits_failed_row_without_balance_change() {
        let store = MemoryStore::new();
        let account = seeded_account(&store, dec!(30.00));

        let plan = MovementPlan::new(&MovementRequest::withdrawal(account.id, dec!(50.00)));
        let applied = store.apply_movement(plan).await.unwrap();

        assert_eq!(applied.transaction.status, TransactionStatus::Failed);
        assert!(applied.entry.is_none());
        assert_eq!(
            store.account(account.id).await.unwrap().unwrap().balance,
            dec!(30.00)
        );
        assert_eq!(store.transactions().len(), 1);
        assert_eq!(store.audits().len(), 1);
        assert!(store.outbox_events().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_account_number_is_a_conflict() {
        let store = MemoryStore::new();
        let account = Account::new(Uuid::new_v4(), AccountType::Wallet, dec!(0));
        let mut clash = Account::new(Uuid::new_v4(), AccountType::Wallet, dec!(0));
        clash.account_number = account.account_number.clone();

        let event = OutboxEvent::new("Account", account.id.to_string(), "ACCOUNT_CREATED", serde_json::json!({}));
        let audit = Audit::new("Account", account.id.to_string(), "CREATE", "test", None, None);
        store
            .insert_account(account, event.clone(), audit.clone())
            .await
            .unwrap();

        let err = store.insert_account(clash, event, audit).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
