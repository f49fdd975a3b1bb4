use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use bankx_ledger::cache::AccountCache;
use bankx_ledger::models::{Account, AccountType};
use bankx_ledger::services::{AccountService, LedgerEngine, OpenAccountRequest};
use bankx_ledger::store::MemoryStore;

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub engine: LedgerEngine<MemoryStore>,
    pub accounts: AccountService<MemoryStore>,
}

pub fn context() -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(AccountCache::new());
    TestContext {
        engine: LedgerEngine::new(Arc::clone(&store), Arc::clone(&cache)),
        accounts: AccountService::new(Arc::clone(&store), cache),
        store,
    }
}

pub async fn open_account(ctx: &TestContext, balance: Decimal) -> Account {
    ctx.accounts
        .open_account(OpenAccountRequest {
            customer_id: Uuid::new_v4(),
            account_type: AccountType::Savings,
            initial_balance: Some(balance),
        })
        .await
        .expect("failed to open account")
}

/// Outbox events describing movements, excluding ACCOUNT_CREATED events.
pub fn transaction_events(ctx: &TestContext) -> Vec<bankx_ledger::models::OutboxEvent> {
    ctx.store
        .outbox_events()
        .into_iter()
        .filter(|e| e.aggregate_type == "Transaction")
        .collect()
}
