use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::AccountCache;
use crate::error::{AppError, Result};
use crate::events::types::{self, AccountOpened};
use crate::models::{Account, AccountType, Audit, OutboxEvent, MONEY_SCALE};
use crate::observability::mask_sensitive;
use crate::store::LedgerStore;

/// Bound on regeneration attempts when a generated account number collides.
const MAX_NUMBER_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountRequest {
    pub customer_id: Uuid,
    pub account_type: AccountType,
    pub initial_balance: Option<Decimal>,
}

/// Account onboarding and lookups.
///
/// Opening an account writes the Account row, its ACCOUNT_CREATED outbox
/// event and an audit row in one atomic unit, so the downstream
/// announcement can never exist without the account or vice versa.
pub struct AccountService<S> {
    store: Arc<S>,
    cache: Arc<AccountCache>,
}

impl<S> Clone for AccountService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<S: LedgerStore> AccountService<S> {
    pub fn new(store: Arc<S>, cache: Arc<AccountCache>) -> Self {
        Self { store, cache }
    }

    pub async fn open_account(&self, request: OpenAccountRequest) -> Result<Account> {
        let initial_balance = request.initial_balance.unwrap_or(Decimal::ZERO);
        if initial_balance < Decimal::ZERO {
            return Err(AppError::Validation(
                "initial balance cannot be negative".to_string(),
            ));
        }
        if initial_balance.round_dp(MONEY_SCALE) != initial_balance {
            return Err(AppError::Validation(format!(
                "initial balance {} has more than {} fractional digits",
                initial_balance, MONEY_SCALE
            )));
        }

        let mut attempt = 0;
        loop {
            let account = Account::new(request.customer_id, request.account_type, initial_balance);

            let payload = serde_json::to_value(AccountOpened {
                account_id: account.id,
                account_number: account.account_number.clone(),
                customer_id: account.customer_id,
                account_type: account.account_type,
                opened_at: account.created_at,
            })?;
            let event = OutboxEvent::new(
                types::AGGREGATE_ACCOUNT,
                account.id.to_string(),
                types::EVENT_ACCOUNT_CREATED,
                payload,
            );
            let audit = Audit::new(
                types::AGGREGATE_ACCOUNT,
                account.id.to_string(),
                "CREATE",
                "account-service",
                None,
                Some(serde_json::to_value(&account)?),
            );

            match self.store.insert_account(account, event, audit).await {
                Ok(created) => {
                    info!(
                        account_id = %created.id,
                        account_number = %mask_sensitive(&created.account_number, 2),
                        "account opened"
                    );
                    self.cache.put(created.clone());
                    return Ok(created);
                }
                Err(err) if err.is_retryable() && attempt < MAX_NUMBER_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %err, "account number collided, regenerating");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Account by id, served write-through from the cache.
    pub async fn account(&self, id: Uuid) -> Result<Account> {
        if let Some(account) = self.cache.get(id) {
            return Ok(account);
        }
        let account = self
            .store
            .account(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account '{}' not found", id)))?;
        self.cache.put(account.clone());
        Ok(account)
    }

    pub async fn account_by_number(&self, account_number: &str) -> Result<Account> {
        let account = self
            .store
            .account_by_number(account_number)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "account number '{}' not found",
                    mask_sensitive(account_number, 2)
                ))
            })?;
        self.cache.put(account.clone());
        Ok(account)
    }
}
