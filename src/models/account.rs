use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::MONEY_SCALE;

/// Product type of a customer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Savings,
    Current,
    Wallet,
}

/// A customer account holding a spendable balance.
///
/// The balance is only ever changed by the ledger engine, inside the same
/// atomic unit that records the Transaction describing the change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    /// Human-facing 12-digit number. Unique, immutable once assigned.
    pub account_number: String,
    #[sqlx(rename = "type")]
    pub account_type: AccountType,
    /// Current balance, scale 2. Never negative after a successful debit.
    pub balance: Decimal,
    pub customer_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with a generated account number.
    pub fn new(customer_id: Uuid, account_type: AccountType, initial_balance: Decimal) -> Self {
        let mut balance = initial_balance;
        balance.rescale(MONEY_SCALE);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_number: generate_account_number(),
            account_type,
            balance,
            customer_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the balance covers a debit of `amount`.
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Applies a signed delta to the balance, keeping scale 2.
    pub fn apply_delta(&mut self, delta: Decimal) {
        self.balance += delta;
        self.balance.rescale(MONEY_SCALE);
        self.updated_at = Utc::now();
    }
}

/// Generates a random 12-digit numeric account number.
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    (0..12).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_number_format() {
        let number = generate_account_number();
        assert_eq!(number.len(), 12);
        assert!(number.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_new_account_rescales_balance() {
        let account = Account::new(Uuid::new_v4(), AccountType::Savings, dec!(100));
        assert_eq!(account.balance, dec!(100.00));
        assert_eq!(account.balance.scale(), 2);
    }

    #[test]
    fn test_can_cover() {
        let account = Account::new(Uuid::new_v4(), AccountType::Wallet, dec!(30.00));
        assert!(account.can_cover(dec!(30.00)));
        assert!(!account.can_cover(dec!(30.01)));
    }

    #[test]
    fn test_apply_delta_keeps_scale() {
        let mut account = Account::new(Uuid::new_v4(), AccountType::Current, dec!(10.00));
        account.apply_delta(dec!(-2.5));
        assert_eq!(account.balance, dec!(7.50));
        assert_eq!(account.balance.scale(), 2);
    }
}
