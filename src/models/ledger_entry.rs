use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::MovementType;

/// Immutable post-commit snapshot tied 1:1 to a successful transaction.
///
/// Records the balance of each involved account at the moment of commit,
/// for reconciliation. Never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub reference_id: String,
    #[sqlx(rename = "type")]
    pub movement_type: MovementType,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
    /// Source balance after the debit, when a source was involved.
    pub from_balance_after: Option<Decimal>,
    /// Destination balance after the credit, when a destination was involved.
    pub to_balance_after: Option<Decimal>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        reference_id: String,
        movement_type: MovementType,
        from_account_id: Option<Uuid>,
        to_account_id: Option<Uuid>,
        amount: Decimal,
        from_balance_after: Option<Decimal>,
        to_balance_after: Option<Decimal>,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference_id,
            movement_type,
            from_account_id,
            to_account_id,
            amount,
            from_balance_after,
            to_balance_after,
            description,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transfer_entry_snapshots_both_sides() {
        let entry = LedgerEntry::new(
            "TXN-20260825120000-1234".to_string(),
            MovementType::Transfer,
            Some(Uuid::new_v4()),
            Some(Uuid::new_v4()),
            dec!(20.00),
            Some(dec!(80.00)),
            Some(dec!(30.00)),
            "transfer".to_string(),
        );
        assert_eq!(entry.from_balance_after, Some(dec!(80.00)));
        assert_eq!(entry.to_balance_after, Some(dec!(30.00)));
    }

    #[test]
    fn test_credit_entry_has_no_source_snapshot() {
        let entry = LedgerEntry::new(
            "TXN-20260825120000-5678".to_string(),
            MovementType::Credit,
            None,
            Some(Uuid::new_v4()),
            dec!(100.00),
            None,
            Some(dec!(100.00)),
            "deposit".to_string(),
        );
        assert!(entry.from_account_id.is_none());
        assert!(entry.from_balance_after.is_none());
    }
}
