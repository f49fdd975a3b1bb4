use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::events::types::{self, MovementCompleted};
use crate::models::{
    Account, Audit, LedgerEntry, MovementType, OutboxEvent, Transaction, TransactionStatus,
    MONEY_SCALE,
};

/// Actor recorded on audit rows written by the ledger engine.
pub const LEDGER_ACTOR: &str = "ledger-engine";

/// A requested money movement, before any validation or storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRequest {
    pub movement_type: MovementType,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub amount: Decimal,
}

impl MovementRequest {
    pub fn deposit(to_account_id: Uuid, amount: Decimal) -> Self {
        Self {
            movement_type: MovementType::Credit,
            from_account_id: None,
            to_account_id: Some(to_account_id),
            amount,
        }
    }

    pub fn withdrawal(from_account_id: Uuid, amount: Decimal) -> Self {
        Self {
            movement_type: MovementType::Debit,
            from_account_id: Some(from_account_id),
            to_account_id: None,
            amount,
        }
    }

    pub fn transfer(from_account_id: Uuid, to_account_id: Uuid, amount: Decimal) -> Self {
        Self {
            movement_type: MovementType::Transfer,
            from_account_id: Some(from_account_id),
            to_account_id: Some(to_account_id),
            amount,
        }
    }

    /// Fails fast on malformed requests, before touching storage.
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(AppError::InvalidMovement(
                "amount must be positive".to_string(),
            ));
        }
        if self.amount.round_dp(MONEY_SCALE) != self.amount {
            return Err(AppError::InvalidMovement(format!(
                "amount {} has more than {} fractional digits",
                self.amount, MONEY_SCALE
            )));
        }
        match self.movement_type {
            MovementType::Debit => {
                if self.from_account_id.is_none() || self.to_account_id.is_some() {
                    return Err(AppError::InvalidMovement(
                        "debit requires a source account and no destination".to_string(),
                    ));
                }
            }
            MovementType::Credit => {
                if self.to_account_id.is_none() || self.from_account_id.is_some() {
                    return Err(AppError::InvalidMovement(
                        "credit requires a destination account and no source".to_string(),
                    ));
                }
            }
            MovementType::Transfer => match (self.from_account_id, self.to_account_id) {
                (Some(from), Some(to)) if from == to => {
                    return Err(AppError::InvalidMovement(
                        "transfer source and destination must differ".to_string(),
                    ));
                }
                (Some(_), Some(_)) => {}
                _ => {
                    return Err(AppError::InvalidMovement(
                        "transfer requires both source and destination accounts".to_string(),
                    ));
                }
            },
        }
        Ok(())
    }

    /// The requested amount at the fixed monetary scale.
    pub fn normalized_amount(&self) -> Decimal {
        let mut amount = self.amount;
        amount.rescale(MONEY_SCALE);
        amount
    }
}

/// Caller-visible result of a movement attempt.
///
/// Every attempt yields a reference id, successful or not; insufficient
/// balance is a `Failed` status here, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub status: TransactionStatus,
    pub reference_id: String,
}

/// A validated movement with its pending transaction row, ready for the
/// store's atomic unit. Each retry builds a fresh plan (and reference id).
#[derive(Debug, Clone)]
pub struct MovementPlan {
    pub request: MovementRequest,
    pub transaction: Transaction,
}

/// Balances observed inside the atomic unit, before and after mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceSnapshot {
    pub from_before: Option<Decimal>,
    pub to_before: Option<Decimal>,
    pub from_after: Option<Decimal>,
    pub to_after: Option<Decimal>,
}

/// Rows the store persists atomically for a successful movement.
#[derive(Debug, Clone)]
pub struct CommittedMovement {
    pub transaction: Transaction,
    pub entry: LedgerEntry,
    pub outbox: OutboxEvent,
    pub audit: Audit,
}

/// Rows the store persists for an insufficient-balance rejection. The
/// failed attempt is part of the ledger history; no balance is touched and
/// no outbox event exists for it.
#[derive(Debug, Clone)]
pub struct RejectedMovement {
    pub transaction: Transaction,
    pub audit: Audit,
}

/// What the store hands back after its atomic unit commits.
#[derive(Debug, Clone)]
pub struct AppliedMovement {
    pub transaction: Transaction,
    pub entry: Option<LedgerEntry>,
    /// Post-mutation state of every account the movement touched, for
    /// write-through cache refresh. Empty on rejection.
    pub accounts: Vec<Account>,
}

impl MovementPlan {
    pub fn new(request: &MovementRequest) -> Self {
        let request = MovementRequest {
            amount: request.normalized_amount(),
            ..request.clone()
        };
        let transaction = Transaction::new(
            request.movement_type,
            request.from_account_id,
            request.to_account_id,
            request.amount,
        );
        Self { request, transaction }
    }

    /// Involved account ids in ascending order: the lock-acquisition order
    /// that keeps concurrent transfers deadlock-free.
    pub fn lock_order(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .request
            .from_account_id
            .into_iter()
            .chain(self.request.to_account_id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Assembles the rows for a successful commit.
    pub fn committed(self, balances: BalanceSnapshot) -> Result<CommittedMovement> {
        let transaction = self.transaction.with_status(TransactionStatus::Success);

        let entry = LedgerEntry::new(
            transaction.reference_id.clone(),
            transaction.movement_type,
            transaction.from_account_id,
            transaction.to_account_id,
            transaction.amount,
            balances.from_after,
            balances.to_after,
            format!("{:?} of {}", transaction.movement_type, transaction.amount),
        );

        let payload = serde_json::to_value(MovementCompleted {
            reference_id: transaction.reference_id.clone(),
            movement_type: transaction.movement_type,
            amount: transaction.amount,
            from_account_id: transaction.from_account_id,
            to_account_id: transaction.to_account_id,
            occurred_at: transaction.created_at,
        })?;

        let outbox = OutboxEvent::new(
            types::AGGREGATE_TRANSACTION,
            transaction.reference_id.clone(),
            types::EVENT_TRANSACTION_SUCCESS,
            payload,
        );

        let audit = Audit::new(
            types::AGGREGATE_TRANSACTION,
            transaction.reference_id.clone(),
            "MOVEMENT_APPLIED",
            LEDGER_ACTOR,
            Some(serde_json::json!({
                "fromBalance": balances.from_before,
                "toBalance": balances.to_before,
            })),
            Some(serde_json::json!({
                "fromBalance": balances.from_after,
                "toBalance": balances.to_after,
                "status": transaction.status,
            })),
        );

        Ok(CommittedMovement {
            transaction,
            entry,
            outbox,
            audit,
        })
    }

    /// Assembles the rows for an insufficient-balance rejection.
    pub fn rejected(self, available: Decimal) -> RejectedMovement {
        let transaction = self.transaction.with_status(TransactionStatus::Failed);

        let audit = Audit::new(
            types::AGGREGATE_TRANSACTION,
            transaction.reference_id.clone(),
            "MOVEMENT_REJECTED",
            LEDGER_ACTOR,
            Some(serde_json::json!({ "balance": available })),
            Some(serde_json::json!({
                "status": transaction.status,
                "requested": transaction.amount,
                "available": available,
            })),
        );

        RejectedMovement { transaction, audit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutboxStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_rejects_non_positive_amounts() {
        let request = MovementRequest::deposit(Uuid::new_v4(), dec!(0));
        assert!(matches!(
            request.validate(),
            Err(AppError::InvalidMovement(_))
        ));

        let request = MovementRequest::deposit(Uuid::new_v4(), dec!(-5.00));
        assert!(matches!(
            request.validate(),
            Err(AppError::InvalidMovement(_))
        ));
    }

    #[test]
    fn test_validate_rejects_sub_cent_precision() {
        let request = MovementRequest::deposit(Uuid::new_v4(), dec!(1.005));
        assert!(matches!(
            request.validate(),
            Err(AppError::InvalidMovement(_))
        ));
    }

    #[test]
    fn test_validate_rejects_self_transfer() {
        let account = Uuid::new_v4();
        let request = MovementRequest::transfer(account, account, dec!(10.00));
        assert!(matches!(
            request.validate(),
            Err(AppError::InvalidMovement(_))
        ));
    }

    #[test]
    fn test_validate_accepts_well_formed_requests() {
        assert!(MovementRequest::deposit(Uuid::new_v4(), dec!(100.00))
            .validate()
            .is_ok());
        assert!(MovementRequest::withdrawal(Uuid::new_v4(), dec!(0.01))
            .validate()
            .is_ok());
        assert!(
            MovementRequest::transfer(Uuid::new_v4(), Uuid::new_v4(), dec!(20))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_lock_order_is_ascending() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let plan = MovementPlan::new(&MovementRequest::transfer(a, b, dec!(1.00)));
        let order = plan.lock_order();
        assert_eq!(order.len(), 2);
        assert!(order[0] < order[1]);

        // Same ids in either direction lock in the same order.
        let reverse = MovementPlan::new(&MovementRequest::transfer(b, a, dec!(1.00)));
        assert_eq!(reverse.lock_order(), order);
    }

    #[test]
    fn test_committed_rows_share_the_reference_id() {
        let plan = MovementPlan::new(&MovementRequest::transfer(
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec!(20.00),
        ));
        let reference_id = plan.transaction.reference_id.clone();

        let committed = plan
            .committed(BalanceSnapshot {
                from_before: Some(dec!(100.00)),
                to_before: Some(dec!(10.00)),
                from_after: Some(dec!(80.00)),
                to_after: Some(dec!(30.00)),
            })
            .unwrap();

        assert_eq!(committed.transaction.status, TransactionStatus::Success);
        assert_eq!(committed.entry.reference_id, reference_id);
        assert_eq!(committed.outbox.aggregate_id, reference_id);
        assert_eq!(committed.outbox.status, OutboxStatus::Pending);
        assert_eq!(committed.audit.entity_id, reference_id);
        assert_eq!(committed.outbox.payload["referenceId"], reference_id);
    }

    #[test]
    fn test_rejected_rows_carry_failed_status_and_no_outbox() {
        let plan = MovementPlan::new(&MovementRequest::withdrawal(Uuid::new_v4(), dec!(50.00)));
        let rejected = plan.rejected(dec!(30.00));

        assert_eq!(rejected.transaction.status, TransactionStatus::Failed);
        assert_eq!(rejected.audit.action, "MOVEMENT_REJECTED");
        assert_eq!(
            rejected.audit.new_value.as_ref().unwrap()["available"],
            serde_json::json!(dec!(30.00))
        );
    }

    #[test]
    fn test_plan_normalizes_amount_scale() {
        let plan = MovementPlan::new(&MovementRequest::deposit(Uuid::new_v4(), dec!(100)));
        assert_eq!(plan.transaction.amount, dec!(100.00));
        assert_eq!(plan.transaction.amount.scale(), 2);
    }
}
