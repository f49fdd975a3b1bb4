use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Account, Audit, LedgerEntry, OutboxEvent, Transaction};
use crate::services::movement::{AppliedMovement, BalanceSnapshot, MovementPlan};
use crate::store::{LedgerStore, OutboxAttempt};

const ACCOUNT_COLUMNS: &str =
    "id, account_number, type, balance, customer_id, created_at, updated_at";
const TRANSACTION_COLUMNS: &str =
    "id, reference_id, type, status, from_account_id, to_account_id, amount, created_at";
const OUTBOX_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at, last_attempt_at, sent_at";

/// Postgres-backed ledger store.
///
/// Each movement runs in one database transaction. Involved account rows
/// are locked with `FOR UPDATE` in ascending id order, so two concurrent
/// transfers over the same pair can never deadlock and never read a stale
/// balance between the check and the mutate.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps unique-constraint and serialization failures to a retryable
/// conflict; everything else stays a database error.
fn map_write_err(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if code == "23505" {
                return AppError::Conflict(format!("unique constraint violated: {}", db.message()));
            }
            if code == "40001" || code == "40P01" {
                return AppError::Conflict(format!("transaction conflict: {}", db.message()));
            }
        }
    }
    AppError::Database(err)
}

async fn insert_transaction(
    tx: &mut PgTransaction<'_, Postgres>,
    transaction: &Transaction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, reference_id, type, status, from_account_id, to_account_id, amount, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(transaction.id)
    .bind(&transaction.reference_id)
    .bind(transaction.movement_type)
    .bind(transaction.status)
    .bind(transaction.from_account_id)
    .bind(transaction.to_account_id)
    .bind(transaction.amount)
    .bind(transaction.created_at)
    .execute(&mut **tx)
    .await
    .map_err(map_write_err)?;
    Ok(())
}

async fn insert_ledger_entry(
    tx: &mut PgTransaction<'_, Postgres>,
    entry: &LedgerEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (id, reference_id, type, from_account_id, to_account_id, amount, from_balance_after, to_balance_after, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.reference_id)
    .bind(entry.movement_type)
    .bind(entry.from_account_id)
    .bind(entry.to_account_id)
    .bind(entry.amount)
    .bind(entry.from_balance_after)
    .bind(entry.to_balance_after)
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await
    .map_err(map_write_err)?;
    Ok(())
}

async fn insert_outbox_event(
    tx: &mut PgTransaction<'_, Postgres>,
    event: &OutboxEvent,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events (id, aggregate_type, aggregate_id, event_type, payload, status, attempts, created_at, last_attempt_at, sent_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(event.id)
    .bind(&event.aggregate_type)
    .bind(&event.aggregate_id)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(event.status)
    .bind(event.attempts)
    .bind(event.created_at)
    .bind(event.last_attempt_at)
    .bind(event.sent_at)
    .execute(&mut **tx)
    .await
    .map_err(map_write_err)?;
    Ok(())
}

async fn insert_audit(tx: &mut PgTransaction<'_, Postgres>, audit: &Audit) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_name, entity_id, action, changed_by, old_value, new_value, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(audit.id)
    .bind(&audit.entity_name)
    .bind(&audit.entity_id)
    .bind(&audit.action)
    .bind(&audit.changed_by)
    .bind(&audit.old_value)
    .bind(&audit.new_value)
    .bind(audit.timestamp)
    .execute(&mut **tx)
    .await
    .map_err(map_write_err)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_account(
        &self,
        account: Account,
        event: OutboxEvent,
        audit: Audit,
    ) -> Result<Account> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (id, account_number, type, balance, customer_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(account.id)
        .bind(&account.account_number)
        .bind(account.account_type)
        .bind(account.balance)
        .bind(account.customer_id)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_err)?;

        insert_outbox_event(&mut tx, &event).await?;
        insert_audit(&mut tx, &audit).await?;

        tx.commit().await?;
        Ok(row)
    }

    async fn account(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn account_by_number(&self, account_number: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1"
        ))
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn transaction_by_reference(&self, reference_id: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference_id = $1"
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn apply_movement(&self, plan: MovementPlan) -> Result<AppliedMovement> {
        let mut tx = self.pool.begin().await?;

        // Lock involved rows in ascending id order.
        let mut locked: HashMap<Uuid, Account> = HashMap::new();
        for id in plan.lock_order() {
            let account = sqlx::query_as::<_, Account>(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
            ))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("account '{}' not found", id)))?;
            locked.insert(id, account);
        }

        let amount = plan.transaction.amount;
        let from_id = plan.request.from_account_id;
        let to_id = plan.request.to_account_id;

        if let Some(from_id) = from_id {
            let available = locked[&from_id].balance;
            if available < amount {
                let rejected = plan.rejected(available);
                insert_transaction(&mut tx, &rejected.transaction).await?;
                insert_audit(&mut tx, &rejected.audit).await?;
                tx.commit().await?;
                return Ok(AppliedMovement {
                    transaction: rejected.transaction,
                    entry: None,
                    accounts: Vec::new(),
                });
            }
        }

        let mut balances = BalanceSnapshot::default();
        let mut touched = Vec::new();

        if let Some(from_id) = from_id {
            balances.from_before = Some(locked[&from_id].balance);
            let updated = sqlx::query_as::<_, Account>(&format!(
                r#"
                UPDATE accounts
                SET balance = balance - $2, updated_at = NOW()
                WHERE id = $1
                RETURNING {ACCOUNT_COLUMNS}
                "#
            ))
            .bind(from_id)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_write_err)?;
            balances.from_after = Some(updated.balance);
            touched.push(updated);
        }

        if let Some(to_id) = to_id {
            balances.to_before = Some(locked[&to_id].balance);
            let updated = sqlx::query_as::<_, Account>(&format!(
                r#"
                UPDATE accounts
                SET balance = balance + $2, updated_at = NOW()
                WHERE id = $1
                RETURNING {ACCOUNT_COLUMNS}
                "#
            ))
            .bind(to_id)
            .bind(amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_write_err)?;
            balances.to_after = Some(updated.balance);
            touched.push(updated);
        }

        let committed = plan.committed(balances)?;
        insert_transaction(&mut tx, &committed.transaction).await?;
        insert_ledger_entry(&mut tx, &committed.entry).await?;
        insert_outbox_event(&mut tx, &committed.outbox).await?;
        insert_audit(&mut tx, &committed.audit).await?;

        tx.commit().await?;

        Ok(AppliedMovement {
            transaction: committed.transaction,
            entry: Some(committed.entry),
            accounts: touched,
        })
    }

    async fn due_outbox_events(
        &self,
        limit: i64,
        base_backoff: std::time::Duration,
    ) -> Result<Vec<OutboxEvent>> {
        // Backoff mirrors OutboxEvent::is_due: base * 2^(attempts - 1),
        // exponent clamped to 16.
        let rows = sqlx::query_as::<_, OutboxEvent>(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS}
            FROM outbox_events
            WHERE status IN ('PENDING', 'FAILED')
              AND (
                  last_attempt_at IS NULL
                  OR last_attempt_at
                     + ($2 * interval '1 millisecond')
                     * power(2, LEAST(GREATEST(attempts - 1, 0), 16)) <= NOW()
              )
            ORDER BY created_at
            LIMIT $1
            "#
        ))
        .bind(limit)
        .bind(base_backoff.as_millis() as f64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record_outbox_attempt(
        &self,
        event_id: Uuid,
        outcome: OutboxAttempt,
    ) -> Result<OutboxEvent> {
        let query = match outcome {
            OutboxAttempt::Delivered => format!(
                r#"
                UPDATE outbox_events
                SET status = 'SUCCESS', attempts = attempts + 1, last_attempt_at = NOW(), sent_at = NOW()
                WHERE id = $1 AND status IN ('PENDING', 'FAILED')
                RETURNING {OUTBOX_COLUMNS}
                "#
            ),
            OutboxAttempt::Failed { exhausted: false } => format!(
                r#"
                UPDATE outbox_events
                SET status = 'FAILED', attempts = attempts + 1, last_attempt_at = NOW()
                WHERE id = $1 AND status IN ('PENDING', 'FAILED')
                RETURNING {OUTBOX_COLUMNS}
                "#
            ),
            OutboxAttempt::Failed { exhausted: true } => format!(
                r#"
                UPDATE outbox_events
                SET status = 'DEAD_LETTER', attempts = attempts + 1, last_attempt_at = NOW()
                WHERE id = $1 AND status IN ('PENDING', 'FAILED')
                RETURNING {OUTBOX_COLUMNS}
                "#
            ),
        };

        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "outbox event '{}' missing or already terminal",
                    event_id
                ))
            })
    }
}
