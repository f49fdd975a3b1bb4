pub mod account;
pub mod audit;
pub mod ledger_entry;
pub mod outbox_event;
pub mod transaction;

pub use account::{generate_account_number, Account, AccountType};
pub use audit::Audit;
pub use ledger_entry::LedgerEntry;
pub use outbox_event::{OutboxEvent, OutboxStatus};
pub use transaction::{generate_reference_id, MovementType, Transaction, TransactionStatus};

/// Fixed fractional scale for all monetary amounts.
pub const MONEY_SCALE: u32 = 2;
