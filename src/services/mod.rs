pub mod accounts;
pub mod ledger;
pub mod movement;

pub use accounts::{AccountService, OpenAccountRequest};
pub use ledger::LedgerEngine;
pub use movement::{MovementOutcome, MovementRequest};
