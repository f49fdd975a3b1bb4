use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only compliance record of a ledger decision.
///
/// Written for every decision, including rejections. Never mutated or
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Audit {
    pub id: Uuid,
    /// Entity the record is about, e.g. "Transaction" or "Account".
    pub entity_name: String,
    pub entity_id: String,
    /// What happened, e.g. "MOVEMENT_APPLIED", "MOVEMENT_REJECTED", "CREATE".
    pub action: String,
    pub changed_by: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Audit {
    pub fn new(
        entity_name: impl Into<String>,
        entity_id: impl Into<String>,
        action: impl Into<String>,
        changed_by: impl Into<String>,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_name: entity_name.into(),
            entity_id: entity_id.into(),
            action: action.into(),
            changed_by: changed_by.into(),
            old_value,
            new_value,
            timestamp: Utc::now(),
        }
    }
}
