use thiserror::Error;

/// Application error taxonomy.
///
/// Business outcomes (a movement rejected for insufficient balance) are not
/// errors; they surface as a `Failed` status on the returned outcome. Errors
/// here are request-shape problems, missing entities, storage failures and
/// retryable conflicts.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed movement request: wrong account combination for the type,
    /// non-positive amount, or sub-cent precision. Rejected before any
    /// storage write.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// A referenced entity does not exist. Rejected before any storage write.
    #[error("not found: {0}")]
    NotFound(String),

    /// A non-movement request failed validation (e.g. negative initial
    /// balance on account opening).
    #[error("validation error: {0}")]
    Validation(String),

    /// A concurrent mutation or uniqueness violation invalidated the attempt.
    /// Callers retry the whole operation a bounded number of times.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("kafka error: {0}")]
    Kafka(#[from] rskafka::client::error::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
