//! Error types for the workout pipeline and the sync step.

use thiserror::Error;

/// Per-record validation failures. A batch caller skips the record and moves on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid workout id {id:?}: must be 32 characters and not all zeros")]
    InvalidWorkoutId { id: String },

    #[error("workout {workout_id}: field `{field}` is not a timestamp: {value}")]
    InvalidTimestamp {
        workout_id: String,
        field: &'static str,
        value: String,
    },

    #[error("workout {workout_id}: malformed payload: {reason}")]
    MalformedPayload { workout_id: String, reason: String },
}

impl ValidationError {
    /// The workout id the error refers to, when one could be read.
    pub fn workout_id(&self) -> Option<&str> {
        let id = match self {
            ValidationError::InvalidWorkoutId { id } => id,
            ValidationError::InvalidTimestamp { workout_id, .. } => workout_id,
            ValidationError::MalformedPayload { workout_id, .. } => workout_id,
        };
        (!id.is_empty()).then_some(id.as_str())
    }
}

/// Errors surfaced by the pipeline driver and the sync step.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("provider error: {0}")]
    Provider(#[from] ride_ledger_client::ProviderError),

    #[error(
        "workout count mismatch: expected {expected} new workouts, found {found}; refusing to write"
    )]
    CountMismatch { expected: i64, found: usize },

    #[error("key collision on `{key}` in merge stage `{stage}`")]
    KeyCollision { key: String, stage: &'static str },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),
}

/// Result type alias for pipeline operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
