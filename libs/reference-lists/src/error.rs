use crate::models::RecordRef;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No reference lists found for establishment '{establishment_id}'")]
    NotFound { establishment_id: String },

    #[error("Reference lists already initialized for establishment '{establishment_id}'")]
    AlreadyExists { establishment_id: String },

    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Value '{value}' already exists in list '{list_key}'")]
    DuplicateValue { list_key: String, value: String },

    #[error(
        "Cannot delete '{value}' from list '{list_key}': still referenced by {count} record(s)"
    )]
    ReferentialBlock {
        list_key: String,
        value: String,
        count: usize,
        /// A few of the referencing records, for display.
        sample: Vec<RecordRef>,
    },

    #[error("{} record(s) were not updated by the cascade", unapplied.len())]
    BatchWriteFailure { unapplied: Vec<RecordRef> },

    #[error("Item '{value}' not found in list '{list_key}'")]
    ItemNotFound { list_key: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors raised before any write happens (nothing to reconcile).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::AlreadyExists { .. }
                | Error::DuplicateValue { .. }
                | Error::ReferentialBlock { .. }
                | Error::ItemNotFound { .. }
                | Error::Validation(_)
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
