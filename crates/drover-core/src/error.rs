use thiserror::Error;

use crate::job::{Collection, JobId};

/// Core error type for Drover operations.
#[derive(Error, Debug)]
pub enum DroverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("No {collection} entry with id {job_id} in queue '{queue}'")]
    IdentityMismatch {
        queue: String,
        collection: Collection,
        job_id: JobId,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DroverError {
    /// Whether the error is a transient store failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreUnavailable(_) => true,
            Self::Sql(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                // serialization_failure / deadlock_detected
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Whether a job that failed with this error may be retried.
    pub fn is_retryable_job_error(&self) -> bool {
        !matches!(self, Self::MalformedPayload(_))
    }
}

impl From<serde_json::Error> for DroverError {
    fn from(e: serde_json::Error) -> Self {
        DroverError::Serialization(e.to_string())
    }
}

/// Result type alias using DroverError.
pub type Result<T> = std::result::Result<T, DroverError>;
