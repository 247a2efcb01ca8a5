//! Error types for the conversation subsystem.

use std::time::Duration;

use thiserror::Error;

use crate::execution::ExecutionError;

/// Local key-value persistence error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error on the backing files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Key is not usable as a storage name.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Convenience result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Transcript store error.
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// Amend operation on an empty transcript.
    #[error("transcript is empty; nothing to amend")]
    Empty,
    /// Persisted transcript could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Backing storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience result alias for transcript operations.
pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// Session manager error.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A previous run stayed in progress past the wait bound.
    #[error("timeout waiting for active run {run_id} to complete after {waited:?}")]
    ActiveRunTimeout {
        /// The run that never left `in_progress`.
        run_id: String,
        /// How long we waited.
        waited: Duration,
    },
    /// The execution service failed.
    #[error("execution service error: {0}")]
    Execution(#[from] ExecutionError),
    /// Thread identity cache failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
