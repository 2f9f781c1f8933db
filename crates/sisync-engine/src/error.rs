//! Engine error type.

use thiserror::Error;

/// Errors surfaced by the reconciliation engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The LMS data store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(String),

    /// The SIS client failed in a way that is fatal for the whole run.
    ///
    /// Per-course fetch failures are handled inside the sync loop and never
    /// reach this variant.
    #[error(transparent)]
    Client(#[from] sisync_client::SisError),
}

impl SyncError {
    /// Convenience constructor for store failures.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
