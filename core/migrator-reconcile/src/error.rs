//! Error types for validation and repair.

use migrator_db::DbError;
use thiserror::Error;

/// Result type for reconcile operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors that can occur while validating or repairing.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Store error.
    #[error("store error: {0}")]
    Db(#[from] DbError),

    /// Event payload could not be encoded or decoded.
    #[error("event payload error: {0}")]
    Payload(#[from] migrator_types::Error),

    /// The event bus has no receiver left.
    #[error("channel closed")]
    ChannelClosed,

    /// A time-boxed call overran.
    #[error("operation timed out")]
    Timeout,

    /// The run was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// A blocking task panicked or was aborted.
    #[error("task error: {0}")]
    Task(String),
}

impl ReconcileError {
    /// Whether this wraps the store's "no such row" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Db(e) if e.is_not_found())
    }
}
