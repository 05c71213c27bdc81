//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The query matched no row.
    #[error("record not found")]
    NotFound,

    /// A pattern name or value outside the known stages.
    #[error("unknown pattern: {0}")]
    UnknownPattern(String),

    /// Operation the pool refuses to perform.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A column could not be converted to the requested type.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// The call did not finish within its time box.
    #[error("operation timed out")]
    Timeout,

    /// The blocking task running the call failed.
    #[error("task error: {0}")]
    Task(String),
}

impl DbError {
    /// Whether this is the expected "no such row" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Sqlite(rusqlite::Error::QueryReturnedNoRows)
        )
    }
}

impl From<migrator_types::Error> for DbError {
    fn from(err: migrator_types::Error) -> Self {
        match err {
            migrator_types::Error::UnknownPattern(name) => Self::UnknownPattern(name),
            other => Self::Conversion(other.to_string()),
        }
    }
}
