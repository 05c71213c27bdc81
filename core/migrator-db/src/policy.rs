//! What happens when the non-authoritative store fails under dual write.

use crate::error::DbError;
use migrator_types::Pattern;
use std::fmt;
use tracing::warn;

/// The secondary-store call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryOp {
    Exec,
    Commit,
    Rollback,
}

impl fmt::Display for SecondaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Details of one swallowed secondary-store failure.
#[derive(Debug)]
pub struct SecondaryFailure<'a> {
    pub op: SecondaryOp,
    pub pattern: Pattern,
    /// Statement text for `Exec` failures.
    pub sql: Option<&'a str>,
    pub error: &'a DbError,
}

/// Receives every secondary-store failure. The authoritative store's
/// outcome is the only thing returned to callers; this hook is where
/// the other store's failures go instead.
pub trait SecondaryFailurePolicy: Send + Sync {
    fn on_secondary_failure(&self, failure: &SecondaryFailure<'_>);
}

/// Default policy: log at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSecondaryFailure;

impl SecondaryFailurePolicy for LogSecondaryFailure {
    fn on_secondary_failure(&self, failure: &SecondaryFailure<'_>) {
        warn!(
            op = %failure.op,
            pattern = %failure.pattern,
            sql = failure.sql.unwrap_or(""),
            error = %failure.error,
            "secondary store call failed"
        );
    }
}
