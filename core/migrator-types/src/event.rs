//! Inconsistency events raised by the validator and consumed by the fixer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which store is authoritative when repairing an inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The source store is authoritative; repair the destination.
    ToTarget,
    /// The destination store is authoritative; repair the source.
    ToBase,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToTarget => write!(f, "to_target"),
            Self::ToBase => write!(f, "to_base"),
        }
    }
}

/// Kind of divergence detected for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyType {
    /// Row exists in base but not in target.
    TargetMissing,
    /// Row exists in target but not in base.
    BaseMissing,
    /// Row exists in both but the values differ.
    NotEqual,
}

impl fmt::Display for InconsistencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetMissing => write!(f, "target_missing"),
            Self::BaseMissing => write!(f, "base_missing"),
            Self::NotEqual => write!(f, "not_equal"),
        }
    }
}

/// A detected mismatch for one row id. Transient; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InconsistentEvent {
    pub id: i64,
    pub direction: Direction,
    #[serde(rename = "type")]
    pub kind: InconsistencyType,
}

impl InconsistentEvent {
    #[must_use]
    pub const fn new(id: i64, direction: Direction, kind: InconsistencyType) -> Self {
        Self {
            id,
            direction,
            kind,
        }
    }

    /// Serializes the event into its bus payload.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an event from its bus payload.
    pub fn from_json(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
