//! Core type definitions for the dual-write migrator.
//!
//! This crate defines the store-agnostic types shared by every other part
//! of the migrator:
//! - [`Entity`]: the row contract every migrated type satisfies
//! - [`Pattern`] and [`PatternCell`]: the dual-write stage and its shared handle
//! - [`InconsistentEvent`]: a detected mismatch between the two stores

mod entity;
mod event;
mod pattern;

pub use entity::Entity;
pub use event::{Direction, InconsistencyType, InconsistentEvent};
pub use pattern::{Pattern, PatternCell};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown pattern: {0}")]
    UnknownPattern(String),
}
