//! Dual-write stages and the atomic cell that publishes the current one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// The migration stage controlling which store(s) receive writes.
///
/// Stages are ordered: a migration walks from `SrcOnly` to `DstOnly`.
/// In the two dual stages the first-named store is authoritative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Pattern {
    #[default]
    SrcOnly = 0,
    SrcFirst = 1,
    DstFirst = 2,
    DstOnly = 3,
}

impl Pattern {
    /// All stages in migration order.
    pub const ALL: [Pattern; 4] = [
        Pattern::SrcOnly,
        Pattern::SrcFirst,
        Pattern::DstFirst,
        Pattern::DstOnly,
    ];

    /// The following stage, clamped at `DstOnly`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::SrcOnly => Self::SrcFirst,
            Self::SrcFirst => Self::DstFirst,
            Self::DstFirst | Self::DstOnly => Self::DstOnly,
        }
    }

    /// The preceding stage, clamped at `SrcOnly`.
    #[must_use]
    pub const fn prev(self) -> Self {
        match self {
            Self::SrcOnly | Self::SrcFirst => Self::SrcOnly,
            Self::DstFirst => Self::SrcFirst,
            Self::DstOnly => Self::DstFirst,
        }
    }

    /// Whether writes go to both stores.
    #[must_use]
    pub const fn is_dual(self) -> bool {
        matches!(self, Self::SrcFirst | Self::DstFirst)
    }

    /// Whether the source store is the authoritative one.
    #[must_use]
    pub const fn src_is_primary(self) -> bool {
        matches!(self, Self::SrcOnly | Self::SrcFirst)
    }

    /// Stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SrcOnly => "src_only",
            Self::SrcFirst => "src_first",
            Self::DstFirst => "dst_first",
            Self::DstOnly => "dst_only",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| crate::Error::UnknownPattern(s.to_string()))
    }
}

impl TryFrom<u8> for Pattern {
    type Error = crate::Error;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .ok_or_else(|| crate::Error::UnknownPattern(raw.to_string()))
    }
}

/// Shared, lock-free handle to the current [`Pattern`].
///
/// The scheduler owns one and hands clones to every pool that routes
/// writes; all clones observe the same value.
#[derive(Debug, Clone, Default)]
pub struct PatternCell(Arc<AtomicU8>);

impl PatternCell {
    #[must_use]
    pub fn new(pattern: Pattern) -> Self {
        Self(Arc::new(AtomicU8::new(pattern as u8)))
    }

    pub fn load(&self) -> Pattern {
        // Only `store` writes the cell, so the raw value is always a valid stage.
        Pattern::try_from(self.0.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn store(&self, pattern: Pattern) {
        self.0.store(pattern as u8, Ordering::Release);
    }
}
