//! The row contract every migrated type satisfies.

/// A row that takes part in a migration.
///
/// Implementors expose their primary key and a full value comparison. The
/// validator only ever compares two values of the same type, so `equal`
/// takes `&Self` rather than a trait object.
pub trait Entity {
    /// Primary key of the row.
    fn id(&self) -> i64;

    /// Returns true when every column of `self` matches `other`.
    fn equal(&self, other: &Self) -> bool;
}
