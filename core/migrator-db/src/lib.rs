//! Connection pools and dual-write routing for the migrator.
//!
//! # Architecture
//!
//! - [`ConnPool`] / [`Tx`]: the store contract every backing store exposes
//! - [`SqlitePool`]: a rusqlite-backed implementation of that contract
//! - [`DualWritePool`]: a pool that routes writes to one or two underlying
//!   pools according to the current [`Pattern`](migrator_types::Pattern)
//! - [`Record`]: maps an [`Entity`](migrator_types::Entity) onto a table
//!
//! Secondary-store failures under dual write are handed to a single
//! [`SecondaryFailurePolicy`] and never reach the caller.

mod dual;
mod error;
mod policy;
mod pool;
mod record;
mod row;
mod sqlite;

pub use dual::{DualWritePool, DualWriteTx};
pub use error::{DbError, DbResult};
pub use policy::{LogSecondaryFailure, SecondaryFailure, SecondaryFailurePolicy, SecondaryOp};
pub use pool::{ConnPool, Tx, TxOptions};
pub use record::{Record, find_by_id};
pub use row::{Row, Rows};
pub use rusqlite::types::Value;
pub use sqlite::{SqlitePool, SqliteTx};
