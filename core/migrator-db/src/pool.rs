//! The store contract shared by every connection pool.

use crate::error::DbResult;
use crate::row::{Row, Rows};
use rusqlite::types::Value;

/// Options for opening a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Take the write lock up front instead of on first write.
    pub immediate: bool,
}

/// A connection pool that can run statements and open transactions.
///
/// Implementations must be safe to call from any number of threads.
pub trait ConnPool: Send + Sync {
    /// Opens a transaction.
    fn begin_tx(&self, opts: TxOptions) -> DbResult<Box<dyn Tx>>;

    /// Executes a statement, returning the number of affected rows.
    fn exec(&self, sql: &str, args: &[Value]) -> DbResult<usize>;

    /// Runs a query and collects every row.
    fn query(&self, sql: &str, args: &[Value]) -> DbResult<Rows>;

    /// Runs a query expected to match at least one row.
    ///
    /// Returns [`DbError::NotFound`](crate::DbError::NotFound) when it matches none.
    fn query_row(&self, sql: &str, args: &[Value]) -> DbResult<Row> {
        self.query(sql, args)?.into_first()
    }

    /// Checks that a statement compiles against the store.
    fn prepare(&self, sql: &str) -> DbResult<()>;
}

/// An open transaction. Dropping it without commit rolls it back.
pub trait Tx: Send {
    fn exec(&mut self, sql: &str, args: &[Value]) -> DbResult<usize>;

    fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Rows>;

    fn query_row(&mut self, sql: &str, args: &[Value]) -> DbResult<Row> {
        self.query(sql, args)?.into_first()
    }

    fn commit(self: Box<Self>) -> DbResult<()>;

    fn rollback(self: Box<Self>) -> DbResult<()>;
}
