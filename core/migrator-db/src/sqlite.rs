//! SQLite-backed connection pool.
//!
//! A single connection guarded by a mutex. An open transaction holds the
//! lock until it commits, rolls back, or is dropped, so statements from
//! other callers never interleave with it.

use crate::error::DbResult;
use crate::pool::{ConnPool, Tx, TxOptions};
use crate::row::{Row, Rows};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A rusqlite connection exposed through the [`ConnPool`] contract.
pub struct SqlitePool {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePool {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self::from_connection(path.display().to_string(), conn))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(":memory:", conn))
    }

    pub fn from_connection(name: impl Into<String>, conn: Connection) -> Self {
        Self {
            name: name.into(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Label used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs a batch of `;`-separated statements, typically schema setup.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}

impl fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePool").field("name", &self.name).finish()
    }
}

impl ConnPool for SqlitePool {
    fn begin_tx(&self, opts: TxOptions) -> DbResult<Box<dyn Tx>> {
        let conn = self.conn.lock_arc();
        let tx = SqliteTx::begin(conn, opts)?;
        debug!(pool = %self.name, "transaction opened");
        Ok(Box::new(tx))
    }

    fn exec(&self, sql: &str, args: &[Value]) -> DbResult<usize> {
        exec_on(&self.conn.lock(), sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        query_on(&self.conn.lock(), sql, args)
    }

    fn prepare(&self, sql: &str) -> DbResult<()> {
        self.conn.lock().prepare(sql)?;
        Ok(())
    }
}

/// A transaction holding the pool's connection until it finishes.
pub struct SqliteTx {
    conn: ArcMutexGuard<RawMutex, Connection>,
    finished: bool,
}

impl SqliteTx {
    fn begin(conn: ArcMutexGuard<RawMutex, Connection>, opts: TxOptions) -> DbResult<Self> {
        conn.execute_batch(if opts.immediate {
            "BEGIN IMMEDIATE"
        } else {
            "BEGIN DEFERRED"
        })?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    fn finish(mut self, sql: &str) -> DbResult<()> {
        self.conn.execute_batch(sql)?;
        self.finished = true;
        Ok(())
    }
}

impl Tx for SqliteTx {
    fn exec(&mut self, sql: &str, args: &[Value]) -> DbResult<usize> {
        exec_on(&self.conn, sql, args)
    }

    fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        query_on(&self.conn, sql, args)
    }

    fn commit(self: Box<Self>) -> DbResult<()> {
        (*self).finish("COMMIT")
    }

    fn rollback(self: Box<Self>) -> DbResult<()> {
        (*self).finish("ROLLBACK")
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

fn exec_on(conn: &Connection, sql: &str, args: &[Value]) -> DbResult<usize> {
    Ok(conn.execute(sql, params_from_iter(args.iter()))?)
}

fn query_on(conn: &Connection, sql: &str, args: &[Value]) -> DbResult<Rows> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>()
        .into();
    let width = columns.len();

    let mut rows = stmt.query(params_from_iter(args.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get::<_, Value>(i))
            .collect::<Result<Vec<_>, _>>()?;
        out.push(Row::new(Arc::clone(&columns), values));
    }
    Ok(Rows::new(columns, out))
}
