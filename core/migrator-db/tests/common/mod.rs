//! Shared test helpers for store tests.

#![allow(dead_code)]

use migrator_db::{
    ConnPool, DbError, DbResult, Rows, SecondaryFailure, SecondaryFailurePolicy, SecondaryOp,
    SqlitePool, Tx, TxOptions, Value,
};
use migrator_types::Pattern;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const SCHEMA: &str = "CREATE TABLE items (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    utime INTEGER NOT NULL
);";

pub fn memory_pool() -> SqlitePool {
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch(SCHEMA).unwrap();
    pool
}

pub fn injected() -> DbError {
    DbError::Task("injected failure".into())
}

/// Call counters shared between a [`ScriptedPool`] and its transactions.
#[derive(Debug, Default)]
pub struct Counters {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub execs: AtomicUsize,
    pub queries: AtomicUsize,
}

impl Counters {
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Wraps an in-memory pool, counting calls and failing on demand.
#[derive(Default)]
pub struct Faults {
    pub begin: AtomicBool,
    /// Milliseconds to hold the connection after opening a transaction.
    pub begin_delay_ms: AtomicUsize,
    pub exec: AtomicBool,
    pub commit: AtomicBool,
    pub rollback: AtomicBool,
}

pub struct ScriptedPool {
    pub inner: SqlitePool,
    pub counters: Arc<Counters>,
    pub faults: Arc<Faults>,
}

impl ScriptedPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: memory_pool(),
            counters: Arc::default(),
            faults: Arc::default(),
        })
    }

    pub fn fail_begin(&self) {
        self.faults.begin.store(true, Ordering::SeqCst);
    }
    /// Keeps the connection locked for `delay` before `begin_tx` returns.
    pub fn delay_begin(&self, delay: Duration) {
        self.faults
            .begin_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }
    pub fn fail_exec(&self) {
        self.faults.exec.store(true, Ordering::SeqCst);
    }
    pub fn fail_commit(&self) {
        self.faults.commit.store(true, Ordering::SeqCst);
    }
    pub fn fail_rollback(&self) {
        self.faults.rollback.store(true, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .query("SELECT name FROM items ORDER BY id", &[])
            .unwrap()
            .iter()
            .map(|r| r.get::<String>("name").unwrap())
            .collect()
    }
}

impl ConnPool for ScriptedPool {
    fn begin_tx(&self, opts: TxOptions) -> DbResult<Box<dyn Tx>> {
        if self.faults.begin.load(Ordering::SeqCst) {
            return Err(injected());
        }
        let inner = self.inner.begin_tx(opts)?;
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        let delay = self.faults.begin_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            thread::sleep(Duration::from_millis(delay as u64));
        }
        Ok(Box::new(ScriptedTx {
            inner,
            counters: Arc::clone(&self.counters),
            faults: Arc::clone(&self.faults),
        }))
    }

    fn exec(&self, sql: &str, args: &[Value]) -> DbResult<usize> {
        self.counters.execs.fetch_add(1, Ordering::SeqCst);
        if self.faults.exec.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.exec(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, args)
    }

    fn prepare(&self, sql: &str) -> DbResult<()> {
        self.inner.prepare(sql)
    }
}

pub struct ScriptedTx {
    inner: Box<dyn Tx>,
    counters: Arc<Counters>,
    faults: Arc<Faults>,
}

impl Tx for ScriptedTx {
    fn exec(&mut self, sql: &str, args: &[Value]) -> DbResult<usize> {
        self.counters.execs.fetch_add(1, Ordering::SeqCst);
        if self.faults.exec.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.exec(sql, args)
    }

    fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, args)
    }

    fn commit(self: Box<Self>) -> DbResult<()> {
        if self.faults.commit.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> DbResult<()> {
        if self.faults.rollback.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback()
    }
}

/// Failure policy that remembers what it was told.
#[derive(Default)]
pub struct RecordingPolicy {
    pub seen: Mutex<Vec<(SecondaryOp, Pattern)>>,
}

impl RecordingPolicy {
    pub fn ops(&self) -> Vec<(SecondaryOp, Pattern)> {
        self.seen.lock().unwrap().clone()
    }
}

impl SecondaryFailurePolicy for RecordingPolicy {
    fn on_secondary_failure(&self, failure: &SecondaryFailure<'_>) {
        self.seen
            .lock()
            .unwrap()
            .push((failure.op, failure.pattern));
    }
}
