//! Shared test helpers for reconcile tests.

#![allow(dead_code)]

use async_trait::async_trait;
use migrator_db::{
    ConnPool, DbError, DbResult, Record, Row, Rows, SqlitePool, Tx, TxOptions, Value,
};
use migrator_reconcile::{InconsistentEventProducer, ReconcileResult, ValidatorConfig};
use migrator_types::{Entity, InconsistentEvent};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SCHEMA: &str = "CREATE TABLE items (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    score INTEGER NOT NULL DEFAULT 0,
    utime INTEGER NOT NULL
);";

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub score: i64,
    pub utime: i64,
}

impl Entity for Item {
    fn id(&self) -> i64 {
        self.id
    }

    fn equal(&self, other: &Self) -> bool {
        self == other
    }
}

impl Record for Item {
    const TABLE: &'static str = "items";

    fn from_row(row: &Row) -> DbResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            score: row.get("score")?,
            utime: row.get("utime")?,
        })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch(SCHEMA).unwrap();
    Arc::new(pool)
}

/// Fresh (src, dst) pair.
pub fn stores() -> (Arc<SqlitePool>, Arc<SqlitePool>) {
    (memory_pool(), memory_pool())
}

pub fn insert(pool: &SqlitePool, id: i64, name: &str, utime: i64) {
    pool.exec(
        "INSERT INTO items (id, name, utime) VALUES (?1, ?2, ?3)",
        &[
            Value::Integer(id),
            Value::Text(name.into()),
            Value::Integer(utime),
        ],
    )
    .unwrap();
}

pub fn all_items(pool: &SqlitePool) -> Vec<Item> {
    pool.query("SELECT * FROM items ORDER BY id", &[])
        .unwrap()
        .iter()
        .map(|r| Item::from_row(r).unwrap())
        .collect()
}

/// Test settings: tiny backoff so retries do not slow the suite down.
pub fn fast_config() -> ValidatorConfig {
    ValidatorConfig {
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        ..ValidatorConfig::default()
    }
}

/// Producer that keeps every event it is given.
#[derive(Default)]
pub struct RecordingProducer {
    events: Mutex<Vec<InconsistentEvent>>,
}

impl RecordingProducer {
    pub fn events(&self) -> Vec<InconsistentEvent> {
        let mut events = self.events.lock().unwrap().clone();
        events.sort_by_key(|e| (e.id, e.kind as u8));
        events
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Polls until at least `n` events arrived or two seconds pass.
    pub async fn wait_for(&self, n: usize) -> Vec<InconsistentEvent> {
        for _ in 0..200 {
            if self.events.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.events()
    }
}

#[async_trait]
impl InconsistentEventProducer for RecordingProducer {
    async fn produce_inconsistent_event(&self, evt: InconsistentEvent) -> ReconcileResult<()> {
        self.events.lock().unwrap().push(evt);
        Ok(())
    }
}

/// Pool whose first `failures` queries fail.
pub struct FlakyPool {
    inner: Arc<SqlitePool>,
    failures: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FlakyPool {
    pub fn new(inner: Arc<SqlitePool>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        })
    }
}

impl ConnPool for FlakyPool {
    fn begin_tx(&self, opts: TxOptions) -> DbResult<Box<dyn Tx>> {
        self.inner.begin_tx(opts)
    }

    fn exec(&self, sql: &str, args: &[Value]) -> DbResult<usize> {
        self.inner.exec(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DbError::Task("flaky store".into()));
        }
        self.inner.query(sql, args)
    }

    fn prepare(&self, sql: &str) -> DbResult<()> {
        self.inner.prepare(sql)
    }
}

/// Pool whose queries hang before answering until released.
pub struct SlowPool {
    inner: Arc<SqlitePool>,
    delay_ms: AtomicU64,
    pub calls: AtomicUsize,
}

impl SlowPool {
    pub fn new(inner: Arc<SqlitePool>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
            calls: AtomicUsize::new(0),
        })
    }

    /// Later queries answer immediately.
    pub fn release(&self) {
        self.delay_ms.store(0, Ordering::SeqCst);
    }
}

impl ConnPool for SlowPool {
    fn begin_tx(&self, opts: TxOptions) -> DbResult<Box<dyn Tx>> {
        self.inner.begin_tx(opts)
    }

    fn exec(&self, sql: &str, args: &[Value]) -> DbResult<usize> {
        self.inner.exec(sql, args)
    }

    fn query(&self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(self.delay_ms.load(Ordering::SeqCst)));
        self.inner.query(sql, args)
    }

    fn prepare(&self, sql: &str) -> DbResult<()> {
        self.inner.prepare(sql)
    }
}
