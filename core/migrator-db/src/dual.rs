//! Dual-write routing over two connection pools.

use crate::error::DbResult;
use crate::policy::{LogSecondaryFailure, SecondaryFailure, SecondaryFailurePolicy, SecondaryOp};
use crate::pool::{ConnPool, Tx, TxOptions};
use crate::row::{Row, Rows};
use migrator_types::{Pattern, PatternCell};
use rusqlite::types::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A pool that writes to the source store, the destination store, or both,
/// depending on the current [`Pattern`].
///
/// - `SrcOnly` / `DstOnly`: only the named store is touched.
/// - `SrcFirst` / `DstFirst`: the first-named store is authoritative and its
///   result is returned; writes are mirrored to the other store best-effort.
///
/// Reads always go to the authoritative store. The pattern is read from a
/// shared [`PatternCell`] on every call, so it can be switched while the
/// pool is in use.
pub struct DualWritePool {
    src: Arc<dyn ConnPool>,
    dst: Arc<dyn ConnPool>,
    pattern: PatternCell,
    policy: Arc<dyn SecondaryFailurePolicy>,
}

impl DualWritePool {
    /// Creates a pool that logs secondary failures.
    pub fn new(src: Arc<dyn ConnPool>, dst: Arc<dyn ConnPool>, pattern: PatternCell) -> Self {
        Self::with_policy(src, dst, pattern, Arc::new(LogSecondaryFailure))
    }

    pub fn with_policy(
        src: Arc<dyn ConnPool>,
        dst: Arc<dyn ConnPool>,
        pattern: PatternCell,
        policy: Arc<dyn SecondaryFailurePolicy>,
    ) -> Self {
        Self {
            src,
            dst,
            pattern,
            policy,
        }
    }

    /// Current stage.
    pub fn pattern(&self) -> Pattern {
        self.pattern.load()
    }

    /// Switches to the stage with the given wire name.
    pub fn update_pattern(&self, name: &str) -> DbResult<()> {
        let pattern: Pattern = name.parse()?;
        self.pattern.store(pattern);
        debug!(%pattern, "dual-write pattern updated");
        Ok(())
    }

    /// Authoritative pool, and the mirror pool when writing to both.
    fn route(&self) -> (Pattern, &Arc<dyn ConnPool>, Option<&Arc<dyn ConnPool>>) {
        let pattern = self.pattern.load();
        let (primary, other) = if pattern.src_is_primary() {
            (&self.src, &self.dst)
        } else {
            (&self.dst, &self.src)
        };
        (pattern, primary, pattern.is_dual().then_some(other))
    }

    /// Opens a transaction on src, then on dst. A failure on either side
    /// rolls back whatever was already opened.
    fn begin_both(
        &self,
        pattern: Pattern,
        opts: TxOptions,
    ) -> DbResult<(Box<dyn Tx>, Box<dyn Tx>)> {
        let src_tx = self.src.begin_tx(opts)?;
        match self.dst.begin_tx(opts) {
            Ok(dst_tx) => Ok((src_tx, dst_tx)),
            Err(e) => {
                if let Err(rb) = src_tx.rollback() {
                    warn!(%pattern, error = %rb, "rollback after failed dst begin failed");
                }
                Err(e)
            }
        }
    }
}

impl ConnPool for DualWritePool {
    fn begin_tx(&self, opts: TxOptions) -> DbResult<Box<dyn Tx>> {
        let pattern = self.pattern.load();
        let (primary, secondary) = if pattern.is_dual() {
            // Locks are always taken src then dst, whichever is authoritative,
            // so transactions opened on either side of a switch cannot deadlock.
            let (src_tx, dst_tx) = self.begin_both(pattern, opts)?;
            if pattern.src_is_primary() {
                (src_tx, Some(dst_tx))
            } else {
                (dst_tx, Some(src_tx))
            }
        } else if pattern.src_is_primary() {
            (self.src.begin_tx(opts)?, None)
        } else {
            (self.dst.begin_tx(opts)?, None)
        };
        Ok(Box::new(DualWriteTx {
            primary,
            secondary,
            pattern,
            policy: Arc::clone(&self.policy),
        }))
    }

    fn exec(&self, sql: &str, args: &[Value]) -> DbResult<usize> {
        let (pattern, primary, secondary) = self.route();
        let affected = primary.exec(sql, args)?;
        if let Some(pool) = secondary {
            if let Err(error) = pool.exec(sql, args) {
                self.policy.on_secondary_failure(&SecondaryFailure {
                    op: SecondaryOp::Exec,
                    pattern,
                    sql: Some(sql),
                    error: &error,
                });
            }
        }
        Ok(affected)
    }

    fn query(&self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        let (_, primary, _) = self.route();
        primary.query(sql, args)
    }

    fn query_row(&self, sql: &str, args: &[Value]) -> DbResult<Row> {
        let (_, primary, _) = self.route();
        primary.query_row(sql, args)
    }

    /// Always fails: a prepared handle is bound to one store and cannot be
    /// replayed on the other. Use [`exec`](ConnPool::exec) with arguments.
    fn prepare(&self, _sql: &str) -> DbResult<()> {
        Err(crate::DbError::Unsupported("prepare on dual-write pool"))
    }
}

/// Transaction spanning the authoritative store and, under dual write,
/// the mirror store. Only the authoritative outcome is reported.
pub struct DualWriteTx {
    primary: Box<dyn Tx>,
    secondary: Option<Box<dyn Tx>>,
    pattern: Pattern,
    policy: Arc<dyn SecondaryFailurePolicy>,
}

impl DualWriteTx {
    /// Whether a mirror transaction is open.
    pub fn is_dual(&self) -> bool {
        self.secondary.is_some()
    }

    fn report(&self, op: SecondaryOp, sql: Option<&str>, error: &crate::DbError) {
        self.policy.on_secondary_failure(&SecondaryFailure {
            op,
            pattern: self.pattern,
            sql,
            error,
        });
    }
}

impl Tx for DualWriteTx {
    fn exec(&mut self, sql: &str, args: &[Value]) -> DbResult<usize> {
        let affected = self.primary.exec(sql, args)?;
        if let Some(tx) = self.secondary.as_mut() {
            if let Err(error) = tx.exec(sql, args) {
                self.report(SecondaryOp::Exec, Some(sql), &error);
            }
        }
        Ok(affected)
    }

    fn query(&mut self, sql: &str, args: &[Value]) -> DbResult<Rows> {
        self.primary.query(sql, args)
    }

    fn commit(self: Box<Self>) -> DbResult<()> {
        let DualWriteTx {
            primary,
            secondary,
            pattern,
            policy,
        } = *self;
        primary.commit()?;
        if let Some(tx) = secondary {
            if let Err(error) = tx.commit() {
                policy.on_secondary_failure(&SecondaryFailure {
                    op: SecondaryOp::Commit,
                    pattern,
                    sql: None,
                    error: &error,
                });
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> DbResult<()> {
        let DualWriteTx {
            primary,
            secondary,
            pattern,
            policy,
        } = *self;
        primary.rollback()?;
        if let Some(tx) = secondary {
            if let Err(error) = tx.rollback() {
                policy.on_secondary_failure(&SecondaryFailure {
                    op: SecondaryOp::Rollback,
                    pattern,
                    sql: None,
                    error: &error,
                });
            }
        }
        Ok(())
    }
}
