//! Bidirectional consistency scan between a base and a target store.

use crate::backoff::Backoff;
use crate::call::cancellable;
use crate::cancel::CancelToken;
use crate::config::ValidatorConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::events::InconsistentEventProducer;
use migrator_db::{ConnPool, DbResult, Record, Value, find_by_id};
use migrator_types::{Direction, InconsistencyType, InconsistentEvent};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Compares `base` against `target` for one entity type and reports every
/// divergent row through the producer.
///
/// Two scans run side by side:
/// - **base → target** walks base rows changed after the watermark, one at a
///   time, and looks each up in target (`TargetMissing` / `NotEqual`).
/// - **target → base** pages target ids changed after the watermark and
///   checks which are absent from base (`BaseMissing`).
///
/// Scan cursors live in memory only. A restarted run begins again from the
/// configured watermark and may re-report rows already repaired.
pub struct Validator<T: Record> {
    base: Arc<dyn ConnPool>,
    target: Arc<dyn ConnPool>,
    direction: Direction,
    producer: Arc<dyn InconsistentEventProducer>,
    config: ValidatorConfig,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Record> Validator<T> {
    /// Creates a one-shot validator with the default configuration.
    pub fn new(
        base: Arc<dyn ConnPool>,
        target: Arc<dyn ConnPool>,
        direction: Direction,
        producer: Arc<dyn InconsistentEventProducer>,
    ) -> Self {
        Self::with_config(base, target, direction, producer, ValidatorConfig::default())
    }

    pub fn with_config(
        base: Arc<dyn ConnPool>,
        target: Arc<dyn ConnPool>,
        direction: Direction,
        producer: Arc<dyn InconsistentEventProducer>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            base,
            target,
            direction,
            producer,
            config: config.normalized(),
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Runs both scans until they finish (one-shot) or `cancel` fires.
    ///
    /// Row-level failures are logged and retried, never returned.
    pub async fn validate(&self, cancel: &CancelToken) -> ReconcileResult<()> {
        info!(
            table = T::TABLE,
            direction = %self.direction,
            utime = self.config.utime,
            continuous = self.config.is_continuous(),
            "validation started"
        );
        tokio::try_join!(
            self.validate_base_to_target(cancel),
            self.validate_target_to_base(cancel),
        )?;
        info!(table = T::TABLE, direction = %self.direction, "validation finished");
        Ok(())
    }

    // ── base → target ────────────────────────────────────────────

    async fn validate_base_to_target(&self, cancel: &CancelToken) -> ReconcileResult<()> {
        let mut offset: i64 = 0;
        let mut backoff = self.config.backoff();
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.compare_row_at(offset, cancel).await {
                Ok(()) => {
                    backoff.reset();
                    offset += 1;
                }
                Err(e) if e.is_not_found() => {
                    backoff.reset();
                    if !self.config.is_continuous() {
                        return Ok(());
                    }
                    // Same offset next pass: new or changed rows may land there.
                    if !cancel.sleep(self.config.sleep_interval).await {
                        return Ok(());
                    }
                }
                Err(ReconcileError::Cancelled) => return Ok(()),
                Err(e) => {
                    if !self
                        .retry_after(&mut backoff, "base_to_target", offset, &e, cancel)
                        .await
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Checks the base row at `offset` against target.
    async fn compare_row_at(&self, offset: i64, cancel: &CancelToken) -> ReconcileResult<()> {
        let base = Arc::clone(&self.base);
        let utime = self.config.utime;
        let src: T = cancellable(cancel, self.config.query_timeout, move || {
            let row = base.query_row(
                &format!(
                    "SELECT * FROM {} WHERE utime > ?1 ORDER BY id LIMIT 1 OFFSET ?2",
                    T::TABLE
                ),
                &[Value::Integer(utime), Value::Integer(offset)],
            )?;
            T::from_row(&row)
        })
        .await?;

        let id = src.id();
        let target = Arc::clone(&self.target);
        let dst: Option<T> = cancellable(cancel, self.config.query_timeout, move || {
            optional(find_by_id::<T>(&*target, id))
        })
        .await?;

        match dst {
            None => self.notify(id, InconsistencyType::TargetMissing).await,
            Some(dst) if !src.equal(&dst) => self.notify(id, InconsistencyType::NotEqual).await,
            Some(_) => {}
        }
        Ok(())
    }

    // ── target → base ────────────────────────────────────────────

    async fn validate_target_to_base(&self, cancel: &CancelToken) -> ReconcileResult<()> {
        let mut offset: i64 = 0;
        let mut backoff = self.config.backoff();
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            match self.diff_batch_at(offset, cancel).await {
                Ok(scanned) => {
                    backoff.reset();
                    offset += scanned as i64;
                    if scanned < self.config.batch_size {
                        if !self.config.is_continuous() {
                            return Ok(());
                        }
                        if !cancel.sleep(self.config.sleep_interval).await {
                            return Ok(());
                        }
                    }
                }
                Err(ReconcileError::Cancelled) => return Ok(()),
                Err(e) => {
                    if !self
                        .retry_after(&mut backoff, "target_to_base", offset, &e, cancel)
                        .await
                    {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Reports target ids in the page at `offset` that base lacks.
    /// Returns how many target ids the page held.
    async fn diff_batch_at(&self, offset: i64, cancel: &CancelToken) -> ReconcileResult<usize> {
        let target = Arc::clone(&self.target);
        let utime = self.config.utime;
        let limit = self.config.batch_size as i64;
        let ids: Vec<i64> = cancellable(cancel, self.config.query_timeout, move || {
            target
                .query(
                    &format!(
                        "SELECT id FROM {} WHERE utime > ?1 ORDER BY id LIMIT ?2 OFFSET ?3",
                        T::TABLE
                    ),
                    &[
                        Value::Integer(utime),
                        Value::Integer(limit),
                        Value::Integer(offset),
                    ],
                )?
                .iter()
                .map(|row| row.id())
                .collect()
        })
        .await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let base = Arc::clone(&self.base);
        let lookup = ids.clone();
        let present: HashSet<i64> = cancellable(cancel, self.config.query_timeout, move || {
            let placeholders = vec!["?"; lookup.len()].join(", ");
            let args: Vec<Value> = lookup.into_iter().map(Value::Integer).collect();
            base.query(
                &format!("SELECT id FROM {} WHERE id IN ({placeholders})", T::TABLE),
                &args,
            )?
            .iter()
            .map(|row| row.id())
            .collect()
        })
        .await?;

        for id in ids.iter().filter(|id| !present.contains(id)) {
            self.notify(*id, InconsistencyType::BaseMissing).await;
        }
        Ok(ids.len())
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn notify(&self, id: i64, kind: InconsistencyType) {
        let evt = InconsistentEvent::new(id, self.direction, kind);
        let sent = tokio::time::timeout(
            self.config.query_timeout,
            self.producer.produce_inconsistent_event(evt),
        )
        .await
        .unwrap_or(Err(ReconcileError::Timeout));
        match sent {
            Ok(()) => debug!(table = T::TABLE, id, %kind, "inconsistency reported"),
            Err(e) => warn!(table = T::TABLE, id, %kind, error = %e, "failed to report inconsistency"),
        }
    }

    /// Logs a transient failure and waits out the backoff. Returns `false`
    /// if cancelled while waiting.
    async fn retry_after(
        &self,
        backoff: &mut Backoff,
        scan: &'static str,
        offset: i64,
        err: &ReconcileError,
        cancel: &CancelToken,
    ) -> bool {
        let delay = backoff.next_delay();
        if backoff.attempts() >= self.config.max_retry {
            error!(
                table = T::TABLE,
                scan,
                offset,
                attempts = backoff.attempts(),
                error = %err,
                "scan stuck on failing position"
            );
        } else {
            warn!(table = T::TABLE, scan, offset, error = %err, ?delay, "scan step failed, retrying");
        }
        cancel.sleep(delay).await
    }
}

/// Turns "no such row" into `None`.
fn optional<T>(res: DbResult<T>) -> DbResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
