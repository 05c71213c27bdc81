//! Control plane for a live migration.

use crate::cancel::{CancelHandle, CancelToken, cancel_pair};
use crate::config::ValidatorConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::events::InconsistentEventProducer;
use crate::validator::Validator;
use migrator_db::{ConnPool, Record};
use migrator_types::{Direction, Pattern, PatternCell};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, info};

/// Moves the shared [`Pattern`] through the migration stages and owns the
/// full and incremental validation runs.
///
/// The pattern cell handed in here is the same one the dual-write pool
/// reads, so every transition takes effect on the next pool call. The cell
/// is the only record of the current stage; anything else that writes it
/// is seen by the next read here. Only one scheduler per migration is
/// expected to be live.
///
/// Starting a validation spawns onto the current Tokio runtime and fails
/// when called outside one.
pub struct Scheduler<T: Record> {
    src: Arc<dyn ConnPool>,
    dst: Arc<dyn ConnPool>,
    pattern: PatternCell,
    producer: Arc<dyn InconsistentEventProducer>,
    config: ValidatorConfig,
    state: Mutex<State>,
    _entity: PhantomData<fn() -> T>,
}

struct State {
    full: Option<CancelHandle>,
    incr: Option<CancelHandle>,
}

impl<T: Record> Scheduler<T> {
    pub fn new(
        src: Arc<dyn ConnPool>,
        dst: Arc<dyn ConnPool>,
        pattern: PatternCell,
        producer: Arc<dyn InconsistentEventProducer>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            src,
            dst,
            pattern,
            producer,
            config,
            state: Mutex::new(State {
                full: None,
                incr: None,
            }),
            _entity: PhantomData,
        }
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern.load()
    }

    /// Advances one stage; a no-op at `DstOnly`.
    pub fn next(&self) -> Pattern {
        self.transition(Pattern::next)
    }

    /// Retreats one stage; a no-op at `SrcOnly`.
    pub fn prev(&self) -> Pattern {
        self.transition(Pattern::prev)
    }

    fn transition(&self, step: fn(Pattern) -> Pattern) -> Pattern {
        // Serialises transitions; the cell itself stays the source of truth.
        let _state = self.state.lock();
        let from = self.pattern.load();
        let to = step(from);
        self.pattern.store(to);
        info!(table = T::TABLE, %from, %to, "pattern switched");
        to
    }

    /// Builds a validator for the current stage with the given settings.
    ///
    /// While the source is authoritative it is validated against the
    /// destination; afterwards the roles swap.
    pub fn new_validator(&self, config: ValidatorConfig) -> Validator<T> {
        self.validator_for(self.pattern(), config)
    }

    fn validator_for(&self, pattern: Pattern, config: ValidatorConfig) -> Validator<T> {
        let (base, target, direction) = match pattern {
            Pattern::SrcOnly | Pattern::SrcFirst => (&self.src, &self.dst, Direction::ToTarget),
            Pattern::DstFirst | Pattern::DstOnly => (&self.dst, &self.src, Direction::ToBase),
        };
        Validator::with_config(
            Arc::clone(base),
            Arc::clone(target),
            direction,
            Arc::clone(&self.producer),
            config,
        )
    }

    // ── Full validation ──────────────────────────────────────────

    /// Cancels any running full validation and starts a fresh one-shot
    /// pass. Returns the new run's token.
    pub fn start_full_validation(&self) -> ReconcileResult<CancelToken> {
        let runtime = current_runtime()?;
        let mut state = self.state.lock();
        if let Some(previous) = state.full.take() {
            previous.cancel();
        }
        let config = self
            .config
            .clone()
            .with_sleep_interval(Duration::ZERO);
        let pattern = self.pattern.load();
        let validator = self.validator_for(pattern, config);
        let (handle, token) = cancel_pair();
        state.full = Some(handle);
        spawn_run(&runtime, "full", validator, token.clone());
        info!(table = T::TABLE, %pattern, "full validation started");
        Ok(token)
    }

    pub fn stop_full_validation(&self) {
        if let Some(handle) = self.state.lock().full.take() {
            handle.cancel();
            info!(table = T::TABLE, "full validation stopped");
        }
    }

    // ── Incremental validation ───────────────────────────────────

    /// Cancels any running incremental validation and starts a continuous
    /// one over rows changed after `utime`, pausing `interval` between
    /// passes. A zero interval runs a single pass.
    pub fn start_increment_validation(
        &self,
        utime: i64,
        interval: Duration,
    ) -> ReconcileResult<CancelToken> {
        let runtime = current_runtime()?;
        let mut state = self.state.lock();
        if let Some(previous) = state.incr.take() {
            previous.cancel();
        }
        let config = self
            .config
            .clone()
            .with_utime(utime)
            .with_sleep_interval(interval);
        let pattern = self.pattern.load();
        let validator = self.validator_for(pattern, config);
        let (handle, token) = cancel_pair();
        state.incr = Some(handle);
        spawn_run(&runtime, "incremental", validator, token.clone());
        info!(table = T::TABLE, %pattern, utime, ?interval, "incremental validation started");
        Ok(token)
    }

    pub fn stop_increment_validation(&self) {
        if let Some(handle) = self.state.lock().incr.take() {
            handle.cancel();
            info!(table = T::TABLE, "incremental validation stopped");
        }
    }
}

fn current_runtime() -> ReconcileResult<Handle> {
    Handle::try_current().map_err(|e| ReconcileError::Task(e.to_string()))
}

fn spawn_run<T: Record>(
    runtime: &Handle,
    kind: &'static str,
    validator: Validator<T>,
    token: CancelToken,
) {
    runtime.spawn(async move {
        if let Err(e) = validator.validate(&token).await {
            error!(table = T::TABLE, kind, error = %e, "validation aborted");
        }
    });
}
