//! Subscribes to inconsistency events and dispatches them to fixers.

use crate::cancel::CancelToken;
use crate::config::ConsumerConfig;
use crate::error::ReconcileResult;
use crate::events::EventStream;
use crate::fixer::OverrideFixer;
use migrator_db::{ConnPool, DbResult, Record};
use migrator_types::{Direction, InconsistentEvent};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Repairs events from one topic, picking the fixer by event direction:
/// `ToTarget` copies source over destination, `ToBase` the reverse.
pub struct Consumer<T: Record> {
    stream: EventStream,
    src_first: OverrideFixer<T>,
    dst_first: OverrideFixer<T>,
    config: ConsumerConfig,
}

impl<T: Record> Consumer<T> {
    pub fn new(
        src: Arc<dyn ConnPool>,
        dst: Arc<dyn ConnPool>,
        stream: EventStream,
        config: ConsumerConfig,
    ) -> DbResult<Self> {
        let src_first = OverrideFixer::new(Arc::clone(&src), Arc::clone(&dst))?
            .with_timeout(config.fix_timeout);
        let dst_first = OverrideFixer::new(dst, src)?.with_timeout(config.fix_timeout);
        Ok(Self {
            stream,
            src_first,
            dst_first,
            config,
        })
    }

    /// Consumes until cancelled or every producer has gone away.
    pub async fn run(mut self, cancel: CancelToken) {
        info!(topic = self.stream.topic(), table = T::TABLE, "inconsistency consumer started");
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.stream.recv() => msg,
            };
            let Some(msg) = msg else { break };
            if let Err(e) = self.handle(&msg.payload).await {
                error!(topic = %msg.topic, error = %e, "dropping inconsistency event");
            }
        }
        info!(topic = self.stream.topic(), "inconsistency consumer stopped");
    }

    /// Decodes and repairs one payload, retrying failed repairs with
    /// backoff. Undecodable payloads fail immediately.
    pub async fn handle(&self, payload: &[u8]) -> ReconcileResult<()> {
        let evt = InconsistentEvent::from_json(payload)?;
        self.dispatch(&evt).await
    }

    pub async fn dispatch(&self, evt: &InconsistentEvent) -> ReconcileResult<()> {
        let fixer = match evt.direction {
            Direction::ToTarget => &self.src_first,
            Direction::ToBase => &self.dst_first,
        };
        let mut backoff = self.config.backoff();
        loop {
            match fixer.fix(evt).await {
                Ok(()) => return Ok(()),
                Err(e) if backoff.attempts() < self.config.max_retries => {
                    let delay = backoff.next_delay();
                    warn!(id = evt.id, error = %e, ?delay, "repair failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
