//! Carries inconsistency events from the validator to the fixer.
//!
//! The validator only depends on [`InconsistentEventProducer`]. Any message
//! bus can sit behind it; delivery is assumed at-least-once and every
//! repair is idempotent. [`channel`] provides an in-process bus with the
//! same shape: JSON payloads on a named topic.

use crate::error::{ReconcileError, ReconcileResult};
use async_trait::async_trait;
use migrator_types::InconsistentEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Topic inconsistency events are published on.
pub const INCONSISTENT_EVENT_TOPIC: &str = "dual_write_inconsistent_events";

/// Publishes inconsistency events.
#[async_trait]
pub trait InconsistentEventProducer: Send + Sync {
    async fn produce_inconsistent_event(&self, evt: InconsistentEvent) -> ReconcileResult<()>;
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: Arc<str>,
    pub payload: Vec<u8>,
}

/// Creates a bounded in-process topic.
pub fn channel(topic: &str, capacity: usize) -> (ChannelProducer, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let topic: Arc<str> = Arc::from(topic);
    (
        ChannelProducer {
            topic: Arc::clone(&topic),
            tx,
        },
        EventStream { topic, rx },
    )
}

/// Producer half of [`channel`]. Waits for room when the topic is full.
#[derive(Debug, Clone)]
pub struct ChannelProducer {
    topic: Arc<str>,
    tx: mpsc::Sender<BusMessage>,
}

#[async_trait]
impl InconsistentEventProducer for ChannelProducer {
    async fn produce_inconsistent_event(&self, evt: InconsistentEvent) -> ReconcileResult<()> {
        let payload = evt.to_json()?;
        self.tx
            .send(BusMessage {
                topic: Arc::clone(&self.topic),
                payload,
            })
            .await
            .map_err(|_| ReconcileError::ChannelClosed)?;
        debug!(topic = %self.topic, id = evt.id, kind = %evt.kind, "inconsistency published");
        Ok(())
    }
}

/// Consumer half of [`channel`].
#[derive(Debug)]
pub struct EventStream {
    topic: Arc<str>,
    rx: mpsc::Receiver<BusMessage>,
}

impl EventStream {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message, or `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }
}
