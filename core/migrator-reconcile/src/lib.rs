//! Consistency validation, repair and stage scheduling for dual-write
//! migrations.
//!
//! # Components
//!
//! - **Validator**: scans a base store against a target store in both
//!   directions and reports every divergent row as an [`InconsistentEvent`]
//! - **Events**: the producer/consumer contract carrying those events from
//!   detection to repair, plus an in-process bus
//! - **Fixer**: repairs one event by copying the authoritative row over the
//!   other store (or deleting it there when the row is gone)
//! - **Scheduler**: the control plane that moves the shared
//!   [`Pattern`](migrator_types::Pattern) through the migration stages and
//!   owns the lifetime of full and incremental validation runs
//!
//! [`InconsistentEvent`]: migrator_types::InconsistentEvent

mod backoff;
mod call;
mod cancel;
mod config;
mod consumer;
mod error;
pub mod events;
mod fixer;
mod scheduler;
mod validator;

pub use backoff::Backoff;
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use config::{ConsumerConfig, MIN_SLEEP_INTERVAL, ValidatorConfig};
pub use consumer::Consumer;
pub use error::{ReconcileError, ReconcileResult};
pub use events::{
    BusMessage, ChannelProducer, EventStream, INCONSISTENT_EVENT_TOPIC, InconsistentEventProducer,
    channel,
};
pub use fixer::OverrideFixer;
pub use scheduler::Scheduler;
pub use validator::Validator;
