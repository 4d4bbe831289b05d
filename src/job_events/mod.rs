//! Job lifecycle event pipeline.
//!
//! Running jobs announce state transitions and log lines through a
//! [`JobEventPublisher`]; a [`JobEventSink`] delivers them to every
//! [`JobEventListener`]; [`PersistenceJobEventListener`] folds them into
//! job records.

mod bus;
mod events;
mod key_lock;
mod listener;
mod publisher;

pub use bus::{JobEventBus, JobEventSink, QueuedJobEventBus};
pub use events::{
    EventLevel, JobDefinition, JobEvent, JobEventError, JobUri, MessageEvent, StateChange,
    StateChangeEvent,
};
pub use key_lock::KeyedLocks;
pub use listener::{JobEventListener, MissingRecordPolicy, PersistenceJobEventListener};
pub use publisher::JobEventPublisher;
