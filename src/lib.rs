//! Jobtrail Library
//!
//! Tracks the lifecycle of background jobs by folding their lifecycle and log
//! events into durable job records that status pages can read.

pub mod clock;
pub mod config;
pub mod job_events;
pub mod job_runner;
pub mod job_status;
pub mod job_store;
pub mod sqlite_persistence;
pub mod system_info;

// Re-export commonly used types for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use job_events::{
    JobEvent, JobEventBus, JobEventListener, JobEventPublisher, JobEventSink, JobUri,
    MessageEvent, PersistenceJobEventListener, StateChangeEvent,
};
pub use job_runner::{JobContext, JobError, JobRunnable, JobRunner};
pub use job_status::JobStatusService;
pub use job_store::{InMemoryJobStore, JobRecord, JobRecordStore, SqliteJobStore};
pub use system_info::SystemInfo;
