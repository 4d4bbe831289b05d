//! Job execution.
//!
//! Runs [`JobRunnable`]s on blocking tasks and reports their lifecycle
//! through a [`crate::job_events::JobEventPublisher`]. Deciding *when* a job
//! runs is left to the embedding service.

mod context;
mod job;
mod runner;

pub use context::JobContext;
pub use job::{JobError, JobRunnable};
pub use runner::{JobOutcome, JobRunner, JobRunnerSettings, RunningJob, DEFAULT_JOB_URI_BASE};
