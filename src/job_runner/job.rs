use super::context::JobContext;
use crate::job_events::JobDefinition;
use thiserror::Error;

/// Errors a job execution can end with.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Job was cancelled")]
    Cancelled,
}

/// Trait for jobs the runner can execute.
///
/// Jobs are executed synchronously in a blocking context.
/// Long-running work should check for cancellation now and then.
pub trait JobRunnable: Send + Sync {
    /// Tag identifying the kind of work, stored on every record of this job.
    fn job_type(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Execute the job.
    ///
    /// Called from `spawn_blocking`. Implementations should check
    /// `ctx.is_cancelled()` during long operations and return
    /// `JobError::Cancelled` when it is set.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;

    fn definition(&self) -> JobDefinition {
        JobDefinition::new(self.job_type(), self.name(), self.description())
    }
}
