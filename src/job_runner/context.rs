use crate::job_events::JobEventPublisher;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Publisher for this execution; log lines go through it.
    pub publisher: JobEventPublisher,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, publisher: JobEventPublisher) -> Self {
        Self {
            cancellation_token,
            publisher,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publisher.info(message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.publisher.warn(message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publisher.error(message);
    }
}
