use super::bus::JobEventSink;
use super::events::{
    EventLevel, JobDefinition, JobEvent, JobUri, MessageEvent, StateChange, StateChangeEvent,
};
use std::sync::Arc;

/// Event publisher owned by one running job.
///
/// Every event it builds carries the job's definition and uri.
#[derive(Clone)]
pub struct JobEventPublisher {
    sink: Arc<dyn JobEventSink>,
    definition: JobDefinition,
    job_uri: JobUri,
}

impl JobEventPublisher {
    pub fn new(sink: Arc<dyn JobEventSink>, definition: JobDefinition, job_uri: JobUri) -> Self {
        Self {
            sink,
            definition,
            job_uri,
        }
    }

    pub fn job_uri(&self) -> &JobUri {
        &self.job_uri
    }

    pub fn definition(&self) -> &JobDefinition {
        &self.definition
    }

    /// Publish a ready-made event.
    pub fn publish(&self, event: impl Into<JobEvent>) {
        self.sink.publish(event.into());
    }

    pub fn state_changed(&self, state: StateChange) {
        self.publish(StateChangeEvent::new(
            self.definition.clone(),
            self.job_uri.clone(),
            state,
        ));
    }

    pub fn message(&self, level: EventLevel, message: impl Into<String>) {
        self.publish(MessageEvent::new(
            self.definition.clone(),
            self.job_uri.clone(),
            level,
            message,
        ));
    }

    pub fn keep_alive(&self) {
        self.state_changed(StateChange::KeepAlive);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.message(EventLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.message(EventLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.message(EventLevel::Error, message);
    }
}
