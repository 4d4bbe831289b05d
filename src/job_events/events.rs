use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while turning job events into store mutations.
#[derive(Debug, Error)]
pub enum JobEventError {
    /// The event was built with data no job could legitimately produce.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The record store failed; passed through untouched.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// URI-like identifier of one job execution.
///
/// Never empty: a job without an identifier is a bug in the job itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobUri(String);

impl JobUri {
    pub fn new(uri: impl Into<String>) -> Result<Self, JobEventError> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            return Err(JobEventError::InvalidArgument(
                "job uri must not be empty".to_string(),
            ));
        }
        Ok(Self(uri))
    }

    /// Generate a fresh identifier below `base`, e.g. `/internal/jobs/<uuid>`.
    pub fn generate(base: &str) -> Self {
        Self(format!("{}/{}", base.trim_end_matches('/'), Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobUri {
    type Err = JobEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobUri {
    type Error = JobEventError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JobUri> for String {
    fn from(uri: JobUri) -> Self {
        uri.0
    }
}

/// Static description of a kind of job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Tag identifying the kind of work, e.g. `"product-import"`.
    pub job_type: String,
    pub job_name: String,
    pub description: String,
}

impl JobDefinition {
    pub fn new(
        job_type: impl Into<String>,
        job_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            job_type: job_type.into(),
            job_name: job_name.into(),
            description: description.into(),
        }
    }
}

/// Lifecycle transitions a running job can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateChange {
    Start,
    KeepAlive,
    Restart,
    Stop,
    Dead,
}

impl StateChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateChange::Start => "START",
            StateChange::KeepAlive => "KEEP_ALIVE",
            StateChange::Restart => "RESTART",
            StateChange::Stop => "STOP",
            StateChange::Dead => "DEAD",
        }
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a log line as announced by a job.
///
/// This is the event vocabulary; the persisted one is
/// [`crate::job_store::Level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    source: JobDefinition,
    job_uri: JobUri,
    state: StateChange,
}

impl StateChangeEvent {
    pub fn new(source: JobDefinition, job_uri: JobUri, state: StateChange) -> Self {
        Self {
            source,
            job_uri,
            state,
        }
    }

    pub fn source(&self) -> &JobDefinition {
        &self.source
    }

    pub fn job_type(&self) -> &str {
        &self.source.job_type
    }

    pub fn job_uri(&self) -> &JobUri {
        &self.job_uri
    }

    pub fn state(&self) -> StateChange {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    source: JobDefinition,
    job_uri: JobUri,
    level: EventLevel,
    message: String,
}

impl MessageEvent {
    pub fn new(
        source: JobDefinition,
        job_uri: JobUri,
        level: EventLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            job_uri,
            level,
            message: message.into(),
        }
    }

    pub fn source(&self) -> &JobDefinition {
        &self.source
    }

    pub fn job_uri(&self) -> &JobUri {
        &self.job_uri
    }

    pub fn level(&self) -> EventLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Everything a job can publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    StateChange(StateChangeEvent),
    Message(MessageEvent),
}

impl JobEvent {
    pub fn job_uri(&self) -> &JobUri {
        match self {
            JobEvent::StateChange(event) => event.job_uri(),
            JobEvent::Message(event) => event.job_uri(),
        }
    }
}

impl From<StateChangeEvent> for JobEvent {
    fn from(event: StateChangeEvent) -> Self {
        JobEvent::StateChange(event)
    }
}

impl From<MessageEvent> for JobEvent {
    fn from(event: MessageEvent) -> Self {
        JobEvent::Message(event)
    }
}
