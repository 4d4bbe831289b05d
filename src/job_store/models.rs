use crate::job_events::{EventLevel, JobUri};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Restarted,
    Stopped,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Restarted => "RESTARTED",
            JobStatus::Stopped => "STOPPED",
            JobStatus::Dead => "DEAD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(JobStatus::Running),
            "RESTARTED" => Some(JobStatus::Restarted),
            "STOPPED" => Some(JobStatus::Stopped),
            "DEAD" => Some(JobStatus::Dead),
            _ => None,
        }
    }

    /// Stopped and dead jobs are not expected to change anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Stopped | JobStatus::Dead)
    }
}

/// Persisted severity of a job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Level::Info),
            "WARNING" => Some(Level::Warning),
            "ERROR" => Some(Level::Error),
            _ => None,
        }
    }
}

// Event vocabulary says WARN, the persisted one says WARNING.
impl From<EventLevel> for Level {
    fn from(level: EventLevel) -> Self {
        match level {
            EventLevel::Info => Level::Info,
            EventLevel::Warn => Level::Warning,
            EventLevel::Error => Level::Error,
        }
    }
}

/// One entry of a job's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub level: Level,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(level: Level, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp,
        }
    }
}

/// Durable status snapshot of one job execution.
///
/// The identifier and job type are fixed at creation, the log only grows and
/// `last_updated` never goes backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    job_uri: JobUri,
    job_type: String,
    started: DateTime<Utc>,
    stopped: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
    hostname: String,
    status: JobStatus,
    messages: Vec<JobMessage>,
}

impl JobRecord {
    pub fn new(
        job_uri: JobUri,
        job_type: impl Into<String>,
        now: DateTime<Utc>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            job_uri,
            job_type: job_type.into(),
            started: now,
            stopped: None,
            last_updated: now,
            hostname: hostname.into(),
            status: JobStatus::Running,
            messages: Vec::new(),
        }
    }

    /// Rebuild a record read back from storage, log not included.
    pub(crate) fn from_parts(
        job_uri: JobUri,
        job_type: String,
        started: DateTime<Utc>,
        stopped: Option<DateTime<Utc>>,
        last_updated: DateTime<Utc>,
        hostname: String,
        status: JobStatus,
    ) -> Self {
        Self {
            job_uri,
            job_type,
            started,
            stopped,
            last_updated,
            hostname,
            status,
            messages: Vec::new(),
        }
    }

    pub(crate) fn with_messages(mut self, messages: Vec<JobMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn job_uri(&self) -> &JobUri {
        &self.job_uri
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    pub fn stopped(&self) -> Option<DateTime<Utc>> {
        self.stopped
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn messages(&self) -> &[JobMessage] {
        &self.messages
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == Level::Error)
    }

    /// Heartbeat: the job is still alive.
    pub fn ping(&mut self, now: DateTime<Utc>) {
        self.touch(now);
    }

    pub fn restart(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Restarted;
        self.touch(now);
    }

    pub fn stop(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Stopped;
        self.stopped = Some(now);
        self.touch(now);
    }

    pub fn dead(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Dead;
        self.stopped = Some(now);
        self.touch(now);
    }

    pub fn append_message(&mut self, message: JobMessage) {
        self.touch(message.timestamp);
        self.messages.push(message);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}
