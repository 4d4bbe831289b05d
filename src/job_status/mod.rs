//! Read side of the job records, shaped for status pages.

use crate::clock::Clock;
use crate::job_events::JobUri;
use crate::job_store::{JobMessage, JobRecord, JobRecordStore};
use anyhow::Result;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;

/// Serializable overview of one job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_uri: String,
    pub job_type: String,
    pub hostname: String,
    pub status: String,
    pub started: String,
    pub stopped: Option<String>,
    pub last_updated: String,
    pub has_errors: bool,
    pub message_count: usize,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        JobSummary {
            job_uri: record.job_uri().to_string(),
            job_type: record.job_type().to_string(),
            hostname: record.hostname().to_string(),
            status: record.status().as_str().to_string(),
            started: record.started().to_rfc3339(),
            stopped: record.stopped().map(|dt| dt.to_rfc3339()),
            last_updated: record.last_updated().to_rfc3339(),
            has_errors: record.has_errors(),
            message_count: record.messages().len(),
        }
    }
}

/// Serializable log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobMessageInfo {
    pub level: String,
    pub message: String,
    pub timestamp: String,
}

impl From<&JobMessage> for JobMessageInfo {
    fn from(message: &JobMessage) -> Self {
        JobMessageInfo {
            level: message.level.as_str().to_string(),
            message: message.message.clone(),
            timestamp: message.timestamp.to_rfc3339(),
        }
    }
}

/// A job summary plus its full log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDetails {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub messages: Vec<JobMessageInfo>,
}

impl From<&JobRecord> for JobDetails {
    fn from(record: &JobRecord) -> Self {
        JobDetails {
            summary: record.into(),
            messages: record.messages().iter().map(JobMessageInfo::from).collect(),
        }
    }
}

/// Queries job records for status pages.
#[derive(Clone)]
pub struct JobStatusService {
    store: Arc<dyn JobRecordStore>,
    clock: Arc<dyn Clock>,
}

impl JobStatusService {
    pub fn new(store: Arc<dyn JobRecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Most recently started jobs, newest first.
    pub fn latest(&self, limit: usize) -> Result<Vec<JobSummary>> {
        let records = self.store.find_latest(limit)?;
        Ok(records.iter().map(JobSummary::from).collect())
    }

    pub fn latest_by_type(&self, job_type: &str, limit: usize) -> Result<Vec<JobSummary>> {
        let records = self.store.find_latest_by_type(job_type, limit)?;
        Ok(records.iter().map(JobSummary::from).collect())
    }

    pub fn get(&self, job_uri: &JobUri) -> Result<Option<JobDetails>> {
        Ok(self.store.find_one(job_uri)?.as_ref().map(JobDetails::from))
    }

    /// Jobs still marked as running that have not reported for longer than
    /// `threshold`.
    pub fn stale_jobs(&self, threshold: Duration) -> Result<Vec<JobSummary>> {
        let cutoff = self.clock.now() - threshold;
        let stale = self
            .store
            .find_all()?
            .iter()
            .filter(|r| !r.status().is_terminal() && r.last_updated() < cutoff)
            .map(JobSummary::from)
            .collect();
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::job_store::{InMemoryJobStore, Level};
    use chrono::Utc;

    fn uri(s: &str) -> JobUri {
        JobUri::new(s).unwrap()
    }

    fn create_service() -> (JobStatusService, Arc<InMemoryJobStore>, Arc<FixedClock>) {
        let store = Arc::new(InMemoryJobStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let service = JobStatusService::new(store.clone(), clock.clone());
        (service, store, clock)
    }

    #[test]
    fn test_summary_from_record() {
        let now = Utc::now();
        let mut record = JobRecord::new(uri("some/job"), "someJobType", now, "localhost");
        record.append_message(JobMessage::new(Level::Error, "boom", now));
        record.dead(now);

        let summary = JobSummary::from(&record);

        assert_eq!(summary.job_uri, "some/job");
        assert_eq!(summary.status, "DEAD");
        assert!(summary.has_errors);
        assert_eq!(summary.message_count, 1);
        assert!(summary.started.contains('T'));
        assert!(summary.stopped.is_some());
    }

    #[test]
    fn test_details_serialize_flat() {
        let now = Utc::now();
        let mut record = JobRecord::new(uri("some/job"), "someJobType", now, "localhost");
        record.append_message(JobMessage::new(Level::Warning, "careful", now));

        let json = serde_json::to_value(JobDetails::from(&record)).unwrap();

        assert_eq!(json["job_uri"], "some/job");
        assert_eq!(json["status"], "RUNNING");
        assert_eq!(json["messages"][0]["level"], "WARNING");
        assert_eq!(json["messages"][0]["message"], "careful");
    }

    #[test]
    fn test_latest_and_get() {
        let (service, store, clock) = create_service();
        for i in 0..3 {
            store
                .create_or_update(&JobRecord::new(
                    uri(&format!("job/{}", i)),
                    if i == 1 { "export" } else { "import" },
                    clock.now() + Duration::seconds(i),
                    "localhost",
                ))
                .unwrap();
        }

        let latest = service.latest(2).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].job_uri, "job/2");

        let exports = service.latest_by_type("export", 10).unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].job_uri, "job/1");

        assert!(service.get(&uri("job/0")).unwrap().is_some());
        assert!(service.get(&uri("job/9")).unwrap().is_none());
    }

    #[test]
    fn test_stale_jobs() {
        let (service, store, clock) = create_service();
        let start = clock.now();

        let quiet = JobRecord::new(uri("job/quiet"), "t", start, "localhost");
        let mut finished = JobRecord::new(uri("job/finished"), "t", start, "localhost");
        finished.stop(start);
        store.create_or_update(&quiet).unwrap();
        store.create_or_update(&finished).unwrap();

        clock.advance(Duration::minutes(10));
        let mut chatty = JobRecord::new(uri("job/chatty"), "t", start, "localhost");
        chatty.ping(clock.now());
        store.create_or_update(&chatty).unwrap();

        let stale = service.stale_jobs(Duration::minutes(5)).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].job_uri, "job/quiet");
    }
}
