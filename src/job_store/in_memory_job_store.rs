use super::models::{JobMessage, JobRecord};
use super::JobRecordStore;
use crate::job_events::JobUri;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Job records kept in process memory; nothing survives a restart.
#[derive(Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<JobUri, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest_matching<F>(&self, limit: usize, filter: F) -> Vec<JobRecord>
    where
        F: Fn(&JobRecord) -> bool,
    {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<JobRecord> = records
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.started()
                .cmp(&a.started())
                .then_with(|| a.job_uri().cmp(b.job_uri()))
        });
        matching.truncate(limit);
        matching
    }
}

impl JobRecordStore for InMemoryJobStore {
    fn create_or_update(&self, record: &JobRecord) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.job_uri().clone(), record.clone());
        Ok(())
    }

    fn find_one(&self, job_uri: &JobUri) -> Result<Option<JobRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(job_uri).cloned())
    }

    fn append_message(&self, job_uri: &JobUri, message: JobMessage) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(job_uri) {
            Some(record) => record.append_message(message),
            None => debug!("Dropping message for unknown job {}", job_uri),
        }
        Ok(())
    }

    fn find_latest(&self, limit: usize) -> Result<Vec<JobRecord>> {
        Ok(self.latest_matching(limit, |_| true))
    }

    fn find_latest_by_type(&self, job_type: &str, limit: usize) -> Result<Vec<JobRecord>> {
        Ok(self.latest_matching(limit, |r| r.job_type() == job_type))
    }

    fn find_all(&self) -> Result<Vec<JobRecord>> {
        Ok(self.latest_matching(usize::MAX, |_| true))
    }

    fn size(&self) -> Result<usize> {
        Ok(self.records.read().unwrap_or_else(PoisonError::into_inner).len())
    }
}
