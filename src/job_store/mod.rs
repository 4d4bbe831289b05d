//! Durable job records.
//!
//! The [`JobRecordStore`] trait is the only thing the event listener knows
//! about persistence; two implementations ship with the crate.

mod in_memory_job_store;
mod models;
mod schema;
mod sqlite_job_store;

pub use in_memory_job_store::InMemoryJobStore;
pub use models::*;
pub use schema::JOB_STORE_VERSIONED_SCHEMAS;
pub use sqlite_job_store::SqliteJobStore;

use crate::job_events::JobUri;
use anyhow::Result;

/// Keyed store of job records.
///
/// Each call is atomic for the record it touches; there are no transactions
/// spanning several calls.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait JobRecordStore: Send + Sync {
    /// Insert the record, or replace the stored one (log included).
    fn create_or_update(&self, record: &JobRecord) -> Result<()>;
    fn find_one(&self, job_uri: &JobUri) -> Result<Option<JobRecord>>;
    /// Append to the record's log. Unknown identifiers are ignored.
    fn append_message(&self, job_uri: &JobUri, message: JobMessage) -> Result<()>;

    /// Most recently started jobs first.
    fn find_latest(&self, limit: usize) -> Result<Vec<JobRecord>>;
    fn find_latest_by_type(&self, job_type: &str, limit: usize) -> Result<Vec<JobRecord>>;
    fn find_all(&self) -> Result<Vec<JobRecord>>;
    fn size(&self) -> Result<usize>;
}
