//! SQLite schema definitions for the job record database.

use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Job records and their log
// =============================================================================

/// One row per job execution, keyed by job uri
const JOB_RECORDS_TABLE_V1: Table = Table {
    name: "job_records",
    columns: &[
        Column::new("job_uri", SqlType::Text).primary_key(),
        Column::new("job_type", SqlType::Text).non_null(),
        Column::new("started", SqlType::Text).non_null(),
        Column::new("stopped", SqlType::Text),
        Column::new("last_updated", SqlType::Text).non_null(),
        Column::new("hostname", SqlType::Text).non_null(),
        Column::new("status", SqlType::Text).non_null(),
    ],
    indices: &[
        ("idx_job_records_started", "started DESC"),
        ("idx_job_records_type_started", "job_type, started DESC"),
    ],
};

/// Append-only job log, insertion order given by id
const JOB_MESSAGES_TABLE_V1: Table = Table {
    name: "job_messages",
    columns: &[
        Column::new("id", SqlType::Integer).primary_key(),
        Column::new("job_uri", SqlType::Text)
            .non_null()
            .references("job_records", "job_uri"),
        Column::new("level", SqlType::Text).non_null(),
        Column::new("message", SqlType::Text).non_null(),
        Column::new("timestamp", SqlType::Text).non_null(),
    ],
    indices: &[("idx_job_messages_job_uri", "job_uri, id")],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// All versioned schemas for the job record database.
///
/// Version 1: job_records and job_messages tables
pub const JOB_STORE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[JOB_RECORDS_TABLE_V1, JOB_MESSAGES_TABLE_V1],
    migration: None, // Initial version has no migration
}];
