use super::models::{JobMessage, JobRecord, JobStatus, Level};
use super::schema::JOB_STORE_VERSIONED_SCHEMAS;
use super::JobRecordStore;
use crate::job_events::JobUri;
use crate::sqlite_persistence::{read_schema_version, BASE_DB_VERSION};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

const RECORD_COLUMNS: &str = "job_uri, job_type, started, stopped, last_updated, hostname, status";

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path).context("Failed to open job database")?;
        info!("Opened job database at {:?}", path);
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory job database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = JOB_STORE_VERSIONED_SCHEMAS
            .last()
            .ok_or_else(|| anyhow!("No job database schema defined"))?;

        match read_schema_version(&conn)? {
            None => {
                // Fresh database - create with latest schema
                info!("Creating job database schema version {}", latest.version);
                latest.create(&conn)?;
            }
            Some(db_version) => {
                let version_index = JOB_STORE_VERSIONED_SCHEMAS
                    .iter()
                    .position(|s| s.version == db_version)
                    .with_context(|| format!("Unknown job database version {}", db_version))?;
                JOB_STORE_VERSIONED_SCHEMAS[version_index]
                    .validate(&conn)
                    .with_context(|| {
                        format!(
                            "Job database schema validation failed for version {}",
                            db_version
                        )
                    })?;

                if db_version < latest.version {
                    info!(
                        "Migrating job database from version {} to {}",
                        db_version, latest.version
                    );
                    Self::migrate(&mut conn, db_version)?;
                }
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut reached = from_version;
        for schema in JOB_STORE_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > from_version)
        {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            reached = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + reached),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Fixed-width UTC so that text ordering matches time ordering.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    column,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    }

    fn invalid_text(column: usize, what: &str, value: &str) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            format!("invalid {}: {}", what, value).into(),
        )
    }

    /// Record row without its messages.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let job_uri: String = row.get(0)?;
        let started: String = row.get(2)?;
        let stopped: Option<String> = row.get(3)?;
        let last_updated: String = row.get(4)?;
        let status: String = row.get(6)?;

        Ok(JobRecord::from_parts(
            JobUri::new(job_uri.as_str()).map_err(|_| Self::invalid_text(0, "job uri", &job_uri))?,
            row.get(1)?,
            Self::parse_datetime(2, &started)?,
            stopped
                .map(|s| Self::parse_datetime(3, &s))
                .transpose()?,
            Self::parse_datetime(4, &last_updated)?,
            row.get(5)?,
            JobStatus::parse(&status).ok_or_else(|| Self::invalid_text(6, "status", &status))?,
        ))
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<JobMessage> {
        let level: String = row.get(0)?;
        let timestamp: String = row.get(2)?;
        Ok(JobMessage::new(
            Level::parse(&level).ok_or_else(|| Self::invalid_text(0, "level", &level))?,
            row.get::<_, String>(1)?,
            Self::parse_datetime(2, &timestamp)?,
        ))
    }

    fn load_messages(conn: &Connection, job_uri: &str) -> Result<Vec<JobMessage>> {
        let mut stmt = conn.prepare_cached(
            "SELECT level, message, timestamp FROM job_messages WHERE job_uri = ?1 ORDER BY id",
        )?;
        let messages = stmt
            .query_map(params![job_uri], Self::row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    fn attach_messages(conn: &Connection, record: JobRecord) -> Result<JobRecord> {
        let messages = Self::load_messages(conn, record.job_uri().as_str())?;
        Ok(record.with_messages(messages))
    }

    /// How many leading entries of `messages` are already stored for the job.
    ///
    /// `None` when the stored log is not a prefix of `messages` and has to be
    /// rewritten. Logs only grow through `JobRecord::append_message`, so a
    /// matching count and last entry identify the prefix.
    fn stored_log_prefix(
        conn: &Connection,
        job_uri: &str,
        messages: &[JobMessage],
    ) -> Result<Option<usize>> {
        let last_stored = conn
            .query_row(
                "SELECT level, message, timestamp FROM job_messages
                 WHERE job_uri = ?1 ORDER BY id DESC LIMIT 1",
                params![job_uri],
                Self::row_to_message,
            )
            .optional()?;
        let last_stored = match last_stored {
            Some(message) => message,
            None => return Ok(Some(0)),
        };

        let stored_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_messages WHERE job_uri = ?1",
            params![job_uri],
            |row| row.get(0),
        )?;
        let stored_count = stored_count as usize;
        if stored_count <= messages.len() && messages[stored_count - 1] == last_stored {
            Ok(Some(stored_count))
        } else {
            Ok(None)
        }
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<JobRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        records
            .into_iter()
            .map(|record| Self::attach_messages(&conn, record))
            .collect()
    }
}

impl JobRecordStore for SqliteJobStore {
    fn create_or_update(&self, record: &JobRecord) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let job_uri = record.job_uri().as_str();

        tx.execute(
            "INSERT INTO job_records
                (job_uri, job_type, started, stopped, last_updated, hostname, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(job_uri) DO UPDATE SET
                job_type = ?2, started = ?3, stopped = ?4, last_updated = ?5,
                hostname = ?6, status = ?7",
            params![
                job_uri,
                record.job_type(),
                Self::format_datetime(&record.started()),
                record.stopped().as_ref().map(Self::format_datetime),
                Self::format_datetime(&record.last_updated()),
                record.hostname(),
                record.status().as_str(),
            ],
        )?;

        // The stored log ends up equal to the record's log. Usually it is
        // already a prefix of it and only the new entries get written.
        let kept = match Self::stored_log_prefix(&tx, job_uri, record.messages())? {
            Some(kept) => kept,
            None => {
                tx.execute(
                    "DELETE FROM job_messages WHERE job_uri = ?1",
                    params![job_uri],
                )?;
                0
            }
        };
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO job_messages (job_uri, level, message, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for message in &record.messages()[kept..] {
                insert.execute(params![
                    job_uri,
                    message.level.as_str(),
                    message.message,
                    Self::format_datetime(&message.timestamp),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn find_one(&self, job_uri: &JobUri) -> Result<Option<JobRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!("SELECT {} FROM job_records WHERE job_uri = ?1", RECORD_COLUMNS),
                params![job_uri.as_str()],
                Self::row_to_record,
            )
            .optional()?;

        record
            .map(|record| Self::attach_messages(&conn, record))
            .transpose()
    }

    fn append_message(&self, job_uri: &JobUri, message: JobMessage) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let timestamp = Self::format_datetime(&message.timestamp);

        let inserted = tx.execute(
            "INSERT INTO job_messages (job_uri, level, message, timestamp)
             SELECT ?1, ?2, ?3, ?4 WHERE EXISTS (SELECT 1 FROM job_records WHERE job_uri = ?1)",
            params![job_uri.as_str(), message.level.as_str(), message.message, timestamp],
        )?;

        if inserted == 0 {
            debug!("Dropping message for unknown job {}", job_uri);
        } else {
            tx.execute(
                "UPDATE job_records SET last_updated = ?2 WHERE job_uri = ?1 AND last_updated < ?2",
                params![job_uri.as_str(), timestamp],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn find_latest(&self, limit: usize) -> Result<Vec<JobRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM job_records ORDER BY started DESC, job_uri LIMIT ?1",
                RECORD_COLUMNS
            ),
            params![limit.min(i64::MAX as usize) as i64],
        )
    }

    fn find_latest_by_type(&self, job_type: &str, limit: usize) -> Result<Vec<JobRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM job_records WHERE job_type = ?1
                 ORDER BY started DESC, job_uri LIMIT ?2",
                RECORD_COLUMNS
            ),
            params![job_type, limit.min(i64::MAX as usize) as i64],
        )
    }

    fn find_all(&self) -> Result<Vec<JobRecord>> {
        self.query_records(
            &format!(
                "SELECT {} FROM job_records ORDER BY started DESC, job_uri",
                RECORD_COLUMNS
            ),
            [],
        )
    }

    fn size(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM job_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
