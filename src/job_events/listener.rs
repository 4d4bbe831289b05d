use super::events::{JobEvent, JobEventError, JobUri, MessageEvent, StateChange, StateChangeEvent};
use super::key_lock::KeyedLocks;
use crate::clock::Clock;
use crate::job_store::{JobMessage, JobRecord, JobRecordStore, Level};
use crate::system_info::SystemInfo;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives every event published by running jobs.
pub trait JobEventListener: Send + Sync {
    fn consume_state_change(&self, event: &StateChangeEvent) -> Result<(), JobEventError>;

    fn consume_message(&self, event: &MessageEvent) -> Result<(), JobEventError>;

    /// Route an event to the matching `consume_*` method.
    fn on_event(&self, event: &JobEvent) -> Result<(), JobEventError> {
        match event {
            JobEvent::StateChange(event) => self.consume_state_change(event),
            JobEvent::Message(event) => self.consume_message(event),
        }
    }
}

/// What to do with a non-START transition for a job that has no record.
///
/// This happens when START was lost or has not been persisted yet, e.g.
/// after a restart of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MissingRecordPolicy {
    /// Drop the event.
    #[default]
    Ignore,
    /// Drop the event and log a warning.
    Warn,
    /// Create a minimal record and apply the transition to it.
    Create,
}

/// Folds job events into [`JobRecord`]s.
///
/// Every store interaction for a given job uri happens under that uri's
/// lock, so a lookup-mutate-persist sequence cannot interleave with another
/// event for the same job.
pub struct PersistenceJobEventListener {
    store: Arc<dyn JobRecordStore>,
    clock: Arc<dyn Clock>,
    system_info: SystemInfo,
    missing_record_policy: MissingRecordPolicy,
    locks: KeyedLocks<JobUri>,
}

impl PersistenceJobEventListener {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        clock: Arc<dyn Clock>,
        system_info: SystemInfo,
    ) -> Self {
        Self {
            store,
            clock,
            system_info,
            missing_record_policy: MissingRecordPolicy::default(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn with_missing_record_policy(mut self, policy: MissingRecordPolicy) -> Self {
        self.missing_record_policy = policy;
        self
    }

    pub fn missing_record_policy(&self) -> MissingRecordPolicy {
        self.missing_record_policy
    }

    fn start(&self, event: &StateChangeEvent) -> Result<(), JobEventError> {
        // A START for a known uri overwrites the old record.
        let record = JobRecord::new(
            event.job_uri().clone(),
            event.job_type(),
            self.clock.now(),
            self.system_info.hostname.as_str(),
        );
        self.store.create_or_update(&record)?;
        debug!("Job {} ({}) started", event.job_uri(), event.job_type());
        Ok(())
    }

    fn update(&self, event: &StateChangeEvent) -> Result<(), JobEventError> {
        let now = self.clock.now();
        let mut record = match self.store.find_one(event.job_uri())? {
            Some(record) => record,
            None => match self.missing_record_policy {
                MissingRecordPolicy::Ignore => {
                    debug!(
                        "Ignoring {} for unknown job {}",
                        event.state(),
                        event.job_uri()
                    );
                    return Ok(());
                }
                MissingRecordPolicy::Warn => {
                    warn!(
                        "Received {} for unknown job {} ({}), dropping it",
                        event.state(),
                        event.job_uri(),
                        event.job_type()
                    );
                    return Ok(());
                }
                MissingRecordPolicy::Create => {
                    warn!(
                        "Received {} for unknown job {} ({}), creating a record",
                        event.state(),
                        event.job_uri(),
                        event.job_type()
                    );
                    JobRecord::new(
                        event.job_uri().clone(),
                        event.job_type(),
                        now,
                        self.system_info.hostname.as_str(),
                    )
                }
            },
        };

        apply_transition(&mut record, event.state(), now);
        self.store.create_or_update(&record)?;
        debug!(
            "Job {} is now {} after {}",
            event.job_uri(),
            record.status().as_str(),
            event.state()
        );
        Ok(())
    }
}

fn apply_transition(record: &mut JobRecord, state: StateChange, now: DateTime<Utc>) {
    match state {
        StateChange::KeepAlive => record.ping(now),
        StateChange::Restart => record.restart(now),
        StateChange::Stop => record.stop(now),
        StateChange::Dead => record.dead(now),
        // Handled by creating a fresh record.
        StateChange::Start => {}
    }
}

impl JobEventListener for PersistenceJobEventListener {
    fn consume_state_change(&self, event: &StateChangeEvent) -> Result<(), JobEventError> {
        self.locks.with_lock(event.job_uri(), || match event.state() {
            StateChange::Start => self.start(event),
            _ => self.update(event),
        })
    }

    fn consume_message(&self, event: &MessageEvent) -> Result<(), JobEventError> {
        self.locks.with_lock(event.job_uri(), || {
            // Stamped under the lock so the log stays in time order.
            let message = JobMessage::new(
                Level::from(event.level()),
                event.message(),
                self.clock.now(),
            );
            self.store.append_message(event.job_uri(), message)?;
            Ok(())
        })
    }
}
