//! End-to-end tests for the job lifecycle pipeline
//!
//! Jobs run on a real `JobRunner`, their events go through a `JobEventBus`
//! into the `PersistenceJobEventListener`, and the resulting records are read
//! back from the store.

use chrono::{TimeZone, Utc};
use jobtrail::job_events::{
    EventLevel, JobDefinition, JobEventSink, MessageEvent, QueuedJobEventBus, StateChange,
    StateChangeEvent,
};
use jobtrail::job_runner::{JobOutcome, JobRunnerSettings};
use jobtrail::job_store::{JobStatus, Level};
use jobtrail::{
    Clock, FixedClock, InMemoryJobStore, JobContext, JobError, JobEventBus, JobEventListener,
    JobRecordStore, JobRunnable, JobRunner, JobStatusService, JobUri,
    PersistenceJobEventListener, SqliteJobStore, SystemClock, SystemInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

struct FlakyJob {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyJob {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl JobRunnable for FlakyJob {
    fn job_type(&self) -> &'static str {
        "flaky"
    }

    fn name(&self) -> &'static str {
        "Flaky job"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.info(format!("attempt {}", attempt));
        if attempt <= self.failures {
            return Err(JobError::ExecutionFailed(format!("attempt {} failed", attempt)));
        }
        Ok(())
    }
}

struct Pipeline {
    store: Arc<dyn JobRecordStore>,
    bus: Arc<JobEventBus>,
}

impl Pipeline {
    fn new(store: Arc<dyn JobRecordStore>) -> Self {
        let listener = PersistenceJobEventListener::new(
            store.clone(),
            Arc::new(SystemClock),
            SystemInfo::new("worker-1", 3001),
        );
        let bus = Arc::new(JobEventBus::new());
        bus.subscribe(Arc::new(listener));
        Self { store, bus }
    }

    fn runner(&self, sink: Arc<dyn JobEventSink>, max_restarts: u32) -> JobRunner {
        JobRunner::new(
            sink,
            JobRunnerSettings {
                keep_alive_interval: Duration::from_secs(60),
                max_restarts,
                ..Default::default()
            },
            CancellationToken::new(),
        )
    }
}

fn uri(s: &str) -> JobUri {
    JobUri::new(s).unwrap()
}

fn definition() -> JobDefinition {
    JobDefinition::new("someJobType", "someName", "")
}

// ============================================================================
// Runner -> bus -> listener -> store
// ============================================================================

#[tokio::test]
async fn test_successful_job_is_persisted_as_stopped() {
    let pipeline = Pipeline::new(Arc::new(InMemoryJobStore::new()));
    let runner = pipeline.runner(pipeline.bus.clone(), 0);

    let running = runner.start(Arc::new(FlakyJob::new(0)));
    let job_uri = running.job_uri().clone();
    assert_eq!(running.wait().await, JobOutcome::Stopped);

    let record = pipeline.store.find_one(&job_uri).unwrap().unwrap();
    assert_eq!(record.status(), JobStatus::Stopped);
    assert_eq!(record.job_type(), "flaky");
    assert_eq!(record.hostname(), "worker-1");
    assert!(record.stopped().is_some());
    assert!(!record.has_errors());
    assert_eq!(record.messages().len(), 1);
    assert_eq!(record.messages()[0].message, "attempt 1");
}

#[tokio::test]
async fn test_restarted_job_keeps_full_log_in_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("jobs.db");
    let pipeline = Pipeline::new(Arc::new(SqliteJobStore::new(&db_path).unwrap()));
    let runner = pipeline.runner(pipeline.bus.clone(), 2);

    let running = runner.start(Arc::new(FlakyJob::new(1)));
    let job_uri = running.job_uri().clone();
    assert_eq!(running.wait().await, JobOutcome::Stopped);

    // Reopen to read what actually hit the disk
    let reopened = SqliteJobStore::new(&db_path).unwrap();
    let record = reopened.find_one(&job_uri).unwrap().unwrap();
    assert_eq!(record.status(), JobStatus::Stopped);

    let log: Vec<(Level, &str)> = record
        .messages()
        .iter()
        .map(|m| (m.level, m.message.as_str()))
        .collect();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0], (Level::Info, "attempt 1"));
    assert_eq!(log[1].0, Level::Warning);
    assert!(log[1].1.contains("attempt 1 failed"));
    assert_eq!(log[2], (Level::Info, "attempt 2"));
}

#[tokio::test]
async fn test_dead_job_is_visible_to_status_service() {
    let pipeline = Pipeline::new(Arc::new(InMemoryJobStore::new()));
    let runner = pipeline.runner(pipeline.bus.clone(), 0);

    let running = runner.start(Arc::new(FlakyJob::new(5)));
    let job_uri = running.job_uri().clone();
    assert_eq!(running.wait().await, JobOutcome::Dead);

    let status = JobStatusService::new(pipeline.store.clone(), Arc::new(SystemClock));
    let details = status.get(&job_uri).unwrap().unwrap();
    assert_eq!(details.summary.status, "DEAD");
    assert!(details.summary.has_errors);
    assert_eq!(details.messages.last().unwrap().level, "ERROR");

    let latest = status.latest_by_type("flaky", 10).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].job_uri, job_uri.as_str());
}

#[tokio::test]
async fn test_queued_dispatch_persists_everything() {
    let pipeline = Pipeline::new(Arc::new(InMemoryJobStore::new()));
    let (queued, dispatcher) = QueuedJobEventBus::spawn(pipeline.bus.clone());
    let runner = pipeline.runner(Arc::new(queued), 0);

    let mut uris = Vec::new();
    let mut handles = Vec::new();
    for _ in 0..5 {
        let running = runner.start(Arc::new(FlakyJob::new(0)));
        uris.push(running.job_uri().clone());
        handles.push(running);
    }
    for running in handles {
        assert_eq!(running.wait().await, JobOutcome::Stopped);
    }
    drop(runner);
    dispatcher.await.unwrap();

    assert_eq!(pipeline.store.size().unwrap(), 5);
    for job_uri in &uris {
        let record = pipeline.store.find_one(job_uri).unwrap().unwrap();
        assert_eq!(record.status(), JobStatus::Stopped);
        assert_eq!(record.messages().len(), 1);
    }
}

// ============================================================================
// Listener against a real store
// ============================================================================

#[test]
fn test_start_creates_record_with_clock_and_host() {
    let instant = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let store = Arc::new(InMemoryJobStore::new());
    let listener = PersistenceJobEventListener::new(
        store.clone(),
        Arc::new(FixedClock::new(instant)),
        SystemInfo::new("localhost", 3001),
    );

    listener
        .on_event(&StateChangeEvent::new(definition(), uri("some/job"), StateChange::Start).into())
        .unwrap();

    let record = store.find_one(&uri("some/job")).unwrap().unwrap();
    assert_eq!(record.job_uri().as_str(), "some/job");
    assert_eq!(record.job_type(), "someJobType");
    assert_eq!(record.hostname(), "localhost");
    assert_eq!(record.started(), instant);
    assert_eq!(record.status(), JobStatus::Running);
}

#[test]
fn test_error_message_is_appended_to_existing_record() {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let store = Arc::new(InMemoryJobStore::new());
    let listener = PersistenceJobEventListener::new(
        store.clone(),
        clock.clone(),
        SystemInfo::new("localhost", 3001),
    );
    listener
        .on_event(&StateChangeEvent::new(definition(), uri("some/job"), StateChange::Start).into())
        .unwrap();

    listener
        .on_event(
            &MessageEvent::new(definition(), uri("some/job"), EventLevel::Error, "some message")
                .into(),
        )
        .unwrap();

    let record = store.find_one(&uri("some/job")).unwrap().unwrap();
    assert_eq!(record.messages().len(), 1);
    assert_eq!(record.messages()[0].level, Level::Error);
    assert_eq!(record.messages()[0].message, "some message");
    assert_eq!(record.messages()[0].timestamp, clock.now());
    assert!(record.has_errors());
}

#[test]
fn test_concurrent_messages_on_sqlite_are_not_lost() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteJobStore::new(temp_dir.path().join("jobs.db")).unwrap());
    let listener = Arc::new(PersistenceJobEventListener::new(
        store.clone(),
        Arc::new(SystemClock),
        SystemInfo::new("localhost", 3001),
    ));
    listener
        .on_event(&StateChangeEvent::new(definition(), uri("some/job"), StateChange::Start).into())
        .unwrap();

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let listener = listener.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    listener
                        .on_event(
                            &MessageEvent::new(
                                definition(),
                                uri("some/job"),
                                EventLevel::Info,
                                format!("thread {} line {}", t, i),
                            )
                            .into(),
                        )
                        .unwrap();
                    listener
                        .on_event(
                            &StateChangeEvent::new(
                                definition(),
                                uri("some/job"),
                                StateChange::KeepAlive,
                            )
                            .into(),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let record = store.find_one(&uri("some/job")).unwrap().unwrap();
    assert_eq!(record.messages().len(), 40);
    assert_eq!(record.status(), JobStatus::Running);
}
