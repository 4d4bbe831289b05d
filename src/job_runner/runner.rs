use super::context::JobContext;
use super::job::{JobError, JobRunnable};
use crate::job_events::{JobEventPublisher, JobEventSink, JobUri, StateChange};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_JOB_URI_BASE: &str = "/internal/jobs";

/// Shortest keep-alive period the runner accepts; `tokio::time::interval`
/// rejects zero.
pub const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct JobRunnerSettings {
    /// How often a running job reports KEEP_ALIVE.
    pub keep_alive_interval: Duration,
    /// How many times a failed job is executed again before it is declared dead.
    pub max_restarts: u32,
    /// Prefix of generated job uris.
    pub job_uri_base: String,
}

impl Default for JobRunnerSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(30),
            max_restarts: 0,
            job_uri_base: DEFAULT_JOB_URI_BASE.to_string(),
        }
    }
}

/// How a job execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Finished successfully, STOP was published.
    Stopped,
    /// Cancelled, STOP was published.
    Cancelled,
    /// Failed for good, DEAD was published.
    Dead,
}

/// Handle to a job started by [`JobRunner::start`].
pub struct RunningJob {
    job_uri: JobUri,
    publisher: JobEventPublisher,
    cancellation_token: CancellationToken,
    handle: JoinHandle<JobOutcome>,
}

impl RunningJob {
    pub fn job_uri(&self) -> &JobUri {
        &self.job_uri
    }

    /// Ask the job to stop at its next cancellation check.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> JobOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The runner died before reporting an outcome, so the record
                // would otherwise stay RUNNING.
                error!("Runner task for job {} failed: {}", self.job_uri, e);
                self.publisher.error(format!("Runner task failed: {}", e));
                self.publisher.state_changed(StateChange::Dead);
                JobOutcome::Dead
            }
        }
    }
}

/// Runs jobs and announces their lifecycle.
///
/// Each execution gets a fresh [`JobUri`] and publishes START, then
/// KEEP_ALIVE every `keep_alive_interval` while it runs, RESTART before a
/// retry, and finally STOP or DEAD.
pub struct JobRunner {
    sink: Arc<dyn JobEventSink>,
    settings: JobRunnerSettings,
    shutdown_token: CancellationToken,
}

impl JobRunner {
    pub fn new(
        sink: Arc<dyn JobEventSink>,
        mut settings: JobRunnerSettings,
        shutdown_token: CancellationToken,
    ) -> Self {
        if settings.keep_alive_interval < MIN_KEEP_ALIVE_INTERVAL {
            warn!(
                "Keep-alive interval {:?} is too short, using {:?}",
                settings.keep_alive_interval, MIN_KEEP_ALIVE_INTERVAL
            );
            settings.keep_alive_interval = MIN_KEEP_ALIVE_INTERVAL;
        }
        Self {
            sink,
            settings,
            shutdown_token,
        }
    }

    /// Start `job` on the current tokio runtime.
    pub fn start(&self, job: Arc<dyn JobRunnable>) -> RunningJob {
        let job_uri = JobUri::generate(&self.settings.job_uri_base);
        let publisher =
            JobEventPublisher::new(Arc::clone(&self.sink), job.definition(), job_uri.clone());
        let cancellation_token = self.shutdown_token.child_token();

        info!("Starting job {} ({})", job_uri, job.job_type());
        publisher.state_changed(StateChange::Start);

        let handle = tokio::spawn(run_to_completion(
            job,
            publisher.clone(),
            cancellation_token.clone(),
            self.settings.clone(),
        ));

        RunningJob {
            job_uri,
            publisher,
            cancellation_token,
            handle,
        }
    }
}

async fn run_to_completion(
    job: Arc<dyn JobRunnable>,
    publisher: JobEventPublisher,
    cancellation_token: CancellationToken,
    settings: JobRunnerSettings,
) -> JobOutcome {
    let job_uri = publisher.job_uri().clone();
    let start_time = Instant::now();

    let mut ticker = tokio::time::interval(settings.keep_alive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick, START was just published
    ticker.tick().await;

    let mut restarts = 0;
    loop {
        let ctx = JobContext::new(cancellation_token.clone(), publisher.clone());
        let execution_job = Arc::clone(&job);
        let mut execution = tokio::task::spawn_blocking(move || execution_job.execute(&ctx));

        let result = loop {
            tokio::select! {
                result = &mut execution => break result,
                _ = ticker.tick() => publisher.keep_alive(),
            }
        };
        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(())) => {
                info!("Job {} completed successfully in {:?}", job_uri, elapsed);
                publisher.state_changed(StateChange::Stop);
                return JobOutcome::Stopped;
            }
            Ok(Err(JobError::Cancelled)) => {
                info!("Job {} was cancelled after {:?}", job_uri, elapsed);
                publisher.warn("Job was cancelled");
                publisher.state_changed(StateChange::Stop);
                return JobOutcome::Cancelled;
            }
            Ok(Err(e)) if restarts < settings.max_restarts => {
                restarts += 1;
                warn!(
                    "Job {} failed after {:?}, restarting ({}/{}): {}",
                    job_uri, elapsed, restarts, settings.max_restarts, e
                );
                publisher.warn(format!(
                    "{}; restarting ({}/{})",
                    e, restarts, settings.max_restarts
                ));
                publisher.state_changed(StateChange::Restart);
            }
            Ok(Err(e)) => {
                error!("Job {} failed after {:?}: {}", job_uri, elapsed, e);
                publisher.error(e.to_string());
                publisher.state_changed(StateChange::Dead);
                return JobOutcome::Dead;
            }
            Err(e) => {
                error!("Job {} panicked after {:?}: {}", job_uri, elapsed, e);
                publisher.error(format!("Task panic: {}", e));
                publisher.state_changed(StateChange::Dead);
                return JobOutcome::Dead;
            }
        }
    }
}
