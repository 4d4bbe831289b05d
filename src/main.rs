use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobtrail::config::{self, DispatchMode};
use jobtrail::job_events::{JobEventSink, MissingRecordPolicy, QueuedJobEventBus};
use jobtrail::job_runner::{JobContext, JobError, JobRunnable, JobRunner, DEFAULT_JOB_URI_BASE};
use jobtrail::{
    Clock, InMemoryJobStore, JobEventBus, JobRecordStore, JobStatusService,
    PersistenceJobEventListener, SqliteJobStore, SystemClock,
};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// SQLite database file for job records. Records are kept in memory if omitted.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Hostname stored on job records. Defaults to $HOSTNAME.
    #[clap(long)]
    pub hostname: Option<String>,

    /// Port of this service instance.
    #[clap(short, long, default_value_t = config::DEFAULT_PORT)]
    pub port: u16,

    /// Seconds between KEEP_ALIVE events of a running job.
    #[clap(long, default_value_t = config::DEFAULT_KEEP_ALIVE_INTERVAL_SECS)]
    pub keep_alive_interval_secs: u64,

    /// How many times a failed job is retried before it is declared dead.
    #[clap(long, default_value_t = 0)]
    pub max_restarts: u32,

    /// What to do with events for jobs that have no record.
    #[clap(long, value_enum, default_value_t = MissingRecordPolicy::Ignore)]
    pub missing_record_policy: MissingRecordPolicy,

    /// How events reach the persistence listener.
    #[clap(long, value_enum, default_value_t = DispatchMode::Sync)]
    pub dispatch: DispatchMode,

    /// Prefix of generated job uris.
    #[clap(long, default_value = DEFAULT_JOB_URI_BASE)]
    pub job_uri_base: String,

    /// Number of steps the sample job performs.
    #[clap(long, default_value_t = 5)]
    pub steps: u32,

    /// Milliseconds each step of the sample job takes.
    #[clap(long, default_value_t = 500)]
    pub step_millis: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_path: args.db_path.clone(),
            hostname: args.hostname.clone(),
            port: args.port,
            keep_alive_interval_secs: args.keep_alive_interval_secs,
            max_restarts: args.max_restarts,
            missing_record_policy: args.missing_record_policy,
            dispatch: args.dispatch,
            job_uri_base: args.job_uri_base.clone(),
        }
    }
}

/// Job that works through a number of steps and logs each one.
struct SampleJob {
    steps: u32,
    step_duration: Duration,
}

impl JobRunnable for SampleJob {
    fn job_type(&self) -> &'static str {
        "sample"
    }

    fn name(&self) -> &'static str {
        "Sample job"
    }

    fn description(&self) -> &'static str {
        "Works through a fixed number of steps"
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        for step in 1..=self.steps {
            if ctx.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            std::thread::sleep(self.step_duration);
            ctx.info(format!("Finished step {}/{}", step, self.steps));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = config::AppConfig::resolve(&(&cli_args).into(), file_config)?;

    let store: Arc<dyn JobRecordStore> = match &app_config.db_path {
        Some(path) => {
            info!("Opening job store at {:?}", path);
            Arc::new(SqliteJobStore::new(path)?)
        }
        None => {
            info!("No db_path configured, keeping job records in memory");
            Arc::new(InMemoryJobStore::new())
        }
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let system_info = app_config.system_info();
    info!("Running as {}:{}", system_info.hostname, system_info.port);

    let listener = PersistenceJobEventListener::new(store.clone(), clock.clone(), system_info)
        .with_missing_record_policy(app_config.missing_record_policy);
    info!(
        "Events for unknown jobs: {:?}",
        listener.missing_record_policy()
    );
    let bus = Arc::new(JobEventBus::new());
    bus.subscribe(Arc::new(listener));

    let (sink, dispatcher_handle): (Arc<dyn JobEventSink>, _) = match app_config.dispatch {
        DispatchMode::Sync => (bus.clone() as Arc<dyn JobEventSink>, None),
        DispatchMode::Queued => {
            let (queued, handle) = QueuedJobEventBus::spawn(bus.clone());
            (Arc::new(queued) as Arc<dyn JobEventSink>, Some(handle))
        }
    };

    let shutdown_token = CancellationToken::new();
    let runner = JobRunner::new(sink, app_config.runner_settings(), shutdown_token.clone());
    let running = runner.start(Arc::new(SampleJob {
        steps: cli_args.steps,
        step_duration: Duration::from_millis(cli_args.step_millis),
    }));
    let job_uri = running.job_uri().clone();

    let outcome = tokio::select! {
        outcome = running.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling job {}", job_uri);
            shutdown_token.cancel();
            // Let the runner report the cancellation
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }
    };
    info!("Job {} finished: {:?}", job_uri, outcome);

    // Drain queued events before reading the record back
    drop(runner);
    if let Some(handle) = dispatcher_handle {
        if let Err(e) = handle.await {
            warn!("Job event dispatcher ended abnormally: {}", e);
        }
    }

    let status = JobStatusService::new(store, clock);
    match status.get(&job_uri)? {
        Some(details) => println!("{}", serde_json::to_string_pretty(&details)?),
        None => warn!("No record stored for job {}", job_uri),
    }

    Ok(())
}
