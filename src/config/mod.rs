mod file_config;

pub use file_config::FileConfig;

use crate::job_events::MissingRecordPolicy;
use crate::job_runner::{JobRunnerSettings, DEFAULT_JOB_URI_BASE};
use crate::system_info::SystemInfo;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_KEEP_ALIVE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 3001;

/// How published events reach the listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DispatchMode {
    /// Listeners run on the publishing thread.
    #[default]
    Sync,
    /// Events are queued and delivered by a background task.
    Queued,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub hostname: Option<String>,
    pub port: u16,
    pub keep_alive_interval_secs: u64,
    pub max_restarts: u32,
    pub missing_record_policy: MissingRecordPolicy,
    pub dispatch: DispatchMode,
    pub job_uri_base: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            hostname: None,
            port: DEFAULT_PORT,
            keep_alive_interval_secs: DEFAULT_KEEP_ALIVE_INTERVAL_SECS,
            max_restarts: 0,
            missing_record_policy: MissingRecordPolicy::default(),
            dispatch: DispatchMode::default(),
            job_uri_base: DEFAULT_JOB_URI_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file. Records are kept in memory when absent.
    pub db_path: Option<PathBuf>,
    pub hostname: Option<String>,
    pub port: u16,
    pub keep_alive_interval_secs: u64,
    pub max_restarts: u32,
    pub missing_record_policy: MissingRecordPolicy,
    pub dispatch: DispatchMode,
    pub job_uri_base: String,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone());
        if let Some(parent) = db_path.as_ref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let hostname = file.hostname.or_else(|| cli.hostname.clone());
        let port = file.port.unwrap_or(cli.port);

        let keep_alive_interval_secs = file
            .keep_alive_interval_secs
            .unwrap_or(cli.keep_alive_interval_secs);
        if keep_alive_interval_secs == 0 {
            bail!("keep_alive_interval_secs must be greater than 0");
        }

        let max_restarts = file.max_restarts.unwrap_or(cli.max_restarts);

        let missing_record_policy = match file.missing_record_policy {
            Some(s) => match parse_missing_record_policy(&s) {
                Some(policy) => policy,
                None => bail!("Invalid missing_record_policy: {}", s),
            },
            None => cli.missing_record_policy,
        };

        let dispatch = match file.dispatch {
            Some(s) => match parse_dispatch_mode(&s) {
                Some(mode) => mode,
                None => bail!("Invalid dispatch mode: {}", s),
            },
            None => cli.dispatch,
        };

        let job_uri_base = file
            .job_uri_base
            .unwrap_or_else(|| cli.job_uri_base.clone());
        if job_uri_base.trim().is_empty() {
            bail!("job_uri_base must not be empty");
        }

        Ok(Self {
            db_path,
            hostname,
            port,
            keep_alive_interval_secs,
            max_restarts,
            missing_record_policy,
            dispatch,
            job_uri_base,
        })
    }

    pub fn system_info(&self) -> SystemInfo {
        SystemInfo::resolve(self.hostname.clone(), self.port)
    }

    pub fn runner_settings(&self) -> JobRunnerSettings {
        JobRunnerSettings {
            keep_alive_interval: Duration::from_secs(self.keep_alive_interval_secs),
            max_restarts: self.max_restarts,
            job_uri_base: self.job_uri_base.clone(),
        }
    }
}

/// Uses clap's ValueEnum trait for parsing.
fn parse_missing_record_policy(s: &str) -> Option<MissingRecordPolicy> {
    MissingRecordPolicy::from_str(s, true).ok()
}

fn parse_dispatch_mode(s: &str) -> Option<DispatchMode> {
    DispatchMode::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_missing_record_policy() {
        assert_eq!(
            parse_missing_record_policy("ignore"),
            Some(MissingRecordPolicy::Ignore)
        );
        assert_eq!(
            parse_missing_record_policy("warn"),
            Some(MissingRecordPolicy::Warn)
        );
        // Case insensitive
        assert_eq!(
            parse_missing_record_policy("CREATE"),
            Some(MissingRecordPolicy::Create)
        );
        assert!(parse_missing_record_policy("invalid").is_none());
    }

    #[test]
    fn test_parse_dispatch_mode() {
        assert_eq!(parse_dispatch_mode("sync"), Some(DispatchMode::Sync));
        assert_eq!(parse_dispatch_mode("Queued"), Some(DispatchMode::Queued));
        assert!(parse_dispatch_mode("async").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();

        assert!(config.db_path.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.keep_alive_interval_secs, 30);
        assert_eq!(config.max_restarts, 0);
        assert_eq!(config.missing_record_policy, MissingRecordPolicy::Ignore);
        assert_eq!(config.dispatch, DispatchMode::Sync);
        assert_eq!(config.job_uri_base, DEFAULT_JOB_URI_BASE);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/should/be/overridden/jobs.db")),
            hostname: Some("cli-host".to_string()),
            port: 4000,
            max_restarts: 1,
            dispatch: DispatchMode::Queued,
            ..Default::default()
        };

        let file_config = FileConfig {
            db_path: Some(temp_dir.path().join("jobs.db").to_string_lossy().to_string()),
            hostname: Some("toml-host".to_string()),
            keep_alive_interval_secs: Some(5),
            missing_record_policy: Some("warn".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_path, Some(temp_dir.path().join("jobs.db")));
        assert_eq!(config.hostname.as_deref(), Some("toml-host"));
        assert_eq!(config.keep_alive_interval_secs, 5);
        assert_eq!(config.missing_record_policy, MissingRecordPolicy::Warn);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.port, 4000);
        assert_eq!(config.max_restarts, 1);
        assert_eq!(config.dispatch, DispatchMode::Queued);
    }

    #[test]
    fn test_resolve_zero_keep_alive_error() {
        let cli = CliConfig {
            keep_alive_interval_secs: 0,
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("keep_alive_interval_secs"));
    }

    #[test]
    fn test_resolve_invalid_policy_error() {
        let file_config = FileConfig {
            missing_record_policy: Some("resurrect".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&CliConfig::default(), Some(file_config));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid missing_record_policy"));
    }

    #[test]
    fn test_resolve_invalid_dispatch_error() {
        let file_config = FileConfig {
            dispatch: Some("parallel".to_string()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&CliConfig::default(), Some(file_config));
        assert!(result.unwrap_err().to_string().contains("Invalid dispatch"));
    }

    #[test]
    fn test_resolve_nonexistent_db_dir_error() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent/path/that/should/not/exist/jobs.db")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_runner_settings_and_system_info() {
        let cli = CliConfig {
            hostname: Some("worker-7".to_string()),
            port: 9000,
            keep_alive_interval_secs: 12,
            max_restarts: 3,
            job_uri_base: "/jobs".to_string(),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();

        let settings = config.runner_settings();
        assert_eq!(settings.keep_alive_interval, Duration::from_secs(12));
        assert_eq!(settings.max_restarts, 3);
        assert_eq!(settings.job_uri_base, "/jobs");

        let info = config.system_info();
        assert_eq!(info.hostname, "worker-7");
        assert_eq!(info.port, 9000);
    }
}
