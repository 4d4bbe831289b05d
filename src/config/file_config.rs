use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub job_uri_base: Option<String>,

    // Event pipeline
    pub keep_alive_interval_secs: Option<u64>,
    pub max_restarts: Option<u32>,
    /// One of "ignore", "warn", "create"
    pub missing_record_policy: Option<String>,
    /// One of "sync", "queued"
    pub dispatch: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
