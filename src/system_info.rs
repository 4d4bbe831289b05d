use serde::Serialize;

const DEFAULT_HOSTNAME: &str = "localhost";

/// Identity of the service instance that runs the jobs.
///
/// The hostname ends up in every job record created on this instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub port: u16,
}

impl SystemInfo {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            port,
        }
    }

    /// Resolve the hostname from an explicit value, then the `HOSTNAME`
    /// environment variable, then `localhost`.
    pub fn resolve(hostname: Option<String>, port: u16) -> Self {
        let hostname = hostname
            .filter(|h| !h.trim().is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string());
        Self::new(hostname, port)
    }
}
