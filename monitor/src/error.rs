/* neira:meta
id: NEI-20260912-101500-monitor-error
intent: feature
summary: Error enum shared by probes, stores, servers and config loading.
*/
use thiserror::Error;

/// Errors surfaced by the monitor's probes, stores and servers.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("external command failed: {0}")]
    Command(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    pub fn command(msg: impl Into<String>) -> Self {
        MonitorError::Command(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
