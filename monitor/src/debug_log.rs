/* neira:meta
id: NEI-20260913-091000-debug-log
intent: feature
summary: |
  Structured NDJSON debug log shared with the watched application.
  Records are mirrored to tracing.
*/
//! Structured debug log: one JSON object per line, shared with the
//! application that the daemon watches.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Severity levels understood by the metrics exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    System,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::System => "SYSTEM",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line of the debug log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// Append-only writer for the debug log.
#[derive(Debug, Clone)]
pub struct DebugLog {
    path: PathBuf,
}

impl DebugLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and mirror it to `tracing`. Write failures are logged
    /// and swallowed: losing a debug line must never stop the daemon.
    pub fn record(&self, level: LogLevel, message: &str, context: Value) {
        if let Err(e) = self.try_record(level, message, context) {
            error!(path = %self.path.display(), "debug log append failed: {e}");
        }
    }

    /// Like [`DebugLog::record`], but reports write failures to the caller.
    pub fn try_record(&self, level: LogLevel, message: &str, context: Value) -> std::io::Result<()> {
        let context = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        let ctx = Value::Object(context.clone());
        match level {
            LogLevel::Error => error!(context = %ctx, "{message}"),
            LogLevel::Warning => warn!(context = %ctx, "{message}"),
            LogLevel::Info | LogLevel::System => info!(context = %ctx, "{message}"),
            LogLevel::Debug => debug!(context = %ctx, "{message}"),
        }
        let entry = LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            level,
            message: message.to_string(),
            context,
        };
        self.append(&entry)
    }

    fn append(&self, entry: &LogRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(entry)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }

    /// The last `n` well-formed records, oldest first.
    pub fn tail(&self, n: usize) -> Vec<LogRecord> {
        let Ok(data) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let records: Vec<LogRecord> = data
            .lines()
            .filter_map(|ln| serde_json::from_str::<LogRecord>(ln).ok())
            .collect();
        let skip = records.len().saturating_sub(n);
        records.into_iter().skip(skip).collect()
    }
}
