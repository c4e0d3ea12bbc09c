/* neira:meta
id: NEI-20260917-094500-log-metrics
intent: feature
summary: Counters and gauges recomputed from the debug log on every export.
*/
//! Log-derived metrics: counters by level and last-seen gauges, recomputed
//! from the whole debug log on every export.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::debug_log::LogLevel;
use crate::error::Result;

pub const LOG_ENTRIES_TOTAL: &str = "blackcnote_debug_log_entries_total";
pub const ERRORS_TOTAL: &str = "blackcnote_debug_errors_total";
pub const WARNINGS_TOTAL: &str = "blackcnote_debug_warnings_total";
pub const INFO_TOTAL: &str = "blackcnote_debug_info_total";
pub const DEBUG_TOTAL: &str = "blackcnote_debug_debug_total";
pub const SYSTEM_TOTAL: &str = "blackcnote_debug_system_total";
pub const MEMORY_USAGE_BYTES: &str = "blackcnote_memory_usage_bytes";
pub const DISK_FREE_BYTES: &str = "blackcnote_disk_free_bytes";
pub const UPTIME_SECONDS: &str = "blackcnote_daemon_uptime_seconds";
pub const FILE_CHANGES_TOTAL: &str = "blackcnote_file_changes_total";
pub const CONTAINERS_RUNNING: &str = "blackcnote_containers_running";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub value: f64,
}

/// One export pass, in fixed metric order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    pub samples: Vec<MetricSample>,
}

impl MetricSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.samples.iter().find(|s| s.name == name).map(|s| s.value)
    }

    /// Plain-text exposition: comment header, blank line, one `name value` per line.
    pub fn render(&self, generated: DateTime<Utc>) -> String {
        let mut out = String::new();
        out.push_str("# BlackCnote Debug System Metrics\n");
        out.push_str(&format!("# Generated: {}\n", generated.to_rfc3339()));
        out.push('\n');
        for sample in &self.samples {
            out.push_str(sample.name);
            out.push(' ');
            out.push_str(&format_value(sample.value));
            out.push('\n');
        }
        out
    }
}

/// Integral values print without a fractional part.
pub fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[derive(Deserialize)]
struct RawLine {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    context: Option<Value>,
}

/// The context keys the exporter understands. Missing or ill-typed keys are `None`.
#[derive(Debug, Default, PartialEq)]
pub struct ContextFields {
    pub memory_usage: Option<f64>,
    pub uptime: Option<f64>,
    pub total_containers: Option<f64>,
    pub disk_free: Option<f64>,
    pub changes: Option<usize>,
}

impl ContextFields {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            memory_usage: map.get("memory_usage").and_then(number),
            uptime: map.get("uptime").and_then(number),
            total_containers: map.get("total_containers").and_then(number),
            disk_free: map.get("disk_free").and_then(number),
            changes: map.get("changes").and_then(Value::as_array).map(Vec::len),
        }
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Default)]
struct Totals {
    entries: u64,
    by_level: [u64; 5],
    memory_usage: f64,
    disk_free: f64,
    uptime: f64,
    file_changes: u64,
    containers: f64,
}

impl Totals {
    fn absorb(&mut self, line: RawLine) {
        self.entries += 1;
        if let Some(level) = line.level.as_deref() {
            let level = level.trim().to_ascii_uppercase();
            if let Some(idx) = LogLevel::ALL.iter().position(|l| l.as_str() == level) {
                self.by_level[idx] += 1;
            }
        }
        let Some(Value::Object(ctx)) = line.context else {
            return;
        };
        let fields = ContextFields::from_map(&ctx);
        if let Some(v) = fields.memory_usage {
            self.memory_usage = v;
        }
        if let Some(v) = fields.disk_free {
            self.disk_free = v;
        }
        if let Some(v) = fields.uptime {
            self.uptime = v;
        }
        if let Some(v) = fields.total_containers {
            self.containers = v;
        }
        if let Some(n) = fields.changes {
            self.file_changes += n as u64;
        }
    }

    fn into_set(self) -> MetricSet {
        let counter = |name: &'static str, help: &'static str, value: u64| MetricSample {
            name,
            help,
            kind: MetricKind::Counter,
            value: value as f64,
        };
        let gauge = |name: &'static str, help: &'static str, value: f64| MetricSample {
            name,
            help,
            kind: MetricKind::Gauge,
            value,
        };
        let [error, warning, info, debug, system] = self.by_level;
        MetricSet {
            samples: vec![
                counter(LOG_ENTRIES_TOTAL, "Total number of debug log entries", self.entries),
                counter(ERRORS_TOTAL, "Total number of ERROR entries", error),
                counter(WARNINGS_TOTAL, "Total number of WARNING entries", warning),
                counter(INFO_TOTAL, "Total number of INFO entries", info),
                counter(DEBUG_TOTAL, "Total number of DEBUG entries", debug),
                counter(SYSTEM_TOTAL, "Total number of SYSTEM entries", system),
                gauge(MEMORY_USAGE_BYTES, "Last reported memory usage in bytes", self.memory_usage),
                gauge(DISK_FREE_BYTES, "Last reported free disk space in bytes", self.disk_free),
                gauge(UPTIME_SECONDS, "Last reported uptime in seconds", self.uptime),
                counter(FILE_CHANGES_TOTAL, "Total number of detected file changes", self.file_changes),
                gauge(CONTAINERS_RUNNING, "Last reported number of running containers", self.containers),
            ],
        }
    }
}

/// Derives the metric set from the debug log.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    log_path: PathBuf,
}

impl MetricsAggregator {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Scan the whole log top to bottom. A missing log yields all zeros;
    /// lines that are not a JSON object are skipped.
    pub fn export(&self) -> Result<MetricSet> {
        let file = match File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Totals::default().into_set()),
            Err(e) => return Err(e.into()),
        };
        let mut totals = Totals::default();
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                // Non UTF-8 garbage is a malformed line like any other.
                Err(e) if e.kind() == ErrorKind::InvalidData => continue,
                Err(e) => return Err(e.into()),
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(raw) = serde_json::from_str::<RawLine>(&line) {
                totals.absorb(raw);
            }
        }
        Ok(totals.into_set())
    }
}
