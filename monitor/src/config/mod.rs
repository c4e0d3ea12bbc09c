/* neira:meta
id: NEI-20260912-103000-monitor-config
intent: feature
summary: |
  YAML configuration with MONITOR_* environment overrides.
  Relative paths resolve against the project root.
*/
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MonitorError, Result};

/// Reads a boolean flag from the environment.
/// Returns `default` when the variable is unset.
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

/// Reads and parses a value from the environment, falling back to `default`
/// when the variable is unset or unparsable.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Daemon and exporter configuration. Loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub watch: Vec<WatchTarget>,
    pub services: Vec<ServiceTarget>,
    pub workloads: Vec<WorkloadTarget>,
    /// Disables workload probing entirely, e.g. on hosts without a container runtime.
    pub workloads_enabled: bool,
    pub intervals: IntervalsConfig,
    pub thresholds: ThresholdsConfig,
    pub probe_timeout_secs: u64,
    pub exporter: ExporterConfig,
    /// Application logs scanned for fresh error lines.
    pub tail_logs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub project_root: PathBuf,
    pub content_root: PathBuf,
    pub logs_dir: PathBuf,
    pub debug_log: PathBuf,
    pub health_report: PathBuf,
    pub snapshot: PathBuf,
    pub startup_artifact: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            content_root: PathBuf::from("blackcnote/wp-content"),
            logs_dir: PathBuf::from("logs"),
            debug_log: PathBuf::from("logs/blackcnote-debug.log"),
            health_report: PathBuf::from("logs/health-report.json"),
            snapshot: PathBuf::from("logs/file-snapshot.json"),
            startup_artifact: PathBuf::from("start-blackcnote.sh"),
        }
    }
}

/// A directory tree watched for content changes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WatchTarget {
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    ["php", "js", "css", "html", "json"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// An HTTP endpoint whose reachability is part of the health report.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub required: bool,
}

/// A named container-style unit checked by name.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WorkloadTarget {
    pub name: String,
    /// A critical workload that is not running counts as critical, others as warnings.
    #[serde(default)]
    pub critical: bool,
}

/// Action cadences, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub base: u64,
    pub backoff: u64,
    pub change_detection: u64,
    pub system_status: u64,
    pub workloads: u64,
    pub log_scan: u64,
    pub health_check: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            base: 30,
            backoff: 60,
            change_detection: 30,
            system_status: 60,
            workloads: 120,
            log_scan: 30,
            health_check: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub memory_warning_bytes: u64,
    pub disk_critical_percent: f64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            memory_warning_bytes: 100 * 1024 * 1024,
            disk_critical_percent: 90.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub port: u16,
    pub connection_timeout_secs: u64,
    pub poll_timeout_ms: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            port: 9091,
            connection_timeout_secs: 30,
            poll_timeout_ms: 1000,
        }
    }
}

impl ExporterConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Port to serve on: an explicit request wins over the configured port.
    pub fn serve_port(&self, requested: Option<u16>) -> u16 {
        requested.unwrap_or(self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        let service = |name: &str, url: &str, required: bool| ServiceTarget {
            name: name.into(),
            url: url.into(),
            required,
        };
        let workload = |name: &str, critical: bool| WorkloadTarget {
            name: name.into(),
            critical,
        };
        Self {
            paths: PathsConfig::default(),
            watch: vec![
                WatchTarget {
                    root: PathBuf::from("blackcnote/wp-content/themes/blackcnote"),
                    extensions: default_extensions(),
                },
                WatchTarget {
                    root: PathBuf::from("blackcnote/wp-content/plugins"),
                    extensions: vec!["php".into(), "js".into()],
                },
            ],
            services: vec![
                service("wordpress", "http://localhost:8888", true),
                service("react", "http://localhost:5174", false),
                service("phpmyadmin", "http://localhost:8080", false),
                service("mailhog", "http://localhost:8025", false),
                service("redis-commander", "http://localhost:8081", false),
                service("browsersync", "http://localhost:3000", false),
            ],
            workloads: vec![
                workload("blackcnote-wordpress", true),
                workload("blackcnote-mysql", true),
                workload("blackcnote-redis", true),
                workload("blackcnote-react", false),
                workload("blackcnote-phpmyadmin", false),
                workload("blackcnote-mailhog", false),
            ],
            workloads_enabled: true,
            intervals: IntervalsConfig::default(),
            thresholds: ThresholdsConfig::default(),
            probe_timeout_secs: 5,
            exporter: ExporterConfig::default(),
            tail_logs: vec![PathBuf::from("blackcnote/wp-content/debug.log")],
        }
    }
}

impl Config {
    /// Load configuration: YAML from `MONITOR_CONFIG` when set, defaults
    /// otherwise, then environment overrides.
    pub fn load() -> Result<Self> {
        let base = match std::env::var("MONITOR_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides().resolved())
    }

    /// Load configuration from an explicit YAML file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self::from_file(path)?.with_env_overrides().resolved())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.intervals.base == 0 {
            return Err(MonitorError::Config("intervals.base must be > 0".into()));
        }
        if !(0.0..=100.0).contains(&self.thresholds.disk_critical_percent) {
            return Err(MonitorError::Config(
                "thresholds.disk_critical_percent must be within 0..=100".into(),
            ));
        }
        if let Some(t) = self.services.iter().find(|t| t.url.is_empty()) {
            return Err(MonitorError::Config(format!("service {} has no url", t.name)));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var("MONITOR_PROJECT_ROOT") {
            self.paths.project_root = PathBuf::from(root);
        }
        if let Ok(logs) = std::env::var("MONITOR_LOGS_DIR") {
            let logs = PathBuf::from(logs);
            self.paths.debug_log = logs.join("blackcnote-debug.log");
            self.paths.health_report = logs.join("health-report.json");
            self.paths.snapshot = logs.join("file-snapshot.json");
            self.paths.logs_dir = logs;
        }
        self.exporter.port = env_parse("MONITOR_EXPORTER_PORT", self.exporter.port);
        self.workloads_enabled = env_flag("MONITOR_WORKLOADS_ENABLED", self.workloads_enabled);
        self
    }

    /// Anchor every relative path at `project_root`.
    pub fn resolved(mut self) -> Self {
        let root = self.paths.project_root.clone();
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        anchor(&mut self.paths.content_root);
        anchor(&mut self.paths.logs_dir);
        anchor(&mut self.paths.debug_log);
        anchor(&mut self.paths.health_report);
        anchor(&mut self.paths.snapshot);
        anchor(&mut self.paths.startup_artifact);
        for target in &mut self.watch {
            anchor(&mut target.root);
        }
        for log in &mut self.tail_logs {
            anchor(log);
        }
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn parses_true_values() {
        std::env::set_var("ENV_FLAG_TEST_TRUE", "1");
        assert!(env_flag("ENV_FLAG_TEST_TRUE", false));
        std::env::set_var("ENV_FLAG_TEST_TRUE", "TRUE");
        assert!(env_flag("ENV_FLAG_TEST_TRUE", false));
        std::env::remove_var("ENV_FLAG_TEST_TRUE");
    }

    #[test]
    #[serial]
    fn parses_false_and_default() {
        std::env::set_var("ENV_FLAG_TEST_FALSE", "0");
        assert!(!env_flag("ENV_FLAG_TEST_FALSE", true));
        std::env::remove_var("ENV_FLAG_TEST_FALSE");
        assert!(env_flag("ENV_FLAG_TEST_FALSE", true));
    }

    #[test]
    #[serial]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("ENV_PARSE_TEST_PORT", "not-a-port");
        assert_eq!(env_parse("ENV_PARSE_TEST_PORT", 9091u16), 9091);
        std::env::set_var("ENV_PARSE_TEST_PORT", "9500");
        assert_eq!(env_parse("ENV_PARSE_TEST_PORT", 9091u16), 9500);
        std::env::remove_var("ENV_PARSE_TEST_PORT");
    }

    #[test]
    fn yaml_overrides_only_given_fields() {
        let cfg = Config::from_yaml(
            r#"
workloads:
  - name: db
    critical: true
  - name: mailer
intervals:
  base: 10
exporter:
  port: 9200
"#,
        )
        .unwrap();
        assert_eq!(cfg.workloads.len(), 2);
        assert!(cfg.workloads[0].critical);
        assert!(!cfg.workloads[1].critical);
        assert_eq!(cfg.intervals.base, 10);
        assert_eq!(cfg.intervals.workloads, 120);
        assert_eq!(cfg.exporter.port, 9200);
        assert_eq!(cfg.exporter.connection_timeout_secs, 30);
        assert_eq!(cfg.thresholds.memory_warning_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn rejects_zero_base_interval() {
        let err = Config::from_yaml("intervals:\n  base: 0\n").unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    #[serial]
    fn relative_paths_resolve_against_project_root() {
        std::env::set_var("MONITOR_PROJECT_ROOT", "/srv/blackcnote");
        std::env::remove_var("MONITOR_LOGS_DIR");
        std::env::remove_var("MONITOR_CONFIG");
        let cfg = Config::load().unwrap();
        std::env::remove_var("MONITOR_PROJECT_ROOT");
        assert_eq!(
            cfg.paths.health_report,
            PathBuf::from("/srv/blackcnote/logs/health-report.json")
        );
        assert!(cfg.watch.iter().all(|w| w.root.starts_with("/srv/blackcnote")));
    }

    #[test]
    #[serial]
    fn serve_port_follows_config_and_environment() {
        std::env::remove_var("MONITOR_CONFIG");
        std::env::remove_var("MONITOR_EXPORTER_PORT");
        let cfg = Config::load().unwrap();
        assert_eq!(cfg.exporter.serve_port(None), 9091);

        std::env::set_var("MONITOR_EXPORTER_PORT", "9500");
        let cfg = Config::load().unwrap();
        std::env::remove_var("MONITOR_EXPORTER_PORT");
        assert_eq!(cfg.exporter.serve_port(None), 9500);
        assert_eq!(cfg.exporter.serve_port(Some(9300)), 9300);

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("monitor.yaml");
        std::fs::write(&file, "exporter:\n  port: 9200\n").unwrap();
        let cfg = Config::load_from(&file).unwrap();
        assert_eq!(cfg.exporter.serve_port(None), 9200);
    }
}
