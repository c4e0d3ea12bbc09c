/* neira:meta
id: NEI-20260916-110000-health-aggregator
intent: feature
summary: Counting rule from probe outputs to healthy/degraded/critical.
*/
//! Severity-classified health report built from one round of probes.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::debug_log::{DebugLog, LogLevel};
use crate::error::Result;
use crate::nervous_system::host_metrics::ResourceSnapshot;
use crate::nervous_system::service_probe::{ProbeKind, ProbeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

impl OverallStatus {
    /// 0 critical issues is healthy, 1-2 degraded, 3 or more critical.
    pub fn from_critical_count(count: u32) -> Self {
        match count {
            0 => OverallStatus::Healthy,
            1 | 2 => OverallStatus::Degraded,
            _ => OverallStatus::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Healthy => "healthy",
            OverallStatus::Degraded => "degraded",
            OverallStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Existence checks on the deployment layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemChecks {
    pub startup_artifact: bool,
    pub project_root: bool,
    pub content_root: bool,
}

impl FileSystemChecks {
    pub fn probe(startup_artifact: &Path, project_root: &Path, content_root: &Path) -> Self {
        Self {
            startup_artifact: startup_artifact.exists(),
            project_root: project_root.is_dir(),
            content_root: content_root.is_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRuntimeChecks {
    /// `None` when workload probing is disabled.
    pub engine_available: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub file_system_checks: FileSystemChecks,
    pub container_runtime_checks: ContainerRuntimeChecks,
    pub service_results: Vec<ProbeResult>,
    pub workload_results: Vec<ProbeResult>,
    pub resource_snapshot: ResourceSnapshot,
    pub overall_status: OverallStatus,
    pub critical_count: u32,
    pub warning_count: u32,
    pub issues: Vec<Issue>,
}

/// Combine probe outputs into a report. Rules apply in a fixed order and each
/// adds to the counts independently; the status depends on the critical count only.
pub fn aggregate(
    startup: &FileSystemChecks,
    runtime: &ContainerRuntimeChecks,
    service_results: Vec<ProbeResult>,
    workload_results: Vec<ProbeResult>,
    resources: ResourceSnapshot,
    disk_critical_percent: f64,
) -> HealthReport {
    let mut issues = Vec::new();
    let mut critical = |message: String| {
        issues.push(Issue {
            severity: Severity::Critical,
            message,
        })
    };

    if !startup.startup_artifact {
        critical("startup artifact missing".into());
    }
    if !startup.project_root {
        critical("project root missing".into());
    }
    if !startup.content_root {
        critical("content root missing".into());
    }
    if runtime.engine_available == Some(false) {
        critical("container runtime unreachable".into());
    }

    for result in service_results.iter().chain(workload_results.iter()) {
        if result.reachable {
            continue;
        }
        let what = match result.kind {
            ProbeKind::Service => "service",
            ProbeKind::Workload => "workload",
        };
        let detail = result.error_detail.as_deref().unwrap_or("unavailable");
        issues.push(Issue {
            severity: if result.critical {
                Severity::Critical
            } else {
                Severity::Warning
            },
            message: format!("{what} {} not healthy: {detail}", result.target),
        });
    }

    let disk_used = resources.disk_used_percent();
    if disk_used > disk_critical_percent {
        issues.push(Issue {
            severity: Severity::Critical,
            message: format!("disk usage {disk_used:.1}% above {disk_critical_percent}%"),
        });
    }

    let critical_count = issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .count() as u32;
    let warning_count = issues.len() as u32 - critical_count;

    HealthReport {
        timestamp: Utc::now(),
        file_system_checks: startup.clone(),
        container_runtime_checks: runtime.clone(),
        service_results,
        workload_results,
        resource_snapshot: resources,
        overall_status: OverallStatus::from_critical_count(critical_count),
        critical_count,
        warning_count,
        issues,
    }
}

impl HealthReport {
    /// Record each issue plus one summary line in the debug log.
    pub fn log(&self, log: &DebugLog) {
        for issue in &self.issues {
            let level = match issue.severity {
                Severity::Critical => LogLevel::Error,
                Severity::Warning => LogLevel::Warning,
            };
            log.record(level, &issue.message, json!({ "health_check": true }));
        }
        let level = match self.overall_status {
            OverallStatus::Healthy => LogLevel::Info,
            OverallStatus::Degraded => LogLevel::Warning,
            OverallStatus::Critical => LogLevel::Error,
        };
        let running = self.workload_results.iter().filter(|r| r.reachable).count();
        log.record(
            level,
            "Health check completed",
            json!({
                "status": self.overall_status,
                "critical_count": self.critical_count,
                "warning_count": self.warning_count,
                "total_containers": running,
                "disk_free": self.resource_snapshot.disk_free,
            }),
        );
    }

    /// Write the report, replacing the previous one.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Option<Self> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// Three-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "Overall Status: {}\nCritical Issues: {}\nWarnings: {}",
            self.overall_status.as_str().to_uppercase(),
            self.critical_count,
            self.warning_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn all_present() -> FileSystemChecks {
        FileSystemChecks {
            startup_artifact: true,
            project_root: true,
            content_root: true,
        }
    }

    fn engine(up: bool) -> ContainerRuntimeChecks {
        ContainerRuntimeChecks {
            engine_available: Some(up),
        }
    }

    fn svc(name: &str, up: bool, required: bool) -> ProbeResult {
        if up {
            ProbeResult::up(name, ProbeKind::Service, required, None)
        } else {
            ProbeResult::down(name, ProbeKind::Service, required, "refused")
        }
    }

    fn wl(name: &str, up: bool, critical: bool) -> ProbeResult {
        if up {
            ProbeResult::up(name, ProbeKind::Workload, critical, None)
        } else {
            ProbeResult::down(name, ProbeKind::Workload, critical, "Exited (1)")
        }
    }

    fn disk(free: u64, total: u64) -> ResourceSnapshot {
        ResourceSnapshot {
            disk_free: free,
            disk_total: total,
            ..Default::default()
        }
    }

    #[test]
    fn status_mapping_is_exact() {
        assert_eq!(OverallStatus::from_critical_count(0), OverallStatus::Healthy);
        assert_eq!(OverallStatus::from_critical_count(1), OverallStatus::Degraded);
        assert_eq!(OverallStatus::from_critical_count(2), OverallStatus::Degraded);
        assert_eq!(OverallStatus::from_critical_count(3), OverallStatus::Critical);
        assert_eq!(OverallStatus::from_critical_count(40), OverallStatus::Critical);
    }

    #[test]
    fn all_green_is_healthy() {
        let report = aggregate(
            &all_present(),
            &engine(true),
            vec![svc("wp", true, true), svc("mail", true, false)],
            vec![wl("db", true, true)],
            disk(50, 100),
            90.0,
        );
        assert_eq!(report.overall_status, OverallStatus::Healthy);
        assert_eq!((report.critical_count, report.warning_count), (0, 0));
    }

    #[test]
    fn optional_failures_only_warn() {
        let report = aggregate(
            &all_present(),
            &engine(true),
            vec![svc("mail", false, false)],
            vec![wl("phpmyadmin", false, false)],
            disk(50, 100),
            90.0,
        );
        assert_eq!(report.overall_status, OverallStatus::Healthy);
        assert_eq!((report.critical_count, report.warning_count), (0, 2));
    }

    #[test]
    fn each_rule_counts_independently() {
        let startup = FileSystemChecks {
            startup_artifact: false,
            ..all_present()
        };
        let report = aggregate(
            &startup,
            &engine(false),
            vec![svc("wp", false, true), svc("mail", false, false)],
            vec![wl("db", false, true), wl("react", false, false)],
            disk(5, 100),
            90.0,
        );
        // artifact, engine, required service, critical workload, disk
        assert_eq!(report.critical_count, 5);
        assert_eq!(report.warning_count, 2);
        assert_eq!(report.overall_status, OverallStatus::Critical);
    }

    #[test]
    fn two_criticals_degrade() {
        let report = aggregate(
            &all_present(),
            &engine(true),
            vec![svc("wp", false, true)],
            vec![],
            disk(1, 100),
            90.0,
        );
        assert_eq!(report.critical_count, 2);
        assert_eq!(report.overall_status, OverallStatus::Degraded);
    }

    #[test]
    fn disabled_runtime_is_not_counted() {
        let report = aggregate(
            &all_present(),
            &ContainerRuntimeChecks {
                engine_available: None,
            },
            vec![],
            vec![],
            disk(0, 0),
            90.0,
        );
        assert_eq!(report.critical_count, 0);
    }

    #[test]
    fn save_replaces_previous_report() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/health-report.json");
        let first = aggregate(&all_present(), &engine(false), vec![], vec![], disk(50, 100), 90.0);
        first.save(&path).unwrap();
        let second = aggregate(&all_present(), &engine(true), vec![], vec![], disk(50, 100), 90.0);
        second.save(&path).unwrap();

        let loaded = HealthReport::load(&path).unwrap();
        assert_eq!(loaded, second);
        assert_eq!(fs::read_dir(dir.path().join("logs")).unwrap().count(), 1);
    }

    #[test]
    fn summary_has_three_lines() {
        let report = aggregate(&all_present(), &engine(false), vec![], vec![], disk(50, 100), 90.0);
        let summary = report.summary();
        assert_eq!(
            summary,
            "Overall Status: DEGRADED\nCritical Issues: 1\nWarnings: 0"
        );
    }

    #[test]
    fn log_writes_issue_lines_and_summary() {
        let dir = tempdir().unwrap();
        let log = DebugLog::new(dir.path().join("debug.log"));
        let report = aggregate(
            &all_present(),
            &engine(true),
            vec![svc("mail", false, false)],
            vec![wl("db", true, true)],
            disk(50, 100),
            90.0,
        );
        report.log(&log);
        let records = log.tail(10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, LogLevel::Warning);
        assert_eq!(records[1].context["status"], "healthy");
        assert_eq!(records[1].context["total_containers"], 1);
    }
}
