use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::debug_log::{DebugLog, LogLevel};
use crate::error::Result;
use crate::health::{self, ContainerRuntimeChecks, FileSystemChecks, HealthReport};
use crate::nervous_system::change_detector::ChangeDetector;
use crate::nervous_system::host_metrics::{HostMetrics, ResourceChecks};
use crate::nervous_system::log_tail::LogTailScanner;
use crate::nervous_system::service_probe::ServiceProber;
use crate::nervous_system::workload_probe::{self, DockerCli, WorkloadStatusSource};
use crate::scheduler::{Task, TaskRunner};

/// All probes of the daemon plus the state they carry between runs.
pub struct Monitor {
    config: Config,
    log: DebugLog,
    detector: ChangeDetector,
    host: HostMetrics,
    checks: ResourceChecks,
    services: ServiceProber,
    workloads: Box<dyn WorkloadStatusSource>,
    tail: LogTailScanner,
    started: Instant,
}

impl Monitor {
    /// Build a monitor that checks workloads through the `docker` CLI.
    pub fn new(config: Config) -> Result<Self> {
        let source = DockerCli::new(config.probe_timeout());
        Self::with_workload_source(config, Box::new(source))
    }

    pub fn with_workload_source(
        config: Config,
        workloads: Box<dyn WorkloadStatusSource>,
    ) -> Result<Self> {
        let log = DebugLog::new(&config.paths.debug_log);
        let detector = ChangeDetector::new(
            &config.paths.project_root,
            config.watch.clone(),
            log.clone(),
        )
        .with_snapshot_file(&config.paths.snapshot);
        let checks = ResourceChecks {
            memory_warning_bytes: config.thresholds.memory_warning_bytes,
            required_dirs: vec![
                config.paths.project_root.clone(),
                config.paths.content_root.clone(),
            ],
        };
        Ok(Self {
            host: HostMetrics::new(&config.paths.project_root),
            services: ServiceProber::new(config.probe_timeout())?,
            tail: LogTailScanner::new(config.tail_logs.clone()),
            detector,
            checks,
            workloads,
            log,
            config,
            started: Instant::now(),
        })
    }

    pub fn log(&self) -> &DebugLog {
        &self.log
    }

    fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    async fn system_status(&mut self) -> Result<()> {
        let snap = self.host.sample();
        self.checks.evaluate(&snap, &self.log);
        self.log.record(
            LogLevel::System,
            "System status",
            json!({
                "memory_usage": snap.mem_used,
                "memory_peak": snap.mem_peak,
                "disk_free": snap.disk_free,
                "disk_total": snap.disk_total,
                "load_average": snap.load_avg,
                "load_is_fallback": snap.load_is_fallback,
                "host_uptime": snap.uptime,
                "uptime": self.uptime_secs(),
            }),
        );
        Ok(())
    }

    async fn probe_workloads(&mut self) -> Result<()> {
        if !self.workloads.engine_available().await {
            self.log.record(
                LogLevel::Error,
                "Container runtime unreachable",
                json!({ "total_containers": 0 }),
            );
            return Ok(());
        }
        let results = workload_probe::probe_workloads(self.workloads.as_ref(), &self.config.workloads).await;
        for r in results.iter().filter(|r| !r.reachable) {
            let level = if r.critical {
                LogLevel::Error
            } else {
                LogLevel::Warning
            };
            self.log.record(
                level,
                &format!("Workload {} is not running", r.target),
                json!({ "workload": r.target, "status": r.error_detail }),
            );
        }
        let running = results.iter().filter(|r| r.reachable).count();
        self.log.record(
            LogLevel::Info,
            "Workload status",
            json!({ "total_containers": running, "declared": results.len() }),
        );
        Ok(())
    }

    /// Run every probe once, aggregate, log and persist the report.
    pub async fn health_check(&mut self) -> Result<HealthReport> {
        let paths = &self.config.paths;
        let startup = FileSystemChecks::probe(
            &paths.startup_artifact,
            &paths.project_root,
            &paths.content_root,
        );

        let (runtime, workload_results) = if self.config.workloads_enabled {
            let available = self.workloads.engine_available().await;
            let results = if available {
                workload_probe::probe_workloads(self.workloads.as_ref(), &self.config.workloads).await
            } else {
                Vec::new()
            };
            (
                ContainerRuntimeChecks {
                    engine_available: Some(available),
                },
                results,
            )
        } else {
            (
                ContainerRuntimeChecks {
                    engine_available: None,
                },
                Vec::new(),
            )
        };

        let service_results = self.services.probe_services(&self.config.services).await;
        let resources = self.host.sample();
        let report = health::aggregate(
            &startup,
            &runtime,
            service_results,
            workload_results,
            resources,
            self.config.thresholds.disk_critical_percent,
        );
        report.log(&self.log);
        report.save(&self.config.paths.health_report)?;
        info!(
            status = %report.overall_status,
            critical = report.critical_count,
            warnings = report.warning_count,
            "health report written"
        );
        Ok(report)
    }
}

#[async_trait]
impl TaskRunner for Monitor {
    async fn run(&mut self, task: Task) -> Result<()> {
        let outcome = match task {
            Task::ChangeDetection => self.detector.detect().map(|_| ()),
            Task::SystemStatus => self.system_status().await,
            Task::Workloads => self.probe_workloads().await,
            Task::LogScan => self.tail.scan(&self.log).map(|_| ()),
            Task::HealthCheck => self.health_check().await.map(|_| ()),
        };
        if let Err(e) = &outcome {
            self.log.record(
                LogLevel::Error,
                "Monitoring task failed",
                json!({ "task": task.as_str(), "error": e.to_string() }),
            );
        }
        outcome
    }

    async fn heartbeat(&mut self, iteration: u64) -> Result<()> {
        let snap = self.host.sample();
        self.log.try_record(
            LogLevel::System,
            "Heartbeat",
            json!({
                "iteration": iteration,
                "uptime": self.uptime_secs(),
                "memory_usage": snap.mem_used,
            }),
        )?;
        Ok(())
    }
}
