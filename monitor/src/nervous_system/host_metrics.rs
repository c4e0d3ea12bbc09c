/* neira:meta
id: NEI-20260914-100000-resource-prober
intent: refactor
summary: |
  Host metrics reduced to on-demand sampling of process memory,
  disk and load figures, plus resource checks.
*/
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Pid, RefreshKind, System};

use crate::debug_log::{DebugLog, LogLevel};

/// Point-in-time view of process and host resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resident memory of this process, bytes.
    pub mem_used: u64,
    /// Highest `mem_used` seen by this prober.
    pub mem_peak: u64,
    pub disk_free: u64,
    pub disk_total: u64,
    pub load_avg: [f64; 3],
    /// Set when the host has no load average and `load_avg` holds CPU usage instead.
    pub load_is_fallback: bool,
    pub cpu_count: usize,
    /// Host uptime, seconds.
    pub uptime: u64,
}

impl ResourceSnapshot {
    /// Used share of the disk in percent, 0 when the total is unknown.
    pub fn disk_used_percent(&self) -> f64 {
        if self.disk_total == 0 {
            return 0.0;
        }
        let used = self.disk_total.saturating_sub(self.disk_free) as f64;
        used / self.disk_total as f64 * 100.0
    }
}

/// Samples process memory, disk and load figures on demand.
pub struct HostMetrics {
    sys: System,
    disks: Disks,
    pid: Option<Pid>,
    disk_root: PathBuf,
    mem_peak: u64,
}

impl HostMetrics {
    /// Create a prober; disk figures are taken for the filesystem holding `disk_root`.
    pub fn new(disk_root: impl Into<PathBuf>) -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            pid: sysinfo::get_current_pid().ok(),
            disk_root: disk_root.into(),
            mem_peak: 0,
        }
    }

    pub fn sample(&mut self) -> ResourceSnapshot {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();
        self.disks.refresh();

        let mem_used = self
            .pid
            .filter(|pid| self.sys.refresh_process(*pid))
            .and_then(|pid| self.sys.process(pid))
            .map(|p| p.memory())
            .unwrap_or(0);
        self.mem_peak = self.mem_peak.max(mem_used);

        let (disk_free, disk_total) = self.disk_for(&self.disk_root);
        let (load_avg, load_is_fallback) = self.load_average();

        ResourceSnapshot {
            mem_used,
            mem_peak: self.mem_peak,
            disk_free,
            disk_total,
            load_avg,
            load_is_fallback,
            cpu_count: self.sys.cpus().len(),
            uptime: System::uptime(),
        }
    }

    /// The disk with the longest mount point that prefixes `path`.
    fn disk_for(&self, path: &Path) -> (u64, u64) {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| (d.available_space(), d.total_space()))
            .unwrap_or((0, 0))
    }

    fn load_average(&self) -> ([f64; 3], bool) {
        if cfg!(windows) {
            // No load average on this platform; report CPU usage as a fraction of one core per CPU.
            let cpus = self.sys.cpus().len().max(1) as f64;
            let usage = self.sys.global_cpu_info().cpu_usage() as f64 / 100.0 * cpus;
            return ([usage; 3], true);
        }
        let load = System::load_average();
        ([load.one, load.five, load.fifteen], false)
    }
}

/// Environment checks that accompany each resource sample.
pub struct ResourceChecks {
    pub memory_warning_bytes: u64,
    pub required_dirs: Vec<PathBuf>,
}

impl ResourceChecks {
    /// Log a WARNING for excessive memory and an ERROR for every missing
    /// required directory. Returns the missing directories.
    pub fn evaluate(&self, snapshot: &ResourceSnapshot, log: &DebugLog) -> Vec<PathBuf> {
        if snapshot.mem_used > self.memory_warning_bytes {
            log.record(
                LogLevel::Warning,
                "High memory usage detected",
                json!({
                    "memory_usage": snapshot.mem_used,
                    "threshold": self.memory_warning_bytes,
                }),
            );
        }
        let missing: Vec<PathBuf> = self
            .required_dirs
            .iter()
            .filter(|d| !d.is_dir())
            .cloned()
            .collect();
        for dir in &missing {
            log.record(
                LogLevel::Error,
                "Required directory missing",
                json!({ "path": dir.display().to_string() }),
            );
        }
        missing
    }
}
