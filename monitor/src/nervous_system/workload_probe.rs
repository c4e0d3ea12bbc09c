/* neira:meta
id: NEI-20260915-090000-workload-probe
intent: feature
summary: |
  Workload status behind WorkloadStatusSource: docker CLI and a
  canned table for hosts without a runtime.
*/
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::service_probe::{ProbeKind, ProbeResult};
use crate::config::WorkloadTarget;
use crate::error::{MonitorError, Result};

/// Where workload status text comes from.
#[async_trait]
pub trait WorkloadStatusSource: Send + Sync {
    /// Whether the runtime engine answers at all.
    async fn engine_available(&self) -> bool;

    /// Status text for each name that the runtime knows about. Names with no
    /// output are left out of the map.
    async fn statuses(&self, names: &[String]) -> Result<HashMap<String, String>>;
}

/// `docker` command line as the status source.
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: "docker".into(),
            timeout,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| MonitorError::command(format!("{} {} timed out", self.binary, args.join(" "))))??;
        if !output.status.success() {
            return Err(MonitorError::command(format!(
                "{} {} exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl WorkloadStatusSource for DockerCli {
    async fn engine_available(&self) -> bool {
        match self.run(&["info", "--format", "{{.ServerVersion}}"]).await {
            Ok(_) => true,
            Err(e) => {
                debug!("container engine unavailable: {e}");
                false
            }
        }
    }

    async fn statuses(&self, names: &[String]) -> Result<HashMap<String, String>> {
        let mut out = HashMap::new();
        for name in names {
            let filter = format!("name={name}");
            let stdout = self
                .run(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}\t{{.Status}}"])
                .await?;
            if let Some(status) = parse_ps_output(&stdout, name) {
                out.insert(name.clone(), status);
            }
        }
        Ok(out)
    }
}

/// Pick the status column for `name` out of `NAME\tSTATUS` lines. The runtime's
/// name filter matches substrings, so an exact name wins over the first line.
pub fn parse_ps_output(stdout: &str, name: &str) -> Option<String> {
    let rows: Vec<(&str, &str)> = stdout
        .lines()
        .filter_map(|line| {
            let (n, s) = line.split_once('\t')?;
            Some((n.trim(), s.trim()))
        })
        .filter(|(_, s)| !s.is_empty())
        .collect();
    rows.iter()
        .find(|(n, _)| *n == name)
        .or_else(|| rows.first())
        .map(|(_, s)| s.to_string())
}

/// A workload runs iff its status carries an `up` or `running` marker.
pub fn is_running(status: &str) -> bool {
    status
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case("up") || w.eq_ignore_ascii_case("running"))
}

/// Canned status table, for hosts without a runtime and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticStatusSource {
    pub engine: bool,
    pub table: HashMap<String, String>,
}

impl StaticStatusSource {
    pub fn new(engine: bool) -> Self {
        Self {
            engine,
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, name: &str, status: &str) -> Self {
        self.table.insert(name.into(), status.into());
        self
    }
}

#[async_trait]
impl WorkloadStatusSource for StaticStatusSource {
    async fn engine_available(&self) -> bool {
        self.engine
    }

    async fn statuses(&self, names: &[String]) -> Result<HashMap<String, String>> {
        if !self.engine {
            return Err(MonitorError::command("engine unavailable"));
        }
        Ok(names
            .iter()
            .filter_map(|n| self.table.get(n).map(|s| (n.clone(), s.clone())))
            .collect())
    }
}

/// Classify each declared workload through a status source.
pub async fn probe_workloads(
    source: &dyn WorkloadStatusSource,
    targets: &[WorkloadTarget],
) -> Vec<ProbeResult> {
    let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
    let statuses = match source.statuses(&names).await {
        Ok(map) => map,
        Err(e) => {
            return targets
                .iter()
                .map(|t| ProbeResult::down(&t.name, ProbeKind::Workload, t.critical, e.to_string()))
                .collect();
        }
    };
    targets
        .iter()
        .map(|t| match statuses.get(&t.name) {
            Some(status) if is_running(status) => {
                ProbeResult::up(&t.name, ProbeKind::Workload, t.critical, None)
            }
            Some(status) => ProbeResult::down(&t.name, ProbeKind::Workload, t.critical, status.clone()),
            None => ProbeResult::down(&t.name, ProbeKind::Workload, t.critical, "not found"),
        })
        .collect()
}
