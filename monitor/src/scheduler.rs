/* neira:meta
id: NEI-20260918-100000-monitor-loop
intent: feature
summary: |
  Single cooperative loop with per-task wall-clock gates,
  failure isolation and backoff.
*/
//! Single-threaded cooperative scheduler: one loop, wall-clock gates per task.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::IntervalsConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    ChangeDetection,
    SystemStatus,
    Workloads,
    LogScan,
    HealthCheck,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::ChangeDetection => "change_detection",
            Task::SystemStatus => "system_status",
            Task::Workloads => "workloads",
            Task::LogScan => "log_scan",
            Task::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executes scheduled tasks on behalf of the [`Scheduler`].
#[async_trait]
pub trait TaskRunner: Send {
    async fn run(&mut self, task: Task) -> Result<()>;

    /// Liveness record written once per loop iteration. An error here fails
    /// the iteration and triggers the backoff.
    async fn heartbeat(&mut self, iteration: u64) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

pub struct Scheduler<R, C = SystemClock> {
    runner: R,
    clock: C,
    schedule: Vec<(Task, Duration)>,
    last_run: HashMap<Task, Instant>,
    base: Duration,
    backoff: Duration,
    iteration: u64,
    shutdown: CancellationToken,
}

impl<R: TaskRunner> Scheduler<R, SystemClock> {
    pub fn new(runner: R, intervals: &IntervalsConfig, shutdown: CancellationToken) -> Self {
        Self::with_clock(runner, SystemClock, intervals, shutdown)
    }
}

impl<R: TaskRunner, C: Clock> Scheduler<R, C> {
    pub fn with_clock(
        runner: R,
        clock: C,
        intervals: &IntervalsConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let secs = Duration::from_secs;
        Self {
            runner,
            clock,
            schedule: vec![
                (Task::ChangeDetection, secs(intervals.change_detection)),
                (Task::SystemStatus, secs(intervals.system_status)),
                (Task::Workloads, secs(intervals.workloads)),
                (Task::LogScan, secs(intervals.log_scan)),
                (Task::HealthCheck, secs(intervals.health_check)),
            ],
            last_run: HashMap::new(),
            base: secs(intervals.base),
            backoff: secs(intervals.backoff),
            iteration: 0,
            shutdown,
        }
    }

    /// Drop a task from the schedule, e.g. workload probing on hosts without a runtime.
    pub fn without(mut self, task: Task) -> Self {
        self.schedule.retain(|(t, _)| *t != task);
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Tasks whose interval has elapsed at `now`. Tasks that never ran are due.
    pub fn due(&self, now: Instant) -> Vec<Task> {
        self.schedule
            .iter()
            .filter(|(task, every)| match self.last_run.get(task) {
                Some(last) => now.saturating_duration_since(*last) >= *every,
                None => true,
            })
            .map(|(task, _)| *task)
            .collect()
    }

    /// One loop iteration: heartbeat, then every due task. A failing task is
    /// logged and does not stop the others.
    pub async fn tick(&mut self) -> Result<Vec<Task>> {
        self.iteration += 1;
        self.runner.heartbeat(self.iteration).await?;
        let due = self.due(self.clock.now());
        for task in &due {
            if let Err(e) = self.runner.run(*task).await {
                error!(task = %task, "monitoring task failed: {e}");
            }
            self.last_run.insert(*task, self.clock.now());
        }
        Ok(due)
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(mut self) {
        info!(base_secs = self.base.as_secs(), "monitoring loop started");
        while !self.shutdown.is_cancelled() {
            let pause = match self.tick().await {
                Ok(_) => self.base,
                Err(e) => {
                    error!(backoff_secs = self.backoff.as_secs(), "monitoring loop iteration failed: {e}");
                    self.backoff
                }
            };
            tokio::select! {
                _ = sleep(pause) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
        info!(iterations = self.iteration, "monitoring loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Instant::now())))
        }

        fn advance(&self, secs: u64) {
            *self.0.lock().unwrap() += Duration::from_secs(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct Recorder {
        ran: Vec<Task>,
        failing: Vec<Task>,
        heartbeats: u64,
        fail_heartbeat_at: Option<u64>,
        cancel_at: Option<(u64, CancellationToken)>,
    }

    #[async_trait]
    impl TaskRunner for Recorder {
        async fn run(&mut self, task: Task) -> Result<()> {
            self.ran.push(task);
            if self.failing.contains(&task) {
                return Err(MonitorError::command(format!("{task} exploded")));
            }
            Ok(())
        }

        async fn heartbeat(&mut self, iteration: u64) -> Result<()> {
            self.heartbeats += 1;
            if let Some((at, token)) = &self.cancel_at {
                if *at == iteration {
                    token.cancel();
                }
            }
            if self.fail_heartbeat_at == Some(iteration) {
                return Err(MonitorError::command("heartbeat write failed"));
            }
            Ok(())
        }
    }

    fn scheduler(runner: Recorder, clock: ManualClock) -> Scheduler<Recorder, ManualClock> {
        Scheduler::with_clock(runner, clock, &IntervalsConfig::default(), CancellationToken::new())
    }

    #[tokio::test]
    async fn tasks_are_gated_by_their_own_interval() {
        let clock = ManualClock::new();
        let mut s = scheduler(Recorder::default(), clock.clone());

        assert_eq!(s.tick().await.unwrap().len(), 5);

        clock.advance(30);
        assert_eq!(
            s.tick().await.unwrap(),
            vec![Task::ChangeDetection, Task::LogScan]
        );

        clock.advance(30);
        assert_eq!(
            s.tick().await.unwrap(),
            vec![Task::ChangeDetection, Task::SystemStatus, Task::LogScan]
        );

        clock.advance(60);
        assert!(s.tick().await.unwrap().contains(&Task::Workloads));

        clock.advance(180);
        assert!(s.tick().await.unwrap().contains(&Task::HealthCheck));
        assert_eq!(s.runner().heartbeats, 5);
    }

    #[tokio::test]
    async fn failing_task_does_not_block_others() {
        let clock = ManualClock::new();
        let runner = Recorder {
            failing: vec![Task::ChangeDetection, Task::Workloads],
            ..Default::default()
        };
        let mut s = scheduler(runner, clock.clone());
        let ran = s.tick().await.unwrap();
        assert_eq!(ran.len(), 5);
        assert_eq!(s.runner().ran.len(), 5);

        // A failed task still waits out its interval.
        assert!(s.tick().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn heartbeat_failure_fails_the_iteration() {
        let runner = Recorder {
            fail_heartbeat_at: Some(1),
            ..Default::default()
        };
        let mut s = scheduler(runner, ManualClock::new());
        assert!(s.tick().await.is_err());
        assert!(s.runner().ran.is_empty());
        assert_eq!(s.tick().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn without_removes_task() {
        let s = scheduler(Recorder::default(), ManualClock::new()).without(Task::Workloads);
        assert!(!s.due(Instant::now()).contains(&Task::Workloads));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_cancelled() {
        let token = CancellationToken::new();
        let runner = Recorder {
            fail_heartbeat_at: Some(2),
            cancel_at: Some((3, token.clone())),
            ..Default::default()
        };
        let s = Scheduler::with_clock(runner, ManualClock::new(), &IntervalsConfig::default(), token.clone());
        tokio::time::timeout(Duration::from_secs(600), s.run())
            .await
            .expect("loop should stop after cancellation");
        assert!(token.is_cancelled());
    }
}
