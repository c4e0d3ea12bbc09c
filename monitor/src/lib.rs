pub mod config;
pub mod debug_log;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics_export;
pub mod monitor;
pub mod nervous_system;
pub mod scheduler;
pub mod shutdown;
pub mod snapshot_store;

pub use config::Config;
pub use debug_log::{DebugLog, LogLevel};
pub use error::{MonitorError, Result};
pub use health::{HealthReport, OverallStatus};
pub use metrics_export::{MetricSet, MetricsAggregator};
pub use monitor::Monitor;
pub use scheduler::{Scheduler, Task, TaskRunner};
