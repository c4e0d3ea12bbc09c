//! Probes that observe the host and the services running on it.
pub mod change_detector;
pub mod host_metrics;
pub mod log_tail;
pub mod service_probe;
pub mod workload_probe;
