use chrono::{DateTime, Utc};

use crate::health::{HealthReport, OverallStatus};
use crate::metrics_export::{format_value, MetricKind, MetricSet};

pub fn not_found() -> String {
    "Not Found\n\nAvailable endpoints:\n  /metrics  - metrics in text exposition format\n  /         - status page\n"
        .to_string()
}

/// Self-contained status page with the current metric values.
pub fn landing(set: &MetricSet, report: Option<&HealthReport>, generated: DateTime<Utc>) -> String {
    let mut rows = String::new();
    for sample in &set.samples {
        let kind = match sample.kind {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        };
        rows.push_str(&format!(
            "      <tr><td><code>{}</code></td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            sample.name,
            kind,
            format_value(sample.value),
            escape(sample.help)
        ));
    }

    let health = match report {
        Some(r) => {
            let class = match r.overall_status {
                OverallStatus::Healthy => "ok",
                OverallStatus::Degraded => "warn",
                OverallStatus::Critical => "crit",
            };
            format!(
                "<p class=\"status {class}\">Last health check: <strong>{}</strong> \
                 ({} critical, {} warnings) at {}</p>",
                r.overall_status.as_str().to_uppercase(),
                r.critical_count,
                r.warning_count,
                r.timestamp.to_rfc3339()
            )
        }
        None => "<p class=\"status\">No health report has been written yet.</p>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>BlackCnote Metrics Exporter</title>
  <style>
    body {{ font-family: sans-serif; margin: 2em; color: #222; }}
    table {{ border-collapse: collapse; }}
    td, th {{ border: 1px solid #ccc; padding: 4px 10px; text-align: left; }}
    .status.ok {{ color: #1a7f37; }}
    .status.warn {{ color: #9a6700; }}
    .status.crit {{ color: #cf222e; }}
    pre {{ background: #f6f8fa; padding: 1em; }}
  </style>
</head>
<body>
  <h1>BlackCnote Metrics Exporter</h1>
  {health}
  <h2>Current metrics</h2>
  <table>
    <thead><tr><th>Name</th><th>Type</th><th>Value</th><th>Description</th></tr></thead>
    <tbody>
{rows}    </tbody>
  </table>
  <h2>Endpoints</h2>
  <ul>
    <li><a href="/metrics">/metrics</a> - metrics in text exposition format</li>
    <li><a href="/">/</a> - this page</li>
  </ul>
  <h2>Scrape configuration</h2>
  <pre>scrape_configs:
  - job_name: 'blackcnote-debug'
    scrape_interval: 30s
    static_configs:
      - targets: ['localhost:9091']</pre>
  <p><small>Generated {generated}</small></p>
</body>
</html>
"#,
        generated = generated.to_rfc3339(),
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
