/* neira:meta
id: NEI-20261016-143000-exporter-accept-pause
intent: fix
summary: Pause after accept errors instead of retrying in a tight loop.
*/
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pages;
use crate::config::ExporterConfig;
use crate::error::{MonitorError, Result};
use crate::health::HealthReport;
use crate::metrics_export::MetricsAggregator;

const MAX_HEADER_LINES: usize = 100;
const MAX_LINE_BYTES: u64 = 8 * 1024;
const MIN_ACCEPT_PAUSE: Duration = Duration::from_millis(50);

/// A finished response, written verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn new(status: u16, reason: &'static str, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            reason,
            content_type,
            body,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        let mut out = head.into_bytes();
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

/// Serves `/metrics` and `/` from one listening socket, one request per connection.
pub struct ExpositionServer {
    listener: TcpListener,
    metrics: MetricsAggregator,
    report_path: Option<PathBuf>,
    connection_timeout: Duration,
    poll_timeout: Duration,
    shutdown: CancellationToken,
}

impl ExpositionServer {
    pub async fn bind(
        addr: SocketAddr,
        metrics: MetricsAggregator,
        exporter: &ExporterConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            metrics,
            report_path: None,
            connection_timeout: exporter.connection_timeout(),
            poll_timeout: exporter.poll_timeout(),
            shutdown,
        })
    }

    /// Show the overall status of the persisted health report on the landing page.
    pub fn with_health_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Returns once the shutdown token is cancelled; per-connection
    /// and accept errors are logged and never end the loop.
    pub async fn serve(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("metrics exporter listening on http://{addr}");
        }
        while !self.shutdown.is_cancelled() {
            let accepted = match timeout(self.poll_timeout, self.listener.accept()).await {
                Err(_) => continue,
                Ok(accepted) => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = self.handle(stream).await {
                        warn!(%peer, "request dropped: {e}");
                    }
                }
                Err(e) => {
                    // Errors such as EMFILE persist; wait before retrying.
                    let pause = self.accept_error_pause();
                    warn!(pause_ms = pause.as_millis() as u64, "accept failed: {e}");
                    tokio::select! {
                        _ = sleep(pause) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }
        }
        info!("metrics exporter stopped");
    }

    fn accept_error_pause(&self) -> Duration {
        self.poll_timeout.max(MIN_ACCEPT_PAUSE)
    }

    async fn handle(&self, stream: TcpStream) -> Result<()> {
        let mut reader = BufReader::new(stream);
        let request_line = timeout(self.connection_timeout, read_request_head(&mut reader))
            .await
            .map_err(|_| MonitorError::Io(std::io::ErrorKind::TimedOut.into()))??;
        let Some((method, path)) = parse_request_line(&request_line) else {
            debug!(line = %request_line.trim(), "malformed request line");
            return Ok(());
        };
        let response = self.route(method, path);
        debug!(method, path, status = response.status, "request served");

        let mut stream = reader.into_inner();
        timeout(self.connection_timeout, async {
            stream.write_all(&response.to_bytes()).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| MonitorError::Io(std::io::ErrorKind::TimedOut.into()))??;
        Ok(())
    }

    pub fn route(&self, method: &str, path: &str) -> Response {
        let path = path.split('?').next().unwrap_or(path);
        if method == "GET" && path.starts_with("/metrics") {
            return match self.metrics.export() {
                Ok(set) => Response::new(200, "OK", "text/plain; charset=utf-8", set.render(Utc::now())),
                Err(e) => Response::new(
                    500,
                    "Internal Server Error",
                    "text/plain; charset=utf-8",
                    format!("metrics unavailable: {e}\n"),
                ),
            };
        }
        if method == "GET" && path == "/" {
            let report = self.report_path.as_deref().and_then(HealthReport::load);
            return match self.metrics.export() {
                Ok(set) => Response::new(
                    200,
                    "OK",
                    "text/html; charset=utf-8",
                    pages::landing(&set, report.as_ref(), Utc::now()),
                ),
                Err(e) => Response::new(
                    500,
                    "Internal Server Error",
                    "text/plain; charset=utf-8",
                    format!("metrics unavailable: {e}\n"),
                ),
            };
        }
        Response::new(404, "Not Found", "text/plain; charset=utf-8", pages::not_found())
    }
}

/// Read the request line and drain headers up to the blank line.
async fn read_request_head(reader: &mut BufReader<TcpStream>) -> std::io::Result<String> {
    let mut request_line = String::new();
    (&mut *reader)
        .take(MAX_LINE_BYTES)
        .read_line(&mut request_line)
        .await?;
    if request_line.trim().is_empty() {
        return Ok(request_line);
    }
    for _ in 0..MAX_HEADER_LINES {
        let mut header = String::new();
        let n = (&mut *reader).take(MAX_LINE_BYTES).read_line(&mut header).await?;
        if n == 0 || header.trim().is_empty() {
            break;
        }
    }
    Ok(request_line)
}

/// `METHOD PATH [VERSION]`; anything else is malformed.
pub fn parse_request_line(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let path = parts.next()?;
    if !path.starts_with('/') || !method.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((method, path))
}
