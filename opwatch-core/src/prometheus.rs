//! Prometheus exposition of node and cache health.
//!
//! The exporter keeps the most recent [`RegistrySnapshot`] and serves it in
//! the Prometheus text format, so scrapers can alert on node status and
//! cache failure counts without touching the polling core.
//!
//! ## Example
//!
//! ```rust,no_run
//! use opwatch_core::{Output, PollingService};
//! use opwatch_core::prometheus::PrometheusConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PrometheusConfig::builder()
//!         .listen_addr("0.0.0.0:9090")
//!         .metrics_path("/metrics")
//!         .build();
//!
//!     let service = PollingService::builder()
//!         .output(Output::prometheus(config))
//!         .build();
//!
//!     let _handle = service.start();
//!     // Metrics available at http://localhost:9090/metrics
//! }
//! ```

use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use opwatch_types::{MonitorStatus, RegistrySnapshot};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::warn;

type SnapshotSlot = Arc<RwLock<Option<RegistrySnapshot>>>;

/// Where and how the metrics endpoint is served.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub listen_addr: String,
    pub metrics_path: String,
    /// Optional prefix for every metric name.
    pub namespace: Option<String>,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".to_string(),
            metrics_path: "/metrics".to_string(),
            namespace: None,
        }
    }
}

impl PrometheusConfig {
    pub fn builder() -> PrometheusConfigBuilder {
        PrometheusConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct PrometheusConfigBuilder {
    config: PrometheusConfig,
}

impl PrometheusConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.config.metrics_path = path.into();
        self
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.config.namespace = Some(ns.into());
        self
    }

    pub fn build(self) -> PrometheusConfig {
        self.config
    }
}

/// Serves the latest snapshot over HTTP.
#[derive(Debug)]
pub struct PrometheusExporter {
    config: PrometheusConfig,
    latest: SnapshotSlot,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl PrometheusExporter {
    pub fn new(config: PrometheusConfig) -> Self {
        Self {
            config,
            latest: Arc::new(RwLock::new(None)),
            server: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PrometheusConfig {
        &self.config
    }

    /// Replace the snapshot served to scrapers.
    pub fn record(&self, snapshot: &RegistrySnapshot) {
        *self.latest.write() = Some(snapshot.clone());
    }

    /// Current metrics text; empty until the first snapshot is recorded.
    pub fn render(&self) -> String {
        render_slot(&self.latest, self.config.namespace.as_deref())
    }

    /// Spawn the HTTP server unless it is already running. It runs until
    /// the runtime shuts down. Returns whether a server was started.
    pub fn start_server(&self) -> bool {
        let mut server = self.server.lock();
        if server.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let config = self.config.clone();
        let latest = self.latest.clone();
        *server = Some(tokio::spawn(async move {
            if let Err(e) = run_server(config.clone(), latest).await {
                warn!(listen_addr = %config.listen_addr, error = %e, "prometheus server stopped");
            }
        }));
        true
    }

    pub fn is_serving(&self) -> bool {
        self.server.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

fn render_slot(slot: &SnapshotSlot, namespace: Option<&str>) -> String {
    slot.read()
        .as_ref()
        .map(|s| format_prometheus(s, namespace))
        .unwrap_or_default()
}

async fn run_server(
    config: PrometheusConfig,
    latest: SnapshotSlot,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    let config = Arc::new(config);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let config = config.clone();
        let latest = latest.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = respond(req.uri().path(), &config, &latest);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = %e, "prometheus connection error");
            }
        });
    }
}

fn respond(path: &str, config: &PrometheusConfig, latest: &SnapshotSlot) -> Response<Full<Bytes>> {
    if path == config.metrics_path {
        text(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            render_slot(latest, config.namespace.as_deref()),
        )
    } else if path == "/health" || path == "/healthz" {
        text(StatusCode::OK, "text/plain", "OK".to_string())
    } else {
        text(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    }
}

fn text(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static(content_type),
    );
    response
}

/// Numeric gauge value of a status; higher is worse.
pub fn status_value(status: MonitorStatus) -> u8 {
    status as u8
}

/// Format a snapshot in the Prometheus text exposition format.
pub fn format_prometheus(snapshot: &RegistrySnapshot, namespace: Option<&str>) -> String {
    let prefix = namespace.map(|n| format!("{}_", n)).unwrap_or_default();
    let mut out = String::new();

    let family = |out: &mut String, name: &str, kind: &str, help: &str| {
        let _ = writeln!(out, "# HELP {prefix}{name} {help}");
        let _ = writeln!(out, "# TYPE {prefix}{name} {kind}");
    };

    family(
        &mut out,
        "opwatch_node_status",
        "gauge",
        "Node status (0=good 1=unknown 2=maintenance 3=warning 4=critical)",
    );
    for node in &snapshot.nodes {
        let _ = writeln!(
            out,
            "{prefix}opwatch_node_status{{{}}} {}",
            node_labels(&node.node_type, &node.key),
            status_value(node.status)
        );
    }

    family(
        &mut out,
        "opwatch_node_fails_in_a_row",
        "gauge",
        "Consecutive failed polls of a node",
    );
    for node in &snapshot.nodes {
        let _ = writeln!(
            out,
            "{prefix}opwatch_node_fails_in_a_row{{{}}} {}",
            node_labels(&node.node_type, &node.key),
            node.fails_in_a_row
        );
    }

    family(
        &mut out,
        "opwatch_cache_polls_total",
        "counter",
        "Polls completed by a cache",
    );
    family(
        &mut out,
        "opwatch_cache_polls_failed_total",
        "counter",
        "Polls of a cache that failed",
    );
    family(
        &mut out,
        "opwatch_cache_has_data",
        "gauge",
        "Whether a cache holds data (1) or not (0)",
    );
    family(
        &mut out,
        "opwatch_cache_last_poll_duration_seconds",
        "gauge",
        "Duration of the most recent poll of a cache",
    );
    for node in &snapshot.nodes {
        let base = node_labels(&node.node_type, &node.key);
        for cache in &node.caches {
            let labels = format!("{base},cache=\"{}\"", escape_label_value(&cache.name));
            let _ = writeln!(
                out,
                "{prefix}opwatch_cache_polls_total{{{labels}}} {}",
                cache.polls_total
            );
            let _ = writeln!(
                out,
                "{prefix}opwatch_cache_polls_failed_total{{{labels}}} {}",
                cache.polls_failed
            );
            let _ = writeln!(
                out,
                "{prefix}opwatch_cache_has_data{{{labels}}} {}",
                u8::from(cache.has_data)
            );
            if let Some(d) = cache.last_poll_duration {
                let _ = writeln!(
                    out,
                    "{prefix}opwatch_cache_last_poll_duration_seconds{{{labels}}} {:.6}",
                    d.as_micros() as f64 / 1_000_000.0
                );
            }
        }
    }

    family(
        &mut out,
        "opwatch_snapshot_timestamp_seconds",
        "gauge",
        "Unix timestamp of the snapshot",
    );
    let _ = writeln!(
        out,
        "{prefix}opwatch_snapshot_timestamp_seconds {:.3}",
        snapshot.timestamp_ms as f64 / 1000.0
    );

    out
}

fn node_labels(node_type: &str, key: &str) -> String {
    format!(
        "node_type=\"{}\",node=\"{}\"",
        escape_label_value(node_type),
        escape_label_value(key)
    )
}

/// Backslash, double-quote and newline must be escaped in label values.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
