//! Destinations for periodic registry snapshots.

use std::path::PathBuf;

use opwatch_types::RegistrySnapshot;

#[cfg(feature = "prometheus")]
use std::sync::Arc;

#[cfg(feature = "prometheus")]
use crate::prometheus::{PrometheusConfig, PrometheusExporter};

/// Where the polling service sends snapshots.
///
/// Emission is best effort: a sink that is unreachable or full is skipped
/// and polling carries on.
#[derive(Debug)]
pub enum Output {
    /// Overwrite a JSON file with each snapshot.
    File(PathBuf),

    /// Send each snapshot as one line of JSON to a TCP listener.
    Tcp(String),

    /// Hand snapshots to an in-process consumer.
    Channel(tokio::sync::mpsc::Sender<RegistrySnapshot>),

    /// Serve snapshots as Prometheus metrics.
    #[cfg(feature = "prometheus")]
    Prometheus(Arc<PrometheusExporter>),
}

impl Output {
    /// ```rust
    /// use opwatch_core::Output;
    ///
    /// let output = Output::file("snapshot.json");
    /// ```
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    pub fn tcp(addr: impl Into<String>) -> Self {
        Output::Tcp(addr.into())
    }

    /// A channel output plus the receiving end.
    pub fn channel(buffer: usize) -> (Self, tokio::sync::mpsc::Receiver<RegistrySnapshot>) {
        let (tx, rx) = tokio::sync::mpsc::channel(buffer);
        (Output::Channel(tx), rx)
    }

    #[cfg(feature = "prometheus")]
    pub fn prometheus(config: PrometheusConfig) -> Self {
        Output::Prometheus(Arc::new(PrometheusExporter::new(config)))
    }

    pub(crate) async fn emit(&self, snapshot: &RegistrySnapshot) -> std::io::Result<()> {
        match self {
            Output::File(path) => {
                let json = serde_json::to_string_pretty(snapshot)?;
                tokio::fs::write(path, json).await?;
            }
            Output::Tcp(addr) => {
                use tokio::io::AsyncWriteExt;
                use tokio::net::TcpStream;

                if let Ok(mut stream) = TcpStream::connect(addr).await {
                    let mut line = serde_json::to_vec(snapshot)?;
                    line.push(b'\n');
                    let _ = stream.write_all(&line).await;
                }
            }
            Output::Channel(tx) => {
                // Never block the polling loop on a slow consumer
                let _ = tx.try_send(snapshot.clone());
            }
            #[cfg(feature = "prometheus")]
            Output::Prometheus(exporter) => exporter.record(snapshot),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_types::{MonitorStatus, NodeInfo};

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::builder()
            .timestamp_ms(1_700_000_000_000)
            .node(NodeInfo {
                key: "lb-01".to_string(),
                node_type: "HAProxy".to_string(),
                status: MonitorStatus::Critical,
                ..Default::default()
            })
            .build()
    }

    #[tokio::test]
    async fn file_output_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        Output::file(&path).emit(&snapshot()).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: RegistrySnapshot = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, snapshot());
    }

    #[tokio::test]
    async fn channel_output_drops_when_full() {
        let (output, mut rx) = Output::channel(1);
        output.emit(&snapshot()).await.unwrap();
        output.emit(&snapshot()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tcp_output_sends_one_line() {
        use tokio::io::AsyncBufReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let reader = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = tokio::io::BufReader::new(stream).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        Output::tcp(addr).emit(&snapshot()).await.unwrap();
        let line = reader.await.unwrap();
        assert!(line.contains("lb-01"));
    }

    #[tokio::test]
    async fn unreachable_tcp_is_not_an_error() {
        let output = Output::tcp("127.0.0.1:1");
        assert!(output.emit(&snapshot()).await.is_ok());
    }
}
