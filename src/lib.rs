//! # opwatch
//!
//! Poll HTTP health endpoints through the opwatch core and export what was
//! seen.
//!
//! Each configured target becomes a node with one cache holding the last
//! JSON document its endpoint returned. Groups fold several targets into a
//! single status. The [`PollingService`] keeps everything fresh in the
//! background and writes snapshots to the configured outputs.
//!
//! ## Usage
//!
//! ```bash
//! # Poll continuously, writing snapshots as configured
//! opwatch --config opwatch.toml
//!
//! # Poll once and print the snapshot
//! opwatch --config opwatch.toml --once
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::path::Path;
//! use opwatch::{build_service, poll_once, OpwatchConfig};
//!
//! # tokio_test::block_on(async {
//! let config = OpwatchConfig::load(Some(Path::new("opwatch.toml"))).unwrap();
//! let service = build_service(&config).unwrap();
//!
//! let snapshot = poll_once(&service).await;
//! println!("overall: {}", snapshot.worst_status());
//! # });
//! ```
//!
//! [`PollingService`]: opwatch_core::PollingService

pub mod config;
pub mod targets;

use opwatch_core::{PollNode, PollingService, RegistrySnapshot};
use tokio::task::JoinSet;
use tracing::error;

pub use config::{GroupConfig, IssueSourceConfig, OpwatchConfig, OutputConfig, TargetConfig};
pub use targets::{build_service, Group, HttpTarget};

/// Force one poll of every registered node and return the result.
pub async fn poll_once(service: &PollingService) -> RegistrySnapshot {
    let mut polls = JoinSet::new();
    for node in service.registry().all() {
        polls.spawn(async move { node.poll_all(true).await });
    }

    while let Some(joined) = polls.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "node poll did not complete");
        }
    }

    service.snapshot()
}
