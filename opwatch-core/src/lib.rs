//! # opwatch-core
//!
//! Polling and caching core for infrastructure dashboards.
//!
//! Monitored things ([`PollNode`]s) own typed [`Cache`]s, each a
//! single-flight, time-boxed fetch of one piece of backend data. A
//! [`PollingService`] holds every registered node, runs one background loop
//! that keeps the caches fresh, and answers manual refreshes, issue lists
//! and bulk role changes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use opwatch_core::{
//!     Cache, CachePoller, FetchError, MonitorStatus, NodePollState, NodeSettings, PollNode,
//!     PollingService, StatusContribution,
//! };
//!
//! struct Redis {
//!     key: String,
//!     info: Cache<String>,
//!     state: NodePollState,
//! }
//!
//! impl Redis {
//!     fn new(key: &str) -> Self {
//!         let info = Cache::builder("Info")
//!             .owner("Redis", key)
//!             .cache_for(Duration::from_secs(30))
//!             .failure_for(Duration::from_secs(5))
//!             .interpret(|role: &String| match role.as_str() {
//!                 "master" | "slave" => StatusContribution::good(),
//!                 other => StatusContribution::with_reason(MonitorStatus::Warning, other.to_string()),
//!             })
//!             .build(|| async { Ok::<_, FetchError>("master".to_string()) });
//!         Self {
//!             key: key.to_string(),
//!             info,
//!             state: NodePollState::new(NodeSettings::default()),
//!         }
//!     }
//! }
//!
//! impl PollNode for Redis {
//!     fn node_type(&self) -> &str { "Redis" }
//!     fn unique_key(&self) -> &str { &self.key }
//!     fn data_pollers(&self) -> Vec<&dyn CachePoller> { vec![&self.info as &dyn CachePoller] }
//!     fn poll_state(&self) -> &NodePollState { &self.state }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = PollingService::builder()
//!         .interval(Duration::from_secs(1))
//!         .build();
//!     service.try_register(Arc::new(Redis::new("redis-01:6379")));
//!
//!     let handle = service.start();
//!     let ok = service.poll_by_key("Redis", "redis-01:6379", Some("req-1")).await;
//!     println!("refreshed: {:?}", ok);
//!     handle.shutdown().await.ok();
//! }
//! ```
//!
//! ## Features
//!
//! - `prometheus`: serve snapshots as Prometheus metrics over HTTP

mod cache;
mod error;
mod handle;
mod node;
mod output;
mod providers;
mod registry;
mod service;

pub mod versioned;

#[cfg(feature = "prometheus")]
pub mod prometheus;

pub use cache::{
    Cache, CacheBuilder, CacheOwner, CachePoller, FetchFuture, PollOutcome,
    DEFAULT_CACHE_DURATION,
};
pub use error::{FetchError, PollError};
pub use handle::PollingHandle;
pub use node::{NodePollOutcome, NodePollState, NodeSettings, PollNode, DEFAULT_MIN_BETWEEN_POLLS};
pub use output::Output;
pub use providers::{IssuesProvider, NodeRoleProvider};
pub use registry::Registry;
pub use service::{
    PollEvent, PollingService, PollingServiceBuilder, ServiceStats, DEFAULT_POLL_INTERVAL,
    DEFAULT_SNAPSHOT_INTERVAL, ISSUES_CACHE_DURATION,
};

#[cfg(feature = "prometheus")]
pub use prometheus::{PrometheusConfig, PrometheusExporter};

// Re-export the shared vocabulary for convenience
pub use opwatch_types::{
    reason_summary, sort_issues, worst, CacheInfo, Issue, Microseconds, MonitorStatus, Monitored,
    NodeInfo, NodeRole, RegistrySnapshot, StatusContribution,
};
