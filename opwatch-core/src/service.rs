//! The polling service: registry, scan loop and cross-node operations.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use opwatch_types::{current_timestamp_ms, sort_issues, Issue, NodeRole, RegistrySnapshot};
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::error::{panic_message, FetchError, PollError};
use crate::handle::PollingHandle;
use crate::node::PollNode;
use crate::output::Output;
use crate::providers::{IssuesProvider, NodeRoleProvider};
use crate::registry::Registry;

/// How long a merged issue list is shared between callers.
pub const ISSUES_CACHE_DURATION: Duration = Duration::from_secs(15);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);

const EVENT_CAPACITY: usize = 256;

/// Sent after every node-level poll, scheduled or manual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEvent {
    pub node_type: String,
    pub key: String,
    /// Caller-supplied id for manual polls, so the requester can be told.
    pub correlation_id: Option<String>,
    pub forced: bool,
    pub success: bool,
}

/// Counters describing the scan loop.
#[derive(Debug, Default)]
pub struct ServiceStats {
    started_ms: AtomicU64,
    scans: AtomicU64,
    dispatched: AtomicU64,
}

impl ServiceStats {
    /// When the loop was last started, as a Unix timestamp in milliseconds.
    pub fn started_at_ms(&self) -> Option<u64> {
        match self.started_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Completed passes over the registry.
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Node polls handed to the runtime by the loop.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
enum RoleAction {
    Enable,
    Disable,
}

impl RoleAction {
    fn as_str(&self) -> &'static str {
        match self {
            RoleAction::Enable => "enable",
            RoleAction::Disable => "disable",
        }
    }
}

/// The one runtime object of a monitoring process.
///
/// Owns the node registry and the background scan loop, and fans
/// operations out to issue and node-role providers. Construct one at
/// startup and pass it to whatever registers or queries nodes.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use opwatch_core::{Output, PollingService};
///
/// #[tokio::main]
/// async fn main() {
///     let service = PollingService::builder()
///         .interval(Duration::from_secs(2))
///         .output(Output::file("snapshot.json"))
///         .build();
///
///     // service.try_register(Arc::new(MyNode::new(...)));
///
///     let handle = service.start();
///     tokio::signal::ctrl_c().await.ok();
///     handle.shutdown().await.ok();
/// }
/// ```
pub struct PollingService {
    registry: Arc<Registry>,
    issue_providers: Arc<Vec<Arc<dyn IssuesProvider>>>,
    role_providers: Vec<Arc<dyn NodeRoleProvider>>,
    issues: Cache<Vec<Issue>>,
    outputs: Arc<Vec<Output>>,
    interval: Duration,
    snapshot_interval: Duration,
    events: broadcast::Sender<PollEvent>,
    stats: Arc<ServiceStats>,
}

impl PollingService {
    /// A service with no providers or outputs and default intervals.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> PollingServiceBuilder {
        PollingServiceBuilder::new()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a node. Returns false if it was already registered.
    pub fn try_register(&self, node: Arc<dyn PollNode>) -> bool {
        self.registry.register(node)
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// Events for every node poll from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Start the background scan loop.
    ///
    /// Every tick, each registered node that is due gets a non-forced
    /// poll on its own task; the loop does not wait for them. Snapshots go
    /// to the configured outputs on a separate timer.
    pub fn start(&self) -> PollingHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let registry = self.registry.clone();
        let outputs = self.outputs.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        let interval = self.interval;
        let snapshot_interval = self.snapshot_interval;

        #[cfg(feature = "prometheus")]
        for output in outputs.iter() {
            if let Output::Prometheus(exporter) = output {
                exporter.start_server();
            }
        }

        stats
            .started_ms
            .store(current_timestamp_ms(), Ordering::Relaxed);
        info!(
            interval_ms = interval.as_millis() as u64,
            nodes = registry.len(),
            "polling loop started"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut snapshot_ticker = tokio::time::interval(snapshot_interval);
            snapshot_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let emit_snapshots = !outputs.is_empty();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scan(&registry, &events, &stats);
                    }
                    _ = snapshot_ticker.tick(), if emit_snapshots => {
                        emit(&outputs, &build_snapshot(&registry)).await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("polling loop stopped");
        });

        PollingHandle { stop_tx, task }
    }

    /// Force a refresh of one node, for an operator waiting on the answer.
    ///
    /// Returns whether every owned cache reported success. The optional
    /// correlation id is carried on the resulting [`PollEvent`].
    pub async fn poll_by_key(
        &self,
        node_type: &str,
        key: &str,
        correlation_id: Option<&str>,
    ) -> Result<bool, PollError> {
        let node = self
            .registry
            .find(node_type, key)
            .ok_or_else(|| PollError::NodeNotFound {
                node_type: node_type.to_string(),
                key: key.to_string(),
            })?;

        info!(
            node_type = %node.node_type(),
            node_key = %key,
            correlation_id = correlation_id.unwrap_or(""),
            "manual poll requested"
        );
        let outcome = node.poll_all(true).await;

        let _ = self.events.send(PollEvent {
            node_type: node.node_type().to_string(),
            key: key.to_string(),
            correlation_id: correlation_id.map(str::to_string),
            forced: true,
            success: outcome.success,
        });
        Ok(outcome.success)
    }

    /// Current issues from every provider, highest priority first.
    ///
    /// Providers are queried concurrently and a failing one is skipped.
    /// The merged list is reused for [`ISSUES_CACHE_DURATION`].
    pub async fn issues(&self) -> Vec<Issue> {
        self.issues.poll(false).await;
        self.issues
            .get_data()
            .map(|issues| issues.as_ref().clone())
            .unwrap_or_default()
    }

    /// Roles every provider knows for a node.
    pub fn node_roles(&self, node: &str) -> Vec<NodeRole> {
        self.role_providers
            .iter()
            .flat_map(|p| p.roles(node))
            .collect()
    }

    /// Enable the node with every role provider. True only if all succeed.
    pub async fn enable_role_everywhere(&self, node: &str) -> bool {
        self.change_roles(node, RoleAction::Enable).await
    }

    /// Disable the node with every role provider. True only if all succeed.
    pub async fn disable_role_everywhere(&self, node: &str) -> bool {
        self.change_roles(node, RoleAction::Disable).await
    }

    async fn change_roles(&self, node: &str, action: RoleAction) -> bool {
        let tasks: Vec<_> = self
            .role_providers
            .iter()
            .map(|provider| {
                let provider = provider.clone();
                let node = node.to_string();
                tokio::spawn(async move {
                    match action {
                        RoleAction::Enable => provider.enable(&node).await,
                        RoleAction::Disable => provider.disable(&node).await,
                    }
                })
            })
            .collect();
        let results = join_all(tasks).await;

        let mut all_ok = true;
        for (provider, result) in self.role_providers.iter().zip(results) {
            match result {
                Ok(true) => {}
                Ok(false) => {
                    all_ok = false;
                    warn!(provider = %provider.name(), node, action = action.as_str(), "role change failed");
                }
                Err(e) => {
                    all_ok = false;
                    error!(provider = %provider.name(), node, action = action.as_str(), error = %e, "role provider crashed");
                }
            }
        }
        info!(node, action = action.as_str(), success = all_ok, "role change fanned out");
        all_ok
    }

    /// Read-only view of every registered node.
    pub fn snapshot(&self) -> RegistrySnapshot {
        build_snapshot(&self.registry)
    }

    /// Send a snapshot to every output now.
    pub async fn emit_now(&self) {
        emit(&self.outputs, &self.snapshot()).await;
    }
}

impl Default for PollingService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PollingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingService")
            .field("registry", &self.registry)
            .field("issue_providers", &self.issue_providers.len())
            .field("role_providers", &self.role_providers.len())
            .field("outputs", &self.outputs)
            .field("interval", &self.interval)
            .finish()
    }
}

fn scan(registry: &Registry, events: &broadcast::Sender<PollEvent>, stats: &ServiceStats) {
    for node in registry.all() {
        if !node.needs_poll() {
            continue;
        }
        stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let events = events.clone();
        tokio::spawn(async move {
            match AssertUnwindSafe(node.poll_all(false)).catch_unwind().await {
                Ok(outcome) if !outcome.skipped => {
                    let _ = events.send(PollEvent {
                        node_type: node.node_type().to_string(),
                        key: node.unique_key().to_string(),
                        correlation_id: None,
                        forced: false,
                        success: outcome.success,
                    });
                }
                Ok(_) => {}
                Err(payload) => {
                    error!(
                        node_type = %node.node_type(),
                        node_key = %node.unique_key(),
                        panic = %panic_message(payload.as_ref()),
                        "node poll panicked"
                    );
                }
            }
        });
    }
    stats.scans.fetch_add(1, Ordering::Relaxed);
}

fn build_snapshot(registry: &Registry) -> RegistrySnapshot {
    RegistrySnapshot::builder()
        .nodes(registry.all().iter().map(|n| n.info()))
        .build()
}

async fn emit(outputs: &[Output], snapshot: &RegistrySnapshot) {
    for output in outputs {
        if let Err(e) = output.emit(snapshot).await {
            warn!(error = %e, "snapshot output failed");
        }
    }
}

async fn gather_issues(
    providers: Arc<Vec<Arc<dyn IssuesProvider>>>,
) -> Result<Vec<Issue>, FetchError> {
    let tasks: Vec<_> = providers
        .iter()
        .map(|provider| {
            let provider = provider.clone();
            tokio::spawn(async move { provider.issues().await })
        })
        .collect();
    let results = join_all(tasks).await;

    let mut merged = Vec::new();
    for (provider, result) in providers.iter().zip(results) {
        match result {
            Ok(Ok(mut issues)) => merged.append(&mut issues),
            Ok(Err(e)) => {
                warn!(provider = %provider.name(), error = %e, "issue provider failed")
            }
            Err(e) => {
                error!(provider = %provider.name(), error = %e, "issue provider crashed")
            }
        }
    }
    sort_issues(&mut merged);
    debug!(issues = merged.len(), "issues gathered");
    Ok(merged)
}

/// Builder for a [`PollingService`].
#[derive(Default)]
pub struct PollingServiceBuilder {
    registry: Option<Arc<Registry>>,
    issue_providers: Vec<Arc<dyn IssuesProvider>>,
    role_providers: Vec<Arc<dyn NodeRoleProvider>>,
    outputs: Vec<Output>,
    interval: Option<Duration>,
    snapshot_interval: Option<Duration>,
}

impl PollingServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing registry, e.g. one that discovery code also holds.
    pub fn registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn issues_provider(mut self, provider: Arc<dyn IssuesProvider>) -> Self {
        self.issue_providers.push(provider);
        self
    }

    pub fn role_provider(mut self, provider: Arc<dyn NodeRoleProvider>) -> Self {
        self.role_providers.push(provider);
        self
    }

    /// Add a snapshot destination. Multiple outputs all receive snapshots.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Scan loop tick. Defaults to 1 second.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// How often snapshots go to the outputs. Defaults to 5 seconds.
    pub fn snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    pub fn build(self) -> PollingService {
        let issue_providers = Arc::new(self.issue_providers);
        let issues = {
            let providers = issue_providers.clone();
            Cache::builder("Issues")
                .cache_for(ISSUES_CACHE_DURATION)
                .affects_status(false)
                .build(move || gather_issues(providers.clone()))
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        PollingService {
            registry: self.registry.unwrap_or_default(),
            issue_providers,
            role_providers: self.role_providers,
            issues,
            outputs: Arc::new(self.outputs),
            interval: self.interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            snapshot_interval: self.snapshot_interval.unwrap_or(DEFAULT_SNAPSHOT_INTERVAL),
            events,
            stats: Arc::new(ServiceStats::default()),
        }
    }
}
