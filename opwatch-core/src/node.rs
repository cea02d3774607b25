//! Pollable nodes: monitored things that own caches.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opwatch_types::{
    reason_summary, worst, Microseconds, MonitorStatus, Monitored, NodeInfo, StatusContribution,
};
use parking_lot::RwLock;
use tracing::debug;

use crate::cache::{CachePoller, PollStamp};

/// Floor on how often a node is polled, forced or not.
pub const DEFAULT_MIN_BETWEEN_POLLS: Duration = Duration::from_secs(5);

/// Per-node polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSettings {
    /// Minimum time between two polls of this node. A forced poll inside
    /// this window is treated as a normal one.
    pub min_between_polls: Duration,
    /// Extra wait, on top of `min_between_polls`, before the next
    /// scheduled poll after a failed one.
    pub backoff: Duration,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            min_between_polls: DEFAULT_MIN_BETWEEN_POLLS,
            backoff: Duration::ZERO,
        }
    }
}

impl NodeSettings {
    pub fn min_between_polls(mut self, d: Duration) -> Self {
        self.min_between_polls = d;
        self
    }

    pub fn backoff(mut self, d: Duration) -> Self {
        self.backoff = d;
        self
    }
}

#[derive(Debug, Default)]
struct PollBook {
    last_poll: Option<PollStamp>,
    last_poll_duration: Option<Duration>,
    fails_in_a_row: u32,
}

/// Poll bookkeeping every node carries.
#[derive(Debug, Default)]
pub struct NodePollState {
    settings: NodeSettings,
    is_polling: AtomicBool,
    book: RwLock<PollBook>,
    polls_total: AtomicU64,
}

impl NodePollState {
    pub fn new(settings: NodeSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> NodeSettings {
        self.settings
    }

    pub fn is_polling(&self) -> bool {
        self.is_polling.load(Ordering::Acquire)
    }

    /// Whether the scheduler should poll this node now.
    pub fn needs_poll(&self) -> bool {
        if self.is_polling() {
            return false;
        }
        let book = self.book.read();
        let Some(last) = book.last_poll else {
            return true;
        };
        let since = last.at.elapsed();
        if since < self.settings.min_between_polls {
            return false;
        }
        book.fails_in_a_row == 0 || since >= self.settings.min_between_polls + self.settings.backoff
    }

    fn within_min_window(&self) -> bool {
        self.book
            .read()
            .last_poll
            .is_some_and(|p| p.at.elapsed() < self.settings.min_between_polls)
    }

    /// Start a poll. `None` when a non-forced poll finds one already running.
    fn begin(&self, force: bool) -> Option<PollTicket<'_>> {
        let force = force && !self.within_min_window();
        let claimed = self
            .is_polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !claimed && !force {
            return None;
        }

        let started = PollStamp::now();
        self.book.write().last_poll = Some(started);
        Some(PollTicket {
            state: self,
            claimed,
            force,
            started,
        })
    }

    fn finish(&self, started: PollStamp, success: bool) {
        let mut book = self.book.write();
        book.last_poll_duration = Some(started.at.elapsed());
        book.fails_in_a_row = if success {
            0
        } else {
            book.fails_in_a_row.saturating_add(1)
        };
        self.polls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_poll_ms(&self) -> Option<u64> {
        self.book.read().last_poll.map(|p| p.wall_ms)
    }

    pub fn last_poll_duration(&self) -> Option<Duration> {
        self.book.read().last_poll_duration
    }

    pub fn fails_in_a_row(&self) -> u32 {
        self.book.read().fails_in_a_row
    }

    pub fn polls_total(&self) -> u64 {
        self.polls_total.load(Ordering::Relaxed)
    }
}

/// Holds the node's polling flag for the length of one poll.
struct PollTicket<'a> {
    state: &'a NodePollState,
    claimed: bool,
    force: bool,
    started: PollStamp,
}

impl Drop for PollTicket<'_> {
    fn drop(&mut self) {
        if self.claimed {
            self.state.is_polling.store(false, Ordering::Release);
        }
    }
}

/// What one node-level poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodePollOutcome {
    /// Another poll of this node was already running.
    pub skipped: bool,
    /// Every owned cache reported success.
    pub success: bool,
    pub caches: usize,
    pub caches_failed: usize,
}

/// A monitored entity: a server, a proxy, a cluster of other nodes.
///
/// Implementors name themselves, list the caches they own and hand out
/// their [`NodePollState`]; status, polling and reporting come for free.
/// Caches are usually fields of the implementing struct, built in its
/// constructor.
#[async_trait]
pub trait PollNode: Send + Sync + 'static {
    /// Type tag used for bulk lookups, e.g. `"Redis"`.
    fn node_type(&self) -> &str;

    /// Key stable across restarts, used for manual polls.
    fn unique_key(&self) -> &str;

    /// Caches this node owns, in display order.
    fn data_pollers(&self) -> Vec<&dyn CachePoller>;

    fn poll_state(&self) -> &NodePollState;

    /// Child nodes folded into this node's status.
    fn children(&self) -> Vec<Arc<dyn PollNode>> {
        Vec::new()
    }

    /// Status facts that don't come from a cache.
    fn own_statuses(&self) -> Vec<StatusContribution> {
        Vec::new()
    }

    /// Everything that feeds this node's status, in a stable order:
    /// status-affecting caches, own statuses, then children.
    fn status_contributions(&self) -> Vec<StatusContribution> {
        let mut parts: Vec<StatusContribution> = self
            .data_pollers()
            .into_iter()
            .filter(|c| c.affects_status())
            .map(|c| c.status_contribution())
            .collect();
        parts.extend(self.own_statuses());
        parts.extend(self.children().iter().map(|child| StatusContribution {
            status: child.node_status(),
            reason: child.node_status_reason(),
        }));
        parts
    }

    /// Worst status across [`status_contributions`](Self::status_contributions).
    /// Computed on every call.
    fn node_status(&self) -> MonitorStatus {
        worst(self.status_contributions().iter().map(|c| c.status))
    }

    fn node_status_reason(&self) -> Option<String> {
        reason_summary(&self.status_contributions())
    }

    fn needs_poll(&self) -> bool {
        self.poll_state().needs_poll()
    }

    /// Poll every owned cache concurrently.
    ///
    /// Each cache keeps its own freshness and single-flight rules. A
    /// non-forced call is skipped while another poll of this node runs; a
    /// forced one joins the fetches already in flight and reports their
    /// result.
    async fn poll_all(&self, force: bool) -> NodePollOutcome {
        let state = self.poll_state();
        let Some(ticket) = state.begin(force) else {
            if !force {
                return NodePollOutcome {
                    skipped: true,
                    ..Default::default()
                };
            }
            let pending: Vec<_> = self
                .data_pollers()
                .into_iter()
                .map(|cache| cache.poll(false))
                .collect();
            let outcomes = futures::future::join_all(pending).await;
            let caches_failed = outcomes.iter().filter(|o| !o.success).count();
            debug!(
                node_type = %self.node_type(),
                node_key = %self.unique_key(),
                caches_failed,
                "joined running node poll"
            );
            return NodePollOutcome {
                skipped: false,
                success: caches_failed == 0,
                caches: outcomes.len(),
                caches_failed,
            };
        };

        let pending: Vec<_> = self
            .data_pollers()
            .into_iter()
            .map(|cache| cache.poll(ticket.force))
            .collect();
        let outcomes = futures::future::join_all(pending).await;

        let caches_failed = outcomes.iter().filter(|o| !o.success).count();
        let success = caches_failed == 0;
        state.finish(ticket.started, success);
        debug!(
            node_type = %self.node_type(),
            node_key = %self.unique_key(),
            force = ticket.force,
            caches = outcomes.len(),
            caches_failed,
            "node polled"
        );
        drop(ticket);

        NodePollOutcome {
            skipped: false,
            success,
            caches: outcomes.len(),
            caches_failed,
        }
    }

    fn info(&self) -> NodeInfo {
        let contributions = self.status_contributions();
        let state = self.poll_state();
        NodeInfo {
            key: self.unique_key().to_string(),
            node_type: self.node_type().to_string(),
            status: worst(contributions.iter().map(|c| c.status)),
            reason: reason_summary(&contributions),
            last_poll_ms: state.last_poll_ms(),
            last_poll_duration: state.last_poll_duration().map(Microseconds::from),
            polls_total: state.polls_total(),
            fails_in_a_row: state.fails_in_a_row(),
            caches: self.data_pollers().iter().map(|c| c.info()).collect(),
            children: self
                .children()
                .iter()
                .map(|c| c.unique_key().to_string())
                .collect(),
        }
    }
}

impl Monitored for dyn PollNode {
    fn monitor_status(&self) -> MonitorStatus {
        self.node_status()
    }

    fn monitor_status_reason(&self) -> Option<String> {
        self.node_status_reason()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::error::FetchError;
    use std::sync::atomic::AtomicUsize;

    /// Cache whose data is the status it should report.
    pub(crate) fn fixed(name: &str, status: MonitorStatus) -> Cache<MonitorStatus> {
        let reason = format!("{name} is {status}");
        Cache::builder(name)
            .interpret(move |s: &MonitorStatus| StatusContribution::with_reason(*s, reason.clone()))
            .build(move || async move { Ok(status) })
    }

    pub(crate) struct TestNode {
        pub key: String,
        pub caches: Vec<Cache<MonitorStatus>>,
        pub children: Vec<Arc<dyn PollNode>>,
        pub state: NodePollState,
    }

    impl TestNode {
        pub fn new(key: &str, statuses: &[MonitorStatus]) -> Self {
            Self {
                key: key.to_string(),
                caches: statuses
                    .iter()
                    .enumerate()
                    .map(|(i, s)| fixed(&format!("cache-{i}"), *s))
                    .collect(),
                children: Vec::new(),
                state: NodePollState::new(NodeSettings::default()),
            }
        }
    }

    impl PollNode for TestNode {
        fn node_type(&self) -> &str {
            "Test"
        }

        fn unique_key(&self) -> &str {
            &self.key
        }

        fn data_pollers(&self) -> Vec<&dyn CachePoller> {
            self.caches.iter().map(|c| c as &dyn CachePoller).collect()
        }

        fn poll_state(&self) -> &NodePollState {
            &self.state
        }

        fn children(&self) -> Vec<Arc<dyn PollNode>> {
            self.children.clone()
        }
    }

    use MonitorStatus::*;

    #[tokio::test]
    async fn worst_cache_wins() {
        let node = TestNode::new("db-01", &[Good, Warning, Good]);
        node.poll_all(true).await;

        assert_eq!(node.node_status(), Warning);
        assert_eq!(node.node_status_reason().as_deref(), Some("cache-1 is WARN"));
    }

    #[tokio::test]
    async fn critical_child_wins_over_good_caches() {
        let child = TestNode::new("db-02", &[Critical]);
        child.poll_all(true).await;

        let mut parent = TestNode::new("cluster", &[Good, Good]);
        parent.children.push(Arc::new(child));
        parent.poll_all(true).await;

        assert_eq!(parent.node_status(), Critical);
        assert_eq!(parent.info().children, ["db-02"]);
    }

    #[tokio::test]
    async fn unpolled_caches_read_as_unknown() {
        let node = TestNode::new("db-01", &[Good, Good]);
        assert_eq!(node.node_status(), Unknown);
    }

    #[test]
    fn aggregator_without_caches_or_children_is_good() {
        let node = TestNode::new("empty", &[]);
        assert_eq!(node.node_status(), Good);
        assert_eq!(node.node_status_reason(), None);
    }

    #[tokio::test]
    async fn informational_caches_do_not_count() {
        let mut node = TestNode::new("db-01", &[Good]);
        node.caches.push(
            Cache::builder("Clients")
                .affects_status(false)
                .interpret(|s: &MonitorStatus| StatusContribution::new(*s))
                .build(|| async { Ok(Critical) }),
        );
        node.poll_all(true).await;

        assert_eq!(node.node_status(), Good);
        assert_eq!(node.info().caches.len(), 2);
    }

    #[tokio::test]
    async fn poll_all_reports_cache_failures() {
        let mut node = TestNode::new("db-01", &[Good]);
        node.caches.push(
            Cache::builder("Broken")
                .build(|| async { Err::<MonitorStatus, _>(FetchError::from("refused")) }),
        );

        let outcome = node.poll_all(true).await;
        assert!(!outcome.success);
        assert_eq!(outcome.caches, 2);
        assert_eq!(outcome.caches_failed, 1);
        assert_eq!(node.poll_state().fails_in_a_row(), 1);
        assert_eq!(node.info().polls_total, 1);
        assert!(!node.poll_state().is_polling());
    }

    #[test]
    fn monitored_through_trait_object() {
        let node: Arc<dyn PollNode> = Arc::new(TestNode::new("empty", &[]));
        assert_eq!(node.monitor_status(), Good);
    }

    #[tokio::test(start_paused = true)]
    async fn min_between_polls_gates_scheduling() {
        let node = TestNode::new("db-01", &[Good]);
        assert!(node.needs_poll());

        node.poll_all(false).await;
        assert!(!node.needs_poll());

        tokio::time::advance(DEFAULT_MIN_BETWEEN_POLLS).await;
        assert!(node.needs_poll());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_polls_after_failure() {
        let mut node = TestNode::new("db-01", &[]);
        node.state = NodePollState::new(
            NodeSettings::default()
                .min_between_polls(Duration::from_secs(1))
                .backoff(Duration::from_secs(30)),
        );
        node.caches.push(
            Cache::builder("Broken")
                .build(|| async { Err::<MonitorStatus, _>(FetchError::Timeout) }),
        );

        node.poll_all(false).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!node.needs_poll());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(node.needs_poll());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_adds_to_min_between_polls() {
        let mut node = TestNode::new("db-01", &[]);
        node.state = NodePollState::new(
            NodeSettings::default()
                .min_between_polls(Duration::from_secs(5))
                .backoff(Duration::from_secs(3)),
        );
        node.caches.push(
            Cache::builder("Broken")
                .build(|| async { Err::<MonitorStatus, _>(FetchError::Timeout) }),
        );

        node.poll_all(false).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!node.needs_poll());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(node.needs_poll());
    }

    #[tokio::test(start_paused = true)]
    async fn forced_poll_inside_min_window_is_downgraded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut node = TestNode::new("db-01", &[]);
        node.caches.push({
            let calls = calls.clone();
            Cache::builder("Counted").build(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(Good) }
            })
        });

        node.poll_all(true).await;
        node.poll_all(true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(DEFAULT_MIN_BETWEEN_POLLS).await;
        node.poll_all(true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn non_forced_poll_skips_while_polling() {
        let state = NodePollState::default();
        let held = state.begin(false).unwrap();
        assert!(state.is_polling());
        assert!(state.begin(false).is_none());
        drop(held);
        assert!(!state.is_polling());
    }
}
