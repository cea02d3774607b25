//! Typed, time-boxed, single-flight data caches.
//!
//! A [`Cache`] owns one piece of data fetched from a backend. It remembers
//! the last good value even when later fetches fail, and it never runs
//! more than one fetch at a time: callers arriving while a fetch is in
//! flight wait on that fetch instead of starting another.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use opwatch_types::{
    current_timestamp_ms, reason_summary, CacheInfo, Microseconds, MonitorStatus, Monitored,
    StatusContribution,
};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{panic_message, FetchError};

/// Future returned by a cache's fetch function.
pub type FetchFuture<T> = BoxFuture<'static, Result<T, FetchError>>;

type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;
type Interpreter<T> = Arc<dyn Fn(&T) -> StatusContribution + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, PollOutcome>>;

/// How long a successful value stays fresh when nothing else is configured.
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60);

/// Result of asking a cache to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// A fetch ran (or was joined) for this call.
    pub fetched: bool,
    /// The most recent fetch succeeded.
    pub success: bool,
    pub error: Option<String>,
}

impl PollOutcome {
    fn fetched(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                fetched: true,
                success: true,
                error: None,
            },
            Err(e) => Self {
                fetched: true,
                success: false,
                error: Some(e),
            },
        }
    }
}

/// Identity of the node that owns a cache, used for error context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOwner {
    pub node_type: String,
    pub key: String,
}

/// When something happened, on both clocks.
///
/// The monotonic instant drives freshness; the wall-clock stamp is what
/// gets reported.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PollStamp {
    pub at: Instant,
    pub wall_ms: u64,
}

impl PollStamp {
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            wall_ms: current_timestamp_ms(),
        }
    }
}

struct CacheState<T> {
    data: Option<Arc<T>>,
    last_poll: Option<PollStamp>,
    last_success: Option<PollStamp>,
    last_poll_duration: Option<Duration>,
    last_fetch_failed: bool,
    error: Option<String>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            data: None,
            last_poll: None,
            last_success: None,
            last_poll_duration: None,
            last_fetch_failed: false,
            error: None,
        }
    }
}

struct CacheInner<T> {
    name: String,
    owner: CacheOwner,
    cache_duration: Duration,
    failure_duration: Duration,
    affects_status: bool,
    fetcher: Fetcher<T>,
    interpreter: Option<Interpreter<T>>,
    state: RwLock<CacheState<T>>,
    in_flight: Mutex<Option<InFlight>>,
    polls_total: AtomicU64,
    polls_failed: AtomicU64,
}

impl<T: Send + Sync + 'static> CacheInner<T> {
    fn is_fresh(&self) -> bool {
        let state = self.state.read();
        if state.last_fetch_failed {
            state
                .last_poll
                .is_some_and(|p| p.at.elapsed() < self.failure_duration)
        } else {
            state.data.is_some()
                && state
                    .last_success
                    .is_some_and(|p| p.at.elapsed() < self.cache_duration)
        }
    }

    fn current_outcome(&self) -> PollOutcome {
        let state = self.state.read();
        PollOutcome {
            fetched: false,
            success: !state.last_fetch_failed,
            error: state.error.clone(),
        }
    }

    async fn run_fetch(self: Arc<Self>) -> PollOutcome {
        let started = PollStamp::now();
        self.state.write().last_poll = Some(started);

        let fetcher = self.fetcher.clone();
        let result = match AssertUnwindSafe(async move { fetcher().await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(FetchError::Panicked(panic_message(payload.as_ref()))),
        };

        let elapsed = started.at.elapsed();
        self.polls_total.fetch_add(1, Ordering::Relaxed);

        // The slot is released together with the state commit, so a poll
        // never joins a fetch whose result is already stored.
        let mut slot = self.in_flight.lock();
        let outcome = {
            let mut state = self.state.write();
            state.last_poll_duration = Some(elapsed);
            match result {
                Ok(value) => {
                    state.data = Some(Arc::new(value));
                    state.last_success = Some(PollStamp::now());
                    state.last_fetch_failed = false;
                    state.error = None;
                    debug!(
                        node_type = %self.owner.node_type,
                        node_key = %self.owner.key,
                        cache = %self.name,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "cache refreshed"
                    );
                    PollOutcome::fetched(Ok(()))
                }
                Err(err) => {
                    self.polls_failed.fetch_add(1, Ordering::Relaxed);
                    let message = self.describe_failure(&err);
                    if matches!(err, FetchError::Panicked(_)) {
                        error!(
                            node_type = %self.owner.node_type,
                            node_key = %self.owner.key,
                            cache = %self.name,
                            error = %err,
                            "cache fetch panicked"
                        );
                    } else {
                        warn!(
                            node_type = %self.owner.node_type,
                            node_key = %self.owner.key,
                            cache = %self.name,
                            error = %err,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "cache poll failed"
                        );
                    }
                    state.last_fetch_failed = true;
                    state.error = Some(message.clone());
                    PollOutcome::fetched(Err(message))
                }
            }
        };

        *slot = None;
        outcome
    }

    fn describe_failure(&self, err: &FetchError) -> String {
        if self.owner.key.is_empty() {
            format!("{}: {}", self.name, err)
        } else {
            format!(
                "{} {} {}: {}",
                self.owner.node_type, self.owner.key, self.name, err
            )
        }
    }

    fn interpret(&self, data: &T) -> StatusContribution {
        let Some(interpreter) = self.interpreter.as_ref() else {
            return StatusContribution::good();
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| interpreter(data))) {
            Ok(contribution) => contribution,
            Err(payload) => {
                let err = FetchError::Interpretation(panic_message(payload.as_ref()));
                let message = self.describe_failure(&err);
                let mut state = self.state.write();
                if state.error.as_deref() != Some(message.as_str()) {
                    error!(
                        node_type = %self.owner.node_type,
                        node_key = %self.owner.key,
                        cache = %self.name,
                        error = %err,
                        "status interpreter panicked"
                    );
                    state.error = Some(message.clone());
                }
                StatusContribution::with_reason(MonitorStatus::Warning, message)
            }
        }
    }
}

/// A named, typed unit of polled data.
///
/// Cloning a `Cache` yields another handle to the same state.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use opwatch_core::{Cache, FetchError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: Cache<String> = Cache::builder("Version")
///     .cache_for(Duration::from_secs(30))
///     .failure_for(Duration::from_secs(5))
///     .build(|| async { Ok::<_, FetchError>("7.2.4".to_string()) });
///
/// cache.poll(false).await;
/// assert_eq!(cache.get_data().as_deref().map(String::as_str), Some("7.2.4"));
/// # }
/// ```
pub struct Cache<T> {
    inner: Arc<CacheInner<T>>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Cache<T> {
    pub fn builder(name: impl Into<String>) -> CacheBuilder<T> {
        CacheBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn owner(&self) -> &CacheOwner {
        &self.inner.owner
    }

    /// The held value, fresh or stale. Never triggers a fetch.
    pub fn get_data(&self) -> Option<Arc<T>> {
        self.inner.state.read().data.clone()
    }

    pub fn has_data(&self) -> bool {
        self.inner.state.read().data.is_some()
    }

    /// Refresh the cache.
    ///
    /// Without `force`, a cache that is still fresh returns its current
    /// state without fetching. Otherwise a fetch is started, or the one
    /// already in flight is joined; every caller attached to a fetch sees
    /// the same outcome.
    ///
    /// The fetch runs as its own task, so dropping the returned future
    /// does not cancel it.
    pub fn poll(&self, force: bool) -> BoxFuture<'static, PollOutcome> {
        if !force && self.inner.is_fresh() {
            return futures::future::ready(self.inner.current_outcome()).boxed();
        }

        let mut slot = self.inner.in_flight.lock();
        if let Some(pending) = slot.as_ref() {
            return pending.clone().boxed();
        }

        let task = tokio::spawn(self.inner.clone().run_fetch());
        let shared = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => PollOutcome::fetched(Err(format!("fetch task aborted: {e}"))),
            }
        }
        .boxed()
        .shared();

        *slot = Some(shared.clone());
        shared.boxed()
    }

    /// Whether a fetch is currently in flight.
    pub fn is_polling(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Whether a non-forced poll would be skipped right now.
    pub fn is_fresh(&self) -> bool {
        self.inner.is_fresh()
    }

    pub fn error_message(&self) -> Option<String> {
        self.inner.state.read().error.clone()
    }

    /// Unix timestamp (ms) of the most recent poll start.
    pub fn last_poll_ms(&self) -> Option<u64> {
        self.inner.state.read().last_poll.map(|p| p.wall_ms)
    }

    /// Unix timestamp (ms) of the most recent successful poll.
    pub fn last_success_ms(&self) -> Option<u64> {
        self.inner.state.read().last_success.map(|p| p.wall_ms)
    }

    pub fn last_poll_duration(&self) -> Option<Duration> {
        self.inner.state.read().last_poll_duration
    }

    pub fn polls_total(&self) -> u64 {
        self.inner.polls_total.load(Ordering::Relaxed)
    }

    pub fn polls_failed(&self) -> u64 {
        self.inner.polls_failed.load(Ordering::Relaxed)
    }

    pub fn affects_status(&self) -> bool {
        self.inner.affects_status
    }

    /// Drop the held value so the next poll fetches regardless of age.
    ///
    /// Counters and timestamps are kept.
    pub fn clear(&self) {
        self.inner.state.write().data = None;
    }

    /// This cache's view of its owner's health.
    ///
    /// No data yet is `Unknown`; no data after a failed fetch is
    /// `Critical`. Held data is judged by the interpreter (or `Good`
    /// without one) and a failed latest fetch adds a `Warning` carrying the
    /// error.
    pub fn status_contribution(&self) -> StatusContribution {
        let (data, failed, error) = {
            let state = self.inner.state.read();
            (
                state.data.clone(),
                state.last_fetch_failed,
                state.error.clone(),
            )
        };

        let Some(data) = data else {
            return match (failed, error) {
                (true, Some(e)) => StatusContribution::with_reason(MonitorStatus::Critical, e),
                _ => StatusContribution::new(MonitorStatus::Unknown),
            };
        };

        let judged = self.inner.interpret(&data);
        match (failed, error) {
            (true, Some(e)) => {
                let stale = StatusContribution::with_reason(MonitorStatus::Warning, e);
                let status = judged.status.max(stale.status);
                let reason = reason_summary([&judged, &stale]);
                StatusContribution { status, reason }
            }
            _ => judged,
        }
    }

    pub fn info(&self) -> CacheInfo {
        let state = self.inner.state.read();
        CacheInfo {
            name: self.inner.name.clone(),
            last_poll_ms: state.last_poll.map(|p| p.wall_ms),
            last_success_ms: state.last_success.map(|p| p.wall_ms),
            last_poll_duration: state.last_poll_duration.map(Microseconds::from),
            error: state.error.clone(),
            has_data: state.data.is_some(),
            polls_total: self.polls_total(),
            polls_failed: self.polls_failed(),
            affects_status: self.inner.affects_status,
        }
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("owner", &self.inner.owner)
            .field("cache_duration", &self.inner.cache_duration)
            .field("failure_duration", &self.inner.failure_duration)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Monitored for Cache<T> {
    fn monitor_status(&self) -> MonitorStatus {
        self.status_contribution().status
    }

    fn monitor_status_reason(&self) -> Option<String> {
        self.status_contribution().reason
    }
}

/// Type-erased view of a cache, as seen by its owning node.
pub trait CachePoller: Send + Sync {
    fn name(&self) -> &str;

    fn poll(&self, force: bool) -> BoxFuture<'static, PollOutcome>;

    /// Informational caches don't count towards their owner's status.
    fn affects_status(&self) -> bool;

    fn status_contribution(&self) -> StatusContribution;

    fn info(&self) -> CacheInfo;
}

impl<T: Send + Sync + 'static> CachePoller for Cache<T> {
    fn name(&self) -> &str {
        Cache::name(self)
    }

    fn poll(&self, force: bool) -> BoxFuture<'static, PollOutcome> {
        Cache::poll(self, force)
    }

    fn affects_status(&self) -> bool {
        Cache::affects_status(self)
    }

    fn status_contribution(&self) -> StatusContribution {
        Cache::status_contribution(self)
    }

    fn info(&self) -> CacheInfo {
        Cache::info(self)
    }
}

/// Builder for a [`Cache`].
pub struct CacheBuilder<T> {
    name: String,
    owner: CacheOwner,
    cache_duration: Duration,
    failure_duration: Option<Duration>,
    affects_status: bool,
    interpreter: Option<Interpreter<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> CacheBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: CacheOwner::default(),
            cache_duration: DEFAULT_CACHE_DURATION,
            failure_duration: None,
            affects_status: true,
            interpreter: None,
            _marker: PhantomData,
        }
    }

    /// Node type and key of the owner, included in error messages and logs.
    pub fn owner(mut self, node_type: impl Into<String>, key: impl Into<String>) -> Self {
        self.owner = CacheOwner {
            node_type: node_type.into(),
            key: key.into(),
        };
        self
    }

    /// How long a successful value is fresh.
    pub fn cache_for(mut self, duration: Duration) -> Self {
        self.cache_duration = duration;
        self
    }

    /// How long a failed fetch is remembered before retrying.
    ///
    /// Defaults to the cache duration.
    pub fn failure_for(mut self, duration: Duration) -> Self {
        self.failure_duration = Some(duration);
        self
    }

    /// Whether this cache counts towards its owner's status. Defaults to true.
    pub fn affects_status(mut self, affects: bool) -> Self {
        self.affects_status = affects;
        self
    }

    /// Judge fetched data.
    pub fn interpret<F>(mut self, interpreter: F) -> Self
    where
        F: Fn(&T) -> StatusContribution + Send + Sync + 'static,
    {
        self.interpreter = Some(Arc::new(interpreter));
        self
    }

    /// Build the cache around its fetch function.
    pub fn build<F, Fut>(self, fetch: F) -> Cache<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let fetcher: Fetcher<T> = Arc::new(move || fetch().boxed());
        Cache {
            inner: Arc::new(CacheInner {
                name: self.name,
                owner: self.owner,
                cache_duration: self.cache_duration,
                failure_duration: self.failure_duration.unwrap_or(self.cache_duration),
                affects_status: self.affects_status,
                fetcher,
                interpreter: self.interpreter,
                state: RwLock::new(CacheState::default()),
                in_flight: Mutex::new(None),
                polls_total: AtomicU64::new(0),
                polls_failed: AtomicU64::new(0),
            }),
        }
    }
}
