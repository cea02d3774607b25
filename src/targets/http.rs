//! A node for one HTTP health endpoint.

use opwatch_adapters::http::{json_status, HttpJsonSource};
use opwatch_adapters::AdapterError;
use opwatch_core::{Cache, CachePoller, NodePollState, NodeSettings, PollNode};
use serde_json::Value;

use crate::config::TargetConfig;

/// Polls a URL returning JSON and judges it by an optional status field.
///
/// Without a `status_field` the target is Good whenever the endpoint
/// answers with valid JSON.
pub struct HttpTarget {
    name: String,
    url: String,
    health: Cache<Value>,
    state: NodePollState,
}

impl HttpTarget {
    pub const NODE_TYPE: &'static str = "Http";

    pub fn from_config(target: &TargetConfig) -> Result<Self, AdapterError> {
        let mut source = HttpJsonSource::builder()
            .endpoint(&target.url)
            .timeout(target.timeout());
        if let Some(username) = &target.username {
            source = source.credentials(username, target.password.clone().unwrap_or_default());
        }
        let source = source.build()?;

        let mut health = Cache::builder("Health")
            .owner(Self::NODE_TYPE, &target.name)
            .cache_for(target.cache_duration())
            .failure_for(target.failure_duration());
        if let Some(pointer) = target.status_field.as_deref().filter(|p| !p.is_empty()) {
            health = health.interpret(json_status(pointer));
        }

        let settings = NodeSettings::default()
            .min_between_polls(target.min_between_polls())
            .backoff(target.backoff());

        Ok(Self {
            name: target.name.clone(),
            url: target.url.clone(),
            health: health.build(source.fetcher::<Value>()),
            state: NodePollState::new(settings),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Last document fetched from the endpoint.
    pub fn health(&self) -> &Cache<Value> {
        &self.health
    }
}

impl PollNode for HttpTarget {
    fn node_type(&self) -> &str {
        Self::NODE_TYPE
    }

    fn unique_key(&self) -> &str {
        &self.name
    }

    fn data_pollers(&self) -> Vec<&dyn CachePoller> {
        vec![&self.health as &dyn CachePoller]
    }

    fn poll_state(&self) -> &NodePollState {
        &self.state
    }
}
