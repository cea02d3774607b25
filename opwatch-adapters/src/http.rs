//! Plain HTTP/JSON endpoints as cache sources.
//!
//! Many backends expose a health or stats document over HTTP. This module
//! turns such an endpoint into a fetch function for a [`Cache`], reads a
//! status string out of the document, and serves issue lists published as
//! JSON.
//!
//! ## Example
//!
//! ```rust,no_run
//! use opwatch_adapters::http::{json_status, HttpJsonSource};
//! use opwatch_core::Cache;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = HttpJsonSource::builder()
//!         .endpoint("http://search-01:9200/_cluster/health")
//!         .credentials("monitor", "secret")
//!         .build()?;
//!
//!     let health = Cache::builder("ClusterHealth")
//!         .owner("Elastic", "search-01")
//!         .interpret(json_status("/status"))
//!         .build(source.fetcher::<serde_json::Value>());
//!
//!     health.poll(false).await;
//!     println!("{:?}", health.status_contribution());
//!     Ok(())
//! }
//! ```
//!
//! [`Cache`]: opwatch_core::Cache

use std::time::Duration;

use async_trait::async_trait;
use opwatch_core::{FetchError, FetchFuture, IssuesProvider};
use opwatch_types::{Issue, MonitorStatus, StatusContribution};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::AdapterError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An HTTP endpoint that answers with JSON.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    client: Client,
    endpoint: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpJsonSource {
    pub fn builder() -> HttpJsonSourceBuilder {
        HttpJsonSourceBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// GET the endpoint and decode the body.
    pub async fn fetch_json<T: DeserializeOwned>(&self) -> Result<T, AdapterError> {
        self.get_json(&self.endpoint).await
    }

    /// GET a path relative to the endpoint and decode the body.
    pub async fn fetch_path<T: DeserializeOwned>(&self, path: &str) -> Result<T, AdapterError> {
        let url = format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        self.get_json(&url).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AdapterError> {
        let mut request = self.client.get(url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url, status = status.as_u16(), "http source answered");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AdapterError::Auth("Invalid credentials".to_string()));
        }

        if !status.is_success() {
            return Err(AdapterError::Http(format!("{} returned status {}", url, status)));
        }

        response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }

    /// A fetch function for [`CacheBuilder::build`](opwatch_core::CacheBuilder::build).
    pub fn fetcher<T>(&self) -> impl Fn() -> FetchFuture<T> + Send + Sync + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let source = self.clone();
        move || {
            let source = source.clone();
            Box::pin(async move { source.fetch_json::<T>().await.map_err(FetchError::from) })
        }
    }
}

/// Builder for [`HttpJsonSource`].
#[derive(Debug, Default)]
pub struct HttpJsonSourceBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
}

impl HttpJsonSourceBuilder {
    /// Full URL to poll (default: "http://localhost:8080").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use HTTP basic authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<HttpJsonSource, AdapterError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;

        Ok(HttpJsonSource {
            client,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            username: self.username,
            password: self.password,
        })
    }
}

/// Judge a JSON document by the value at a JSON pointer (e.g. `/status`).
///
/// Strings go through [`MonitorStatus::from_str_lossy`]; booleans map to
/// Good or Critical; a missing or odd value is Unknown.
pub fn status_at(document: &Value, pointer: &str) -> StatusContribution {
    match document.pointer(pointer) {
        Some(Value::String(s)) => {
            let status = MonitorStatus::from_str_lossy(s);
            if status.is_good() {
                StatusContribution::good()
            } else {
                StatusContribution::with_reason(status, format!("{} is '{}'", pointer, s))
            }
        }
        Some(Value::Bool(true)) => StatusContribution::good(),
        Some(Value::Bool(false)) => {
            StatusContribution::with_reason(MonitorStatus::Critical, format!("{} is false", pointer))
        }
        Some(other) => StatusContribution::with_reason(
            MonitorStatus::Unknown,
            format!("unexpected value at {}: {}", pointer, other),
        ),
        None => StatusContribution::with_reason(
            MonitorStatus::Unknown,
            format!("{} missing from response", pointer),
        ),
    }
}

/// [`status_at`] as a cache interpreter.
pub fn json_status(
    pointer: impl Into<String>,
) -> impl Fn(&Value) -> StatusContribution + Send + Sync + 'static {
    let pointer = pointer.into();
    move |document: &Value| status_at(document, &pointer)
}

/// Issues published as a JSON array by some HTTP service.
#[derive(Debug, Clone)]
pub struct HttpIssuesProvider {
    name: String,
    source: HttpJsonSource,
}

impl HttpIssuesProvider {
    pub fn new(name: impl Into<String>, source: HttpJsonSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

#[async_trait]
impl IssuesProvider for HttpIssuesProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn issues(&self) -> Result<Vec<Issue>, FetchError> {
        Ok(self.source.fetch_json().await?)
    }
}
