//! Nodes built from configuration.

mod group;
mod http;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use opwatch_adapters::http::{HttpIssuesProvider, HttpJsonSource};
use opwatch_core::{Output, PollNode, PollingService};
use tracing::info;

use crate::config::OpwatchConfig;

pub use group::Group;
pub use http::HttpTarget;

/// Build a polling service with every configured target, group, issue
/// source and output registered. Nothing is polled until the service is
/// started.
pub fn build_service(config: &OpwatchConfig) -> Result<PollingService> {
    let mut builder = PollingService::builder()
        .interval(config.poll_interval())
        .snapshot_interval(config.snapshot_interval());

    if let Some(path) = &config.output.file {
        builder = builder.output(Output::file(path.clone()));
    }
    if let Some(addr) = &config.output.tcp {
        builder = builder.output(Output::tcp(addr.clone()));
    }

    #[cfg(feature = "prometheus")]
    if let Some(addr) = &config.output.prometheus {
        let prometheus = opwatch_core::PrometheusConfig::builder()
            .listen_addr(addr.clone())
            .build();
        builder = builder.output(Output::prometheus(prometheus));
    }

    #[cfg(not(feature = "prometheus"))]
    if config.output.prometheus.is_some() {
        tracing::warn!("output.prometheus is set but this build has no prometheus support");
    }

    for source in &config.issue_sources {
        let http = HttpJsonSource::builder()
            .endpoint(&source.url)
            .timeout(std::time::Duration::from_secs(source.timeout_secs))
            .build()
            .with_context(|| format!("issue source '{}'", source.name))?;
        builder = builder.issues_provider(Arc::new(HttpIssuesProvider::new(&source.name, http)));
    }

    let service = builder.build();

    let mut by_name: HashMap<&str, Arc<dyn PollNode>> = HashMap::new();
    for target in &config.targets {
        let node: Arc<dyn PollNode> = Arc::new(
            HttpTarget::from_config(target)
                .with_context(|| format!("target '{}'", target.name))?,
        );
        service.try_register(node.clone());
        by_name.insert(target.name.as_str(), node);
    }

    for group in &config.groups {
        let members = group
            .members
            .iter()
            .filter_map(|m| by_name.get(m.as_str()).cloned())
            .collect();
        service.try_register(Arc::new(Group::new(&group.name, members)));
    }

    info!(
        targets = config.targets.len(),
        groups = config.groups.len(),
        issue_sources = config.issue_sources.len(),
        "nodes registered"
    );
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupConfig, IssueSourceConfig, TargetConfig};
    use crate::poll_once;
    use opwatch_core::MonitorStatus;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(name: &str, url: String, status_field: Option<&str>) -> TargetConfig {
        TargetConfig {
            name: name.to_string(),
            kind: "http".to_string(),
            url,
            username: None,
            password: None,
            timeout_secs: 2,
            cache_secs: 30,
            failure_secs: None,
            min_secs_between_polls: 5,
            backoff_secs: 0,
            status_field: status_field.map(str::to_string),
        }
    }

    fn group(name: &str, members: &[&str]) -> GroupConfig {
        GroupConfig {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn registers_targets_and_groups() {
        let config = OpwatchConfig {
            targets: vec![
                target("api", "http://api/health".to_string(), None),
                target("search", "http://search/health".to_string(), Some("/status")),
            ],
            groups: vec![group("all", &["api", "search"])],
            ..Default::default()
        };

        let service = build_service(&config).unwrap();
        let registry = service.registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.find("http", "api").is_some());
        assert!(registry.find("Http", "search").is_some());

        let all = registry.find("Group", "all").unwrap();
        assert_eq!(all.children().len(), 2);
        assert_eq!(all.node_status(), MonitorStatus::Unknown);
    }

    #[tokio::test]
    async fn polls_targets_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "yellow"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"uptime": 12})))
            .mount(&server)
            .await;

        let config = OpwatchConfig {
            targets: vec![
                target("api", format!("{}/api", server.uri()), None),
                target("search", format!("{}/search", server.uri()), Some("/status")),
            ],
            groups: vec![group("all", &["api", "search"])],
            ..Default::default()
        };
        let service = build_service(&config).unwrap();

        let snapshot = poll_once(&service).await;
        assert_eq!(snapshot.get("Http", "api").unwrap().status, MonitorStatus::Good);

        let search = snapshot.get("Http", "search").unwrap();
        assert_eq!(search.status, MonitorStatus::Warning);
        assert_eq!(search.reason.as_deref(), Some("/status is 'yellow'"));

        let all = snapshot.get("Group", "all").unwrap();
        assert_eq!(all.status, MonitorStatus::Warning);
        assert_eq!(all.children, vec!["api", "search"]);
    }

    #[tokio::test]
    async fn unreachable_targets_are_critical() {
        let config = OpwatchConfig {
            targets: vec![target("gone", "http://127.0.0.1:1/health".to_string(), None)],
            ..Default::default()
        };
        let service = build_service(&config).unwrap();

        let snapshot = poll_once(&service).await;
        let gone = snapshot.get("Http", "gone").unwrap();
        assert_eq!(gone.status, MonitorStatus::Critical);
        assert_eq!(gone.fails_in_a_row, 1);
        assert!(gone.caches[0].error.is_some());
    }

    #[tokio::test]
    async fn serves_configured_issue_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"key": "api", "title": "slow responses", "status": "Warning", "timestamp_ms": 5},
                {"key": "db", "title": "primary down", "status": "Critical", "timestamp_ms": 1}
            ])))
            .mount(&server)
            .await;

        let config = OpwatchConfig {
            issue_sources: vec![IssueSourceConfig {
                name: "pager".to_string(),
                url: format!("{}/issues", server.uri()),
                timeout_secs: 2,
            }],
            ..Default::default()
        };
        let service = build_service(&config).unwrap();

        let issues = service.issues().await;
        let titles: Vec<_> = issues.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["primary down", "slow responses"]);
    }
}
