//! Configuration file and environment loading.
//!
//! # Example
//!
//! ```toml
//! poll_interval_secs = 1
//! snapshot_interval_secs = 5
//!
//! [output]
//! file = "snapshot.json"
//!
//! [[targets]]
//! name = "search-01"
//! url = "http://search-01:9200/_cluster/health"
//! status_field = "/status"
//! cache_secs = 15
//!
//! [[groups]]
//! name = "search"
//! members = ["search-01"]
//! ```
//!
//! Any value can be overridden from the environment with an `OPWATCH_`
//! prefix and `__` between nested keys, e.g. `OPWATCH_POLL_INTERVAL_SECS=2`
//! or `OPWATCH_OUTPUT__TCP=127.0.0.1:9000`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Top-level settings for the `opwatch` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpwatchConfig {
    pub poll_interval_secs: u64,
    pub snapshot_interval_secs: u64,
    pub output: OutputConfig,
    pub targets: Vec<TargetConfig>,
    pub groups: Vec<GroupConfig>,
    pub issue_sources: Vec<IssueSourceConfig>,
}

impl Default for OpwatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            snapshot_interval_secs: 5,
            output: OutputConfig::default(),
            targets: Vec::new(),
            groups: Vec::new(),
            issue_sources: Vec::new(),
        }
    }
}

/// Snapshot sinks. All optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub file: Option<PathBuf>,
    pub tcp: Option<String>,
    /// Listen address for the metrics endpoint (needs the `prometheus` feature).
    pub prometheus: Option<String>,
}

/// One HTTP health endpoint to poll.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_secs")]
    pub cache_secs: u64,
    /// Retry delay after a failed fetch; defaults to `cache_secs`.
    #[serde(default)]
    pub failure_secs: Option<u64>,
    #[serde(default = "default_min_secs_between_polls")]
    pub min_secs_between_polls: u64,
    #[serde(default)]
    pub backoff_secs: u64,
    /// JSON pointer to a health string, e.g. `/status`.
    #[serde(default)]
    pub status_field: Option<String>,
}

impl TargetConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_secs)
    }

    pub fn failure_duration(&self) -> Duration {
        Duration::from_secs(self.failure_secs.unwrap_or(self.cache_secs))
    }

    pub fn min_between_polls(&self) -> Duration {
        Duration::from_secs(self.min_secs_between_polls)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

/// Targets whose health is summarised as one node.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// An HTTP endpoint serving a JSON array of issues.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueSourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_kind() -> String {
    "http".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cache_secs() -> u64 {
    30
}

fn default_min_secs_between_polls() -> u64 {
    5
}

impl OpwatchConfig {
    /// Load from an optional file, then the `OPWATCH_*` environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("OPWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let parsed: OpwatchConfig = config
            .try_deserialize()
            .context("invalid configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject configurations that can't be turned into nodes.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be at least 1");
        }
        if self.snapshot_interval_secs == 0 {
            bail!("snapshot_interval_secs must be at least 1");
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                bail!("target with url '{}' has no name", target.url);
            }
            if !names.insert(target.name.as_str()) {
                bail!("duplicate target name '{}'", target.name);
            }
            if !target.kind.eq_ignore_ascii_case("http") {
                bail!(
                    "target '{}' has unsupported type '{}'",
                    target.name,
                    target.kind
                );
            }
            if target.url.trim().is_empty() {
                bail!("target '{}' has no url", target.name);
            }
            if let Some(pointer) = &target.status_field {
                if !pointer.is_empty() && !pointer.starts_with('/') {
                    bail!(
                        "target '{}': status_field '{}' must be a JSON pointer starting with '/'",
                        target.name,
                        pointer
                    );
                }
            }
        }

        let mut groups = HashSet::new();
        for group in &self.groups {
            if !groups.insert(group.name.as_str()) {
                bail!("duplicate group name '{}'", group.name);
            }
            for member in &group.members {
                if !names.contains(member.as_str()) {
                    bail!("group '{}' refers to unknown target '{}'", group.name, member);
                }
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_without_a_file() {
        let config = OpwatchConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.snapshot_interval(), Duration::from_secs(5));
        assert!(config.targets.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_targets_and_groups() {
        let file = write_config(
            r#"
            poll_interval_secs = 2

            [output]
            file = "/tmp/opwatch.json"

            [[targets]]
            name = "search-01"
            url = "http://search-01:9200/_cluster/health"
            status_field = "/status"
            cache_secs = 15

            [[targets]]
            name = "api"
            url = "http://api:8080/health"
            username = "monitor"
            password = "secret"
            failure_secs = 3
            backoff_secs = 20

            [[groups]]
            name = "all"
            members = ["search-01", "api"]
            "#,
        );

        let config = OpwatchConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.snapshot_interval_secs, 5);
        assert_eq!(config.output.file, Some(PathBuf::from("/tmp/opwatch.json")));
        assert_eq!(config.targets.len(), 2);

        let search = &config.targets[0];
        assert_eq!(search.kind, "http");
        assert_eq!(search.timeout(), Duration::from_secs(10));
        assert_eq!(search.cache_duration(), Duration::from_secs(15));
        assert_eq!(search.failure_duration(), Duration::from_secs(15));
        assert_eq!(search.min_between_polls(), Duration::from_secs(5));
        assert_eq!(search.status_field.as_deref(), Some("/status"));

        let api = &config.targets[1];
        assert_eq!(api.username.as_deref(), Some("monitor"));
        assert_eq!(api.failure_duration(), Duration::from_secs(3));
        assert_eq!(api.backoff(), Duration::from_secs(20));

        assert_eq!(config.groups[0].members, vec!["search-01", "api"]);
    }

    #[test]
    fn rejects_unknown_group_members() {
        let file = write_config(
            r#"
            [[targets]]
            name = "api"
            url = "http://api:8080/health"

            [[groups]]
            name = "web"
            members = ["api", "frontend"]
            "#,
        );

        let err = OpwatchConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("unknown target 'frontend'"));
    }

    #[test]
    fn rejects_duplicate_targets() {
        let file = write_config(
            r#"
            [[targets]]
            name = "api"
            url = "http://a/health"

            [[targets]]
            name = "api"
            url = "http://b/health"
            "#,
        );

        let err = OpwatchConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("duplicate target name 'api'"));
    }

    #[test]
    fn rejects_unsupported_target_types() {
        let file = write_config(
            r#"
            [[targets]]
            name = "db"
            type = "sql"
            url = "mssql://db"
            "#,
        );

        let err = OpwatchConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("unsupported type 'sql'"));
    }

    #[test]
    fn rejects_relative_status_fields() {
        let mut config = OpwatchConfig::default();
        config.targets.push(TargetConfig {
            name: "api".to_string(),
            kind: default_kind(),
            url: "http://api/health".to_string(),
            username: None,
            password: None,
            timeout_secs: 10,
            cache_secs: 30,
            failure_secs: None,
            min_secs_between_polls: 5,
            backoff_secs: 0,
            status_field: Some("status".to_string()),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = OpwatchConfig::load(Some(Path::new("/nonexistent/opwatch.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to read configuration"));
    }
}
