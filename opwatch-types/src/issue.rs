//! Issues and node roles reported by collaborators.

use alloc::string::String;
use core::cmp::Ordering;

use crate::MonitorStatus;

/// Something currently wrong, as reported by an issue provider.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Issue {
    /// Identifier of the affected item (node key, cluster name, ...).
    pub key: String,

    pub title: String,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub description: Option<String>,

    pub status: MonitorStatus,

    /// Unix timestamp in milliseconds of when the issue was observed.
    pub timestamp_ms: u64,

    /// Whether the issue affects a whole cluster rather than one member.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_cluster: bool,
}

impl Issue {
    pub fn new(key: impl Into<String>, title: impl Into<String>, status: MonitorStatus) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            description: None,
            status,
            timestamp_ms: 0,
            is_cluster: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn at(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    pub fn cluster(mut self) -> Self {
        self.is_cluster = true;
        self
    }

    /// Display priority: cluster-wide first, then worst status, then most
    /// recent, then title ascending.
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        other
            .is_cluster
            .cmp(&self.is_cluster)
            .then_with(|| other.status.cmp(&self.status))
            .then_with(|| other.timestamp_ms.cmp(&self.timestamp_ms))
            .then_with(|| self.title.cmp(&other.title))
    }
}

/// Stable sort into display priority (see [`Issue::priority_cmp`]).
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(Issue::priority_cmp);
}

/// A role a node plays for some service (a load balancer backend, a
/// replication member, ...), as reported by a role provider.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeRole {
    /// Which provider/service the role belongs to.
    pub service: String,
    pub description: String,
    /// Whether the role is currently enabled for the node.
    pub active: bool,
}

impl NodeRole {
    pub fn new(service: impl Into<String>, description: impl Into<String>, active: bool) -> Self {
        Self {
            service: service.into(),
            description: description.into(),
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn titles(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn equal_status_and_date_sorts_by_title() {
        let mut issues = vec![
            Issue::new("b", "beta", MonitorStatus::Warning).at(100),
            Issue::new("a", "alpha", MonitorStatus::Warning).at(100),
        ];
        sort_issues(&mut issues);
        assert_eq!(titles(&issues), ["alpha", "beta"]);
    }

    #[test]
    fn full_priority_chain() {
        let mut issues = vec![
            Issue::new("n1", "old warning", MonitorStatus::Warning).at(10),
            Issue::new("n2", "new warning", MonitorStatus::Warning).at(20),
            Issue::new("n3", "critical", MonitorStatus::Critical).at(5),
            Issue::new("c1", "cluster warning", MonitorStatus::Warning)
                .at(1)
                .cluster(),
            Issue::new("n4", "maintenance", MonitorStatus::Maintenance).at(50),
        ];
        sort_issues(&mut issues);
        assert_eq!(
            titles(&issues),
            [
                "cluster warning",
                "critical",
                "new warning",
                "old warning",
                "maintenance"
            ]
        );
    }

    #[test]
    fn sort_is_stable_for_identical_priority() {
        let mut issues = vec![
            Issue::new("first", "same", MonitorStatus::Critical).at(1),
            Issue::new("second", "same", MonitorStatus::Critical).at(1),
        ];
        sort_issues(&mut issues);
        assert_eq!(issues[0].key, "first");
        assert_eq!(issues[1].key, "second");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn issue_description_skipped_when_absent() {
        let issue = Issue::new("db1", "Replica offline", MonitorStatus::Warning);
        let json = serde_json::to_string(&issue).unwrap();
        assert!(!json.contains("description"));
    }
}
