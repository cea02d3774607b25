//! RegistrySnapshot - a point-in-time view of every registered node.

use alloc::string::String;
use alloc::vec::Vec;

use crate::{worst, MonitorStatus, NodeInfo, SchemaVersion};

/// A point-in-time snapshot of all registered nodes and their caches.
///
/// Snapshots are produced by the polling service on demand or periodically
/// and handed to outputs (files, TCP listeners, channels) for dashboards.
///
/// # Example
///
/// ```rust
/// use opwatch_types::{MonitorStatus, NodeInfo, RegistrySnapshot};
///
/// let snapshot = RegistrySnapshot::builder()
///     .timestamp_ms(1703160000000)
///     .node(NodeInfo {
///         key: "sql-01".into(),
///         node_type: "SQL".into(),
///         status: MonitorStatus::Warning,
///         ..Default::default()
///     })
///     .build();
///
/// assert_eq!(snapshot.worst_status(), MonitorStatus::Warning);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistrySnapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Unix timestamp in milliseconds when this snapshot was taken.
    pub timestamp_ms: u64,

    /// Every registered node, in registration order.
    pub nodes: Vec<NodeInfo>,
}

impl RegistrySnapshot {
    /// Create an empty snapshot with the current timestamp.
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_timestamp(current_timestamp_ms())
    }

    /// Create an empty snapshot with a specific timestamp.
    pub fn with_timestamp(timestamp_ms: u64) -> Self {
        Self {
            version: SchemaVersion::current(),
            timestamp_ms,
            nodes: Vec::new(),
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes of one type (case-insensitive).
    pub fn of_type<'a>(&'a self, node_type: &'a str) -> impl Iterator<Item = &'a NodeInfo> + 'a {
        self.nodes
            .iter()
            .filter(move |n| n.node_type.eq_ignore_ascii_case(node_type))
    }

    pub fn get(&self, node_type: &str, key: &str) -> Option<&NodeInfo> {
        self.nodes
            .iter()
            .find(|n| n.node_type.eq_ignore_ascii_case(node_type) && n.key == key)
    }

    /// Worst status across all nodes; `Good` for an empty snapshot.
    pub fn worst_status(&self) -> MonitorStatus {
        worst(self.nodes.iter().map(|n| n.status))
    }

    /// Number of nodes in the given status.
    pub fn count(&self, status: MonitorStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}

#[cfg(feature = "std")]
impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing `RegistrySnapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp_ms: Option<u64>,
    nodes: Vec<NodeInfo>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    pub fn node(mut self, node: NodeInfo) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn nodes(mut self, nodes: impl IntoIterator<Item = NodeInfo>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    #[cfg(feature = "std")]
    pub fn build(self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: SchemaVersion::current(),
            timestamp_ms: self.timestamp_ms.unwrap_or_else(current_timestamp_ms),
            nodes: self.nodes,
        }
    }

    /// Build the snapshot with a specific timestamp (for no_std).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> RegistrySnapshot {
        RegistrySnapshot {
            version: SchemaVersion::current(),
            timestamp_ms: self.timestamp_ms.unwrap_or(0),
            nodes: self.nodes,
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Keys of nodes in the given status, handy for summaries.
pub fn keys_in_status(snapshot: &RegistrySnapshot, status: MonitorStatus) -> Vec<String> {
    snapshot
        .nodes
        .iter()
        .filter(|n| n.status == status)
        .map(|n| n.key.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn node(node_type: &str, key: &str, status: MonitorStatus) -> NodeInfo {
        NodeInfo {
            key: key.to_string(),
            node_type: node_type.to_string(),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn builder_and_queries() {
        let snapshot = RegistrySnapshot::builder()
            .timestamp_ms(1703160000000)
            .node(node("SQL", "sql-01", MonitorStatus::Good))
            .node(node("SQL", "sql-02", MonitorStatus::Critical))
            .node(node("Redis", "redis-01:6379", MonitorStatus::Warning))
            .build();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.timestamp_ms, 1703160000000);
        assert_eq!(snapshot.of_type("sql").count(), 2);
        assert!(snapshot.get("redis", "redis-01:6379").is_some());
        assert_eq!(snapshot.worst_status(), MonitorStatus::Critical);
        assert_eq!(snapshot.count(MonitorStatus::Good), 1);
        assert_eq!(keys_in_status(&snapshot, MonitorStatus::Critical), ["sql-02"]);
    }

    #[test]
    fn get_outlives_the_lookup_strings() {
        let snapshot = RegistrySnapshot::builder()
            .node(node("Redis", "redis-01:6379", MonitorStatus::Warning))
            .build();

        let found = {
            let node_type = String::from("REDIS");
            let key = format!("redis-01:{}", 6379);
            snapshot.get(&node_type, &key)
        };
        assert_eq!(found.map(|n| n.status), Some(MonitorStatus::Warning));
        assert!(snapshot.get("redis", "redis-02:6379").is_none());
    }

    #[test]
    fn empty_snapshot_is_good() {
        let snapshot = RegistrySnapshot::builder().build();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.worst_status(), MonitorStatus::Good);
        assert!(snapshot.version.is_compatible());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let snapshot = RegistrySnapshot::builder()
            .timestamp_ms(1703160000000)
            .node(node("HAProxy", "lb-01", MonitorStatus::Maintenance))
            .build();

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: RegistrySnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot, parsed);
    }
}
