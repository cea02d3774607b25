//! Process-wide collection of registered nodes.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::node::PollNode;

/// Append-only set of nodes, grouped by type.
///
/// Nodes are added once and never removed. Lookups by type are
/// case-insensitive; keys match exactly.
#[derive(Default)]
pub struct Registry {
    nodes: RwLock<BTreeMap<String, Vec<Arc<dyn PollNode>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node unless one with the same type and key is already present.
    ///
    /// Returns whether the node was newly added.
    pub fn register(&self, node: Arc<dyn PollNode>) -> bool {
        let type_key = node.node_type().to_lowercase();

        // Fast path: already registered
        if self.contains_key(&type_key, node.unique_key()) {
            return false;
        }

        // Check again under the write lock
        let mut nodes = self.nodes.write();
        let of_type = nodes.entry(type_key).or_default();
        if of_type.iter().any(|n| n.unique_key() == node.unique_key()) {
            return false;
        }
        debug!(
            node_type = %node.node_type(),
            node_key = %node.unique_key(),
            "node registered"
        );
        of_type.push(node);
        true
    }

    fn contains_key(&self, type_key: &str, key: &str) -> bool {
        self.nodes
            .read()
            .get(type_key)
            .is_some_and(|of_type| of_type.iter().any(|n| n.unique_key() == key))
    }

    /// Every node of one type, in registration order.
    pub fn all_of_type(&self, node_type: &str) -> Vec<Arc<dyn PollNode>> {
        self.nodes
            .read()
            .get(&node_type.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn find(&self, node_type: &str, key: &str) -> Option<Arc<dyn PollNode>> {
        self.nodes
            .read()
            .get(&node_type.to_lowercase())?
            .iter()
            .find(|n| n.unique_key() == key)
            .cloned()
    }

    /// Copy of every registered node, grouped by type.
    ///
    /// The lock is released before returning, so callers can iterate
    /// while other nodes keep registering.
    pub fn all(&self) -> Vec<Arc<dyn PollNode>> {
        self.nodes.read().values().flatten().cloned().collect()
    }

    /// Registered type tags, lowercased.
    pub fn node_types(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.node_types())
            .field("len", &self.len())
            .finish()
    }
}
