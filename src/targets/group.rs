//! Named groups of targets, reported as one node.

use std::sync::Arc;

use opwatch_core::{CachePoller, NodePollState, NodeSettings, PollNode};

/// An aggregator with no data of its own; its status is the worst of its
/// members.
pub struct Group {
    name: String,
    members: Vec<Arc<dyn PollNode>>,
    state: NodePollState,
}

impl Group {
    pub const NODE_TYPE: &'static str = "Group";

    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn PollNode>>) -> Self {
        Self {
            name: name.into(),
            members,
            state: NodePollState::new(NodeSettings::default()),
        }
    }
}

impl PollNode for Group {
    fn node_type(&self) -> &str {
        Self::NODE_TYPE
    }

    fn unique_key(&self) -> &str {
        &self.name
    }

    fn data_pollers(&self) -> Vec<&dyn CachePoller> {
        Vec::new()
    }

    fn poll_state(&self) -> &NodePollState {
        &self.state
    }

    fn children(&self) -> Vec<Arc<dyn PollNode>> {
        self.members.clone()
    }
}
