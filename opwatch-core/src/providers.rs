//! Collaborators that feed cross-node operations.

use async_trait::async_trait;
use opwatch_types::{Issue, NodeRole};

use crate::error::FetchError;

/// Source of current issues, merged into [`PollingService::issues`].
///
/// [`PollingService::issues`]: crate::PollingService::issues
#[async_trait]
pub trait IssuesProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn issues(&self) -> Result<Vec<Issue>, FetchError>;
}

/// Something that can take a node in or out of service for one role.
///
/// Used by the bulk enable/disable operations, which call every provider
/// regardless of what the others report.
#[async_trait]
pub trait NodeRoleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Roles this provider knows for the node. Empty when unknown.
    fn roles(&self, node: &str) -> Vec<NodeRole>;

    /// Put the node back into service. Returns whether that worked.
    async fn enable(&self, node: &str) -> bool;

    /// Take the node out of service. Returns whether that worked.
    async fn disable(&self, node: &str) -> bool;
}
