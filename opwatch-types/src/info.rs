//! Read-side views of caches and nodes.
//!
//! These are plain data: the core fills them in from live state so that
//! dashboards and diagnostic pages can render without touching locks.

use alloc::string::String;
use alloc::vec::Vec;

use crate::{Microseconds, MonitorStatus};

/// State of a single cache at the time it was read.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheInfo {
    pub name: String,

    /// Unix timestamp (ms) of the most recent poll start.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_poll_ms: Option<u64>,

    /// Unix timestamp (ms) of the most recent successful poll.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_success_ms: Option<u64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_poll_duration: Option<Microseconds>,

    /// Error from the most recent poll, cleared by the next success.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub error: Option<String>,

    pub has_data: bool,
    pub polls_total: u64,
    pub polls_failed: u64,

    /// Whether the cache counts towards its owner's status.
    pub affects_status: bool,
}

impl CacheInfo {
    /// True when the held data predates a failed poll.
    pub fn is_stale(&self) -> bool {
        self.has_data && self.error.is_some()
    }

    pub fn never_polled(&self) -> bool {
        self.polls_total == 0
    }
}

/// State of a node and its caches at the time it was read.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeInfo {
    pub key: String,
    pub node_type: String,
    pub status: MonitorStatus,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub reason: Option<String>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_poll_ms: Option<u64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_poll_duration: Option<Microseconds>,

    pub polls_total: u64,
    pub fails_in_a_row: u32,

    #[cfg_attr(feature = "serde", serde(default))]
    pub caches: Vec<CacheInfo>,

    /// Keys of child nodes, for hierarchical nodes.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<String>,
}

impl NodeInfo {
    /// Caches whose most recent poll failed.
    pub fn failing_caches(&self) -> impl Iterator<Item = &CacheInfo> {
        self.caches.iter().filter(|c| c.error.is_some())
    }

    pub fn cache(&self, name: &str) -> Option<&CacheInfo> {
        self.caches.iter().find(|c| c.name == name)
    }
}
