//! # opwatch-types
//!
//! Shared vocabulary for the opwatch polling core: health states and the
//! rules for combining them, issue and node-role records reported by
//! collaborators, and read-only views of caches and nodes.
//!
//! ## Features
//!
//! - `std` (default): Standard library support (timestamps)
//! - `serde`: Serialization of every public record via serde
//!
//! ## Example
//!
//! ```rust
//! use opwatch_types::{reason_summary, worst, MonitorStatus, StatusContribution};
//!
//! let parts = [
//!     StatusContribution::good(),
//!     StatusContribution::with_reason(MonitorStatus::Warning, "replication lag"),
//!     StatusContribution::with_reason(MonitorStatus::Critical, "disk full"),
//! ];
//!
//! assert_eq!(worst(parts.iter().map(|p| p.status)), MonitorStatus::Critical);
//! assert_eq!(
//!     reason_summary(&parts).as_deref(),
//!     Some("replication lag, disk full")
//! );
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod duration;
mod info;
mod issue;
mod snapshot;
mod status;
mod version;

pub use duration::*;
pub use info::*;
pub use issue::*;
pub use snapshot::*;
pub use status::*;
pub use version::*;

/// Current schema major version of exported snapshots.
pub const SCHEMA_VERSION: u32 = 1;

/// Current schema minor version of exported snapshots.
pub const SCHEMA_MINOR_VERSION: u32 = 0;
