//! Schema versioning for exported snapshots.

use crate::{SCHEMA_MINOR_VERSION, SCHEMA_VERSION};

/// Schema version embedded in every [`RegistrySnapshot`](crate::RegistrySnapshot).
///
/// Consumers reading snapshots from a file or socket check the major
/// version before trusting the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    /// Bumped on breaking layout changes.
    pub major: u32,
    /// Bumped when fields are added.
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, SCHEMA_MINOR_VERSION)
    }

    /// Same major version as this library; minor differences are fine.
    pub fn is_compatible(&self) -> bool {
        self.major == SCHEMA_VERSION
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}
