//! Version-aware selection of fetch strategies.
//!
//! Backends often need a different query (or a different way of reading a
//! record) depending on the server version. A [`VersionedQueries`] table
//! holds the candidates per record kind and picks the most specific one for
//! a given engine version, remembering the answer.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use parking_lot::RwLock;
use thiserror::Error;

/// A backend engine version such as `13.0.5026`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid engine version '{0}'")]
pub struct VersionParseError(String);

impl FromStr for EngineVersion {
    type Err = VersionParseError;

    /// Accepts one to four dot-separated numbers; a fourth part is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .trim()
            .split('.')
            .map(str::parse::<u32>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionParseError(s.to_string()))?;
        if parts.is_empty() || parts.len() > 4 {
            return Err(VersionParseError(s.to_string()));
        }
        let at = |i: usize| parts.get(i).copied().unwrap_or(0);
        Ok(Self::new(at(0), at(1), at(2)))
    }
}

/// Versions a strategy supports: `min` inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub min: EngineVersion,
    pub max: Option<EngineVersion>,
}

impl VersionRange {
    /// Every version.
    pub const ANY: Self = Self {
        min: EngineVersion::new(0, 0, 0),
        max: None,
    };

    pub fn at_least(min: EngineVersion) -> Self {
        Self { min, max: None }
    }

    pub fn between(min: EngineVersion, max: EngineVersion) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn contains(&self, version: EngineVersion) -> bool {
        version >= self.min && self.max.map_or(true, |max| version < max)
    }
}

/// Strategy table keyed by record kind and engine version.
///
/// Build the table once, then share it; lookups are memoized per
/// `(kind, version)`.
///
/// ```rust
/// use opwatch_core::versioned::{EngineVersion, VersionRange, VersionedQueries};
///
/// let queries = VersionedQueries::new()
///     .add("databases", VersionRange::ANY, "select name from sys.databases")
///     .add(
///         "databases",
///         VersionRange::at_least(EngineVersion::new(13, 0, 0)),
///         "select name, is_query_store_on from sys.databases",
///     );
///
/// let v12: EngineVersion = "12.0.6024".parse().unwrap();
/// assert_eq!(queries.resolve(&"databases", v12), Some("select name from sys.databases"));
/// ```
pub struct VersionedQueries<K, V> {
    entries: Vec<(K, VersionRange, V)>,
    resolved: RwLock<HashMap<(K, EngineVersion), Option<V>>>,
}

impl<K, V> VersionedQueries<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Add a candidate for a kind.
    pub fn add(mut self, kind: K, range: VersionRange, value: V) -> Self {
        self.entries.push((kind, range, value));
        self
    }

    /// The candidate with the highest minimum version that still covers
    /// `version`, or `None` when nothing applies.
    pub fn resolve(&self, kind: &K, version: EngineVersion) -> Option<V> {
        let key = (kind.clone(), version);

        // Fast path: already resolved
        if let Some(found) = self.resolved.read().get(&key) {
            return found.clone();
        }

        let best = self
            .entries
            .iter()
            .filter(|(k, range, _)| k == kind && range.contains(version))
            .max_by_key(|(_, range, _)| range.min)
            .map(|(_, _, v)| v.clone());

        self.resolved
            .write()
            .entry(key)
            .or_insert(best)
            .clone()
    }

    /// Whether any candidate covers the version.
    pub fn supports(&self, kind: &K, version: EngineVersion) -> bool {
        self.resolve(kind, version).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for VersionedQueries<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for VersionedQueries<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionedQueries")
            .field("entries", &self.entries.len())
            .field("resolved", &self.resolved.read().len())
            .finish()
    }
}
