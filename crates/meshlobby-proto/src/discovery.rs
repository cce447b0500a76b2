//! Advertisement metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// String metadata broadcast alongside a peer's identity.
///
/// Carries an `"iteration"` counter that increments on every local reset, so
/// observers can tell advertisement generations apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryInfo(BTreeMap<String, String>);

impl DiscoveryInfo {
    /// Key holding the reset generation counter.
    pub const ITERATION_KEY: &'static str = "iteration";

    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying only the iteration counter.
    pub fn with_iteration(iteration: u64) -> Self {
        let mut info = Self::new();
        info.set_iteration(iteration);
        info
    }

    /// Reset generation, if present and well-formed.
    pub fn iteration(&self) -> Option<u64> {
        self.get(Self::ITERATION_KEY)?.parse().ok()
    }

    /// Overwrite the reset generation.
    pub fn set_iteration(&mut self, iteration: u64) {
        self.0.insert(Self::ITERATION_KEY.to_owned(), iteration.to_string());
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for DiscoveryInfo {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, String)> for DiscoveryInfo {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
