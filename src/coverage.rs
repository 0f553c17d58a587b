//! Coverage ledger: the map of section keys to covered flags.
//!
//! The key set is fixed at construction and never grows or shrinks; only
//! the flags flip. Unknown keys are discarded silently: the oracle may
//! hallucinate section names and the ledger is the wrong place to surface
//! that.

use crate::config::TopicArea;
use std::collections::BTreeMap;

/// Ordered map of topic key → covered flag. Declaration order is
/// preserved so "missing sections" messages are stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageLedger {
    entries: Vec<(String, bool)>,
}

impl CoverageLedger {
    /// Create a ledger with every key uncovered.
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: keys.into_iter().map(|k| (k, false)).collect(),
        }
    }

    /// Create a ledger from the configured topic set.
    pub fn from_topics(topics: &[TopicArea]) -> Self {
        Self::new(topics.iter().map(|t| t.key.clone()))
    }

    /// Set a key's covered flag. Unknown keys are ignored; returns whether
    /// anything changed.
    pub fn mark(&mut self, key: &str, value: bool) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) if *v != value => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    /// True iff every section is covered.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|(_, v)| *v)
    }

    /// Uncovered keys, in declaration order.
    pub fn missing(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, v)| !*v)
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// Number of covered sections.
    pub fn covered_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| *v).count()
    }

    /// Total number of sections.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Covered flag for a key, if known.
    pub fn get(&self, key: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    /// Whether a key belongs to the fixed set.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Flip every flag to covered. Used by the summary override path so an
    /// override never leaves the ledger inconsistent with the summary flag.
    pub fn force_complete(&mut self) {
        for (_, v) in &mut self.entries {
            *v = true;
        }
    }

    /// Iterate `(key, covered)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Snapshot view for persistence.
    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.entries.iter().cloned().collect()
    }

    /// Apply a persisted map, marking only known keys.
    pub fn apply_map(&mut self, map: &BTreeMap<String, bool>) {
        for (key, value) in map {
            self.mark(key, *value);
        }
    }
}
