//! Tag Index Module
//!
//! Secondary index from tag to the keys carrying it.

use std::collections::{HashMap, HashSet};

// == Tag Index ==
/// Maps each tag to the set of keys carrying it. Empty buckets are removed.
#[derive(Debug, Default)]
pub struct TagIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Registers `key` under every tag in `tags`.
    pub fn insert<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.buckets
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    // == Remove ==
    /// Drops `key` from the given tag buckets, deleting buckets left empty.
    pub fn remove<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            if let Some(keys) = self.buckets.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.buckets.remove(tag);
                }
            }
        }
    }

    // == Keys ==
    /// Returns the keys currently registered under `tag`, sorted.
    pub fn keys(&self, tag: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .buckets
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn contains(&self, tag: &str, key: &str) -> bool {
        self.buckets.get(tag).is_some_and(|keys| keys.contains(key))
    }

    /// Number of non-empty tag buckets.
    pub fn tag_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
