//! Asset Cache - names of fully loaded fragments

use std::collections::HashSet;
use std::sync::RwLock;

use tracing::debug;

/// Set of fragment names whose load completed
///
/// Presence means the fragment never needs fetching again.
#[derive(Debug, Default)]
pub struct AssetCache {
    loaded: RwLock<HashSet<String>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, name: &str) -> bool {
        self.loaded.read().map(|set| set.contains(name)).unwrap_or(false)
    }

    /// Record `name` as loaded; idempotent
    pub fn mark_loaded(&self, name: &str) {
        if let Ok(mut set) = self.loaded.write()
            && set.insert(name.to_string())
        {
            debug!(%name, "AssetCache::mark_loaded: added");
        }
    }

    pub fn len(&self) -> usize {
        self.loaded.read().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loaded names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loaded
            .read()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_loaded_is_idempotent() {
        let cache = AssetCache::new();
        assert!(cache.is_empty());
        assert!(!cache.has("panel"));

        cache.mark_loaded("panel");
        cache.mark_loaded("panel");
        cache.mark_loaded("audit");

        assert!(cache.has("panel"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.names(), vec!["audit", "panel"]);
    }
}
