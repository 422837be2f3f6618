//! Token Cache
//!
//! Memoizes end-to-end resolution results per raw token, including
//! "no match" and per-token failures. Entries are value-shared and
//! never mutated in place. A configuration reload clears the whole map
//! and bumps the generation, so a resolution started under an older
//! configuration is discarded instead of written.

use std::collections::HashMap;
use std::sync::Arc;

use strata_core::StringifiedUtil;

use crate::generator::ResolveError;

/// Cached outcome of one token resolution.
#[derive(Debug, Clone)]
pub enum CachedResolution {
    Hit(Arc<Vec<StringifiedUtil>>),
    NoMatch,
    Failed(ResolveError),
}

/// Flat, generation-tagged token cache.
#[derive(Debug, Default)]
pub struct TokenCache {
    generation: u64,
    map: HashMap<String, CachedResolution>,
}

impl TokenCache {
    /// The configuration epoch this cache currently serves.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, key: &str) -> Option<CachedResolution> {
        self.map.get(key).cloned()
    }

    /// Store a result computed under `generation`. Writes tagged with an
    /// older generation are dropped; returns whether the write landed.
    pub fn insert(&mut self, generation: u64, key: String, value: CachedResolution) -> bool {
        if generation != self.generation {
            tracing::debug!(key = %key, "discarding resolution from an old configuration");
            return false;
        }
        self.map.insert(key, value);
        true
    }

    /// Wholesale invalidation on configuration reload.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut cache = TokenCache::default();
        assert!(cache.insert(0, "m-1".to_string(), CachedResolution::NoMatch));
        assert!(matches!(cache.get("m-1"), Some(CachedResolution::NoMatch)));
        assert!(cache.get("p-1").is_none());
    }

    #[test]
    fn test_stale_write_is_dropped() {
        let mut cache = TokenCache::default();
        let generation = cache.generation();
        cache.invalidate();
        assert!(!cache.insert(generation, "m-1".to_string(), CachedResolution::NoMatch));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let mut cache = TokenCache::default();
        cache.insert(0, "m-1".to_string(), CachedResolution::NoMatch);
        cache.insert(0, "p-1".to_string(), CachedResolution::NoMatch);
        assert_eq!(cache.len(), 2);
        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 1);
    }
}
