//! Mapping cache keyed by a configuration fingerprint
//!
//! A cached mapping is only served while the fingerprint of everything it
//! was derived from (model metadata, index configuration, analyzer settings,
//! related models) still matches. Any configuration change yields a new
//! fingerprint, so a stale mapping cannot be returned even when nobody calls
//! [`MappingCache::invalidate`].

use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: String,
    mapping: Arc<serde_json::Value>,
}

/// Single-slot cache of a built mapping
#[derive(Debug, Default)]
pub struct MappingCache {
    entry: RwLock<Option<CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Rebuilds caused by a fingerprint change
    pub stale: u64,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached mapping for `fingerprint`, building it on a miss
    pub fn get_or_build<F>(&self, fingerprint: &str, build: F) -> Arc<serde_json::Value>
    where
        F: FnOnce() -> serde_json::Value,
    {
        {
            let entry = self.entry.read();
            match entry.as_ref() {
                Some(cached) if cached.fingerprint == fingerprint => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return cached.mapping.clone();
                }
                Some(_) => {
                    self.stale.fetch_add(1, Ordering::Relaxed);
                }
                None => {}
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let mapping = Arc::new(build());
        *self.entry.write() = Some(CacheEntry {
            fingerprint: fingerprint.to_string(),
            mapping: mapping.clone(),
        });
        tracing::debug!(fingerprint = %&fingerprint[..12.min(fingerprint.len())], "Mapping rebuilt");
        mapping
    }

    /// Drop the cached mapping
    pub fn invalidate(&self) {
        *self.entry.write() = None;
    }

    pub fn is_cached(&self, fingerprint: &str) -> bool {
        self.entry
            .read()
            .as_ref()
            .map(|e| e.fingerprint == fingerprint)
            .unwrap_or(false)
    }

    pub fn stats(&self) -> MappingCacheStats {
        MappingCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}

/// SHA-256 over the JSON form of `parts`
pub fn fingerprint<T: Serialize + ?Sized>(parts: &T) -> String {
    let bytes = serde_json::to_vec(parts).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_after_build() {
        let cache = MappingCache::new();
        let fp = fingerprint(&json!({"fields": ["foo"]}));

        let first = cache.get_or_build(&fp, || json!({"a": 1}));
        let second = cache.get_or_build(&fp, || json!({"a": 2}));

        assert_eq!(*first, json!({"a": 1}));
        assert_eq!(*second, json!({"a": 1}));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_changed_fingerprint_rebuilds() {
        let cache = MappingCache::new();
        let before = fingerprint(&json!({"fields": ["foo"]}));
        let after = fingerprint(&json!({"fields": ["foo", "bar"]}));
        assert_ne!(before, after);

        cache.get_or_build(&before, || json!({"v": 1}));
        let rebuilt = cache.get_or_build(&after, || json!({"v": 2}));

        assert_eq!(*rebuilt, json!({"v": 2}));
        assert_eq!(cache.stats().stale, 1);
        assert!(!cache.is_cached(&before));
    }

    #[test]
    fn test_invalidate_forces_rebuild() {
        let cache = MappingCache::new();
        let fp = fingerprint("same");

        cache.get_or_build(&fp, || json!(1));
        cache.invalidate();
        let rebuilt = cache.get_or_build(&fp, || json!(2));

        assert_eq!(*rebuilt, json!(2));
        assert_eq!(cache.stats().misses, 2);
    }
}
