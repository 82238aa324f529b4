//! Translated-expression cache shared across compilations.
//!
//! Structurally similar queries translate the same lambda bodies against the
//! same source bindings over and over. The cache maps such a binding to the
//! relational expression it produced so later compilations can skip the
//! translation. It is safe to share between threads: lookups take a read
//! lock and inserts take a write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::sql::SqlExpr;

/// A thread-safe cache of translated scalar expressions.
///
/// A poisoned lock is treated as a cache miss; the cache is an optimization
/// and never fails a compilation.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: RwLock<HashMap<String, SqlExpr>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TranslationCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a translation.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<SqlExpr> {
        let found = self.entries.read().ok().and_then(|entries| entries.get(key).cloned());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Records a translation.
    pub fn insert(&self, key: impl Into<String>, expr: SqlExpr) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), expr);
        }
    }

    /// Number of successful lookups.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of failed lookups.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of cached translations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn counts_hits_and_misses() {
        let cache = TranslationCache::new();
        assert!(cache.get("t0|x.id").is_none());
        cache.insert("t0|x.id", SqlExpr::column("t0", "id"));
        assert_eq!(cache.get("t0|x.id"), Some(SqlExpr::column("t0", "id")));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn shared_between_threads() {
        let cache = Arc::new(TranslationCache::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for j in 0..50 {
                        let key = format!("k{}", (i * 50 + j) % 20);
                        if cache.get(&key).is_none() {
                            cache.insert(key, SqlExpr::bare("c"));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(cache.len(), 20);
        assert_eq!(cache.hits() + cache.misses(), 200);
    }
}
