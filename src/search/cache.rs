//! TTL cache for search results.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::config::CacheConfig;
use super::types::SearchHit;

/// Cache entry with TTL.
#[derive(Clone)]
struct CacheEntry {
    hits: Vec<SearchHit>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(hits: Vec<SearchHit>, ttl: Duration) -> Self {
        Self {
            hits,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe cache for search results, keyed by provider and query.
pub struct SearchCache {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry>,
}

impl SearchCache {
    /// Create a new cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Get cached hits.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<SearchHit>> {
        if !self.config.enabled {
            return None;
        }

        self.entries.get(key).and_then(|entry| {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                None
            } else {
                Some(entry.hits.clone())
            }
        })
    }

    /// Cache hits under `key`.
    pub fn set(&self, key: &str, hits: &[SearchHit]) {
        if !self.config.enabled {
            return;
        }

        self.enforce_max_entries();

        let ttl = Duration::from_secs(self.config.ttl_seconds);
        self.entries
            .insert(key.to_string(), CacheEntry::new(hits.to_vec(), ttl));
    }

    /// Number of cached entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries.
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    /// Make room for one more entry, dropping expired entries first.
    fn enforce_max_entries(&self) {
        let max = self.config.max_entries.max(1);
        if self.entries.len() < max {
            return;
        }

        self.cleanup_expired();

        if self.entries.len() >= max {
            let to_remove = self.entries.len() - max + 1;
            let keys: Vec<String> = self
                .entries
                .iter()
                .take(to_remove)
                .map(|entry| entry.key().clone())
                .collect();
            for key in keys {
                self.entries.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            url: format!("https://{title}.example"),
            content: "body".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn test_cache_hits() {
        let cache = SearchCache::new(CacheConfig::default());
        cache.set("kw:ai", &[hit("a")]);

        let cached = cache.get("kw:ai");
        assert_eq!(cached.unwrap_or_default().len(), 1);
        assert!(cache.get("kw:other").is_none());
    }

    #[test]
    fn test_cache_disabled() {
        let cache = SearchCache::new(CacheConfig::disabled());
        cache.set("kw:ai", &[hit("a")]);
        assert!(cache.get("kw:ai").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_expiry() {
        let cache = SearchCache::new(CacheConfig {
            enabled: true,
            ttl_seconds: 0,
            max_entries: 10,
        });
        cache.set("kw:ai", &[hit("a")]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("kw:ai").is_none());
    }

    #[test]
    fn test_cache_bounded() {
        let cache = SearchCache::new(CacheConfig {
            enabled: true,
            ttl_seconds: 60,
            max_entries: 3,
        });
        for i in 0..10 {
            cache.set(&format!("kw:{i}"), &[hit("a")]);
        }
        assert!(cache.len() <= 3);
        assert!(cache.get("kw:9").is_some());
    }
}
