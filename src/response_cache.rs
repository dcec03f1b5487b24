// Cache of raw backend response bodies, keyed by request URL.
// Entries expire after their TTL and the cache evicts by policy when it outgrows its limits.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{CacheConfig, EvictionPolicy};

#[derive(Debug, Default)]
struct CacheStats {
    size_bytes: AtomicUsize,
    hit_count: AtomicUsize,
    miss_count: AtomicUsize,
    eviction_count: AtomicUsize,
    expired_count: AtomicUsize,
    rejected_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStatsReport {
    pub size_bytes: usize,
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
    pub rejected_count: usize,
}

#[derive(Debug)]
struct CacheEntry {
    body: Bytes,
    created_at: Instant,
    ttl: Duration,
    access_count: usize,
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

pub fn calculate_item_size(key: &str, body: &[u8]) -> usize {
    key.len() + body.len() + std::mem::size_of::<CacheEntry>()
}

#[derive(Debug)]
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    config: RwLock<CacheConfig>,
    stats: CacheStats,
    // Held across evict-then-insert so concurrent stores cannot overshoot the limits
    store_lock: Mutex<()>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config: RwLock::new(config),
            stats: CacheStats::default(),
            store_lock: Mutex::new(()),
        }
    }

    fn max_size_bytes(&self) -> usize {
        self.config.read().max_size_mb * 1024 * 1024
    }

    /// Stores a body. Returns false when the body alone exceeds the cache size.
    pub fn store(&self, key: &str, body: Bytes, ttl: Option<Duration>) -> bool {
        let (default_ttl, max_entries) = {
            let config = self.config.read();
            (
                Duration::from_secs(config.default_ttl_seconds),
                config.max_entries,
            )
        };
        let item_size = calculate_item_size(key, &body);
        let max_size_bytes = self.max_size_bytes();
        if item_size > max_size_bytes || max_entries == 0 {
            debug!("Rejecting {} ({} bytes) from response cache", key, item_size);
            self.stats.rejected_count.fetch_add(1, Ordering::SeqCst);
            return false;
        }

        let _guard = self.store_lock.lock();
        let replacing = self.entries.contains_key(key);
        while !self.entries.is_empty()
            && ((!replacing && self.entries.len() >= max_entries)
                || self.stats.size_bytes.load(Ordering::SeqCst) + item_size > max_size_bytes)
        {
            if !self.evict_one() {
                break;
            }
        }

        let now = Instant::now();
        let replaced = self.entries.insert(
            key.to_string(),
            CacheEntry {
                body,
                created_at: now,
                ttl: ttl.unwrap_or(default_ttl),
                access_count: 0,
                last_accessed: now,
            },
        );
        self.stats.size_bytes.fetch_add(item_size, Ordering::SeqCst);
        if let Some(old) = replaced {
            self.stats
                .size_bytes
                .fetch_sub(calculate_item_size(key, &old.body), Ordering::SeqCst);
        }
        debug!("Cached {} ({} bytes)", key, item_size);
        true
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.access_count += 1;
                entry.last_accessed = Instant::now();
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                return Some(entry.body.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove_entry(key, true);
        }
        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
        None
    }

    pub fn remove(&self, key: &str) -> bool {
        self.remove_entry(key, false)
    }

    /// Drops every entry whose key starts with `prefix`, or everything when `prefix` is None.
    pub fn invalidate(&self, prefix: Option<&str>) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| prefix.map_or(true, |p| entry.key().starts_with(p)))
            .map(|entry| entry.key().clone())
            .collect();

        keys.iter()
            .filter(|key| self.remove_entry(key, false))
            .count()
    }

    pub fn set_eviction_policy(&self, policy: EvictionPolicy) {
        self.config.write().eviction_policy = policy;
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            size_bytes: self.stats.size_bytes.load(Ordering::SeqCst),
            items_count: self.entries.len(),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            eviction_count: self.stats.eviction_count.load(Ordering::SeqCst),
            expired_count: self.stats.expired_count.load(Ordering::SeqCst),
            rejected_count: self.stats.rejected_count.load(Ordering::SeqCst),
        }
    }

    fn evict_one(&self) -> bool {
        let policy = self.config.read().eviction_policy;
        let victim = match policy {
            EvictionPolicy::LeastRecentlyUsed => self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_accessed)
                .map(|entry| entry.key().clone()),
            EvictionPolicy::LeastFrequentlyUsed => self
                .entries
                .iter()
                .min_by_key(|entry| entry.access_count)
                .map(|entry| entry.key().clone()),
            EvictionPolicy::OldestFirst => self
                .entries
                .iter()
                .min_by_key(|entry| entry.created_at)
                .map(|entry| entry.key().clone()),
        };

        match victim {
            Some(key) => {
                debug!("Evicting {} from response cache", key);
                self.stats.eviction_count.fetch_add(1, Ordering::SeqCst);
                self.remove_entry(&key, false)
            }
            None => false,
        }
    }

    fn remove_entry(&self, key: &str, expired: bool) -> bool {
        match self.entries.remove(key) {
            Some((key, entry)) => {
                self.stats
                    .size_bytes
                    .fetch_sub(calculate_item_size(&key, &entry.body), Ordering::SeqCst);
                if expired {
                    self.stats.expired_count.fetch_add(1, Ordering::SeqCst);
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn body(len: usize) -> Bytes {
        Bytes::from(vec![b'x'; len])
    }

    #[test]
    fn test_store_and_get() {
        let cache = ResponseCache::new(CacheConfig::default());
        assert!(cache.store("http://api/hotels/", Bytes::from_static(b"{}"), None));
        assert_eq!(
            cache.get("http://api/hotels/"),
            Some(Bytes::from_static(b"{}"))
        );
        assert_eq!(cache.get("http://api/payes/"), None);

        let stats = cache.stats();
        assert_eq!(stats.items_count, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[test]
    fn test_replacing_entry_keeps_size_consistent() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.store("k", body(100), None);
        cache.store("k", body(10), None);
        let stats = cache.stats();
        assert_eq!(stats.items_count, 1);
        assert_eq!(stats.size_bytes, calculate_item_size("k", &body(10)));
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.store("short", body(4), Some(Duration::from_millis(20)));
        cache.store("long", body(4), None);

        thread::sleep(Duration::from_millis(50));

        assert!(cache.get("short").is_none());
        assert!(cache.get("long").is_some());
        let stats = cache.stats();
        assert_eq!(stats.expired_count, 1);
        assert_eq!(stats.items_count, 1);
    }

    #[test]
    fn test_lru_eviction_on_entry_limit() {
        let config = CacheConfig {
            max_entries: 2,
            ..Default::default()
        };
        let cache = ResponseCache::new(config);
        cache.store("a", body(4), None);
        thread::sleep(Duration::from_millis(2));
        cache.store("b", body(4), None);
        thread::sleep(Duration::from_millis(2));
        assert!(cache.get("a").is_some());

        cache.store("c", body(4), None);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[test]
    fn test_lfu_eviction() {
        let config = CacheConfig {
            max_entries: 2,
            eviction_policy: EvictionPolicy::LeastRecentlyUsed,
            ..Default::default()
        };
        let cache = ResponseCache::new(config);
        cache.set_eviction_policy(EvictionPolicy::LeastFrequentlyUsed);
        cache.store("a", body(4), None);
        cache.store("b", body(4), None);
        cache.get("b");
        cache.get("b");
        cache.get("a");

        cache.store("c", body(4), None);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let config = CacheConfig {
            max_size_mb: 1,
            ..Default::default()
        };
        let cache = ResponseCache::new(config);
        assert!(!cache.store("big", body(2 * 1024 * 1024), None));
        assert_eq!(cache.stats().rejected_count, 1);
        assert_eq!(cache.stats().items_count, 0);
    }

    #[test]
    fn test_remove_single_key() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.store("http://a/payes/", body(8), None);
        cache.store("http://a/payes/extra", body(8), None);

        assert!(cache.remove("http://a/payes/"));
        assert!(!cache.remove("http://a/payes/"));
        assert!(cache.get("http://a/payes/extra").is_some());
        assert_eq!(
            cache.stats().size_bytes,
            calculate_item_size("http://a/payes/extra", &body(8))
        );
    }

    #[test]
    fn test_invalidate_by_prefix() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.store("http://a/hotels/", body(1), None);
        cache.store("http://a/payes/", body(1), None);
        cache.store("http://b/hotels/", body(1), None);

        assert_eq!(cache.invalidate(Some("http://a/")), 2);
        assert!(cache.get("http://b/hotels/").is_some());
        assert_eq!(cache.invalidate(None), 1);
        assert_eq!(cache.stats().size_bytes, 0);
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(ResponseCache::new(CacheConfig {
            max_entries: 16,
            ..Default::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for j in 0..200 {
                        let key = format!("http://api/{}", (i * 7 + j) % 32);
                        if j % 4 == 0 {
                            cache.store(&key, body(16), None);
                        } else {
                            let _ = cache.get(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.items_count <= 16);
        assert!(stats.eviction_count > 0);
        assert_eq!(stats.hit_count + stats.miss_count, 8 * 150);
    }
}
