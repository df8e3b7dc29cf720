//! In-process read-through cache with TTL and pattern invalidation
//!
//! Values are stored as JSON so one cache can hold every response type. The
//! cache is size-bounded and evicts in insertion order (not LRU). Expired
//! entries are dropped lazily when read, or in bulk by [Cache::purge_expired].
//!
//! Nothing here ever fails a caller: a value that cannot be (de)serialized is
//! treated as a miss and the producer runs instead.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::clock::{SharedClock, SystemClock};
use crate::config::Config;

/// Default TTLs by key prefix. The longest matching prefix wins.
pub const PREFIX_TTLS: &[(&str, u64)] = &[
    ("homepage:", 60),
    ("video:list:", 120),
    ("video:detail:", 300),
    ("video:related:", 600),
    ("search:", 120),
    ("category:", 600),
    ("model:", 600),
    ("country:", 3600),
    ("ads:", 300),
    ("settings:", 3600),
];

/// Key families dropped after each kind of write
pub mod families {
    pub const VIDEO_WRITE: &[&str] = &["video:", "homepage:", "search:videos:", "category:", "model:"];
    pub const MODEL_WRITE: &[&str] = &["model:", "video:"];
    pub const CATEGORY_WRITE: &[&str] = &["category:", "homepage:", "video:"];
    pub const COUNTRY_WRITE: &[&str] = &["country:"];
    pub const AD_WRITE: &[&str] = &["ads:"];
    pub const SETTINGS_WRITE: &[&str] = &["settings:", "homepage:"];
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub prefix_ttls: Vec<(String, Duration)>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Duration::from_secs(300),
            prefix_ttls: PREFIX_TTLS
                .iter()
                .map(|(prefix, secs)| (prefix.to_string(), Duration::from_secs(*secs)))
                .collect(),
        }
    }
}

impl CacheConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_entries: config.cache_max_entries,
            default_ttl: config.cache_default_ttl,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

struct CacheEntry {
    value: JsonValue,
    stored_at: DateTime<Utc>,
    ttl: Duration,
    seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (now - self.stored_at).to_std() {
            Ok(age) => age > self.ttl,
            // stored in the future (clock moved back)
            Err(_) => false,
        }
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// insertion sequence -> key; the first element is the oldest insertion
    order: BTreeMap<u64, String>,
    next_seq: u64,
    stats: CacheStats,
}

impl Inner {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }
}

pub struct Cache {
    inner: Mutex<Inner>,
    config: CacheConfig,
    clock: SharedClock,
    /// One async gate per key currently being produced by `get_or_set`
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

pub type SharedCache = Arc<Cache>;

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            clock,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// TTL applied to `key` when the caller does not give one
    pub fn ttl_for(&self, key: &str) -> Duration {
        self.config
            .prefix_ttls
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.config.default_ttl)
    }

    /// Fresh value for `key`, or `None`. An expired entry is removed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lookup(key, true)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has an unexpected shape, dropping it");
                self.delete(key);
                None
            }
        }
    }

    fn lookup(&self, key: &str, count: bool) -> Option<JsonValue> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let state = inner.entries.get(key).map(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        let found = match state {
            Some(Some(value)) => Some(value),
            Some(None) => {
                inner.remove(key);
                None
            }
            None => None,
        };

        if count {
            if found.is_some() {
                inner.stats.hits += 1;
            } else {
                inner.stats.misses += 1;
            }
        }
        found
    }

    /// Insert or overwrite `key`. An overwrite moves the key to the newest
    /// insertion position and never evicts.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "Value is not cacheable, skipping");
                return;
            }
        };
        let ttl = ttl.unwrap_or_else(|| self.ttl_for(key));
        let now = self.clock.now();

        let mut inner = self.inner.lock();
        if !inner.remove(key) {
            while inner.entries.len() >= self.config.max_entries.max(1) {
                let Some((_, oldest)) = inner.order.pop_first() else {
                    break;
                };
                inner.entries.remove(&oldest);
                inner.stats.evictions += 1;
                debug!(key = %oldest, "Evicted oldest cache entry");
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.to_string());
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: now,
                ttl,
                seq,
            },
        );
    }

    /// Cached value for `key`, or the producer's value (which is then cached).
    ///
    /// Concurrent callers for the same cold key are coalesced: one runs the
    /// producer, the rest wait and then read what it stored. A producer error is
    /// returned to its caller and nothing is cached, so a waiting caller runs
    /// its own producer next.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(v) = self.get(key) {
            return Ok(v);
        }

        let flight = Flight::join(self, key);
        let _permit = Arc::clone(&flight.gate).lock_owned().await;

        if let Some(value) = self.lookup(key, false) {
            if let Ok(v) = serde_json::from_value(value) {
                return Ok(v);
            }
        }

        let value = producer().await?;
        self.set(key, &value, ttl);
        Ok(value)
    }

    /// Remove one key
    pub fn delete(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Remove every key matching `pattern`, a regex fragment searched anywhere
    /// in the key. A pattern that is not a valid regex matches as a literal
    /// substring. Returns the number of removed entries.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let matcher: Box<dyn Fn(&str) -> bool> = match Regex::new(pattern) {
            Ok(re) => Box::new(move |key| re.is_match(key)),
            Err(_) => {
                let literal = pattern.to_string();
                Box::new(move |key| key.contains(literal.as_str()))
            }
        };

        let mut inner = self.inner.lock();
        let doomed: Vec<String> = inner
            .entries
            .keys()
            .filter(|key| matcher(key))
            .cloned()
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        inner.stats.invalidations += 1;

        if !doomed.is_empty() {
            debug!(pattern = %pattern, removed = doomed.len(), "Cache invalidated");
        }
        doomed.len()
    }

    /// Invalidate several patterns, returning the total removed
    pub fn invalidate_all(&self, patterns: &[&str]) -> usize {
        patterns.iter().map(|p| self.invalidate(p)).sum()
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Keys in insertion order, oldest first
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().order.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            max_entries: self.config.max_entries,
            ..inner.stats.clone()
        }
    }
}

/// Membership in the per-key gate of a `get_or_set` call. The gate is dropped
/// from the map by the last member, including when the call is cancelled.
struct Flight<'a> {
    cache: &'a Cache,
    key: &'a str,
    gate: Arc<AsyncMutex<()>>,
}

impl<'a> Flight<'a> {
    fn join(cache: &'a Cache, key: &'a str) -> Self {
        let gate = cache
            .in_flight
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        Self { cache, key, gate }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.cache.in_flight.lock();
        // map + this member
        if Arc::strong_count(&self.gate) <= 2 {
            in_flight.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with(max_entries: usize) -> (Cache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Cache::with_clock(
            CacheConfig {
                max_entries,
                ..Default::default()
            },
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache_with(10);
        cache.set("k", &"v", Some(Duration::from_millis(100)));

        clock.advance(Duration::from_millis(100));
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));

        clock.advance(Duration::from_millis(50));
        assert_eq!(cache.get::<String>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_prefix_keeps_other_families() {
        let (cache, _) = cache_with(10);
        cache.set("video:list:page=1", &1, None);
        cache.set("video:detail:abc", &2, None);
        cache.set("model:1", &3, None);
        cache.set("homepage:data", &4, None);

        assert_eq!(cache.invalidate("video:"), 2);
        assert_eq!(cache.get::<i32>("model:1"), Some(3));
        assert_eq!(cache.get::<i32>("homepage:data"), Some(4));
        assert_eq!(cache.get::<i32>("video:detail:abc"), None);
    }

    #[test]
    fn test_invalid_regex_matches_literally() {
        let (cache, _) = cache_with(10);
        cache.set("search:videos:(x", &1, None);
        cache.set("search:videos:y", &2, None);

        assert_eq!(cache.invalidate(":(x"), 1);
        assert_eq!(cache.keys(), vec!["search:videos:y".to_string()]);
    }

    #[test]
    fn test_evicts_first_inserted_key() {
        let (cache, _) = cache_with(3);
        for key in ["a", "b", "c", "d"] {
            cache.set(key, &key, None);
        }

        assert_eq!(cache.get::<String>("a"), None);
        for key in ["b", "c", "d"] {
            assert_eq!(cache.get::<String>(key).as_deref(), Some(key));
        }
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_ignores_reads_and_overwrite_moves_to_back() {
        let (cache, _) = cache_with(2);
        cache.set("a", &1, None);
        cache.set("b", &2, None);
        // reading does not refresh insertion order
        assert_eq!(cache.get::<i32>("a"), Some(1));
        cache.set("a", &10, None);
        cache.set("c", &3, None);

        assert_eq!(cache.get::<i32>("b"), None);
        assert_eq!(cache.get::<i32>("a"), Some(10));
        assert_eq!(cache.get::<i32>("c"), Some(3));
    }

    #[test]
    fn test_prefix_ttl_longest_match() {
        let (cache, _) = cache_with(10);
        assert_eq!(cache.ttl_for("video:detail:x"), Duration::from_secs(300));
        assert_eq!(cache.ttl_for("video:related:x"), Duration::from_secs(600));
        assert_eq!(cache.ttl_for("homepage:data"), Duration::from_secs(60));
        assert_eq!(cache.ttl_for("other"), Duration::from_secs(300));
    }

    #[test]
    fn test_shape_mismatch_is_a_miss() {
        let (cache, _) = cache_with(10);
        cache.set("k", &"text", None);
        assert_eq!(cache.get::<i32>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache_with(10);
        cache.set("short", &1, Some(Duration::from_secs(1)));
        cache.set("long", &2, Some(Duration::from_secs(60)));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.keys(), vec!["long".to_string()]);
    }

    #[tokio::test]
    async fn test_get_or_set_runs_producer_once() {
        let (cache, _) = cache_with(10);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: u32 = cache
                .get_or_set("homepage:data", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_error_is_not_cached() {
        let (cache, _) = cache_with(10);
        let first: Result<u32, &str> = cache.get_or_set("k", None, || async { Err("down") }).await;
        assert_eq!(first, Err("down"));

        let second: Result<u32, &str> = cache.get_or_set("k", None, || async { Ok(7) }).await;
        assert_eq!(second, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_cold_key_is_coalesced() {
        let cache = Arc::new(Cache::new(CacheConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_set("video:list:all", None, || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, Infallible>(vec![1, 2, 3])
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().is_empty());
    }
}
