//! TTL cache for backend responses
//!
//! Provides a thread-safe in-memory key/value store where every entry
//! expires a fixed duration after insertion. Readers share the lock;
//! `set`, `invalidate`, `clear` and `cleanup` take it exclusively.
//! Expired entries are invisible to `get` immediately and are physically
//! removed by `cleanup`, which the owning client runs on a timer.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default time-to-live for cached entries (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A cached value with its absolute expiration instant
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self { value, expires_at: Instant::now() + ttl }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe in-memory cache with per-entry expiration
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a new cache with the specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), ttl }
    }

    /// Create a new cache with the default TTL
    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// Get a cached value if present and not expired
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;

        if entry.is_expired_at(Instant::now()) {
            debug!(key = %key, "Cache entry expired");
            return None;
        }
        Some(entry.value.clone())
    }

    /// Store a value, expiring `ttl` from now
    pub fn set(&self, key: &str, value: V) {
        if let Ok(mut entries) = self.entries.write() {
            debug!(key = %key, ttl_secs = %self.ttl.as_secs(), "Caching value");
            entries.insert(key.to_string(), CacheEntry::new(value, self.ttl));
        }
    }

    /// Remove one entry regardless of its expiration
    pub fn invalidate(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            debug!(entries = entries.len(), "Clearing cache");
            entries.clear();
        }
    }

    /// Remove entries whose expiration has passed; returns how many were dropped
    pub fn cleanup(&self) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Removed expired cache entries");
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the TTL for this cache
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}
