//! # TTL Cache
//!
//! A string-keyed store whose entries expire a fixed time after they were
//! written.
//!
//! ## Eviction
//! ```text
//! put("a", 1)            get("a") within ttl       get("a") after ttl
//!     │                       │                          │
//!     ▼                       ▼                          ▼
//! { a: (1, t0) }          Some(&1)                  entry removed, None
//! ```
//!
//! Eviction is lazy: an expired entry stays in memory until a `get` (or an
//! explicit [`Cache::purge_expired`]) looks at it. There is no background
//! thread.
//!
//! ## Miss Policy
//! A miss (absent or expired key) is always reported as `None`. Callers that
//! want a fallback use [`Cache::get_or`].
//!
//! ## Sharing
//! All mutating methods take `&mut self`. Callers sharing one cache across
//! tasks wrap it in their own lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    created_at: Instant,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// Expiring key-value store.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use strata_core::Cache;
///
/// let mut cache = Cache::new(Some(Duration::from_secs(60)));
/// cache.put("token", 42);
///
/// assert_eq!(cache.get("token"), Some(&42));
/// assert_eq!(cache.get("missing"), None);
/// ```
#[derive(Debug, Clone)]
pub struct Cache<T> {
    ttl: Option<Duration>,
    entries: HashMap<String, CacheEntry<T>>,
}

impl<T> Cache<T> {
    /// Creates an empty cache. `None` means entries never expire.
    pub fn new(ttl: Option<Duration>) -> Self {
        Cache {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// The cache-wide time to live.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Stores `value`, replacing any previous entry and resetting its age.
    pub fn put(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                created_at: Instant::now(),
            },
        );
    }

    /// Returns the live value for `key`, evicting it first if it expired.
    pub fn get(&mut self, key: &str) -> Option<&T> {
        let expired = self.entries.get(key)?.is_expired(self.ttl);
        if expired {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Returns the live value for `key`, or `default` on a miss.
    pub fn get_or(&mut self, key: &str, default: T) -> T
    where
        T: Clone,
    {
        self.get(key).cloned().unwrap_or(default)
    }

    /// True if `key` holds a live value. Evicts it if it expired.
    pub fn contains(&mut self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key` and returns its value if it was still live.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let entry = self.entries.remove(key)?;
        if entry.is_expired(self.ttl) {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
        before - self.entries.len()
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Cache::new(None)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const SHORT_TTL: Duration = Duration::from_millis(20);

    #[test]
    fn test_put_then_get_returns_value() {
        let mut cache = Cache::new(Some(Duration::from_secs(60)));
        cache.put("a", 1);

        assert_eq!(cache.get("a"), Some(&1));
    }

    #[test]
    fn test_expired_entry_is_evicted_on_get() {
        let mut cache = Cache::new(Some(SHORT_TTL));
        cache.put("a", 1);

        sleep(SHORT_TTL * 3);

        // Still physically present until something reads it
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_put_resets_timestamp() {
        let mut cache = Cache::new(Some(Duration::from_millis(200)));
        cache.put("a", 1);
        sleep(Duration::from_millis(120));
        cache.put("a", 2);
        sleep(Duration::from_millis(120));

        assert_eq!(cache.get("a"), Some(&2));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let mut cache: Cache<&str> = Cache::default();
        cache.put("a", "forever");
        sleep(SHORT_TTL);

        assert_eq!(cache.get("a"), Some(&"forever"));
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_get_or_falls_back_on_miss() {
        let mut cache = Cache::new(Some(SHORT_TTL));
        assert_eq!(cache.get_or("missing", 7), 7);

        cache.put("a", 1);
        sleep(SHORT_TTL * 3);
        assert_eq!(cache.get_or("a", 9), 9);
    }

    #[test]
    fn test_purge_and_remove() {
        let mut cache = Cache::new(Some(SHORT_TTL));
        cache.put("old", 1);
        sleep(SHORT_TTL * 3);
        cache.put("new", 2);

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.contains("new"));
        assert_eq!(cache.remove("new"), Some(2));
        assert!(cache.is_empty());
    }
}
