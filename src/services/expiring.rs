//! Time-to-live key/value store for ephemeral state.
//!
//! Eviction is moka's job. This module only supplies the expiry policy:
//! an entry lives for `ttl` after it was last set or read, and
//! [`ExpiringStore::touch`] pushes the current deadline out by an arbitrary
//! amount. A read never pulls a touched deadline back in.
//!
//! # Example
//!
//! ```ignore
//! use kvmirror::services::expiring::ExpiringStore;
//! use std::time::Duration;
//!
//! let sessions: ExpiringStore<String, u64> = ExpiringStore::new(Duration::from_secs(600));
//! sessions.set("user:1".into(), 42);
//! let (value, existed) = sessions.get_or_set("user:2".into(), 7);
//! ```

use moka::Expiry;
use moka::ops::compute::Op;
use moka::sync::Cache as MokaCache;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_TIMER_MAX_CAPACITY;

/// Stored value plus a pending deadline extension from `touch`.
#[derive(Clone)]
struct Slot<V> {
    value: V,
    extend: Option<Duration>,
}

impl<V> Slot<V> {
    fn new(value: V) -> Self {
        Self {
            value,
            extend: None,
        }
    }
}

/// Sliding expiry: reset to `ttl` on create and overwrite, to at least `ttl`
/// on read.
struct SlidingExpiry {
    ttl: Duration,
}

impl<K, V> Expiry<K, Slot<V>> for SlidingExpiry {
    fn expire_after_create(&self, _key: &K, _slot: &Slot<V>, _created_at: Instant) -> Option<Duration> {
        Some(self.ttl)
    }

    /// Never shortens a deadline that `touch` pushed past `ttl`.
    fn expire_after_read(
        &self,
        _key: &K,
        _slot: &Slot<V>,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        Some(duration_until_expiry.map_or(self.ttl, |left| left.max(self.ttl)))
    }

    fn expire_after_update(
        &self,
        _key: &K,
        slot: &Slot<V>,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        match slot.extend {
            Some(extra) => Some(duration_until_expiry.unwrap_or_default() + extra),
            None => Some(self.ttl),
        }
    }
}

/// Expiring key/value store.
///
/// `Clone` is cheap (moka caches are reference counted); clones share
/// entries.
#[derive(Clone)]
pub struct ExpiringStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: MokaCache<K, Slot<V>>,
    ttl: Duration,
}

impl<K, V> ExpiringStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a store whose entries expire `ttl` after their last set or read.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_TIMER_MAX_CAPACITY)
    }

    /// Like [`ExpiringStore::new`] with an explicit entry bound.
    pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
        let cache = MokaCache::builder()
            .max_capacity(max_capacity)
            .expire_after(SlidingExpiry { ttl })
            .build();
        Self { cache, ttl }
    }

    /// Default time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Inserts or overwrites `key`, resetting its TTL.
    pub fn set(&self, key: K, value: V) {
        self.cache.insert(key, Slot::new(value));
    }

    /// Returns the value for `key` if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key).map(|slot| slot.value)
    }

    /// Returns the existing value, or stores and returns `value`.
    ///
    /// The flag is true if the key was already present.
    pub fn get_or_set(&self, key: K, value: V) -> (V, bool) {
        let entry = self.cache.entry(key).or_insert(Slot::new(value));
        let existed = !entry.is_fresh();
        (entry.into_value().value, existed)
    }

    /// Removes `key`.
    pub fn delete(&self, key: &K) {
        self.cache.invalidate(key);
    }

    /// Removes `key` and returns what it held.
    pub fn get_and_delete(&self, key: &K) -> Option<V> {
        self.cache.remove(key).map(|slot| slot.value)
    }

    /// Extends the remaining lifetime of `key` by `extra`.
    ///
    /// Returns false if the key was missing or already expired.
    pub fn touch(&self, key: &K, extra: Duration) -> bool {
        let mut found = false;
        self.cache.entry(key.clone()).and_compute_with(|entry| match entry {
            Some(entry) => {
                found = true;
                let mut slot = entry.into_value();
                slot.extend = Some(extra);
                Op::Put(slot)
            },
            None => Op::Nop,
        });
        found
    }

    /// Calls `f` for every live entry, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn range<E>(&self, mut f: impl FnMut(&K, &V) -> Result<(), E>) -> Result<(), E> {
        for (key, slot) in &self.cache {
            f(&key, &slot.value)?;
        }
        Ok(())
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Returns true if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and consumes the store.
    pub fn destroy(self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store(ttl_ms: u64) -> ExpiringStore<String, String> {
        ExpiringStore::new(Duration::from_millis(ttl_ms))
    }

    #[test]
    fn test_set_get() {
        let store = store(60_000);
        store.set("k".into(), "v".into());
        assert_eq!(store.get(&"k".to_string()), Some("v".to_string()));
        assert_eq!(store.get(&"missing".to_string()), None);
    }

    #[test]
    fn test_overwrite() {
        let store = store(60_000);
        store.set("k".into(), "v1".into());
        store.set("k".into(), "v2".into());
        assert_eq!(store.get(&"k".to_string()), Some("v2".to_string()));
    }

    #[test]
    fn test_get_or_set() {
        let store = store(60_000);

        let (value, existed) = store.get_or_set("k".into(), "first".into());
        assert_eq!(value, "first");
        assert!(!existed);

        let (value, existed) = store.get_or_set("k".into(), "second".into());
        assert_eq!(value, "first");
        assert!(existed);
    }

    #[test]
    fn test_delete_and_get_and_delete() {
        let store = store(60_000);
        store.set("a".into(), "1".into());
        store.set("b".into(), "2".into());

        store.delete(&"a".to_string());
        assert_eq!(store.get(&"a".to_string()), None);

        assert_eq!(store.get_and_delete(&"b".to_string()), Some("2".to_string()));
        assert_eq!(store.get_and_delete(&"b".to_string()), None);
    }

    #[test]
    fn test_ttl_expiration() {
        let store = store(50);
        store.set("k".into(), "v".into());
        assert!(store.get(&"k".to_string()).is_some());

        thread::sleep(Duration::from_millis(150));
        assert!(store.get(&"k".to_string()).is_none());
    }

    #[test]
    fn test_touch_extends_deadline() {
        let store = store(150);
        store.set("touched".into(), "v".into());
        store.set("plain".into(), "v".into());

        assert!(store.touch(&"touched".to_string(), Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(400));

        assert!(store.get(&"touched".to_string()).is_some());
        assert!(store.get(&"plain".to_string()).is_none());
    }

    #[test]
    fn test_read_keeps_touch_extension() {
        let store = store(150);
        store.set("k".into(), "v".into());

        assert!(store.touch(&"k".to_string(), Duration::from_secs(5)));
        assert!(store.get(&"k".to_string()).is_some());
        thread::sleep(Duration::from_millis(400));

        assert!(store.get(&"k".to_string()).is_some());
    }

    #[test]
    fn test_read_still_slides_deadline() {
        let store = store(300);
        store.set("k".into(), "v".into());

        for _ in 0..4 {
            thread::sleep(Duration::from_millis(150));
            assert!(store.get(&"k".to_string()).is_some());
        }
    }

    #[test]
    fn test_touch_missing_key() {
        let store = store(60_000);
        assert!(!store.touch(&"missing".to_string(), Duration::from_secs(1)));
        assert!(store.get(&"missing".to_string()).is_none());
    }

    #[test]
    fn test_range_visits_all_and_stops_on_error() {
        let store = store(60_000);
        for i in 0..5 {
            store.set(format!("k{i}"), format!("v{i}"));
        }

        let mut seen = Vec::new();
        store
            .range(|k, _| {
                seen.push(k.clone());
                Ok::<(), ()>(())
            })
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec!["k0", "k1", "k2", "k3", "k4"]);

        let mut calls = 0;
        let result = store.range(|_, _| {
            calls += 1;
            Err("stop")
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_destroy_and_len() {
        let store = store(60_000);
        store.set("a".into(), "1".into());
        store.set("b".into(), "2".into());
        assert_eq!(store.len(), 2);

        let clone = store.clone();
        store.destroy();
        assert!(clone.is_empty());
    }
}
