//! Idempotency cache: successful results replayed by key for a fixed TTL.
//!
//! The cache is an explicit component. Build one per process, share it behind
//! an `Arc`, and tear it down with [`IdempotencyCache::clear`]. Values are
//! type-erased so one cache can serve operations with different result types;
//! a lookup with the wrong type is a miss.
//!
//! Calls for the same key are serialized through a per-key async lock, so two
//! concurrent requests carrying the same key never both run the operation.
//!
//! Keys that are never read again would otherwise stay forever, so an insert
//! sweeps expired entries and idle locks once per TTL.
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::debug;

use crate::config::IdempotencyConfig;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

pub struct IdempotencyCache {
    ttl: Duration,
    entries: DashMap<String, Entry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    origin: Instant,
    /// Milliseconds after `origin` of the last sweep.
    last_sweep_ms: AtomicU64,
}

impl std::fmt::Debug for IdempotencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdempotencyCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(IdempotencyConfig::default())
    }
}

impl IdempotencyCache {
    pub fn new(config: IdempotencyConfig) -> Self {
        Self {
            ttl: config.ttl,
            entries: DashMap::new(),
            locks: DashMap::new(),
            origin: Instant::now(),
            last_sweep_ms: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, if present, unexpired and of type `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        // The shard guard is released before any removal below.
        let lookup = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| Arc::clone(&entry.value)));
        match lookup {
            Some(Some(value)) => value.downcast_ref::<T>().cloned(),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }

    /// Stores `value` under `key` for one TTL, replacing any previous value.
    pub fn insert<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.sweep_if_due();
        self.entries.insert(
            key.into(),
            Entry {
                value: Arc::new(value),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops expired entries and idle key locks. Returns the number of
    /// entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.entries.len())
    }

    /// Purges when a full TTL has passed since the last sweep. Only one of
    /// several racing callers wins the sweep.
    fn sweep_if_due(&self) {
        let now_ms = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < ttl_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let removed = self.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = self.entries.len(), "idempotency_sweep");
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for exclusive use of `key`. Hold the guard across the
    /// check-run-store sequence.
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> IdempotencyCache {
        IdempotencyCache::new(IdempotencyConfig::default().with_ttl(Duration::from_secs(ttl_secs)))
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = cache(600);
        cache.insert("submit-1", 7_u32);
        assert_eq!(cache.get::<u32>("submit-1"), Some(7));

        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get::<u32>("submit-1"), Some(7));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<u32>("submit-1"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = cache(60);
        cache.insert("old", "a".to_string());
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.insert("new", "b".to_string());
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<String>("new").as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn insert_sweeps_keys_nobody_reads_again() {
        let cache = cache(600);
        for n in 0..1000 {
            cache.insert(format!("draft:{n}"), n);
        }
        assert_eq!(cache.len(), 1000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        for n in 0..10 {
            cache.insert(format!("fresh:{n}"), n);
        }
        assert_eq!(cache.len(), 10);
        assert_eq!(cache.get::<i32>("fresh:3"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_run_at_most_once_per_ttl() {
        let cache = cache(600);
        tokio::time::advance(Duration::from_secs(300)).await;
        cache.insert("a", 1_u8);
        tokio::time::advance(Duration::from_secs(301)).await;
        cache.insert("b", 2_u8);
        assert_eq!(cache.len(), 2, "sweep at 601s keeps the live entry");

        tokio::time::advance(Duration::from_secs(300)).await;
        cache.insert("c", 3_u8);
        assert_eq!(cache.len(), 3, "next sweep is not due until 1201s");

        assert_eq!(cache.get::<u8>("a"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn wrong_type_is_a_miss() {
        let cache = cache(60);
        cache.insert("k", 1_u64);
        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.get::<u64>("k"), Some(1));
    }

    #[test]
    fn clear_empties_cache() {
        let cache = cache(60);
        cache.insert("a", 1_u8);
        cache.insert("b", 2_u8);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.remove("a"));
    }
}
