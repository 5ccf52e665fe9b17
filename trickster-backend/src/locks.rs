//! Process-wide per-key single-flight lock registry.
//!
//! A plain mutual-exclusion lock per key, not a broadcast-based dogpile
//! suppressor: two concurrent requests for the same key serialise, and the
//! second benefits from whatever the first wrote to the cache. Reference
//! counting reclaims an entry once nobody holds or is waiting on it, so idle
//! keys don't leak memory and concurrent distinct keys never serialise
//! against each other.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Entry {
    mutex: Arc<Mutex<()>>,
    waiters: usize,
}

/// A held lock for one cache key. Dropping it (or calling [`LockRegistry::release`]
/// explicitly) releases the lock and, if no other caller is waiting,
/// reclaims the registry entry.
pub struct LockGuard {
    key: String,
    registry: Arc<LockRegistryInner>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.registry.on_release(&self.key);
    }
}

struct LockRegistryInner {
    entries: DashMap<String, Entry>,
}

impl LockRegistryInner {
    fn on_release(&self, key: &str) {
        let mut remove = false;
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.waiters = entry.waiters.saturating_sub(1);
            if entry.waiters == 0 {
                remove = true;
            }
        }
        if remove {
            self.entries.remove(key);
        }
    }
}

/// Process-wide registry of per-key single-flight locks.
///
/// `Acquire(key)` blocks until the caller holds the lock for that key;
/// dropping the returned [`LockGuard`] releases it. Fairness is whatever
/// `tokio::sync::Mutex` provides (FIFO-ish, bounded starvation) — strict
/// fairness is not required.
#[derive(Clone)]
pub struct LockRegistry {
    inner: Arc<LockRegistryInner>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockRegistryInner {
                entries: DashMap::new(),
            }),
        }
    }

    /// Acquire the lock for `key`, blocking until it is available.
    ///
    /// Callers must not recursively acquire the same key from within a task
    /// that already holds it — the lock is not re-entrant. Use a `no_lock`
    /// escape hatch at the call site instead (see the Object engine's
    /// `no_lock` parameter).
    pub async fn acquire(&self, key: &str) -> LockGuard {
        let mutex = {
            let mut entry = self
                .inner
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Entry {
                    mutex: Arc::new(Mutex::new(())),
                    waiters: 0,
                });
            entry.waiters += 1;
            Arc::clone(&entry.mutex)
        };

        let guard = mutex.lock_owned().await;
        LockGuard {
            key: key.to_string(),
            registry: Arc::clone(&self.inner),
            _guard: guard,
        }
    }

    /// Number of keys currently tracked (held or awaited). Exposed for tests.
    pub fn tracked_key_count(&self) -> usize {
        self.inner.entries.len()
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn distinct_keys_do_not_serialize() {
        let registry = LockRegistry::new();
        let a = registry.acquire("a").await;
        let b = registry.acquire("b").await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn same_key_serializes_and_reclaims() {
        let registry = LockRegistry::new();
        let guard = registry.acquire("k").await;
        assert_eq!(registry.tracked_key_count(), 1);

        let registry2 = registry.clone();
        let handle = tokio::spawn(async move {
            let _second = registry2.acquire("k").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        handle.await.unwrap();

        assert_eq!(registry.tracked_key_count(), 0);
    }
}
