//! Keyed turn locks.
//!
//! A turn for a (user, character) pair holds that pair's permit from
//! before the relay starts until its last write lands, so two turns that
//! would resolve to the same session never interleave.  A second turn that
//! arrives while the first is running is rejected with [`Error::Busy`]
//! rather than queued behind it.
//!
//! The same map type, keyed by character id, serializes interaction counter
//! bumps across users.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use cr_domain::error::{Error, Result};
use cr_domain::session::ConversationKey;

/// Maps each key to a `Semaphore(1)`.
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Semaphore>>>,
}

/// One permit per (user, character) pair.
pub type ConversationLocks = KeyedLocks<ConversationKey>;

/// One permit per character id.
pub type CharacterLocks = KeyedLocks<String>;

impl<K: Eq + Hash + Clone + Display> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Display> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore(&self, key: &K) -> Arc<Semaphore> {
        self.locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    /// Wait for exclusive access to `key`.  The permit releases on drop.
    pub async fn acquire(&self, key: &K) -> Result<OwnedSemaphorePermit> {
        self.semaphore(key)
            .acquire_owned()
            .await
            .map_err(|_| Error::Other(format!("lock for {key} closed")))
    }

    /// Take `key` if nobody holds it, without waiting.
    pub fn try_acquire(&self, key: &K) -> Result<OwnedSemaphorePermit> {
        self.semaphore(key)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => {
                    Error::Busy(format!("a turn is already running for {key}"))
                }
                TryAcquireError::Closed => Error::Other(format!("lock for {key} closed")),
            })
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget keys nobody holds or waits on.
    ///
    /// Holders and waiters each keep a clone of the `Arc`, so a strong
    /// count of one means only the map references it.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(user: &str, character: &str) -> ConversationKey {
        ConversationKey::new(user, character)
    }

    #[tokio::test]
    async fn sequential_access() {
        let locks = ConversationLocks::new();
        drop(locks.acquire(&key("u", "c")).await.unwrap());
        drop(locks.acquire(&key("u", "c")).await.unwrap());
    }

    #[tokio::test]
    async fn different_keys_are_independent() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire(&key("u", "c1")).await.unwrap();
        let _b = locks.acquire(&key("u", "c2")).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn colon_in_ids_does_not_alias_keys() {
        let locks = ConversationLocks::new();
        let _a = locks.try_acquire(&key("a:b", "c")).unwrap();
        let _b = locks.try_acquire(&key("a", "b:c")).unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn same_key_waits_for_release() {
        let locks = Arc::new(CharacterLocks::new());
        let first = locks.acquire(&"c".to_string()).await.unwrap();

        let l2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _p = l2.acquire(&"c".to_string()).await.unwrap();
            42
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), 42);
    }

    #[test]
    fn try_acquire_on_held_key_is_busy() {
        let locks = ConversationLocks::new();
        let held = locks.try_acquire(&key("u", "c")).unwrap();

        let err = locks.try_acquire(&key("u", "c")).unwrap_err();
        assert!(matches!(err, Error::Busy(_)));
        assert!(err.to_string().contains("u:c"));

        drop(held);
        assert!(locks.try_acquire(&key("u", "c")).is_ok());
    }

    #[tokio::test]
    async fn prune_keeps_held_and_drops_idle() {
        let locks = CharacterLocks::new();
        let held = locks.acquire(&"held".to_string()).await.unwrap();
        drop(locks.acquire(&"idle".to_string()).await.unwrap());

        locks.prune_idle();
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.prune_idle();
        assert!(locks.is_empty());
    }
}
