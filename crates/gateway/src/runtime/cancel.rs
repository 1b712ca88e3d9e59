//! Per-conversation cancellation tokens.
//!
//! Each running turn gets a `CancelToken`.  Cancelling it tears down the
//! upstream stream at the next `select!` point; nothing from that turn is
//! persisted afterwards.
//!
//! [`CancelMap`] indexes running turns by conversation key so a separate
//! request (a client navigating away, a CLI Ctrl-C) can stop them without
//! holding the tokens.  When turns are not serialized a key can have more
//! than one turn in flight; cancelling the key stops all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use cr_domain::session::ConversationKey;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// A cancellation token shared between a turn and whoever may stop it.
#[derive(Clone, Debug)]
pub struct CancelToken {
    inner: CancellationToken,
    id: u64,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks the tokens of running turns per conversation key.
pub struct CancelMap {
    tokens: Mutex<HashMap<ConversationKey, Vec<CancelToken>>>,
}

impl Default for CancelMap {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelMap {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Add `token` to the running turns for `key`.
    pub fn register(&self, key: &ConversationKey, token: CancelToken) {
        self.tokens.lock().entry(key.clone()).or_default().push(token);
    }

    /// Cancel every running turn for `key`.  Returns how many were
    /// signalled.
    pub fn cancel(&self, key: &ConversationKey) -> usize {
        match self.tokens.lock().get(key) {
            Some(tokens) => {
                tokens.iter().for_each(CancelToken::cancel);
                tokens.len()
            }
            None => 0,
        }
    }

    /// Drop `token` from `key`'s registrations.  Other turns for the key
    /// stay registered.
    pub fn remove(&self, key: &ConversationKey, token: &CancelToken) {
        let mut tokens = self.tokens.lock();
        if let Some(list) = tokens.get_mut(key) {
            list.retain(|t| t.id != token.id);
            if list.is_empty() {
                tokens.remove(key);
            }
        }
    }

    /// Number of turns registered for `key`.
    pub fn running(&self, key: &ConversationKey) -> usize {
        self.tokens.lock().get(key).map_or(0, Vec::len)
    }

    pub fn is_running(&self, key: &ConversationKey) -> bool {
        self.running(key) > 0
    }
}
