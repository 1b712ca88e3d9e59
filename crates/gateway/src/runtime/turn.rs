//! Turn orchestration: one user message in, one streamed reply out, and
//! the session and character bookkeeping that follows a finished reply.
//!
//! Entry point: [`ConversationService::continue_conversation`] spawns the
//! turn and returns a [`TurnHandle`] carrying a channel of [`TurnEvent`]s.
//!
//! With `serialize_turns` on, a turn holds its conversation's permit from
//! before the relay starts until the last write, and a second turn for the
//! same (user, character) pair is refused with a busy error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tracing::Instrument;

use cr_domain::character::CharacterParams;
use cr_domain::error::{Error, Result};
use cr_domain::message::{with_assistant_reply, Message};
use cr_domain::session::ConversationKey;
use cr_domain::trace::TraceEvent;
use cr_providers::{CompletionRequest, ProviderRegistry};
use cr_sessions::{
    CharacterStore, InteractionCounter, SessionStore, SessionUpsertResolver, TurnRecord, Upserted,
};

use super::cancel::{CancelMap, CancelToken};
use super::relay::{Completion, CompletionRelay, RelayConfig};
use super::session_lock::{CharacterLocks, ConversationLocks};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// The reply so far.  Each delta supersedes the previous one, so a
    /// consumer that falls behind may see fewer of them.
    #[serde(rename = "delta")]
    Delta { text: String },

    /// The full reply.  Sent as soon as the stream ends, before any write.
    #[serde(rename = "final")]
    Final { content: String },

    /// Follows `Final` once the writes were attempted.  Each field is
    /// absent when its write failed.
    #[serde(rename = "saved")]
    Saved {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        interaction_count: Option<u64>,
    },

    #[serde(rename = "error")]
    Error { message: String },

    /// The turn was cancelled; nothing was persisted.
    #[serde(rename = "stopped")]
    Stopped,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone)]
pub struct ContinueRequest {
    /// Conversation so far, ending with the user's new message.
    pub messages: Vec<Message>,
    /// Model override.  `None` uses the provider's default.
    pub model: Option<String>,
    pub params: CharacterParams,
    pub user_id: String,
    pub character_id: String,
    /// Session to append to.  Ignored unless owned by
    /// `(user_id, character_id)`.
    pub session_id: Option<String>,
    /// Provider id from config.  `None` uses the default provider.
    pub provider: Option<String>,
    /// Deadline for the upstream completion.
    pub timeout: Option<Duration>,
}

impl ContinueRequest {
    pub fn new(
        user_id: impl Into<String>,
        character_id: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            messages,
            model: None,
            params: CharacterParams::default(),
            user_id: user_id.into(),
            character_id: character_id.into(),
            session_id: None,
            provider: None,
            timeout: None,
        }
    }

    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(&self.user_id, &self.character_id)
    }

    fn completion_request(&self) -> CompletionRequest {
        CompletionRequest {
            messages: self.messages.clone(),
            model: self.model.clone(),
            params: self.params.resolve(),
        }
    }
}

/// What a turn did, reported once it is over.
#[derive(Debug)]
pub struct TurnOutcome {
    pub completion: Completion,
    /// The session written, when the completion finished and the write
    /// succeeded.
    pub session: Option<Upserted>,
    /// The character's new interaction count, when the bump succeeded.
    pub interaction_count: Option<u64>,
}

impl TurnOutcome {
    fn unpersisted(completion: Completion) -> Self {
        Self {
            completion,
            session: None,
            interaction_count: None,
        }
    }
}

/// Caller side of a running turn.
///
/// Dropping `events` does not stop the turn; use [`TurnHandle::cancel`].
pub struct TurnHandle {
    pub key: ConversationKey,
    pub events: mpsc::Receiver<TurnEvent>,
    pub cancel: CancelToken,
    pub task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn to end.
    pub async fn join(self) -> Result<TurnOutcome> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("turn task failed: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConversationService
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConversationService {
    providers: Arc<ProviderRegistry>,
    resolver: SessionUpsertResolver,
    counter: InteractionCounter,
    cancels: CancelMap,
    /// `None` when turns for one conversation may run concurrently.
    locks: Option<ConversationLocks>,
    counter_locks: CharacterLocks,
    relay: RelayConfig,
}

impl ConversationService {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        sessions: Arc<dyn SessionStore>,
        characters: Arc<dyn CharacterStore>,
        relay: RelayConfig,
        serialize_turns: bool,
    ) -> Self {
        Self {
            providers,
            resolver: SessionUpsertResolver::new(sessions),
            counter: InteractionCounter::new(characters),
            cancels: CancelMap::new(),
            locks: serialize_turns.then(ConversationLocks::new),
            counter_locks: CharacterLocks::new(),
            relay,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        self.resolver.store()
    }

    pub fn cancels(&self) -> &CancelMap {
        &self.cancels
    }

    /// Cancel every turn running for `key`.  Returns how many were
    /// signalled.
    pub fn cancel(&self, key: &ConversationKey) -> usize {
        self.cancels.cancel(key)
    }

    /// Start a turn.  The reply streams through the returned handle; once
    /// it finishes, the session upsert and the character counter bump run
    /// as two independent best-effort writes.
    ///
    /// If another turn for the same pair is still running and turns are
    /// serialized, the handle carries a single `Error` event and the
    /// outcome fails with [`Error::Busy`].
    pub fn continue_conversation(self: &Arc<Self>, req: ContinueRequest) -> TurnHandle {
        let (tx, rx) = mpsc::channel(self.relay.capacity.max(1));
        let cancel = CancelToken::new();
        let key = req.key();

        let permit = match self.locks.as_ref().map(|l| l.try_acquire(&key)).transpose() {
            Ok(permit) => permit,
            Err(error) => return rejected(key, tx, rx, cancel, error),
        };

        self.cancels.register(&key, cancel.clone());

        let span = tracing::info_span!(
            "turn",
            user_id = %req.user_id,
            character_id = %req.character_id,
            session_id = req.session_id.as_deref().unwrap_or(""),
        );

        let service = Arc::clone(self);
        let token = cancel.clone();
        let task_key = key.clone();
        let task = tokio::spawn(
            async move {
                let outcome = service.run_turn(req, tx, &token).await;
                service.cancels.remove(&task_key, &token);
                drop(permit);
                if let Some(locks) = &service.locks {
                    locks.prune_idle();
                }
                outcome
            }
            .instrument(span),
        );

        TurnHandle {
            key,
            events: rx,
            cancel,
            task,
        }
    }

    /// Run a completion with no session or character writes.
    pub async fn complete_once<D>(
        &self,
        provider: Option<&str>,
        request: CompletionRequest,
        on_delta: D,
        cancel: &CancelToken,
    ) -> Result<Completion>
    where
        D: FnMut(&str) + Send,
    {
        let relay = CompletionRelay::new(self.providers.resolve(provider)?, self.relay);
        Ok(relay.run(&request, on_delta, |_| {}, cancel).await)
    }

    async fn run_turn(
        &self,
        req: ContinueRequest,
        tx: mpsc::Sender<TurnEvent>,
        cancel: &CancelToken,
    ) -> TurnOutcome {
        let provider = match self.providers.resolve(req.provider.as_deref()) {
            Ok(p) => p,
            Err(error) => {
                tracing::warn!(error = %error, "no provider for turn");
                let _ = tx
                    .send(TurnEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
                return TurnOutcome::unpersisted(Completion::Failed {
                    partial: String::new(),
                    error,
                });
            }
        };

        let relay = CompletionRelay::new(
            provider,
            RelayConfig {
                timeout: req.timeout.or(self.relay.timeout),
                ..self.relay
            },
        );

        let delta_tx = tx.clone();
        let completion = relay
            .run(
                &req.completion_request(),
                move |text| {
                    // Full or closed: the next delta or the final event
                    // carries everything this one would have.
                    let _ = delta_tx.try_send(TurnEvent::Delta {
                        text: text.to_owned(),
                    });
                },
                |c| tracing::debug!(outcome = c.outcome(), "relay complete"),
                cancel,
            )
            .await;

        match completion {
            Completion::Finished { text } => {
                let _ = tx
                    .send(TurnEvent::Final {
                        content: text.clone(),
                    })
                    .await;
                let (session, interaction_count) = self.persist(&req, &text).await;
                let _ = tx
                    .send(TurnEvent::Saved {
                        session_id: session.as_ref().map(|u| u.session.id.clone()),
                        interaction_count,
                    })
                    .await;
                TurnOutcome {
                    completion: Completion::Finished { text },
                    session,
                    interaction_count,
                }
            }
            Completion::Failed { partial, error } => {
                let _ = tx
                    .send(TurnEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
                TurnOutcome::unpersisted(Completion::Failed { partial, error })
            }
            Completion::Cancelled => {
                let _ = tx.send(TurnEvent::Stopped).await;
                TurnOutcome::unpersisted(Completion::Cancelled)
            }
        }
    }

    /// The two post-completion writes.  Neither depends on the other and
    /// neither failure reaches the caller as a failed turn.
    ///
    /// The session write is covered by the conversation permit the turn
    /// already holds; the counter bump takes the character's own lock since
    /// other users may be talking to the same character.
    async fn persist(&self, req: &ContinueRequest, reply: &str) -> (Option<Upserted>, Option<u64>) {
        let record = TurnRecord {
            user_id: req.user_id.clone(),
            character_id: req.character_id.clone(),
            messages: with_assistant_reply(&req.messages, reply),
            session_id: req.session_id.clone(),
        };
        let session = match self.resolver.record_turn(record).await {
            Ok(upserted) => Some(upserted),
            Err(e) => {
                persistence_failed("session", &e);
                None
            }
        };

        let count = {
            let _guard = self.lock_counter(&req.character_id).await;
            match self.counter.bump(&req.character_id).await {
                Ok(n) => Some(n),
                Err(e) => {
                    persistence_failed("character", &e);
                    None
                }
            }
        };
        self.counter_locks.prune_idle();

        (session, count)
    }

    async fn lock_counter(&self, character_id: &str) -> Option<OwnedSemaphorePermit> {
        let key = character_id.to_owned();
        match self.counter_locks.acquire(&key).await {
            Ok(permit) => Some(permit),
            Err(e) => {
                tracing::warn!(character_id, error = %e, "bumping counter without lock");
                None
            }
        }
    }
}

/// A turn refused before it started.  The handle reports the error and
/// completes at once.
fn rejected(
    key: ConversationKey,
    tx: mpsc::Sender<TurnEvent>,
    events: mpsc::Receiver<TurnEvent>,
    cancel: CancelToken,
    error: Error,
) -> TurnHandle {
    tracing::warn!(conversation = %key, error = %error, "turn rejected");
    let _ = tx.try_send(TurnEvent::Error {
        message: error.to_string(),
    });
    drop(tx);
    let task = tokio::spawn(async move {
        TurnOutcome::unpersisted(Completion::Failed {
            partial: String::new(),
            error,
        })
    });
    TurnHandle {
        key,
        events,
        cancel,
        task,
    }
}

fn persistence_failed(target: &str, error: &Error) {
    TraceEvent::PersistenceFailed {
        target: target.to_owned(),
        error: error.to_string(),
    }
    .emit();
}
