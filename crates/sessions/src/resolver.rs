//! Session upsert: decide which stored session a completed turn belongs to
//! and write it.
//!
//! Target selection:
//! 1. An explicit session id addresses the session with that id only if it
//!    is owned by the same `(user_id, character_id)`.  An id owned by
//!    anyone else is treated as absent, and the turn starts a new session
//!    rather than falling back to the most recent one.
//! 2. With no explicit id, the most recently updated session for the pair.
//! 3. With no target, a new session is created.

use std::sync::Arc;

use chrono::Utc;

use cr_domain::error::Result;
use cr_domain::message::Message;
use cr_domain::session::ConversationSession;
use cr_domain::trace::TraceEvent;

use crate::store::SessionStore;

/// One completed turn, ready to be written.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub user_id: String,
    pub character_id: String,
    /// Prior messages followed by the new assistant reply.
    pub messages: Vec<Message>,
    pub session_id: Option<String>,
}

/// Result of a successful upsert.
#[derive(Debug, Clone)]
pub struct Upserted {
    pub session: ConversationSession,
    pub created: bool,
}

pub struct SessionUpsertResolver {
    store: Arc<dyn SessionStore>,
}

impl SessionUpsertResolver {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// The existing session a turn would be appended to, if any.
    pub async fn resolve_target(
        &self,
        user_id: &str,
        character_id: &str,
        session_id: Option<&str>,
    ) -> Result<Option<ConversationSession>> {
        match session_id {
            Some(id) => {
                let found = self.store.find_owned(id, user_id, character_id).await?;
                if found.is_none() {
                    tracing::debug!(
                        session_id = id,
                        user_id,
                        character_id,
                        "explicit session not owned by caller, starting a new one"
                    );
                }
                Ok(found)
            }
            None => self.store.find_latest(user_id, character_id).await,
        }
    }

    /// Write `turn` to its target session, creating one if needed.
    pub async fn record_turn(&self, turn: TurnRecord) -> Result<Upserted> {
        let TurnRecord {
            user_id,
            character_id,
            messages,
            session_id,
        } = turn;

        let target = self
            .resolve_target(&user_id, &character_id, session_id.as_deref())
            .await?;
        let now = Utc::now();

        let upserted = match target {
            Some(mut session) => {
                session.apply_turn(messages, now);
                self.store.update(session.clone()).await?;
                Upserted {
                    session,
                    created: false,
                }
            }
            None => {
                let session = ConversationSession::new(&user_id, &character_id, messages, now);
                self.store.insert(session.clone()).await?;
                Upserted {
                    session,
                    created: true,
                }
            }
        };

        TraceEvent::SessionResolved {
            session_id: upserted.session.id.clone(),
            user_id,
            character_id,
            is_new: upserted.created,
        }
        .emit();

        Ok(upserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonSessionStore;
    use chrono::Duration;

    fn resolver() -> (Arc<JsonSessionStore>, SessionUpsertResolver) {
        let store = Arc::new(JsonSessionStore::in_memory());
        let resolver = SessionUpsertResolver::new(store.clone());
        (store, resolver)
    }

    fn turn(user: &str, character: &str, session_id: Option<&str>, reply: &str) -> TurnRecord {
        TurnRecord {
            user_id: user.into(),
            character_id: character.into(),
            messages: vec![Message::user("hello"), Message::assistant(reply)],
            session_id: session_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn first_turn_creates_session_with_count_one() {
        let (store, resolver) = resolver();
        let up = resolver.record_turn(turn("U", "C", None, "hi")).await.unwrap();
        assert!(up.created);
        assert_eq!(up.session.interaction_count, 1);
        assert_eq!(up.session.messages.len(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn second_turn_without_id_updates_latest() {
        let (store, resolver) = resolver();
        let first = resolver.record_turn(turn("U", "C", None, "one")).await.unwrap();
        let second = resolver.record_turn(turn("U", "C", None, "two")).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.session.id, first.session.id);
        assert_eq!(second.session.interaction_count, 2);
        assert!(second.session.updated_at >= first.session.updated_at);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn latest_is_chosen_among_several() {
        let (store, resolver) = resolver();
        let t = Utc::now();
        let old = ConversationSession::new("U", "C", vec![], t - Duration::hours(2));
        let recent = ConversationSession::new("U", "C", vec![], t - Duration::minutes(1));
        store.insert(old.clone()).await.unwrap();
        store.insert(recent.clone()).await.unwrap();

        let up = resolver.record_turn(turn("U", "C", None, "x")).await.unwrap();
        assert_eq!(up.session.id, recent.id);
        let untouched = store.find_owned(&old.id, "U", "C").await.unwrap().unwrap();
        assert_eq!(untouched.interaction_count, 1);
    }

    #[tokio::test]
    async fn explicit_owned_id_is_updated() {
        let (store, resolver) = resolver();
        let t = Utc::now();
        let older = ConversationSession::new("U", "C", vec![], t - Duration::hours(1));
        let newer = ConversationSession::new("U", "C", vec![], t);
        store.insert(older.clone()).await.unwrap();
        store.insert(newer).await.unwrap();

        let up = resolver
            .record_turn(turn("U", "C", Some(&older.id), "x"))
            .await
            .unwrap();
        assert!(!up.created);
        assert_eq!(up.session.id, older.id);
        assert_eq!(up.session.interaction_count, 2);
    }

    #[tokio::test]
    async fn explicit_foreign_id_creates_new_and_leaves_owner_untouched() {
        let (store, resolver) = resolver();
        let theirs = resolver.record_turn(turn("V", "C", None, "theirs")).await.unwrap();
        // The intruder also has an existing session that must not be picked.
        let mine = resolver.record_turn(turn("U", "C", None, "mine")).await.unwrap();

        let up = resolver
            .record_turn(turn("U", "C", Some(&theirs.session.id), "sneaky"))
            .await
            .unwrap();
        assert!(up.created);
        assert_ne!(up.session.id, theirs.session.id);
        assert_ne!(up.session.id, mine.session.id);
        assert_eq!(up.session.user_id, "U");

        let victim = store
            .find_owned(&theirs.session.id, "V", "C")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(victim.interaction_count, 1);
        assert_eq!(victim.messages, theirs.session.messages);
    }

    #[tokio::test]
    async fn unknown_explicit_id_creates_new() {
        let (_store, resolver) = resolver();
        let up = resolver
            .record_turn(turn("U", "C", Some("does-not-exist"), "x"))
            .await
            .unwrap();
        assert!(up.created);
        assert_ne!(up.session.id, "does-not-exist");
    }
}
