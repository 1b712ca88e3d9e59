//! Conversation session store.
//!
//! [`SessionStore`] is the persistence seam the upsert resolver writes
//! through.  [`JsonSessionStore`] is the bundled implementation: an
//! in-memory map persisted to `sessions/sessions.json` under the configured
//! state path.

use std::path::Path;

use cr_domain::error::{Error, Result};
use cr_domain::session::ConversationSession;

use crate::json_file::JsonMapFile;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Point lookup by id, restricted to sessions owned by
    /// `(user_id, character_id)`.
    async fn find_owned(
        &self,
        session_id: &str,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<ConversationSession>>;

    /// The session for `(user_id, character_id)` with the greatest
    /// `updated_at`.
    async fn find_latest(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<ConversationSession>>;

    async fn insert(&self, session: ConversationSession) -> Result<()>;

    /// Overwrite the stored session with the same id.
    async fn update(&self, session: ConversationSession) -> Result<()>;

    /// All sessions for the pair, most recently updated first.
    async fn list_for(&self, user_id: &str, character_id: &str)
        -> Result<Vec<ConversationSession>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON-file implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct JsonSessionStore {
    file: JsonMapFile<ConversationSession>,
}

impl JsonSessionStore {
    /// Load or create the store at `state_path/sessions/sessions.json`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let file = JsonMapFile::open(state_path.join("sessions").join("sessions.json"))?;
        tracing::info!(
            sessions = file.len(),
            path = %file.path().map(|p| p.display().to_string()).unwrap_or_default(),
            "session store loaded"
        );
        Ok(Self { file })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            file: JsonMapFile::in_memory(),
        }
    }

    pub fn len(&self) -> usize {
        self.file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl SessionStore for JsonSessionStore {
    async fn find_owned(
        &self,
        session_id: &str,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<ConversationSession>> {
        Ok(self
            .file
            .get(session_id)
            .filter(|s| s.is_owned_by(user_id, character_id)))
    }

    async fn find_latest(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Option<ConversationSession>> {
        Ok(self
            .file
            .filter(|s| s.is_owned_by(user_id, character_id))
            .into_iter()
            .max_by_key(|s| (s.updated_at, s.created_at)))
    }

    async fn insert(&self, session: ConversationSession) -> Result<()> {
        self.file
            .write(move |map| {
                if map.contains_key(&session.id) {
                    return Err(Error::Persistence(format!(
                        "session {} already exists",
                        session.id
                    )));
                }
                map.insert(session.id.clone(), session);
                Ok(())
            })
            .await
    }

    async fn update(&self, session: ConversationSession) -> Result<()> {
        self.file
            .write(move |map| match map.get_mut(&session.id) {
                Some(slot) => {
                    *slot = session;
                    Ok(())
                }
                None => Err(Error::NotFound(format!("session {}", session.id))),
            })
            .await
    }

    async fn list_for(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> Result<Vec<ConversationSession>> {
        let mut sessions = self.file.filter(|s| s.is_owned_by(user_id, character_id));
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}
