use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A persisted exchange between one user and one character.
///
/// `(id, user_id, character_id)` together address a session; a session id
/// alone never grants access to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub user_id: String,
    pub character_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub interaction_count: u64,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    /// A fresh session holding the first completed turn.
    pub fn new(
        user_id: impl Into<String>,
        character_id: impl Into<String>,
        messages: Vec<Message>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            character_id: character_id.into(),
            messages,
            interaction_count: 1,
            last_message_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str, character_id: &str) -> bool {
        self.user_id == user_id && self.character_id == character_id
    }

    /// Record one more completed turn on this session.
    pub fn apply_turn(&mut self, messages: Vec<Message>, now: DateTime<Utc>) {
        self.messages = messages;
        self.interaction_count += 1;
        self.last_message_at = now;
        self.updated_at = now;
    }
}

/// Key identifying the conversation a turn writes to when no explicit
/// session is named: one user talking to one character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub character_id: String,
}

impl ConversationKey {
    pub fn new(user_id: impl Into<String>, character_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            character_id: character_id.into(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user_id, self.character_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_counts_first_turn() {
        let now = Utc::now();
        let s = ConversationSession::new("u1", "c1", vec![Message::user("hi")], now);
        assert_eq!(s.interaction_count, 1);
        assert_eq!(s.created_at, now);
        assert_eq!(s.updated_at, now);
        assert!(s.is_owned_by("u1", "c1"));
        assert!(!s.is_owned_by("u2", "c1"));
        assert!(uuid::Uuid::parse_str(&s.id).is_ok());
    }

    #[test]
    fn apply_turn_replaces_messages_and_bumps() {
        let t0 = Utc::now();
        let mut s = ConversationSession::new("u", "c", vec![Message::user("a")], t0);
        let t1 = t0 + chrono::Duration::seconds(5);
        s.apply_turn(vec![Message::user("a"), Message::assistant("b")], t1);
        assert_eq!(s.interaction_count, 2);
        assert_eq!(s.messages.len(), 2);
        assert_eq!(s.updated_at, t1);
        assert_eq!(s.last_message_at, t1);
        assert_eq!(s.created_at, t0);
    }

    #[test]
    fn conversation_key_display() {
        assert_eq!(ConversationKey::new("u", "c").to_string(), "u:c");
    }
}
