use serde::{Deserialize, Serialize};

/// One turn in a conversation (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Message body.  Plain text today; `Parts` leaves room for multimodal
/// content stored by newer clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()) }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }
}

impl MessageContent {
    /// All text parts joined with newlines; images are dropped.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Build the sequence persisted after a completed turn: the prior messages
/// followed by the new assistant reply.  `prior` is left untouched.
pub fn with_assistant_reply(prior: &[Message], reply: impl Into<String>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(prior.len() + 1);
    messages.extend_from_slice(prior);
    messages.push(Message::assistant(reply));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serializes_flat() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn parts_flatten_to_text() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text { text: "look".into() },
            ContentPart::Image { url: "https://x/y.png".into(), media_type: None },
            ContentPart::Text { text: "at this".into() },
        ]);
        assert_eq!(content.extract_all_text(), "look\nat this");
    }

    #[test]
    fn reply_appends_without_touching_prior() {
        let prior = vec![Message::system("be nice"), Message::user("hello")];
        let next = with_assistant_reply(&prior, "hey there");
        assert_eq!(prior.len(), 2);
        assert_eq!(next.len(), 3);
        assert_eq!(next[2], Message::assistant("hey there"));
    }

    #[test]
    fn stored_messages_deserialize() {
        let raw = r#"[{"role":"system","content":"x"},{"role":"assistant","content":[{"type":"text","text":"y"}]}]"#;
        let msgs: Vec<Message> = serde_json::from_str(raw).unwrap();
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].content.extract_all_text(), "y");
    }
}
