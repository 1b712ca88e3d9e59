//! Upstream event shapes.
//!
//! Providers do not agree on where streamed text lives.  OpenAI-style
//! streams put it in `choices[0].delta.content`, some proxies resend the
//! whole `choices[0].message.content`, and legacy completion endpoints use
//! `choices[0].text`.  Each payload line is deserialized once and classified
//! into an [`UpstreamEvent`] variant; anything else is `Unknown`.

use serde::Deserialize;
use serde_json::Value;

/// One decoded event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Incremental chunk (`choices[0].delta`).
    Delta {
        content: String,
        finish_reason: Option<String>,
    },
    /// Full message chunk (`choices[0].message`).
    Message {
        content: String,
        finish_reason: Option<String>,
    },
    /// Legacy text-completion chunk (`choices[0].text`).
    Text {
        text: String,
        finish_reason: Option<String>,
    },
    /// Usage accounting with no choices (`stream_options.include_usage`).
    UsageOnly,
    /// The provider reported an error inside the stream.
    Failure { message: String },
    /// Valid JSON that matches none of the shapes above.
    Unknown,
}

impl UpstreamEvent {
    /// The text fragment carried by this event (empty when none).
    pub fn content(&self) -> &str {
        match self {
            UpstreamEvent::Delta { content, .. } | UpstreamEvent::Message { content, .. } => {
                content
            }
            UpstreamEvent::Text { text, .. } => text,
            _ => "",
        }
    }

    /// The non-null finish reason, if this event ends the generation.
    pub fn finish_reason(&self) -> Option<&str> {
        match self {
            UpstreamEvent::Delta { finish_reason, .. }
            | UpstreamEvent::Message { finish_reason, .. }
            | UpstreamEvent::Text { finish_reason, .. } => finish_reason.as_deref(),
            _ => None,
        }
    }
}

// ── Wire structs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    choices: Option<Vec<RawChoice>>,
    #[serde(default)]
    usage: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    #[serde(default)]
    delta: Option<RawContent>,
    #[serde(default)]
    message: Option<RawContent>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one `data:` payload.  Errors only when the payload is not JSON of
/// the expected overall structure.
pub fn parse_event(payload: &str) -> Result<UpstreamEvent, serde_json::Error> {
    let raw: RawEvent = serde_json::from_str(payload)?;
    Ok(classify(raw))
}

fn classify(raw: RawEvent) -> UpstreamEvent {
    if let Some(err) = raw.error.filter(|e| !e.is_null()) {
        return UpstreamEvent::Failure {
            message: error_message(&err),
        };
    }

    let choice = match raw.choices.and_then(|c| c.into_iter().next()) {
        Some(choice) => choice,
        None if raw.usage.is_some() => return UpstreamEvent::UsageOnly,
        None => return UpstreamEvent::Unknown,
    };

    let finish_reason = choice.finish_reason;
    if let Some(delta) = choice.delta {
        return UpstreamEvent::Delta {
            content: delta.content.unwrap_or_default(),
            finish_reason,
        };
    }
    if let Some(message) = choice.message {
        return UpstreamEvent::Message {
            content: message.content.unwrap_or_default(),
            finish_reason,
        };
    }
    if let Some(text) = choice.text {
        return UpstreamEvent::Text {
            text,
            finish_reason,
        };
    }
    // A bare `{"finish_reason": "stop"}` choice still ends the stream.
    match finish_reason {
        Some(reason) => UpstreamEvent::Delta {
            content: String::new(),
            finish_reason: Some(reason),
        },
        None => UpstreamEvent::Unknown,
    }
}

fn error_message(err: &Value) -> String {
    err.get("message")
        .and_then(|m| m.as_str())
        .map(String::from)
        .or_else(|| err.as_str().map(String::from))
        .unwrap_or_else(|| err.to_string())
}
