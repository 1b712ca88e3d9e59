use serde::Serialize;

/// Structured trace events emitted across all chatrelay crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        messages: usize,
    },
    /// A single upstream line could not be decoded and was skipped.
    DecodeWarning {
        reason: String,
        line_preview: String,
    },
    StreamFinished {
        provider: String,
        chars: usize,
        outcome: String,
        duration_ms: u64,
    },
    SessionResolved {
        session_id: String,
        user_id: String,
        character_id: String,
        is_new: bool,
    },
    InteractionCounted {
        character_id: String,
        interaction_count: u64,
    },
    PersistenceFailed {
        target: String,
        error: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        match self {
            TraceEvent::DecodeWarning { .. } | TraceEvent::PersistenceFailed { .. } => {
                tracing::warn!(trace_event = %json, "cr_event");
            }
            _ => tracing::info!(trace_event = %json, "cr_event"),
        }
    }
}
