use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for upstream byte bodies and decoded deltas.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One unit of incremental output decoded from an upstream completion.
///
/// Deltas of one stream are strictly ordered.  Exactly one delta per stream
/// has `is_terminal == true`; it always carries empty text and is the last
/// item the decoder produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDelta {
    pub text: String,
    pub is_terminal: bool,
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_terminal: false,
        }
    }

    pub fn terminal() -> Self {
        Self {
            text: String::new(),
            is_terminal: true,
        }
    }
}

/// Folds deltas into the running full text.
///
/// The accumulated value depends only on the sequence of deltas pushed, so
/// two accumulators fed the same sequence always agree.
#[derive(Debug, Clone, Default)]
pub struct DeltaAccumulator {
    text: String,
    terminal_seen: bool,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta and return the full text known so far.
    ///
    /// Deltas arriving after the terminal one are ignored.
    pub fn push(&mut self, delta: &StreamDelta) -> &str {
        if !self.terminal_seen {
            if delta.is_terminal {
                self.terminal_seen = true;
            } else {
                self.text.push_str(&delta.text);
            }
        }
        &self.text
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal_seen
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
