use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding `sessions/sessions.json` and
    /// `characters/characters.json`.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,

    /// Run at most one turn at a time per (user, character) pair.
    ///
    /// When `false`, two turns without an explicit session id can both
    /// resolve to the same "most recent" session and the later write wins.
    #[serde(default = "d_true")]
    pub serialize_turns: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            serialize_turns: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_true() -> bool {
    true
}
