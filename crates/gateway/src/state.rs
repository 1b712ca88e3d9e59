use std::sync::Arc;

use cr_domain::config::Config;
use cr_sessions::{JsonCharacterStore, JsonSessionStore};

use crate::runtime::ConversationService;

/// Everything a command needs once the runtime is booted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<ConversationService>,
    pub sessions: Arc<JsonSessionStore>,
    pub characters: Arc<JsonCharacterStore>,
}
