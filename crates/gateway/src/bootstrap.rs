//! AppState construction shared by every command that runs turns or reads
//! stored sessions.

use std::sync::Arc;

use anyhow::Context;

use cr_domain::config::{Config, ConfigSeverity};
use cr_providers::ProviderRegistry;
use cr_sessions::{JsonCharacterStore, JsonSessionStore};

use crate::runtime::{ConversationService, RelayConfig};
use crate::state::AppState;

/// Validate config, open the stores and wire the conversation service.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }

    // ── Providers ────────────────────────────────────────────────────
    let providers = Arc::new(ProviderRegistry::from_config(&config.llm));
    if providers.is_empty() {
        tracing::warn!("no completion providers initialized; turns will fail");
    } else {
        tracing::info!(count = providers.len(), "providers ready");
    }

    // ── Stores ───────────────────────────────────────────────────────
    let state_path = &config.sessions.state_path;
    let sessions = Arc::new(
        JsonSessionStore::open(state_path)
            .with_context(|| format!("opening session store under {}", state_path.display()))?,
    );
    let characters = Arc::new(
        JsonCharacterStore::open(state_path)
            .with_context(|| format!("opening character store under {}", state_path.display()))?,
    );

    // ── Conversation service ─────────────────────────────────────────
    let relay = RelayConfig {
        capacity: config.llm.stream_buffer,
        timeout: None,
    };
    let service = Arc::new(ConversationService::new(
        providers,
        sessions.clone(),
        characters.clone(),
        relay,
        config.sessions.serialize_turns,
    ));

    Ok(AppState {
        config,
        service,
        sessions,
        characters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boots_with_empty_config_in_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sessions.state_path = dir.path().to_path_buf();

        let state = build_app_state(Arc::new(config)).unwrap();
        assert!(state.sessions.is_empty());
        assert!(dir.path().join("sessions").exists());
        assert!(dir.path().join("characters").exists());
    }

    #[test]
    fn config_errors_abort_boot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sessions.state_path = dir.path().to_path_buf();
        config.llm.stream_buffer = 0;

        assert!(build_app_state(Arc::new(config)).is_err());
    }
}
