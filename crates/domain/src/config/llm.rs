use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream provider configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Provider used when a request does not name one.  When `None`, the
    /// first configured provider is used.
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Capacity of the bounded channel between the stream decoder and the
    /// relay.
    #[serde(default = "d_64")]
    pub stream_buffer: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            default_provider: None,
            stream_buffer: d_64(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub default_model: Option<String>,
    /// TCP/TLS connect timeout.  There is deliberately no total-request
    /// timeout: a long stream is not a failure.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Header name (e.g. "Authorization", "x-api-key").
    #[serde(default)]
    pub header: Option<String>,
    /// Header value prefix (e.g. "Bearer ").
    #[serde(default)]
    pub prefix: Option<String>,
    /// Env var containing the key.  Defaults to `{PROVIDER_ID}_API_KEY`.
    #[serde(default)]
    pub env: Option<String>,
    /// Direct key (for config-only setups; prefer env or keychain).  Wins
    /// over `env` in `api_key` mode.
    #[serde(default)]
    pub key: Option<String>,
    /// Keychain service name.  Defaults to "chatrelay".
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name.  Defaults to the provider id.
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Keychain,
    /// Local endpoints (Ollama, LM Studio) that take no key.
    None,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_64() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_defaults() {
        let cfg = LlmConfig::default();
        assert!(cfg.providers.is_empty());
        assert_eq!(cfg.stream_buffer, 64);
    }

    #[test]
    fn provider_config_deserializes_minimal() {
        let json = r#"{ "id": "local", "base_url": "http://localhost:11434/v1",
                        "auth": { "mode": "none" } }"#;
        let pc: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(pc.kind, ProviderKind::OpenaiCompat);
        assert_eq!(pc.auth.mode, AuthMode::None);
        assert!(pc.connect_timeout_ms.is_none());
    }

    #[test]
    fn auth_mode_keychain_serializes() {
        let json = serde_json::to_string(&AuthMode::Keychain).unwrap();
        assert_eq!(json, r#""keychain""#);
    }
}
