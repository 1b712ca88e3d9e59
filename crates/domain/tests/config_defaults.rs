use cr_domain::config::{AuthMode, Config};

#[test]
fn default_serializes_turns() {
    let config = Config::default();
    assert!(config.sessions.serialize_turns);
    assert_eq!(config.sessions.state_path, std::path::PathBuf::from("./data"));
}

#[test]
fn empty_toml_parses_to_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert!(config.llm.providers.is_empty());
    assert_eq!(config.llm.stream_buffer, 64);
    assert!(!config.observability.json_logs);
}

#[test]
fn full_toml_parses() {
    let toml_str = r#"
[llm]
default_provider = "openrouter"
stream_buffer = 16

[[llm.providers]]
id = "openrouter"
kind = "openai_compat"
base_url = "https://openrouter.ai/api/v1"
default_model = "mistralai/mistral-7b-instruct"
connect_timeout_ms = 5000

[llm.providers.auth]
env = "OPENROUTER_API_KEY"

[[llm.providers]]
id = "local"
base_url = "http://localhost:11434/v1"

[llm.providers.auth]
mode = "none"

[sessions]
state_path = "/var/lib/chatrelay"
serialize_turns = false

[observability]
json_logs = true
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.llm.providers.len(), 2);
    assert_eq!(config.llm.stream_buffer, 16);
    assert_eq!(config.llm.providers[0].auth.env.as_deref(), Some("OPENROUTER_API_KEY"));
    assert_eq!(config.llm.providers[0].connect_timeout_ms, Some(5000));
    assert_eq!(config.llm.providers[1].auth.mode, AuthMode::None);
    assert!(!config.sessions.serialize_turns);
    assert!(config.observability.json_logs);
}

#[test]
fn valid_config_has_no_errors() {
    let toml_str = r#"
[[llm.providers]]
id = "openrouter"
base_url = "https://openrouter.ai/api/v1"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(config.validate().is_empty());
}
