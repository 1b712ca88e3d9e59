//! Provider API keys.
//!
//! `auth.mode` alone decides where a provider's key lives; there is no
//! cascade between sources.  Unset names default from the provider id, so
//! a provider `openrouter` reads `OPENROUTER_API_KEY`, or the keychain
//! entry `chatrelay` / `openrouter`.

use cr_domain::config::{AuthConfig, AuthMode};
use cr_domain::error::{Error, Result};

const KEYCHAIN_SERVICE: &str = "chatrelay";

#[derive(Debug, PartialEq, Eq)]
enum KeySource {
    Anonymous,
    Inline(String),
    Env(String),
    Keychain { service: String, account: String },
}

impl KeySource {
    fn for_provider(provider_id: &str, auth: &AuthConfig) -> Self {
        match auth.mode {
            AuthMode::None => KeySource::Anonymous,
            AuthMode::ApiKey => match (&auth.key, &auth.env) {
                (Some(key), _) => KeySource::Inline(key.clone()),
                (None, Some(var)) => KeySource::Env(var.clone()),
                (None, None) => KeySource::Env(default_env_var(provider_id)),
            },
            AuthMode::Keychain => KeySource::Keychain {
                service: auth
                    .service
                    .clone()
                    .unwrap_or_else(|| KEYCHAIN_SERVICE.into()),
                account: auth.account.clone().unwrap_or_else(|| provider_id.into()),
            },
        }
    }

    fn load(self, provider_id: &str) -> Result<Option<String>> {
        match self {
            KeySource::Anonymous => Ok(None),
            KeySource::Inline(key) => {
                tracing::warn!(provider_id, "API key read from config file; prefer env or keychain");
                Ok(Some(key))
            }
            KeySource::Env(var) => std::env::var(&var).map(Some).map_err(|_| {
                Error::Auth(format!("provider '{provider_id}': env var {var} is not set"))
            }),
            KeySource::Keychain { service, account } => keyring::Entry::new(&service, &account)
                .and_then(|entry| entry.get_password())
                .map(Some)
                .map_err(|e| {
                    Error::Auth(format!(
                        "provider '{provider_id}': keychain {service}/{account}: {e}"
                    ))
                }),
        }
    }
}

/// `openrouter-eu` → `OPENROUTER_EU_API_KEY`.
fn default_env_var(provider_id: &str) -> String {
    let stem: String = provider_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{stem}_API_KEY")
}

/// The key to send to `provider_id`, or `None` for keyless endpoints.
pub fn api_key(provider_id: &str, auth: &AuthConfig) -> Result<Option<String>> {
    KeySource::for_provider(provider_id, auth).load(provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(mode: AuthMode) -> AuthConfig {
        AuthConfig {
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn default_env_var_from_provider_id() {
        assert_eq!(default_env_var("openrouter"), "OPENROUTER_API_KEY");
        assert_eq!(default_env_var("lm-studio.local"), "LM_STUDIO_LOCAL_API_KEY");
    }

    #[test]
    fn mode_picks_exactly_one_source() {
        let mut a = auth(AuthMode::ApiKey);
        assert_eq!(
            KeySource::for_provider("groq", &a),
            KeySource::Env("GROQ_API_KEY".into())
        );

        a.env = Some("MY_KEY".into());
        assert_eq!(KeySource::for_provider("groq", &a), KeySource::Env("MY_KEY".into()));

        a.key = Some("sk-inline".into());
        assert_eq!(
            KeySource::for_provider("groq", &a),
            KeySource::Inline("sk-inline".into())
        );

        // Keychain mode ignores inline and env settings.
        a.mode = AuthMode::Keychain;
        assert_eq!(
            KeySource::for_provider("groq", &a),
            KeySource::Keychain {
                service: "chatrelay".into(),
                account: "groq".into()
            }
        );
    }

    #[test]
    fn keyless_mode_reads_nothing() {
        let mut a = auth(AuthMode::None);
        a.key = Some("ignored".into());
        assert_eq!(api_key("ollama", &a).unwrap(), None);
    }

    #[test]
    fn inline_key_is_returned() {
        let mut a = auth(AuthMode::ApiKey);
        a.key = Some("sk-test".into());
        assert_eq!(api_key("p", &a).unwrap().as_deref(), Some("sk-test"));
    }

    #[test]
    fn env_key_is_read() {
        let var = "CR_CREDENTIALS_TEST_ENV_KEY";
        std::env::set_var(var, "from-env");
        let mut a = auth(AuthMode::ApiKey);
        a.env = Some(var.into());
        assert_eq!(api_key("p", &a).unwrap().as_deref(), Some("from-env"));
        std::env::remove_var(var);
    }

    #[test]
    fn missing_env_names_provider_and_var() {
        let err = api_key("cr-unset-provider-4821", &auth(AuthMode::ApiKey)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cr-unset-provider-4821"));
        assert!(msg.contains("CR_UNSET_PROVIDER_4821_API_KEY"));
    }
}
