/// Shared error type used across all chatrelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Upstream connection or HTTP failure, before or during streaming.
    #[error("transport ({provider}): {message}")]
    Transport { provider: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    /// Session or character store read/write failure.
    #[error("persistence: {0}")]
    Persistence(String),

    /// A turn is already running for this conversation.
    #[error("busy: {0}")]
    Busy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Transport`] raised by `provider`.
    pub fn transport(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
