use cr_domain::character::GenerationParams;
use cr_domain::error::Result;
use cr_domain::message::Message;
use cr_domain::stream::BoxStream;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The conversation so far, oldest first.
    pub messages: Vec<Message>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
    /// Sampling parameters, passed through unchanged.
    pub params: GenerationParams,
}

/// Raw upstream response body, chunked however the transport delivered it.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Anything that can start a streaming completion.
///
/// Implementations return `Err(Error::Transport)` when the upstream refuses
/// the request before any body bytes arrive (connection failure, non-2xx
/// status).  Failures after that point surface as `Err` items on the
/// returned [`ByteStream`].
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn start_completion(&self, req: &CompletionRequest) -> Result<ByteStream>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
