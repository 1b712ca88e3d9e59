pub mod credentials;
pub mod event;
pub mod openai_compat;
pub mod registry;
pub mod sse;
pub mod traits;
mod util;

// Re-exports for convenience.
pub use registry::ProviderRegistry;
pub use sse::{delta_stream, spawn_decoder, DecoderHandle, LineDecoder};
pub use traits::{ByteStream, CompletionProvider, CompletionRequest};
