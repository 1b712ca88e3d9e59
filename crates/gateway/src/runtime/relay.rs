//! Completion relay: drive one upstream completion from request to a single
//! final outcome.
//!
//! The relay owns no conversation state.  Each [`CompletionRelay::run`]
//! call starts a stream on its provider, forwards the accumulated text to
//! `on_delta` after every content delta, and reports exactly one
//! [`Completion`] to `on_complete`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use cr_domain::error::Error;
use cr_domain::stream::DeltaAccumulator;
use cr_domain::trace::TraceEvent;
use cr_providers::{spawn_decoder, CompletionProvider, CompletionRequest};

use super::cancel::CancelToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    /// Slots in the decoder channel between the upstream reader and the
    /// relay loop.
    pub capacity: usize,
    /// Upper bound on the whole completion, start to terminal delta.
    pub timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            timeout: None,
        }
    }
}

/// How a relay run ended.
#[derive(Debug)]
pub enum Completion {
    /// The upstream signalled the end of the reply.
    Finished { text: String },
    /// Transport failure, upstream error, or deadline.  `partial` holds
    /// whatever text arrived first; it is reported but never persisted.
    Failed { partial: String, error: Error },
    /// Stopped by the caller.  Partial text is discarded.
    Cancelled,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Finished { .. })
    }

    /// The full reply, for a finished completion.
    pub fn text(&self) -> Option<&str> {
        match self {
            Completion::Finished { text } => Some(text),
            _ => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Completion::Finished { .. } => "finished",
            Completion::Failed { .. } => "failed",
            Completion::Cancelled => "cancelled",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CompletionRelay {
    provider: Arc<dyn CompletionProvider>,
    config: RelayConfig,
}

impl CompletionRelay {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: RelayConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Run one completion.
    ///
    /// `on_delta` receives the accumulated text after each content delta.
    /// `on_complete` is called exactly once, after the last `on_delta`, with
    /// the same value this method returns.
    pub async fn run<D, C>(
        &self,
        request: &CompletionRequest,
        mut on_delta: D,
        on_complete: C,
        cancel: &CancelToken,
    ) -> Completion
    where
        D: FnMut(&str) + Send,
        C: FnOnce(&Completion) + Send,
    {
        let provider = self.provider.provider_id().to_owned();
        let model = request.model.clone().unwrap_or_else(|| "default".into());
        let started = Instant::now();

        TraceEvent::LlmRequest {
            provider: provider.clone(),
            model: model.clone(),
            messages: request.messages.len(),
        }
        .emit();

        let span = tracing::info_span!("llm.stream", provider = %provider, model = %model);
        let mut acc = DeltaAccumulator::new();

        let completion = async {
            let drive = self.drive(request, &mut acc, &mut on_delta, cancel);
            match self.config.timeout {
                Some(limit) => match tokio::time::timeout(limit, drive).await {
                    Ok(c) => c,
                    Err(_) => {
                        tracing::warn!(timeout_ms = limit.as_millis() as u64, "completion deadline elapsed");
                        Completion::Failed {
                            partial: String::new(),
                            error: Error::Timeout(format!(
                                "no terminal event within {}ms",
                                limit.as_millis()
                            )),
                        }
                    }
                },
                None => drive.await,
            }
        }
        .instrument(span)
        .await;

        // A timed-out drive reports no partial; take it from the accumulator.
        let completion = match completion {
            Completion::Failed { partial, error } if partial.is_empty() => Completion::Failed {
                partial: acc.into_text(),
                error,
            },
            other => other,
        };

        TraceEvent::StreamFinished {
            provider,
            chars: completion.text().map(|t| t.chars().count()).unwrap_or(0),
            outcome: completion.outcome().into(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        on_complete(&completion);
        completion
    }

    async fn drive<D>(
        &self,
        request: &CompletionRequest,
        acc: &mut DeltaAccumulator,
        on_delta: &mut D,
        cancel: &CancelToken,
    ) -> Completion
    where
        D: FnMut(&str) + Send,
    {
        if cancel.is_cancelled() {
            return Completion::Cancelled;
        }

        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Completion::Cancelled,
            started = self.provider.start_completion(request) => match started {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::warn!(error = %error, "upstream refused completion");
                    return Completion::Failed { partial: String::new(), error };
                }
            },
        };

        // Dropping the handle on any return below aborts the reader task.
        let mut deltas = spawn_decoder(self.provider.provider_id(), bytes, self.config.capacity);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(partial_chars = acc.text().len(), "completion cancelled");
                    return Completion::Cancelled;
                }
                item = deltas.recv() => item,
            };

            match next {
                Some(Ok(delta)) if delta.is_terminal => {
                    acc.push(&delta);
                    return Completion::Finished {
                        text: std::mem::take(acc).into_text(),
                    };
                }
                Some(Ok(delta)) => on_delta(acc.push(&delta)),
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "completion stream failed");
                    return Completion::Failed {
                        partial: acc.text().to_owned(),
                        error,
                    };
                }
                None => {
                    return Completion::Failed {
                        partial: acc.text().to_owned(),
                        error: Error::transport(
                            self.provider.provider_id(),
                            "stream closed without a terminal event",
                        ),
                    };
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
