//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, OpenRouter, Together, Ollama, vLLM, LM Studio and any
//! other endpoint that follows the streaming chat completions contract.

use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;

use cr_domain::config::ProviderConfig;
use cr_domain::error::{Error, Result};
use cr_domain::message::Message;

use crate::credentials::api_key;
use crate::traits::{ByteStream, CompletionProvider, CompletionRequest};
use crate::util::from_reqwest;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming completion adapter for any OpenAI-compatible endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the deserialized provider config.
    ///
    /// The API key is resolved here, once; nothing is read from process
    /// state afterwards.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = api_key(&cfg.id, &cfg.auth)?;
        let auth_header = cfg
            .auth
            .header
            .clone()
            .unwrap_or_else(|| "Authorization".into());
        let auth_prefix = cfg.auth.prefix.clone().unwrap_or_else(|| "Bearer ".into());
        let default_model = cfg
            .default_model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".into());

        // Connect timeout only: a total timeout would cut long streams.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(
                cfg.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            ))
            .build()
            .map_err(|e| from_reqwest(&cfg.id, e))?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            auth_header,
            auth_prefix,
            default_model,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");
        match &self.api_key {
            Some(key) => builder.header(&self.auth_header, format!("{}{}", self.auth_prefix, key)),
            None => builder,
        }
    }

    fn build_body(&self, req: &CompletionRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let p = &req.params;

        serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "temperature": p.temperature,
            "top_p": p.top_p,
            "top_k": p.top_k,
            "frequency_penalty": p.frequency_penalty,
            "presence_penalty": p.presence_penalty,
            "max_tokens": p.max_tokens,
        })
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    serde_json::json!({
        "role": msg.role.as_str(),
        "content": msg.content.extract_all_text(),
    })
}

/// Turn a successful response into a [`ByteStream`], one item per body
/// chunk as received.
fn body_stream(provider: String, response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(move |chunk| match chunk {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(e) => Err(from_reqwest(&provider, e)),
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    async fn start_completion(&self, req: &CompletionRequest) -> Result<ByteStream> {
        let url = self.chat_url();
        let body = self.build_body(req);

        tracing::debug!(provider = %self.id, url = %url, "openai_compat stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(&self.id, e))?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(Error::transport(
                &self.id,
                format!("HTTP {} - {}", status.as_u16(), err_text),
            ));
        }

        Ok(body_stream(self.id.clone(), resp))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
