//! OpenAI Provider implementation
//!
//! OpenAI chat-completions protocol with bearer auth. Serves OpenAI itself,
//! every OpenAI-compatible vendor (DashScope, Baichuan, ...) and the Hugging
//! Face inference router.

use super::{http_client, sse, upstream_error, BoxStream, Provider, ProviderCall};
use crate::models::openai::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio_stream::StreamExt;
use tracing::debug;

/// Default OpenAI endpoint
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Hugging Face OpenAI-compatible router
pub const HUGGINGFACE_BASE_URL: &str = "https://router.huggingface.co/v1";

/// OpenAI Provider
pub struct OpenAIProvider {
    name: String,
    default_base_url: String,
    client: Client,
}

impl OpenAIProvider {
    /// Create a provider for OpenAI and compatible endpoints
    pub fn new() -> Result<Self> {
        Self::with_default_base("openai", OPENAI_BASE_URL)
    }

    /// Create a provider for the Hugging Face router
    pub fn huggingface() -> Result<Self> {
        Self::with_default_base("huggingface", HUGGINGFACE_BASE_URL)
    }

    /// Create a provider with a custom name and fallback endpoint
    pub fn with_default_base(name: &str, default_base_url: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            default_base_url: default_base_url.to_string(),
            client: http_client()?,
        })
    }

    /// Build the request URL
    fn build_url(&self, call: &ProviderCall) -> String {
        format!("{}/chat/completions", call.base_url_or(&self.default_base_url))
    }

    /// Build the request body
    fn build_request(call: &ProviderCall, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: call.model.clone(),
            messages: call.messages.clone(),
            max_tokens: Some(call.max_tokens),
            temperature: Some(call.temperature),
            stream: stream.then_some(true),
        }
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat_complete(&self, call: &ProviderCall) -> Result<OpenAIResponse> {
        debug!("Sending {} chat completion request", self.name);

        let response = self
            .client
            .post(self.build_url(call))
            .bearer_auth(call.api_key())
            .timeout(call.timeout)
            .json(&Self::build_request(call, false))
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(upstream_error(&self.name, response).await);
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.name))?;

        debug!("{} request completed successfully", self.name);
        Ok(openai_response)
    }

    async fn chat_stream(&self, call: &ProviderCall) -> Result<BoxStream<'static, OpenAIStreamResponse>> {
        debug!("Sending {} streaming chat completion request", self.name);

        let response = self
            .client
            .post(self.build_url(call))
            .bearer_auth(call.api_key())
            .header("Accept", "text/event-stream")
            .timeout(call.timeout)
            .json(&Self::build_request(call, true))
            .send()
            .await
            .context("Failed to send streaming request")?;

        if !response.status().is_success() {
            return Err(upstream_error(&self.name, response).await);
        }

        let provider = self.name.clone();
        let stream = sse::sse_data(response.bytes_stream()).filter_map(move |data| match data {
            Ok(data) => decode_chunk(&provider, &data),
            Err(e) => Some(Err(e)),
        });

        Ok(Box::pin(stream))
    }
}

/// Decode one `data:` payload of an OpenAI-protocol stream
///
/// Error frames fail the stream; unparseable payloads are skipped.
pub(crate) fn decode_chunk(provider: &str, data: &str) -> Option<Result<OpenAIStreamResponse>> {
    let chunk = sse::parse_json::<OpenAIStreamResponse>(data)?;
    match chunk.error_message() {
        Some(message) => Some(Err(anyhow::anyhow!("{} stream error: {}", provider, message))),
        None => Some(Ok(chunk)),
    }
}
