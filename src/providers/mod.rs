//! Provider module
//!
//! Defines the Provider trait and one implementation per wire protocol

pub mod anthropic;
pub mod azure;
pub mod ollama;
pub mod openai;
pub mod sse;

use crate::config::ProviderKind;
use crate::models::openai::{OpenAIMessage, OpenAIResponse, OpenAIStreamResponse};
use crate::utils::redact::mask_secret;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

/// A boxed stream of streaming responses
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Fully resolved parameters of one upstream call
#[derive(Clone)]
pub struct ProviderCall {
    /// Provider-side model identifier
    pub model: String,
    /// Conversation turns
    pub messages: Vec<OpenAIMessage>,
    /// Token cap
    pub max_tokens: u32,
    /// Effective temperature
    pub temperature: f32,
    /// Endpoint override; each provider has its own default
    pub base_url: Option<String>,
    /// Credential value, absent for keyless providers
    pub api_key: Option<String>,
    /// Pinned API version (Azure)
    pub api_version: String,
    /// Request timeout
    pub timeout: Duration,
}

impl ProviderCall {
    /// Base URL without trailing slash, or `default` when unset
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Credential value, empty when absent
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for ProviderCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCall")
            .field("model", &self.model)
            .field("messages", &self.messages.len())
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Provider trait for upstream chat APIs
///
/// Every provider normalizes its protocol into OpenAI-shaped responses and
/// chunks, so the dispatcher never sees protocol differences.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Send a chat completion request (non-streaming)
    async fn chat_complete(&self, call: &ProviderCall) -> Result<OpenAIResponse>;

    /// Send a chat completion request (streaming)
    async fn chat_stream(&self, call: &ProviderCall) -> Result<BoxStream<'static, OpenAIStreamResponse>>;
}

/// Shared HTTP client; timeouts are set per request
pub(crate) fn http_client() -> Result<Client> {
    use anyhow::Context;

    Client::builder()
        .user_agent(concat!("llmgate/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Read an error body and turn it into a descriptive error
pub(crate) async fn upstream_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();

    if let Ok(error_response) = serde_json::from_str::<crate::models::openai::OpenAIErrorResponse>(&error_text) {
        tracing::error!("{} API error: {:?}", provider, error_response.error);
        return anyhow::anyhow!("{} API error ({}): {}", provider, status, error_response.error.message);
    }

    tracing::error!("{} API request failed: {} - {}", provider, status, error_text);
    anyhow::anyhow!("{} API request failed: {} - {}", provider, status, error_text)
}

/// Build the provider that speaks `kind`
pub fn provider_for(kind: ProviderKind) -> Result<std::sync::Arc<dyn Provider>> {
    use std::sync::Arc;

    Ok(match kind {
        ProviderKind::OpenaiCompatible => Arc::new(OpenAIProvider::new()?),
        ProviderKind::Huggingface => Arc::new(OpenAIProvider::huggingface()?),
        ProviderKind::Azure => Arc::new(AzureProvider::new()?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new()?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new()?),
    })
}

pub use anthropic::AnthropicProvider;
pub use azure::AzureProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
