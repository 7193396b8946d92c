//! Gateway-level request and result types
//!
//! What the HTTP layer sends into the dispatcher and what comes back out

use serde::{Deserialize, Serialize};

use super::openai::{OpenAIMessage, OpenAIUsage};

/// Body of `POST /chat`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message
    #[serde(default)]
    pub message: String,
    /// Model key; the default model is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Stream the reply as server-sent events
    #[serde(default)]
    pub stream: bool,
    /// Augment the message with web search results first
    #[serde(default)]
    pub web_search: bool,
    /// Image data URLs or http(s) URLs for vision-capable models
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// Non-streaming reply of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    /// Generated text
    pub reply: String,
}

/// One completion call against a registry model
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Registry key of the model
    pub model_key: String,
    /// Ordered conversation turns, at least one
    pub messages: Vec<OpenAIMessage>,
    /// Token cap; configuration default when unset
    pub max_tokens: Option<u32>,
    /// Sampling temperature; configuration default when unset
    pub temperature: Option<f32>,
    /// Whether the caller wants fragments
    pub stream: bool,
}

impl CompletionRequest {
    /// Single user turn with defaults for everything else
    pub fn new(model_key: impl Into<String>, messages: Vec<OpenAIMessage>) -> Self {
        Self {
            model_key: model_key.into(),
            messages,
            max_tokens: None,
            temperature: None,
            stream: false,
        }
    }

    /// Set the token cap
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Mark the request as streaming
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Aggregated non-streaming result
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Text of the first choice
    pub content: String,
    /// Token usage when the provider reports it
    pub usage: Option<OpenAIUsage>,
}

impl Completion {
    /// Total tokens, zero when unknown
    pub fn usage_tokens(&self) -> u32 {
        self.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0)
    }
}
