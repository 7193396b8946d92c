//! Ollama Provider implementation
//!
//! Native `/api/chat` protocol. Streaming responses are newline-delimited JSON
//! rather than server-sent events, and the credential is optional.

use super::{http_client, sse, upstream_error, BoxStream, Provider, ProviderCall};
use crate::models::openai::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Default local Ollama server
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// One response object; streaming sends many with `done: false` then a final one
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

impl OllamaChatResponse {
    fn usage(&self) -> Option<OpenAIUsage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        let prompt_tokens = self.prompt_eval_count.unwrap_or(0);
        let completion_tokens = self.eval_count.unwrap_or(0);
        Some(OpenAIUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        })
    }
}

/// Ollama Provider
pub struct OllamaProvider {
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new() -> Result<Self> {
        Ok(Self { client: http_client()? })
    }

    fn build_url(&self, call: &ProviderCall) -> String {
        format!("{}/api/chat", call.base_url_or(OLLAMA_BASE_URL))
    }

    /// Keyless by default; a configured key is forwarded for authenticating proxies
    fn post(&self, call: &ProviderCall) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.build_url(call)).timeout(call.timeout);
        match call.api_key.as_deref() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Convert OpenAI-shaped turns; inline images travel as bare base64
    fn build_request(call: &ProviderCall, stream: bool) -> OllamaChatRequest {
        let messages = call
            .messages
            .iter()
            .map(|message| {
                let images = message
                    .content
                    .as_ref()
                    .map(|content| {
                        content
                            .image_urls()
                            .into_iter()
                            .filter_map(|url| match url.split_once(";base64,") {
                                Some((_, data)) => Some(data.to_string()),
                                None => {
                                    warn!("Ollama only accepts inline images, dropping {}", url);
                                    None
                                }
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                OllamaMessage {
                    role: message.role.clone(),
                    content: message.text_content(),
                    images,
                }
            })
            .collect();

        OllamaChatRequest {
            model: call.model.clone(),
            messages,
            stream,
            options: OllamaOptions {
                temperature: call.temperature,
                num_predict: call.max_tokens,
            },
        }
    }

    fn to_chunk(response: OllamaChatResponse) -> Result<OpenAIStreamResponse> {
        if let Some(error) = response.error {
            anyhow::bail!("Ollama error: {}", error);
        }
        let text = response.message.map(|m| m.content);
        let finish_reason = response.done.then(|| "stop".to_string());
        Ok(OpenAIStreamResponse::from_delta(&response.model, text, finish_reason))
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat_complete(&self, call: &ProviderCall) -> Result<OpenAIResponse> {
        debug!("Sending Ollama chat request for {}", call.model);

        let response = self
            .post(call)
            .json(&Self::build_request(call, false))
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(upstream_error("Ollama", response).await);
        }

        let body: OllamaChatResponse = response.json().await.context("Failed to parse Ollama response")?;
        if let Some(error) = body.error {
            anyhow::bail!("Ollama error: {}", error);
        }

        let usage = body.usage();
        let model = if body.model.is_empty() { call.model.clone() } else { body.model };
        match body.message {
            Some(message) => Ok(OpenAIResponse::from_text(&model, message.content, usage)),
            None => {
                let mut empty = OpenAIResponse::from_text(&model, String::new(), usage);
                empty.choices.clear();
                Ok(empty)
            }
        }
    }

    async fn chat_stream(&self, call: &ProviderCall) -> Result<BoxStream<'static, OpenAIStreamResponse>> {
        debug!("Sending Ollama streaming request for {}", call.model);

        let response = self
            .post(call)
            .json(&Self::build_request(call, true))
            .send()
            .await
            .context("Failed to send streaming request")?;

        if !response.status().is_success() {
            return Err(upstream_error("Ollama", response).await);
        }

        let stream = sse::ndjson(response.bytes_stream()).filter_map(|line| match line {
            Ok(line) => sse::parse_json::<OllamaChatResponse>(&line).map(Self::to_chunk),
            Err(e) => Some(Err(e)),
        });

        Ok(Box::pin(stream))
    }
}
