//! Azure OpenAI Provider implementation
//!
//! Deployment-scoped chat-completions with an `api-key` header and a pinned API version

use super::openai::decode_chunk;
use super::{http_client, sse, upstream_error, BoxStream, Provider, ProviderCall};
use crate::models::openai::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tokio_stream::StreamExt;
use tracing::debug;

/// Azure OpenAI Provider
pub struct AzureProvider {
    client: Client,
}

impl AzureProvider {
    /// Create a new Azure provider
    pub fn new() -> Result<Self> {
        Ok(Self { client: http_client()? })
    }

    /// Deployment URL; the resource endpoint has no sensible default
    fn build_url(&self, call: &ProviderCall) -> Result<String> {
        let base_url = call
            .base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/'))
            .filter(|base| !base.is_empty())
            .context("Azure endpoint is not configured (set AZURE_API_BASE)")?;

        Ok(format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            base_url, call.model, call.api_version
        ))
    }

    /// Build the request body; the deployment is named in the URL
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
impl Provider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn chat_complete(&self, call: &ProviderCall) -> Result<OpenAIResponse> {
        debug!("Sending Azure chat completion request for deployment {}", call.model);

        let response = self
            .client
            .post(self.build_url(call)?)
            .header("api-key", call.api_key())
            .timeout(call.timeout)
            .json(&Self::build_request(call, false))
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(upstream_error("Azure", response).await);
        }

        response.json().await.context("Failed to parse Azure response")
    }

    async fn chat_stream(&self, call: &ProviderCall) -> Result<BoxStream<'static, OpenAIStreamResponse>> {
        debug!("Sending Azure streaming request for deployment {}", call.model);

        let response = self
            .client
            .post(self.build_url(call)?)
            .header("api-key", call.api_key())
            .header("Accept", "text/event-stream")
            .timeout(call.timeout)
            .json(&Self::build_request(call, true))
            .send()
            .await
            .context("Failed to send streaming request")?;

        if !response.status().is_success() {
            return Err(upstream_error("Azure", response).await);
        }

        // Content-filter chunks arrive with an empty choice list and are dropped downstream
        let stream = sse::sse_data(response.bytes_stream()).filter_map(|data| match data {
            Ok(data) => decode_chunk("Azure", &data),
            Err(e) => Some(Err(e)),
        });

        Ok(Box::pin(stream))
    }
}
