//! Anthropic Provider implementation
//!
//! Messages API: system turns move to a top-level field, streaming uses typed
//! server-sent events of which only text deltas carry content.

use super::{http_client, sse, upstream_error, BoxStream, Provider, ProviderCall};
use crate::models::openai::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tracing::debug;

/// Default Anthropic endpoint
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Pinned API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Streaming event, only the fields the gateway reads
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// Anthropic Provider
pub struct AnthropicProvider {
    client: Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new() -> Result<Self> {
        Ok(Self { client: http_client()? })
    }

    fn build_url(&self, call: &ProviderCall) -> String {
        format!("{}/v1/messages", call.base_url_or(ANTHROPIC_BASE_URL))
    }

    fn build_request(call: &ProviderCall, stream: bool) -> MessagesRequest {
        let mut system = Vec::new();
        let mut messages = Vec::new();

        for message in &call.messages {
            if message.role == "system" {
                system.push(message.text_content());
                continue;
            }
            messages.push(json!({
                "role": message.role,
                "content": Self::convert_content(message),
            }));
        }

        MessagesRequest {
            model: call.model.clone(),
            max_tokens: call.max_tokens,
            temperature: call.temperature,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            stream,
        }
    }

    /// Text stays a string; mixed content becomes text and image blocks
    fn convert_content(message: &OpenAIMessage) -> Value {
        let Some(OpenAIContent::Array(parts)) = &message.content else {
            return Value::String(message.text_content());
        };

        let blocks: Vec<Value> = parts
            .iter()
            .filter_map(|part| match part {
                OpenAIContentPart::Text { text } => Some(json!({"type": "text", "text": text})),
                OpenAIContentPart::ImageUrl { image_url } => {
                    let url = image_url.url.as_str();
                    let source = match url.strip_prefix("data:").and_then(|rest| rest.split_once(";base64,")) {
                        Some((media_type, data)) => json!({"type": "base64", "media_type": media_type, "data": data}),
                        None => json!({"type": "url", "url": url}),
                    };
                    Some(json!({"type": "image", "source": source}))
                }
            })
            .collect();

        Value::Array(blocks)
    }

    fn to_openai_response(response: MessagesResponse) -> OpenAIResponse {
        let text: String = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        let usage = response.usage.map(|u| OpenAIUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        let mut openai_response = OpenAIResponse::from_text(&response.model, text, usage);
        if response.content.is_empty() {
            openai_response.choices.clear();
        }
        if !response.id.is_empty() {
            openai_response.id = response.id;
        }
        if let Some(choice) = openai_response.choices.first_mut() {
            choice.finish_reason = response.stop_reason;
        }
        openai_response
    }

    /// Map one streaming event; `None` for events without text
    fn to_chunk(model: &str, event: StreamEvent) -> Option<Result<OpenAIStreamResponse>> {
        match event.event_type.as_str() {
            "content_block_delta" => {
                let delta = event.delta?;
                if delta.delta_type.as_deref() != Some("text_delta") {
                    return None;
                }
                Some(Ok(OpenAIStreamResponse::from_delta(model, delta.text, None)))
            }
            "message_delta" => {
                let stop_reason = event.delta.and_then(|d| d.stop_reason)?;
                Some(Ok(OpenAIStreamResponse::from_delta(model, None, Some(stop_reason))))
            }
            "error" => {
                let message = event.error.map(|e| e.message).unwrap_or_default();
                Some(Err(anyhow::anyhow!("Anthropic stream error: {}", message)))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat_complete(&self, call: &ProviderCall) -> Result<OpenAIResponse> {
        debug!("Sending Anthropic messages request for {}", call.model);

        let response = self
            .client
            .post(self.build_url(call))
            .header("x-api-key", call.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(call.timeout)
            .json(&Self::build_request(call, false))
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(upstream_error("Anthropic", response).await);
        }

        let body: MessagesResponse = response.json().await.context("Failed to parse Anthropic response")?;
        Ok(Self::to_openai_response(body))
    }

    async fn chat_stream(&self, call: &ProviderCall) -> Result<BoxStream<'static, OpenAIStreamResponse>> {
        debug!("Sending Anthropic streaming request for {}", call.model);

        let response = self
            .client
            .post(self.build_url(call))
            .header("x-api-key", call.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Accept", "text/event-stream")
            .timeout(call.timeout)
            .json(&Self::build_request(call, true))
            .send()
            .await
            .context("Failed to send streaming request")?;

        if !response.status().is_success() {
            return Err(upstream_error("Anthropic", response).await);
        }

        let model = call.model.clone();
        let stream = sse::sse_data(response.bytes_stream()).filter_map(move |data| match data {
            Ok(data) => sse::parse_json::<StreamEvent>(&data).and_then(|event| Self::to_chunk(&model, event)),
            Err(e) => Some(Err(e)),
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn call(messages: Vec<OpenAIMessage>) -> ProviderCall {
        ProviderCall {
            model: "claude-3-sonnet-20240229".to_string(),
            messages,
            max_tokens: 1000,
            temperature: 0.7,
            base_url: None,
            api_key: Some("sk-ant-test".to_string()),
            api_version: String::new(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_system_turns_are_hoisted() {
        let request = AnthropicProvider::build_request(
            &call(vec![OpenAIMessage::text("system", "Be brief."), OpenAIMessage::user("hi")]),
            false,
        );
        assert_eq!(request.system.as_deref(), Some("Be brief."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0]["content"], "hi");

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn test_image_blocks() {
        let message = OpenAIMessage::user_with_images("what is this", &["data:image/jpeg;base64,/9j/4AAQ".to_string()]);
        let content = AnthropicProvider::convert_content(&message);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["source"]["data"], "/9j/4AAQ");
    }

    #[test]
    fn test_response_conversion() {
        let body: MessagesResponse = serde_json::from_str(
            r#"{"id":"msg_1","model":"claude-3-sonnet-20240229","content":[{"type":"text","text":"Hello"}],"stop_reason":"end_turn","usage":{"input_tokens":5,"output_tokens":2}}"#,
        )
        .unwrap();
        let response = AnthropicProvider::to_openai_response(body);
        assert_eq!(response.id, "msg_1");
        assert_eq!(response.choices[0].message.text_content(), "Hello");
        assert_eq!(response.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn test_stream_event_mapping() {
        let delta: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        )
        .unwrap();
        let chunk = AnthropicProvider::to_chunk("m", delta).unwrap().unwrap();
        assert_eq!(chunk.delta_text(), Some("Hi"));

        let ping: StreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(AnthropicProvider::to_chunk("m", ping).is_none());

        let error: StreamEvent =
            serde_json::from_str(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#).unwrap();
        assert!(AnthropicProvider::to_chunk("m", error).unwrap().is_err());
    }
}
