//! Logging utilities
//!
//! Subscriber setup and helpers for keeping request logs short

use crate::config::settings::LoggingConfig;
use crate::models::chat::CompletionRequest;
use crate::models::openai::{OpenAIContent, OpenAIMessage};
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Set to true to log full message content in debug request summaries
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Install the global tracing subscriber
///
/// `json` selects structured output, anything else the human-readable format.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).with_context(|| format!("Invalid log filter: {}", config.level))?;

    let result = if config.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .try_init()
    };

    result.map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Truncate a string with a note about original length
pub fn truncate_content(s: &str, max_chars: usize) -> String {
    let total = s.chars().count();
    if total > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}... ({} chars truncated)", head, total - max_chars)
    } else {
        s.to_string()
    }
}

fn filter_message(msg: &OpenAIMessage) -> serde_json::Value {
    let content = match &msg.content {
        Some(OpenAIContent::Text(t)) => {
            let max_len = if msg.role == "system" { 100 } else { 200 };
            serde_json::Value::String(truncate_content(t, max_len))
        }
        Some(content @ OpenAIContent::Array(parts)) => serde_json::json!({
            "text": truncate_content(&content.extract_text(), 200),
            "parts": parts.len(),
            "images": content.image_urls().len(),
        }),
        None => serde_json::Value::Null,
    };

    serde_json::json!({
        "role": msg.role,
        "content": content,
    })
}

/// Debug summary of a completion request with content truncated
pub fn create_request_log_summary(request: &CompletionRequest) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = if VERBOSE_REQUEST_LOGGING {
        request
            .messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null))
            .collect()
    } else {
        request.messages.iter().map(filter_message).collect()
    };

    serde_json::json!({
        "model": request.model_key,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
        "stream": request.stream,
        "messages": messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content_is_char_safe() {
        assert_eq!(truncate_content("short", 10), "short");
        assert_eq!(truncate_content("你好世界", 2), "你好... (2 chars truncated)");
    }

    #[test]
    fn test_request_summary() {
        let long = "x".repeat(500);
        let request = CompletionRequest::new(
            "qwq",
            vec![
                OpenAIMessage::text("system", "be brief"),
                OpenAIMessage::user_with_images(long, &["data:image/png;base64,AAAA".to_string()]),
            ],
        )
        .streaming();

        let summary = create_request_log_summary(&request);
        assert_eq!(summary["model"], "qwq");
        assert_eq!(summary["stream"], true);
        assert_eq!(summary["messages"][0]["content"], "be brief");
        assert_eq!(summary["messages"][1]["content"]["images"], 1);
        assert!(summary["messages"][1]["content"]["text"]
            .as_str()
            .unwrap()
            .contains("chars truncated"));
        assert!(!summary.to_string().contains("base64"));
    }
}
