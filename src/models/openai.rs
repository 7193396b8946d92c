//! OpenAI API data models
//!
//! The chat-completions shapes every provider is normalized into

use serde::{Deserialize, Serialize};

/// OpenAI API request structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAIRequest {
    /// Model name
    pub model: String,
    /// Message list
    pub messages: Vec<OpenAIMessage>,
    /// Maximum tokens to generate (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Temperature parameter (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Whether to stream response (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// OpenAI message structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role (system/user/assistant)
    pub role: String,
    /// Message content
    #[serde(default)]
    pub content: Option<OpenAIContent>,
    /// Name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// OpenAI message content (can be string or content array)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OpenAIContent {
    /// Simple text content
    Text(String),
    /// Content array (supports multimodal)
    Array(Vec<OpenAIContentPart>),
}

/// OpenAI content part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OpenAIContentPart {
    /// Text part
    #[serde(rename = "text")]
    Text { text: String },
    /// Image URL part
    #[serde(rename = "image_url")]
    ImageUrl { image_url: OpenAIImageUrl },
}

/// OpenAI image URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIImageUrl {
    /// Image URL or data URL
    pub url: String,
    /// Detail level (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// OpenAI API response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIResponse {
    /// Response ID
    #[serde(default)]
    pub id: String,
    /// Object type
    #[serde(default)]
    pub object: String,
    /// Creation timestamp
    #[serde(default)]
    pub created: u64,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Choice list
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    /// Usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAIUsage>,
}

/// OpenAI choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Message content
    pub message: OpenAIMessage,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAIUsage {
    /// Prompt token count
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion token count
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total token count
    #[serde(default)]
    pub total_tokens: u32,
}

/// OpenAI streaming response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIStreamResponse {
    /// Response ID
    #[serde(default)]
    pub id: String,
    /// Object type
    #[serde(default)]
    pub object: String,
    /// Creation timestamp
    #[serde(default)]
    pub created: u64,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Choice list (Azure sends content-filter chunks with none)
    #[serde(default)]
    pub choices: Vec<OpenAIStreamChoice>,
    /// In-band failure; vendors send either an error object or a bare string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// OpenAI streaming choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIStreamChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Delta content
    #[serde(default)]
    pub delta: OpenAIStreamDelta,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI streaming delta
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAIStreamDelta {
    /// Role (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// OpenAI error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIErrorResponse {
    /// Error information
    pub error: OpenAIError,
}

/// OpenAI error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIError {
    /// Error message
    pub message: String,
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error code (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<serde_json::Value>,
}

impl OpenAIMessage {
    /// Message with the given role and plain text
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(OpenAIContent::Text(text.into())),
            name: None,
        }
    }

    /// User message with plain text
    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    /// User message mixing text with image references
    pub fn user_with_images(text: impl Into<String>, image_urls: &[String]) -> Self {
        if image_urls.is_empty() {
            return Self::user(text);
        }

        let mut parts = vec![OpenAIContentPart::Text { text: text.into() }];
        parts.extend(image_urls.iter().map(|url| OpenAIContentPart::ImageUrl {
            image_url: OpenAIImageUrl { url: url.clone(), detail: None },
        }));

        Self {
            role: "user".to_string(),
            content: Some(OpenAIContent::Array(parts)),
            name: None,
        }
    }

    /// Text of the message, empty when absent
    pub fn text_content(&self) -> String {
        self.content.as_ref().map(|c| c.extract_text()).unwrap_or_default()
    }
}

impl OpenAIContent {
    /// Extract text content
    pub fn extract_text(&self) -> String {
        match self {
            OpenAIContent::Text(text) => text.clone(),
            OpenAIContent::Array(parts) => {
                parts
                    .iter()
                    .filter_map(|part| match part {
                        OpenAIContentPart::Text { text } => Some(text.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            }
        }
    }

    /// Check if contains images
    pub fn has_images(&self) -> bool {
        match self {
            OpenAIContent::Text(_) => false,
            OpenAIContent::Array(parts) => {
                parts.iter().any(|part| matches!(part, OpenAIContentPart::ImageUrl { .. }))
            }
        }
    }

    /// Image URLs in order of appearance
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            OpenAIContent::Text(_) => Vec::new(),
            OpenAIContent::Array(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    OpenAIContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

impl OpenAIResponse {
    /// Single-choice response carrying `text`, used when normalizing other protocols
    pub fn from_text(model: &str, text: String, usage: Option<OpenAIUsage>) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp().max(0) as u64,
            model: model.to_string(),
            choices: vec![OpenAIChoice {
                index: 0,
                message: OpenAIMessage::text("assistant", text),
                finish_reason: Some("stop".to_string()),
            }],
            usage,
        }
    }
}

impl OpenAIStreamResponse {
    /// Single-choice chunk carrying a text delta
    pub fn from_delta(model: &str, text: Option<String>, finish_reason: Option<String>) -> Self {
        Self {
            id: String::new(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: model.to_string(),
            choices: vec![OpenAIStreamChoice {
                index: 0,
                delta: OpenAIStreamDelta { role: None, content: text },
                finish_reason,
            }],
            error: None,
        }
    }

    /// Message of an in-band error frame
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(message) => Some(message.clone()),
            serde_json::Value::Object(fields) => Some(match fields.get("message") {
                Some(serde_json::Value::String(message)) => message.clone(),
                _ => serde_json::Value::Object(fields.clone()).to_string(),
            }),
            other => Some(other.to_string()),
        }
    }

    /// Non-empty text delta of the first choice
    pub fn delta_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|text| !text.is_empty())
    }
}
