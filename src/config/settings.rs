//! Application configuration settings
//!
//! Defines all configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::search::SearchEngine;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server configuration
    pub server: ServerConfig,
    /// Completion defaults
    pub completion: CompletionConfig,
    /// Provider endpoints and timeouts
    pub providers: ProviderEndpoints,
    /// Web search configuration
    pub search: SearchConfig,
    /// Retry helper configuration
    pub retry: RetrySettings,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Model registry file (optional)
    pub models_file: Option<PathBuf>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
}

/// Defaults applied when a caller leaves a parameter unset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Default token cap
    pub max_tokens: u32,
    /// Default sampling temperature
    pub temperature: f32,
}

/// Provider endpoints and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    /// Azure OpenAI resource endpoint
    pub azure_api_base: Option<String>,
    /// Pinned Azure API version
    pub azure_api_version: String,
    /// Baichuan OpenAI-compatible endpoint
    pub baichuan_base_url: Option<String>,
    /// Ollama server
    pub ollama_base_url: String,
    /// Non-streaming request timeout in seconds
    pub timeout: u64,
    /// Streaming request timeout in seconds
    pub stream_timeout: u64,
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Preferred backend
    pub default_engine: SearchEngine,
    /// Maximum number of deduplicated results
    pub max_results: usize,
    /// Backend HTTP timeout in seconds
    pub timeout: u64,
    /// Bing subscription key
    #[serde(skip_serializing)]
    pub bing_api_key: Option<String>,
    /// Aliyun access key id
    #[serde(skip_serializing)]
    pub aliyun_access_key_id: Option<String>,
    /// Aliyun access key secret
    #[serde(skip_serializing)]
    pub aliyun_access_key_secret: Option<String>,
    /// Aliyun IQS endpoint host
    pub aliyun_endpoint: String,
}

/// Retry helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum retry attempts after the first try
    pub max_retries: u32,
    /// Base delay in milliseconds
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds
    pub max_delay_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (text/json)
    pub format: String,
    /// JSON-lines telemetry file (optional)
    pub telemetry_log: Option<PathBuf>,
}

impl Settings {
    /// Create a new configuration instance from the process environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let settings = Self {
            server: ServerConfig {
                host: get_or("SERVER_HOST", "127.0.0.1"),
                port: parse(&get_or("SERVER_PORT", "5000"), "SERVER_PORT")?,
            },
            completion: CompletionConfig {
                max_tokens: parse(&get_or("MAX_TOKENS", "1000"), "MAX_TOKENS")?,
                temperature: parse(&get_or("TEMPERATURE", "0.7"), "TEMPERATURE")?,
            },
            providers: ProviderEndpoints {
                azure_api_base: get("AZURE_API_BASE"),
                azure_api_version: get_or("AZURE_API_VERSION", "2024-02-15-preview"),
                baichuan_base_url: get("BAICHUAN_BASE_URL"),
                ollama_base_url: get_or("OLLAMA_BASE_URL", "http://localhost:11434"),
                timeout: parse(&get_or("PROVIDER_TIMEOUT", "60"), "PROVIDER_TIMEOUT")?,
                stream_timeout: parse(
                    &get_or("PROVIDER_STREAM_TIMEOUT", "300"),
                    "PROVIDER_STREAM_TIMEOUT",
                )?,
            },
            search: SearchConfig {
                default_engine: get_or("DEFAULT_SEARCH_ENGINE", "bing")
                    .parse()
                    .context("Invalid DEFAULT_SEARCH_ENGINE")?,
                max_results: parse(&get_or("SEARCH_MAX_RESULTS", "5"), "SEARCH_MAX_RESULTS")?,
                timeout: parse(&get_or("SEARCH_TIMEOUT", "10"), "SEARCH_TIMEOUT")?,
                bing_api_key: get("BING_SEARCH_API_KEY"),
                aliyun_access_key_id: get("ALIYUN_ACCESS_KEY_ID"),
                aliyun_access_key_secret: get("ALIYUN_ACCESS_KEY_SECRET"),
                aliyun_endpoint: get_or("ALIYUN_IQS_ENDPOINT", "iqs.cn-zhangjiakou.aliyuncs.com"),
            },
            retry: RetrySettings {
                max_retries: parse(&get_or("RETRY_MAX_RETRIES", "2"), "RETRY_MAX_RETRIES")?,
                base_delay_ms: parse(&get_or("RETRY_BASE_DELAY_MS", "500"), "RETRY_BASE_DELAY_MS")?,
                max_delay_ms: parse(&get_or("RETRY_MAX_DELAY_MS", "5000"), "RETRY_MAX_DELAY_MS")?,
            },
            logging: LoggingConfig {
                level: get_or("RUST_LOG", "info"),
                format: get_or("LOG_FORMAT", "text"),
                telemetry_log: get("TELEMETRY_LOG").map(PathBuf::from),
            },
            models_file: get("MODELS_FILE").map(PathBuf::from),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration validity
    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Port number cannot be 0");
        }

        if self.completion.max_tokens == 0 {
            anyhow::bail!("MAX_TOKENS must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            anyhow::bail!("TEMPERATURE must be between 0.0 and 2.0");
        }

        if self.providers.timeout == 0 || self.providers.stream_timeout == 0 || self.search.timeout == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        if self.search.max_results == 0 {
            anyhow::bail!("SEARCH_MAX_RESULTS must be greater than 0");
        }

        if let Some(base) = &self.providers.azure_api_base {
            if !base.starts_with("http") {
                anyhow::bail!("Invalid AZURE_API_BASE format, should start with 'http'");
            }
        }

        if !self.providers.ollama_base_url.starts_with("http") {
            anyhow::bail!("Invalid OLLAMA_BASE_URL format, should start with 'http'");
        }

        // RUST_LOG may carry directives such as "llmgate=debug,tower_http=info"
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !self.logging.level.contains('=') && !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }

    /// Default timeout for non-streaming provider calls
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.timeout)
    }

    /// Default timeout for streaming provider calls
    pub fn provider_stream_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.stream_timeout)
    }

    /// Timeout for search backend calls
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout)
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", key, value))
}
