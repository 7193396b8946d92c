//! Error handling module
//!
//! Defines the error taxonomy of the dispatch path and its HTTP mapping

use crate::utils::redact::sanitize_error_message;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Requested model key is not in the registry
    #[error("Unsupported model: {0}")]
    UnknownModel(String),

    /// Model is known but its credential is absent
    #[error("Model {model} has no API key configured (set {env_key})")]
    MissingCredential {
        /// Display name of the model
        model: String,
        /// Name of the credential the model needs
        env_key: String,
    },

    /// Provider answered with zero choices
    #[error("Model returned an empty response")]
    EmptyResponse,

    /// Transport or provider-side failure, message already sanitized
    #[error("Request to {provider} failed: {message}")]
    ProviderCallFailed {
        /// Display name of the provider
        provider: String,
        /// Sanitized upstream message
        message: String,
    },

    /// Registry has no enabled model at all
    #[error("No model is available")]
    NoModelAvailable,

    /// Request validation failed
    #[error("Request validation failed: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error body returned by the chat endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message
    pub error: String,
}

impl AppError {
    /// Wrap an upstream failure, redacting credential-shaped substrings
    pub fn provider_failed(provider: impl Into<String>, error: impl std::fmt::Display) -> Self {
        AppError::ProviderCallFailed {
            provider: provider.into(),
            message: sanitize_error_message(&format!("{:#}", error)),
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnknownModel(_)
            | AppError::MissingCredential { .. }
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoModelAvailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EmptyResponse
            | AppError::ProviderCallFailed { .. }
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::UnknownModel(_) => "unknown_model",
            AppError::MissingCredential { .. } => "missing_credential",
            AppError::EmptyResponse => "empty_response",
            AppError::ProviderCallFailed { .. } => "provider_error",
            AppError::NoModelAvailable => "no_model_available",
            AppError::Validation(_) => "invalid_request_error",
            AppError::Config(_) | AppError::Internal(_) => "api_error",
        }
    }

    /// Whether the error was caused by the caller rather than the gateway or upstream
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message safe to show to users and to write to logs
    pub fn user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Convert to the JSON error body
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.user_message(),
        }
    }
}

/// Implement IntoResponse trait to allow errors to be returned directly as HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.is_client_error() {
            tracing::warn!("Client error [{}]: {} - Status code: {}", self.error_type(), self.user_message(), status);
        } else {
            tracing::error!("Application error [{}]: {} - Status code: {}", self.error_type(), self.user_message(), status);
        }

        (status, Json(self.to_error_response())).into_response()
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;
