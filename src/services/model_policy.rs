//! Model selection policies
//!
//! Picks the model for auxiliary calls and for requests that name none.

use crate::config::ModelDescriptor;
use crate::utils::error::{AppError, AppResult};

/// Key fragments of cheap, fast models, most preferred first
pub const LIGHTWEIGHT_PRIORITY: &[&str] = &["gpt-4o-mini", "gpt-3.5-turbo", "qwen"];

/// Key fragment of the preferred general-purpose model
pub const FLAGSHIP_MODEL: &str = "gpt-4o";

/// Default model: the flagship (any case) when enabled, else the first model in registry order
pub fn choose_default_model(available: &[&ModelDescriptor]) -> AppResult<String> {
    available
        .iter()
        .find(|model| model.key.to_lowercase().contains(FLAGSHIP_MODEL))
        .or_else(|| available.first())
        .map(|model| model.key.clone())
        .ok_or(AppError::NoModelAvailable)
}

/// Model for keyword extraction
///
/// Walks the priority list in order and returns the first model whose key
/// contains the entry, ignoring case; falls back to the default model.
pub fn choose_lightweight_model(available: &[&ModelDescriptor]) -> AppResult<String> {
    for preferred in LIGHTWEIGHT_PRIORITY {
        if let Some(model) = available
            .iter()
            .find(|model| model.key.to_lowercase().contains(preferred))
        {
            return Ok(model.key.clone());
        }
    }

    choose_default_model(available)
}
