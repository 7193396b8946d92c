//! LLM gateway library
//!
//! One chat endpoint in front of several model providers, with optional web
//! search augmentation and per-call telemetry.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod search;
pub mod services;
pub mod utils;

// Re-export common types
pub use config::{ModelRegistry, Settings};
pub use handlers::{create_router, router_from_state, AppState};
pub use services::Dispatcher;
pub use utils::error::{AppError, AppResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
