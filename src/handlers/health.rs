//! Health check handlers
//!
//! Provides application health status check endpoints

use crate::handlers::AppState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Service name reported by health checks
pub const SERVICE_NAME: &str = "llmgate";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service name
    pub service: String,
    /// Version information
    pub version: String,
    /// Timestamp
    pub timestamp: String,
    /// Details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// Check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDetails {
    /// Number of models that can be dispatched now
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_models: Option<usize>,
    /// Search engine augmentation would use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_engine: Option<String>,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

fn response(status: &str, details: HealthDetails) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        details: Some(details),
    }
}

/// Basic health check
///
/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Executing health check");

    let enabled_models = state.dispatcher.available_models().len();
    let status = if enabled_models > 0 { "healthy" } else { "degraded" };

    Json(response(
        status,
        HealthDetails {
            enabled_models: Some(enabled_models),
            search_engine: state.search.backends().active_engine().map(|engine| engine.to_string()),
            uptime_seconds: get_uptime_seconds(),
        },
    ))
}

/// Liveness check
///
/// GET /health/live
/// Does not look at models or backends
pub async fn liveness_check() -> Json<HealthResponse> {
    debug!("Executing liveness check");

    Json(response(
        "alive",
        HealthDetails {
            enabled_models: None,
            search_engine: None,
            uptime_seconds: get_uptime_seconds(),
        },
    ))
}

/// Get service uptime in seconds
pub fn get_uptime_seconds() -> u64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START_TIME: OnceLock<Instant> = OnceLock::new();

    START_TIME.get_or_init(Instant::now).elapsed().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness_check() {
        let response = liveness_check().await.0;
        assert_eq!(response.status, "alive");
        assert_eq!(response.service, SERVICE_NAME);
        assert!(response.details.unwrap().enabled_models.is_none());
    }

    #[test]
    fn test_uptime_calculation() {
        let uptime1 = get_uptime_seconds();
        std::thread::sleep(std::time::Duration::from_millis(100));
        let uptime2 = get_uptime_seconds();
        assert!(uptime2 >= uptime1);
    }
}
