//! HTTP handlers module
//!
//! Contains all HTTP endpoint handling logic

pub mod chat;
pub mod health;
pub mod index;

use crate::config::{CredentialProvider, ModelRegistry, Settings};
use crate::middleware::request_logging_middleware;
use crate::search::{LlmKeywordExtractor, SearchBackends, SearchPipeline};
use crate::services::{Dispatcher, RetryConfig, Telemetry};
use anyhow::{Context, Result};
use axum::{middleware, routing::get, routing::post, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub dispatcher: Arc<Dispatcher>,
    pub search: Arc<SearchPipeline>,
}

impl AppState {
    /// Assemble the gateway from settings and a credential source
    pub fn build(settings: Settings, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let registry = ModelRegistry::load_default(&settings).context("Failed to load model registry")?;
        info!("Model registry loaded: {} models", registry.len());

        let telemetry = Telemetry::from_settings(&settings).context("Failed to set up telemetry")?;
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::new(registry), credentials, &settings, telemetry)
                .context("Failed to create provider dispatcher")?,
        );

        let search = SearchPipeline::new(
            Arc::new(LlmKeywordExtractor::new(dispatcher.clone())),
            SearchBackends::from_settings(&settings),
            settings.search.max_results,
            RetryConfig::from(&settings.retry),
        );

        Ok(Self {
            settings,
            dispatcher,
            search: Arc::new(search),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("dispatcher", &self.dispatcher)
            .field("search", self.search.backends())
            .finish()
    }
}

/// Create application router with freshly built state
pub fn create_router(settings: Settings, credentials: Arc<dyn CredentialProvider>) -> Result<Router> {
    let state = AppState::build(settings, credentials)?;
    Ok(router_from_state(Arc::new(state)))
}

/// Create application router around prepared state
pub fn router_from_state(state: Arc<AppState>) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(middleware::from_fn(request_logging_middleware));

    Router::new()
        .route("/", get(index::list_models))
        .route("/chat", post(chat::handle_chat))
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .with_state(state)
        .layer(middleware_stack)
}
