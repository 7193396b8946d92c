//! LLM gateway server

use anyhow::{bail, Context, Result};
use llmgate::config::{EnvCredentials, Settings};
use llmgate::handlers::{health::get_uptime_seconds, router_from_state, AppState};
use llmgate::utils::logging::init_logging;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("Failed to load server settings")?;

    init_logging(&settings.logging)?;
    get_uptime_seconds();
    info!("{}", llmgate::version_info());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::build(settings, Arc::new(EnvCredentials))?;

    let enabled = state.dispatcher.available_models();
    if enabled.is_empty() {
        bail!("No model is enabled; configure at least one provider API key");
    }
    for model in &enabled {
        info!("Model available: {} ({})", model.key, model.display_name);
    }

    let app = router_from_state(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server started on http://{}", addr);
    info!("Chat endpoint: http://{}/chat", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    Ok(())
}
