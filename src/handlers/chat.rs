//! Chat handler
//!
//! `POST /chat`: validation, model resolution, optional web search
//! augmentation and dispatch as JSON or server-sent events.

use crate::handlers::AppState;
use crate::models::chat::{ChatReply, ChatRequest, CompletionRequest};
use crate::models::openai::OpenAIMessage;
use crate::utils::error::{AppError, AppResult};
use crate::utils::logging::create_request_log_summary;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Interval of SSE keep-alive comments
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Handle chat requests
///
/// POST /chat
pub async fn handle_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(chat) = body.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    if chat.message.trim().is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }

    let model_key = match chat.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(model) => model.to_string(),
        None => state.dispatcher.default_model_key()?,
    };

    // Fail on an unusable model before spending a search on it
    state.dispatcher.resolve(&model_key)?;

    let prompt = if chat.web_search {
        info!("Web search requested for model {}", model_key);
        let augmentation = state.search.augment(&chat.message).await;
        if augmentation.is_degraded() {
            debug!("Search degraded: {:?}", augmentation.degradations);
        }
        augmentation.prompt
    } else {
        chat.message
    };

    let mut request = CompletionRequest::new(model_key, vec![OpenAIMessage::user_with_images(prompt, &chat.images)]);
    if chat.stream {
        request = request.streaming();
    }

    if let Ok(summary) = serde_json::to_string_pretty(&create_request_log_summary(&request)) {
        debug!("Chat request:\n{}", summary);
    }

    if request.stream {
        let events = state
            .dispatcher
            .dispatch_stream(&request)?
            .map(|event| Ok::<Event, Infallible>(event.into_sse_event()));

        Ok(Sse::new(events)
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
            .into_response())
    } else {
        let completion = state.dispatcher.dispatch(&request).await?;
        debug!("Reply uses {} tokens", completion.usage_tokens());
        Ok(Json(ChatReply {
            reply: completion.content,
        })
        .into_response())
    }
}
