//! Streaming adapter
//!
//! Turns a provider chunk stream into the gateway's event sequence:
//! zero or more `Content` events followed by exactly one terminal event,
//! `Done` on success or `Error` on failure, never both.

use super::telemetry::{CallOutcome, Telemetry};
use crate::models::openai::OpenAIStreamResponse;
use crate::providers::BoxStream;
use crate::utils::error::AppError;
use axum::response::sse::Event;
use serde_json::json;
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Channel capacity between the provider task and the HTTP response
const STREAM_BUFFER: usize = 64;

/// Terminal payload of a successful stream
pub const DONE_MARKER: &str = "[DONE]";

/// One event of a normalized stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Non-empty text fragment
    Content(String),
    /// Successful end of stream
    Done,
    /// Failed end of stream, message already sanitized
    Error(String),
}

impl StreamEvent {
    /// Payload of the `data:` field
    pub fn data(&self) -> String {
        match self {
            StreamEvent::Content(text) => json!({ "content": text }).to_string(),
            StreamEvent::Done => DONE_MARKER.to_string(),
            StreamEvent::Error(message) => json!({ "error": message }).to_string(),
        }
    }

    /// Full wire form, `data: <payload>` plus the blank line
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.data())
    }

    /// Convert into an axum SSE event
    pub fn into_sse_event(self) -> Event {
        Event::default().data(self.data())
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Content(_))
    }
}

/// How a stream ended
enum Termination {
    Completed,
    Failed(String),
    Disconnected,
}

/// Identity of the call a stream belongs to, for telemetry
#[derive(Debug, Clone)]
pub struct StreamLabel {
    /// Display name of the model
    pub provider: String,
    /// Registry key
    pub model_key: String,
}

/// Drives provider streams on background tasks
#[derive(Debug, Clone)]
pub struct StreamingAdapter {
    telemetry: Telemetry,
}

impl StreamingAdapter {
    /// Create an adapter recording into `telemetry`
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }

    /// Spawn a task that opens the provider stream and forwards its fragments
    ///
    /// `open` is awaited inside the task, so connection failures surface as an
    /// `Error` event. Dropping the returned receiver cancels the upstream call.
    pub fn spawn<F>(&self, label: StreamLabel, open: F) -> ReceiverStream<StreamEvent>
    where
        F: Future<Output = anyhow::Result<BoxStream<'static, OpenAIStreamResponse>>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let telemetry = self.telemetry.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let termination = forward(&label, open, &tx).await;
            let elapsed = started.elapsed();

            let outcome = match termination {
                Termination::Completed => {
                    if tx.send(StreamEvent::Done).await.is_err() {
                        debug!("Client went away before the end marker");
                    }
                    CallOutcome::success(&label.provider, &label.model_key, elapsed)
                }
                Termination::Failed(message) => {
                    let outcome = CallOutcome::failure(&label.provider, &label.model_key, elapsed, message.clone());
                    let _ = tx.send(StreamEvent::Error(message)).await;
                    outcome
                }
                Termination::Disconnected => {
                    info!("Client disconnected from stream of {}", label.model_key);
                    CallOutcome::failure(&label.provider, &label.model_key, elapsed, "client disconnected")
                }
            };

            telemetry.record(outcome);
        });

        ReceiverStream::new(rx)
    }
}

/// Pump fragments until the provider ends, fails or the client leaves
async fn forward<F>(label: &StreamLabel, open: F, tx: &mpsc::Sender<StreamEvent>) -> Termination
where
    F: Future<Output = anyhow::Result<BoxStream<'static, OpenAIStreamResponse>>>,
{
    let opened = tokio::select! {
        _ = tx.closed() => return Termination::Disconnected,
        opened = open => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => return Termination::Failed(AppError::provider_failed(&label.provider, e).user_message()),
    };

    loop {
        let item = tokio::select! {
            _ = tx.closed() => return Termination::Disconnected,
            item = stream.next() => item,
        };

        match item {
            None => return Termination::Completed,
            Some(Ok(chunk)) => {
                // Role markers, filter results and finish chunks carry no text
                let Some(text) = chunk.delta_text() else { continue };
                if tx.send(StreamEvent::Content(text.to_string())).await.is_err() {
                    return Termination::Disconnected;
                }
            }
            Some(Err(e)) => {
                warn!("Stream from {} failed: {:#}", label.provider, e);
                return Termination::Failed(AppError::provider_failed(&label.provider, e).user_message());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::telemetry::MemorySink;
    use std::sync::Arc;

    fn label() -> StreamLabel {
        StreamLabel {
            provider: "Test Model".to_string(),
            model_key: "test".to_string(),
        }
    }

    fn chunks(items: Vec<anyhow::Result<Option<&'static str>>>) -> BoxStream<'static, OpenAIStreamResponse> {
        Box::pin(tokio_stream::iter(items.into_iter().map(|item| {
            item.map(|text| OpenAIStreamResponse::from_delta("m", text.map(str::to_string), None))
        })))
    }

    #[test]
    fn test_event_encoding() {
        assert_eq!(StreamEvent::Content("Hel".to_string()).encode(), "data: {\"content\":\"Hel\"}\n\n");
        assert_eq!(StreamEvent::Done.encode(), "data: [DONE]\n\n");
        assert_eq!(StreamEvent::Error("boom".to_string()).encode(), "data: {\"error\":\"boom\"}\n\n");
        assert!(StreamEvent::Done.is_terminal());
        assert!(!StreamEvent::Content(String::new()).is_terminal());
    }

    #[tokio::test]
    async fn test_skips_empty_deltas() {
        let sink = Arc::new(MemorySink::new());
        let adapter = StreamingAdapter::new(Telemetry::default().with_sink(sink.clone()));

        let stream = chunks(vec![Ok(None), Ok(Some("Hel")), Ok(Some("")), Ok(Some("lo"))]);
        let events: Vec<StreamEvent> = adapter.spawn(label(), async move { Ok(stream) }).collect().await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Content("Hel".to_string()),
                StreamEvent::Content("lo".to_string()),
                StreamEvent::Done
            ]
        );

        // The sender is dropped only after the outcome is written
        let outcomes = sink.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
    }

    #[tokio::test]
    async fn test_open_failure_is_single_error_event() {
        let adapter = StreamingAdapter::new(Telemetry::default());
        let events: Vec<StreamEvent> = adapter
            .spawn(label(), async { Err(anyhow::anyhow!("connection refused")) })
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(message) => assert!(message.contains("connection refused")),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
