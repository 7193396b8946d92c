//! Service layer module
//!
//! Dispatch, streaming, model selection, telemetry and retry

pub mod dispatcher;
pub mod model_policy;
pub mod retry;
pub mod streaming;
pub mod telemetry;

pub use dispatcher::{Dispatcher, ResolvedModel};
pub use model_policy::{choose_default_model, choose_lightweight_model};
pub use retry::{retry_with_backoff, RetryConfig};
pub use streaming::{StreamEvent, StreamLabel, StreamingAdapter};
pub use telemetry::{CallOutcome, JsonlFileSink, MemorySink, Telemetry, TelemetrySink, TracingSink};
