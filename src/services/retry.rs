//! Opt-in retry with exponential backoff
//!
//! Nothing in the dispatch path retries on its own; callers wrap idempotent
//! read-like operations explicitly.

use crate::config::settings::RetrySettings;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum retry attempts after the first try
    pub max_retries: u32,
    /// Base delay time (milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay time (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
        }
    }
}

impl RetryConfig {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = std::cmp::min(self.base_delay_ms.saturating_mul(factor), self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Run `operation` until it succeeds or the attempts are exhausted
///
/// Returns the last error when every attempt fails.
pub async fn retry_with_backoff<T, E, F, Fut>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                warn!(
                    "{} failed: {}, retrying after {}ms (attempt {}/{})",
                    label,
                    e,
                    delay.as_millis(),
                    attempt + 1,
                    config.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
