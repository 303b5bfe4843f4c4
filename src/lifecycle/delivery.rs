//! Task delivery with bounded retries.

use std::time::Duration;

use tracing::warn;

use crate::channels::{DeliveryGateway, MessageHandle, SendOptions};
use crate::config::DeliveryConfig;
use crate::error::{DeliveryError, Result, TaskError};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Used when a rate-limit error carries no hint.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            default_retry_after: config.default_retry_after(),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `error`.
    #[must_use]
    pub fn backoff_for(&self, error: &DeliveryError) -> Duration {
        match error {
            DeliveryError::RateLimited { retry_after } => {
                retry_after.unwrap_or(self.default_retry_after)
            }
            DeliveryError::Failed(_) => self.retry_delay,
        }
    }
}

/// Send `text` for `task_id`, retrying per `policy`.
///
/// Rate-limited attempts count against the budget like any other failure.
/// No wait follows the final attempt.
pub async fn send_with_retry(
    gateway: &dyn DeliveryGateway,
    channel: &str,
    task_id: &str,
    text: &str,
    options: &SendOptions,
    policy: &RetryPolicy,
) -> Result<MessageHandle> {
    let mut attempt = 1;
    loop {
        match gateway.send(channel, text, options).await {
            Ok(handle) => return Ok(handle),
            Err(error) if attempt >= policy.max_attempts => {
                return Err(TaskError::RetriesExhausted {
                    task_id: task_id.to_owned(),
                    attempts: attempt,
                    last_error: error,
                });
            }
            Err(error) => {
                let wait = policy.backoff_for(&error);
                warn!(
                    task_id,
                    attempt,
                    max_attempts = policy.max_attempts,
                    wait_secs = wait.as_secs(),
                    error = %error,
                    "task delivery failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
