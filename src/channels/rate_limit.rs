//! Client-side throttle for outbound channel calls.
//!
//! Telegram rejects bursts to the same chat with HTTP 429. A sliding window
//! in front of the gateway turns most of those into a local
//! [`DeliveryError::RateLimited`] with an accurate wait, before any request
//! is made.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DeliveryError;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter over the last minute of sends.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_messages_per_minute: u32,
    window: VecDeque<Instant>,
}

impl RateLimiter {
    /// `0` disables limiting.
    #[must_use]
    pub fn new(max_messages_per_minute: u32) -> Self {
        Self {
            max_messages_per_minute,
            window: VecDeque::new(),
        }
    }

    /// Record a send, or report how long to wait before one is allowed.
    pub fn try_send(&mut self) -> Result<(), DeliveryError> {
        if self.max_messages_per_minute == 0 {
            return Ok(());
        }

        let now = Instant::now();
        while let Some(&first) = self.window.front() {
            if now.duration_since(first) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }

        if self.window.len() >= self.max_messages_per_minute as usize
            && let Some(&oldest) = self.window.front()
        {
            let remaining = WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(DeliveryError::RateLimited {
                retry_after: Some(Duration::from_secs(remaining.as_secs().saturating_add(1))),
            });
        }

        self.window.push_back(now);
        Ok(())
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        if self.max_messages_per_minute == 0 {
            return u32::MAX;
        }
        self.max_messages_per_minute
            .saturating_sub(self.window.len() as u32)
    }
}
