//! Reply payloads and the typing-then-send helper.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use hat_core::ChatOutbound;
use rand::Rng;

/// What a trigger wants posted back to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    File(PathBuf),
}

/// Jitter range applied between the typing indicator and the send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDelay {
    pub min: Duration,
    pub max: Duration,
}

impl Default for ReplyDelay {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_millis(2_000),
        }
    }
}

impl ReplyDelay {
    pub const NONE: Self = Self {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min: Duration::from_millis(min_ms),
            max: Duration::from_millis(max_ms),
        }
    }

    /// Uniform sample in `[min, max)`; collapses to `min` for an empty range.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..self.max)
    }
}

/// Shows the typing indicator, waits a jittered delay, then sends `reply`.
///
/// Only the final send can fail the call.
pub async fn send_with_typing_delay(
    outbound: &dyn ChatOutbound,
    channel_id: u64,
    reply: &Reply,
    delay: ReplyDelay,
) -> Result<()> {
    if let Err(error) = outbound.broadcast_typing(channel_id).await {
        tracing::debug!(channel_id, %error, "typing indicator failed");
    }
    let wait = delay.sample();
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }
    match reply {
        Reply::Text(content) => outbound.send_text(channel_id, content).await,
        Reply::File(path) => outbound.send_file(channel_id, path).await,
    }
}
