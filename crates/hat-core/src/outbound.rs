//! Collaborator traits implemented by the chat platform adapter.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::IncomingMessage;

/// Reply operations directed at a channel.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    async fn broadcast_typing(&self, channel_id: u64) -> Result<()>;

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()>;

    async fn send_file(&self, channel_id: u64, path: &Path) -> Result<()>;
}

/// Read access to recent channel history.
#[async_trait]
pub trait ChannelHistory: Send + Sync {
    /// Returns up to `limit` messages posted strictly before `before_id`, newest first.
    async fn messages_before(
        &self,
        channel_id: u64,
        before_id: u64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>>;
}

/// Resolves channel ids to display names.
#[async_trait]
pub trait ChannelNames: Send + Sync {
    /// Guild channel name, or an empty string when it has none or the lookup fails.
    async fn channel_name(&self, channel_id: u64) -> String;
}
