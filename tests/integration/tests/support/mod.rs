#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use hat_core::{ChannelHistory, ChatOutbound, IncomingMessage, MessageFlags};

pub fn message(id: u64, author_id: u64, channel_id: u64, content: &str) -> IncomingMessage {
    IncomingMessage {
        id,
        author_id,
        channel_id,
        channel_name: "off-topic".to_string(),
        content: content.to_string(),
        created_unix_ms: id * 1_000,
        flags: MessageFlags::default(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Text(u64, String),
    File(u64, PathBuf),
}

#[derive(Default)]
pub struct CapturingOutbound {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CapturingOutbound {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().expect("deliveries lock").clone()
    }

    /// Polls until `count` deliveries arrived or five seconds passed.
    pub async fn wait_for(&self, count: usize) -> Vec<Delivery> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let deliveries = self.deliveries();
            if deliveries.len() >= count || tokio::time::Instant::now() >= deadline {
                return deliveries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ChatOutbound for CapturingOutbound {
    async fn broadcast_typing(&self, _channel_id: u64) -> Result<()> {
        Ok(())
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()> {
        self.deliveries
            .lock()
            .expect("deliveries lock")
            .push(Delivery::Text(channel_id, content.to_string()));
        Ok(())
    }

    async fn send_file(&self, channel_id: u64, path: &Path) -> Result<()> {
        // Rendered artifacts are removed after upload, so record existence now.
        assert!(path.is_file(), "uploaded file must exist: {}", path.display());
        self.deliveries
            .lock()
            .expect("deliveries lock")
            .push(Delivery::File(channel_id, path.to_path_buf()));
        Ok(())
    }
}

/// Newest-first history that grows as the test "posts" messages.
#[derive(Default)]
pub struct ScriptedHistory {
    newest_first: Mutex<Vec<IncomingMessage>>,
}

impl ScriptedHistory {
    pub fn post(&self, message: IncomingMessage) {
        self.newest_first
            .lock()
            .expect("history lock")
            .insert(0, message);
    }
}

#[async_trait]
impl ChannelHistory for ScriptedHistory {
    async fn messages_before(
        &self,
        channel_id: u64,
        before_id: u64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>> {
        Ok(self
            .newest_first
            .lock()
            .expect("history lock")
            .iter()
            .filter(|message| message.channel_id == channel_id && message.id < before_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
