use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use hat_core::{ChannelHistory, ChatOutbound, IncomingMessage, MessageFlags};

pub(crate) fn message(id: u64, author_id: u64, content: &str) -> IncomingMessage {
    IncomingMessage {
        id,
        author_id,
        channel_id: 500,
        channel_name: "memes".to_string(),
        content: content.to_string(),
        created_unix_ms: id * 1_000,
        flags: MessageFlags::default(),
    }
}

pub(crate) fn automation_message(id: u64, author_id: u64, content: &str) -> IncomingMessage {
    let mut message = message(id, author_id, content);
    message.flags.from_automation = true;
    message
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Typing(u64),
    Text(u64, String),
    File(u64, PathBuf),
}

#[derive(Default)]
pub(crate) struct RecordingOutbound {
    pub(crate) sent: Mutex<Vec<Sent>>,
    pub(crate) fail_typing: bool,
    pub(crate) fail_sends: bool,
}

impl RecordingOutbound {
    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|entry| match entry {
                Sent::Text(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: Sent) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(entry);
        }
    }
}

#[async_trait]
impl ChatOutbound for RecordingOutbound {
    async fn broadcast_typing(&self, channel_id: u64) -> Result<()> {
        if self.fail_typing {
            bail!("typing endpoint unavailable");
        }
        self.push(Sent::Typing(channel_id));
        Ok(())
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()> {
        if self.fail_sends {
            bail!("send rejected");
        }
        self.push(Sent::Text(channel_id, content.to_string()));
        Ok(())
    }

    async fn send_file(&self, channel_id: u64, path: &Path) -> Result<()> {
        if self.fail_sends {
            bail!("send rejected");
        }
        self.push(Sent::File(channel_id, path.to_path_buf()));
        Ok(())
    }
}

/// Serves a fixed newest-first history regardless of channel.
#[derive(Default)]
pub(crate) struct StaticHistory {
    messages: Mutex<Vec<IncomingMessage>>,
}

impl StaticHistory {
    pub(crate) fn new(messages: Vec<IncomingMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    pub(crate) fn replace(&self, messages: Vec<IncomingMessage>) {
        if let Ok(mut current) = self.messages.lock() {
            *current = messages;
        }
    }
}

#[async_trait]
impl ChannelHistory for StaticHistory {
    async fn messages_before(
        &self,
        _channel_id: u64,
        before_id: u64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>> {
        let messages = self
            .messages
            .lock()
            .map(|messages| {
                messages
                    .iter()
                    .filter(|message| message.id < before_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(messages)
    }
}
