//! Mention trigger: a canned reply whenever someone pings the bot.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hat_core::{mentions_actor, IncomingMessage};
use serde::Deserialize;
use tokio::time::Instant;

use super::pick_random;
use crate::{MessageFilter, Reply, Trigger};

#[derive(Debug, Clone, Default)]
pub struct MentionTriggerConfig {
    /// User id of the bot account.
    pub actor_id: u64,
    pub replies: Vec<String>,
    /// Optional `{"mentions": [...]}` file, re-read on every fire.
    pub replies_file: Option<PathBuf>,
    pub command_prefix: String,
}

#[derive(Debug, Deserialize)]
struct MentionRepliesFile {
    mentions: Vec<String>,
}

pub struct MentionTrigger {
    config: MentionTriggerConfig,
}

impl MentionTrigger {
    pub fn new(config: MentionTriggerConfig) -> Self {
        Self { config }
    }

    fn current_replies(&self) -> Vec<String> {
        let Some(path) = self.config.replies_file.as_deref() else {
            return self.config.replies.clone();
        };
        match load_replies_file(path) {
            Ok(replies) if !replies.is_empty() => replies,
            Ok(_) => self.config.replies.clone(),
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "mention replies file unusable; using configured replies"
                );
                self.config.replies.clone()
            }
        }
    }
}

#[async_trait]
impl Trigger for MentionTrigger {
    fn name(&self) -> &'static str {
        "mention"
    }

    fn filter(&self) -> MessageFilter {
        let actor_id = self.config.actor_id;
        let command_prefix = self.config.command_prefix.clone();
        Arc::new(move |message: &IncomingMessage| {
            mentions_actor(&message.content, actor_id) && !message.is_command(&command_prefix)
        })
    }

    async fn evaluate(
        &mut self,
        message: &IncomingMessage,
        _now: Instant,
    ) -> Result<Option<Reply>> {
        let replies = self.current_replies();
        let reply = pick_random(&replies);
        if reply.is_none() {
            tracing::debug!(message_id = message.id, "no mention replies configured");
        }
        Ok(reply.map(Reply::Text))
    }

    fn record_fire(&mut self, _message: &IncomingMessage, _now: Instant) {}
}

fn load_replies_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: MentionRepliesFile = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(parsed.mentions)
}
