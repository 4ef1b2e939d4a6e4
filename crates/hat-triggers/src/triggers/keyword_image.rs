//! Keyword-image trigger: posts a random picture when a phrase shows up.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hat_core::IncomingMessage;
use tokio::time::Instant;

use super::pick_random;
use crate::{CooldownTracker, MessageFilter, Reply, Trigger};

#[derive(Debug, Clone)]
pub struct KeywordImageConfig {
    pub phrase: String,
    pub asset_dir: PathBuf,
    /// Global: one image per window no matter who asks.
    pub cooldown: Duration,
    pub no_trigger_channel: Option<String>,
    pub command_prefix: String,
}

impl Default for KeywordImageConfig {
    fn default() -> Self {
        Self {
            phrase: "hello there".to_string(),
            asset_dir: PathBuf::from("assets/hellothere"),
            cooldown: Duration::from_secs(60),
            no_trigger_channel: Some("general".to_string()),
            command_prefix: "!".to_string(),
        }
    }
}

pub struct KeywordImageTrigger {
    config: KeywordImageConfig,
    cooldown: CooldownTracker,
}

impl KeywordImageTrigger {
    pub fn new(config: KeywordImageConfig) -> Self {
        let cooldown = CooldownTracker::new(config.cooldown);
        Self { config, cooldown }
    }
}

#[async_trait]
impl Trigger for KeywordImageTrigger {
    fn name(&self) -> &'static str {
        "keyword_image"
    }

    fn filter(&self) -> MessageFilter {
        let phrase = self.config.phrase.trim().to_lowercase();
        let excluded = self.config.no_trigger_channel.clone();
        let command_prefix = self.config.command_prefix.clone();
        Arc::new(move |message: &IncomingMessage| {
            !phrase.is_empty()
                && message.content.to_lowercase().contains(&phrase)
                && !message.is_command(&command_prefix)
                && !message.is_in_channel(excluded.as_deref())
        })
    }

    async fn evaluate(
        &mut self,
        message: &IncomingMessage,
        now: Instant,
    ) -> Result<Option<Reply>> {
        if !self.cooldown.eligible(&(), now) {
            tracing::debug!(message_id = message.id, "keyword image cooling down");
            return Ok(None);
        }
        let assets = list_asset_files(&self.config.asset_dir)?;
        let Some(asset) = pick_random(&assets) else {
            tracing::warn!(
                asset_dir = %self.config.asset_dir.display(),
                "keyword image asset directory has no images"
            );
            return Ok(None);
        };
        Ok(Some(Reply::File(asset)))
    }

    fn record_fire(&mut self, _message: &IncomingMessage, now: Instant) {
        self.cooldown.record_fire((), now);
    }
}

/// Regular, non-hidden files whose name has an extension, sorted by path.
pub fn list_asset_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with('.') || !name.contains('.') || !path.is_file() {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}
