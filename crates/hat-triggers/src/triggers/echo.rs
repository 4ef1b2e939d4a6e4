//! Echo trigger: answers "what?" by repeating the previous message in caps.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hat_core::{ChannelHistory, IncomingMessage};
use tokio::time::Instant;

use crate::{
    format_echo, CooldownTracker, KeywordSet, LookbackScanner, MessageFilter, Reply, Trigger,
    LOOKBACK_WINDOW,
};

#[derive(Debug, Clone)]
pub struct EchoTriggerConfig {
    pub keywords: KeywordSet,
    pub no_trigger_channel: Option<String>,
    /// Window in which the previous author's repeat fires are dropped.
    pub cooldown: Duration,
}

impl Default for EchoTriggerConfig {
    fn default() -> Self {
        Self {
            keywords: KeywordSet::new(["what", "whut", "whot", "wat", "wut", "wot"]),
            no_trigger_channel: Some("general".to_string()),
            cooldown: Duration::from_secs(60),
        }
    }
}

pub struct EchoTrigger {
    config: EchoTriggerConfig,
    history: Arc<dyn ChannelHistory>,
    cooldown: CooldownTracker,
    last_author: Option<u64>,
    scanner: LookbackScanner,
    pending: Option<IncomingMessage>,
}

impl EchoTrigger {
    pub fn new(config: EchoTriggerConfig, history: Arc<dyn ChannelHistory>) -> Self {
        let cooldown = CooldownTracker::new(config.cooldown);
        Self {
            config,
            history,
            cooldown,
            last_author: None,
            scanner: LookbackScanner::new(),
            pending: None,
        }
    }

    fn is_debounced(&self, author_id: u64, now: Instant) -> bool {
        self.last_author == Some(author_id) && !self.cooldown.eligible(&(), now)
    }
}

#[async_trait]
impl Trigger for EchoTrigger {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn filter(&self) -> MessageFilter {
        let keywords = self.config.keywords.clone();
        let excluded = self.config.no_trigger_channel.clone();
        Arc::new(move |message: &IncomingMessage| {
            keywords.contains(&message.content) && !message.is_in_channel(excluded.as_deref())
        })
    }

    async fn evaluate(
        &mut self,
        message: &IncomingMessage,
        now: Instant,
    ) -> Result<Option<Reply>> {
        self.pending = None;
        if self.is_debounced(message.author_id, now) {
            // Spamming the keyword keeps pushing the window out.
            self.cooldown.record_fire((), now);
            tracing::debug!(
                author_id = message.author_id,
                message_id = message.id,
                "echo debounced"
            );
            return Ok(None);
        }

        // Anchored at the trigger so a backlogged trigger never sees later messages.
        let earlier = self
            .history
            .messages_before(message.channel_id, message.id, LOOKBACK_WINDOW - 1)
            .await
            .with_context(|| format!("failed to read history of channel {}", message.channel_id))?;
        let mut window = Vec::with_capacity(LOOKBACK_WINDOW);
        window.push(message.clone());
        window.extend(earlier);
        let Some(selected) = self
            .scanner
            .scan(message, &window, &self.config.keywords)
        else {
            tracing::debug!(message_id = message.id, "echo found no candidate");
            return Ok(None);
        };

        let reply = format_echo(message, &selected);
        self.pending = Some(selected);
        Ok(Some(Reply::Text(reply)))
    }

    fn record_fire(&mut self, message: &IncomingMessage, now: Instant) {
        self.last_author = Some(message.author_id);
        self.cooldown.record_fire((), now);
        if let Some(selected) = self.pending.take() {
            self.scanner.remember_repeated(selected);
        }
    }
}
