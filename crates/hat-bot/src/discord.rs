//! Serenity adapter: converts gateway messages into [`IncomingMessage`]s and
//! implements the outbound, history and channel-name seams over the Discord
//! HTTP API.

use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use hat_core::{ChannelHistory, ChannelNames, ChatOutbound, IncomingMessage, MessageFlags};
use hat_triggers::GatewaySender;
use serenity::{
    all::{Channel, ChannelId, Message, MessageId, Ready},
    builder::{CreateAttachment, CreateMessage, GetMessages},
    client::{Context, EventHandler},
    http::Http,
};
use tokio::sync::RwLock;

const MAX_HISTORY_PAGE: usize = 100;

fn channel(channel_id: u64) -> Result<ChannelId> {
    if channel_id == 0 {
        bail!("channel id 0 is not a valid discord snowflake");
    }
    Ok(ChannelId::new(channel_id))
}

/// Caches channel names so the no-trigger channel check costs at most one
/// request per channel.
pub struct ChannelDirectory {
    http: Arc<Http>,
    names: RwLock<HashMap<u64, String>>,
}

impl ChannelDirectory {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Guild channel name, or an empty string for DMs and lookup failures.
    pub async fn name_of(&self, channel_id: ChannelId) -> String {
        if let Some(name) = self.names.read().await.get(&channel_id.get()) {
            return name.clone();
        }
        let name = match channel_id.to_channel(self.http.as_ref()).await {
            Ok(Channel::Guild(guild_channel)) => guild_channel.name,
            Ok(_) => String::new(),
            Err(error) => {
                tracing::debug!(channel = channel_id.get(), error = %error, "channel lookup failed");
                return String::new();
            }
        };
        self.names
            .write()
            .await
            .insert(channel_id.get(), name.clone());
        name
    }
}

#[async_trait]
impl ChannelNames for ChannelDirectory {
    async fn channel_name(&self, channel_id: u64) -> String {
        match channel(channel_id) {
            Ok(id) => self.name_of(id).await,
            Err(_) => String::new(),
        }
    }
}

pub fn incoming_from_serenity(message: &Message, channel_name: String) -> IncomingMessage {
    let created_unix_ms = u64::try_from(message.timestamp.unix_timestamp())
        .unwrap_or_default()
        .saturating_mul(1_000);
    IncomingMessage {
        id: message.id.get(),
        author_id: message.author.id.get(),
        channel_id: message.channel_id.get(),
        channel_name,
        content: message.content.clone(),
        created_unix_ms,
        flags: MessageFlags {
            has_embeds: !message.embeds.is_empty(),
            has_attachments: !message.attachments.is_empty(),
            has_mentions: !message.mentions.is_empty(),
            has_role_mentions: !message.mention_roles.is_empty(),
            mentions_everyone: message.mention_everyone,
            from_automation: message.author.bot,
        },
    }
}

pub struct SerenityOutbound {
    http: Arc<Http>,
}

impl SerenityOutbound {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatOutbound for SerenityOutbound {
    async fn broadcast_typing(&self, channel_id: u64) -> Result<()> {
        channel(channel_id)?
            .broadcast_typing(self.http.as_ref())
            .await
            .with_context(|| format!("failed to broadcast typing to channel {channel_id}"))
    }

    async fn send_text(&self, channel_id: u64, content: &str) -> Result<()> {
        channel(channel_id)?
            .say(self.http.as_ref(), content)
            .await
            .with_context(|| format!("failed to send message to channel {channel_id}"))?;
        Ok(())
    }

    async fn send_file(&self, channel_id: u64, path: &Path) -> Result<()> {
        let attachment = CreateAttachment::path(path)
            .await
            .with_context(|| format!("failed to read attachment {}", path.display()))?;
        channel(channel_id)?
            .send_message(self.http.as_ref(), CreateMessage::new().add_file(attachment))
            .await
            .with_context(|| format!("failed to upload {} to channel {channel_id}", path.display()))?;
        Ok(())
    }
}

pub struct SerenityHistory {
    http: Arc<Http>,
    directory: Arc<ChannelDirectory>,
}

impl SerenityHistory {
    pub fn new(http: Arc<Http>, directory: Arc<ChannelDirectory>) -> Self {
        Self { http, directory }
    }
}

#[async_trait]
impl ChannelHistory for SerenityHistory {
    async fn messages_before(
        &self,
        channel_id: u64,
        before_id: u64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>> {
        let id = channel(channel_id)?;
        if before_id == 0 {
            bail!("message id 0 is not a valid discord snowflake");
        }
        let limit = u8::try_from(limit.clamp(1, MAX_HISTORY_PAGE)).unwrap_or(u8::MAX);
        let request = GetMessages::new()
            .before(MessageId::new(before_id))
            .limit(limit);
        let messages = id
            .messages(self.http.as_ref(), request)
            .await
            .with_context(|| format!("failed to fetch history for channel {channel_id}"))?;
        let channel_name = self.directory.name_of(id).await;
        Ok(messages
            .iter()
            .map(|message| incoming_from_serenity(message, channel_name.clone()))
            .collect())
    }
}

/// Gateway event handler. Messages are queued without awaiting anything, and
/// the dispatch forwarder resolves channel names and fans them out in order.
pub struct BotEventHandler {
    gateway: GatewaySender,
}

impl BotEventHandler {
    pub fn new(gateway: GatewaySender) -> Self {
        Self { gateway }
    }
}

#[serenity::async_trait]
impl EventHandler for BotEventHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "connected to gateway"
        );
    }

    async fn message(&self, _ctx: Context, message: Message) {
        let incoming = incoming_from_serenity(&message, String::new());
        if self.gateway.send(incoming).is_err() {
            tracing::debug!(message = message.id.get(), "dispatch forwarder gone; message dropped");
        }
    }
}
