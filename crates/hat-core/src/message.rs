use serde::{Deserialize, Serialize};

/// Content-shape flags captured when a message is received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub has_embeds: bool,
    pub has_attachments: bool,
    pub has_mentions: bool,
    pub has_role_mentions: bool,
    pub mentions_everyone: bool,
    /// Authored by a bot account, including this one.
    pub from_automation: bool,
}

impl MessageFlags {
    /// Returns true when the message carries anything besides plain text.
    pub fn has_rich_content(&self) -> bool {
        self.has_embeds
            || self.has_attachments
            || self.has_mentions
            || self.has_role_mentions
            || self.mentions_everyone
    }
}

/// Immutable snapshot of an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: u64,
    pub author_id: u64,
    pub channel_id: u64,
    #[serde(default)]
    pub channel_name: String,
    pub content: String,
    pub created_unix_ms: u64,
    #[serde(default)]
    pub flags: MessageFlags,
}

impl IncomingMessage {
    /// True when the content is unchanged by upper-casing (`"WHAT"`, `"?!"`).
    pub fn is_all_caps(&self) -> bool {
        self.content == self.content.to_uppercase()
    }

    /// True when the content starts with the bot command prefix.
    pub fn is_command(&self, command_prefix: &str) -> bool {
        !command_prefix.is_empty() && self.content.starts_with(command_prefix)
    }

    /// True when the message was posted in the named channel.
    pub fn is_in_channel(&self, channel_name: Option<&str>) -> bool {
        matches!(channel_name, Some(name) if !name.is_empty() && self.channel_name == name)
    }
}

/// Returns true when `content` contains a user mention (`<@id>` or `<@!id>`) of `actor_id`.
pub fn mentions_actor(content: &str, actor_id: u64) -> bool {
    content.contains(&format!("<@{actor_id}>")) || content.contains(&format!("<@!{actor_id}>"))
}
