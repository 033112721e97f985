use serde::{Deserialize, Serialize};

/// A single chat message as delivered by the EventSub transport.
///
/// `source_broadcaster_id` is set when the message was relayed from another
/// channel through shared chat; the rule engine treats those differently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub broadcaster_id: String,
    pub chatter_id: String,
    pub chatter_name: String,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub is_moderator: bool,
    pub is_subscriber: bool,
    pub is_vip: bool,
    pub is_broadcaster: bool,
    pub source_broadcaster_id: Option<String>,
}

impl ChatMessage {
    /// True when the message was relayed from a different broadcaster's
    /// channel via shared chat.
    pub fn is_shared_chat_relay(&self) -> bool {
        match &self.source_broadcaster_id {
            Some(source) => *source != self.broadcaster_id,
            None => false,
        }
    }

    /// Chat mention for the sender, e.g. `@username`.
    pub fn mention(&self) -> String {
        format!("@{}", self.chatter_name)
    }
}

/// Closed set of inbound events the bot reacts to.
#[derive(Debug, Clone)]
pub enum IncomingEvent {
    Chat(ChatMessage),
    StreamOnline { broadcaster_id: String },
    Follow { broadcaster_id: String, user_name: String },
    Subscription { broadcaster_id: String, user_name: String },
    AdBreak { broadcaster_id: String, duration_seconds: u64 },
}

/// Minimum role a chatter needs before a command handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredRole {
    Anyone,
    /// Live platform moderator or the broadcaster.
    Moderator,
    /// Locally granted tier: broadcaster, supermod, or persistent mod.
    Elevated,
    Broadcaster,
}

/// Which bucket a command's cooldown is tracked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownScope {
    /// One bucket per (command, chatter) pair.
    PerChatter,
    /// One bucket shared by the whole channel.
    PerChannel,
}
