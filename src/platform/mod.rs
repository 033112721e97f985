use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub mod eventsub;
pub mod helix;

/// Outbound surface of the owner channel. Everything the rule engine and the
/// command handlers do to the platform goes through this trait so tests can
/// record actions instead of hitting the network.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    async fn send_message(&self, text: &str) -> Result<()>;
    async fn send_announcement(&self, text: &str) -> Result<()>;
    async fn timeout_user(&self, user_id: &str, duration_seconds: u64, reason: &str) -> Result<()>;
    async fn add_moderator(&self, user_id: &str) -> Result<()>;
    async fn remove_moderator(&self, user_id: &str) -> Result<()>;
    async fn add_vip(&self, user_id: &str) -> Result<()>;
    async fn remove_vip(&self, user_id: &str) -> Result<()>;
    async fn send_shoutout(&self, target_broadcaster_id: &str) -> Result<()>;

    /// Current chatters in the channel, keyed by user id.
    async fn fetch_chatters(&self) -> Result<HashMap<String, String>>;
}

/// Username to platform user id lookup, used by the directory when a name is
/// not in the local cache.
#[async_trait]
pub trait UserIdResolver: Send + Sync {
    /// `Ok(None)` means the platform has no such user. Transport or auth
    /// failures surface as errors and are downgraded to "unknown user" by
    /// the caller.
    async fn resolve_user_id(&self, name: &str) -> Result<Option<String>>;
}
