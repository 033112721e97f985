use chrono::Duration;
use log::{info, warn};
use rand::prelude::IndexedRandom;
use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::games::minigame::MiniGameConfig;
use crate::games::MiniGame;
use crate::platform::ChannelApi;
use crate::types::ChatMessage;

/// Minimum gap between auto-responses for a single user.
const AUTO_RESPONSE_COOLDOWN_SECS: i64 = 600;

/// The per-message moderation pipeline.
///
/// Rules run in a fixed order and their side effects are additive: one
/// message can trigger mod reconciliation, an auto-response, a culling
/// timeout, and a keyword action in the same pass. Failed platform calls
/// are logged and swallowed so one bad call never aborts the rest of the
/// pipeline.
pub struct RuleEngine {
    directory: Arc<UserDirectory>,
    minigame: Arc<MiniGame>,
    api: Arc<dyn ChannelApi>,
}

impl RuleEngine {
    pub fn new(
        directory: Arc<UserDirectory>,
        minigame: Arc<MiniGame>,
        api: Arc<dyn ChannelApi>,
    ) -> Self {
        Self {
            directory,
            minigame,
            api,
        }
    }

    pub async fn handle_message(&self, message: &ChatMessage) {
        // Directory refresh runs even for shared-chat relays so renames are
        // never missed. The record still carries the pre-message
        // last_message_at; the auto-response rule owns that field.
        let record = self.directory.upsert_from_message(message).await;

        // Shared-chat guard: messages relayed from another broadcaster's
        // channel get no moderation or games.
        if message.is_shared_chat_relay() {
            return;
        }

        // Persistent-mod reconciliation: self-heal moderator status the
        // platform lost, e.g. the broadcaster fat-fingering an unmod.
        if record.persistent_mod && !message.is_moderator {
            info!(
                "Re-granting moderator status to {} ({})",
                message.chatter_name, message.chatter_id
            );
            self.send_message(&format!(
                "{} you're supposed to be a moderator, but you're not. I will fix that for you!",
                message.mention()
            ))
            .await;
            if let Err(e) = self.api.add_moderator(&message.chatter_id).await {
                warn!("Failed to re-grant moderator to {}: {}", message.chatter_name, e);
            }
            self.directory.set_live_mod(&message.chatter_id, true).await;
        }

        // Auto-response: cooldown is evaluated against the timestamp stored
        // before this message, and the timestamp is updated exactly once per
        // message whether or not a response fired or was delivered.
        if !record.auto_responses.is_empty() {
            let due = match record.last_message_at {
                None => true,
                Some(previous) => {
                    message.timestamp - previous
                        >= Duration::seconds(AUTO_RESPONSE_COOLDOWN_SECS)
                }
            };
            if due {
                let response = {
                    let mut rng = rand::rng();
                    record.auto_responses.choose(&mut rng).cloned()
                };
                if let Some(response) = response {
                    self.send_message(&response).await;
                }
            }
        }
        self.directory
            .touch_last_message(&message.chatter_id, message.timestamp)
            .await;

        // Re-read on every pass so operator edits land on the next message.
        let config = self.minigame.config().await;

        // Culling: strip moderator status from anyone holding it who is not
        // the broadcaster and not locally flagged as a persistent mod.
        if config.culling_mode
            && message.is_moderator
            && !message.is_broadcaster
            && !record.persistent_mod
        {
            info!("Culling moderator {}", message.chatter_name);
            if let Err(e) = self
                .api
                .timeout_user(
                    &message.chatter_id,
                    config.timeout_duration_seconds,
                    "culling",
                )
                .await
            {
                warn!("Failed to cull {}: {}", message.chatter_name, e);
            }
        }

        self.run_keyword_games(message, &config).await;
    }

    /// VIP keyword first, then mod keyword, then the ban keyword. The two
    /// reward games are one-shot; the ban keyword fires on every matching
    /// message regardless of the sender's role.
    async fn run_keyword_games(&self, message: &ChatMessage, config: &MiniGameConfig) {
        if MiniGameConfig::keyword_matches(&config.vip_keyword, &message.text) && !message.is_vip {
            if self.minigame.try_claim_vip().await {
                info!("{} found the VIP keyword", message.chatter_name);
                if let Err(e) = self.api.add_vip(&message.chatter_id).await {
                    warn!("Failed to grant VIP to {}: {}", message.chatter_name, e);
                }
                self.send_announcement(&format!(
                    "{} found the secret VIP keyword '{}' and is now a VIP!",
                    message.chatter_name, config.vip_keyword
                ))
                .await;
            }
        }

        if MiniGameConfig::keyword_matches(&config.mod_keyword, &message.text)
            && !message.is_moderator
        {
            if self.minigame.try_claim_mod().await {
                info!("{} found the mod keyword", message.chatter_name);
                if let Err(e) = self.api.add_moderator(&message.chatter_id).await {
                    warn!("Failed to grant moderator to {}: {}", message.chatter_name, e);
                }
                self.directory.set_live_mod(&message.chatter_id, true).await;
                self.send_announcement(&format!(
                    "{} found the secret mod keyword '{}' and is now a moderator!",
                    message.chatter_name, config.mod_keyword
                ))
                .await;
            }
        }

        if MiniGameConfig::keyword_matches(&config.ban_keyword, &message.text) {
            info!(
                "{} said the ban keyword, timing out for {}s",
                message.chatter_name, config.timeout_duration_seconds
            );
            if let Err(e) = self
                .api
                .timeout_user(
                    &message.chatter_id,
                    config.timeout_duration_seconds,
                    "said the forbidden word",
                )
                .await
            {
                warn!("Failed to time out {}: {}", message.chatter_name, e);
            }
        }
    }

    async fn send_message(&self, text: &str) {
        if let Err(e) = self.api.send_message(text).await {
            warn!("Failed to send chat message: {}", e);
        }
    }

    async fn send_announcement(&self, text: &str) {
        if let Err(e) = self.api.send_announcement(text).await {
            warn!("Failed to send announcement: {}", e);
        }
    }
}
