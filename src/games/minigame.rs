use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::store::{JsonStore, StoreError};

/// Operator-configured keyword games plus the culling toggle.
///
/// `vip_found` and `mod_found` are one-shot latches: once a keyword game has
/// been won the keyword stops triggering until an operator resets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniGameConfig {
    #[serde(default)]
    pub ban_keyword: String,
    pub timeout_duration_seconds: u64,
    #[serde(default)]
    pub vip_keyword: String,
    #[serde(default)]
    pub vip_found: bool,
    #[serde(default)]
    pub mod_keyword: String,
    #[serde(default)]
    pub mod_found: bool,
    #[serde(default)]
    pub culling_mode: bool,
}

impl Default for MiniGameConfig {
    fn default() -> Self {
        Self {
            ban_keyword: String::new(),
            timeout_duration_seconds: 60,
            vip_keyword: String::new(),
            vip_found: false,
            mod_keyword: String::new(),
            mod_found: false,
            culling_mode: false,
        }
    }
}

impl MiniGameConfig {
    /// Case-insensitive substring match. Empty keywords never match, so an
    /// unconfigured game stays inert instead of firing on every message.
    pub fn keyword_matches(keyword: &str, text: &str) -> bool {
        !keyword.is_empty() && text.to_lowercase().contains(&keyword.to_lowercase())
    }
}

/// Keyword-game state manager. Every handling pass re-reads through the
/// store so operator edits made while the bot is running are picked up on
/// the next message.
pub struct MiniGame {
    store: JsonStore<MiniGameConfig>,
}

impl MiniGame {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonStore::open(path)?,
        })
    }

    pub async fn config(&self) -> MiniGameConfig {
        self.store.read(|c| c.clone()).await
    }

    /// Claim the VIP keyword win. The not-yet-found check and the latch set
    /// happen under one store lock, so two simultaneous matching messages
    /// can never both win.
    pub async fn try_claim_vip(&self) -> bool {
        self.store
            .update(|c| {
                if c.vip_found {
                    false
                } else {
                    c.vip_found = true;
                    true
                }
            })
            .await
    }

    /// Claim the mod keyword win. Same single-winner guarantee as
    /// [`Self::try_claim_vip`].
    pub async fn try_claim_mod(&self) -> bool {
        self.store
            .update(|c| {
                if c.mod_found {
                    false
                } else {
                    c.mod_found = true;
                    true
                }
            })
            .await
    }

    /// Operator reset: re-arm the VIP keyword game.
    pub async fn reset_vip(&self) {
        self.store.update(|c| c.vip_found = false).await;
    }

    /// Operator reset: re-arm the mod keyword game.
    pub async fn reset_mod(&self) {
        self.store.update(|c| c.mod_found = false).await;
    }

    pub async fn set_culling_mode(&self, enabled: bool) {
        self.store.update(|c| c.culling_mode = enabled).await;
    }

    pub async fn set_ban_keyword(&self, keyword: &str) {
        let keyword = keyword.to_lowercase();
        self.store.update(|c| c.ban_keyword = keyword).await;
    }

    pub async fn set_vip_keyword(&self, keyword: &str) {
        let keyword = keyword.to_lowercase();
        self.store
            .update(|c| {
                c.vip_keyword = keyword;
                c.vip_found = false;
            })
            .await;
    }

    pub async fn set_mod_keyword(&self, keyword: &str) {
        let keyword = keyword.to_lowercase();
        self.store
            .update(|c| {
                c.mod_keyword = keyword;
                c.mod_found = false;
            })
            .await;
    }

    pub async fn set_timeout_duration(&self, seconds: u64) {
        self.store.update(|c| c.timeout_duration_seconds = seconds).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vip_latch_is_one_shot_until_reset() {
        let dir = tempfile::tempdir().unwrap();
        let game = MiniGame::open(dir.path().join("minigame.json")).unwrap();
        game.set_vip_keyword("sparkle").await;

        assert!(game.try_claim_vip().await);
        assert!(!game.try_claim_vip().await);

        game.reset_vip().await;
        assert!(game.try_claim_vip().await);
    }

    #[tokio::test]
    async fn setting_a_new_keyword_rearms_the_game() {
        let dir = tempfile::tempdir().unwrap();
        let game = MiniGame::open(dir.path().join("minigame.json")).unwrap();
        game.set_mod_keyword("magic").await;
        assert!(game.try_claim_mod().await);

        game.set_mod_keyword("wizard").await;
        assert!(!game.config().await.mod_found);
    }

    #[test]
    fn empty_keyword_never_matches() {
        assert!(!MiniGameConfig::keyword_matches("", "anything at all"));
        assert!(MiniGameConfig::keyword_matches("SPAM", "this is spam"));
        assert!(MiniGameConfig::keyword_matches("spam", "This Is SPAM!"));
        assert!(!MiniGameConfig::keyword_matches("spam", "perfectly fine"));
    }
}
