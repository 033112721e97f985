use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::store::{JsonStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickDocument {
    pub default_target: String,
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for BrickDocument {
    fn default() -> Self {
        Self {
            default_target: "the wall".to_string(),
            targets: HashMap::new(),
        }
    }
}

/// Per-user brick-roulette target assignments. Usernames are stored
/// lowercase; absent entries fall back to the channel-wide default target.
///
/// Validation (no self-target, no broadcaster, no bot) happens in the
/// command handler before anything reaches this store.
pub struct BrickGame {
    store: JsonStore<BrickDocument>,
}

impl BrickGame {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonStore::open(path)?,
        })
    }

    pub async fn target_for(&self, user: &str) -> String {
        let user = user.to_lowercase();
        self.store
            .read(|doc| {
                doc.targets
                    .get(&user)
                    .cloned()
                    .unwrap_or_else(|| doc.default_target.clone())
            })
            .await
    }

    pub async fn set_target(&self, attacker: &str, target: &str) {
        let attacker = attacker.to_lowercase();
        let target = target.to_lowercase();
        self.store
            .update(|doc| {
                doc.targets.insert(attacker, target);
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_target_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let game = BrickGame::open(dir.path().join("brick.json")).unwrap();
        assert_eq!(game.target_for("carol").await, "the wall");
    }

    #[tokio::test]
    async fn targets_are_stored_lowercase() {
        let dir = tempfile::tempdir().unwrap();
        let game = BrickGame::open(dir.path().join("brick.json")).unwrap();
        game.set_target("Carol", "BOB").await;
        assert_eq!(game.target_for("carol").await, "bob");
        assert_eq!(game.target_for("CAROL").await, "bob");
    }
}
