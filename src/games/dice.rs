use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::store::{JsonStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceDocument {
    pub reset_at: DateTime<Utc>,
    #[serde(default)]
    pub players_today: HashSet<String>,
}

impl Default for DiceDocument {
    fn default() -> Self {
        Self {
            reset_at: Utc::now(),
            players_today: HashSet::new(),
        }
    }
}

/// Tracks which users have already rolled the daily d20.
///
/// The roster resets at the UTC calendar-day boundary: a stored state from a
/// previous day is discarded on the next access, regardless of process
/// restarts. (Earlier revisions of the bot reset this on every launch
/// instead, which let a restart re-open the daily VIP roll.)
pub struct DiceGame {
    store: JsonStore<DiceDocument>,
}

impl DiceGame {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonStore::open(path)?,
        })
    }

    pub async fn has_rolled_today(&self, user: &str) -> bool {
        let user = user.to_lowercase();
        let now = Utc::now();
        self.store
            .update(|doc| {
                Self::roll_over_day(doc, now);
                doc.players_today.contains(&user)
            })
            .await
    }

    /// Idempotent: recording the same user twice in one day is a no-op.
    pub async fn record_roll(&self, user: &str) {
        let user = user.to_lowercase();
        let now = Utc::now();
        self.store
            .update(|doc| {
                Self::roll_over_day(doc, now);
                doc.players_today.insert(user);
            })
            .await;
    }

    fn roll_over_day(doc: &mut DiceDocument, now: DateTime<Utc>) {
        if doc.reset_at.date_naive() != now.date_naive() {
            doc.players_today.clear();
            doc.reset_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn record_roll_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let game = DiceGame::open(dir.path().join("dice.json")).unwrap();

        assert!(!game.has_rolled_today("alice").await);
        game.record_roll("alice").await;
        game.record_roll("Alice").await;
        assert!(game.has_rolled_today("alice").await);
        assert_eq!(game.store.read(|doc| doc.players_today.len()).await, 1);
    }

    #[tokio::test]
    async fn roster_survives_reopen_within_the_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dice.json");
        {
            let game = DiceGame::open(&path).unwrap();
            game.record_roll("alice").await;
        }
        let game = DiceGame::open(&path).unwrap();
        assert!(game.has_rolled_today("alice").await);
    }

    #[tokio::test]
    async fn stale_day_is_cleared_on_access() {
        let dir = tempfile::tempdir().unwrap();
        let game = DiceGame::open(dir.path().join("dice.json")).unwrap();
        game.record_roll("alice").await;
        game.store
            .update(|doc| doc.reset_at = Utc::now() - Duration::days(2))
            .await;

        assert!(!game.has_rolled_today("alice").await);
    }
}
