use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::platform::UserIdResolver;
use crate::store::{JsonStore, StoreError};
use crate::types::ChatMessage;

/// One chatter as tracked by the bot.
///
/// Identity key is the platform-assigned `id`; `name` follows renames with
/// last-writer-wins semantics. Records are created on first observed message
/// (or first successful name resolution) and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "mod")]
    pub is_mod: bool,
    #[serde(rename = "sub")]
    pub is_sub: bool,
    #[serde(default)]
    pub persistent_mod: bool,
    #[serde(default)]
    pub supermod: bool,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub auto_responses: Vec<String>,
    #[serde(default)]
    pub last_message_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl UserRecord {
    fn minimal(id: String, name: String) -> Self {
        Self {
            id,
            name,
            is_mod: false,
            is_sub: false,
            persistent_mod: false,
            supermod: false,
            points: 0,
            auto_responses: Vec::new(),
            last_message_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsersDocument {
    pub users: Vec<UserRecord>,
}

/// Directory of every chatter the bot has seen, backed by a flat JSON
/// document. Lookups are linear scans; the document stays small enough for a
/// single channel that indexing would not pay for itself.
pub struct UserDirectory {
    store: JsonStore<UsersDocument>,
    resolver: Arc<dyn UserIdResolver>,
}

impl UserDirectory {
    pub fn open(path: impl AsRef<Path>, resolver: Arc<dyn UserIdResolver>) -> Result<Self, StoreError> {
        Ok(Self {
            store: JsonStore::open(path)?,
            resolver,
        })
    }

    pub async fn get_user(&self, id: &str) -> Option<UserRecord> {
        self.store
            .read(|doc| doc.users.iter().find(|u| u.id == id).cloned())
            .await
    }

    /// Resolve a username to a platform id, preferring the local cache and
    /// falling back to the platform resolver. A resolver failure is logged
    /// and treated as "unknown user" so one bad lookup never poisons the
    /// calling command.
    pub async fn get_user_id_by_name(&self, name: &str) -> Option<String> {
        let cached = self
            .store
            .read(|doc| {
                doc.users
                    .iter()
                    .find(|u| u.name.eq_ignore_ascii_case(name))
                    .map(|u| u.id.clone())
            })
            .await;
        if cached.is_some() {
            return cached;
        }

        match self.resolver.resolve_user_id(name).await {
            Ok(Some(id)) => {
                info!("Resolved unseen user '{}' to id {}", name, id);
                let record = UserRecord::minimal(id.clone(), name.to_lowercase());
                self.store
                    .update(|doc| {
                        if !doc.users.iter().any(|u| u.id == record.id) {
                            doc.users.push(record);
                        }
                    })
                    .await;
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("User id resolution failed for '{}': {}", name, e);
                None
            }
        }
    }

    /// Refresh the directory from an observed message. Creates the record on
    /// first sight, otherwise updates name and live flags in place.
    ///
    /// `last_message_at` is deliberately left alone here; the auto-response
    /// rule owns that field and must see the previous value. The returned
    /// record therefore still carries the pre-message timestamp.
    pub async fn upsert_from_message(&self, message: &ChatMessage) -> UserRecord {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == message.chatter_id) {
                    user.name = message.chatter_name.clone();
                    user.is_mod = message.is_moderator;
                    user.is_sub = message.is_subscriber;
                    user.clone()
                } else {
                    let mut user =
                        UserRecord::minimal(message.chatter_id.clone(), message.chatter_name.clone());
                    user.is_mod = message.is_moderator;
                    user.is_sub = message.is_subscriber;
                    doc.users.push(user.clone());
                    user
                }
            })
            .await
    }

    /// Record when the user last spoke. Runs once per qualifying message,
    /// whether or not an auto-response fired.
    pub async fn touch_last_message(&self, id: &str, at: chrono::DateTime<chrono::Utc>) {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                    user.last_message_at = Some(at);
                }
            })
            .await;
    }

    /// Update the live moderator flag. No-op for unknown ids.
    pub async fn set_live_mod(&self, id: &str, is_mod: bool) {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                    user.is_mod = is_mod;
                }
            })
            .await;
    }

    /// Flag a user so the rule engine keeps re-granting them moderator
    /// status whenever the platform loses it.
    pub async fn grant_permanent_mod(&self, id: &str) {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                    user.is_mod = true;
                    user.persistent_mod = true;
                }
            })
            .await;
    }

    /// Clear both the live and persistent moderator flags.
    pub async fn revoke_mod(&self, id: &str) {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                    user.is_mod = false;
                    user.persistent_mod = false;
                }
            })
            .await;
    }

    /// Promote a user to the local supermod tier.
    pub async fn set_supermod(&self, id: &str) {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                    user.supermod = true;
                }
            })
            .await;
    }

    /// Attach an auto-response phrase to a user, looked up by name.
    /// No-op when the user is unknown; this path never creates records.
    pub async fn append_auto_response(&self, name: &str, text: &str) {
        self.store
            .update(|doc| {
                if let Some(user) = doc
                    .users
                    .iter_mut()
                    .find(|u| u.name.eq_ignore_ascii_case(name))
                {
                    user.auto_responses.push(text.to_string());
                }
            })
            .await;
    }

    pub async fn add_points(&self, id: &str, amount: i64) {
        self.store
            .update(|doc| {
                if let Some(user) = doc.users.iter_mut().find(|u| u.id == id) {
                    user.points += amount;
                }
            })
            .await;
    }

    /// Local permission tier above ordinary chat moderator: the broadcaster
    /// always qualifies, as does anyone holding the supermod or persistent
    /// mod flag.
    pub async fn has_elevated_permission(&self, id: &str, is_broadcaster: bool) -> bool {
        if is_broadcaster {
            return true;
        }
        self.store
            .read(|doc| {
                doc.users
                    .iter()
                    .find(|u| u.id == id)
                    .map(|u| u.persistent_mod || u.supermod)
                    .unwrap_or(false)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct FakeResolver {
        known: HashMap<String, String>,
        fail: bool,
        calls: Mutex<u32>,
    }

    impl FakeResolver {
        fn new(known: &[(&str, &str)]) -> Self {
            Self {
                known: known
                    .iter()
                    .map(|(n, i)| (n.to_string(), i.to_string()))
                    .collect(),
                fail: false,
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                known: HashMap::new(),
                fail: true,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl UserIdResolver for FakeResolver {
        async fn resolve_user_id(&self, name: &str) -> Result<Option<String>> {
            *self.calls.lock().await += 1;
            if self.fail {
                anyhow::bail!("helix unavailable");
            }
            Ok(self.known.get(name).cloned())
        }
    }

    fn message(id: &str, name: &str) -> ChatMessage {
        ChatMessage {
            broadcaster_id: "owner".to_string(),
            chatter_id: id.to_string(),
            chatter_name: name.to_string(),
            text: "hello".to_string(),
            timestamp: chrono::Utc::now(),
            is_moderator: false,
            is_subscriber: false,
            is_vip: false,
            is_broadcaster: false,
            source_broadcaster_id: None,
        }
    }

    fn directory(resolver: FakeResolver) -> (UserDirectory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let directory =
            UserDirectory::open(dir.path().join("users.json"), Arc::new(resolver)).unwrap();
        (directory, dir)
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (directory, _guard) = directory(FakeResolver::new(&[]));
        directory.upsert_from_message(&message("1", "alice")).await;
        directory.upsert_from_message(&message("1", "alice")).await;

        let user = directory.get_user("1").await.unwrap();
        assert_eq!(user.name, "alice");
        assert!(!user.persistent_mod);
        assert_eq!(user.points, 0);

        let count = directory
            .store
            .read(|doc| doc.users.iter().filter(|u| u.id == "1").count())
            .await;
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rename_follows_last_writer() {
        let (directory, _guard) = directory(FakeResolver::new(&[]));
        directory.upsert_from_message(&message("1", "alice")).await;
        directory
            .upsert_from_message(&message("1", "alice_renamed"))
            .await;

        assert_eq!(
            directory.get_user_id_by_name("alice_renamed").await,
            Some("1".to_string())
        );
        assert_eq!(directory.get_user("1").await.unwrap().name, "alice_renamed");
    }

    #[tokio::test]
    async fn lookup_falls_back_to_resolver_and_caches() {
        let resolver = Arc::new(FakeResolver::new(&[("carol", "9")]));
        let dir = tempfile::tempdir().unwrap();
        let directory =
            UserDirectory::open(dir.path().join("users.json"), resolver.clone()).unwrap();

        assert_eq!(
            directory.get_user_id_by_name("carol").await,
            Some("9".to_string())
        );
        // Second lookup hits the upserted minimal record, not the resolver.
        assert_eq!(
            directory.get_user_id_by_name("carol").await,
            Some("9".to_string())
        );
        assert_eq!(*resolver.calls.lock().await, 1);
    }

    #[tokio::test]
    async fn resolver_failure_is_unknown_user() {
        let (directory, _guard) = directory(FakeResolver::failing());
        assert_eq!(directory.get_user_id_by_name("ghost").await, None);
    }

    #[tokio::test]
    async fn flag_updates_never_create_ghost_records() {
        let (directory, _guard) = directory(FakeResolver::new(&[]));
        directory.grant_permanent_mod("404").await;
        directory.set_supermod("404").await;
        directory.append_auto_response("nobody", "hi").await;
        assert!(directory.get_user("404").await.is_none());
        assert_eq!(
            directory.store.read(|doc| doc.users.len()).await,
            0
        );
    }

    #[tokio::test]
    async fn elevated_permission_tiers() {
        let (directory, _guard) = directory(FakeResolver::new(&[]));
        directory.upsert_from_message(&message("1", "alice")).await;
        directory.upsert_from_message(&message("2", "bob")).await;
        directory.grant_permanent_mod("1").await;

        assert!(directory.has_elevated_permission("1", false).await);
        assert!(!directory.has_elevated_permission("2", false).await);
        assert!(directory.has_elevated_permission("2", true).await);
        assert!(directory.has_elevated_permission("unknown", true).await);

        directory.set_supermod("2").await;
        assert!(directory.has_elevated_permission("2", false).await);
    }
}
