use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bot::Bot;
use crate::config::BotConfig;
use crate::platform::{ChannelApi, UserIdResolver};
use crate::types::ChatMessage;

/// Every outbound platform call, recorded in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Message(String),
    Announcement(String),
    Timeout {
        user_id: String,
        duration: u64,
        reason: String,
    },
    AddModerator(String),
    RemoveModerator(String),
    AddVip(String),
    RemoveVip(String),
    Shoutout(String),
}

/// `ChannelApi` double that records every action. With `fail_everything`
/// set, calls are still recorded but return errors, which lets tests check
/// that the pipeline keeps going.
pub struct RecordingApi {
    actions: Mutex<Vec<Action>>,
    chatters: HashMap<String, String>,
    fail: Mutex<bool>,
}

impl RecordingApi {
    pub fn new(chatters: &[(&str, &str)]) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            chatters: chatters
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
            fail: Mutex::new(false),
        }
    }

    pub async fn actions(&self) -> Vec<Action> {
        self.actions.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.actions.lock().await.clear();
    }

    pub async fn fail_everything(&self) {
        *self.fail.lock().await = true;
    }

    async fn record(&self, action: Action) -> Result<()> {
        self.actions.lock().await.push(action);
        if *self.fail.lock().await {
            anyhow::bail!("injected platform failure");
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelApi for RecordingApi {
    async fn send_message(&self, text: &str) -> Result<()> {
        self.record(Action::Message(text.to_string())).await
    }

    async fn send_announcement(&self, text: &str) -> Result<()> {
        self.record(Action::Announcement(text.to_string())).await
    }

    async fn timeout_user(&self, user_id: &str, duration_seconds: u64, reason: &str) -> Result<()> {
        self.record(Action::Timeout {
            user_id: user_id.to_string(),
            duration: duration_seconds,
            reason: reason.to_string(),
        })
        .await
    }

    async fn add_moderator(&self, user_id: &str) -> Result<()> {
        self.record(Action::AddModerator(user_id.to_string())).await
    }

    async fn remove_moderator(&self, user_id: &str) -> Result<()> {
        self.record(Action::RemoveModerator(user_id.to_string())).await
    }

    async fn add_vip(&self, user_id: &str) -> Result<()> {
        self.record(Action::AddVip(user_id.to_string())).await
    }

    async fn remove_vip(&self, user_id: &str) -> Result<()> {
        self.record(Action::RemoveVip(user_id.to_string())).await
    }

    async fn send_shoutout(&self, target_broadcaster_id: &str) -> Result<()> {
        self.record(Action::Shoutout(target_broadcaster_id.to_string()))
            .await
    }

    async fn fetch_chatters(&self) -> Result<HashMap<String, String>> {
        Ok(self.chatters.clone())
    }
}

/// Resolver that only knows what the directory already taught it: nothing.
pub struct NoResolver;

#[async_trait]
impl UserIdResolver for NoResolver {
    async fn resolve_user_id(&self, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

pub struct Fixture {
    pub bot: Bot,
    pub api: Arc<RecordingApi>,
    _data_dir: tempfile::TempDir,
}

pub fn fixture() -> Fixture {
    fixture_with(&[])
}

/// Build a fully wired bot over temp stores, with the given chatter list
/// served by the fake platform.
pub fn fixture_with(chatters: &[(&str, &str)]) -> Fixture {
    let data_dir = tempfile::tempdir().unwrap();
    let config = BotConfig {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        access_token: "test-token".to_string(),
        bot_id: "botid".to_string(),
        bot_name: "brickbot".to_string(),
        owner_id: "owner".to_string(),
        broadcaster_name: "streamer".to_string(),
        data_dir: data_dir.path().to_path_buf(),
    };
    let api = Arc::new(RecordingApi::new(chatters));
    let bot = Bot::new(config, api.clone(), Arc::new(NoResolver)).unwrap();
    Fixture {
        bot,
        api,
        _data_dir: data_dir,
    }
}

/// A plain viewer message with the given id, name, and text.
pub fn chat(id: &str, name: &str, text: &str) -> ChatMessage {
    ChatMessage {
        broadcaster_id: "owner".to_string(),
        chatter_id: id.to_string(),
        chatter_name: name.to_string(),
        text: text.to_string(),
        timestamp: chrono::Utc::now(),
        is_moderator: false,
        is_subscriber: false,
        is_vip: false,
        is_broadcaster: false,
        source_broadcaster_id: None,
    }
}
