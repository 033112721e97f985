use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::config::BotConfig;
use crate::platform::{ChannelApi, UserIdResolver};

const HELIX_BASE: &str = "https://api.twitch.tv/helix";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Thin Helix REST client acting as the bot account on the owner channel.
///
/// Starts from the configured access token and, when a call comes back 401,
/// fetches a fresh app token with the client-credentials grant and retries
/// the call once.
pub struct HelixClient {
    http: Client,
    client_id: String,
    client_secret: String,
    bot_id: String,
    broadcaster_id: String,
    token: RwLock<String>,
}

impl HelixClient {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            http: Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            bot_id: config.bot_id.clone(),
            broadcaster_id: config.owner_id.clone(),
            token: RwLock::new(config.access_token.clone()),
        }
    }

    async fn refresh_token(&self) -> Result<()> {
        info!("Access token rejected, requesting a fresh one");
        let response = self
            .http
            .post(TOKEN_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .context("token request failed")?;
        if !response.status().is_success() {
            anyhow::bail!("token request returned {}", response.status());
        }
        let payload: Value = response.json().await.context("invalid token response")?;
        let access_token = payload["access_token"]
            .as_str()
            .context("token response missing access_token")?;
        *self.token.write().await = access_token.to_string();
        Ok(())
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let token = self.token.read().await.clone();
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("Client-Id", &self.client_id);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Issue a Helix call, refreshing the token and retrying once on 401.
    async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}/{}", HELIX_BASE, path_and_query);
        debug!("Helix {} {}", method, path_and_query);

        let mut response = self.send_once(method.clone(), &url, body.as_ref()).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.refresh_token().await?;
            response = self.send_once(method, &url, body.as_ref()).await?;
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Helix {} returned {}: {}", path_and_query, status, text);
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).context("invalid Helix response body")
    }

    /// Register an EventSub websocket subscription on the given session.
    pub async fn create_eventsub_subscription(
        &self,
        session_id: &str,
        sub_type: &str,
        version: &str,
        condition: Value,
    ) -> Result<()> {
        self.request(
            Method::POST,
            "eventsub/subscriptions",
            Some(json!({
                "type": sub_type,
                "version": version,
                "condition": condition,
                "transport": {
                    "method": "websocket",
                    "session_id": session_id,
                },
            })),
        )
        .await?;
        info!("Subscribed to {}", sub_type);
        Ok(())
    }
}

#[async_trait]
impl ChannelApi for HelixClient {
    async fn send_message(&self, text: &str) -> Result<()> {
        self.request(
            Method::POST,
            "chat/messages",
            Some(json!({
                "broadcaster_id": self.broadcaster_id,
                "sender_id": self.bot_id,
                "message": text,
            })),
        )
        .await?;
        Ok(())
    }

    async fn send_announcement(&self, text: &str) -> Result<()> {
        let path = format!(
            "chat/announcements?broadcaster_id={}&moderator_id={}",
            self.broadcaster_id, self.bot_id
        );
        self.request(Method::POST, &path, Some(json!({ "message": text })))
            .await?;
        Ok(())
    }

    async fn timeout_user(&self, user_id: &str, duration_seconds: u64, reason: &str) -> Result<()> {
        let path = format!(
            "moderation/bans?broadcaster_id={}&moderator_id={}",
            self.broadcaster_id, self.bot_id
        );
        self.request(
            Method::POST,
            &path,
            Some(json!({
                "data": {
                    "user_id": user_id,
                    "duration": duration_seconds,
                    "reason": reason,
                }
            })),
        )
        .await?;
        Ok(())
    }

    async fn add_moderator(&self, user_id: &str) -> Result<()> {
        let path = format!(
            "moderation/moderators?broadcaster_id={}&user_id={}",
            self.broadcaster_id, user_id
        );
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn remove_moderator(&self, user_id: &str) -> Result<()> {
        let path = format!(
            "moderation/moderators?broadcaster_id={}&user_id={}",
            self.broadcaster_id, user_id
        );
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn add_vip(&self, user_id: &str) -> Result<()> {
        let path = format!(
            "channels/vips?broadcaster_id={}&user_id={}",
            self.broadcaster_id, user_id
        );
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn remove_vip(&self, user_id: &str) -> Result<()> {
        let path = format!(
            "channels/vips?broadcaster_id={}&user_id={}",
            self.broadcaster_id, user_id
        );
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn send_shoutout(&self, target_broadcaster_id: &str) -> Result<()> {
        let path = format!(
            "chat/shoutouts?from_broadcaster_id={}&to_broadcaster_id={}&moderator_id={}",
            self.broadcaster_id, target_broadcaster_id, self.bot_id
        );
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn fetch_chatters(&self) -> Result<HashMap<String, String>> {
        let path = format!(
            "chat/chatters?broadcaster_id={}&moderator_id={}&first=1000",
            self.broadcaster_id, self.bot_id
        );
        let payload = self.request(Method::GET, &path, None).await?;
        let mut chatters = HashMap::new();
        if let Some(entries) = payload["data"].as_array() {
            for entry in entries {
                if let (Some(id), Some(login)) =
                    (entry["user_id"].as_str(), entry["user_login"].as_str())
                {
                    chatters.insert(id.to_string(), login.to_string());
                }
            }
        }
        debug!("Fetched {} chatters", chatters.len());
        Ok(chatters)
    }
}

#[async_trait]
impl UserIdResolver for HelixClient {
    async fn resolve_user_id(&self, name: &str) -> Result<Option<String>> {
        let path = format!("users?login={}", name);
        let payload = self.request(Method::GET, &path, None).await?;
        let id = payload["data"]
            .as_array()
            .and_then(|entries| entries.first())
            .and_then(|entry| entry["id"].as_str())
            .map(String::from);
        if id.is_none() {
            warn!("No Twitch user found for login '{}'", name);
        }
        Ok(id)
    }
}
