use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::config::BotConfig;
use crate::platform::helix::HelixClient;
use crate::types::{ChatMessage, IncomingEvent};

const EVENTSUB_URL: &str = "wss://eventsub.wss.twitch.tv/ws";
const RECONNECT_DELAY_SECS: u64 = 5;

/// EventSub websocket session feeding the bot's inbound event channel.
///
/// On welcome it registers the channel's subscriptions through Helix, then
/// translates notification frames into [`IncomingEvent`]s. Dropped sessions
/// are re-dialed until the receiving side goes away.
pub struct EventSubSocket {
    config: BotConfig,
    helix: Arc<HelixClient>,
}

impl EventSubSocket {
    pub fn new(config: BotConfig, helix: Arc<HelixClient>) -> Self {
        Self { config, helix }
    }

    pub async fn run(self, events: mpsc::Sender<IncomingEvent>) {
        loop {
            if let Err(e) = self.session(&events).await {
                error!("EventSub session ended: {}", e);
            }
            if events.is_closed() {
                info!("Event channel closed, EventSub task exiting");
                return;
            }
            info!("Reconnecting to EventSub in {}s", RECONNECT_DELAY_SECS);
            sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
        }
    }

    async fn session(&self, events: &mpsc::Sender<IncomingEvent>) -> Result<()> {
        let url = Url::parse(EVENTSUB_URL).context("invalid EventSub URL")?;
        let (ws_stream, _) = connect_async(url)
            .await
            .context("failed to connect to EventSub")?;
        info!("Connected to EventSub");

        let (mut write, mut read) = ws_stream.split();

        while let Some(frame) = read.next().await {
            match frame.context("EventSub read error")? {
                Message::Text(text) => {
                    if !self.handle_frame(&text, events).await? {
                        break;
                    }
                }
                Message::Ping(payload) => {
                    write
                        .send(Message::Pong(payload))
                        .await
                        .context("failed to send pong")?;
                }
                Message::Close(frame) => {
                    info!("EventSub connection closed: {:?}", frame);
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns false when the session should be torn down and re-dialed.
    async fn handle_frame(
        &self,
        text: &str,
        events: &mpsc::Sender<IncomingEvent>,
    ) -> Result<bool> {
        let payload: Value = serde_json::from_str(text).context("invalid EventSub frame")?;
        match payload["metadata"]["message_type"].as_str() {
            Some("session_welcome") => {
                let session_id = payload["payload"]["session"]["id"]
                    .as_str()
                    .context("welcome frame missing session id")?;
                self.subscribe_all(session_id).await?;
            }
            Some("session_keepalive") => {
                debug!("EventSub keepalive");
            }
            Some("session_reconnect") => {
                warn!("EventSub requested a reconnect");
                return Ok(false);
            }
            Some("notification") => {
                let sub_type = payload["metadata"]["subscription_type"]
                    .as_str()
                    .unwrap_or_default();
                if let Some(event) = parse_notification(sub_type, &payload["payload"]["event"]) {
                    if events.send(event).await.is_err() {
                        return Ok(false);
                    }
                } else {
                    debug!("Ignoring notification of type {}", sub_type);
                }
            }
            Some("revocation") => {
                warn!(
                    "EventSub subscription revoked: {}",
                    payload["payload"]["subscription"]["type"]
                );
            }
            other => {
                debug!("Unhandled EventSub frame type: {:?}", other);
            }
        }
        Ok(true)
    }

    async fn subscribe_all(&self, session_id: &str) -> Result<()> {
        let owner = &self.config.owner_id;
        let bot = &self.config.bot_id;

        self.helix
            .create_eventsub_subscription(
                session_id,
                "channel.chat.message",
                "1",
                json!({ "broadcaster_user_id": owner, "user_id": bot }),
            )
            .await?;
        self.helix
            .create_eventsub_subscription(
                session_id,
                "stream.online",
                "1",
                json!({ "broadcaster_user_id": owner }),
            )
            .await?;
        self.helix
            .create_eventsub_subscription(
                session_id,
                "channel.follow",
                "2",
                json!({ "broadcaster_user_id": owner, "moderator_user_id": bot }),
            )
            .await?;
        self.helix
            .create_eventsub_subscription(
                session_id,
                "channel.subscribe",
                "1",
                json!({ "broadcaster_user_id": owner }),
            )
            .await?;
        self.helix
            .create_eventsub_subscription(
                session_id,
                "channel.ad_break.begin",
                "1",
                json!({ "broadcaster_user_id": owner }),
            )
            .await?;
        Ok(())
    }
}

/// Translate one EventSub notification into an inbound event.
fn parse_notification(sub_type: &str, event: &Value) -> Option<IncomingEvent> {
    match sub_type {
        "channel.chat.message" => Some(IncomingEvent::Chat(parse_chat_message(event)?)),
        "stream.online" => Some(IncomingEvent::StreamOnline {
            broadcaster_id: event["broadcaster_user_id"].as_str()?.to_string(),
        }),
        "channel.follow" => Some(IncomingEvent::Follow {
            broadcaster_id: event["broadcaster_user_id"].as_str()?.to_string(),
            user_name: event["user_login"]
                .as_str()
                .or_else(|| event["user_name"].as_str())?
                .to_lowercase(),
        }),
        "channel.subscribe" => Some(IncomingEvent::Subscription {
            broadcaster_id: event["broadcaster_user_id"].as_str()?.to_string(),
            user_name: event["user_login"]
                .as_str()
                .or_else(|| event["user_name"].as_str())?
                .to_lowercase(),
        }),
        "channel.ad_break.begin" => Some(IncomingEvent::AdBreak {
            broadcaster_id: event["broadcaster_user_id"].as_str()?.to_string(),
            duration_seconds: event["duration_seconds"].as_u64().unwrap_or(0),
        }),
        _ => None,
    }
}

fn parse_chat_message(event: &Value) -> Option<ChatMessage> {
    let broadcaster_id = event["broadcaster_user_id"].as_str()?.to_string();
    let chatter_id = event["chatter_user_id"].as_str()?.to_string();
    let chatter_name = event["chatter_user_login"]
        .as_str()
        .or_else(|| event["chatter_user_name"].as_str())?
        .to_lowercase();
    let text = event["message"]["text"].as_str()?.to_string();

    let mut is_moderator = false;
    let mut is_subscriber = false;
    let mut is_vip = false;
    if let Some(badges) = event["badges"].as_array() {
        for badge in badges {
            match badge["set_id"].as_str() {
                Some("moderator") => is_moderator = true,
                Some("subscriber") | Some("founder") => is_subscriber = true,
                Some("vip") => is_vip = true,
                _ => {}
            }
        }
    }
    let is_broadcaster = chatter_id == broadcaster_id;
    // Broadcasters moderate their own channel even without the badge.
    if is_broadcaster {
        is_moderator = true;
    }

    let source_broadcaster_id = event["source_broadcaster_user_id"]
        .as_str()
        .map(String::from);

    Some(ChatMessage {
        broadcaster_id,
        chatter_id,
        chatter_name,
        text,
        timestamp: chrono::Utc::now(),
        is_moderator,
        is_subscriber,
        is_vip,
        is_broadcaster,
        source_broadcaster_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_chat_notification() {
        let event = json!({
            "broadcaster_user_id": "owner",
            "chatter_user_id": "1",
            "chatter_user_login": "Alice",
            "message": { "text": "hello chat" },
            "badges": [
                { "set_id": "vip", "id": "1" },
                { "set_id": "subscriber", "id": "3" }
            ],
            "source_broadcaster_user_id": null
        });

        let parsed = parse_notification("channel.chat.message", &event).unwrap();
        let IncomingEvent::Chat(message) = parsed else {
            panic!("expected a chat event");
        };
        assert_eq!(message.chatter_name, "alice");
        assert_eq!(message.text, "hello chat");
        assert!(message.is_vip);
        assert!(message.is_subscriber);
        assert!(!message.is_moderator);
        assert!(message.source_broadcaster_id.is_none());
    }

    #[test]
    fn broadcaster_counts_as_moderator() {
        let event = json!({
            "broadcaster_user_id": "owner",
            "chatter_user_id": "owner",
            "chatter_user_login": "streamer",
            "message": { "text": "my channel" },
            "badges": [{ "set_id": "broadcaster", "id": "1" }]
        });

        let IncomingEvent::Chat(message) =
            parse_notification("channel.chat.message", &event).unwrap()
        else {
            panic!("expected a chat event");
        };
        assert!(message.is_broadcaster);
        assert!(message.is_moderator);
    }

    #[test]
    fn parses_ad_break_and_follow() {
        let ad = json!({ "broadcaster_user_id": "owner", "duration_seconds": 90 });
        assert!(matches!(
            parse_notification("channel.ad_break.begin", &ad),
            Some(IncomingEvent::AdBreak { duration_seconds: 90, .. })
        ));

        let follow = json!({ "broadcaster_user_id": "owner", "user_login": "Bob" });
        let Some(IncomingEvent::Follow { user_name, .. }) =
            parse_notification("channel.follow", &follow)
        else {
            panic!("expected a follow event");
        };
        assert_eq!(user_name, "bob");
    }

    #[test]
    fn unknown_subscription_types_are_ignored() {
        assert!(parse_notification("channel.raid", &json!({})).is_none());
    }
}
