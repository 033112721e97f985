use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::BotConfig;
use crate::directory::UserDirectory;
use crate::games::{BrickGame, DiceGame, MiniGame};
use crate::platform::{ChannelApi, UserIdResolver};
use crate::types::IncomingEvent;

pub mod commands;
pub mod dispatcher;
pub mod rules;

#[cfg(test)]
pub(crate) mod test_support;

use commands::Commands;
use dispatcher::Dispatcher;
use rules::RuleEngine;

/// Composition root. Owns every service instance and hands `Arc` clones to
/// the rule engine and the dispatcher; nothing in the crate is a hidden
/// module-level singleton.
pub struct Bot {
    config: BotConfig,
    api: Arc<dyn ChannelApi>,
    pub(crate) directory: Arc<UserDirectory>,
    pub(crate) brick: Arc<BrickGame>,
    pub(crate) dice: Arc<DiceGame>,
    pub(crate) minigame: Arc<MiniGame>,
    engine: RuleEngine,
    dispatcher: Dispatcher,
}

impl Bot {
    /// Open all four stores and wire the services together. Store errors
    /// here are fatal by design: running with a silently empty store would
    /// drop moderator flags and game state.
    pub fn new(
        config: BotConfig,
        api: Arc<dyn ChannelApi>,
        resolver: Arc<dyn UserIdResolver>,
    ) -> Result<Self> {
        config.ensure_data_dir()?;

        let directory = Arc::new(UserDirectory::open(config.users_path(), resolver)?);
        let brick = Arc::new(BrickGame::open(config.brick_path())?);
        let dice = Arc::new(DiceGame::open(config.dice_path())?);
        let minigame = Arc::new(MiniGame::open(config.minigame_path())?);

        let engine = RuleEngine::new(
            Arc::clone(&directory),
            Arc::clone(&minigame),
            Arc::clone(&api),
        );
        let commands = Commands::new(
            Arc::clone(&directory),
            Arc::clone(&brick),
            Arc::clone(&dice),
            Arc::clone(&minigame),
            Arc::clone(&api),
            config.clone(),
        );
        let dispatcher = Dispatcher::new(commands, Arc::clone(&directory));

        Ok(Self {
            config,
            api,
            directory,
            brick,
            dice,
            minigame,
            engine,
            dispatcher,
        })
    }

    /// Drain the inbound event stream, one event at a time. A message's
    /// whole rule pipeline and any command it carries finish before the
    /// next event is taken, which is what preserves per-user ordering.
    pub async fn run(&self, mut events: mpsc::Receiver<IncomingEvent>) {
        info!("Bot event loop started for channel {}", self.config.broadcaster_name);
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        warn!("Event stream closed, bot event loop exiting");
    }

    pub async fn handle_event(&self, event: IncomingEvent) {
        match event {
            IncomingEvent::Chat(message) => {
                self.engine.handle_message(&message).await;
                if !message.is_shared_chat_relay() {
                    self.dispatcher.dispatch(&message).await;
                }
            }
            IncomingEvent::StreamOnline { .. } => {
                self.send(&format!(
                    "Hi... {}! You are live!",
                    self.config.broadcaster_name
                ))
                .await;
            }
            IncomingEvent::Follow { user_name, .. } => {
                self.send(&format!("Thanks for the follow, @{}!", user_name)).await;
            }
            IncomingEvent::Subscription { user_name, .. } => {
                self.send(&format!(
                    "Thanks for subscribing, @{}! Enjoy your stay.",
                    user_name
                ))
                .await;
            }
            IncomingEvent::AdBreak {
                duration_seconds, ..
            } => {
                if let Err(e) = self
                    .api
                    .send_announcement(&format!(
                        "Ads for {} seconds! Don't go anywhere.",
                        duration_seconds
                    ))
                    .await
                {
                    warn!("Failed to announce ad break: {}", e);
                }
            }
        }
    }

    async fn send(&self, text: &str) {
        if let Err(e) = self.api.send_message(text).await {
            warn!("Failed to send chat message: {}", e);
        }
    }
}
