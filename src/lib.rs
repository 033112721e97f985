//! # brickbot
//!
//! A single-channel Twitch automation bot: it reads the channel's chat and
//! EventSub feed, runs every message through a layered moderation rule
//! pipeline (persistent-mod reconciliation, auto-responses, moderator
//! culling, keyword games), and serves a handful of chat games (`!brick`,
//! `!d20`, `!roll`) with per-command cooldowns and role gates.
//!
//! State lives in four flat JSON documents (users, brick targets, dice day
//! roster, minigame config) cached in memory and flushed on write. All
//! services are dependency-injected from the composition root in `bot`;
//! the platform is reached only through the `platform::ChannelApi` trait.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use brickbot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::from_env()?;
//!     let helix = Arc::new(HelixClient::new(&config));
//!     let bot = Bot::new(config.clone(), helix.clone(), helix.clone())?;
//!
//!     let (events_tx, events_rx) = tokio::sync::mpsc::channel(256);
//!     tokio::spawn(EventSubSocket::new(config, helix).run(events_tx));
//!     bot.run(events_rx).await;
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod config;
pub mod directory;
pub mod games;
pub mod platform;
pub mod store;
pub mod types;

pub mod prelude {
    pub use crate::bot::Bot;
    pub use crate::config::BotConfig;
    pub use crate::platform::{
        eventsub::EventSubSocket, helix::HelixClient, ChannelApi, UserIdResolver,
    };
    pub use crate::types::{ChatMessage, IncomingEvent};
    pub use anyhow::Result;
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
