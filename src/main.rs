use std::sync::Arc;

use log::{error, info};
use tokio::sync::mpsc;

use brickbot::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("Starting brickbot v{}", brickbot::VERSION);

    let config = BotConfig::from_env()?;
    let helix = Arc::new(HelixClient::new(&config));
    let bot = Bot::new(config.clone(), helix.clone(), helix.clone())?;

    let (events_tx, events_rx) = mpsc::channel(256);
    let eventsub = tokio::spawn(EventSubSocket::new(config, helix).run(events_tx));

    bot.run(events_rx).await;

    error!("Event stream ended, shutting down");
    eventsub.abort();
    Ok(())
}
