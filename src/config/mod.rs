use anyhow::{Context, Result};
use log::info;
use std::env;
use std::path::PathBuf;

/// Process configuration, loaded once at startup from environment variables
/// (a `.env` file is honored via dotenv). Keyword-game settings are not
/// here; those live in the minigame store and are adjusted through elevated
/// chat commands while the bot runs.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Twitch application client id.
    pub client_id: String,
    /// Twitch application client secret.
    pub client_secret: String,
    /// User access token for the bot account (chat + moderation scopes).
    pub access_token: String,
    /// Account id the bot acts as.
    pub bot_id: String,
    /// Lowercased login name of the bot account.
    pub bot_name: String,
    /// The owner channel's broadcaster id.
    pub owner_id: String,
    /// Lowercased login name of the broadcaster.
    pub broadcaster_name: String,
    /// Directory holding the four flat JSON documents.
    pub data_dir: PathBuf,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let client_id = env::var("CLIENT_ID").context("CLIENT_ID environment variable not set")?;
        let client_secret =
            env::var("CLIENT_SECRET").context("CLIENT_SECRET environment variable not set")?;
        let access_token =
            env::var("ACCESS_TOKEN").context("ACCESS_TOKEN environment variable not set")?;
        let bot_id = env::var("BOT_ID").context("BOT_ID environment variable not set")?;
        let bot_name = env::var("BOT_NAME")
            .context("BOT_NAME environment variable not set")?
            .to_lowercase();
        let owner_id = env::var("OWNER_ID").context("OWNER_ID environment variable not set")?;
        let broadcaster_name = env::var("BROADCASTER_NAME")
            .context("BROADCASTER_NAME environment variable not set")?
            .to_lowercase();
        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        info!(
            "Loaded config for bot '{}' on channel '{}'",
            bot_name, broadcaster_name
        );

        Ok(Self {
            client_id,
            client_secret,
            access_token,
            bot_id,
            bot_name,
            owner_id,
            broadcaster_name,
            data_dir,
        })
    }

    /// Create the data directory if it does not exist yet.
    pub fn ensure_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create data dir {}", self.data_dir.display()))
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn brick_path(&self) -> PathBuf {
        self.data_dir.join("brick.json")
    }

    pub fn dice_path(&self) -> PathBuf {
        self.data_dir.join("dice.json")
    }

    pub fn minigame_path(&self) -> PathBuf {
        self.data_dir.join("minigame.json")
    }
}
