use log::{info, warn};
use rand::prelude::IteratorRandom;
use rand::Rng;
use std::sync::Arc;

use crate::config::BotConfig;
use crate::directory::UserDirectory;
use crate::games::{BrickGame, DiceGame, MiniGame};
use crate::platform::ChannelApi;
use crate::types::ChatMessage;

/// Parse dice notation `NdM` with an optional count, e.g. `d20` or `3d6`.
/// Both the count and the number of sides must be in 1..=100.
pub fn parse_dice(spec: &str) -> Option<(u32, u32)> {
    let (count_str, sides_str) = spec.split_once('d')?;
    if !count_str.chars().all(|c| c.is_ascii_digit())
        || sides_str.is_empty()
        || !sides_str.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let count: u32 = if count_str.is_empty() {
        1
    } else {
        count_str.parse().ok()?
    };
    let sides: u32 = sides_str.parse().ok()?;
    if !(1..=100).contains(&count) || !(1..=100).contains(&sides) {
        return None;
    }
    Some((count, sides))
}

/// Command handler bodies. Role checks, cooldowns, and argument
/// sanitization have already happened in the dispatcher by the time any of
/// these run; handlers only validate their own arguments and reply in chat.
pub struct Commands {
    directory: Arc<UserDirectory>,
    brick: Arc<BrickGame>,
    dice: Arc<DiceGame>,
    minigame: Arc<MiniGame>,
    api: Arc<dyn ChannelApi>,
    config: BotConfig,
}

impl Commands {
    pub fn new(
        directory: Arc<UserDirectory>,
        brick: Arc<BrickGame>,
        dice: Arc<DiceGame>,
        minigame: Arc<MiniGame>,
        api: Arc<dyn ChannelApi>,
        config: BotConfig,
    ) -> Self {
        Self {
            directory,
            brick,
            dice,
            minigame,
            api,
            config,
        }
    }

    /// `!brick [target]` - throw a brick at a named target, or at a random
    /// chatter when no target is given. Hitting your stored target earns a
    /// point and times the target out; hitting the streamer (or the bot)
    /// backfires onto the thrower.
    pub async fn brick(&self, message: &ChatMessage, args: &[String]) {
        let duration = self.minigame.config().await.timeout_duration_seconds;

        if !args.is_empty() {
            // Deliberately permissive: any string can be bricked.
            let target = args.join(" ");
            self.reply(&format!(
                "{} threw a brick at {}",
                message.chatter_name, target
            ))
            .await;
            if self.is_protected_target(&target) {
                self.reply("You just threw a brick at the streamer! Now you die.")
                    .await;
                self.self_penalty(message, duration).await;
            }
            return;
        }

        let chatters = match self.api.fetch_chatters().await {
            Ok(chatters) if !chatters.is_empty() => chatters,
            Ok(_) => {
                self.reply("Nobody is around to brick.").await;
                return;
            }
            Err(e) => {
                warn!("Failed to fetch chatters for !brick: {}", e);
                return;
            }
        };

        let picked = {
            let mut rng = rand::rng();
            chatters
                .iter()
                .choose(&mut rng)
                .map(|(id, name)| (id.clone(), name.clone()))
        };
        let Some((target_id, target_name)) = picked else {
            return;
        };
        info!("!brick roulette picked {}", target_name);

        if self.is_protected_target(&target_name) {
            self.reply("You just threw a brick at the streamer! Now you die.")
                .await;
            self.self_penalty(message, duration).await;
            return;
        }

        if target_name.eq_ignore_ascii_case(&self.brick.target_for(&message.chatter_name).await) {
            self.reply("You hit your target! You gain a point!").await;
            self.directory.add_points(&message.chatter_id, 1).await;
            if let Err(e) = self.api.remove_vip(&target_id).await {
                warn!("Failed to revoke VIP from bricked target: {}", e);
            }
            if let Err(e) = self
                .api
                .timeout_user(&target_id, duration, "Hit by a well-aimed brick")
                .await
            {
                warn!("Failed to time out bricked target: {}", e);
            }
            return;
        }

        self.reply(&format!(
            "{} threw a brick at {}",
            message.chatter_name, target_name
        ))
        .await;
    }

    /// `!target [name]` - report or set the caller's brick target.
    pub async fn brick_target(&self, message: &ChatMessage, args: &[String]) {
        let target = match args.first() {
            Some(target) => target,
            None => {
                let current = self.brick.target_for(&message.chatter_name).await;
                self.reply(&format!("Your current target is set to: {}", current))
                    .await;
                return;
            }
        };

        if target.eq_ignore_ascii_case(&message.chatter_name) {
            self.reply("You cannot set yourself as your target.").await;
            return;
        }
        if target.eq_ignore_ascii_case(&self.config.broadcaster_name) {
            self.reply("You cannot set the streamer as your target.").await;
            return;
        }
        if target.eq_ignore_ascii_case(&self.config.bot_name) {
            self.reply("Nice try. You cannot set me as your target.").await;
            return;
        }

        self.brick.set_target(&message.chatter_name, target).await;
        self.reply(&format!("Set {} as your target.", target)).await;
    }

    /// `!roll NdM` - roll N dice with M sides each and report the total.
    pub async fn roll(&self, message: &ChatMessage, args: &[String]) {
        let parsed = args.first().and_then(|spec| parse_dice(spec));
        let (count, sides) = match parsed {
            Some(parsed) => parsed,
            None => {
                self.reply(
                    "Usage: !roll NdM (e.g. 2d6). Dice count and sides must be between 1 and 100.",
                )
                .await;
                return;
            }
        };

        let rolls: Vec<u32> = {
            let mut rng = rand::rng();
            (0..count).map(|_| rng.random_range(1..=sides)).collect()
        };
        let total: u32 = rolls.iter().sum();
        let rolled = rolls
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.reply(&format!(
            "{} rolled {} (total {})",
            message.mention(),
            rolled,
            total
        ))
        .await;
    }

    /// `!d20` - the legacy fixed die. A natural 20 on the first roll of the
    /// day grants VIP; a 1 times the caller out and revokes their VIP.
    pub async fn d20(&self, message: &ChatMessage) {
        let roll = {
            let mut rng = rand::rng();
            rng.random_range(1..=20)
        };
        self.d20_outcome(message, roll).await;
    }

    /// Apply the outcome for a given d20 roll value.
    pub(crate) async fn d20_outcome(&self, message: &ChatMessage, roll: u32) {
        match roll {
            20 => {
                if !self.dice.has_rolled_today(&message.chatter_name).await {
                    self.reply(&format!(
                        "{} rolls a natural 20! Welcome to the VIP club!",
                        message.mention()
                    ))
                    .await;
                    if let Err(e) = self.api.add_vip(&message.chatter_id).await {
                        warn!("Failed to grant VIP for a natural 20: {}", e);
                    }
                } else {
                    self.reply(&format!("{} rolls a natural 20!", message.mention()))
                        .await;
                }
            }
            1 => {
                self.reply(&format!("{} rolls a 1! CRITICAL FAIL!", message.mention()))
                    .await;
                let duration = self.minigame.config().await.timeout_duration_seconds;
                if let Err(e) = self.api.remove_vip(&message.chatter_id).await {
                    warn!("Failed to revoke VIP after a critical fail: {}", e);
                }
                if let Err(e) = self
                    .api
                    .timeout_user(&message.chatter_id, duration, "Rolled a 1")
                    .await
                {
                    warn!("Failed to time out after a critical fail: {}", e);
                }
            }
            other => {
                self.reply(&format!("{} rolls a {}!", message.mention(), other))
                    .await;
            }
        }

        self.dice.record_roll(&message.chatter_name).await;
    }

    /// `!mod <name>` - grant live moderator status.
    pub async fn grant_mod(&self, _message: &ChatMessage, args: &[String]) {
        let Some(id) = self.resolve_target(args, "mod").await else {
            return;
        };
        if let Err(e) = self.api.add_moderator(&id).await {
            warn!("Failed to add moderator: {}", e);
        }
        self.directory.set_live_mod(&id, true).await;
        self.reply(&format!("Granted mod status to {}.", args[0])).await;
    }

    /// `!unmod <name>` - revoke both live and persistent moderator status.
    pub async fn revoke_mod(&self, _message: &ChatMessage, args: &[String]) {
        let Some(id) = self.resolve_target(args, "unmod").await else {
            return;
        };
        self.directory.revoke_mod(&id).await;
        if let Err(e) = self.api.remove_moderator(&id).await {
            warn!("Failed to remove moderator: {}", e);
        }
        self.reply(&format!("Revoking mod status from {}", args[0])).await;
    }

    /// `!permamod <name>` - flag a user so the rule engine keeps re-granting
    /// them moderator status.
    pub async fn grant_permamod(&self, _message: &ChatMessage, args: &[String]) {
        let Some(id) = self.resolve_target(args, "grant permanent mod status to").await else {
            return;
        };
        self.directory.grant_permanent_mod(&id).await;
        if let Err(e) = self.api.add_moderator(&id).await {
            warn!("Failed to add moderator: {}", e);
        }
        self.reply(&format!("Granted permanent mod status to {}.", args[0]))
            .await;
    }

    /// `!supermod <name>` - promote to the local bot-administration tier.
    pub async fn grant_supermod(&self, _message: &ChatMessage, args: &[String]) {
        let Some(id) = self.resolve_target(args, "grant supermod status to").await else {
            return;
        };
        self.directory.set_supermod(&id).await;
        self.reply(&format!("Granted supermod status to {}.", args[0]))
            .await;
    }

    /// `!vip <name>` - grant channel VIP status.
    pub async fn grant_vip(&self, _message: &ChatMessage, args: &[String]) {
        let Some(id) = self.resolve_target(args, "vip").await else {
            return;
        };
        if let Err(e) = self.api.add_vip(&id).await {
            warn!("Failed to add VIP: {}", e);
        }
        self.reply(&format!("Granted VIP status to {}.", args[0])).await;
    }

    /// `!shoutout <name>` - platform shoutout plus an announcement.
    pub async fn shoutout(&self, _message: &ChatMessage, args: &[String]) {
        let Some(id) = self.resolve_target(args, "shout out").await else {
            return;
        };
        if let Err(e) = self.api.send_shoutout(&id).await {
            warn!("Failed to send shoutout: {}", e);
        }
        self.announce(&format!(
            "Go give {} a follow at https://twitch.tv/{} !",
            args[0], args[0]
        ))
        .await;
    }

    /// `!autoreply <name> <text...>` - attach an auto-response phrase to a
    /// user; one is sent at random when they speak after a quiet spell.
    pub async fn auto_reply(&self, _message: &ChatMessage, args: &[String]) {
        if args.len() < 2 {
            self.reply("Usage: !autoreply <username> <response text>").await;
            return;
        }
        let name = &args[0];
        if self.directory.get_user_id_by_name(name).await.is_none() {
            self.reply(&format!(
                "{} is not a valid user. They must have chatted at least once to be a valid target.",
                name
            ))
            .await;
            return;
        }
        let text = args[1..].join(" ");
        self.directory.append_auto_response(name, &text).await;
        self.reply(&format!("Added an auto-response for {}.", name)).await;
    }

    /// `!culling on|off` - toggle timing out non-persistent moderators.
    pub async fn culling(&self, _message: &ChatMessage, args: &[String]) {
        let enabled = match args.first().map(String::as_str) {
            Some("on") => true,
            Some("off") => false,
            _ => {
                self.reply("Usage: !culling on|off").await;
                return;
            }
        };
        self.minigame.set_culling_mode(enabled).await;
        self.reply(&format!(
            "Culling mode is now {}.",
            if enabled { "on" } else { "off" }
        ))
        .await;
    }

    /// `!banword <keyword>` - set the keyword that times people out.
    pub async fn set_ban_keyword(&self, _message: &ChatMessage, args: &[String]) {
        let Some(keyword) = args.first() else {
            self.reply("Usage: !banword <keyword>").await;
            return;
        };
        self.minigame.set_ban_keyword(keyword).await;
        self.reply("The forbidden word has been updated.").await;
    }

    /// `!vipword <keyword>` - set and re-arm the VIP keyword game.
    pub async fn set_vip_keyword(&self, _message: &ChatMessage, args: &[String]) {
        let Some(keyword) = args.first() else {
            self.reply("Usage: !vipword <keyword>").await;
            return;
        };
        self.minigame.set_vip_keyword(keyword).await;
        self.reply("A new VIP keyword is hidden in plain sight.").await;
    }

    /// `!modword <keyword>` - set and re-arm the mod keyword game.
    pub async fn set_mod_keyword(&self, _message: &ChatMessage, args: &[String]) {
        let Some(keyword) = args.first() else {
            self.reply("Usage: !modword <keyword>").await;
            return;
        };
        self.minigame.set_mod_keyword(keyword).await;
        self.reply("A new mod keyword is hidden in plain sight.").await;
    }

    /// `!banlength <seconds>` - set the timeout duration used by the games.
    pub async fn set_ban_length(&self, _message: &ChatMessage, args: &[String]) {
        let seconds = args.first().and_then(|a| a.parse::<u64>().ok());
        let Some(seconds) = seconds.filter(|s| (1..=1_209_600).contains(s)) else {
            self.reply("Usage: !banlength <seconds> (1 to 1209600)").await;
            return;
        };
        self.minigame.set_timeout_duration(seconds).await;
        self.reply(&format!("Timeouts now last {} seconds.", seconds)).await;
    }

    /// `!resetvip` - re-arm the one-shot VIP keyword game.
    pub async fn reset_vip(&self, _message: &ChatMessage) {
        self.minigame.reset_vip().await;
        self.reply("The VIP keyword game is armed again.").await;
    }

    /// `!resetmod` - re-arm the one-shot mod keyword game.
    pub async fn reset_mod(&self, _message: &ChatMessage) {
        self.minigame.reset_mod().await;
        self.reply("The mod keyword game is armed again.").await;
    }

    pub async fn help(&self, _message: &ChatMessage) {
        self.reply(
            "Viewer commands: !brick, !target, !roll, !d20, !help. \
             Broadcaster commands: !mod/!m, !unmod/!um, !permamod/!pm, !supermod, !vip, !shoutout.",
        )
        .await;
    }

    pub async fn commands_list(&self, _message: &ChatMessage) {
        self.reply(
            "!brick - bricks a random chatter, but backfires if you hit the streamer. \
             !brick <name> - bricks the named user. !target <name> - picks your roulette target. \
             !roll NdM - rolls dice. !d20 - rolls a d20 and times you out on a 1.",
        )
        .await;
    }

    // Shared plumbing

    async fn resolve_target(&self, args: &[String], action: &str) -> Option<String> {
        let name = match args.first() {
            Some(name) => name,
            None => {
                self.reply(&format!("Please provide a username to {}.", action))
                    .await;
                return None;
            }
        };
        match self.directory.get_user_id_by_name(name).await {
            Some(id) => Some(id),
            None => {
                self.reply(&format!(
                    "{} is not a valid user. They must have chatted at least once to be a valid target.",
                    name
                ))
                .await;
                None
            }
        }
    }

    fn is_protected_target(&self, target: &str) -> bool {
        let target = target.to_lowercase();
        target == self.config.bot_name || target.contains(&self.config.broadcaster_name)
    }

    async fn self_penalty(&self, message: &ChatMessage, duration: u64) {
        if let Err(e) = self.api.remove_vip(&message.chatter_id).await {
            warn!("Failed to revoke VIP during brick penalty: {}", e);
        }
        if let Err(e) = self
            .api
            .timeout_user(&message.chatter_id, duration, "Lost brick roulette")
            .await
        {
            warn!("Failed to time out brick thrower: {}", e);
        }
    }

    async fn reply(&self, text: &str) {
        if let Err(e) = self.api.send_message(text).await {
            warn!("Failed to send chat reply: {}", e);
        }
    }

    async fn announce(&self, text: &str) {
        if let Err(e) = self.api.send_announcement(text).await {
            warn!("Failed to send announcement: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::test_support::{chat, Action, NoResolver, RecordingApi};

    fn commands_fixture() -> (Commands, Arc<RecordingApi>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = BotConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            access_token: "test-token".to_string(),
            bot_id: "botid".to_string(),
            bot_name: "brickbot".to_string(),
            owner_id: "owner".to_string(),
            broadcaster_name: "streamer".to_string(),
            data_dir: dir.path().to_path_buf(),
        };
        let api = Arc::new(RecordingApi::new(&[]));
        let directory = Arc::new(
            UserDirectory::open(dir.path().join("users.json"), Arc::new(NoResolver)).unwrap(),
        );
        let brick = Arc::new(BrickGame::open(dir.path().join("brick.json")).unwrap());
        let dice = Arc::new(DiceGame::open(dir.path().join("dice.json")).unwrap());
        let minigame = Arc::new(MiniGame::open(dir.path().join("minigame.json")).unwrap());
        let commands = Commands::new(directory, brick, dice, minigame, api.clone(), config);
        (commands, api, dir)
    }

    #[tokio::test]
    async fn natural_twenty_grants_vip_only_on_the_first_roll_of_the_day() {
        let (commands, api, _guard) = commands_fixture();
        let message = chat("6", "carol", "!d20");

        commands.d20_outcome(&message, 20).await;
        let actions = api.actions().await;
        assert!(actions.contains(&Action::AddVip("6".to_string())));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Message(m) if m.contains("natural 20"))));

        // Same day, second natural 20: no second VIP grant.
        api.clear().await;
        commands.d20_outcome(&message, 20).await;
        let actions = api.actions().await;
        assert!(!actions.iter().any(|a| matches!(a, Action::AddVip(_))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Message(m) if m.contains("natural 20"))));
    }

    #[tokio::test]
    async fn rolling_a_one_times_out_the_caller_and_revokes_vip() {
        let (commands, api, _guard) = commands_fixture();
        let message = chat("6", "carol", "!d20");

        commands.d20_outcome(&message, 1).await;

        let actions = api.actions().await;
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Message(m) if m.contains("CRITICAL FAIL"))));
        assert!(actions.contains(&Action::RemoveVip("6".to_string())));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Timeout { user_id, reason, .. }
                if user_id == "6" && reason == "Rolled a 1")));
    }

    #[tokio::test]
    async fn ordinary_rolls_only_report_the_number() {
        let (commands, api, _guard) = commands_fixture();
        let message = chat("6", "carol", "!d20");

        commands.d20_outcome(&message, 12).await;

        let actions = api.actions().await;
        assert_eq!(
            actions,
            vec![Action::Message("@carol rolls a 12!".to_string())]
        );
    }

    #[test]
    fn dice_notation_accepts_optional_count() {
        assert_eq!(parse_dice("d20"), Some((1, 20)));
        assert_eq!(parse_dice("2d6"), Some((2, 6)));
        assert_eq!(parse_dice("100d100"), Some((100, 100)));
    }

    #[test]
    fn dice_notation_rejects_out_of_range_and_garbage() {
        assert_eq!(parse_dice("101d6"), None);
        assert_eq!(parse_dice("2d101"), None);
        assert_eq!(parse_dice("0d6"), None);
        assert_eq!(parse_dice("2d0"), None);
        assert_eq!(parse_dice("d"), None);
        assert_eq!(parse_dice("2x6"), None);
        assert_eq!(parse_dice("-2d6"), None);
        assert_eq!(parse_dice("2d+6"), None);
        assert_eq!(parse_dice(""), None);
    }
}
