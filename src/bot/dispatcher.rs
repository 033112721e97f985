use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::bot::commands::Commands;
use crate::directory::UserDirectory;
use crate::types::{ChatMessage, CooldownScope, RequiredRole};

/// Per-command metadata. Authorization and rate limiting live here as data
/// instead of being scattered through the handler bodies.
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub required_role: RequiredRole,
    pub cooldown_scope: CooldownScope,
    pub cooldown_seconds: i64,
}

fn command_table() -> Vec<CommandSpec> {
    use CooldownScope::{PerChannel, PerChatter};
    use RequiredRole::{Anyone, Elevated, Moderator};

    vec![
        CommandSpec {
            name: "brick",
            aliases: &["brickroulette"],
            required_role: Anyone,
            cooldown_scope: PerChatter,
            cooldown_seconds: 15,
        },
        CommandSpec {
            name: "target",
            aliases: &["bricktarget", "brick-target"],
            required_role: Anyone,
            cooldown_scope: PerChatter,
            cooldown_seconds: 5,
        },
        CommandSpec {
            name: "roll",
            aliases: &[],
            required_role: Anyone,
            cooldown_scope: PerChatter,
            cooldown_seconds: 5,
        },
        CommandSpec {
            name: "d20",
            aliases: &[],
            required_role: Anyone,
            cooldown_scope: PerChatter,
            cooldown_seconds: 15,
        },
        CommandSpec {
            name: "mod",
            aliases: &["m", "m0d"],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "unmod",
            aliases: &["um", "unm0d"],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "permamod",
            aliases: &["pm", "permam0d"],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "supermod",
            aliases: &["sm"],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "vip",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "shoutout",
            aliases: &["so"],
            required_role: Moderator,
            cooldown_scope: PerChannel,
            cooldown_seconds: 60,
        },
        CommandSpec {
            name: "autoreply",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "culling",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "banword",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "vipword",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "modword",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "banlength",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "resetvip",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "resetmod",
            aliases: &[],
            required_role: Elevated,
            cooldown_scope: PerChannel,
            cooldown_seconds: 2,
        },
        CommandSpec {
            name: "help",
            aliases: &[],
            required_role: Anyone,
            cooldown_scope: PerChannel,
            cooldown_seconds: 30,
        },
        CommandSpec {
            name: "commands",
            aliases: &[],
            required_role: Anyone,
            cooldown_scope: PerChannel,
            cooldown_seconds: 30,
        },
    ]
}

/// Twitch's chatbox appends this invisible tag character when a user resends
/// a message with the up-arrow key; it has to be stripped before matching.
const REPEAT_MARKER: char = '\u{E0000}';

/// Sanitize raw argument tokens: strip the repeat marker, a leading `@`,
/// and surrounding whitespace, lowercase everything, and drop empties.
pub fn clean_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    args.into_iter()
        .map(|arg| {
            arg.replace(REPEAT_MARKER, "")
                .trim()
                .trim_start_matches('@')
                .to_lowercase()
        })
        .filter(|arg| !arg.is_empty())
        .collect()
}

/// Routes `!commands` to their handlers after alias resolution, role
/// checking, and cooldown enforcement. Denied or rate-limited invocations
/// are dropped without a reply to keep the bot from adding chat noise.
pub struct Dispatcher {
    specs: Vec<CommandSpec>,
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
    commands: Commands,
    directory: Arc<UserDirectory>,
}

impl Dispatcher {
    pub fn new(commands: Commands, directory: Arc<UserDirectory>) -> Self {
        Self {
            specs: command_table(),
            cooldowns: Mutex::new(HashMap::new()),
            commands,
            directory,
        }
    }

    /// Handle a chat message if it is a command. Returns true when the
    /// message was recognized as a command, whether or not it ran.
    pub async fn dispatch(&self, message: &ChatMessage) -> bool {
        let Some(without_prefix) = message.text.strip_prefix('!') else {
            return false;
        };
        let mut tokens = without_prefix.split_whitespace();
        let Some(first) = tokens.next() else {
            return false;
        };
        let name = first.replace(REPEAT_MARKER, "").to_lowercase();

        let Some(spec) = self
            .specs
            .iter()
            .find(|s| s.name == name || s.aliases.contains(&name.as_str()))
        else {
            debug!("Unknown command: {}", name);
            return false;
        };

        if !self.is_authorized(spec, message).await {
            debug!(
                "Dropping command '{}' from {}: insufficient role",
                spec.name, message.chatter_name
            );
            return true;
        }

        if !self.pass_cooldown(spec, message).await {
            debug!(
                "Dropping command '{}' from {}: on cooldown",
                spec.name, message.chatter_name
            );
            return true;
        }

        let args = clean_args(tokens);
        self.run(spec.name, message, &args).await;
        true
    }

    async fn is_authorized(&self, spec: &CommandSpec, message: &ChatMessage) -> bool {
        match spec.required_role {
            RequiredRole::Anyone => true,
            RequiredRole::Moderator => message.is_moderator || message.is_broadcaster,
            RequiredRole::Elevated => {
                self.directory
                    .has_elevated_permission(&message.chatter_id, message.is_broadcaster)
                    .await
            }
            RequiredRole::Broadcaster => message.is_broadcaster,
        }
    }

    /// Check and stamp the command's cooldown bucket in one pass.
    async fn pass_cooldown(&self, spec: &CommandSpec, message: &ChatMessage) -> bool {
        let key = match spec.cooldown_scope {
            CooldownScope::PerChatter => format!("{}:{}", spec.name, message.chatter_id),
            CooldownScope::PerChannel => spec.name.to_string(),
        };
        let mut cooldowns = self.cooldowns.lock().await;
        if let Some(last_used) = cooldowns.get(&key) {
            let elapsed = message.timestamp.signed_duration_since(*last_used);
            if elapsed.num_seconds() < spec.cooldown_seconds {
                return false;
            }
        }
        cooldowns.insert(key, message.timestamp);
        true
    }

    async fn run(&self, name: &str, message: &ChatMessage, args: &[String]) {
        match name {
            "brick" => self.commands.brick(message, args).await,
            "target" => self.commands.brick_target(message, args).await,
            "roll" => self.commands.roll(message, args).await,
            "d20" => self.commands.d20(message).await,
            "mod" => self.commands.grant_mod(message, args).await,
            "unmod" => self.commands.revoke_mod(message, args).await,
            "permamod" => self.commands.grant_permamod(message, args).await,
            "supermod" => self.commands.grant_supermod(message, args).await,
            "vip" => self.commands.grant_vip(message, args).await,
            "shoutout" => self.commands.shoutout(message, args).await,
            "autoreply" => self.commands.auto_reply(message, args).await,
            "culling" => self.commands.culling(message, args).await,
            "banword" => self.commands.set_ban_keyword(message, args).await,
            "vipword" => self.commands.set_vip_keyword(message, args).await,
            "modword" => self.commands.set_mod_keyword(message, args).await,
            "banlength" => self.commands.set_ban_length(message, args).await,
            "resetvip" => self.commands.reset_vip(message).await,
            "resetmod" => self.commands.reset_mod(message).await,
            "help" => self.commands.help(message).await,
            "commands" => self.commands.commands_list(message).await,
            other => debug!("No handler registered for '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_args_strips_markers_and_mentions() {
        let cleaned = clean_args(vec!["@Alice", "BOB\u{E0000}", "  ", "\u{E0000}", "carol "]);
        assert_eq!(cleaned, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn clean_args_drops_empty_tokens() {
        let cleaned = clean_args(vec!["@", ""]);
        assert!(cleaned.is_empty());
    }
}
