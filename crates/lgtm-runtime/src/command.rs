//! Slash-command model and the localized strings rendered back to the
//! invoking user.

use serde::{Deserialize, Serialize};

/// Queue name the gateway enqueues command jobs under.
pub const COMMAND_JOB_NAME: &str = "lgtm_command";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Parsed slash-command envelope. Immutable once parsed at webhook ingress;
/// passed by value into the deferred job.
pub struct SlashCommand {
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub command: String,
    pub response_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Job payload carried through the deferred-job queue: the command plus the
/// locale resolved at ingress.
pub struct CommandJob {
    pub command: SlashCommand,
    #[serde(default)]
    pub locale: Option<String>,
}

/// Empty text and `help` both render usage instead of running the pipeline.
pub fn is_help_request(text: &str) -> bool {
    matches!(text.trim(), "" | "help")
}

pub fn usage_text(command: &str, locale: Option<&str>) -> String {
    match locale {
        Some("ja-JP") => format!("*使い方*\n* {command} [url|検索ワード]\n* {command} help"),
        _ => format!("*Usage*\n* {command} [url|word]\n* {command} help"),
    }
}

pub fn please_wait_text(locale: Option<&str>) -> &'static str {
    match locale {
        Some("ja-JP") => "しばらくお待ちください。",
        _ => "Please wait.",
    }
}

pub fn generic_failure_text() -> &'static str {
    "Oops! Something went wrong. :sob:"
}

/// Instruction telling the channel to invite the bot, referencing its own
/// identity.
pub fn invite_instruction_text(bot_user_id: &str, channel_name: &str) -> String {
    format!(
        "Invite <@{bot_user_id}> to join #{channel_name}\n`/invite <@{bot_user_id}> #{channel_name}`⏎"
    )
}
