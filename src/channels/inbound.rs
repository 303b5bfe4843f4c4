//! Decoding of yes/no replies and operator commands sent back over the
//! channel.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::channels::traits::ChannelInboundMessage;

/// Typed text that asks for an immediate status report.
pub const STATUS_COMMAND: &str = "tasks-status";
pub const ARCHIVE_COMMAND: &str = "archive-tasks";
pub const LIST_BACKUPS_COMMAND: &str = "list-backups";
pub const SCHEDULE_COMMAND: &str = "schedule-info";
pub const RESET_COMMAND: &str = "daily-reset";
/// Deletes every message the bot knows about from the chat.
pub const CLEAR_COMMAND: &str = "tarik-clear-all";

/// Operator commands with the help line shown for each.
pub const COMMANDS: [(&str, &str); 5] = [
    (STATUS_COMMAND, "Daily status"),
    (RESET_COMMAND, "Manual daily reset"),
    (ARCHIVE_COMMAND, "Manual backup"),
    (LIST_BACKUPS_COMMAND, "View backups"),
    (SCHEDULE_COMMAND, "Show schedule info"),
];

static REPLY_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*task-([a-z0-9-]+)\s*:\s*(yes|no)\s*$").ok());

/// A responder's acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
        })
    }
}

impl FromStr for Answer {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(Self::Yes),
            "no" | "n" => Ok(Self::No),
            other => Err(format!("expected yes or no, got '{other}'")),
        }
    }
}

/// A decoded `Task-<id>: yes|no` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundReply {
    pub task_id: String,
    pub answer: Answer,
}

/// Parse a reply such as `Task-T7: yes`.
///
/// Returns `None` for anything else; the channel carries free chat too.
#[must_use]
pub fn parse_reply(text: &str) -> Option<InboundReply> {
    let captures = REPLY_PATTERN.as_ref()?.captures(text)?;
    let task_id = captures.get(1)?.as_str().to_owned();
    let answer = captures.get(2)?.as_str().parse().ok()?;
    Some(InboundReply { task_id, answer })
}

/// Parse button callback data such as `yes_T7`.
#[must_use]
pub fn parse_callback_data(data: &str) -> Option<InboundReply> {
    let (answer, task_id) = data.trim().split_once('_')?;
    if task_id.is_empty() {
        return None;
    }
    Some(InboundReply {
        task_id: task_id.to_owned(),
        answer: answer.parse().ok()?,
    })
}

/// What an inbound channel message asks the engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    Reply(InboundReply),
    StatusReport,
    ArchiveNow,
    ListBackups,
    ScheduleInfo,
    DailyReset,
    ClearChat,
}

fn parse_command(text: &str) -> Option<InboundCommand> {
    let command = match text.trim().to_ascii_lowercase().as_str() {
        STATUS_COMMAND => InboundCommand::StatusReport,
        ARCHIVE_COMMAND => InboundCommand::ArchiveNow,
        LIST_BACKUPS_COMMAND => InboundCommand::ListBackups,
        SCHEDULE_COMMAND => InboundCommand::ScheduleInfo,
        RESET_COMMAND => InboundCommand::DailyReset,
        CLEAR_COMMAND => InboundCommand::ClearChat,
        _ => return None,
    };
    Some(command)
}

/// Decode an inbound message; `None` means it is ordinary chat.
#[must_use]
pub fn decode(message: &ChannelInboundMessage) -> Option<InboundCommand> {
    if message.callback_id.is_some() {
        return parse_callback_data(&message.text).map(InboundCommand::Reply);
    }
    parse_command(&message.text).or_else(|| parse_reply(&message.text).map(InboundCommand::Reply))
}
