//! Human-readable message text sent over the channel.
//!
//! Telegram "Markdown" (v1) mode: only `_`, `*`, `` ` `` and `[` are special,
//! so dataset text is escaped before interpolation.

use chrono::{DateTime, Local};

use crate::archive::ArchiveEntry;
use crate::channels::Answer;
use crate::channels::inbound::COMMANDS;
use crate::error::TaskError;
use crate::scheduler::ScheduledTrigger;
use crate::store::Task;
use crate::time;

/// Escape dataset text for Telegram Markdown.
#[must_use]
pub fn escape_markdown(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn heading(task: &Task) -> String {
    format!(
        "📋 *{} - {}*",
        escape_markdown(&task.id),
        escape_markdown(&task.name)
    )
}

/// The task message itself, with reply instructions.
#[must_use]
pub fn task_message(task: &Task, timeout_minutes: u64) -> String {
    let mut text = heading(task);
    if !task.description.trim().is_empty() {
        text.push_str(&format!("\n\n{}", escape_markdown(task.description.trim())));
    }
    if !task.execution_time.trim().is_empty() {
        text.push_str(&format!(
            "\n\n⏰ Scheduled for: {}",
            time::format_display(&task.execution_time)
        ));
    }
    text.push_str(&format!(
        "\n\n💬 *To answer, reply:*\n`Task-{id}: yes`\n`Task-{id}: no`\n\n⌛ *Answer within {timeout_minutes} minutes*",
        id = task.id
    ));
    text
}

/// Replacement text for the original message once answered.
#[must_use]
pub fn response_recorded(
    task: &Task,
    answer: Answer,
    responded_by: &str,
    at: DateTime<Local>,
) -> String {
    let outcome = match answer {
        Answer::Yes => "✅ Done",
        Answer::No => "❌ Not done",
    };
    let mut text = format!("{}\n\n{outcome}", heading(task));
    if !responded_by.trim().is_empty() {
        text.push_str(&format!("\n\n👤 Answered by: {}", escape_markdown(responded_by)));
    }
    text.push_str(&format!("\n\n⏰ {}", time::format_display(at)));
    text
}

/// Mid-window reminder.
#[must_use]
pub fn follow_up(task: &Task, count: u32, max: u32, minutes_left: u64) -> String {
    format!(
        "🔔 *Reminder {count}/{max}*\n\n{}\n\nStill waiting for an answer. {minutes_left} minutes left.\n`Task-{id}: yes` or `Task-{id}: no`",
        heading(task),
        id = task.id
    )
}

/// One notice for every task expired in a cycle.
#[must_use]
pub fn expired_batch(tasks: &[Task]) -> String {
    let mut text = format!("⌛ *{} task(s) expired without an answer*\n", tasks.len());
    for task in tasks {
        text.push_str(&format!(
            "\n• {} - {}",
            escape_markdown(&task.id),
            escape_markdown(&task.name)
        ));
    }
    text
}

/// Sent when every delivery attempt for a task failed.
#[must_use]
pub fn delivery_failed(task: &Task, error: &TaskError) -> String {
    format!(
        "⚠️ *Could not deliver task*\n\n{}\n\n{}",
        heading(task),
        escape_markdown(&error.to_string())
    )
}

#[must_use]
pub fn archive_succeeded(file_name: &str, pruned: usize) -> String {
    let mut text = format!("📁 Daily archive saved: {}", escape_markdown(file_name));
    if pruned > 0 {
        text.push_str(&format!("\n🧹 Removed {pruned} old archive(s)"));
    }
    text
}

#[must_use]
pub fn archive_failed(error: &TaskError) -> String {
    format!("❌ Daily archive failed: {}", escape_markdown(&error.to_string()))
}

#[must_use]
pub fn reset_completed(task_count: usize) -> String {
    format!("🔄 Daily reset complete: {task_count} task(s) back to Pending")
}

/// Backups shown by the listing; older ones are only counted.
const BACKUP_LIST_LIMIT: usize = 10;

/// Newest snapshots first, with size and date.
#[must_use]
pub fn backup_list(entries: &[ArchiveEntry]) -> String {
    if entries.is_empty() {
        return "📋 No backup files found.".to_owned();
    }
    let mut text = "📋 *Available Backups:*\n".to_owned();
    for entry in entries.iter().take(BACKUP_LIST_LIMIT) {
        text.push_str(&format!(
            "\n📁 *{}*\n   📊 Size: {:.1} KB\n   📅 Date: {}\n",
            escape_markdown(&entry.file_name()),
            entry.size_bytes as f64 / 1024.0,
            entry.date.format("%Y-%m-%d")
        ));
    }
    if entries.len() > BACKUP_LIST_LIMIT {
        text.push_str(&format!(
            "\n... and {} more backups",
            entries.len() - BACKUP_LIST_LIMIT
        ));
    }
    text
}

/// Trigger cadences plus the operator commands.
#[must_use]
pub fn schedule_info(triggers: &[ScheduledTrigger], now: DateTime<Local>) -> String {
    let mut text = format!(
        "📊 *Current Schedule Information*\n\n📅 {}\n⏰ {}\n\n",
        now.format("%Y-%m-%d"),
        time::format_display(now)
    );
    for trigger in triggers {
        text.push_str(&format!(
            "*{}:* `{}`\n",
            trigger.kind.label(),
            trigger.schedule
        ));
    }
    text.push_str("\n💡 *Commands:*\n");
    for (command, help) in COMMANDS {
        text.push_str(&format!("• `{command}` - {help}\n"));
    }
    text
}

#[must_use]
pub fn chat_cleared(deleted: usize) -> String {
    format!("🧹 Chat cleared: {deleted} message(s) deleted")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::store::TaskStatus;

    #[test]
    fn markdown_specials_are_escaped() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn task_message_carries_reply_instructions() {
        let mut task = Task::new("T1", "Water_plants").at("09:30");
        task.description = "Back garden".to_owned();
        let text = task_message(&task, 60);
        assert!(text.contains("*T1 - Water\\_plants*"));
        assert!(text.contains("Back garden"));
        assert!(text.contains("9:30 AM"));
        assert!(text.contains("`Task-T1: yes`"));
        assert!(text.contains("60 minutes"));
    }

    #[test]
    fn task_message_omits_empty_fields() {
        let text = task_message(&Task::new("T2", "Call"), 30);
        assert!(!text.contains("Scheduled for"));
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn expired_batch_lists_every_task() {
        let tasks = vec![
            Task::new("T2", "Report").with_status(TaskStatus::Expired),
            Task::new("T5", "Backup").with_status(TaskStatus::Expired),
        ];
        let text = expired_batch(&tasks);
        assert!(text.starts_with("⌛ *2 task(s) expired"));
        assert!(text.contains("• T2 - Report"));
        assert!(text.contains("• T5 - Backup"));
    }

    #[test]
    fn backup_list_caps_at_ten_entries() {
        assert_eq!(backup_list(&[]), "📋 No backup files found.");

        let entries: Vec<ArchiveEntry> = (1..=12)
            .rev()
            .map(|day| {
                let date = chrono::NaiveDate::from_ymd_opt(2026, 10, day).unwrap();
                ArchiveEntry {
                    date,
                    path: format!("backups/tasks-{}.csv", date.format("%Y-%m-%d")).into(),
                    size_bytes: 2048,
                }
            })
            .collect();
        let text = backup_list(&entries);
        assert!(text.contains("*tasks-2026-10-12.csv*"));
        assert!(text.contains("2.0 KB"));
        assert!(text.contains("tasks-2026-10-03.csv"));
        assert!(!text.contains("tasks-2026-10-02.csv"));
        assert!(text.ends_with("... and 2 more backups"));
    }

    #[test]
    fn schedule_info_lists_triggers_and_commands() {
        use crate::scheduler::{Schedule, TriggerKind};

        let triggers = [
            ScheduledTrigger {
                kind: TriggerKind::Dispatch,
                schedule: Schedule::Interval { secs: 300 },
            },
            ScheduledTrigger {
                kind: TriggerKind::DailyReset,
                schedule: Schedule::Daily { hour: 23, min: 58 },
            },
        ];
        let now = crate::time::to_instant_on(
            "10:00",
            chrono::NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        )
        .unwrap();
        let text = schedule_info(&triggers, now);
        assert!(text.contains("*Task Checks:* `every 5 minutes`"));
        assert!(text.contains("*Daily Reset:* `daily at 23:58 UTC`"));
        assert!(text.contains("• `archive-tasks` - Manual backup"));
        assert!(text.contains("• `tasks-status`"));
    }

    #[test]
    fn follow_up_shows_progress() {
        let text = follow_up(&Task::new("T3", "Review"), 1, 2, 35);
        assert!(text.contains("Reminder 1/2"));
        assert!(text.contains("35 minutes left"));
    }
}
