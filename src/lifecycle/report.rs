//! Periodic status report over the day's tasks.

use chrono::{DateTime, Local};

use crate::lifecycle::notices::escape_markdown;
use crate::store::{Task, TaskStatus};
use crate::time;

/// Counts per status plus the tasks already due today.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub generated_at: DateTime<Local>,
    /// `(status, count)` in [`TaskStatus::ALL`] order, over every task.
    pub counts: Vec<(TaskStatus, usize)>,
    /// Tasks whose execution time has passed (or that have none), dataset order.
    pub due: Vec<Task>,
}

impl StatusReport {
    #[must_use]
    pub fn from_tasks(tasks: Vec<Task>, now: DateTime<Local>) -> Self {
        let counts = TaskStatus::ALL
            .iter()
            .map(|status| (*status, tasks.iter().filter(|t| t.status == *status).count()))
            .collect();
        let due = tasks.into_iter().filter(|task| is_due(task, now)).collect();
        Self {
            generated_at: now,
            counts,
            due,
        }
    }

    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        self.counts
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    /// Markdown message grouping due tasks by status, then a summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!(
            "📊 *Daily Tasks Status*\n\n📅 {}\n⏰ {}\n",
            self.generated_at.format("%Y-%m-%d"),
            time::format_display(self.generated_at)
        );

        if self.due.is_empty() {
            text.push_str("\nNo tasks due yet today.\n");
        }
        for status in TaskStatus::ALL {
            let group: Vec<&Task> = self.due.iter().filter(|t| t.status == status).collect();
            if group.is_empty() {
                continue;
            }
            text.push_str(&format!("\n*{status} ({}):*\n", group.len()));
            for task in group {
                let when = if status == TaskStatus::Completed {
                    time::format_display(&task.response_time)
                } else {
                    time::format_display(&task.execution_time)
                };
                text.push_str(&format!(
                    "• {} - {} - {} - {}\n",
                    escape_markdown(&task.id),
                    escape_markdown(&task.name),
                    escape_markdown(&task.responded_by),
                    when
                ));
            }
        }

        text.push_str(&format!(
            "\n📈 *Summary:*\n• Total: {}\n• Completed: {}\n• Failed: {}\n• Pending: {}\n• Expired: {}\n",
            self.total(),
            self.count(TaskStatus::Completed),
            self.count(TaskStatus::Failed),
            self.count(TaskStatus::Pending) + self.count(TaskStatus::SentAwaitingResponse),
            self.count(TaskStatus::Expired),
        ));
        text
    }
}

/// Same rule as dispatch readiness, ignoring status.
fn is_due(task: &Task, now: DateTime<Local>) -> bool {
    if task.execution_time.trim().is_empty() {
        return true;
    }
    match time::to_instant_on(&task.execution_time, now.date_naive()) {
        Some(scheduled) => scheduled <= now,
        None => true,
    }
}
