//! Task rows and the status state machine values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Waiting for its execution time.
    Pending,
    /// Delivered; waiting for a yes/no answer.
    #[serde(rename = "SentAndAwaitingResponse")]
    SentAwaitingResponse,
    /// Answered "yes".
    Completed,
    /// Answered "no".
    Failed,
    /// Not answered within the response timeout.
    Expired,
}

impl TaskStatus {
    /// All statuses in report order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::SentAwaitingResponse,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Expired,
    ];

    /// Spelling used in the dataset's `Status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::SentAwaitingResponse => "SentAndAwaitingResponse",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Expired => "Expired",
        }
    }

    /// Completed, Failed and Expired only leave via a daily reset.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Expired)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a `Status` cell holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown task status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    /// Case-insensitive; an empty cell reads as `Pending`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "pending" => Ok(Self::Pending),
            "sentandawaitingresponse" | "sentawaitingresponse" => Ok(Self::SentAwaitingResponse),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(UnknownStatus(raw.to_owned())),
        }
    }
}

/// One row of the task dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique key, possibly carrying the legacy `TASK-` prefix.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free text.
    pub description: String,
    /// `HH:MM`, or empty for "as soon as possible".
    pub execution_time: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Timestamp of the last status write, empty while pending.
    pub response_time: String,
    /// Who answered, empty until someone does.
    pub responded_by: String,
}

impl Task {
    /// A pending task with no schedule metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            execution_time: String::new(),
            status: TaskStatus::Pending,
            response_time: String::new(),
            responded_by: String::new(),
        }
    }

    /// Builder-style execution time setter.
    #[must_use]
    pub fn at(mut self, execution_time: impl Into<String>) -> Self {
        self.execution_time = execution_time.into();
        self
    }

    /// Builder-style status setter.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn status_round_trips_through_dataset_spelling() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_parsing_is_lenient_on_case_and_blank() {
        assert_eq!("".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert_eq!(" completed ".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert_eq!(
            "SentAwaitingResponse".parse::<TaskStatus>().unwrap(),
            TaskStatus::SentAwaitingResponse
        );
        assert!("Archived".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::SentAwaitingResponse.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Expired.is_terminal());
    }
}
