//! Trigger definitions and their timing.
//!
//! Defines the [`Schedule`] enum, the fixed set of lifecycle triggers, and
//! [`execute_trigger`] which maps a trigger onto the engine.

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ScheduleConfig;
use crate::error::{Result, TaskError};
use crate::lifecycle::{ArchiveOutcome, LifecycleEngine};
use crate::time;

/// How often a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Every N seconds, on multiples of N since the Unix epoch (UTC).
    Interval {
        /// Interval in seconds between runs.
        secs: u64,
    },
    /// Once daily at a given hour and minute (UTC).
    Daily {
        /// Hour of day (0-23, UTC).
        hour: u8,
        /// Minute of hour (0-59).
        min: u8,
    },
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval { secs } => {
                if *secs >= 3600 {
                    write!(f, "every {} hours", secs / 3600)
                } else if *secs >= 60 {
                    write!(f, "every {} minutes", secs / 60)
                } else {
                    write!(f, "every {secs} seconds")
                }
            }
            Self::Daily { hour, min } => write!(f, "daily at {hour:02}:{min:02} UTC"),
        }
    }
}

impl Schedule {
    /// Build a daily schedule from a `HH:MM` string.
    pub fn daily_at(raw: &str) -> Result<Self> {
        use chrono::Timelike;
        let time = time::parse_time_of_day(raw)
            .ok_or_else(|| TaskError::Config(format!("invalid daily time '{raw}'")))?;
        Ok(Self::Daily {
            hour: time.hour() as u8,
            min: time.minute() as u8,
        })
    }

    /// First fire time strictly after `after`.
    #[must_use]
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Interval { secs } => {
                let secs = secs.max(1) as i64;
                let next = (after.timestamp().div_euclid(secs) + 1) * secs;
                Utc.timestamp_opt(next, 0)
                    .single()
                    .unwrap_or(after + chrono::Duration::seconds(secs))
            }
            Self::Daily { hour, min } => {
                let at = NaiveTime::from_hms_opt(u32::from(hour), u32::from(min), 0)
                    .unwrap_or(NaiveTime::MIN);
                let today = after.date_naive().and_time(at).and_utc();
                if today > after {
                    today
                } else {
                    after
                        .date_naive()
                        .checked_add_days(Days::new(1))
                        .map_or(today + chrono::Duration::days(1), |d| d.and_time(at).and_utc())
                }
            }
        }
    }
}

/// The lifecycle triggers the scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    Dispatch,
    Expiry,
    FollowUp,
    StatusReport,
    DailyArchive,
    DailyReset,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 6] = [
        TriggerKind::Dispatch,
        TriggerKind::Expiry,
        TriggerKind::FollowUp,
        TriggerKind::StatusReport,
        TriggerKind::DailyArchive,
        TriggerKind::DailyReset,
    ];

    /// Stable identifier, also accepted on the command line.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Expiry => "expiry",
            Self::FollowUp => "follow-up",
            Self::StatusReport => "status-report",
            Self::DailyArchive => "archive",
            Self::DailyReset => "reset",
        }
    }

    /// Name shown to operators in the chat.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Dispatch => "Task Checks",
            Self::Expiry => "Expired Task Checks",
            Self::FollowUp => "Follow-up Reminders",
            Self::StatusReport => "Status Reports",
            Self::DailyArchive => "Daily Archive",
            Self::DailyReset => "Daily Reset",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.id()).collect();
                format!("unknown trigger '{raw}' (expected one of: {})", known.join(", "))
            })
    }
}

/// A trigger bound to its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    pub kind: TriggerKind,
    pub schedule: Schedule,
}

/// The standard trigger set for a schedule configuration.
pub fn default_triggers(config: &ScheduleConfig) -> Result<Vec<ScheduledTrigger>> {
    let interval = |kind, secs| ScheduledTrigger {
        kind,
        schedule: Schedule::Interval { secs },
    };
    Ok(vec![
        interval(TriggerKind::Dispatch, config.dispatch_every_secs),
        interval(TriggerKind::Expiry, config.expiry_every_secs),
        interval(TriggerKind::FollowUp, config.follow_up_every_secs),
        interval(TriggerKind::StatusReport, config.status_report_every_secs),
        ScheduledTrigger {
            kind: TriggerKind::DailyArchive,
            schedule: Schedule::daily_at(&config.archive_at)?,
        },
        ScheduledTrigger {
            kind: TriggerKind::DailyReset,
            schedule: Schedule::daily_at(&config.reset_at)?,
        },
    ])
}

/// Outcome of one trigger execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Success,
    Error,
}

/// Run-history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRunRecord {
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: TriggerOutcome,
    pub summary: String,
}

/// Run one trigger against the engine, returning a one-line summary.
pub async fn execute_trigger(engine: &LifecycleEngine, kind: TriggerKind) -> Result<String> {
    match kind {
        TriggerKind::Dispatch => {
            let report = engine.dispatch_ready_tasks().await?;
            Ok(format!(
                "sent {}, failed {}, superseded {}",
                report.sent.len(),
                report.failed.len(),
                report.superseded.len()
            ))
        }
        TriggerKind::Expiry => {
            let expired = engine.expire_overdue().await?;
            Ok(format!("expired {}", expired.len()))
        }
        TriggerKind::FollowUp => {
            let sent = engine.send_follow_ups().await?;
            Ok(format!("follow-ups sent {}", sent.len()))
        }
        TriggerKind::StatusReport => {
            let report = engine.publish_status_report().await?;
            Ok(format!("reported {} tasks", report.total()))
        }
        TriggerKind::DailyArchive => match engine.daily_archive().await? {
            ArchiveOutcome::Archived { path, pruned } => Ok(format!(
                "archived to {} (pruned {pruned})",
                path.display()
            )),
            ArchiveOutcome::AlreadyArchived { date } => Ok(format!("already archived for {date}")),
        },
        TriggerKind::DailyReset => {
            let count = engine.daily_reset().await?;
            Ok(format!("reset {count} tasks"))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn interval_aligns_to_epoch_multiples() {
        let every_five = Schedule::Interval { secs: 300 };
        assert_eq!(
            every_five.next_fire_after(utc("2026-10-19T10:02:30Z")),
            utc("2026-10-19T10:05:00Z")
        );
        assert_eq!(
            every_five.next_fire_after(utc("2026-10-19T10:05:00Z")),
            utc("2026-10-19T10:10:00Z")
        );

        let six_hours = Schedule::Interval { secs: 6 * 3600 };
        assert_eq!(
            six_hours.next_fire_after(utc("2026-10-19T13:00:00Z")),
            utc("2026-10-19T18:00:00Z")
        );
    }

    #[test]
    fn daily_fires_today_or_tomorrow() {
        let archive = Schedule::Daily { hour: 23, min: 55 };
        assert_eq!(
            archive.next_fire_after(utc("2026-10-19T12:00:00Z")),
            utc("2026-10-19T23:55:00Z")
        );
        assert_eq!(
            archive.next_fire_after(utc("2026-10-19T23:55:00Z")),
            utc("2026-10-20T23:55:00Z")
        );
        assert_eq!(
            archive.next_fire_after(utc("2026-12-31T23:59:00Z")),
            utc("2027-01-01T23:55:00Z")
        );
    }

    #[test]
    fn schedule_display() {
        assert_eq!(Schedule::Interval { secs: 300 }.to_string(), "every 5 minutes");
        assert_eq!(Schedule::Interval { secs: 21600 }.to_string(), "every 6 hours");
        assert_eq!(Schedule::Daily { hour: 23, min: 58 }.to_string(), "daily at 23:58 UTC");
    }

    #[test]
    fn default_triggers_follow_config() {
        let triggers = default_triggers(&ScheduleConfig::default()).unwrap();
        assert_eq!(triggers.len(), TriggerKind::ALL.len());
        let reset = triggers
            .iter()
            .find(|t| t.kind == TriggerKind::DailyReset)
            .unwrap();
        assert_eq!(reset.schedule, Schedule::Daily { hour: 23, min: 58 });
        let expiry = triggers.iter().find(|t| t.kind == TriggerKind::Expiry).unwrap();
        assert_eq!(expiry.schedule, Schedule::Interval { secs: 600 });
    }

    #[test]
    fn bad_daily_time_is_config_error() {
        let config = ScheduleConfig {
            archive_at: "24:00".to_owned(),
            ..ScheduleConfig::default()
        };
        assert!(matches!(default_triggers(&config), Err(TaskError::Config(_))));
    }

    #[test]
    fn trigger_ids_round_trip() {
        for kind in TriggerKind::ALL {
            assert_eq!(kind.id().parse::<TriggerKind>().unwrap(), kind);
        }
        assert!("nightly".parse::<TriggerKind>().is_err());
    }
}
