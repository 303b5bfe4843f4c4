//! Configuration types for the task lifecycle engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TaskError};
use crate::store::LEGACY_ID_PREFIX;
use crate::time;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskwatchConfig {
    pub store: StoreConfig,
    pub lifecycle: LifecycleConfig,
    pub delivery: DeliveryConfig,
    pub schedule: ScheduleConfig,
    pub archive: ArchiveConfig,
    pub telegram: TelegramConfig,
    pub logging: LoggingConfig,
}

/// Task dataset location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// CSV dataset path.
    pub path: PathBuf,
    /// Prefix tried as a fallback when an id lookup misses. Empty disables it.
    pub legacy_id_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: crate::taskwatch_dirs::dataset_file(),
            legacy_id_prefix: LEGACY_ID_PREFIX.to_owned(),
        }
    }
}

/// Response window and reminders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minutes a delivered task waits for an answer before expiring.
    pub response_timeout_minutes: u64,
    /// Minutes after delivery before the first reminder.
    pub follow_up_after_minutes: u64,
    /// Reminders per task per awaiting-response window.
    pub max_follow_ups: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            response_timeout_minutes: 60,
            follow_up_after_minutes: 20,
            max_follow_ups: 2,
        }
    }
}

/// Outbound delivery pacing and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Total attempts per task, rate-limited attempts included.
    pub max_retries: u32,
    /// Wait after a non-rate-limit failure.
    pub retry_delay_secs: u64,
    /// Wait after a rate limit that carried no retry-after hint.
    pub default_retry_after_secs: u64,
    /// Pause between successive task messages in one dispatch cycle.
    pub inter_message_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
            default_retry_after_secs: 30,
            inter_message_delay_ms: 2_000,
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }

    #[must_use]
    pub fn inter_message_delay(&self) -> Duration {
        Duration::from_millis(self.inter_message_delay_ms)
    }
}

/// Trigger cadences. Intervals are aligned to UTC wall-clock multiples and
/// daily times are UTC `HH:MM`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub dispatch_every_secs: u64,
    pub expiry_every_secs: u64,
    pub follow_up_every_secs: u64,
    pub status_report_every_secs: u64,
    pub archive_at: String,
    /// Must fall after `archive_at`; nothing else orders the two.
    pub reset_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            dispatch_every_secs: 5 * 60,
            expiry_every_secs: 10 * 60,
            follow_up_every_secs: 5 * 60,
            status_report_every_secs: 6 * 60 * 60,
            archive_at: "23:55".to_owned(),
            reset_at: "23:58".to_owned(),
        }
    }
}

/// Daily snapshot location and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: PathBuf,
    /// Snapshots older than this many days are pruned after each archive. `0` keeps all.
    pub retention_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: crate::taskwatch_dirs::backups_dir(),
            retention_days: 30,
        }
    }
}

/// Telegram Bot API channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. Prefer `TASKWATCH_BOT_TOKEN` over storing it here.
    pub bot_token: String,
    /// Chat that receives tasks and whose replies are accepted.
    pub chat_id: String,
    pub api_base: String,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Whole-request timeout for every other Bot API call.
    pub request_timeout_secs: u64,
    /// Client-side send throttle. `0` disables it.
    pub max_messages_per_minute: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_owned(),
            poll_timeout_secs: 30,
            request_timeout_secs: 30,
            max_messages_per_minute: 20,
        }
    }
}

impl TelegramConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write a daily-rolling log file.
    pub log_to_file: bool,
    /// Log directory; defaults to the data directory's `logs/`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "taskwatch=info".to_owned(),
            log_to_file: true,
            dir: None,
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::taskwatch_dirs::logs_dir)
    }
}

impl TaskwatchConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TaskError::Config(e.to_string()))
    }

    /// Like [`from_file`](Self::from_file), but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| TaskError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::taskwatch_dirs::config_file()
    }

    /// Overlay channel secrets from the environment.
    ///
    /// `TASKWATCH_BOT_TOKEN` / `TASKWATCH_CHAT_ID` win; the bare
    /// `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` names are accepted too.
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_value(&["TASKWATCH_BOT_TOKEN", "TELEGRAM_BOT_TOKEN"]) {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = env_value(&["TASKWATCH_CHAT_ID", "TELEGRAM_CHAT_ID"]) {
            self.telegram.chat_id = chat_id;
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let lifecycle = &self.lifecycle;
        if lifecycle.response_timeout_minutes == 0 {
            return Err(TaskError::Config(
                "lifecycle.response_timeout_minutes must be positive".to_owned(),
            ));
        }
        if lifecycle.follow_up_after_minutes >= lifecycle.response_timeout_minutes {
            return Err(TaskError::Config(format!(
                "lifecycle.follow_up_after_minutes ({}) must be below response_timeout_minutes ({})",
                lifecycle.follow_up_after_minutes, lifecycle.response_timeout_minutes
            )));
        }
        if self.delivery.max_retries == 0 {
            return Err(TaskError::Config(
                "delivery.max_retries must be at least 1".to_owned(),
            ));
        }
        if self.telegram.request_timeout_secs == 0 {
            return Err(TaskError::Config(
                "telegram.request_timeout_secs must be positive".to_owned(),
            ));
        }

        let schedule = &self.schedule;
        for (name, secs) in [
            ("dispatch_every_secs", schedule.dispatch_every_secs),
            ("expiry_every_secs", schedule.expiry_every_secs),
            ("follow_up_every_secs", schedule.follow_up_every_secs),
            ("status_report_every_secs", schedule.status_report_every_secs),
        ] {
            if secs == 0 {
                return Err(TaskError::Config(format!("schedule.{name} must be positive")));
            }
        }

        let archive_at = daily_time("archive_at", &schedule.archive_at)?;
        let reset_at = daily_time("reset_at", &schedule.reset_at)?;
        if reset_at <= archive_at {
            return Err(TaskError::Config(format!(
                "schedule.reset_at ({}) must be after archive_at ({})",
                schedule.reset_at, schedule.archive_at
            )));
        }
        Ok(())
    }
}

fn daily_time(name: &str, raw: &str) -> Result<chrono::NaiveTime> {
    time::parse_time_of_day(raw)
        .ok_or_else(|| TaskError::Config(format!("schedule.{name} is not HH:MM: '{raw}'")))
}

fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_owned())
        .find(|value| !value.is_empty())
}
