//! Application directory paths.
//!
//! Resolved with the [`dirs`] crate for platform-appropriate locations.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data (dataset, backups, logs) | `~/Library/Application Support/taskwatch/` | `~/.local/share/taskwatch/` |
//! | Config | `~/Library/Application Support/taskwatch/` | `~/.config/taskwatch/` |
//!
//! # Environment Overrides
//!
//! - `TASKWATCH_DATA_DIR` overrides [`data_dir`]
//! - `TASKWATCH_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the task dataset, daily backups and logs. Override with the
/// `TASKWATCH_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TASKWATCH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("taskwatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/taskwatch-data"))
}

/// Application config directory. Override with `TASKWATCH_CONFIG_DIR`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TASKWATCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("taskwatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/taskwatch-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default task dataset path (`data_dir()/tasks.csv`).
#[must_use]
pub fn dataset_file() -> PathBuf {
    data_dir().join("tasks.csv")
}

/// Daily archive directory (`data_dir()/daily-backups/`).
#[must_use]
pub fn backups_dir() -> PathBuf {
    data_dir().join("daily-backups")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
