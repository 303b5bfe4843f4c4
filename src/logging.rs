//! Tracing subscriber setup: stdout plus an optional daily-rolling file.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "taskwatch.log";

/// Build the filter: `RUST_LOG` wins, then the configured directive.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match EnvFilter::try_new(&config.filter) {
        Ok(filter) => filter,
        Err(_) => {
            eprintln!(
                "Invalid log filter '{}', defaulting to 'taskwatch=info'",
                config.filter
            );
            EnvFilter::new("taskwatch=info")
        }
    })
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let filter = env_filter(config);
    let stdout_layer = fmt::layer().with_target(false);

    let file_layer = if config.log_to_file {
        let dir = config.log_dir();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_line_number(true)
                    .with_writer(RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX)),
            ),
            Err(e) => {
                eprintln!("Cannot create log directory {}: {e}", dir.display());
                None
            }
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = LoggingConfig {
            filter: "taskwatch=debug".to_owned(),
            log_to_file: true,
            dir: Some(logs.clone()),
        };
        init_logging(&config);
        init_logging(&config);
        assert!(logs.is_dir());
    }
}
