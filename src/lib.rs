//! Taskwatch: scheduled task delivery with yes/no acknowledgment.
//!
//! Tasks live in a CSV dataset. When a task's execution time arrives it is
//! sent to a chat, then waits for someone to answer yes or no. Unanswered
//! tasks get reminders and eventually expire. Once a day the dataset is
//! archived and every task is reset for the next day.
//!
//! # Architecture
//!
//! - **Store**: CSV dataset with serialized read-modify-write updates
//! - **Channels**: Telegram Bot API gateway, inbound reply decoding, send throttle
//! - **Lifecycle**: the engine that dispatches, follows up, expires, archives and resets
//! - **Scheduler**: one background loop per lifecycle trigger
//! - **Archive**: dated daily copies of the dataset with retention pruning

pub mod archive;
pub mod channels;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod taskwatch_dirs;
pub mod time;

pub use archive::{ArchiveStore, FsArchiveStore};
pub use channels::{DeliveryGateway, TelegramGateway};
pub use config::TaskwatchConfig;
pub use error::{DeliveryError, Result, StoreError, TaskError};
pub use lifecycle::LifecycleEngine;
pub use runtime::Runtime;
pub use scheduler::{Scheduler, TriggerKind};
pub use store::{Task, TaskStatus, TaskStore};
