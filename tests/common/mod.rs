//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use tokio::sync::Notify;
use taskwatch::archive::FsArchiveStore;
use taskwatch::channels::{DeliveryGateway, MessageHandle, SendOptions};
use taskwatch::config::TaskwatchConfig;
use taskwatch::store::{CsvDataset, Dataset, DatasetIo};
use taskwatch::{DeliveryError, LifecycleEngine, Task, TaskStore};

/// A message the mock gateway accepted.
#[derive(Debug, Clone)]
pub struct Sent {
    pub text: String,
    pub options: SendOptions,
    pub at: tokio::time::Instant,
}

/// Records every outbound call. Scripted failures are consumed first.
#[derive(Default)]
pub struct MockGateway {
    pub sent: Mutex<Vec<Sent>>,
    pub edits: Mutex<Vec<(i64, String)>>,
    pub attempts: Mutex<u32>,
    failures: Mutex<VecDeque<DeliveryError>>,
    next_id: Mutex<i64>,
}

impl MockGateway {
    pub fn failing_with(errors: impl IntoIterator<Item = DeliveryError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|s| s.text.clone()).collect()
    }
}

#[async_trait]
impl DeliveryGateway for MockGateway {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn send(
        &self,
        channel: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let message_id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.sent.lock().unwrap().push(Sent {
            text: text.to_owned(),
            options: options.clone(),
            at: tokio::time::Instant::now(),
        });
        Ok(MessageHandle {
            channel: channel.to_owned(),
            message_id,
        })
    }

    async fn edit(&self, _channel: &str, message_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.edits.lock().unwrap().push((message_id, text.to_owned()));
        Ok(())
    }

    async fn delete(&self, _channel: &str, _message_id: i64) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Holds the first send whose text contains `marker` until `release` fires.
pub struct GatedGateway {
    pub inner: MockGateway,
    pub entered: Notify,
    pub release: Notify,
    marker: String,
    tripped: Mutex<bool>,
}

impl GatedGateway {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            inner: MockGateway::default(),
            entered: Notify::new(),
            release: Notify::new(),
            marker: marker.into(),
            tripped: Mutex::new(false),
        }
    }
}

#[async_trait]
impl DeliveryGateway for GatedGateway {
    fn id(&self) -> &'static str {
        "gated"
    }

    async fn send(
        &self,
        channel: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, DeliveryError> {
        let hold = text.contains(&self.marker) && {
            let mut tripped = self.tripped.lock().unwrap();
            !std::mem::replace(&mut *tripped, true)
        };
        if hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.send(channel, text, options).await
    }

    async fn edit(&self, channel: &str, message_id: i64, text: &str) -> Result<(), DeliveryError> {
        self.inner.edit(channel, message_id, text).await
    }

    async fn delete(&self, channel: &str, message_id: i64) -> Result<(), DeliveryError> {
        self.inner.delete(channel, message_id).await
    }
}

/// Engine over a fresh CSV dataset in `dir`, with awaiting rows restored
/// the way the runtime does at startup.
pub fn engine_over(
    dir: &tempfile::TempDir,
    tasks: &[Task],
    gateway: Arc<dyn DeliveryGateway>,
) -> LifecycleEngine {
    let io = CsvDataset::new(dir.path().join("tasks.csv"));
    io.rewrite_all(&Dataset::from_tasks(tasks)).unwrap();

    let mut config = TaskwatchConfig::default();
    config.telegram.chat_id = "-100".to_owned();
    let engine = LifecycleEngine::new(
        Arc::new(TaskStore::new(io)),
        gateway,
        Arc::new(FsArchiveStore::new(dir.path().join("backups"))),
        &config,
    );
    engine.rebuild_pending().unwrap();
    engine
}

/// Engine over a fresh CSV dataset in `dir`.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub gateway: Arc<MockGateway>,
    pub engine: LifecycleEngine,
}

impl Harness {
    pub fn new(tasks: &[Task]) -> Self {
        Self::with_gateway(tasks, MockGateway::default())
    }

    pub fn with_gateway(tasks: &[Task], gateway: MockGateway) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(gateway);
        let engine = engine_over(&dir, tasks, gateway.clone());
        Self {
            dir,
            gateway,
            engine,
        }
    }

    pub fn task(&self, id: &str) -> Task {
        self.engine.store().find_by_id(id).unwrap()
    }

    pub fn csv(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("tasks.csv")).unwrap()
    }
}

/// A fixed local instant on 2026-10-19.
pub fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 10, 19, hour, minute, second)
        .earliest()
        .unwrap()
}

/// A task already delivered at `sent_at`.
pub fn awaiting(id: &str, name: &str, sent_at: DateTime<Local>) -> Task {
    let mut task = Task::new(id, name).with_status(taskwatch::TaskStatus::SentAwaitingResponse);
    task.response_time = taskwatch::time::format_timestamp(sent_at);
    task
}
