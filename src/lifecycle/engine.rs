//! The task state machine and its trigger functions.
//!
//! ```text
//! Pending ──dispatch──▶ SentAndAwaitingResponse ──yes──▶ Completed
//!    ▲                         │      │
//!    │                         │      └──no──▶ Failed
//!    │                         └──timeout──▶ Expired
//!    └──────────── daily reset (every row) ◀──────────┘
//! ```
//!
//! Every trigger has an `_at` form taking the evaluation instant, and a
//! plain form that evaluates at the current local time.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};
use tracing::{debug, error, info, warn};

use crate::archive::{ArchiveEntry, ArchiveStore};
use crate::channels::{Answer, DeliveryGateway, MessageHandle, SendOptions};
use crate::config::{LifecycleConfig, TaskwatchConfig};
use crate::error::{Result, StoreError, TaskError};
use crate::lifecycle::cache::{PendingResponse, ResponseCaches};
use crate::lifecycle::delivery::{RetryPolicy, send_with_retry};
use crate::lifecycle::message_log::MessageLog;
use crate::lifecycle::notices;
use crate::lifecycle::report::StatusReport;
use crate::store::{StatusChange, Task, TaskStatus, TaskStore};
use crate::time;

/// Messages deleted per batch when clearing the chat.
const CLEAR_BATCH_SIZE: usize = 10;
/// Pause between delete batches.
const CLEAR_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Outcome of one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Delivered and moved to awaiting-response.
    pub sent: Vec<String>,
    /// Delivery retries exhausted; still Pending.
    pub failed: Vec<String>,
    /// Delivered, but the row had already left Pending when we came to mark it.
    pub superseded: Vec<String>,
}

/// A reminder sent during a follow-up cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUpSent {
    pub task_id: String,
    /// Reminders sent for this task so far, this one included.
    pub count: u32,
}

/// Result of [`LifecycleEngine::daily_archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived { path: PathBuf, pruned: usize },
    /// Today's snapshot was already taken; nothing was copied.
    AlreadyArchived { date: NaiveDate },
}

/// Time left on one awaiting-response window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub task_id: String,
    pub name: String,
    pub minutes_remaining: i64,
}

/// Owns the response caches and drives every lifecycle transition.
pub struct LifecycleEngine {
    store: Arc<TaskStore>,
    gateway: Arc<dyn DeliveryGateway>,
    archive: Arc<dyn ArchiveStore>,
    channel: String,
    lifecycle: LifecycleConfig,
    retry: RetryPolicy,
    inter_message_delay: Duration,
    retention_days: u32,
    caches: Mutex<ResponseCaches>,
    messages: Mutex<MessageLog>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<TaskStore>,
        gateway: Arc<dyn DeliveryGateway>,
        archive: Arc<dyn ArchiveStore>,
        config: &TaskwatchConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            archive,
            channel: config.telegram.chat_id.clone(),
            lifecycle: config.lifecycle.clone(),
            retry: RetryPolicy::from(&config.delivery),
            inter_message_delay: config.delivery.inter_message_delay(),
            retention_days: config.archive.retention_days,
            caches: Mutex::new(ResponseCaches::default()),
            messages: Mutex::new(MessageLog::default()),
        }
    }

    /// Override the destination channel (defaults to the configured chat id).
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    fn caches(&self) -> MutexGuard<'_, ResponseCaches> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn messages(&self) -> MutexGuard<'_, MessageLog> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timeout_minutes(&self) -> f64 {
        self.lifecycle.response_timeout_minutes as f64
    }

    /// Run a store operation on the blocking pool.
    ///
    /// Every store call reads or rewrites the dataset file under a std mutex,
    /// which must not stall the async workers driving the other triggers.
    async fn store_op<R, F>(&self, op: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&TaskStore) -> Result<R> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| StoreError::Interrupted(e.to_string()))?
    }

    /// Remember a chat message so [`Self::clear_chat`] can remove it later.
    pub fn remember_message(&self, message_id: i64) {
        self.messages().record(message_id);
    }

    fn remember(&self, handle: &MessageHandle) {
        if handle.channel == self.channel {
            self.remember_message(handle.message_id);
        }
    }

    /// Send a Markdown notice to the engine's channel (single attempt).
    pub async fn send_notice(&self, text: &str) -> Result<MessageHandle> {
        let handle = self
            .gateway
            .send(&self.channel, text, &SendOptions::markdown())
            .await?;
        self.remember(&handle);
        Ok(handle)
    }

    /// Single-attempt send whose failure is only logged.
    async fn notify(&self, text: &str) {
        if let Err(e) = self.send_notice(text).await {
            warn!(error = %e, "failed to send notice");
        }
    }

    /// Re-populate pending entries from awaiting rows after a restart.
    ///
    /// Rebuilt entries have no message handle, so their original message is
    /// not edited when the answer arrives.
    pub fn rebuild_pending(&self) -> Result<usize> {
        let awaiting = self.store.find_by_status(TaskStatus::SentAwaitingResponse)?;
        let now = Local::now();
        let mut caches = self.caches();
        for task in &awaiting {
            let sent_at = time::parse_timestamp(&task.response_time).unwrap_or(now);
            caches.restore(PendingResponse::for_task(task, sent_at, None));
        }
        Ok(awaiting.len())
    }

    // ── dispatch ────────────────────────────────────────────────────────

    pub async fn dispatch_ready_tasks(&self) -> Result<DispatchReport> {
        self.dispatch_ready_tasks_at(Local::now()).await
    }

    /// Deliver every ready task in dataset order.
    ///
    /// Status timestamps advance with the (tokio) clock as the cycle
    /// proceeds, so later tasks are stamped with their own send time.
    pub async fn dispatch_ready_tasks_at(&self, now: DateTime<Local>) -> Result<DispatchReport> {
        self.log_pending_snapshot(now);

        let ready = self.store_op(move |store| store.list_ready_at(now)).await?;
        if ready.is_empty() {
            debug!("no tasks ready for dispatch");
            return Ok(DispatchReport::default());
        }
        info!(count = ready.len(), "dispatching ready tasks");

        let started = tokio::time::Instant::now();
        let mut report = DispatchReport::default();
        for (index, task) in ready.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.inter_message_delay).await;
            }

            let text = notices::task_message(task, self.lifecycle.response_timeout_minutes);
            let options = SendOptions::markdown().with_ack_buttons(&task.id);
            let sent = send_with_retry(
                self.gateway.as_ref(),
                &self.channel,
                &task.id,
                &text,
                &options,
                &self.retry,
            )
            .await;

            let handle = match sent {
                Ok(handle) => {
                    self.remember(&handle);
                    handle
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "task delivery failed");
                    report.failed.push(task.id.clone());
                    self.notify(&notices::delivery_failed(task, &e)).await;
                    continue;
                }
            };

            let sent_at = now
                + chrono::Duration::from_std(started.elapsed())
                    .unwrap_or_else(|_| chrono::Duration::zero());
            let id = task.id.clone();
            let marked = self
                .store_op(move |store| {
                    store.transition_at(&id, sent_at, |current| {
                        if current.status == TaskStatus::Pending {
                            Ok(StatusChange::to(TaskStatus::SentAwaitingResponse))
                        } else {
                            Err(TaskError::NotActionable {
                                task_id: current.id.clone(),
                                status: current.status,
                            })
                        }
                    })
                })
                .await;

            match marked {
                Ok(updated) => {
                    self.caches()
                        .record_sent(PendingResponse::for_task(&updated, sent_at, Some(handle)));
                    info!(task_id = %updated.id, name = %updated.name, "task delivered, awaiting response");
                    report.sent.push(updated.id);
                }
                Err(TaskError::NotActionable { task_id, status }) => {
                    warn!(%task_id, %status, "task changed while being delivered, leaving it as is");
                    report.superseded.push(task_id);
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "task delivered but status update failed");
                    report.failed.push(task.id.clone());
                }
            }
        }
        Ok(report)
    }

    // ── responses ───────────────────────────────────────────────────────

    pub async fn record_response(
        &self,
        task_id: &str,
        answer: Answer,
        responded_by: &str,
    ) -> Result<Task> {
        self.record_response_at(task_id, answer, responded_by, Local::now())
            .await
    }

    /// Apply a yes/no answer. Expired tasks are not actionable.
    pub async fn record_response_at(
        &self,
        task_id: &str,
        answer: Answer,
        responded_by: &str,
        now: DateTime<Local>,
    ) -> Result<Task> {
        let status = match answer {
            Answer::Yes => TaskStatus::Completed,
            Answer::No => TaskStatus::Failed,
        };

        let id = task_id.to_owned();
        let by = responded_by.to_owned();
        let updated = self
            .store_op(move |store| {
                store.transition_at(&id, now, |current| {
                    if current.status == TaskStatus::Expired {
                        Err(TaskError::NotActionable {
                            task_id: current.id.clone(),
                            status: current.status,
                        })
                    } else {
                        Ok(StatusChange::to(status).by(by))
                    }
                })
            })
            .await?;

        let pending = self.caches().clear(&updated.id);
        info!(task_id = %updated.id, %status, responded_by, "response recorded");

        if let Some(handle) = pending.and_then(|p| p.handle) {
            let text = notices::response_recorded(&updated, answer, responded_by, now);
            if let Err(e) = self
                .gateway
                .edit(&handle.channel, handle.message_id, &text)
                .await
            {
                warn!(task_id = %updated.id, error = %e, "failed to update task message");
            }
        }
        Ok(updated)
    }

    // ── expiry ──────────────────────────────────────────────────────────

    pub async fn expire_overdue(&self) -> Result<Vec<Task>> {
        self.expire_overdue_at(Local::now()).await
    }

    /// Expire awaiting tasks whose window has strictly elapsed.
    pub async fn expire_overdue_at(&self, now: DateTime<Local>) -> Result<Vec<Task>> {
        let timeout = self.timeout_minutes();
        let expired = self
            .store_op(move |store| {
                store.transition_all_at(now, |task| {
                    if task.status != TaskStatus::SentAwaitingResponse {
                        return None;
                    }
                    match time::minutes_since(&task.response_time, now) {
                        Some(elapsed) if elapsed > timeout => {
                            Some(StatusChange::to(TaskStatus::Expired))
                        }
                        Some(_) => None,
                        None => {
                            warn!(task_id = %task.id, response_time = %task.response_time, "awaiting task has no usable response time, skipping expiry");
                            None
                        }
                    }
                })
            })
            .await?;

        if expired.is_empty() {
            return Ok(expired);
        }
        {
            let mut caches = self.caches();
            for task in &expired {
                caches.clear(&task.id);
            }
        }
        info!(count = expired.len(), "tasks expired");
        self.notify(&notices::expired_batch(&expired)).await;
        Ok(expired)
    }

    // ── follow-ups ──────────────────────────────────────────────────────

    pub async fn send_follow_ups(&self) -> Result<Vec<FollowUpSent>> {
        self.send_follow_ups_at(Local::now()).await
    }

    /// Remind about awaiting tasks inside `[follow_up_after, timeout)`.
    ///
    /// The awaiting rows are read once, before any send, so each task is
    /// checked against its pending entry again right before its reminder:
    /// a task answered or expired during an earlier send is skipped.
    pub async fn send_follow_ups_at(&self, now: DateTime<Local>) -> Result<Vec<FollowUpSent>> {
        let threshold = self.lifecycle.follow_up_after_minutes as f64;
        let timeout = self.timeout_minutes();
        let max = self.lifecycle.max_follow_ups;

        let awaiting = self
            .store_op(|store| store.find_by_status(TaskStatus::SentAwaitingResponse))
            .await?;
        let mut sent = Vec::new();
        for task in awaiting {
            let Some(elapsed) = time::minutes_since(&task.response_time, now) else {
                warn!(task_id = %task.id, response_time = %task.response_time, "awaiting task has no usable response time, skipping follow-up");
                continue;
            };
            if elapsed < threshold || elapsed >= timeout {
                continue;
            }

            let (count, reply_to) = {
                let mut caches = self.caches();
                let Some(pending) = caches.pending(&task.id) else {
                    debug!(task_id = %task.id, "no longer awaiting a response, skipping follow-up");
                    continue;
                };
                let reply_to = pending.handle.as_ref().map(|h| h.message_id);
                let Some(count) = caches.reserve_follow_up(&task.id, max) else {
                    continue;
                };
                (count, reply_to)
            };

            let minutes_left = (timeout - elapsed).ceil() as u64;
            let text = notices::follow_up(&task, count, max, minutes_left);
            let options = SendOptions {
                reply_to,
                ..SendOptions::markdown()
            };
            match self.gateway.send(&self.channel, &text, &options).await {
                Ok(handle) => {
                    self.remember(&handle);
                    info!(task_id = %task.id, count, max, "follow-up sent");
                    sent.push(FollowUpSent {
                        task_id: task.id,
                        count,
                    });
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "failed to send follow-up");
                    self.caches().release_follow_up(&task.id);
                }
            }
        }
        Ok(sent)
    }

    #[must_use]
    pub fn follow_up_count(&self, task_id: &str) -> u32 {
        self.caches().follow_up_count(task_id)
    }

    // ── daily maintenance ───────────────────────────────────────────────

    /// Return every task to Pending and forget all in-memory state.
    pub async fn daily_reset(&self) -> Result<usize> {
        let count = self.store_op(TaskStore::reset_all).await?;
        self.caches().clear_all();
        info!(count, "daily reset complete");
        self.notify(&notices::reset_completed(count)).await;
        Ok(count)
    }

    pub async fn daily_archive(&self) -> Result<ArchiveOutcome> {
        self.daily_archive_for(Local::now().date_naive()).await
    }

    /// Snapshot the dataset for `date`, at most once per date.
    pub async fn daily_archive_for(&self, date: NaiveDate) -> Result<ArchiveOutcome> {
        let archive = Arc::clone(&self.archive);
        let retention_days = self.retention_days;
        let archived = self
            .store_op(move |store| {
                let copied = store.with_locked_source(|source| {
                    if archive.archive_exists(date) {
                        return Ok(None);
                    }
                    archive.archive(source, date).map(Some)
                })??;
                let Some(path) = copied else {
                    return Ok(None);
                };
                let pruned = archive.prune(date, retention_days).unwrap_or_else(|e| {
                    warn!(error = %e, "failed to prune old archives");
                    0
                });
                Ok(Some((path, pruned)))
            })
            .await;

        let (path, pruned) = match archived {
            Ok(Some(archived)) => archived,
            Ok(None) => {
                info!(%date, "dataset already archived today");
                return Ok(ArchiveOutcome::AlreadyArchived { date });
            }
            Err(e) => {
                error!(%date, error = %e, "daily archive failed");
                self.notify(&notices::archive_failed(&e)).await;
                return Err(e);
            }
        };

        info!(path = %path.display(), pruned, "daily archive complete");
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.notify(&notices::archive_succeeded(&file_name, pruned))
            .await;
        Ok(ArchiveOutcome::Archived { path, pruned })
    }

    // ── reporting ───────────────────────────────────────────────────────

    pub async fn status_report_at(&self, now: DateTime<Local>) -> Result<StatusReport> {
        let tasks = self.store_op(TaskStore::load_all).await?;
        Ok(StatusReport::from_tasks(tasks, now))
    }

    /// Build and send the status report.
    pub async fn publish_status_report(&self) -> Result<StatusReport> {
        let report = self.status_report_at(Local::now()).await?;
        self.send_notice(&report.render()).await?;
        info!(total = report.total(), "status report sent");
        Ok(report)
    }

    /// Every stored snapshot, newest first.
    pub async fn list_archives(&self) -> Result<Vec<ArchiveEntry>> {
        let archive = Arc::clone(&self.archive);
        tokio::task::spawn_blocking(move || archive.list())
            .await
            .map_err(|e| TaskError::Archive(format!("archive listing interrupted: {e}")))?
    }

    /// Send the backup listing to the channel.
    pub async fn publish_backup_list(&self) -> Result<Vec<ArchiveEntry>> {
        let entries = self.list_archives().await?;
        self.send_notice(&notices::backup_list(&entries)).await?;
        info!(count = entries.len(), "backup list sent");
        Ok(entries)
    }

    // ── chat housekeeping ───────────────────────────────────────────────

    /// Delete every remembered message from the channel, oldest first.
    ///
    /// Deletes in batches of ten with a one second pause between batches.
    /// Messages the channel refuses to delete (too old, already gone) are
    /// skipped. Returns the number actually deleted.
    pub async fn clear_chat(&self) -> usize {
        let ids = self.messages().drain();
        let mut deleted = 0;
        for (index, batch) in ids.chunks(CLEAR_BATCH_SIZE).enumerate() {
            if index > 0 {
                tokio::time::sleep(CLEAR_BATCH_PAUSE).await;
            }
            for &message_id in batch {
                match self.gateway.delete(&self.channel, message_id).await {
                    Ok(()) => deleted += 1,
                    Err(e) => debug!(message_id, error = %e, "could not delete message"),
                }
            }
        }
        info!(deleted, known = ids.len(), "chat cleared");
        deleted
    }

    /// Minutes left on each awaiting-response window, soonest first.
    #[must_use]
    pub fn pending_snapshot_at(&self, now: DateTime<Local>) -> Vec<PendingSnapshot> {
        let timeout = self.lifecycle.response_timeout_minutes as i64;
        let mut snapshot: Vec<PendingSnapshot> = self
            .caches()
            .pending_entries()
            .map(|entry| PendingSnapshot {
                task_id: entry.task_id.clone(),
                name: entry.name.clone(),
                minutes_remaining: timeout - now.signed_duration_since(entry.sent_at).num_minutes(),
            })
            .collect();
        snapshot.sort_by(|a, b| {
            a.minutes_remaining
                .cmp(&b.minutes_remaining)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        snapshot
    }

    fn log_pending_snapshot(&self, now: DateTime<Local>) {
        let snapshot = self.pending_snapshot_at(now);
        if snapshot.is_empty() {
            return;
        }
        info!(count = snapshot.len(), "tasks awaiting response");
        for entry in snapshot {
            debug!(
                task_id = %entry.task_id,
                name = %entry.name,
                minutes_remaining = entry.minutes_remaining,
                "awaiting response"
            );
        }
    }
}
