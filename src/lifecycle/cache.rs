//! In-memory state for tasks awaiting a response.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::channels::MessageHandle;
use crate::store::Task;

/// A delivered task waiting for its yes/no answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResponse {
    pub task_id: String,
    pub name: String,
    pub execution_time: String,
    pub sent_at: DateTime<Local>,
    /// Absent for entries rebuilt from the dataset after a restart.
    pub handle: Option<MessageHandle>,
}

impl PendingResponse {
    pub fn for_task(task: &Task, sent_at: DateTime<Local>, handle: Option<MessageHandle>) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.name.clone(),
            execution_time: task.execution_time.clone(),
            sent_at,
            handle,
        }
    }
}

/// Pending responses plus per-task follow-up counters.
///
/// Both maps are keyed by the task id as stored in the dataset. An entry in
/// either map only exists while its task is awaiting a response.
#[derive(Debug, Default)]
pub struct ResponseCaches {
    pending: HashMap<String, PendingResponse>,
    follow_ups: HashMap<String, u32>,
}

impl ResponseCaches {
    pub fn record_sent(&mut self, entry: PendingResponse) {
        self.follow_ups.remove(&entry.task_id);
        self.pending.insert(entry.task_id.clone(), entry);
    }

    /// Insert only if absent; used when rebuilding from the dataset.
    pub fn restore(&mut self, entry: PendingResponse) {
        self.pending.entry(entry.task_id.clone()).or_insert(entry);
    }

    #[must_use]
    pub fn pending(&self, task_id: &str) -> Option<&PendingResponse> {
        self.pending.get(task_id)
    }

    pub fn pending_entries(&self) -> impl Iterator<Item = &PendingResponse> {
        self.pending.values()
    }

    /// Forget everything about a task that left the awaiting state.
    pub fn clear(&mut self, task_id: &str) -> Option<PendingResponse> {
        self.follow_ups.remove(task_id);
        self.pending.remove(task_id)
    }

    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.follow_ups.clear();
    }

    #[must_use]
    pub fn follow_up_count(&self, task_id: &str) -> u32 {
        self.follow_ups.get(task_id).copied().unwrap_or(0)
    }

    /// Claim the next follow-up slot, or `None` once `max` is reached.
    ///
    /// The slot is taken before sending so overlapping cycles cannot both
    /// send the last allowed reminder.
    pub fn reserve_follow_up(&mut self, task_id: &str, max: u32) -> Option<u32> {
        let count = self.follow_ups.entry(task_id.to_owned()).or_insert(0);
        if *count >= max {
            return None;
        }
        *count += 1;
        Some(*count)
    }

    /// Give back a slot whose reminder could not be sent.
    pub fn release_follow_up(&mut self, task_id: &str) {
        if let Some(count) = self.follow_ups.get_mut(task_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.follow_ups.remove(task_id);
            }
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn entry(id: &str) -> PendingResponse {
        PendingResponse::for_task(&Task::new(id, "name"), Local::now(), None)
    }

    #[test]
    fn follow_up_reservation_is_capped() {
        let mut caches = ResponseCaches::default();
        assert_eq!(caches.reserve_follow_up("T1", 2), Some(1));
        assert_eq!(caches.reserve_follow_up("T1", 2), Some(2));
        assert_eq!(caches.reserve_follow_up("T1", 2), None);
        assert_eq!(caches.follow_up_count("T1"), 2);
    }

    #[test]
    fn released_slot_can_be_reused() {
        let mut caches = ResponseCaches::default();
        caches.reserve_follow_up("T1", 1);
        caches.release_follow_up("T1");
        assert_eq!(caches.follow_up_count("T1"), 0);
        assert_eq!(caches.reserve_follow_up("T1", 1), Some(1));
    }

    #[test]
    fn clear_drops_both_maps() {
        let mut caches = ResponseCaches::default();
        caches.record_sent(entry("T1"));
        caches.reserve_follow_up("T1", 2);
        assert!(caches.clear("T1").is_some());
        assert!(caches.pending("T1").is_none());
        assert_eq!(caches.follow_up_count("T1"), 0);
    }

    #[test]
    fn resend_resets_follow_up_counter() {
        let mut caches = ResponseCaches::default();
        caches.reserve_follow_up("T1", 2);
        caches.record_sent(entry("T1"));
        assert_eq!(caches.follow_up_count("T1"), 0);
    }

    #[test]
    fn restore_keeps_existing_entry() {
        let mut caches = ResponseCaches::default();
        let mut live = entry("T1");
        live.handle = Some(MessageHandle {
            channel: "c".to_owned(),
            message_id: 5,
        });
        caches.record_sent(live.clone());
        caches.restore(entry("T1"));
        assert_eq!(caches.pending("T1"), Some(&live));
        assert_eq!(caches.pending_len(), 1);
    }
}
