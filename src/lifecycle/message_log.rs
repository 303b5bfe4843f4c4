//! Recent chat message ids, kept so the chat can be cleared on request.
//!
//! The Bot API has no "list chat history" call, so the engine remembers the
//! ids it has seen or sent. Uses a fixed-capacity ring buffer; the oldest ids
//! are dropped first.

use std::collections::VecDeque;

/// Default number of message ids remembered.
pub const DEFAULT_CAPACITY: usize = 500;

/// Bounded log of message ids in the engine's chat.
#[derive(Debug)]
pub struct MessageLog {
    ids: VecDeque<i64>,
    capacity: usize,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MessageLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember `message_id`. Duplicates are ignored.
    pub fn record(&mut self, message_id: i64) {
        if self.ids.contains(&message_id) {
            return;
        }
        self.ids.push_back(message_id);
        while self.ids.len() > self.capacity {
            self.ids.pop_front();
        }
    }

    /// Take every remembered id, oldest first, leaving the log empty.
    pub fn drain(&mut self) -> Vec<i64> {
        self.ids.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_ids_fall_off() {
        let mut log = MessageLog::with_capacity(3);
        for id in 1..=5 {
            log.record(id);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.drain(), vec![3, 4, 5]);
        assert!(log.is_empty());
    }

    #[test]
    fn duplicates_are_recorded_once() {
        let mut log = MessageLog::default();
        log.record(7);
        log.record(7);
        assert_eq!(log.drain(), vec![7]);
    }
}
