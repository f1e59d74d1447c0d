//! Due-time queue keyed by sender identity.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use crate::broadcast::sender::{SenderKey, StreamKind};

#[derive(Debug, Clone, Copy)]
struct Entry {
    due: DateTime<Utc>,
    key: SenderKey,
}

impl Entry {
    fn sort_key(&self) -> (DateTime<Utc>, i64, StreamKind) {
        (self.due, self.key.chat_id.0, self.key.kind)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Min-heap of pending fires with cancel-by-key.
///
/// `index` is authoritative. Heap entries whose due time no longer matches
/// the index are stale and dropped when they surface.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    index: HashMap<SenderKey, DateTime<Utc>>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` at `due`, replacing any earlier schedule for it.
    pub fn schedule(&mut self, key: SenderKey, due: DateTime<Utc>) {
        self.index.insert(key, due);
        self.heap.push(Reverse(Entry { due, key }));
    }

    /// Returns `true` if something was scheduled for `key`.
    pub fn cancel(&mut self, key: &SenderKey) -> bool {
        self.index.remove(key).is_some()
    }

    pub fn due_at(&self, key: &SenderKey) -> Option<DateTime<Utc>> {
        self.index.get(key).copied()
    }

    /// Remove and return every key due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<SenderKey> {
        let mut due = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek().copied() {
            if entry.due > now {
                break;
            }
            self.heap.pop();
            if self.index.get(&entry.key) == Some(&entry.due) {
                self.index.remove(&entry.key);
                due.push(entry.key);
            }
        }
        due
    }

    /// Earliest live due time.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        while let Some(Reverse(entry)) = self.heap.peek().copied() {
            if self.index.get(&entry.key) == Some(&entry.due) {
                return Some(entry.due);
            }
            self.heap.pop();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
