//! Bounded newest-first operator log.

use desk_core::{LogEntry, LogLevel};
use std::collections::VecDeque;

/// Default number of entries kept, matching the engine's own history.
pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug)]
pub struct LogBook {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBook {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Prepend an entry, evicting the oldest when full.
    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    /// Newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn count_level(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
