//! Deduplicating backlog of tracks waiting for the current slot.

use nowgrab_proto::{QueryKey, Track};
use std::collections::VecDeque;

/// FIFO for promotion; the newest entry can also be discarded.
///
/// No two entries share a query key, and no entry shares the key of the item
/// passed as `current` when it was enqueued.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<Track>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `track` unless it duplicates `current` or an existing entry.
    /// Returns whether it was added; duplicates are expected and silent.
    pub fn enqueue(&mut self, track: Track, current: Option<&Track>) -> bool {
        let key = track.query_key();
        if current.is_some_and(|c| c.query_key() == key) || self.contains(&key) {
            return false;
        }
        self.entries.push_back(track);
        true
    }

    /// Remove and return the oldest entry.
    pub fn promote(&mut self) -> Option<Track> {
        self.entries.pop_front()
    }

    /// Remove and return the most recently enqueued entry.
    pub fn discard_newest(&mut self) -> Option<Track> {
        self.entries.pop_back()
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.iter().any(|t| &t.query_key() == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in promotion order, for display.
    pub fn keys(&self) -> Vec<QueryKey> {
        self.entries.iter().map(Track::query_key).collect()
    }
}
