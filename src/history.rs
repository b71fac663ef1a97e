//! Bounded, append-only history with capacity and age retention.

use std::collections::VecDeque;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// Entries stored in a [`History`] carry their own timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl<T: Timestamped> Timestamped for Arc<T> {
    fn timestamp(&self) -> DateTime<Utc> {
        (**self).timestamp()
    }
}

/// Append-only ring buffer.
///
/// Holds at most `capacity` entries; [`History::push`] also drops entries older
/// than `retention` relative to the newest one. Entries are never mutated
/// once appended.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    capacity: usize,
    retention: Duration,
}

impl<T: Timestamped> History<T> {
    /// Creates an empty history.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, retention: Duration) -> Self {
        assert!(capacity > 0, "history capacity must be > 0");
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            retention,
        }
    }

    /// Appends an entry and evicts entries past capacity or retention.
    pub fn push(&mut self, entry: T) {
        let newest = entry.timestamp();
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        // A retention reaching before the earliest representable time keeps everything.
        let Some(cutoff) = newest.checked_sub_signed(self.retention) else {
            return;
        };
        while self
            .entries
            .front()
            .is_some_and(|e| e.timestamp() < cutoff)
        {
            self.entries.pop_front();
        }
    }

    /// Returns the most recent entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Returns up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    /// Returns entries with `timestamp >= since`, oldest first.
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &T> {
        self.entries.iter().filter(move |e| e.timestamp() >= since)
    }

    /// Iterates over all retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
