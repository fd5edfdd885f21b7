//! In-memory index of intervals that have been opened but not yet closed.
//!
//! The index records intent only. Reconciliation never consults it to decide
//! which stored row to close, so losing it (for example on restart) does not
//! change any outcome; it only affects what `status`-style diagnostics report.

use std::collections::HashMap;

use crate::types::{ParticipantId, RoomId};

/// Key of an open interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalKey {
    pub participant: ParticipantId,
    pub room: RoomId,
}

impl IntervalKey {
    pub const fn new(participant: ParticipantId, room: RoomId) -> Self {
        Self { participant, room }
    }
}

/// Maps `(participant, room)` to the entry time of its open interval.
#[derive(Debug, Default)]
pub struct OpenIntervalIndex {
    entries: HashMap<IntervalKey, String>,
}

impl OpenIntervalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entry time, replacing any previous one for the key.
    ///
    /// Returns the replaced entry time, if any.
    pub fn put(&mut self, key: IntervalKey, entry_time: impl Into<String>) -> Option<String> {
        self.entries.insert(key, entry_time.into())
    }

    /// Forgets the key. Absent keys are ignored.
    pub fn remove(&mut self, key: &IntervalKey) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &IntervalKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by key, for stable diagnostic output.
    pub fn sorted(&self) -> Vec<(IntervalKey, String)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }
}
