//! The Log Store component: append-only, 1-based, contiguous log of
//! `Entry`s, with truncate-after for conflict resolution on a follower.

use crate::error::LogError;
use std::sync::Mutex;

/// A single replicated log entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub payload: Vec<u8>,
}

/// Cheap, derivable metadata about the last entry in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastMeta {
    pub index: u64,
    pub term: u64,
}

impl LastMeta {
    pub const EMPTY: LastMeta = LastMeta { index: 0, term: 0 };

    /// Candidate's log is at least as up-to-date as ours: a later term wins
    /// outright, an equal term needs at least as long a log.
    pub fn at_least_as_up_to_date_as(&self, other: &LastMeta) -> bool {
        self.term > other.term || (self.term == other.term && self.index >= other.index)
    }
}

/// The Log Store interface consumed by the rest of the core.
///
/// Implementations may serialize their own internal mutation behind a
/// single-writer lock; callers never assume atomicity across multiple
/// calls.
pub trait LogStore: Send + Sync {
    /// Appends `entries` after the current end of the log. Indices in
    /// `entries` must be contiguous and start at `last_meta().index + 1`.
    fn append(&self, entries: &[Entry]) -> Result<(), LogError>;

    /// Looks up the entry at `index`, if present.
    fn get(&self, index: u64) -> Option<Entry>;

    /// Returns every entry from `from_index` (inclusive) to the end.
    fn entries_from(&self, from_index: u64) -> Vec<Entry>;

    /// O(1) metadata about the last entry, or `LastMeta::EMPTY` if the log
    /// is empty.
    fn last_meta(&self) -> LastMeta;

    /// Deletes every entry with index strictly greater than `index`.
    fn truncate_after(&self, index: u64);

    /// True if the log contains an entry at `index` whose term is `term`
    /// (or `index == 0`, the implicit empty-log sentinel entry).
    fn matches(&self, index: u64, term: u64) -> bool {
        if index == 0 {
            return term == 0;
        }
        self.get(index).map(|e| e.term == term).unwrap_or(false)
    }
}

/// An in-memory `LogStore`. This is the log store used by tests and by the
/// reference binary; a durable on-disk layout is an external collaborator,
/// not part of this core.
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryLog {
    pub fn new() -> MemoryLog {
        MemoryLog { entries: Mutex::new(Vec::new()) }
    }
}

impl LogStore for MemoryLog {
    fn append(&self, new_entries: &[Entry]) -> Result<(), LogError> {
        let mut entries = self.entries.lock().unwrap();
        entries.extend_from_slice(new_entries);
        Ok(())
    }

    fn get(&self, index: u64) -> Option<Entry> {
        if index == 0 {
            return None;
        }
        let entries = self.entries.lock().unwrap();
        entries.get((index - 1) as usize).cloned()
    }

    fn entries_from(&self, from_index: u64) -> Vec<Entry> {
        let entries = self.entries.lock().unwrap();
        if from_index == 0 {
            return entries.clone();
        }
        let start = (from_index - 1) as usize;
        entries.get(start..).map(|s| s.to_vec()).unwrap_or_default()
    }

    fn last_meta(&self) -> LastMeta {
        let entries = self.entries.lock().unwrap();
        match entries.last() {
            Some(e) => LastMeta { index: e.index, term: e.term },
            None => LastMeta::EMPTY,
        }
    }

    fn truncate_after(&self, index: u64) {
        let mut entries = self.entries.lock().unwrap();
        entries.truncate(index as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u64, term: u64) -> Entry {
        Entry { index, term, payload: vec![] }
    }

    #[test]
    fn empty_log_has_zero_meta() {
        let log = MemoryLog::new();
        assert_eq!(log.last_meta(), LastMeta::EMPTY);
        assert!(log.matches(0, 0));
        assert!(!log.matches(1, 0));
    }

    #[test]
    fn append_and_lookup() {
        let log = MemoryLog::new();
        log.append(&[entry(1, 1), entry(2, 1)]).unwrap();
        assert_eq!(log.get(1), Some(entry(1, 1)));
        assert_eq!(log.get(2), Some(entry(2, 1)));
        assert_eq!(log.get(3), None);
        assert_eq!(log.last_meta(), LastMeta { index: 2, term: 1 });
        assert!(log.matches(2, 1));
        assert!(!log.matches(2, 2));
    }

    #[test]
    fn truncate_after_drops_suffix() {
        let log = MemoryLog::new();
        log.append(&[entry(1, 1), entry(2, 1), entry(3, 1)]).unwrap();
        log.truncate_after(1);
        assert_eq!(log.last_meta(), LastMeta { index: 1, term: 1 });
        assert_eq!(log.get(2), None);
    }

    #[test]
    fn entries_from_is_inclusive() {
        let log = MemoryLog::new();
        log.append(&[entry(1, 1), entry(2, 1), entry(3, 2)]).unwrap();
        let from2 = log.entries_from(2);
        assert_eq!(from2, vec![entry(2, 1), entry(3, 2)]);
        assert_eq!(log.entries_from(0).len(), 3);
    }

    #[test]
    fn up_to_date_comparison() {
        let ahead_term = LastMeta { index: 1, term: 5 };
        let behind_term = LastMeta { index: 100, term: 4 };
        assert!(ahead_term.at_least_as_up_to_date_as(&behind_term));
        assert!(!behind_term.at_least_as_up_to_date_as(&ahead_term));

        let longer = LastMeta { index: 10, term: 3 };
        let shorter = LastMeta { index: 5, term: 3 };
        assert!(longer.at_least_as_up_to_date_as(&shorter));
        assert!(!shorter.at_least_as_up_to_date_as(&longer));
    }
}
