/// Bounded crash history
/// Newest-first, capped list of finished rounds with time-window deduplication

use serde::Serialize;
use std::collections::VecDeque;

use crate::models::HistoryEntry;
use crate::settings::{HISTORY_CAPACITY, HISTORY_DEDUP_WINDOW_MS};

#[derive(Debug, Clone, Serialize)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    #[serde(skip)]
    capacity: usize,
    #[serde(skip)]
    dedup_window_ms: i64,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY, HISTORY_DEDUP_WINDOW_MS)
    }
}

impl History {
    pub fn new(capacity: usize, dedup_window_ms: i64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dedup_window_ms,
        }
    }

    /// Insert one entry, returns false if it was a duplicate or fell off the end
    pub fn insert(&mut self, entry: HistoryEntry) -> bool {
        if !entry.value.is_finite() || entry.value <= 0.0 {
            return false;
        }
        if self.is_duplicate(entry.timestamp) {
            return false;
        }

        let entry = HistoryEntry::new(entry.value, entry.timestamp);
        let pos = self
            .entries
            .iter()
            .position(|e| e.timestamp < entry.timestamp)
            .unwrap_or(self.entries.len());
        if pos >= self.capacity {
            return false;
        }
        self.entries.insert(pos, entry);
        self.entries.truncate(self.capacity);
        true
    }

    /// Merge a batch (any order), returns how many entries were kept
    pub fn merge(&mut self, incoming: &[HistoryEntry]) -> usize {
        let mut batch: Vec<HistoryEntry> = incoming.to_vec();
        // Oldest first so that within-batch duplicates keep the earlier original
        batch.sort_by_key(|e| e.timestamp);
        batch.into_iter().filter(|e| self.insert(*e)).count()
    }

    fn is_duplicate(&self, timestamp: i64) -> bool {
        self.entries
            .iter()
            .any(|e| (e.timestamp - timestamp).abs() < self.dedup_window_ms)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.entries.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixty_crashes_keep_newest_fifty() {
        let mut history = History::default();
        for i in 0..60 {
            history.insert(HistoryEntry::new(1.0 + i as f64 / 10.0, i * 10_000));
        }
        assert_eq!(history.len(), 50);

        let timestamps: Vec<i64> = history.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps[0], 59 * 10_000, "newest first");
        assert_eq!(*timestamps.last().unwrap(), 10 * 10_000);
        assert!(timestamps.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_entries_two_seconds_apart_collapse() {
        let mut history = History::default();
        assert!(history.insert(HistoryEntry::new(2.5, 100_000)));
        assert!(!history.insert(HistoryEntry::new(2.6, 102_000)));
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().value, 2.5, "original kept");
    }

    #[test]
    fn test_window_boundary_is_distinct() {
        let mut history = History::default();
        assert!(history.insert(HistoryEntry::new(1.5, 100_000)));
        assert!(history.insert(HistoryEntry::new(1.7, 105_000)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            HistoryEntry::new(3.1, 30_000),
            HistoryEntry::new(1.2, 20_000),
            HistoryEntry::new(5.0, 10_000),
        ];
        let mut history = History::default();
        assert_eq!(history.merge(&batch), 3);
        assert_eq!(history.merge(&batch), 0);
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().unwrap().timestamp, 30_000);
    }

    #[test]
    fn test_out_of_order_insert_keeps_ordering() {
        let mut history = History::default();
        history.insert(HistoryEntry::new(1.1, 50_000));
        history.insert(HistoryEntry::new(1.2, 10_000));
        history.insert(HistoryEntry::new(1.3, 30_000));
        let timestamps: Vec<i64> = history.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![50_000, 30_000, 10_000]);
    }

    #[test]
    fn test_older_than_window_when_full_is_dropped() {
        let mut history = History::new(2, 5000);
        history.insert(HistoryEntry::new(1.1, 100_000));
        history.insert(HistoryEntry::new(1.2, 90_000));
        assert!(!history.insert(HistoryEntry::new(1.3, 10_000)));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_color_recomputed_from_value() {
        let mut history = History::default();
        let mut entry = HistoryEntry::new(3.0, 1);
        entry.color = crate::models::HistoryColor::Red;
        history.insert(entry);
        assert_eq!(history.latest().unwrap().color, crate::models::HistoryColor::Green);
    }

    #[test]
    fn test_rejects_non_positive_values() {
        let mut history = History::default();
        assert!(!history.insert(HistoryEntry::new(0.0, 1)));
        assert!(!history.insert(HistoryEntry::new(f64::NAN, 1)));
        assert!(history.is_empty());
    }
}
