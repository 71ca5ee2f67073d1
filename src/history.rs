//! Bounded, most-recent-first detection history.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::detect::Detection;

/// Default number of retained entries.
pub const MAX_HISTORY_ENTRIES: usize = 21;

/// Timestamped snapshot of one frame's retained detections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub items: Vec<Detection>,
}

impl HistoryEntry {
    /// Entry stamped with the local wall-clock time.
    pub fn now(items: Vec<Detection>) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            items,
        }
    }
}

/// Ring of history entries. The oldest entry is dropped past capacity.
#[derive(Clone, Debug)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_ENTRIES)
    }

    /// A capacity of zero is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only view for display consumers.
    pub fn view(&self) -> HistoryView<'_> {
        HistoryView { log: self }
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Read access to a `HistoryLog`. There is no way to mutate through it.
#[derive(Clone, Copy)]
pub struct HistoryView<'a> {
    log: &'a HistoryLog,
}

impl<'a> HistoryView<'a> {
    /// Entries, most recent first.
    pub fn entries(&self) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        self.log.entries.iter()
    }

    pub fn latest(&self) -> Option<&'a HistoryEntry> {
        self.log.entries.front()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn to_vec(&self) -> Vec<HistoryEntry> {
        self.log.entries.iter().cloned().collect()
    }
}

/// One history line, e.g. `person – walking – 87%` or `cup – 91%`.
pub fn format_item(det: &Detection) -> String {
    match (&det.activity, det.class.is_person()) {
        (Some(activity), true) => format!(
            "{} – {} – {}%",
            det.class,
            activity,
            det.confidence_percent()
        ),
        _ => format!("{} – {}%", det.class, det.confidence_percent()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Activity;
    use crate::detect::{BoundingBox, ObjectClass};

    fn entry(n: usize) -> HistoryEntry {
        HistoryEntry {
            timestamp: format!("t{n}"),
            items: Vec::new(),
        }
    }

    #[test]
    fn keeps_most_recent_entries_first() {
        let mut log = HistoryLog::new();
        for i in 0..25 {
            log.push(entry(i));
        }
        assert_eq!(log.len(), MAX_HISTORY_ENTRIES);
        let stamps: Vec<String> = log.view().entries().map(|e| e.timestamp.clone()).collect();
        let expected: Vec<String> = (4..25).rev().map(|i| format!("t{i}")).collect();
        assert_eq!(stamps, expected);
        assert_eq!(log.view().latest().unwrap().timestamp, "t24");
    }

    #[test]
    fn below_capacity_keeps_everything() {
        let mut log = HistoryLog::with_capacity(3);
        log.push(entry(0));
        log.push(entry(1));
        assert_eq!(log.len(), 2);
        assert_eq!(log.view().to_vec()[0].timestamp, "t1");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut log = HistoryLog::with_capacity(0);
        log.push(entry(0));
        log.push(entry(1));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.view().latest().unwrap().timestamp, "t1");
    }

    #[test]
    fn timestamp_is_clock_time() {
        let stamp = HistoryEntry::now(Vec::new()).timestamp;
        assert_eq!(stamp.len(), 8);
        assert_eq!(stamp.matches(':').count(), 2);
    }

    #[test]
    fn formats_person_and_object_lines() {
        let person = Detection {
            class: ObjectClass::Person,
            score: 0.874,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            activity: Some(Activity::Walking),
        };
        let cup = Detection {
            class: ObjectClass::Cup,
            score: 0.91,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            activity: None,
        };
        assert_eq!(format_item(&person), "person – walking – 87%");
        assert_eq!(format_item(&cup), "cup – 91%");
    }
}
