use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{capture::Frame, decision::Decision};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Outcome of one completed cycle, kept for the diagnostics view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub screenshot: Frame,
    pub response: Decision,
    pub stimulus_triggered: bool,
}

impl CycleResult {
    pub fn new(frame: Frame, decision: Decision) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            stimulus_triggered: decision.negative_stimulus(),
            screenshot: frame,
            response: decision,
        }
    }
}

/// Most-recent-first ring of cycle results. Entries are shared read-only
/// once appended; the only removal is eviction of the oldest.
#[derive(Debug)]
pub struct HistoryLog {
    entries: VecDeque<Arc<CycleResult>>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, entry: CycleResult) -> Arc<CycleResult> {
        let entry = Arc::new(entry);
        self.entries.push_front(Arc::clone(&entry));
        self.entries.truncate(self.capacity);
        entry
    }

    /// Snapshot of the log, newest first.
    pub fn all(&self) -> Vec<Arc<CycleResult>> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Arc<CycleResult>> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(seq: u64) -> CycleResult {
        CycleResult::new(
            Frame::from_png(vec![seq as u8], 8),
            Decision::from_payload(json!({ "negative_stimulus": seq % 2 == 0, "seq": seq })),
        )
    }

    fn seq(entry: &CycleResult) -> u64 {
        entry.response.payload()["seq"].as_u64().unwrap()
    }

    #[test]
    fn keeps_ten_most_recent_newest_first() {
        let mut log = HistoryLog::default();
        for n in 0..15 {
            log.append(entry(n));
        }

        let seqs: Vec<u64> = log.all().iter().map(|e| seq(e)).collect();
        assert_eq!(seqs, (5..15).rev().collect::<Vec<_>>());
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn snapshots_are_unaffected_by_later_appends() {
        let mut log = HistoryLog::new(3);
        log.append(entry(1));
        let before = log.all();
        log.append(entry(2));

        assert_eq!(before.len(), 1);
        assert_eq!(seq(&before[0]), 1);
        assert_eq!(seq(log.latest().unwrap()), 2);
    }

    #[test]
    fn triggered_flag_follows_decision() {
        assert!(entry(4).stimulus_triggered);
        assert!(!entry(3).stimulus_triggered);
    }

    #[test]
    fn serializes_for_display() {
        let value = serde_json::to_value(entry(2)).unwrap();
        assert_eq!(value["stimulusTriggered"], json!(true));
        assert_eq!(value["response"]["seq"], json!(2));
        assert!(value["screenshot"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }
}
