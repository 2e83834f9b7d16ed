//! In-memory store for finished records.
//!
//! Records that leave the drain tick (HANDLED or FAILED) stay inspectable
//! until they are older than the retention time or pushed out by the size
//! cap. Whole records are dropped, never individual steps.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::ErrorRecord;

#[derive(Debug, Default)]
pub(crate) struct RetentionStore {
    records: HashMap<String, ErrorRecord>,
    /// Ids in first-insertion order, oldest at the front.
    order: VecDeque<String>,
}

impl RetentionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ErrorRecord) {
        let id = record.id.clone();
        if self.records.insert(id.clone(), record).is_none() {
            self.order.push_back(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&ErrorRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// All retained records, oldest first.
    pub fn list(&self) -> Vec<ErrorRecord> {
        let mut records: Vec<ErrorRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Drops records last updated before `now - retention`, then evicts the
    /// oldest insertions until at most `max_records` remain.
    pub fn purge(&mut self, retention: Duration, max_records: usize, now: DateTime<Utc>) -> usize {
        let before = self.records.len();

        if let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|r| now.checked_sub_signed(r))
        {
            self.records.retain(|_, record| record.updated_at >= cutoff);
        }

        let records = &self.records;
        self.order.retain(|id| records.contains_key(id));

        while self.records.len() > max_records {
            match self.order.pop_front() {
                Some(id) => {
                    self.records.remove(&id);
                }
                None => break,
            }
        }

        before - self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        ErrorClassification, ErrorContext, ErrorContextFragment, RaisedError,
    };

    fn record() -> ErrorRecord {
        ErrorRecord::new(
            RaisedError::message("m"),
            ErrorContext::from_fragment(ErrorContextFragment::default()),
            ErrorClassification::unknown("m"),
        )
    }

    #[test]
    fn test_insert_get_list() {
        let mut store = RetentionStore::new();
        let a = record();
        let b = record();
        store.insert(a.clone());
        store.insert(b.clone());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a.id).unwrap().id, a.id);
        assert!(store.get("missing").is_none());
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_purge_drops_old_records_only() {
        let mut store = RetentionStore::new();
        let old = record();
        let fresh = record();
        store.insert(old.clone());
        store.insert(fresh.clone());

        // Pretend an hour passed for `old` only.
        let now = Utc::now() + chrono::Duration::seconds(3600);
        let mut fresh_later = fresh.clone();
        fresh_later.updated_at = now;
        store.insert(fresh_later);

        let purged = store.purge(Duration::from_secs(60), usize::MAX, now);
        assert_eq!(purged, 1);
        assert!(store.get(&old.id).is_none());
        assert!(store.get(&fresh.id).is_some());
    }

    #[test]
    fn test_purge_with_long_retention_keeps_everything() {
        let mut store = RetentionStore::new();
        store.insert(record());
        assert_eq!(store.purge(Duration::from_secs(3600), usize::MAX, Utc::now()), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_size_cap_evicts_oldest_insertions() {
        let mut store = RetentionStore::new();
        let records: Vec<ErrorRecord> = (0..5).map(|_| record()).collect();
        for r in &records {
            store.insert(r.clone());
        }

        let purged = store.purge(Duration::from_secs(3600), 3, Utc::now());
        assert_eq!(purged, 2);
        assert_eq!(store.len(), 3);
        assert!(store.get(&records[0].id).is_none());
        assert!(store.get(&records[1].id).is_none());
        assert!(store.get(&records[4].id).is_some());
    }

    #[test]
    fn test_zero_cap_keeps_nothing() {
        let mut store = RetentionStore::new();
        store.insert(record());
        store.insert(record());
        assert_eq!(store.purge(Duration::from_secs(3600), 0, Utc::now()), 2);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_reinserting_keeps_one_order_entry() {
        let mut store = RetentionStore::new();
        let a = record();
        let b = record();
        store.insert(a.clone());
        store.insert(b.clone());
        store.insert(a.clone());

        store.purge(Duration::from_secs(3600), 1, Utc::now());
        assert!(store.get(&a.id).is_none());
        assert!(store.get(&b.id).is_some());
    }
}
