//! Cursor and dedup set for one session.

use std::collections::HashSet;

use crate::error::SyncError;
use crate::fingerprint::Fingerprint;
use crate::types::Record;

/// Timestamp of the newest record incorporated so far. Never moves backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    last_seen: Option<i64>,
}

impl Cursor {
    pub fn at(ts: i64) -> Self {
        Self { last_seen: Some(ts) }
    }

    pub fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_none()
    }

    fn advance_to(&mut self, ts: i64) {
        if self.last_seen.map_or(true, |cur| ts > cur) {
            self.last_seen = Some(ts);
        }
    }
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Records not seen before in this session, stably sorted by timestamp.
    pub records: Vec<Record>,
    pub cursor: Cursor,
    /// Records dropped because they had no fingerprint.
    pub malformed: usize,
}

#[derive(Debug, Default)]
pub struct DedupStore {
    cursor: Cursor,
    seen: HashSet<Fingerprint>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.seen.contains(fp)
    }

    /// Filter `raw` against the seen set, record the survivors and advance the cursor.
    ///
    /// Records older than the cursor still survive if unseen (backfill); the
    /// caller decides where they go.
    pub fn merge(&mut self, raw: Vec<Record>) -> MergeOutcome {
        let mut records = Vec::with_capacity(raw.len());
        let mut malformed = 0usize;

        for record in raw {
            let fp = record.fingerprint();
            if !fp.is_valid() {
                malformed += 1;
                let err = SyncError::MalformedRecord {
                    reason: format!(
                        "{} record without a usable timestamp",
                        record.role().label()
                    ),
                };
                log::warn!("⚠️ {err}");
                continue;
            }
            // insert() doubles as the membership test, so duplicates inside one
            // batch are caught too
            if !self.seen.insert(fp) {
                continue;
            }
            records.push(record);
        }

        // sort_by_key is stable: equal timestamps keep arrival order
        records.sort_by_key(|r| r.timestamp());

        if let Some(max_ts) = records.iter().filter_map(Record::timestamp).max() {
            self.cursor.advance_to(max_ts);
        }

        MergeOutcome {
            records,
            cursor: self.cursor,
            malformed,
        }
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.cursor = Cursor::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn rec(ts: i64, body: &str) -> Record {
        Record::new(Some(ts), Role::Secondary, body)
    }

    #[test]
    fn duplicates_within_one_batch_collapse() {
        let mut store = DedupStore::new();
        let out = store.merge(vec![rec(1, "a"), rec(1, "a"), rec(2, "b")]);
        assert_eq!(out.records.len(), 2);
        assert_eq!(store.seen_count(), 2);
    }

    #[test]
    fn equal_timestamps_keep_arrival_order() {
        let mut store = DedupStore::new();
        let out = store.merge(vec![rec(5, "first"), rec(3, "early"), rec(5, "second")]);
        let bodies: Vec<&str> = out.records.iter().map(Record::content).collect();
        assert_eq!(bodies, vec!["early", "first", "second"]);
    }

    #[test]
    fn older_unseen_records_do_not_rewind_cursor() {
        let mut store = DedupStore::new();
        store.merge(vec![rec(10, "ten")]);
        let out = store.merge(vec![rec(4, "backfill")]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.cursor.last_seen(), Some(10));
    }

    #[test]
    fn malformed_records_are_counted_and_skipped() {
        let mut store = DedupStore::new();
        let out = store.merge(vec![Record::new(None, Role::Primary, "?"), rec(1, "ok")]);
        assert_eq!(out.malformed, 1);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.cursor.last_seen(), Some(1));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut store = DedupStore::new();
        store.merge(vec![rec(1, "a")]);
        store.reset();
        assert!(store.cursor().is_empty());
        assert_eq!(store.seen_count(), 0);
        assert_eq!(store.merge(vec![rec(1, "a")]).records.len(), 1);
    }
}
