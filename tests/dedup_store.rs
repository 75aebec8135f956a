//! Cursor & dedup store properties

mod common;

use common::{rec, recs, timestamps};
use tailview::dedup::DedupStore;
use tailview::types::{Record, Role};

#[test]
fn overlapping_batches_yield_only_new_records() {
    let mut store = DedupStore::new();

    let first = store.merge(recs(&[1000, 2000, 3000]));
    assert_eq!(timestamps(&first.records), vec![1000, 2000, 3000]);
    assert_eq!(first.cursor.last_seen(), Some(3000));

    let second = store.merge(recs(&[2000, 3000, 4000]));
    assert_eq!(timestamps(&second.records), vec![4000]);
    assert_eq!(second.cursor.last_seen(), Some(4000));
}

#[test]
fn merge_is_idempotent() {
    let mut store = DedupStore::new();
    let batch = recs(&[5, 1, 3]);

    let first = store.merge(batch.clone());
    assert_eq!(timestamps(&first.records), vec![1, 3, 5]);

    let again = store.merge(batch);
    assert!(again.records.is_empty());
    assert_eq!(again.cursor, first.cursor);
    assert_eq!(store.seen_count(), 3);
}

#[test]
fn cursor_never_moves_backwards() {
    let mut store = DedupStore::new();
    let mut last = None;
    for batch in [vec![10, 20], vec![5], vec![15, 30], vec![1, 2, 3], vec![]] {
        let out = store.merge(recs(&batch));
        let now = out.cursor.last_seen();
        assert!(now >= last, "cursor went from {last:?} to {now:?}");
        last = now;
    }
    assert_eq!(last, Some(30));
}

#[test]
fn same_timestamp_different_content_are_distinct() {
    let mut store = DedupStore::new();
    let out = store.merge(vec![
        Record::new(Some(1), Role::Primary, "question"),
        Record::new(Some(1), Role::Secondary, "question"),
        Record::new(Some(1), Role::Primary, "another question"),
    ]);
    assert_eq!(out.records.len(), 3);
}

#[test]
fn records_without_timestamp_are_skipped_not_fatal() {
    let mut store = DedupStore::new();
    let out = store.merge(vec![
        Record::new(None, Role::Primary, "no time"),
        rec(7),
        Record::new(None, Role::Secondary, "no time either"),
    ]);
    assert_eq!(out.malformed, 2);
    assert_eq!(timestamps(&out.records), vec![7]);
    assert_eq!(out.cursor.last_seen(), Some(7));
}
