// Copyright 2020 Conflux Foundation. All rights reserved.
// Conflux is free software and distributed under GNU General Public License.
// See http://www.gnu.org/licenses/

use super::*;
use std::sync::Arc;

fn key(k: &'static [u8]) -> Bytes { k.to_vec() }

fn value(v: &'static [u8]) -> Bytes { v.to_vec() }

fn init_snapshot() -> Snapshot {
    vec![
        (key(b"00"), value(b"v0")),
        (key(b"01"), value(b"v0")),
        (key(b"11"), value(b"v0")),
        (key(b"22"), value(b"v0")),
    ]
    .into_iter()
    .collect()
}

#[test]
fn test_cache_store_isolates_writes() {
    let snapshot = init_snapshot();
    let mut view = CacheStore::new(&snapshot);

    view.set(key(b"11"), value(b"v1"));
    view.delete(key(b"22"));

    assert_eq!(view.get(b"11").unwrap(), Some(value(b"v1")));
    assert_eq!(view.get(b"22").unwrap(), None);
    assert_eq!(snapshot.get(b"11").unwrap(), Some(value(b"v0")));
    assert_eq!(snapshot.get(b"22").unwrap(), Some(value(b"v0")));

    let writes = view.into_writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes.get(b"22"), Some(&None));
}

#[test]
fn test_read_set_records_fall_through_only() {
    let snapshot = init_snapshot();
    let mut view = CacheStore::new(&snapshot);

    view.set(key(b"00"), value(b"v1"));
    // Reading back an own write is not a dependency.
    view.get(b"00").unwrap();
    view.get(b"01").unwrap();
    view.get(b"missing").unwrap();

    let reads = view.read_set();
    assert_eq!(reads.len(), 2);
    assert!(!reads.contains_key(b"00"));
    assert_eq!(reads.observed(b"01"), Some(&Some(value(b"v0"))));
    assert_eq!(reads.observed(b"missing"), Some(&None));
}

#[test]
fn test_nested_views() {
    let snapshot = init_snapshot();
    let mut outer = CacheStore::new(&snapshot);
    outer.set(key(b"11"), value(b"outer"));

    let inner_writes = {
        let mut inner = CacheStore::new(&outer);
        assert_eq!(inner.get(b"11").unwrap(), Some(value(b"outer")));
        inner.get(b"22").unwrap();
        inner.set(key(b"33"), value(b"inner"));
        inner.into_writes()
    };
    outer.apply(inner_writes);

    let (writes, reads) = outer.into_parts();
    assert_eq!(writes.get(b"33"), Some(&Some(value(b"inner"))));
    // The inner read of 22 fell through the outer view.
    assert!(reads.contains_key(b"22"));
    assert!(!reads.contains_key(b"11"));
}

#[test]
fn test_discarded_inner_view_keeps_reads() {
    let snapshot = init_snapshot();
    let outer = CacheStore::new(&snapshot);
    {
        let mut inner = CacheStore::new(&outer);
        inner.get(b"01").unwrap();
        inner.set(key(b"01"), value(b"dropped"));
    }
    assert!(!outer.is_dirty());
    assert!(outer.read_set().contains_key(b"01"));
}

#[test]
fn test_block_state_apply() {
    let block = BlockState::new(Arc::new(init_snapshot()));
    let mut first = WriteSet::new();
    first.insert(key(b"00"), Some(value(b"v1")));
    first.insert(key(b"01"), None);
    block.apply(first);

    assert_eq!(block.get(b"00").unwrap(), Some(value(b"v1")));
    assert_eq!(block.get(b"01").unwrap(), None);
    assert_eq!(block.base().get(b"00").unwrap(), Some(value(b"v0")));

    let mut second = WriteSet::new();
    second.insert(key(b"00"), Some(value(b"v2")));
    block.apply(second);
    assert_eq!(block.get(b"00").unwrap(), Some(value(b"v2")));
    assert_eq!(block.into_writes().len(), 2);
}

#[test]
fn test_versioned_store_heights() {
    let mut store = VersionedStore::new(init_snapshot(), 2);
    let genesis_root = store.latest().state_root();

    let mut writes = WriteSet::new();
    writes.insert(key(b"11"), Some(value(b"v1")));
    let root1 = store.commit(1, writes.clone()).unwrap();
    assert_ne!(root1, genesis_root);

    assert_eq!(
        store.commit(3, WriteSet::new()),
        Err(Error::NonSequentialHeight { got: 3, latest: 1 })
    );

    let root2 = store.commit(2, WriteSet::new()).unwrap();
    assert_eq!(root1, root2);

    assert_eq!(
        store.state_at(5).unwrap_err(),
        Error::UnknownHeight {
            height: 5,
            latest: 2
        }
    );
    assert_eq!(
        store.state_at(0).unwrap_err(),
        Error::PrunedHeight {
            height: 0,
            earliest: 1
        }
    );
    assert_eq!(
        store.state_at(1).unwrap().get(b"11").unwrap(),
        Some(value(b"v1"))
    );
}

#[test]
fn test_latest_state_is_never_pruned() {
    let mut store = VersionedStore::new(init_snapshot(), 1);
    for height in 1..=3 {
        let mut writes = WriteSet::new();
        writes.insert(key(b"00"), Some(vec![height as u8]));
        store.commit(height, writes).unwrap();
    }
    assert_eq!(store.earliest_height(), 3);
    assert_eq!(store.latest().get(b"00").unwrap(), Some(vec![3]));
    assert_eq!(store.latest(), store.state_at(3).unwrap());
    assert!(store.state_at(2).is_err());
}

#[test]
fn test_state_root_ignores_insertion_order() {
    let a: Snapshot = vec![(key(b"a"), value(b"1")), (key(b"b"), value(b"2"))]
        .into_iter()
        .collect();
    let b: Snapshot = vec![(key(b"b"), value(b"2")), (key(b"a"), value(b"1"))]
        .into_iter()
        .collect();
    assert_eq!(state_root(&a), state_root(&b));
    assert_ne!(state_root(&a), state_root(&Snapshot::new()));
}

#[test]
fn test_decoded_access() {
    let mut snapshot = Snapshot::new();
    snapshot.set_encoded(key(b"n"), &42u64);
    assert_eq!(snapshot.get_decoded::<u64>(b"n").unwrap(), Some(42));
    assert_eq!(snapshot.get_decoded::<u64>(b"none").unwrap(), None);
    snapshot.set(key(b"bad"), vec![0xc1]);
    match snapshot.get_decoded::<u64>(b"bad") {
        Err(Error::Decoder(_)) => {}
        other => panic!("expected a decoder error, got {:?}", other),
    }
}
