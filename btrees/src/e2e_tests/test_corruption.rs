//! Test that damaged node and metadata records are reported, not trusted.

use crate::btree::{BTree, BTreeError, Bucket, FormatError};
use crate::config::TreeConfig;
use crate::e2e_tests::helpers::{insert_all, obj, shuffled};
use crate::simulation::SimulatedStore;
use crate::types::ObjectRef;

type SimTree = BTree<u32, ObjectRef, SimulatedStore>;

fn committed_tree(keys: &[u32]) -> SimTree {
    let mut tree = BTree::create(SimulatedStore::new(1), TreeConfig::new(3, 3)).unwrap();
    insert_all(&mut tree, keys);
    tree.commit().unwrap();
    tree.release_clean();
    tree
}

#[test]
fn test_flipped_bit_in_node_is_format_error() {
    let mut tree = committed_tree(&[1, 2]);
    let root = tree.root().unwrap();
    tree.store_mut().tamper(root, |bytes| bytes[4] ^= 0x01);

    let result = tree.get(&1);
    assert!(matches!(
        result,
        Err(BTreeError::Format(FormatError::ChecksumMismatch { .. }))
    ));
}

#[test]
fn test_truncated_node_is_format_error() {
    let mut tree = committed_tree(&[1, 2]);
    let root = tree.root().unwrap();
    tree.store_mut().tamper(root, |bytes| bytes.truncate(2));

    assert!(matches!(tree.get(&1), Err(BTreeError::Format(_))));
    assert!(matches!(tree.min(), Err(BTreeError::Format(_))));
}

#[test]
fn test_corruption_is_not_cached() {
    let mut tree = committed_tree(&[5]);
    let root = tree.root().unwrap();
    let mut original = Vec::new();
    tree.store_mut().tamper(root, |bytes| {
        original.clone_from(bytes);
        bytes[0] ^= 0xFF;
    });
    assert!(tree.get(&5).is_err());

    tree.store_mut().tamper(root, |bytes| bytes.clone_from(&original));
    assert_eq!(tree.get(&5).unwrap(), Some(obj(5)));
}

#[test]
fn test_damaged_bucket_fails_scan_midway() {
    let mut tree = committed_tree(&shuffled(60, 4));
    assert!(tree.height().unwrap() >= 3);

    // Damage the bucket holding the largest key.
    let mut first_damaged_key = None;
    for id in 1..=500 {
        tree.store_mut().tamper(id, |bytes| {
            let holds_last = Bucket::<u32, ObjectRef>::decode(bytes)
                .ok()
                .filter(|bucket| bucket.keys.contains(&59));
            if let Some(bucket) = holds_last {
                first_damaged_key = bucket.first_key();
                let last = bytes.len() - 1;
                bytes[last] ^= 0x80;
            }
        });
    }
    let first_damaged_key = first_damaged_key.unwrap();

    let entries: Vec<_> = tree.iter().collect();
    assert!(entries.last().unwrap().is_err());
    // The cursor stops after the first error.
    assert_eq!(entries.iter().filter(|entry| entry.is_err()).count(), 1);
    assert_eq!(entries.len() - 1, first_damaged_key as usize);
    assert_eq!(tree.get(&0).unwrap(), Some(obj(0)));
}

#[test]
fn test_corrupt_metadata_rejected_on_open() {
    let tree = committed_tree(&[1, 2, 3]);
    let meta_id = tree.meta_id();
    let mut store = tree.into_store();
    store.tamper(meta_id, |bytes| bytes[0] = b'X');

    let result: Result<SimTree, _> = BTree::open(store, meta_id);
    assert!(matches!(
        result,
        Err(BTreeError::Format(FormatError::ChecksumMismatch { .. }))
    ));
}
