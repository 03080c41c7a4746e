//! Test deleting the last entry of a tree.

use crate::btree::BTreeError;
use crate::e2e_tests::helpers::{insert_all, obj, shuffled};
use crate::testing::memory_tree;

#[test]
fn test_delete_only_key_empties_tree() {
    let mut tree = memory_tree(3, 3);
    tree.insert(42, obj(42), false).unwrap();

    assert_eq!(tree.delete(&42).unwrap(), obj(42));

    assert!(tree.is_empty());
    assert_eq!(tree.root(), None);
    assert_eq!(tree.get(&42).unwrap(), None);
    assert_eq!(tree.get(&7).unwrap(), None);
    assert_eq!(tree.min().unwrap(), None);
    assert_eq!(tree.max().unwrap(), None);
    assert_eq!(tree.iter().count(), 0);
    assert_eq!(tree.height().unwrap(), 0);
    tree.check().unwrap();
}

#[test]
fn test_delete_twice_reports_missing_key() {
    let mut tree = memory_tree(3, 3);
    tree.insert(1, obj(1), false).unwrap();
    tree.delete(&1).unwrap();

    assert!(matches!(tree.delete(&1), Err(BTreeError::KeyNotFound)));
    assert_eq!(tree.remove(&1).unwrap(), None);
}

#[test]
fn test_delete_everything_then_reuse() {
    let mut tree = memory_tree(3, 3);
    let keys = shuffled(200, 11);
    insert_all(&mut tree, &keys);

    for key in shuffled(200, 23) {
        assert_eq!(tree.delete(&key).unwrap(), obj(key));
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root(), None);
    tree.check().unwrap();

    insert_all(&mut tree, &[3, 1, 2]);
    assert_eq!(tree.min().unwrap(), Some((1, obj(1))));
    assert_eq!(tree.max().unwrap(), Some((3, obj(3))));
}

#[test]
fn test_empty_tree_commit_frees_every_node() {
    let mut tree = memory_tree(3, 3);
    insert_all(&mut tree, &shuffled(50, 5));
    tree.commit().unwrap();
    let populated = tree.store_mut().object_count();
    assert!(populated > 1);

    tree.clear().unwrap();
    tree.commit().unwrap();
    // Only the metadata record is left.
    assert_eq!(tree.store_mut().object_count(), 1);
}
