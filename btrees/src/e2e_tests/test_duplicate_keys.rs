//! Test inserting a key that is already present.

use crate::btree::{BTree, BTreeError, InsertOutcome};
use crate::config::{DuplicatePolicy, TreeConfig};
use crate::e2e_tests::helpers::{insert_all, obj};
use crate::storage::MemoryStore;
use crate::testing::memory_tree;
use crate::types::ObjectRef;

#[test]
fn test_insert_without_overwrite_rejects_duplicate() {
    let mut tree = memory_tree(3, 3);
    insert_all(&mut tree, &[50, 10, 30, 70, 20]);

    let result = tree.insert(30, ObjectRef(999), false);
    assert!(matches!(result, Err(BTreeError::KeyExists)));

    assert_eq!(tree.len(), 5);
    assert_eq!(tree.get(&30).unwrap(), Some(obj(30)));
    tree.check().unwrap();
}

#[test]
fn test_insert_with_overwrite_replaces_value() {
    let mut tree = memory_tree(3, 3);
    insert_all(&mut tree, &[50, 10, 30, 70, 20]);

    let outcome = tree.insert(30, ObjectRef(999), true).unwrap();
    assert_eq!(outcome, InsertOutcome::Replaced(obj(30)));

    assert_eq!(tree.len(), 5);
    assert_eq!(tree.get(&30).unwrap(), Some(ObjectRef(999)));
}

#[test]
fn test_set_follows_duplicate_policy() {
    let config = TreeConfig::new(3, 3).with_duplicate_policy(DuplicatePolicy::Reject);
    let mut tree: BTree<u32, ObjectRef, _> = BTree::create(MemoryStore::new(), config).unwrap();

    assert_eq!(tree.set(1, ObjectRef(1)).unwrap(), None);
    assert!(matches!(
        tree.set(1, ObjectRef(2)),
        Err(BTreeError::KeyExists)
    ));
    assert_eq!(tree.get(&1).unwrap(), Some(ObjectRef(1)));

    let mut replacing = memory_tree(3, 3);
    assert_eq!(replacing.set(1, ObjectRef(1)).unwrap(), None);
    assert_eq!(replacing.set(1, ObjectRef(2)).unwrap(), Some(ObjectRef(1)));
    assert_eq!(replacing.len(), 1);
}

#[test]
fn test_duplicate_policy_survives_reopen() {
    let config = TreeConfig::new(3, 3).with_duplicate_policy(DuplicatePolicy::Reject);
    let tree: BTree<u32, ObjectRef, _> = BTree::create(MemoryStore::new(), config).unwrap();
    let meta_id = tree.meta_id();

    let mut reopened: BTree<u32, ObjectRef, _> = BTree::open(tree.into_store(), meta_id).unwrap();
    assert_eq!(reopened.config().duplicate_policy, DuplicatePolicy::Reject);
    reopened.set(5, ObjectRef(5)).unwrap();
    assert!(reopened.set(5, ObjectRef(6)).is_err());
}
