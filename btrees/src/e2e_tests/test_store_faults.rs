//! Test how store failures surface and how a tree recovers from them.

use crate::btree::{BTree, BTreeError};
use crate::config::TreeConfig;
use crate::e2e_tests::helpers::{all_keys, insert_all, obj};
use crate::simulation::{FaultConfig, SimulatedStore};
use crate::storage::StorageError;
use crate::types::ObjectRef;

type SimTree = BTree<u32, ObjectRef, SimulatedStore>;

fn tree_with(keys: &[u32]) -> SimTree {
    let mut tree = BTree::create(SimulatedStore::new(8), TreeConfig::new(3, 3)).unwrap();
    insert_all(&mut tree, keys);
    tree.commit().unwrap();
    tree
}

#[test]
fn test_read_fault_surfaces_as_storage_error() {
    let mut tree = tree_with(&[1, 2, 3, 4, 5]);
    tree.release_clean();
    tree.store_mut().set_fault_config(FaultConfig {
        read_error_rate: 1.0,
        ..Default::default()
    });

    assert!(matches!(
        tree.get(&3),
        Err(BTreeError::Storage(StorageError::InjectedFault(_)))
    ));
    assert!(tree.iter().next().unwrap().is_err());

    tree.store_mut().set_fault_config(FaultConfig::no_faults());
    assert_eq!(tree.get(&3).unwrap(), Some(obj(3)));
}

#[test]
fn test_failed_commit_keeps_changes_for_retry() {
    let mut tree = tree_with(&[1, 2, 3]);
    insert_all(&mut tree, &[4, 5]);

    tree.store_mut().set_fault_config(FaultConfig {
        sync_error_rate: 1.0,
        ..Default::default()
    });
    assert!(matches!(tree.commit(), Err(BTreeError::Storage(_))));
    assert!(tree.stats().dirty_nodes > 0);
    assert_eq!(tree.len(), 5);

    tree.store_mut().set_fault_config(FaultConfig::no_faults());
    tree.commit().unwrap();
    assert_eq!(tree.stats().dirty_nodes, 0);

    let meta_id = tree.meta_id();
    let reopened: SimTree = BTree::open(tree.into_store(), meta_id).unwrap();
    assert_eq!(all_keys(&reopened), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_abort_after_failed_commit_restores_committed_state() {
    let mut tree = tree_with(&[10, 20, 30]);
    insert_all(&mut tree, &[40, 50, 60, 70]);
    tree.delete(&10).unwrap();

    tree.store_mut().set_fault_config(FaultConfig {
        write_error_rate: 1.0,
        ..Default::default()
    });
    assert!(tree.commit().is_err());

    tree.store_mut().set_fault_config(FaultConfig::no_faults());
    tree.abort().unwrap();
    assert_eq!(all_keys(&tree), vec![10, 20, 30]);
    tree.check().unwrap();
}

#[test]
fn test_fault_during_insert_then_abort() {
    let mut tree = tree_with(&(0..40).collect::<Vec<_>>());
    tree.release_clean();
    tree.store_mut().set_fault_config(FaultConfig {
        read_error_rate: 1.0,
        ..Default::default()
    });

    assert!(matches!(
        tree.insert(100, obj(100), false),
        Err(BTreeError::Storage(_))
    ));

    tree.store_mut().set_fault_config(FaultConfig::no_faults());
    tree.abort().unwrap();
    assert_eq!(tree.len(), 40);
    assert_eq!(tree.get(&100).unwrap(), None);
    tree.insert(100, obj(100), false).unwrap();
    tree.check().unwrap();
}

#[test]
fn test_failed_split_is_undone_by_abort() {
    // Buckets [5, 10, 20] and [30, 40].
    let mut tree = tree_with(&[10, 20, 30, 40, 5]);
    tree.release_clean();
    // Cache the path to the left bucket but not its right neighbour.
    assert_eq!(tree.get(&10).unwrap(), Some(obj(10)));

    tree.store_mut().set_fault_config(FaultConfig {
        read_error_rate: 1.0,
        ..Default::default()
    });
    // The split has to relink the right neighbour, whose load fails.
    assert!(matches!(
        tree.insert(15, obj(15), false),
        Err(BTreeError::Storage(StorageError::InjectedFault(_)))
    ));
    assert_eq!(tree.len(), 6);

    tree.store_mut().set_fault_config(FaultConfig::no_faults());
    tree.abort().unwrap();
    assert_eq!(tree.len(), 5);
    assert_eq!(all_keys(&tree), vec![5, 10, 20, 30, 40]);
    tree.check().unwrap();
}

#[test]
fn test_open_missing_metadata_is_storage_error() {
    let result: Result<SimTree, _> = BTree::open(SimulatedStore::new(1), 77);
    assert!(matches!(
        result,
        Err(BTreeError::Storage(StorageError::NotFound(77)))
    ));
}
