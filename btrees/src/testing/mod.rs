//! Shared fixtures for unit and end-to-end tests.

use crate::btree::BTree;
use crate::config::TreeConfig;
use crate::storage::{MemoryStore, ObjectStore};
use crate::types::ObjectRef;

/// Object reference derived from a key, so values are easy to predict.
#[must_use]
pub fn obj(key: u32) -> ObjectRef {
    ObjectRef(u64::from(key) * 10)
}

/// Empty in-memory `u32 -> ObjectRef` tree with the given bucket capacity
/// and internal fan-out.
#[must_use]
pub fn memory_tree(
    max_bucket_size: usize,
    max_btree_size: usize,
) -> BTree<u32, ObjectRef, MemoryStore> {
    let config = TreeConfig::new(max_bucket_size, max_btree_size);
    #[allow(clippy::expect_used)]
    let tree = BTree::create(MemoryStore::new(), config).expect("Failed to create test tree");
    tree
}

/// Collect every key of `tree` in order.
#[must_use]
pub fn all_keys<S: ObjectStore>(tree: &BTree<u32, ObjectRef, S>) -> Vec<u32> {
    #[allow(clippy::expect_used)]
    let keys = tree
        .keys()
        .collect::<Result<Vec<_>, _>>()
        .expect("Failed to scan tree");
    keys
}
