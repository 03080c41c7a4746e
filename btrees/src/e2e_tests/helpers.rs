//! Common helpers for end-to-end tests.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::btree::BTree;
use crate::config::TreeConfig;
use crate::storage::{FileStore, ObjectStore};
use crate::types::ObjectRef;

pub use crate::testing::{all_keys, obj};

pub type FileTree = BTree<u32, ObjectRef, FileStore>;

/// A tree stored in a file inside a temporary directory.
///
/// The directory is removed when the value is dropped.
pub struct TestFile {
    dir: TempDir,
}

impl TestFile {
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::expect_used)]
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        Self { dir }
    }

    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("tree.db")
    }

    /// Create a new tree in the file and record its metadata id as the
    /// store root.
    #[allow(clippy::expect_used)]
    pub fn create_tree(&self, config: TreeConfig) -> FileTree {
        let store = FileStore::create(&self.path()).expect("Failed to create store");
        let mut tree = BTree::create(store, config).expect("Failed to create tree");
        let meta_id = tree.meta_id();
        let store = tree.store_mut();
        store.set_root(Some(meta_id)).expect("Failed to set root");
        store.sync().expect("Failed to sync");
        tree
    }

    /// Reopen the tree recorded in the file.
    pub fn reopen(&self) -> FileTree {
        reopen_at(&self.path())
    }
}

#[allow(clippy::expect_used)]
fn reopen_at(path: &Path) -> FileTree {
    let store = FileStore::open(path).expect("Failed to open store");
    let meta_id = store.root().expect("Store has no root");
    BTree::open(store, meta_id).expect("Failed to open tree")
}

/// Insert `keys` with values from [`obj`], rejecting duplicates.
#[allow(clippy::expect_used)]
pub fn insert_all<S: ObjectStore>(tree: &mut BTree<u32, ObjectRef, S>, keys: &[u32]) {
    for &key in keys {
        tree.insert(key, obj(key), false).expect("Failed to insert");
    }
}

/// Deterministic permutation of `0..n`.
#[must_use]
pub fn shuffled(n: u32, seed: u64) -> Vec<u32> {
    let mut keys: Vec<u32> = (0..n).collect();
    let mut state = seed | 1;
    for i in (1..keys.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        #[allow(clippy::cast_possible_truncation)]
        let j = (state % (i as u64 + 1)) as usize;
        keys.swap(i, j);
    }
    keys
}
