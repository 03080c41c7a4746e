//! Test large mixed workloads against a model map.

use std::collections::BTreeMap;

use crate::config::TreeConfig;
use crate::e2e_tests::helpers::{TestFile, all_keys, shuffled};
use crate::testing::memory_tree;
use crate::types::ObjectRef;

#[test]
fn test_interleaved_inserts_and_deletes_match_model() {
    let mut tree = memory_tree(4, 5);
    let mut model = BTreeMap::new();

    for (round, key) in shuffled(2_000, 31).into_iter().enumerate() {
        let value = ObjectRef(round as u64);
        assert_eq!(tree.set(key % 700, value).unwrap(), model.insert(key % 700, value));
        if round % 3 == 0 {
            let victim = (key * 7) % 700;
            assert_eq!(tree.remove(&victim).unwrap(), model.remove(&victim));
        }
        if round % 250 == 0 {
            tree.check().unwrap();
        }
    }

    assert_eq!(tree.len(), model.len());
    assert_eq!(all_keys(&tree), model.keys().copied().collect::<Vec<_>>());
    for (key, value) in &model {
        assert_eq!(tree.get(key).unwrap(), Some(*value));
    }
    tree.check().unwrap();
}

#[test]
fn test_commit_and_release_every_hundred_operations() {
    let file = TestFile::new();
    let mut tree = file.create_tree(TreeConfig::new(5, 4).with_cache_limit(16));

    for (i, key) in shuffled(1_500, 8).into_iter().enumerate() {
        tree.insert(key, ObjectRef(u64::from(key)), false).unwrap();
        if i % 100 == 99 {
            tree.commit().unwrap();
            // The cache limit bounds clean nodes kept across commits.
            assert!(tree.stats().cached_nodes <= 16);
        }
    }
    tree.commit().unwrap();
    drop(tree);

    let tree = file.reopen();
    assert_eq!(tree.len(), 1_500);
    assert_eq!(all_keys(&tree), (0..1_500).collect::<Vec<_>>());
    tree.check().unwrap();
}
