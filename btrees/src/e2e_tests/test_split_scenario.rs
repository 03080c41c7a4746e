//! Test the first bucket split and a range scan across buckets.

use crate::e2e_tests::helpers::{all_keys, obj};
use crate::testing::memory_tree;

#[test]
fn test_fourth_insert_splits_root_bucket() {
    let mut tree = memory_tree(3, 3);

    for (i, key) in [50, 10, 30, 70, 20, 60, 40].into_iter().enumerate() {
        tree.insert(key, obj(key), false).unwrap();
        let expected_height = if i < 3 { 1 } else { 2 };
        assert_eq!(
            tree.height().unwrap(),
            expected_height,
            "height after inserting {key}"
        );
    }

    assert_eq!(tree.len(), 7);
    assert_eq!(all_keys(&tree), vec![10, 20, 30, 40, 50, 60, 70]);
    tree.check().unwrap();
}

#[test]
fn test_range_spans_buckets() {
    let mut tree = memory_tree(3, 3);
    for key in [50, 10, 30, 70, 20, 60, 40] {
        tree.insert(key, obj(key), false).unwrap();
    }

    let entries: Vec<(u32, _)> = tree.range(20, 60).collect::<Result<_, _>>().unwrap();
    assert_eq!(
        entries,
        vec![(20, obj(20)), (30, obj(30)), (40, obj(40)), (50, obj(50))]
    );
}

#[test]
fn test_range_bounds_between_keys() {
    let mut tree = memory_tree(3, 3);
    for key in [50, 10, 30, 70, 20, 60, 40] {
        tree.insert(key, obj(key), false).unwrap();
    }

    let keys: Vec<u32> = tree
        .range(15, 65)
        .map(|entry| entry.map(|(k, _)| k))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(keys, vec![20, 30, 40, 50, 60]);

    assert_eq!(tree.range(71, 100).count(), 0);
    assert_eq!(tree.range(40, 40).count(), 0);
    assert_eq!(tree.range(60, 20).count(), 0);
}

#[test]
fn test_cursor_restarts_independently() {
    let mut tree = memory_tree(3, 3);
    for key in [50, 10, 30, 70, 20, 60, 40] {
        tree.insert(key, obj(key), false).unwrap();
    }

    let mut first = tree.range(10, 80);
    let mut second = tree.range(10, 80);
    assert_eq!(first.next().unwrap().unwrap().0, 10);
    assert_eq!(first.next().unwrap().unwrap().0, 20);
    assert_eq!(second.next().unwrap().unwrap().0, 10);
    assert_eq!(first.count(), 5);
    assert_eq!(second.count(), 6);
}
