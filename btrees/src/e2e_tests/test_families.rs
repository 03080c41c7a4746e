//! Test the concrete tree families over a real file.

use crate::btree::BTree;
use crate::e2e_tests::helpers::TestFile;
use crate::families::{IFBTree, LDBTree, QLBTree, UOBTree, family_config};
use crate::storage::{FileStore, MemoryStore, ObjectStore};
use crate::types::ObjectRef;

#[test]
fn test_uobtree_uses_default_capacities() {
    let tree: UOBTree<_> = BTree::create(MemoryStore::new(), family_config::<u32, ObjectRef>())
        .unwrap();
    assert_eq!(tree.config().max_bucket_size, 60);
    assert_eq!(tree.config().max_btree_size, 500);
}

#[test]
fn test_uobtree_with_default_capacities_holds_many_keys() {
    let mut tree: UOBTree<_> =
        BTree::create(MemoryStore::new(), family_config::<u32, ObjectRef>()).unwrap();
    for key in (0..10_000u32).rev() {
        tree.insert(key, ObjectRef(u64::from(key) + 1), false).unwrap();
    }

    assert_eq!(tree.len(), 10_000);
    assert_eq!(tree.height().unwrap(), 2);
    assert_eq!(tree.get(&12_345).unwrap(), Some(ObjectRef(12_346)));
    let report = tree.check().unwrap();
    assert_eq!(report.entries, 10_000);
}

#[test]
fn test_ldbtree_round_trips_through_file() {
    let file = TestFile::new();
    let meta_id = {
        let store = FileStore::create(&file.path()).unwrap();
        let mut tree: LDBTree<_> = BTree::create(store, family_config::<i64, f64>()).unwrap();
        for key in -50..50i64 {
            #[allow(clippy::cast_precision_loss)]
            let value = key as f64 / 4.0;
            tree.insert(key, value, false).unwrap();
        }
        tree.commit().unwrap();
        tree.meta_id()
    };

    let store = FileStore::open(&file.path()).unwrap();
    let tree: LDBTree<_> = BTree::open(store, meta_id).unwrap();
    assert_eq!(tree.len(), 100);
    assert_eq!(tree.min().unwrap(), Some((-50, -12.5)));
    assert_eq!(tree.max().unwrap(), Some((49, 12.25)));
    assert_eq!(tree.min_key(Some(-1)).unwrap(), Some(-1));
    assert_eq!(tree.max_key(Some(100)).unwrap(), Some(49));
}

#[test]
fn test_signed_keys_order_below_zero() {
    let mut tree: IFBTree<_> = BTree::create(MemoryStore::new(), family_config::<i32, f32>())
        .unwrap();
    for key in [3, -7, 0, i32::MIN, i32::MAX, -1] {
        tree.insert(key, 1.5, false).unwrap();
    }
    let keys: Vec<i32> = tree.keys().collect::<Result<_, _>>().unwrap();
    assert_eq!(keys, vec![i32::MIN, -7, -1, 0, 3, i32::MAX]);
}

#[test]
fn test_wide_unsigned_keys() {
    let store: Box<dyn ObjectStore> = Box::new(MemoryStore::new());
    let mut tree: QLBTree<_> = BTree::create(store, family_config::<u64, i64>()).unwrap();
    tree.insert(u64::MAX, -1, false).unwrap();
    tree.insert(0, 1, false).unwrap();
    tree.commit().unwrap();

    assert_eq!(tree.max().unwrap(), Some((u64::MAX, -1)));
    assert_eq!(tree.range_bounds(1..).count(), 1);
}
