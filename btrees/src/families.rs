//! Named tree families.
//!
//! A family fixes a key kind and a value kind. Its name is the key prefix
//! letter followed by the value prefix letter (`UO` for unsigned keys and
//! object values), and its default capacities depend on the value kind:
//! buckets of object references hold half as many entries as buckets of
//! plain numbers.

use crate::btree::BTree;
use crate::config::TreeConfig;
use crate::types::{BTreeKey, BTreeValue, ObjectRef, ValueKind};

/// Max children per internal node for every family.
pub const DEFAULT_MAX_BTREE_SIZE: usize = 500;

/// Default bucket capacity for a value kind.
#[must_use]
pub const fn default_max_bucket_size(value: ValueKind) -> usize {
    match value {
        ValueKind::Object => 60,
        ValueKind::I32 | ValueKind::I64 | ValueKind::F32 | ValueKind::F64 => 120,
    }
}

/// Default configuration of the `K`/`V` family.
#[must_use]
pub fn family_config<K: BTreeKey, V: BTreeValue>() -> TreeConfig {
    TreeConfig::new(default_max_bucket_size(V::KIND), DEFAULT_MAX_BTREE_SIZE)
}

/// Two-letter family prefix, e.g. `"UO"`.
#[must_use]
pub fn family_prefix<K: BTreeKey, V: BTreeValue>() -> String {
    [K::KIND.prefix_code(), V::KIND.prefix_code()].iter().collect()
}

/// Unsigned 32-bit keys, object values.
pub type UOBTree<S> = BTree<u32, ObjectRef, S>;
/// Unsigned 32-bit keys, 32-bit integer values.
pub type UIBTree<S> = BTree<u32, i32, S>;
/// Unsigned 32-bit keys, float values.
pub type UFBTree<S> = BTree<u32, f32, S>;
/// Unsigned 64-bit keys, object values.
pub type QOBTree<S> = BTree<u64, ObjectRef, S>;
/// Unsigned 64-bit keys, 64-bit integer values.
pub type QLBTree<S> = BTree<u64, i64, S>;
/// Signed 32-bit keys, object values.
pub type IOBTree<S> = BTree<i32, ObjectRef, S>;
/// Signed 32-bit keys, 32-bit integer values.
pub type IIBTree<S> = BTree<i32, i32, S>;
/// Signed 32-bit keys, float values.
pub type IFBTree<S> = BTree<i32, f32, S>;
/// Signed 64-bit keys, object values.
pub type LOBTree<S> = BTree<i64, ObjectRef, S>;
/// Signed 64-bit keys, 64-bit integer values.
pub type LLBTree<S> = BTree<i64, i64, S>;
/// Signed 64-bit keys, double values.
pub type LDBTree<S> = BTree<i64, f64, S>;
