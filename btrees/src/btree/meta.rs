//! Tree metadata record.
//!
//! One object per tree, written at every commit. It names the key and value
//! kinds, the capacities, the duplicate policy, the root node and the entry
//! count, so a tree can be reopened from its metadata id alone.
//!
//! ```text
//! magic "BTMT" | version u8 | key_kind u8 | value_kind u8 | policy u8
//! | max_bucket_size u32 | max_btree_size u32 | root u64 | len u64 | crc32
//! ```

// capacities are validated to at most `TreeConfig::MAX_CAPACITY`
#![allow(clippy::cast_possible_truncation)]

use crate::btree::codec::{FormatError, Reader, Writer};
use crate::btree::node::NodeId;
use crate::config::{DuplicatePolicy, TreeConfig};
use crate::types::{BTreeKey, BTreeValue, KeyKind, ValueKind};

const MAGIC: &[u8; 4] = b"BTMT";
const FORMAT_VERSION: u8 = 1;
const ENCODED_SIZE: usize = 4 + 4 + 4 + 4 + 8 + 8;

/// Persistent description of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMeta {
    pub key_kind: KeyKind,
    pub value_kind: ValueKind,
    pub max_bucket_size: usize,
    pub max_btree_size: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub root: Option<NodeId>,
    pub len: u64,
}

impl TreeMeta {
    /// Metadata of an empty tree for the given instantiation.
    #[must_use]
    pub const fn new<K: BTreeKey, V: BTreeValue>(config: &TreeConfig) -> Self {
        Self {
            key_kind: K::KIND,
            value_kind: V::KIND,
            max_bucket_size: config.max_bucket_size,
            max_btree_size: config.max_btree_size,
            duplicate_policy: config.duplicate_policy,
            root: None,
            len: 0,
        }
    }

    /// Rebuild a config from the persisted capacities.
    #[must_use]
    pub const fn config(&self, cache_limit: usize) -> TreeConfig {
        TreeConfig {
            max_bucket_size: self.max_bucket_size,
            max_btree_size: self.max_btree_size,
            duplicate_policy: self.duplicate_policy,
            cache_limit,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(ENCODED_SIZE);
        w.put_bytes(MAGIC);
        w.put_u8(FORMAT_VERSION);
        w.put_u8(self.key_kind as u8);
        w.put_u8(self.value_kind as u8);
        w.put_u8(self.duplicate_policy as u8);
        w.put_u32(self.max_bucket_size as u32);
        w.put_u32(self.max_btree_size as u32);
        w.put_u64(self.root.unwrap_or(0));
        w.put_u64(self.len);
        w.finish()
    }

    /// Decode a metadata record and check it belongs to a `K`/`V` tree.
    pub fn decode<K: BTreeKey, V: BTreeValue>(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::verified(bytes)?;
        if r.take(MAGIC.len())? != MAGIC {
            return Err(FormatError::BadMagic);
        }
        let version = r.get_u8()?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let key_kind = r.get_u8()?;
        if key_kind != K::KIND as u8 {
            return Err(FormatError::KeyKindMismatch {
                expected: K::KIND,
                found: key_kind,
            });
        }
        let value_kind = r.get_u8()?;
        if value_kind != V::KIND as u8 {
            return Err(FormatError::ValueKindMismatch {
                expected: V::KIND,
                found: value_kind,
            });
        }
        let duplicate_policy = DuplicatePolicy::try_from(r.get_u8()?)
            .map_err(|_| FormatError::InvalidField("duplicate_policy"))?;
        let max_bucket_size = r.get_u32()? as usize;
        let max_btree_size = r.get_u32()? as usize;
        let root = match r.get_u64()? {
            0 => None,
            id => Some(id),
        };
        let len = r.get_u64()?;
        r.finish()?;

        Ok(Self {
            key_kind: K::KIND,
            value_kind: V::KIND,
            max_bucket_size,
            max_btree_size,
            duplicate_policy,
            root,
            len,
        })
    }
}
