//! B-tree node types and serialization.
//!
//! The tree is made of two node kinds:
//! - Internal nodes: separator keys and child node ids
//! - Buckets: sorted key/value pairs, doubly linked for range scans
//!
//! Nodes never hold references to each other. Children and sibling links are
//! [`NodeId`]s resolved through the node store.

#![allow(clippy::cast_possible_truncation)]

use crate::btree::codec::{FormatError, Reader, Writer};
use crate::storage::io::ObjectId;
use crate::types::{BTreeKey, BTreeValue};

/// Identifier of a node in the backing object store.
pub type NodeId = ObjectId;

/// Node type discriminant, the first byte of every serialized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Bucket = 0x01,
    Internal = 0x02,
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Bucket),
            0x02 => Ok(Self::Internal),
            _ => Err(value),
        }
    }
}

/// Result of inserting into a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<V> {
    /// A new entry was added.
    Inserted,
    /// An existing entry was overwritten; carries the old value.
    Replaced(V),
    /// A new entry was added and the node is now over capacity.
    /// The caller must split it.
    Overflow,
}

fn encode_link(link: Option<NodeId>) -> u64 {
    link.unwrap_or(0)
}

fn decode_link(raw: u64) -> Option<NodeId> {
    (raw != 0).then_some(raw)
}

fn ensure_sorted<K: Ord>(keys: &[K]) -> Result<(), FormatError> {
    if keys.windows(2).all(|w| w[0] < w[1]) {
        Ok(())
    } else {
        Err(FormatError::UnsortedKeys)
    }
}

/// Fail early on a count that cannot fit in the remaining input.
fn ensure_available(reader: &Reader<'_>, count: usize, width: usize) -> Result<(), FormatError> {
    let needed = count.saturating_mul(width);
    if needed > reader.remaining() {
        return Err(FormatError::Truncated {
            needed,
            available: reader.remaining(),
        });
    }
    Ok(())
}

/// A leaf node.
///
/// `keys` and `values` are parallel arrays sorted by key. `prev` and `next`
/// link the bucket into the global sorted chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<K, V> {
    pub keys: Vec<K>,
    pub values: Vec<V>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
}

impl<K: BTreeKey, V: BTreeValue> Default for Bucket<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: BTreeKey, V: BTreeValue> Bucket<K, V> {
    /// Create an empty, unlinked bucket.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            prev: None,
            next: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether the bucket holds fewer than `min` entries.
    #[must_use]
    pub fn is_underfull(&self, min: usize) -> bool {
        self.keys.len() < min
    }

    /// Find the index where a key is (Ok) or would be inserted (Err).
    pub fn find_index(&self, key: &K) -> Result<usize, usize> {
        self.keys.binary_search(key)
    }

    /// Get a value by key.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<&V> {
        self.find_index(key).ok().map(|i| &self.values[i])
    }

    /// Index of the first key `>= key`.
    #[must_use]
    pub fn lower_bound(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k < key)
    }

    /// Index of the first key `> key`.
    #[must_use]
    pub fn upper_bound(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Smallest key `>= bound` in this bucket.
    #[must_use]
    pub fn min_key(&self, bound: &K) -> Option<K> {
        self.keys.get(self.lower_bound(bound)).copied()
    }

    /// Largest key `<= bound` in this bucket.
    #[must_use]
    pub fn max_key(&self, bound: &K) -> Option<K> {
        self.upper_bound(bound)
            .checked_sub(1)
            .map(|i| self.keys[i])
    }

    #[must_use]
    pub fn first_key(&self) -> Option<K> {
        self.keys.first().copied()
    }

    #[must_use]
    pub fn last_key(&self) -> Option<K> {
        self.keys.last().copied()
    }

    /// Insert or update an entry.
    ///
    /// With `overwrite` false an existing key is left untouched and `None`
    /// is returned. A new entry that takes the bucket past `max_len`
    /// reports [`InsertOutcome::Overflow`].
    pub fn insert(
        &mut self,
        key: K,
        value: V,
        overwrite: bool,
        max_len: usize,
    ) -> Option<InsertOutcome<V>> {
        match self.find_index(&key) {
            Ok(_) if !overwrite => None,
            Ok(i) => Some(InsertOutcome::Replaced(std::mem::replace(
                &mut self.values[i],
                value,
            ))),
            Err(i) => {
                self.keys.insert(i, key);
                self.values.insert(i, value);
                if self.keys.len() > max_len {
                    Some(InsertOutcome::Overflow)
                } else {
                    Some(InsertOutcome::Inserted)
                }
            }
        }
    }

    /// Remove an entry by key, returning its value.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let i = self.find_index(key).ok()?;
        self.keys.remove(i);
        Some(self.values.remove(i))
    }

    /// Split at the midpoint.
    ///
    /// Returns the new right bucket and its first key as the separator. The
    /// right bucket is linked between `self` and the old next bucket; the
    /// caller must point the old next bucket's `prev` at `new_id`.
    #[must_use]
    pub fn split(&mut self, self_id: NodeId, new_id: NodeId) -> (Self, K) {
        let mid = self.keys.len() / 2;
        let right = Self {
            keys: self.keys.split_off(mid),
            values: self.values.split_off(mid),
            prev: Some(self_id),
            next: self.next,
        };
        self.next = Some(new_id);
        let separator = right.keys[0];
        (right, separator)
    }

    /// Append the entries of the right neighbor and take over its `next`
    /// link. The caller relinks the chain and frees the neighbor.
    pub fn merge(&mut self, right: Self) {
        self.keys.extend(right.keys);
        self.values.extend(right.values);
        self.next = right.next;
    }

    pub fn pop_first(&mut self) -> Option<(K, V)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.values.remove(0)))
    }

    pub fn pop_last(&mut self) -> Option<(K, V)> {
        Some((self.keys.pop()?, self.values.pop()?))
    }

    pub fn push_front(&mut self, key: K, value: V) {
        self.keys.insert(0, key);
        self.values.insert(0, value);
    }

    pub fn push_back(&mut self, key: K, value: V) {
        self.keys.push(key);
        self.values.push(value);
    }

    /// Iterate over the entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.keys.iter().zip(&self.values)
    }

    /// Serialize the bucket.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(24 + self.keys.len() * (K::WIDTH + V::WIDTH));
        w.put_u8(NodeType::Bucket as u8);
        w.put_u8(K::KIND as u8);
        w.put_u8(V::KIND as u8);
        w.put_u8(0);
        w.put_u32(self.keys.len() as u32);
        w.put_u64(encode_link(self.prev));
        w.put_u64(encode_link(self.next));
        for key in &self.keys {
            w.put_key(key);
        }
        for value in &self.values {
            w.put_value(value);
        }
        w.finish()
    }

    /// Deserialize a bucket.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::verified(bytes)?;
        let tag = r.get_u8()?;
        if tag != NodeType::Bucket as u8 {
            return Err(FormatError::UnknownNodeType(tag));
        }
        Self::decode_body(r)
    }

    fn decode_body(mut r: Reader<'_>) -> Result<Self, FormatError> {
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
        if r.get_u8()? != 0 {
            return Err(FormatError::InvalidField("reserved"));
        }
        let count = r.get_u32()? as usize;
        let prev = decode_link(r.get_u64()?);
        let next = decode_link(r.get_u64()?);

        ensure_available(&r, count, K::WIDTH + V::WIDTH)?;
        let keys = (0..count)
            .map(|_| r.get_key::<K>())
            .collect::<Result<Vec<_>, _>>()?;
        ensure_sorted(&keys)?;
        let values = (0..count)
            .map(|_| r.get_value::<V>())
            .collect::<Result<Vec<_>, _>>()?;
        r.finish()?;

        Ok(Self {
            keys,
            values,
            prev,
            next,
        })
    }
}

/// An internal (non-leaf) node.
///
/// Stores N-1 separator keys and N child ids.
/// `children[i]` holds keys `< keys[i]`,
/// `children[i+1]` holds keys `>= keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode<K> {
    pub keys: Vec<K>,
    pub children: Vec<NodeId>,
}

impl<K: BTreeKey> InternalNode<K> {
    /// Create a node with two children, as produced by a root split.
    #[must_use]
    pub fn with_children(left: NodeId, separator: K, right: NodeId) -> Self {
        Self {
            keys: vec![separator],
            children: vec![left, right],
        }
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the node has fewer than `min` children.
    #[must_use]
    pub fn is_underfull(&self, min: usize) -> bool {
        self.children.len() < min
    }

    /// Index of the child whose subtree may contain `key`: the child right
    /// of the last separator `<= key`.
    #[must_use]
    pub fn find_child_index(&self, key: &K) -> usize {
        match self.keys.binary_search(key) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    #[must_use]
    pub fn find_child(&self, key: &K) -> NodeId {
        self.children[self.find_child_index(key)]
    }

    /// Insert a separator with the child to its right.
    ///
    /// Reports [`InsertOutcome::Overflow`] when the node now has more than
    /// `max_children` children.
    pub fn insert_separator(
        &mut self,
        separator: K,
        right_child: NodeId,
        max_children: usize,
    ) -> InsertOutcome<()> {
        let idx = self.find_child_index(&separator);
        self.keys.insert(idx, separator);
        self.children.insert(idx + 1, right_child);
        if self.children.len() > max_children {
            InsertOutcome::Overflow
        } else {
            InsertOutcome::Inserted
        }
    }

    /// Split the node, returning the new right node and the promoted median
    /// key. The median is removed from both halves.
    #[must_use]
    pub fn split(&mut self) -> (Self, K) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let median = self.keys[mid];
        self.keys.truncate(mid);

        (
            Self {
                keys: right_keys,
                children: right_children,
            },
            median,
        )
    }

    /// Remove a separator and the child to its right, returning that child.
    pub fn delete_separator(&mut self, separator: &K) -> Option<NodeId> {
        let i = self.keys.binary_search(separator).ok()?;
        self.keys.remove(i);
        Some(self.children.remove(i + 1))
    }

    /// Append the right sibling, pulling the parent's separator down between
    /// the two halves.
    pub fn merge(&mut self, separator: K, right: Self) {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children);
    }

    /// Remove the first child and the separator after it.
    pub fn pop_first(&mut self) -> Option<(NodeId, K)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.children.remove(0), self.keys.remove(0)))
    }

    /// Remove the last separator and the child after it.
    pub fn pop_last(&mut self) -> Option<(K, NodeId)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.pop()?, self.children.pop()?))
    }

    pub fn push_front(&mut self, child: NodeId, separator: K) {
        self.children.insert(0, child);
        self.keys.insert(0, separator);
    }

    pub fn push_back(&mut self, separator: K, child: NodeId) {
        self.keys.push(separator);
        self.children.push(child);
    }

    /// Serialize the node.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(8 + self.children.len() * (8 + K::WIDTH));
        w.put_u8(NodeType::Internal as u8);
        w.put_u8(K::KIND as u8);
        w.put_u8(0);
        w.put_u8(0);
        w.put_u32(self.children.len() as u32);
        for child in &self.children {
            w.put_u64(*child);
        }
        for key in &self.keys {
            w.put_key(key);
        }
        w.finish()
    }

    /// Deserialize an internal node.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::verified(bytes)?;
        let tag = r.get_u8()?;
        if tag != NodeType::Internal as u8 {
            return Err(FormatError::UnknownNodeType(tag));
        }
        Self::decode_body(r)
    }

    fn decode_body(mut r: Reader<'_>) -> Result<Self, FormatError> {
        let key_kind = r.get_u8()?;
        if key_kind != K::KIND as u8 {
            return Err(FormatError::KeyKindMismatch {
                expected: K::KIND,
                found: key_kind,
            });
        }
        if r.get_u8()? != 0 || r.get_u8()? != 0 {
            return Err(FormatError::InvalidField("reserved"));
        }
        let child_count = r.get_u32()? as usize;
        if child_count == 0 {
            return Err(FormatError::EmptyInternalNode);
        }

        ensure_available(&r, child_count, 8)?;
        let children = (0..child_count)
            .map(|_| r.get_u64())
            .collect::<Result<Vec<_>, _>>()?;
        if children.contains(&0) {
            return Err(FormatError::InvalidField("child"));
        }
        ensure_available(&r, child_count - 1, K::WIDTH)?;
        let keys = (0..child_count - 1)
            .map(|_| r.get_key::<K>())
            .collect::<Result<Vec<_>, _>>()?;
        ensure_sorted(&keys)?;
        r.finish()?;

        Ok(Self { keys, children })
    }
}

/// Either kind of node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<K, V> {
    Bucket(Bucket<K, V>),
    Internal(InternalNode<K>),
}

impl<K: BTreeKey, V: BTreeValue> Node<K, V> {
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Bucket(_) => NodeType::Bucket,
            Self::Internal(_) => NodeType::Internal,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Bucket(bucket) => bucket.encode(),
            Self::Internal(internal) => internal.encode(),
        }
    }

    /// Deserialize a node of either kind, dispatching on the type tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::verified(bytes)?;
        let tag = r.get_u8()?;
        match NodeType::try_from(tag) {
            Ok(NodeType::Bucket) => Bucket::decode_body(r).map(Self::Bucket),
            Ok(NodeType::Internal) => InternalNode::decode_body(r).map(Self::Internal),
            Err(tag) => Err(FormatError::UnknownNodeType(tag)),
        }
    }
}
