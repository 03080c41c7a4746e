//! Lazy range cursor over the bucket chain.
//!
//! A cursor locates its first bucket on the first call to `next`, then
//! copies one bucket's tail at a time and follows `next` links. It holds a
//! shared borrow of the tree, so the tree cannot be mutated while a cursor is
//! alive. To restart, ask the tree for a new range.

use std::ops::Bound;
use std::vec;

use crate::btree::error::BTreeError;
use crate::btree::node::NodeId;
use crate::btree::tree::BTree;
use crate::storage::io::ObjectStore;
use crate::types::{BTreeKey, BTreeValue};

/// Forward iterator over the entries of a key range.
///
/// Yields `Result` items; after the first error it yields nothing further.
#[must_use = "cursors are lazy and do nothing unless consumed"]
pub struct Cursor<'a, K, V, S> {
    tree: &'a BTree<K, V, S>,
    /// Lower bound, consumed when the cursor is first positioned.
    start: Option<Bound<K>>,
    end: Bound<K>,
    buffer: vec::IntoIter<(K, V)>,
    next_bucket: Option<NodeId>,
    done: bool,
}

impl<'a, K: BTreeKey, V: BTreeValue, S: ObjectStore> Cursor<'a, K, V, S> {
    pub(crate) fn new(tree: &'a BTree<K, V, S>, start: Bound<K>, end: Bound<K>) -> Self {
        Self {
            tree,
            start: Some(start),
            end,
            buffer: Vec::new().into_iter(),
            next_bucket: None,
            done: false,
        }
    }

    /// Advance to the next entry.
    pub fn next_entry(&mut self) -> Result<Option<(K, V)>, BTreeError> {
        if self.done {
            return Ok(None);
        }
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<(K, V)>, BTreeError> {
        loop {
            if let Some((key, value)) = self.buffer.next() {
                return Ok(self.before_end(&key).then_some((key, value)));
            }
            if let Some(start) = self.start.take() {
                match self.tree.locate(&start)? {
                    Some((bucket, index)) => self.fill(bucket, index)?,
                    None => return Ok(None),
                }
                continue;
            }
            match self.next_bucket {
                Some(bucket) => self.fill(bucket, 0)?,
                None => return Ok(None),
            }
        }
    }

    /// Buffer the entries of `bucket` from `index` on.
    fn fill(&mut self, bucket: NodeId, index: usize) -> Result<(), BTreeError> {
        let mut nodes = self.tree.nodes();
        let node = nodes.bucket(bucket)?;
        let entries: Vec<(K, V)> = node
            .entries()
            .skip(index)
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        self.next_bucket = node.next;
        self.buffer = entries.into_iter();
        Ok(())
    }

    fn before_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Included(end) => key <= end,
            Bound::Excluded(end) => key < end,
            Bound::Unbounded => true,
        }
    }
}

impl<K: BTreeKey, V: BTreeValue, S: ObjectStore> Iterator for Cursor<'_, K, V, S> {
    type Item = Result<(K, V), BTreeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl<K: BTreeKey, V: BTreeValue, S: ObjectStore> std::iter::FusedIterator for Cursor<'_, K, V, S> {}
