//! Persistent B-tree controller.
//!
//! The tree owns the root reference and drives every structural change:
//! descent, bucket and internal splits, borrowing from and merging with
//! siblings, and root growth and collapse. Nodes are reached through a
//! [`NodeStore`], so the whole structure may live in an external object store
//! and be faulted in lazily.
//!
//! Mutations take `&mut self`. Reads take `&self` and fault nodes through a
//! `RefCell`, so a tree is single-threaded; share it behind a lock.

use std::cell::{RefCell, RefMut};
use std::ops::{Bound, RangeBounds};

use tracing::{debug, info};

use crate::btree::check::{self, CheckReport};
use crate::btree::cursor::Cursor;
use crate::btree::error::BTreeError;
use crate::btree::meta::TreeMeta;
use crate::btree::node::{Bucket, InsertOutcome, InternalNode, Node, NodeId};
use crate::config::{DuplicatePolicy, TreeConfig};
use crate::storage::io::{ObjectId, ObjectStore};
use crate::storage::node_store::{CacheStats, CommitStats, NodeStore};
use crate::types::{BTreeKey, BTreeValue};

/// Deeper than any valid tree can get; guards descent against link cycles.
pub(crate) const MAX_HEIGHT: usize = 64;

/// One step of a root-to-bucket descent: the internal node and the index of
/// the child that was followed.
#[derive(Debug, Clone, Copy)]
struct PathStep {
    node: NodeId,
    index: usize,
}

/// Snapshot of tree and cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub len: usize,
    pub cached_nodes: usize,
    pub dirty_nodes: usize,
    pub cache: CacheStats,
}

/// An ordered map from `K` to `V` persisted in an object store.
#[derive(Debug)]
pub struct BTree<K, V, S> {
    nodes: RefCell<NodeStore<K, V, S>>,
    config: TreeConfig,
    meta_id: ObjectId,
    root: Option<NodeId>,
    len: usize,
}

impl<K: BTreeKey, V: BTreeValue, S: ObjectStore> BTree<K, V, S> {
    /// Create an empty tree in `store` and persist its metadata record.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the capacities are invalid, `Storage` if the
    /// metadata record cannot be written.
    pub fn create(store: S, config: TreeConfig) -> Result<Self, BTreeError> {
        config.validate()?;
        let mut nodes = NodeStore::new(store, config.cache_limit);
        let meta_id = nodes.allocate()?;
        let mut tree = Self {
            nodes: RefCell::new(nodes),
            config,
            meta_id,
            root: None,
            len: 0,
        };
        tree.commit()?;
        info!(
            meta = meta_id,
            key = ?K::KIND,
            value = ?V::KIND,
            max_bucket_size = config.max_bucket_size,
            max_btree_size = config.max_btree_size,
            "created tree"
        );
        Ok(tree)
    }

    /// Open a tree previously created in `store` from its metadata id.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the record is missing and `Format` if it is
    /// corrupt or belongs to a tree of another key or value kind.
    pub fn open(mut store: S, meta_id: ObjectId) -> Result<Self, BTreeError> {
        let bytes = store.load(meta_id)?;
        let meta = TreeMeta::decode::<K, V>(&bytes)?;
        let config = meta.config(TreeConfig::DEFAULT_CACHE_LIMIT);
        config.validate()?;
        let len = usize::try_from(meta.len)
            .map_err(|_| BTreeError::Corrupted(format!("entry count {} too large", meta.len)))?;

        info!(meta = meta_id, root = ?meta.root, len, "opened tree");
        Ok(Self {
            nodes: RefCell::new(NodeStore::new(store, config.cache_limit)),
            config,
            meta_id,
            root: meta.root,
            len,
        })
    }

    /// Id of the metadata record; pass it to [`BTree::open`].
    #[must_use]
    pub const fn meta_id(&self) -> ObjectId {
        self.meta_id
    }

    #[must_use]
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Root node id, `None` for an empty tree.
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Mutable access to the object store, bypassing the node cache.
    pub fn store_mut(&mut self) -> &mut S {
        self.nodes.get_mut().store_mut()
    }

    /// Drop the node cache, including uncommitted changes, and return the
    /// object store.
    pub fn into_store(self) -> S {
        self.nodes.into_inner().into_store()
    }

    pub(crate) fn nodes(&self) -> RefMut<'_, NodeStore<K, V, S>> {
        self.nodes.borrow_mut()
    }

    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let nodes = self.nodes.borrow();
        TreeStats {
            len: self.len,
            cached_nodes: nodes.cached_count(),
            dirty_nodes: nodes.dirty_count(),
            cache: nodes.stats(),
        }
    }

    /// Number of levels: 0 when empty, 1 for a single bucket.
    pub fn height(&self) -> Result<usize, BTreeError> {
        let Some(root) = self.root else {
            return Ok(0);
        };
        let mut nodes = self.nodes();
        let mut current = root;
        let mut height = 1;
        while let Node::Internal(internal) = nodes.load(current)? {
            current = internal.children[0];
            height += 1;
            if height > MAX_HEIGHT {
                return Err(too_deep(root));
            }
        }
        Ok(height)
    }

    /// Look up a value by key.
    pub fn get(&self, key: &K) -> Result<Option<V>, BTreeError> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut guard = self.nodes();
        let nodes = &mut *guard;
        let (_, leaf) = descend(nodes, root, key)?;
        Ok(nodes.bucket(leaf)?.find(key).cloned())
    }

    pub fn contains_key(&self, key: &K) -> Result<bool, BTreeError> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert a key-value pair.
    ///
    /// Returns [`InsertOutcome::Inserted`] for a new key and
    /// [`InsertOutcome::Replaced`] with the old value when `overwrite` is
    /// set and the key was present.
    ///
    /// # Errors
    ///
    /// Returns `KeyExists` if the key is present and `overwrite` is false;
    /// the tree is left unchanged.
    ///
    /// A `Storage` or `Format` error while splitting can leave the entry
    /// counted and its bucket over capacity. The tree is only consistent
    /// again after `abort`.
    pub fn insert(
        &mut self,
        key: K,
        value: V,
        overwrite: bool,
    ) -> Result<InsertOutcome<V>, BTreeError> {
        let max_bucket_size = self.config.max_bucket_size;
        let nodes = self.nodes.get_mut();

        let Some(root) = self.root else {
            let mut bucket = Bucket::new();
            bucket.push_back(key, value);
            let id = nodes.insert_new(Node::Bucket(bucket))?;
            self.root = Some(id);
            self.len = 1;
            debug!(root = id, "created root bucket");
            return Ok(InsertOutcome::Inserted);
        };

        let (path, leaf) = descend(nodes, root, &key)?;
        if !overwrite && nodes.bucket(leaf)?.find(&key).is_some() {
            return Err(BTreeError::KeyExists);
        }
        match nodes
            .bucket_mut(leaf)?
            .insert(key, value, overwrite, max_bucket_size)
        {
            None => Err(BTreeError::KeyExists),
            Some(InsertOutcome::Inserted) => {
                self.len += 1;
                Ok(InsertOutcome::Inserted)
            }
            Some(InsertOutcome::Overflow) => {
                self.len += 1;
                self.split_bucket(path, leaf)?;
                Ok(InsertOutcome::Inserted)
            }
            Some(replaced) => Ok(replaced),
        }
    }

    /// Insert under the configured [`DuplicatePolicy`], returning the
    /// replaced value if any.
    pub fn set(&mut self, key: K, value: V) -> Result<Option<V>, BTreeError> {
        let overwrite = self.config.duplicate_policy == DuplicatePolicy::Replace;
        match self.insert(key, value, overwrite)? {
            InsertOutcome::Replaced(old) => Ok(Some(old)),
            InsertOutcome::Inserted | InsertOutcome::Overflow => Ok(None),
        }
    }

    /// Return the value for `key`, inserting `default` first if it is absent.
    pub fn setdefault(&mut self, key: K, default: V) -> Result<V, BTreeError> {
        if let Some(existing) = self.get(&key)? {
            return Ok(existing);
        }
        self.insert(key, default.clone(), false)?;
        Ok(default)
    }

    /// Set every pair yielded by `entries`. Returns how many were applied.
    pub fn update<I>(&mut self, entries: I) -> Result<usize, BTreeError>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut applied = 0;
        for (key, value) in entries {
            self.set(key, value)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Remove a key, returning its value.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent.
    pub fn delete(&mut self, key: &K) -> Result<V, BTreeError> {
        let min_bucket_len = self.config.min_bucket_len();
        let nodes = self.nodes.get_mut();
        let Some(root) = self.root else {
            return Err(BTreeError::KeyNotFound);
        };

        let (path, leaf) = descend(nodes, root, key)?;
        if nodes.bucket(leaf)?.find(key).is_none() {
            return Err(BTreeError::KeyNotFound);
        }
        let bucket = nodes.bucket_mut(leaf)?;
        let value = bucket.delete(key).ok_or(BTreeError::KeyNotFound)?;
        let remaining = bucket.len();
        self.len = self.len.saturating_sub(1);

        if path.is_empty() {
            if remaining == 0 {
                nodes.free(leaf);
                self.root = None;
                debug!(bucket = leaf, "removed last entry");
            }
        } else if remaining < min_bucket_len {
            self.rebalance(path)?;
        }
        Ok(value)
    }

    /// Remove a key if present.
    pub fn remove(&mut self, key: &K) -> Result<Option<V>, BTreeError> {
        match self.delete(key) {
            Ok(value) => Ok(Some(value)),
            Err(BTreeError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a key and return its value, or `default` when it is absent.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the key is absent and no default is given.
    pub fn pop(&mut self, key: &K, default: Option<V>) -> Result<V, BTreeError> {
        match self.remove(key)? {
            Some(value) => Ok(value),
            None => default.ok_or(BTreeError::KeyNotFound),
        }
    }

    /// Remove every entry. The freed nodes are deleted from the store at the
    /// next commit.
    pub fn clear(&mut self) -> Result<(), BTreeError> {
        let Some(root) = self.root else {
            return Ok(());
        };
        let nodes = self.nodes.get_mut();
        let mut pending = vec![root];
        let mut freed = 0usize;
        while let Some(id) = pending.pop() {
            if let Node::Internal(internal) = nodes.load(id)? {
                pending.extend_from_slice(&internal.children);
            }
            nodes.free(id);
            freed += 1;
        }
        self.root = None;
        self.len = 0;
        debug!(freed, "cleared tree");
        Ok(())
    }

    /// Smallest entry.
    pub fn min(&self) -> Result<Option<(K, V)>, BTreeError> {
        self.edge_entry(Edge::First)
    }

    /// Largest entry.
    pub fn max(&self) -> Result<Option<(K, V)>, BTreeError> {
        self.edge_entry(Edge::Last)
    }

    /// Smallest key `>= bound`, or the smallest key when `bound` is `None`.
    pub fn min_key(&self, bound: Option<K>) -> Result<Option<K>, BTreeError> {
        let Some(bound) = bound else {
            return Ok(self.min()?.map(|(k, _)| k));
        };
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut guard = self.nodes();
        let nodes = &mut *guard;
        let (_, leaf) = descend(nodes, root, &bound)?;
        let bucket = nodes.bucket(leaf)?;
        if let Some(key) = bucket.min_key(&bound) {
            return Ok(Some(key));
        }
        let next = bucket.next;
        match next {
            Some(id) => Ok(nodes.bucket(id)?.first_key()),
            None => Ok(None),
        }
    }

    /// Largest key `<= bound`, or the largest key when `bound` is `None`.
    pub fn max_key(&self, bound: Option<K>) -> Result<Option<K>, BTreeError> {
        let Some(bound) = bound else {
            return Ok(self.max()?.map(|(k, _)| k));
        };
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut guard = self.nodes();
        let nodes = &mut *guard;
        let (_, leaf) = descend(nodes, root, &bound)?;
        let bucket = nodes.bucket(leaf)?;
        if let Some(key) = bucket.max_key(&bound) {
            return Ok(Some(key));
        }
        let prev = bucket.prev;
        match prev {
            Some(id) => Ok(nodes.bucket(id)?.last_key()),
            None => Ok(None),
        }
    }

    /// Entries with `start <= key < end`, in key order.
    #[must_use]
    pub fn range(&self, start: K, end: K) -> Cursor<'_, K, V, S> {
        self.range_bounds(start..end)
    }

    /// Entries whose keys fall in `bounds`, in key order.
    #[must_use]
    pub fn range_bounds<R: RangeBounds<K>>(&self, bounds: R) -> Cursor<'_, K, V, S> {
        Cursor::new(self, bounds.start_bound().cloned(), bounds.end_bound().cloned())
    }

    /// All entries in key order.
    #[must_use]
    pub fn iter(&self) -> Cursor<'_, K, V, S> {
        self.range_bounds(..)
    }

    pub fn keys(&self) -> impl Iterator<Item = Result<K, BTreeError>> + '_ {
        self.iter().map(|entry| entry.map(|(k, _)| k))
    }

    pub fn values(&self) -> impl Iterator<Item = Result<V, BTreeError>> + '_ {
        self.iter().map(|entry| entry.map(|(_, v)| v))
    }

    /// Verify every structural invariant.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` describing the first violation found.
    pub fn check(&self) -> Result<CheckReport, BTreeError> {
        let mut guard = self.nodes();
        check::verify(&mut *guard, self.root, self.len, &self.config)
    }

    /// Persist every change since the last commit.
    pub fn commit(&mut self) -> Result<CommitStats, BTreeError> {
        let meta = self.meta().encode();
        let stats = self.nodes.get_mut().commit(self.meta_id, &meta)?;
        info!(
            meta = self.meta_id,
            len = self.len,
            nodes_written = stats.nodes_written,
            nodes_freed = stats.nodes_freed,
            bytes_written = stats.bytes_written,
            "committed tree"
        );
        Ok(stats)
    }

    /// Discard every change since the last commit and reload the committed
    /// root and entry count.
    pub fn abort(&mut self) -> Result<(), BTreeError> {
        let nodes = self.nodes.get_mut();
        nodes.abort()?;
        let bytes = nodes.store_mut().load(self.meta_id)?;
        let meta = TreeMeta::decode::<K, V>(&bytes)?;
        self.root = meta.root;
        self.len = usize::try_from(meta.len)
            .map_err(|_| BTreeError::Corrupted(format!("entry count {} too large", meta.len)))?;
        info!(meta = self.meta_id, len = self.len, "aborted changes");
        Ok(())
    }

    /// Drop clean nodes from the cache.
    pub fn release_clean(&mut self) -> usize {
        self.nodes.get_mut().release_clean()
    }

    fn meta(&self) -> TreeMeta {
        TreeMeta {
            root: self.root,
            len: self.len as u64,
            ..TreeMeta::new::<K, V>(&self.config)
        }
    }

    /// Position of the first entry at or after `start`: a bucket and an
    /// index into it. The index may be one past the end of the bucket.
    pub(crate) fn locate(&self, start: &Bound<K>) -> Result<Option<(NodeId, usize)>, BTreeError> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut guard = self.nodes();
        let nodes = &mut *guard;
        let position = match start {
            Bound::Unbounded => (edge_bucket(nodes, root, Edge::First)?, 0),
            Bound::Included(key) => {
                let (_, leaf) = descend(nodes, root, key)?;
                (leaf, nodes.bucket(leaf)?.lower_bound(key))
            }
            Bound::Excluded(key) => {
                let (_, leaf) = descend(nodes, root, key)?;
                (leaf, nodes.bucket(leaf)?.upper_bound(key))
            }
        };
        Ok(Some(position))
    }

    fn edge_entry(&self, edge: Edge) -> Result<Option<(K, V)>, BTreeError> {
        let Some(root) = self.root else {
            return Ok(None);
        };
        let mut guard = self.nodes();
        let nodes = &mut *guard;
        let leaf = edge_bucket(nodes, root, edge)?;
        let bucket = nodes.bucket(leaf)?;
        let index = match edge {
            Edge::First => 0,
            Edge::Last => bucket.len().saturating_sub(1),
        };
        Ok(bucket
            .keys
            .get(index)
            .map(|key| (*key, bucket.values[index].clone())))
    }

    /// Split an overflowing bucket and push the separator up.
    fn split_bucket(&mut self, path: Vec<PathStep>, leaf: NodeId) -> Result<(), BTreeError> {
        let nodes = self.nodes.get_mut();
        let right_id = nodes.allocate()?;
        let (right, separator) = nodes.bucket_mut(leaf)?.split(leaf, right_id);
        if let Some(next) = right.next {
            nodes.bucket_mut(next)?.prev = Some(right_id);
        }
        debug!(bucket = leaf, new = right_id, ?separator, "split bucket");
        nodes.save(right_id, Node::Bucket(right));
        self.insert_separator(path, leaf, separator, right_id)
    }

    /// Insert `separator` and its right child into the parent at the end of
    /// `path`, splitting internal nodes upward and growing a new root if the
    /// old one splits.
    fn insert_separator(
        &mut self,
        mut path: Vec<PathStep>,
        mut left: NodeId,
        mut separator: K,
        mut right: NodeId,
    ) -> Result<(), BTreeError> {
        let max_btree_size = self.config.max_btree_size;
        let nodes = self.nodes.get_mut();

        while let Some(step) = path.pop() {
            let parent = nodes.internal_mut(step.node)?;
            if !matches!(
                parent.insert_separator(separator, right, max_btree_size),
                InsertOutcome::Overflow
            ) {
                return Ok(());
            }
            let (new_node, median) = parent.split();
            let new_id = nodes.insert_new(Node::Internal(new_node))?;
            debug!(node = step.node, new = new_id, ?median, "split internal node");
            left = step.node;
            separator = median;
            right = new_id;
        }

        let root = nodes.insert_new(Node::Internal(InternalNode::with_children(
            left, separator, right,
        )))?;
        self.root = Some(root);
        debug!(root, left, right, "grew new root");
        Ok(())
    }

    /// Repair underflow bottom-up along `path`, whose last step leads to the
    /// underfull node.
    fn rebalance(&mut self, mut path: Vec<PathStep>) -> Result<(), BTreeError> {
        let min_bucket_len = self.config.min_bucket_len();
        let min_children = self.config.min_children();
        let nodes = self.nodes.get_mut();
        let mut child_is_bucket = true;

        while let Some(step) = path.pop() {
            if child_is_bucket {
                fix_bucket(nodes, step, min_bucket_len)?;
            } else {
                fix_internal(nodes, step, min_children)?;
            }

            let parent = nodes.internal(step.node)?;
            if path.is_empty() {
                if parent.len() == 1 {
                    let new_root = parent.children[0];
                    nodes.free(step.node);
                    self.root = Some(new_root);
                    debug!(old = step.node, root = new_root, "collapsed root");
                }
                return Ok(());
            }
            if !parent.is_underfull(min_children) {
                return Ok(());
            }
            child_is_bucket = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    First,
    Last,
}

/// Walk from `root` to the bucket that may hold `key`, recording the path.
fn descend<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    root: NodeId,
    key: &K,
) -> Result<(Vec<PathStep>, NodeId), BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let mut path = Vec::new();
    let mut current = root;
    while let Node::Internal(internal) = nodes.load(current)? {
        let index = internal.find_child_index(key);
        let child = internal.children[index];
        path.push(PathStep {
            node: current,
            index,
        });
        if path.len() >= MAX_HEIGHT {
            return Err(too_deep(root));
        }
        current = child;
    }
    Ok((path, current))
}

/// The leftmost or rightmost bucket under `root`.
fn edge_bucket<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    root: NodeId,
    edge: Edge,
) -> Result<NodeId, BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let mut current = root;
    let mut depth = 0;
    while let Node::Internal(internal) = nodes.load(current)? {
        current = match edge {
            Edge::First => internal.children[0],
            Edge::Last => internal.children[internal.children.len() - 1],
        };
        depth += 1;
        if depth >= MAX_HEIGHT {
            return Err(too_deep(root));
        }
    }
    Ok(current)
}

/// Siblings of the child at `step`, under the same parent.
fn siblings<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    step: PathStep,
) -> Result<(NodeId, Option<NodeId>, Option<NodeId>), BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let parent = nodes.internal(step.node)?;
    let child = *parent.children.get(step.index).ok_or_else(|| {
        BTreeError::Corrupted(format!("node {} has no child {}", step.node, step.index))
    })?;
    let left = step
        .index
        .checked_sub(1)
        .map(|i| parent.children[i]);
    let right = parent.children.get(step.index + 1).copied();
    Ok((child, left, right))
}

/// Refill the underfull bucket at `step` from a sibling, or merge it with one.
fn fix_bucket<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    step: PathStep,
    min_len: usize,
) -> Result<(), BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let (child, left, right) = siblings(nodes, step)?;
    let left_len = match left {
        Some(id) => nodes.bucket(id)?.len(),
        None => 0,
    };
    let right_len = match right {
        Some(id) => nodes.bucket(id)?.len(),
        None => 0,
    };

    if let (Some(left), true) = (left, left_len > min_len) {
        let (key, value) = nodes
            .bucket_mut(left)?
            .pop_last()
            .ok_or_else(|| empty_sibling(left))?;
        nodes.bucket_mut(child)?.push_front(key, value);
        nodes.internal_mut(step.node)?.keys[step.index - 1] = key;
        debug!(bucket = child, from = left, "borrowed from left bucket");
        return Ok(());
    }
    if let (Some(right), true) = (right, right_len > min_len) {
        let sibling = nodes.bucket_mut(right)?;
        let (key, value) = sibling.pop_first().ok_or_else(|| empty_sibling(right))?;
        let separator = sibling.first_key().ok_or_else(|| empty_sibling(right))?;
        nodes.bucket_mut(child)?.push_back(key, value);
        nodes.internal_mut(step.node)?.keys[step.index] = separator;
        debug!(bucket = child, from = right, "borrowed from right bucket");
        return Ok(());
    }

    let (into, from) = merge_pair(step, child, left, right)?;
    let absorbed = nodes.take_bucket(from)?;
    let next = absorbed.next;
    nodes.bucket_mut(into)?.merge(absorbed);
    if let Some(next) = next {
        nodes.bucket_mut(next)?.prev = Some(into);
    }
    nodes.free(from);
    remove_merged_child(nodes, step, from)?;
    debug!(into, from, "merged buckets");
    Ok(())
}

/// Refill the underfull internal node at `step` from a sibling, or merge it
/// with one.
fn fix_internal<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    step: PathStep,
    min_children: usize,
) -> Result<(), BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let (child, left, right) = siblings(nodes, step)?;
    let left_len = match left {
        Some(id) => nodes.internal(id)?.len(),
        None => 0,
    };
    let right_len = match right {
        Some(id) => nodes.internal(id)?.len(),
        None => 0,
    };

    if let (Some(left), true) = (left, left_len > min_children) {
        let (key, grandchild) = nodes
            .internal_mut(left)?
            .pop_last()
            .ok_or_else(|| empty_sibling(left))?;
        let parent = nodes.internal_mut(step.node)?;
        let separator = std::mem::replace(&mut parent.keys[step.index - 1], key);
        nodes.internal_mut(child)?.push_front(grandchild, separator);
        debug!(node = child, from = left, "borrowed from left node");
        return Ok(());
    }
    if let (Some(right), true) = (right, right_len > min_children) {
        let (grandchild, key) = nodes
            .internal_mut(right)?
            .pop_first()
            .ok_or_else(|| empty_sibling(right))?;
        let parent = nodes.internal_mut(step.node)?;
        let separator = std::mem::replace(&mut parent.keys[step.index], key);
        nodes.internal_mut(child)?.push_back(separator, grandchild);
        debug!(node = child, from = right, "borrowed from right node");
        return Ok(());
    }

    let (into, from) = merge_pair(step, child, left, right)?;
    let separator_index = if from == child {
        step.index - 1
    } else {
        step.index
    };
    let separator = nodes.internal(step.node)?.keys[separator_index];
    let absorbed = nodes.take_internal(from)?;
    nodes.internal_mut(into)?.merge(separator, absorbed);
    nodes.free(from);
    remove_merged_child(nodes, step, from)?;
    debug!(into, from, "merged internal nodes");
    Ok(())
}

/// Pick which node absorbs which: an underfull node merges into its left
/// sibling when it has one, else its right sibling merges into it.
fn merge_pair(
    step: PathStep,
    child: NodeId,
    left: Option<NodeId>,
    right: Option<NodeId>,
) -> Result<(NodeId, NodeId), BTreeError> {
    match (left, right) {
        (Some(left), _) => Ok((left, child)),
        (None, Some(right)) => Ok((child, right)),
        (None, None) => Err(BTreeError::Corrupted(format!(
            "node {child} under {} has no sibling",
            step.node
        ))),
    }
}

/// Drop the separator in front of the absorbed child `from`.
fn remove_merged_child<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    step: PathStep,
    from: NodeId,
) -> Result<(), BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let parent = nodes.internal_mut(step.node)?;
    let position = parent
        .children
        .iter()
        .position(|&id| id == from)
        .filter(|&i| i > 0)
        .ok_or_else(|| {
            BTreeError::Corrupted(format!("merged node {from} not under {}", step.node))
        })?;
    let separator = parent.keys[position - 1];
    match parent.delete_separator(&separator) {
        Some(removed) if removed == from => Ok(()),
        _ => Err(BTreeError::Corrupted(format!(
            "separator of node {from} not found in {}",
            step.node
        ))),
    }
}

fn empty_sibling(id: NodeId) -> BTreeError {
    BTreeError::Corrupted(format!("sibling {id} is empty"))
}

fn too_deep(root: NodeId) -> BTreeError {
    BTreeError::Corrupted(format!("tree under {root} deeper than {MAX_HEIGHT} levels"))
}
