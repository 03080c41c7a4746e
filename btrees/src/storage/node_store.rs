//! Node arena with lazy faulting and dirty tracking.
//!
//! Nodes live in a cache keyed by [`NodeId`]. A node missing from the cache
//! is faulted in from the object store on first access. Every mutable access
//! marks the node dirty; `commit` writes dirty nodes back, removes freed ones,
//! stores the tree metadata and syncs the store.
//!
//! # Invariants
//!
//! - Every dirty id is present in the cache
//! - A freed id is never in the cache or the dirty set
//! - A freed id cannot be loaded again until it is committed away
//! - Only clean nodes are ever evicted

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace, warn};

use crate::btree::error::BTreeError;
use crate::btree::node::{Bucket, InternalNode, Node, NodeId};
use crate::storage::io::{ObjectId, ObjectStore};
use crate::types::{BTreeKey, BTreeValue};

/// Cache counters since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Nodes loaded from the object store.
    pub faults: u64,
    /// Accesses served from the cache.
    pub hits: u64,
    /// Clean nodes dropped from the cache.
    pub evictions: u64,
}

/// Work done by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub nodes_written: usize,
    pub nodes_freed: usize,
    pub bytes_written: usize,
}

/// Cache of decoded nodes over an [`ObjectStore`].
#[derive(Debug)]
pub struct NodeStore<K, V, S> {
    store: S,
    cache: HashMap<NodeId, Node<K, V>>,
    /// Ordered so commits write nodes in a deterministic order.
    dirty: BTreeSet<NodeId>,
    freed: BTreeSet<NodeId>,
    cache_limit: usize,
    stats: CacheStats,
}

impl<K: BTreeKey, V: BTreeValue, S: ObjectStore> NodeStore<K, V, S> {
    /// Create a node store over `store`, keeping at most `cache_limit`
    /// nodes cached after a commit.
    pub fn new(store: S, cache_limit: usize) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            dirty: BTreeSet::new(),
            freed: BTreeSet::new(),
            cache_limit,
            stats: CacheStats::default(),
        }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Drop the cache and return the object store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Allocate a fresh node id.
    pub fn allocate(&mut self) -> Result<NodeId, BTreeError> {
        Ok(self.store.new_id()?)
    }

    /// Allocate an id for `node` and cache it as dirty.
    pub fn insert_new(&mut self, node: Node<K, V>) -> Result<NodeId, BTreeError> {
        let id = self.allocate()?;
        self.save(id, node);
        Ok(id)
    }

    /// Cache `node` under `id` and mark it dirty.
    pub fn save(&mut self, id: NodeId, node: Node<K, V>) {
        self.freed.remove(&id);
        self.cache.insert(id, node);
        self.dirty.insert(id);
    }

    /// Drop a node. Its object is removed from the store at commit.
    pub fn free(&mut self, id: NodeId) {
        self.cache.remove(&id);
        self.dirty.remove(&id);
        self.freed.insert(id);
    }

    /// Get a cached node, faulting it in from the store if needed.
    fn fault(&mut self, id: NodeId) -> Result<&mut Node<K, V>, BTreeError> {
        if self.freed.contains(&id) {
            return Err(BTreeError::Corrupted(format!("node {id} used after free")));
        }
        match self.cache.entry(id) {
            Entry::Occupied(entry) => {
                self.stats.hits += 1;
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => {
                let bytes = self.store.load(id)?;
                let node = Node::decode(&bytes).inspect_err(|e| {
                    warn!(node = id, error = %e, "failed to decode node");
                })?;
                self.stats.faults += 1;
                trace!(node = id, bytes = bytes.len(), "faulted node");
                Ok(entry.insert(node))
            }
        }
    }

    /// Load a node for reading.
    pub fn load(&mut self, id: NodeId) -> Result<&Node<K, V>, BTreeError> {
        self.fault(id).map(|node| &*node)
    }

    /// Load a node for writing and mark it dirty.
    pub fn load_mut(&mut self, id: NodeId) -> Result<&mut Node<K, V>, BTreeError> {
        self.fault(id)?;
        self.dirty.insert(id);
        self.cache
            .get_mut(&id)
            .ok_or_else(|| BTreeError::Corrupted(format!("node {id} vanished from cache")))
    }

    /// Remove a node from the cache and hand it to the caller, who must
    /// either `save` or `free` it.
    pub fn take(&mut self, id: NodeId) -> Result<Node<K, V>, BTreeError> {
        self.fault(id)?;
        self.dirty.remove(&id);
        self.cache
            .remove(&id)
            .ok_or_else(|| BTreeError::Corrupted(format!("node {id} vanished from cache")))
    }

    pub fn bucket(&mut self, id: NodeId) -> Result<&Bucket<K, V>, BTreeError> {
        match self.load(id)? {
            Node::Bucket(bucket) => Ok(bucket),
            Node::Internal(_) => Err(not_a(id, "bucket")),
        }
    }

    pub fn bucket_mut(&mut self, id: NodeId) -> Result<&mut Bucket<K, V>, BTreeError> {
        match self.load_mut(id)? {
            Node::Bucket(bucket) => Ok(bucket),
            Node::Internal(_) => Err(not_a(id, "bucket")),
        }
    }

    pub fn internal(&mut self, id: NodeId) -> Result<&InternalNode<K>, BTreeError> {
        match self.load(id)? {
            Node::Internal(internal) => Ok(internal),
            Node::Bucket(_) => Err(not_a(id, "internal node")),
        }
    }

    pub fn internal_mut(&mut self, id: NodeId) -> Result<&mut InternalNode<K>, BTreeError> {
        match self.load_mut(id)? {
            Node::Internal(internal) => Ok(internal),
            Node::Bucket(_) => Err(not_a(id, "internal node")),
        }
    }

    pub fn take_bucket(&mut self, id: NodeId) -> Result<Bucket<K, V>, BTreeError> {
        match self.take(id)? {
            Node::Bucket(bucket) => Ok(bucket),
            Node::Internal(_) => Err(not_a(id, "bucket")),
        }
    }

    pub fn take_internal(&mut self, id: NodeId) -> Result<InternalNode<K>, BTreeError> {
        match self.take(id)? {
            Node::Internal(internal) => Ok(internal),
            Node::Bucket(_) => Err(not_a(id, "internal node")),
        }
    }

    /// Persist all dirty nodes, remove freed ones, store the metadata record
    /// and sync.
    ///
    /// On error nothing is forgotten: the dirty and freed sets are kept so the
    /// caller can retry or `abort`.
    pub fn commit(&mut self, meta_id: ObjectId, meta: &[u8]) -> Result<CommitStats, BTreeError> {
        let mut stats = CommitStats::default();

        for &id in &self.dirty {
            let node = self
                .cache
                .get(&id)
                .ok_or_else(|| BTreeError::Corrupted(format!("dirty node {id} not cached")))?;
            let bytes = node.encode();
            self.store.store(id, &bytes)?;
            stats.nodes_written += 1;
            stats.bytes_written += bytes.len();
        }
        for &id in &self.freed {
            self.store.remove(id)?;
            stats.nodes_freed += 1;
        }
        self.store.store(meta_id, meta)?;
        stats.bytes_written += meta.len();
        self.store.sync()?;

        self.dirty.clear();
        self.freed.clear();
        if self.cache.len() > self.cache_limit {
            self.release_clean();
        }
        Ok(stats)
    }

    /// Drop every uncommitted change, including writes a failed commit
    /// already handed to the store. Clean nodes stay cached.
    ///
    /// If the store cannot roll back, nothing is dropped and the abort can
    /// be retried.
    pub fn abort(&mut self) -> Result<(), BTreeError> {
        self.store.rollback()?;
        let dirty = std::mem::take(&mut self.dirty);
        self.cache.retain(|id, _| !dirty.contains(id));
        self.freed.clear();
        debug!(discarded = dirty.len(), "aborted node changes");
        Ok(())
    }

    /// Evict every clean node from the cache. Returns how many were dropped.
    pub fn release_clean(&mut self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|id, _| self.dirty.contains(id));
        let evicted = before - self.cache.len();
        self.stats.evictions += evicted as u64;
        debug!(evicted, remaining = self.cache.len(), "released clean nodes");
        evicted
    }

    /// Drop the whole cache without touching the store.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.dirty.clear();
        self.freed.clear();
    }

    #[must_use]
    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.dirty.contains(&id)
    }

    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub const fn stats(&self) -> CacheStats {
        self.stats
    }
}

fn not_a(id: NodeId, kind: &str) -> BTreeError {
    BTreeError::Corrupted(format!("node {id} is not a {kind}"))
}
