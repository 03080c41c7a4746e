//! Structural invariant verification.
//!
//! Walks the whole tree and checks:
//! - keys strictly increase within every node
//! - every key lies within the bounds set by the separators above it
//! - internal nodes hold one key fewer than children
//! - occupancy is within capacity (non-root nodes also at least half full)
//! - every bucket sits at the same depth
//! - the bucket chain visits the buckets left to right with matching
//!   `prev`/`next` links and open ends
//! - the entry count matches the stored length
//!
//! A node reached twice or a path deeper than [`MAX_HEIGHT`] is reported as
//! corruption instead of being followed.

use std::collections::HashSet;

use crate::btree::error::BTreeError;
use crate::btree::node::{Node, NodeId};
use crate::btree::tree::MAX_HEIGHT;
use crate::config::TreeConfig;
use crate::storage::io::ObjectStore;
use crate::storage::node_store::NodeStore;
use crate::types::{BTreeKey, BTreeValue};

/// Shape of a verified tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub height: usize,
    pub buckets: usize,
    pub internal_nodes: usize,
    pub entries: usize,
}

struct Walk<'a> {
    config: &'a TreeConfig,
    /// Buckets in left-to-right order with their links.
    chain: Vec<(NodeId, Option<NodeId>, Option<NodeId>)>,
    bucket_depth: Option<usize>,
    seen: HashSet<NodeId>,
    report: CheckReport,
}

fn violation(msg: String) -> BTreeError {
    BTreeError::Corrupted(msg)
}

/// Verify the tree rooted at `root` holding `len` entries.
pub fn verify<K, V, S>(
    nodes: &mut NodeStore<K, V, S>,
    root: Option<NodeId>,
    len: usize,
    config: &TreeConfig,
) -> Result<CheckReport, BTreeError>
where
    K: BTreeKey,
    V: BTreeValue,
    S: ObjectStore,
{
    let Some(root) = root else {
        if len != 0 {
            return Err(violation(format!("empty tree claims {len} entries")));
        }
        return Ok(CheckReport::default());
    };

    let mut walk = Walk {
        config,
        chain: Vec::new(),
        bucket_depth: None,
        seen: HashSet::new(),
        report: CheckReport::default(),
    };
    walk.visit(nodes, root, 1, None, None)?;
    walk.check_chain()?;

    if walk.report.entries != len {
        return Err(violation(format!(
            "tree holds {} entries but records {len}",
            walk.report.entries
        )));
    }
    walk.report.height = walk.bucket_depth.unwrap_or(0);
    Ok(walk.report)
}

impl Walk<'_> {
    fn visit<K, V, S>(
        &mut self,
        nodes: &mut NodeStore<K, V, S>,
        id: NodeId,
        depth: usize,
        low: Option<K>,
        high: Option<K>,
    ) -> Result<(), BTreeError>
    where
        K: BTreeKey,
        V: BTreeValue,
        S: ObjectStore,
    {
        if depth > MAX_HEIGHT {
            return Err(violation(format!(
                "node {id} is deeper than {MAX_HEIGHT} levels"
            )));
        }
        if !self.seen.insert(id) {
            return Err(violation(format!("node {id} is reached twice")));
        }
        let is_root = depth == 1;
        match nodes.load(id)? {
            Node::Bucket(bucket) => {
                check_keys(id, &bucket.keys, low, high)?;
                if bucket.keys.len() != bucket.values.len() {
                    return Err(violation(format!("bucket {id} has mismatched values")));
                }
                let min = if is_root { 1 } else { self.config.min_bucket_len() };
                check_occupancy(id, "bucket", bucket.len(), min, self.config.max_bucket_size)?;

                match self.bucket_depth {
                    None => self.bucket_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(violation(format!(
                            "bucket {id} at depth {depth}, expected {expected}"
                        )));
                    }
                    Some(_) => {}
                }
                self.chain.push((id, bucket.prev, bucket.next));
                self.report.buckets += 1;
                self.report.entries += bucket.len();
                Ok(())
            }
            Node::Internal(internal) => {
                if internal.keys.len() + 1 != internal.children.len() {
                    return Err(violation(format!(
                        "internal node {id} has {} keys for {} children",
                        internal.keys.len(),
                        internal.children.len()
                    )));
                }
                check_keys(id, &internal.keys, low, high)?;
                let min = if is_root { 2 } else { self.config.min_children() };
                check_occupancy(id, "internal node", internal.len(), min, self.config.max_btree_size)?;
                self.report.internal_nodes += 1;

                let keys = internal.keys.clone();
                let children = internal.children.clone();
                for (i, child) in children.into_iter().enumerate() {
                    let child_low = if i == 0 { low } else { Some(keys[i - 1]) };
                    let child_high = keys.get(i).copied().or(high);
                    self.visit(nodes, child, depth + 1, child_low, child_high)?;
                }
                Ok(())
            }
        }
    }

    fn check_chain(&self) -> Result<(), BTreeError> {
        for (i, &(id, prev, next)) in self.chain.iter().enumerate() {
            let expected_prev = i.checked_sub(1).map(|p| self.chain[p].0);
            let expected_next = self.chain.get(i + 1).map(|n| n.0);
            if prev != expected_prev {
                return Err(violation(format!(
                    "bucket {id} prev is {prev:?}, expected {expected_prev:?}"
                )));
            }
            if next != expected_next {
                return Err(violation(format!(
                    "bucket {id} next is {next:?}, expected {expected_next:?}"
                )));
            }
        }
        Ok(())
    }
}

fn check_keys<K: BTreeKey>(
    id: NodeId,
    keys: &[K],
    low: Option<K>,
    high: Option<K>,
) -> Result<(), BTreeError> {
    if !keys.windows(2).all(|w| w[0] < w[1]) {
        return Err(violation(format!("node {id} keys are not strictly increasing")));
    }
    match (low, keys.first()) {
        (Some(low), Some(first)) if *first < low => {
            return Err(violation(format!("node {id} key {first:?} below {low:?}")));
        }
        _ => {}
    }
    match (high, keys.last()) {
        (Some(high), Some(last)) if *last >= high => {
            Err(violation(format!("node {id} key {last:?} not below {high:?}")))
        }
        _ => Ok(()),
    }
}

fn check_occupancy(
    id: NodeId,
    kind: &str,
    len: usize,
    min: usize,
    max: usize,
) -> Result<(), BTreeError> {
    if len < min || len > max {
        return Err(violation(format!(
            "{kind} {id} holds {len}, allowed {min}..={max}"
        )));
    }
    Ok(())
}
