//! Seeded random workload over a `UOBTree`.
//!
//! Used by the driver binary to exercise a store end to end. The operation
//! mix is fixed; the seed makes a run reproducible. Writes go through `set`,
//! so a tree with the `Reject` duplicate policy counts repeated keys as
//! rejected writes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::btree::{BTree, BTreeError};
use crate::storage::io::ObjectStore;
use crate::types::ObjectRef;

/// Keys are drawn from `0..KEY_SPACE` so that removals and overwrites hit.
pub const KEY_SPACE: u32 = 100_000;
/// Operations between commits.
pub const COMMIT_INTERVAL: usize = 1_000;

/// Counters from one workload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadReport {
    pub inserted: usize,
    pub replaced: usize,
    /// Writes of an existing key refused by the `Reject` policy.
    pub rejected: usize,
    pub removed: usize,
    pub missed_removes: usize,
    pub lookups: usize,
    pub hits: usize,
    pub commits: usize,
}

/// Run `operations` random operations against `tree`, committing every
/// [`COMMIT_INTERVAL`] operations and once at the end.
pub fn run<S: ObjectStore>(
    tree: &mut BTree<u32, ObjectRef, S>,
    operations: usize,
    seed: u64,
) -> Result<WorkloadReport, BTreeError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut report = WorkloadReport::default();

    for i in 0..operations {
        let key = rng.random_range(0..KEY_SPACE);
        match rng.random_range(0..100u32) {
            0..60 => {
                let value = ObjectRef(rng.random());
                match tree.set(key, value) {
                    Ok(Some(_)) => report.replaced += 1,
                    Ok(None) => report.inserted += 1,
                    Err(BTreeError::KeyExists) => report.rejected += 1,
                    Err(e) => return Err(e),
                }
            }
            60..85 => match tree.remove(&key)? {
                Some(_) => report.removed += 1,
                None => report.missed_removes += 1,
            },
            _ => {
                report.lookups += 1;
                if tree.get(&key)?.is_some() {
                    report.hits += 1;
                }
            }
        }

        if (i + 1) % COMMIT_INTERVAL == 0 {
            tree.commit()?;
            report.commits += 1;
            debug!(operations = i + 1, len = tree.len(), "workload checkpoint");
        }
    }

    tree.commit()?;
    report.commits += 1;
    Ok(report)
}
