//! Persistent, disk-backed B-trees.
//!
//! An ordered map from fixed-width integer keys to fixed-width values whose
//! nodes live as independent objects in an external [`ObjectStore`]:
//!
//! 1. Every node (bucket or internal node) serializes to a checksummed byte
//!    string and is loaded lazily on first access
//! 2. Mutations mark nodes dirty in an in-memory cache
//! 3. `commit` writes dirty nodes and a metadata record, then syncs the store
//! 4. `abort` drops every uncommitted change
//!
//! Families such as [`UOBTree`] (unsigned 32-bit keys, object references)
//! are aliases of the generic [`BTree`].

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod btree;
pub mod config;
pub mod families;
pub mod storage;
pub mod types;
pub mod workload;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod simulation;
#[cfg(test)]
mod testing;

pub use btree::{BTree, BTreeError, Cursor, FormatError, InsertOutcome};
pub use config::{ConfigError, DuplicatePolicy, TreeConfig};
pub use families::{
    IFBTree, IIBTree, IOBTree, LDBTree, LLBTree, LOBTree, QLBTree, QOBTree, UFBTree, UIBTree,
    UOBTree,
};
pub use storage::{FileStore, MemoryStore, ObjectId, ObjectStore, StorageError};
pub use types::{BTreeKey, BTreeValue, KeyKind, ObjectRef, ValueKind};
