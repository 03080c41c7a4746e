//! Persistent B-tree engine.
//!
//! # Structure
//!
//! The tree consists of:
//! - Buckets: sorted key/value pairs, doubly linked for range scans
//! - Internal nodes: separator keys and child node ids
//! - A metadata record naming the root, capacities and entry count
//!
//! Nodes are stored as independent objects in an [`ObjectStore`] and faulted
//! in on demand. Changes stay in memory until [`BTree::commit`].
//!
//! # Usage
//!
//! ```
//! use btrees::{BTree, MemoryStore, ObjectRef, TreeConfig};
//!
//! let mut tree: BTree<u32, ObjectRef, _> =
//!     BTree::create(MemoryStore::new(), TreeConfig::new(3, 3)).unwrap();
//! for key in [50, 10, 30, 70] {
//!     tree.insert(key, ObjectRef(u64::from(key)), false).unwrap();
//! }
//! assert_eq!(tree.height().unwrap(), 2);
//!
//! let keys: Vec<u32> = tree.range(10, 50).map(|e| e.unwrap().0).collect();
//! assert_eq!(keys, vec![10, 30]);
//! ```
//!
//! [`ObjectStore`]: crate::storage::ObjectStore

pub mod check;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod meta;
pub mod node;
pub mod tree;

pub use check::CheckReport;
pub use codec::FormatError;
pub use cursor::Cursor;
pub use error::BTreeError;
pub use meta::TreeMeta;
pub use node::{Bucket, InsertOutcome, InternalNode, Node, NodeId, NodeType};
pub use tree::{BTree, TreeStats};
