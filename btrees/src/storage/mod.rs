//! Object stores and the node cache.
//!
//! The engine persists every node as an opaque object through the
//! [`ObjectStore`] trait. Two stores ship with the crate:
//!
//! - [`MemoryStore`]: volatile, for tests and hosts that persist elsewhere
//! - [`FileStore`]: a single append-only file with checksummed records,
//!   committed in batches closed by a marker record
//!
//! [`NodeStore`] sits between the tree and a store, caching decoded nodes and
//! tracking which ones must be written at the next commit.

pub mod file;
pub mod io;
pub mod memory;
pub mod node_store;

pub use file::FileStore;
pub use io::{ObjectId, ObjectStore, StorageError};
pub use memory::MemoryStore;
pub use node_store::{CacheStats, CommitStats, NodeStore};
