//! Object store abstraction for the persistence hook.
//!
//! The engine never performs I/O on its own. It hands serialized nodes to an
//! [`ObjectStore`] supplied by the host, which is free to keep them in memory,
//! in a file, or in a transactional database.
//!
//! # Design
//!
//! The trait is a minimal key/value contract over opaque byte strings:
//! - `new_id` hands out fresh, never-reused object ids
//! - `load` / `store` / `remove` operate on one object at a time
//! - `sync` marks a commit boundary; writes since the last `sync` become
//!   durable together or not at all
//! - `rollback` throws away every write since the last `sync`
//!
//! This allows the same engine to run over real files in production and over
//! fault-injecting simulated storage in tests.

/// Identifier of an object in the store. Id 0 is never handed out.
pub type ObjectId = u64;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// No object with this id exists.
    NotFound(ObjectId),
    /// Injected fault for simulation.
    InjectedFault(String),
    /// Corruption detected in the store's own framing.
    Corruption(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::NotFound(id) => write!(f, "object {id} not found"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// External object store the engine persists nodes into.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `load` returns exactly the bytes of the last `store` for that id
/// - `new_id` never returns 0 and never returns an id twice
/// - `remove` of an unknown id is a no-op
/// - writes are visible to `load` immediately, but only become durable at a
///   successful `sync`, all together
/// - `rollback` restores exactly the state of the last successful `sync`
/// - a crash before `sync` completes loses that batch and nothing else
pub trait ObjectStore {
    /// Allocate a fresh object id.
    fn new_id(&mut self) -> Result<ObjectId, StorageError>;

    /// Load the bytes of an object.
    fn load(&mut self, id: ObjectId) -> Result<Vec<u8>, StorageError>;

    /// Store (create or replace) the bytes of an object.
    fn store(&mut self, id: ObjectId, bytes: &[u8]) -> Result<(), StorageError>;

    /// Remove an object.
    fn remove(&mut self, id: ObjectId) -> Result<(), StorageError>;

    /// Make all previous writes durable as one batch.
    fn sync(&mut self) -> Result<(), StorageError>;

    /// Discard every write since the last successful `sync`.
    fn rollback(&mut self) -> Result<(), StorageError>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &mut S {
    fn new_id(&mut self) -> Result<ObjectId, StorageError> {
        (**self).new_id()
    }

    fn load(&mut self, id: ObjectId) -> Result<Vec<u8>, StorageError> {
        (**self).load(id)
    }

    fn store(&mut self, id: ObjectId, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).store(id, bytes)
    }

    fn remove(&mut self, id: ObjectId) -> Result<(), StorageError> {
        (**self).remove(id)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        (**self).sync()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        (**self).rollback()
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for Box<S> {
    fn new_id(&mut self) -> Result<ObjectId, StorageError> {
        (**self).new_id()
    }

    fn load(&mut self, id: ObjectId) -> Result<Vec<u8>, StorageError> {
        (**self).load(id)
    }

    fn store(&mut self, id: ObjectId, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).store(id, bytes)
    }

    fn remove(&mut self, id: ObjectId) -> Result<(), StorageError> {
        (**self).remove(id)
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        (**self).sync()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        (**self).rollback()
    }
}
