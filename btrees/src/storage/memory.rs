//! In-memory object store.
//!
//! Keeps every object in a `HashMap`. Nothing survives the process, but the
//! commit contract still holds: writes are staged until `sync` applies them
//! as one batch, and `rollback` drops them. Useful for tests and for hosts
//! that manage durability themselves.

use std::collections::HashMap;

use crate::storage::io::{ObjectId, ObjectStore, StorageError};

/// A volatile object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Objects as of the last `sync`.
    objects: HashMap<ObjectId, Vec<u8>>,
    /// Writes since the last `sync`; `None` is a removal.
    staged: HashMap<ObjectId, Option<Vec<u8>>>,
    /// Last id handed out. Ids start at 1.
    last_id: ObjectId,
    sync_count: u64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Whether a committed object with this id exists.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Number of writes waiting for the next `sync`.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Number of successful `sync` calls.
    #[must_use]
    pub const fn sync_count(&self) -> u64 {
        self.sync_count
    }

    /// Total bytes held by committed objects.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }
}

impl ObjectStore for MemoryStore {
    fn new_id(&mut self) -> Result<ObjectId, StorageError> {
        self.last_id += 1;
        Ok(self.last_id)
    }

    fn load(&mut self, id: ObjectId) -> Result<Vec<u8>, StorageError> {
        let bytes = match self.staged.get(&id) {
            Some(staged) => staged.as_ref(),
            None => self.objects.get(&id),
        };
        bytes.cloned().ok_or(StorageError::NotFound(id))
    }

    fn store(&mut self, id: ObjectId, bytes: &[u8]) -> Result<(), StorageError> {
        self.staged.insert(id, Some(bytes.to_vec()));
        Ok(())
    }

    fn remove(&mut self, id: ObjectId) -> Result<(), StorageError> {
        self.staged.insert(id, None);
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        for (id, change) in self.staged.drain() {
            match change {
                Some(bytes) => {
                    self.objects.insert(id, bytes);
                }
                None => {
                    self.objects.remove(&id);
                }
            }
        }
        self.sync_count += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.staged.clear();
        Ok(())
    }
}
