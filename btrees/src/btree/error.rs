//! Errors surfaced by tree operations.

use crate::btree::codec::FormatError;
use crate::config::ConfigError;
use crate::storage::io::StorageError;

/// Errors that can occur during tree operations.
///
/// None of these are retried internally. `Storage` and `Format` leave the
/// tree with uncommitted changes that the caller should `abort`. This
/// includes a failed `commit`: `abort` also rolls back whatever the commit
/// already wrote to the store.
#[derive(Debug)]
pub enum BTreeError {
    /// Insert of an existing key with overwriting disabled.
    KeyExists,
    /// Delete of a missing key.
    KeyNotFound,
    /// Error from the backing object store.
    Storage(StorageError),
    /// A serialized node or metadata record is corrupt.
    Format(FormatError),
    /// Invalid tree configuration.
    Config(ConfigError),
    /// A structural invariant does not hold.
    Corrupted(String),
}

impl std::fmt::Display for BTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeyExists => write!(f, "key already exists"),
            Self::KeyNotFound => write!(f, "key not found"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Format(e) => write!(f, "format error: {e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Corrupted(msg) => write!(f, "tree corrupted: {msg}"),
        }
    }
}

impl std::error::Error for BTreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Format(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BTreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<FormatError> for BTreeError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<ConfigError> for BTreeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
