//! Append-only single-file object store.
//!
//! Every `store`, `remove` and root change appends one record to the end of
//! the file. `sync` closes the batch with a commit marker and then fsyncs.
//! Opening the file replays the log into an in-memory index from object id
//! to payload location, so loads are a single positioned read.
//!
//! # File Format
//!
//! ```text
//! header (16 bytes):
//! +----------+------------------------------------------+
//! | 0-7      | magic "BTRSTORE"                          |
//! | 8-11     | format version (u32)                      |
//! | 12-15    | reserved                                  |
//! +----------+------------------------------------------+
//!
//! record:
//! +----------+------------------------------------------+
//! | 0        | record kind (1 byte)                      |
//! | 1-8      | object id (8 bytes)                       |
//! | 9-12     | payload length (4 bytes)                  |
//! | 13-16    | CRC32 of kind, id, length and payload     |
//! | 17-N     | payload                                   |
//! +----------+------------------------------------------+
//! ```
//!
//! # Recovery
//!
//! Records only take effect once a commit marker follows them. On open,
//! everything after the last marker is a batch that never finished syncing
//! (or a torn write) and is truncated away. A crash in the middle of a
//! commit therefore leaves the previous commit intact.

// record lengths are bounded by u32 and file offsets by u64
#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::io::{ObjectId, ObjectStore, StorageError};

/// Magic bytes at the start of every store file.
const MAGIC: &[u8; 8] = b"BTRSTORE";

/// Current file format version.
const FORMAT_VERSION: u32 = 2;

/// Size of the file header in bytes.
const HEADER_SIZE: usize = 16;

/// Record header size: kind (1) + id (8) + length (4) + checksum (4).
const RECORD_HEADER_SIZE: usize = 17;

/// Record kinds in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RecordKind {
    /// Object bytes for an id.
    Put = 0x01,
    /// Tombstone for an id.
    Remove = 0x02,
    /// New root object id (0 clears it).
    Root = 0x03,
    /// End of a synced batch.
    Commit = 0x04,
}

impl TryFrom<u8> for RecordKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Put),
            0x02 => Ok(Self::Remove),
            0x03 => Ok(Self::Root),
            0x04 => Ok(Self::Commit),
            _ => Err(value),
        }
    }
}

/// Where a live object's payload sits in the file.
#[derive(Debug, Clone, Copy)]
struct RecordLocation {
    /// Offset of the payload (after the record header).
    offset: u64,
    len: u32,
    checksum: u32,
}

impl RecordLocation {
    fn record_size(&self) -> u64 {
        RECORD_HEADER_SIZE as u64 + u64::from(self.len)
    }
}

/// Records written since the last commit marker.
#[derive(Debug, Default)]
struct Batch {
    /// `None` marks a removal.
    changes: HashMap<ObjectId, Option<RecordLocation>>,
    /// Set if the batch changes the root.
    root: Option<Option<ObjectId>>,
    /// Bytes of records this batch already superseded itself.
    superseded: u64,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.root.is_none()
    }

    fn put(&mut self, id: ObjectId, location: RecordLocation) {
        if let Some(Some(old)) = self.changes.insert(id, Some(location)) {
            self.superseded += old.record_size();
        }
    }

    fn remove(&mut self, id: ObjectId) {
        self.superseded += RECORD_HEADER_SIZE as u64;
        if let Some(Some(old)) = self.changes.insert(id, None) {
            self.superseded += old.record_size();
        }
    }
}

/// The state as of the last commit marker.
#[derive(Debug, Default)]
struct Committed {
    index: HashMap<ObjectId, RecordLocation>,
    root: Option<ObjectId>,
    last_id: ObjectId,
    /// Bytes occupied by superseded records.
    stale_bytes: u64,
}

impl Committed {
    fn apply(&mut self, batch: Batch) {
        self.stale_bytes += batch.superseded;
        for (id, change) in batch.changes {
            self.last_id = self.last_id.max(id);
            let old = match change {
                Some(location) => self.index.insert(id, location),
                None => self.index.remove(&id),
            };
            if let Some(old) = old {
                self.stale_bytes += old.record_size();
            }
        }
        if let Some(root) = batch.root {
            self.root = root;
        }
    }
}

/// Result of replaying a store file.
#[derive(Debug, Default)]
struct Replay {
    committed: Committed,
    /// Offset just past the last commit marker.
    end: u64,
}

/// A durable object store backed by one append-only file.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    path: PathBuf,
    committed: Committed,
    batch: Batch,
    last_id: ObjectId,
    /// End of the log, including the open batch.
    end: u64,
    /// End of the log as of the last commit marker.
    committed_end: u64,
}

impl FileStore {
    /// Create a new store file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.write_all(&header_bytes())?;
        file.sync_all()?;

        tracing::info!("created object store {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            committed: Committed::default(),
            batch: Batch::default(),
            last_id: 0,
            end: HEADER_SIZE as u64,
            committed_end: HEADER_SIZE as u64,
        })
    }

    /// Open an existing store file and replay its log.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        validate_header(&bytes)?;
        let replay = replay_records(&bytes);

        if replay.end < bytes.len() as u64 {
            tracing::warn!(
                "discarding {} bytes of uncommitted log tail in {}",
                bytes.len() as u64 - replay.end,
                path.display()
            );
            file.set_len(replay.end)?;
            file.sync_all()?;
        }

        tracing::info!(
            "opened object store {}: {} live objects, {} stale bytes",
            path.display(),
            replay.committed.index.len(),
            replay.committed.stale_bytes
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            last_id: replay.committed.last_id,
            committed: replay.committed,
            batch: Batch::default(),
            end: replay.end,
            committed_end: replay.end,
        })
    }

    /// Open the store at `path`, creating it if it does not exist.
    pub fn open_or_create(path: &Path) -> Result<Self, StorageError> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The root object id, if one was recorded.
    #[must_use]
    pub fn root(&self) -> Option<ObjectId> {
        self.batch.root.unwrap_or(self.committed.root)
    }

    /// Record the root object id (for example a tree's metadata id). Takes
    /// effect at the next `sync`.
    pub fn set_root(&mut self, id: Option<ObjectId>) -> Result<(), StorageError> {
        self.append_record(RecordKind::Root, id.unwrap_or(0), &[])?;
        self.batch.root = Some(id);
        Ok(())
    }

    /// Number of committed objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.committed.index.len()
    }

    /// Length of the log in bytes.
    #[must_use]
    pub const fn file_len(&self) -> u64 {
        self.end
    }

    /// Bytes occupied by committed records that have been superseded or
    /// removed.
    #[must_use]
    pub const fn stale_bytes(&self) -> u64 {
        self.committed.stale_bytes
    }

    /// Rewrite the file so that it only holds committed live objects.
    /// Writes since the last `sync` are discarded.
    ///
    /// The new log is written next to the old one and renamed over it once
    /// it has been synced.
    pub fn compact(&mut self) -> Result<(), StorageError> {
        let tmp_path = self.path.with_extension("compact");
        let _ = std::fs::remove_file(&tmp_path);

        let mut live: Vec<(ObjectId, RecordLocation)> = self
            .committed
            .index
            .iter()
            .map(|(id, location)| (*id, *location))
            .collect();
        live.sort_unstable_by_key(|(id, _)| *id);

        let mut compacted = Self::create(&tmp_path)?;
        compacted.last_id = self.last_id;
        for (id, location) in live {
            let bytes = self.read_payload(id, location)?;
            compacted.store(id, &bytes)?;
        }
        if self.committed.root.is_some() {
            compacted.set_root(self.committed.root)?;
        }
        compacted.sync()?;

        std::fs::rename(&tmp_path, &self.path)?;

        tracing::info!(
            "compacted {}: {} -> {} bytes",
            self.path.display(),
            self.end,
            compacted.end
        );

        compacted.path.clone_from(&self.path);
        *self = compacted;
        Ok(())
    }

    /// Read and verify a payload.
    fn read_payload(
        &mut self,
        id: ObjectId,
        location: RecordLocation,
    ) -> Result<Vec<u8>, StorageError> {
        let mut payload = vec![0u8; location.len as usize];
        self.file.seek(SeekFrom::Start(location.offset))?;
        self.file.read_exact(&mut payload)?;

        let actual = record_checksum(RecordKind::Put, id, &payload);
        if actual != location.checksum {
            return Err(StorageError::Corruption(format!(
                "object {id}: checksum mismatch: expected {}, got {actual}",
                location.checksum
            )));
        }
        Ok(payload)
    }

    /// Append one record at the end of the log.
    fn append_record(
        &mut self,
        kind: RecordKind,
        id: ObjectId,
        payload: &[u8],
    ) -> Result<RecordLocation, StorageError> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("object {id} is too large: {} bytes", payload.len()),
            ))
        })?;
        let checksum = record_checksum(kind, id, payload);

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record.push(kind as u8);
        record.extend_from_slice(&id.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&checksum.to_le_bytes());
        record.extend_from_slice(payload);

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&record)?;

        let location = RecordLocation {
            offset: self.end + RECORD_HEADER_SIZE as u64,
            len,
            checksum,
        };
        self.end += record.len() as u64;
        Ok(location)
    }
}

impl ObjectStore for FileStore {
    fn new_id(&mut self) -> Result<ObjectId, StorageError> {
        self.last_id += 1;
        Ok(self.last_id)
    }

    fn load(&mut self, id: ObjectId) -> Result<Vec<u8>, StorageError> {
        let location = match self.batch.changes.get(&id) {
            Some(staged) => *staged,
            None => self.committed.index.get(&id).copied(),
        }
        .ok_or(StorageError::NotFound(id))?;
        self.read_payload(id, location)
    }

    fn store(&mut self, id: ObjectId, bytes: &[u8]) -> Result<(), StorageError> {
        let location = self.append_record(RecordKind::Put, id, bytes)?;
        self.batch.put(id, location);
        self.last_id = self.last_id.max(id);
        Ok(())
    }

    fn remove(&mut self, id: ObjectId) -> Result<(), StorageError> {
        let exists = match self.batch.changes.get(&id) {
            Some(staged) => staged.is_some(),
            None => self.committed.index.contains_key(&id),
        };
        if exists {
            self.append_record(RecordKind::Remove, id, &[])?;
            self.batch.remove(id);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        if !self.batch.is_empty() {
            self.append_record(RecordKind::Commit, 0, &[])?;
        }
        self.file.sync_all()?;

        let batch = std::mem::take(&mut self.batch);
        self.committed.apply(batch);
        self.committed_end = self.end;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if self.end > self.committed_end {
            self.file.set_len(self.committed_end)?;
            tracing::debug!(
                "rolled back {} bytes of uncommitted records in {}",
                self.end - self.committed_end,
                self.path.display()
            );
        }
        self.end = self.committed_end;
        self.batch = Batch::default();
        Ok(())
    }
}

/// Serialize the file header.
fn header_bytes() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    header
}

/// Check magic and version of a store file.
fn validate_header(bytes: &[u8]) -> Result<(), StorageError> {
    if bytes.len() < HEADER_SIZE || &bytes[..8] != MAGIC {
        return Err(StorageError::Corruption(
            "not an object store file (bad magic)".to_string(),
        ));
    }
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != FORMAT_VERSION {
        return Err(StorageError::Corruption(format!(
            "unsupported store format version {version}"
        )));
    }
    Ok(())
}

/// CRC32 over the record kind, id, length and payload.
fn record_checksum(kind: RecordKind, id: ObjectId, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[kind as u8]);
    hasher.update(&id.to_le_bytes());
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Replay every committed batch after the header. Stops at the first
/// record that is cut short or fails its checksum.
fn replay_records(bytes: &[u8]) -> Replay {
    let mut replay = Replay {
        end: HEADER_SIZE as u64,
        ..Replay::default()
    };
    let mut batch = Batch::default();
    let mut offset = HEADER_SIZE;

    while bytes.len() - offset >= RECORD_HEADER_SIZE {
        let header = &bytes[offset..offset + RECORD_HEADER_SIZE];
        let Ok(kind) = RecordKind::try_from(header[0]) else {
            break;
        };
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&header[1..9]);
        let id = u64::from_le_bytes(id_bytes);
        let len = u32::from_le_bytes([header[9], header[10], header[11], header[12]]);
        let checksum = u32::from_le_bytes([header[13], header[14], header[15], header[16]]);

        let payload_start = offset + RECORD_HEADER_SIZE;
        let payload_end = payload_start + len as usize;
        if payload_end > bytes.len() {
            break;
        }
        let payload = &bytes[payload_start..payload_end];
        if record_checksum(kind, id, payload) != checksum {
            break;
        }

        match kind {
            RecordKind::Put => batch.put(
                id,
                RecordLocation {
                    offset: payload_start as u64,
                    len,
                    checksum,
                },
            ),
            RecordKind::Remove => batch.remove(id),
            RecordKind::Root => batch.root = Some((id != 0).then_some(id)),
            RecordKind::Commit => {
                replay.committed.apply(std::mem::take(&mut batch));
                replay.end = payload_end as u64;
            }
        }

        offset = payload_end;
    }

    replay
}
