//! Byte-level encoding helpers shared by nodes and tree metadata.
//!
//! Every serialized object ends with a CRC32 trailer over all preceding
//! bytes. [`Writer::finish`] appends it and [`Reader::verified`] checks and
//! strips it before any field is decoded.

use crate::types::{BTreeKey, BTreeValue, KeyKind, ValueKind};

/// Size of the CRC32 trailer.
const CHECKSUM_SIZE: usize = 4;

/// Errors raised while decoding a serialized node or metadata record.
///
/// A format error is fatal for the object it was raised on: no partial
/// recovery is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Input ended before a field could be read.
    Truncated { needed: usize, available: usize },
    /// Bytes left over after the last field.
    TrailingBytes(usize),
    /// CRC32 trailer does not match the content.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Unknown node type tag.
    UnknownNodeType(u8),
    /// Magic bytes of a metadata record are wrong.
    BadMagic,
    /// Unsupported metadata format version.
    UnsupportedVersion(u8),
    /// Node was written for a different key kind.
    KeyKindMismatch { expected: KeyKind, found: u8 },
    /// Bucket was written for a different value kind.
    ValueKindMismatch { expected: ValueKind, found: u8 },
    /// Keys are not strictly increasing.
    UnsortedKeys,
    /// Internal node without children.
    EmptyInternalNode,
    /// A field holds a value outside its domain.
    InvalidField(&'static str),
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "truncated: needed {needed} bytes, {available} available")
            }
            Self::TrailingBytes(n) => write!(f, "{n} trailing bytes"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::UnknownNodeType(tag) => write!(f, "unknown node type: 0x{tag:02x}"),
            Self::BadMagic => write!(f, "bad magic"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version {v}"),
            Self::KeyKindMismatch { expected, found } => {
                write!(f, "key kind mismatch: expected {expected:?}, found 0x{found:02x}")
            }
            Self::ValueKindMismatch { expected, found } => {
                write!(f, "value kind mismatch: expected {expected:?}, found 0x{found:02x}")
            }
            Self::UnsortedKeys => write!(f, "keys are not strictly increasing"),
            Self::EmptyInternalNode => write!(f, "internal node has no children"),
            Self::InvalidField(name) => write!(f, "invalid value for field {name}"),
        }
    }
}

impl std::error::Error for FormatError {}

/// Appends fields to a byte buffer.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a writer with room for `capacity` bytes plus the trailer.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity + CHECKSUM_SIZE),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_key<K: BTreeKey>(&mut self, key: &K) {
        key.write_to(&mut self.buf);
    }

    pub fn put_value<V: BTreeValue>(&mut self, value: &V) {
        value.write_to(&mut self.buf);
    }

    /// Append the CRC32 trailer and return the bytes.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        let checksum = crc32fast::hash(&self.buf);
        self.buf.extend_from_slice(&checksum.to_le_bytes());
        self.buf
    }
}

/// Reads fields from a checksummed byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Verify the CRC32 trailer and return a reader over the content.
    pub fn verified(bytes: &'a [u8]) -> Result<Self, FormatError> {
        let Some(content_len) = bytes.len().checked_sub(CHECKSUM_SIZE) else {
            return Err(FormatError::Truncated {
                needed: CHECKSUM_SIZE,
                available: bytes.len(),
            });
        };
        let (content, trailer) = bytes.split_at(content_len);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(content);
        if expected != actual {
            return Err(FormatError::ChecksumMismatch { expected, actual });
        }
        Ok(Self {
            bytes: content,
            offset: 0,
        })
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let available = self.bytes.len() - self.offset;
        if len > available {
            return Err(FormatError::Truncated {
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, FormatError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, FormatError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_key<K: BTreeKey>(&mut self) -> Result<K, FormatError> {
        K::read_from(self.take(K::WIDTH)?).ok_or(FormatError::InvalidField("key"))
    }

    pub fn get_value<V: BTreeValue>(&mut self) -> Result<V, FormatError> {
        V::read_from(self.take(V::WIDTH)?).ok_or(FormatError::InvalidField("value"))
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Fail if any content is left unread.
    pub const fn finish(self) -> Result<(), FormatError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FormatError::TrailingBytes(n)),
        }
    }
}
