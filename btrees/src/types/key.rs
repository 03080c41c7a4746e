//! Fixed-width integer keys.

use std::fmt::Debug;

/// Key kind discriminant stored in serialized nodes and tree metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyKind {
    /// Unsigned 32-bit key.
    U32 = 0x01,
    /// Unsigned 64-bit key.
    U64 = 0x02,
    /// Signed 32-bit key.
    I32 = 0x03,
    /// Signed 64-bit key.
    I64 = 0x04,
}

impl KeyKind {
    /// One-letter family prefix (`U`, `Q`, `I`, `L`).
    #[must_use]
    pub const fn prefix_code(self) -> char {
        match self {
            Self::U32 => 'U',
            Self::U64 => 'Q',
            Self::I32 => 'I',
            Self::I64 => 'L',
        }
    }
}

impl TryFrom<u8> for KeyKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::U32),
            0x02 => Ok(Self::U64),
            0x03 => Ok(Self::I32),
            0x04 => Ok(Self::I64),
            _ => Err(value),
        }
    }
}

/// A key that can be stored in a tree.
///
/// Keys are totally ordered, cheap to copy, and encode to exactly
/// [`BTreeKey::WIDTH`] little-endian bytes.
pub trait BTreeKey: Ord + Copy + Debug {
    /// Kind tag written into serialized nodes.
    const KIND: KeyKind;
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Append the encoded key to `buf`.
    fn write_to(&self, buf: &mut Vec<u8>);

    /// Decode a key from exactly `WIDTH` bytes.
    ///
    /// Returns `None` if `bytes` has the wrong length.
    fn read_from(bytes: &[u8]) -> Option<Self>;
}

macro_rules! impl_int_key {
    ($ty:ty, $kind:expr) => {
        impl BTreeKey for $ty {
            const KIND: KeyKind = $kind;
            const WIDTH: usize = std::mem::size_of::<$ty>();

            fn write_to(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            fn read_from(bytes: &[u8]) -> Option<Self> {
                bytes.try_into().ok().map(<$ty>::from_le_bytes)
            }
        }
    };
}

impl_int_key!(u32, KeyKind::U32);
impl_int_key!(u64, KeyKind::U64);
impl_int_key!(i32, KeyKind::I32);
impl_int_key!(i64, KeyKind::I64);
