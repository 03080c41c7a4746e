//! Value kinds: object references, integers and floats.

use std::fmt::{self, Debug};

/// Value kind discriminant stored in serialized buckets and tree metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueKind {
    /// Reference to an object held by the host object store.
    Object = 0x01,
    /// Signed 32-bit integer.
    I32 = 0x02,
    /// Signed 64-bit integer.
    I64 = 0x03,
    /// 32-bit float.
    F32 = 0x04,
    /// 64-bit float.
    F64 = 0x05,
}

impl ValueKind {
    /// One-letter family suffix (`O`, `I`, `L`, `F`, `D`).
    #[must_use]
    pub const fn prefix_code(self) -> char {
        match self {
            Self::Object => 'O',
            Self::I32 => 'I',
            Self::I64 => 'L',
            Self::F32 => 'F',
            Self::F64 => 'D',
        }
    }
}

impl TryFrom<u8> for ValueKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Object),
            0x02 => Ok(Self::I32),
            0x03 => Ok(Self::I64),
            0x04 => Ok(Self::F32),
            0x05 => Ok(Self::F64),
            _ => Err(value),
        }
    }
}

/// A value that can be stored in a bucket.
///
/// Values have no ordering requirement. They encode to exactly
/// [`BTreeValue::WIDTH`] little-endian bytes.
pub trait BTreeValue: Clone + Debug + PartialEq {
    /// Kind tag written into serialized buckets.
    const KIND: ValueKind;
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Append the encoded value to `buf`.
    fn write_to(&self, buf: &mut Vec<u8>);

    /// Decode a value from exactly `WIDTH` bytes.
    fn read_from(bytes: &[u8]) -> Option<Self>;
}

/// An opaque handle to an object owned by the host object store.
///
/// The engine never dereferences it; it only stores and returns the id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectRef(pub u64);

impl ObjectRef {
    /// The raw object id.
    #[must_use]
    pub const fn oid(self) -> u64 {
        self.0
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef(0x{:016x})", self.0)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:0x{:016x}", self.0)
    }
}

impl From<u64> for ObjectRef {
    fn from(oid: u64) -> Self {
        Self(oid)
    }
}

impl BTreeValue for ObjectRef {
    const KIND: ValueKind = ValueKind::Object;
    const WIDTH: usize = 8;

    fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0.to_le_bytes());
    }

    fn read_from(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(u64::from_le_bytes).map(Self)
    }
}

macro_rules! impl_numeric_value {
    ($ty:ty, $kind:expr) => {
        impl BTreeValue for $ty {
            const KIND: ValueKind = $kind;
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

impl_numeric_value!(i32, ValueKind::I32);
impl_numeric_value!(i64, ValueKind::I64);
impl_numeric_value!(f32, ValueKind::F32);
impl_numeric_value!(f64, ValueKind::F64);
