//! Key and value kinds an engine instantiation can be built from.
//!
//! Every tree is generic over a key type implementing [`BTreeKey`] and a
//! value type implementing [`BTreeValue`]. Both carry a one-byte kind tag
//! that is written into every serialized node, so a node written by one
//! instantiation is never silently decoded by another.

mod key;
mod value;

pub use key::{BTreeKey, KeyKind};
pub use value::{BTreeValue, ObjectRef, ValueKind};
