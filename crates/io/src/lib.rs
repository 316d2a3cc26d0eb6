//! Binary serialization for the neo-oxide node.
//!
//! Everything that crosses the wire or the store is encoded through the
//! reader/writer pair in this crate: little-endian primitives, Bitcoin-style
//! variable-length integers, and length-prefixed byte strings with
//! caller-supplied bounds.

pub mod binary_writer;
pub mod error;
pub mod memory_reader;
pub mod serializable;

pub use binary_writer::BinaryWriter;
pub use error::{IoError, IoResult};
pub use memory_reader::MemoryReader;
pub use serializable::Serializable;
