//! The wire-format trait implemented by every structured payload.

use crate::binary_writer::BinaryWriter;
use crate::error::IoResult;
use crate::memory_reader::MemoryReader;

/// A value with a canonical, byte-exact binary encoding.
///
/// `deserialize(serialize(x)) == x` must hold for every implementor; the
/// encoding is the value's identity on the wire and in the store.
pub trait Serializable: Sized {
    /// Number of bytes `serialize` will produce.
    fn size(&self) -> usize;

    /// Appends this value's encoding to `writer`.
    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()>;

    /// Decodes a value from `reader`, consuming exactly `size` bytes.
    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self>;

    /// Serializes into a fresh byte vector.
    fn to_bytes(&self) -> IoResult<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Deserializes from a byte slice, requiring all input to be consumed.
    fn from_bytes(data: &[u8]) -> IoResult<Self> {
        let mut reader = MemoryReader::new(data);
        let value = Self::deserialize(&mut reader)?;
        if reader.remaining() != 0 {
            return Err(crate::error::IoError::invalid_format(format!(
                "{} trailing byte(s) after deserialization",
                reader.remaining()
            )));
        }
        Ok(value)
    }
}

/// Size in bytes of a var-int encoding of `value`.
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Size in bytes of a var-bytes encoding of a payload of length `len`.
pub fn var_bytes_size(len: usize) -> usize {
    var_int_size(len as u64) + len
}

/// Size in bytes of a var-int counted list of serializable values.
pub fn list_size<T: Serializable>(values: &[T]) -> usize {
    var_int_size(values.len() as u64) + values.iter().map(Serializable::size).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_int_size_matches_encoding() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 1 << 40] {
            let mut writer = BinaryWriter::new();
            writer.write_var_int(value);
            assert_eq!(writer.len(), var_int_size(value), "value {value}");
        }
    }

    struct Pair(u16, u16);

    impl Serializable for Pair {
        fn size(&self) -> usize {
            4
        }

        fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
            writer.write_u16(self.0);
            writer.write_u16(self.1);
            Ok(())
        }

        fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
            Ok(Pair(reader.read_u16()?, reader.read_u16()?))
        }
    }

    #[test]
    fn from_bytes_rejects_trailing_garbage() {
        let bytes = [1, 0, 2, 0, 0xff];
        assert!(Pair::from_bytes(&bytes).is_err());
        assert!(Pair::from_bytes(&bytes[..4]).is_ok());
    }
}
