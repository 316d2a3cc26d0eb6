//! Append-only writer over a growable byte buffer.

use crate::error::IoResult;
use crate::serializable::Serializable;
use bytes::{BufMut, BytesMut};

/// Serializes primitives and [`Serializable`] values into a growable buffer.
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Creates a writer with `capacity` bytes pre-allocated.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    /// Writes a signed byte.
    pub fn write_i8(&mut self, value: i8) {
        self.buffer.put_i8(value);
    }

    /// Writes a boolean as `0x01` or `0x00`.
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16_le(value);
    }

    /// Writes a little-endian `i16`.
    pub fn write_i16(&mut self, value: i16) {
        self.buffer.put_i16_le(value);
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32_le(value);
    }

    /// Writes a little-endian `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32_le(value);
    }

    /// Writes a big-endian `u32`. Used only by the index→hash store key.
    pub fn write_u32_be(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    /// Writes a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.put_u64_le(value);
    }

    /// Writes a little-endian `i64`.
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.put_i64_le(value);
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buffer.put_slice(value);
    }

    /// Writes a Bitcoin-style variable-length integer.
    pub fn write_var_int(&mut self, value: u64) {
        if value < 0xfd {
            self.write_u8(value as u8);
        } else if value <= 0xffff {
            self.write_u8(0xfd);
            self.write_u16(value as u16);
        } else if value <= 0xffff_ffff {
            self.write_u8(0xfe);
            self.write_u32(value as u32);
        } else {
            self.write_u8(0xff);
            self.write_u64(value);
        }
    }

    /// Writes a var-int length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, value: &[u8]) {
        self.write_var_int(value.len() as u64);
        self.write_bytes(value);
    }

    /// Writes a UTF-8 string as var-bytes.
    pub fn write_var_string(&mut self, value: &str) {
        self.write_var_bytes(value.as_bytes());
    }

    /// Writes a single [`Serializable`] value.
    pub fn write_serializable<T: Serializable>(&mut self, value: &T) -> IoResult<()> {
        value.serialize(self)
    }

    /// Writes a var-int count followed by each value.
    pub fn write_serializable_list<T: Serializable>(&mut self, values: &[T]) -> IoResult<()> {
        self.write_var_int(values.len() as u64);
        for value in values {
            value.serialize(self)?;
        }
        Ok(())
    }

    /// Consumes the writer and returns the bytes written.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Copies out the bytes written so far.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_reader::MemoryReader;

    #[test]
    fn var_int_boundaries() {
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (0xfc, 1),
            (0xfd, 3),
            (0xffff, 3),
            (0x10000, 5),
            (0xffff_ffff, 5),
            (0x1_0000_0000, 9),
        ];
        for &(value, encoded_len) in cases {
            let mut writer = BinaryWriter::new();
            writer.write_var_int(value);
            let bytes = writer.into_bytes();
            assert_eq!(bytes.len(), encoded_len, "value {value}");
            let mut reader = MemoryReader::new(&bytes);
            assert_eq!(reader.read_var_int(u64::MAX).unwrap(), value);
        }
    }

    #[test]
    fn var_bytes_round_trip() {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(b"neo-oxide");
        let bytes = writer.into_bytes();
        let mut reader = MemoryReader::new(&bytes);
        assert_eq!(reader.read_var_bytes(64).unwrap(), b"neo-oxide");
    }

    #[test]
    fn primitives_are_little_endian() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(0x12345678);
        assert_eq!(writer.into_bytes(), vec![0x78, 0x56, 0x34, 0x12]);
    }
}
