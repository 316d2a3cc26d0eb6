//! Cursor-based reader over an in-memory byte buffer.

use crate::error::{IoError, IoResult};
use crate::serializable::Serializable;

/// Reads primitives and length-prefixed data from a byte slice, tracking the
/// current position and the bytes still available.
pub struct MemoryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemoryReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Moves the read position to `position`.
    pub fn set_position(&mut self, position: usize) -> IoResult<()> {
        if position > self.data.len() {
            return Err(IoError::EndOfStream {
                needed: position - self.data.len(),
                position: self.pos,
            });
        }
        self.pos = position;
        Ok(())
    }

    fn ensure(&self, count: usize) -> IoResult<()> {
        if self.pos + count > self.data.len() {
            return Err(IoError::EndOfStream {
                needed: self.pos + count - self.data.len(),
                position: self.pos,
            });
        }
        Ok(())
    }

    /// Returns the next byte without advancing.
    pub fn peek(&self) -> IoResult<u8> {
        self.ensure(1)?;
        Ok(self.data[self.pos])
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> IoResult<u8> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Reads a signed byte.
    pub fn read_i8(&mut self) -> IoResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Reads a boolean encoded as exactly `0x00` or `0x01`.
    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_data(format!(
                "non-canonical boolean byte 0x{other:02x}"
            ))),
        }
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> IoResult<u16> {
        self.ensure(2)?;
        let v = u16::from_le_bytes(self.data[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }

    /// Reads a little-endian `i16`.
    pub fn read_i16(&mut self) -> IoResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> IoResult<u32> {
        self.ensure(4)?;
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> IoResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a big-endian `u32`. Used only by the index→hash store key.
    pub fn read_u32_be(&mut self) -> IoResult<u32> {
        self.ensure(4)?;
        let v = u32::from_be_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> IoResult<u64> {
        self.ensure(8)?;
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }

    /// Reads a little-endian `i64`.
    pub fn read_i64(&mut self) -> IoResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads exactly `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> IoResult<Vec<u8>> {
        self.ensure(count)?;
        let out = self.data[self.pos..self.pos + count].to_vec();
        self.pos += count;
        Ok(out)
    }

    /// Reads a fixed-width array, e.g. a hash.
    pub fn read_array<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Reads a Bitcoin-style variable-length integer bounded by `max`.
    ///
    /// One byte below `0xFD` encodes the value directly; `0xFD`, `0xFE` and
    /// `0xFF` prefix a `u16`, `u32` and `u64` respectively. Values above
    /// `i64::MAX` are rejected regardless of `max`.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let first = self.read_u8()?;
        let value = match first {
            0xfd => self.read_u16()? as u64,
            0xfe => self.read_u32()? as u64,
            0xff => self.read_u64()?,
            b => b as u64,
        };
        if value > i64::MAX as u64 {
            return Err(IoError::Overflow {
                value,
                max: i64::MAX as u64,
            });
        }
        if value > max {
            return Err(IoError::Overflow { value, max });
        }
        Ok(value)
    }

    /// Reads a var-int length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let len = self.read_var_int(max as u64)? as usize;
        self.read_bytes(len)
    }

    /// Reads a var-bytes payload and decodes it as UTF-8.
    pub fn read_var_string(&mut self, max: usize) -> IoResult<String> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes).map_err(|_| IoError::invalid_data("invalid utf-8 string"))
    }

    /// Reads a single [`Serializable`] value.
    pub fn read_serializable<T: Serializable>(&mut self) -> IoResult<T> {
        T::deserialize(self)
    }

    /// Reads a var-int count followed by that many [`Serializable`] values.
    pub fn read_serializable_list<T: Serializable>(&mut self, max: usize) -> IoResult<Vec<T>> {
        let count = self.read_var_int(max as u64)? as usize;
        let mut out = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            out.push(T::deserialize(self)?);
        }
        Ok(out)
    }

    /// Returns all bytes from the current position to the end.
    pub fn read_to_end(&mut self) -> Vec<u8> {
        let out = self.data[self.pos..].to_vec();
        self.pos = self.data.len();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives() {
        let data = [0x42, 0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x42);
        assert_eq!(reader.read_bool().unwrap(), true);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x12345678);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn non_canonical_bool_rejected() {
        let mut reader = MemoryReader::new(&[0x02]);
        assert!(matches!(
            reader.read_bool(),
            Err(IoError::InvalidData(_))
        ));
    }

    #[test]
    fn short_read_reports_end_of_stream() {
        let mut reader = MemoryReader::new(&[0x01]);
        reader.read_u8().unwrap();
        assert!(matches!(
            reader.read_u32(),
            Err(IoError::EndOfStream { .. })
        ));
    }

    #[test]
    fn var_int_all_widths() {
        let mut reader = MemoryReader::new(&[0x42]);
        assert_eq!(reader.read_var_int(u64::MAX).unwrap(), 0x42);

        let mut reader = MemoryReader::new(&[0xfd, 0x34, 0x12]);
        assert_eq!(reader.read_var_int(u64::MAX).unwrap(), 0x1234);

        let mut reader = MemoryReader::new(&[0xfe, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(reader.read_var_int(u64::MAX).unwrap(), 0x12345678);

        let mut reader = MemoryReader::new(&[0xff, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(reader.read_var_int(u64::MAX).unwrap(), 1);
    }

    #[test]
    fn var_int_respects_bound() {
        let mut reader = MemoryReader::new(&[0xfd, 0x34, 0x12]);
        assert!(matches!(
            reader.read_var_int(0x100),
            Err(IoError::Overflow { .. })
        ));
    }

    #[test]
    fn var_int_rejects_above_i64_max() {
        let mut reader = MemoryReader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(
            reader.read_var_int(u64::MAX),
            Err(IoError::Overflow { .. })
        ));
    }

    #[test]
    fn var_string_round_trip() {
        let data = [0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut reader = MemoryReader::new(&data);
        assert_eq!(reader.read_var_string(100).unwrap(), "hello");
    }
}
