//! Big-endian byte buffer primitives for cluster gossip payloads.
//!
//! Integers are written in network byte order. Strings are an `int32` byte
//! length followed by UTF-8 bytes.

use crate::error::{ClusterError, ClusterResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const BOOL_LEN: usize = 1;
pub const INT16_LEN: usize = 2;
pub const INT32_LEN: usize = 4;
pub const INT64_LEN: usize = 8;

/// Minimum encoded length of a string (the length prefix of an empty string).
pub const MIN_STRING_LEN: usize = INT32_LEN;

#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn put_string(&mut self, value: &str) -> ClusterResult<()> {
        let len = i32::try_from(value.len()).map_err(|_| {
            ClusterError::Error(format!("string of {} bytes is too long", value.len()))
        })?;
        self.buf.reserve(INT32_LEN + value.len());
        self.buf.put_i32(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Discards everything written so far, keeping the allocation.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Read cursor over a received payload.
///
/// Every read checks the remaining length first, so a truncated or hostile
/// payload yields [`ClusterError::Decode`] instead of a panic.
#[derive(Clone, Debug)]
pub struct WireReader {
    buf: Bytes,
}

impl WireReader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self { buf: buf.into() }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buf: Bytes::copy_from_slice(data),
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn ensure(&self, needed: usize, what: &str) -> ClusterResult<()> {
        if self.buf.remaining() < needed {
            return Err(ClusterError::decode(format!(
                "{what}: need {needed} bytes, {} remaining",
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> ClusterResult<u8> {
        self.ensure(BOOL_LEN, "u8")?;
        Ok(self.buf.get_u8())
    }

    pub fn get_bool(&mut self) -> ClusterResult<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> ClusterResult<u16> {
        self.ensure(INT16_LEN, "u16")?;
        Ok(self.buf.get_u16())
    }

    pub fn get_i16(&mut self) -> ClusterResult<i16> {
        self.ensure(INT16_LEN, "i16")?;
        Ok(self.buf.get_i16())
    }

    pub fn get_u32(&mut self) -> ClusterResult<u32> {
        self.ensure(INT32_LEN, "u32")?;
        Ok(self.buf.get_u32())
    }

    pub fn get_i32(&mut self) -> ClusterResult<i32> {
        self.ensure(INT32_LEN, "i32")?;
        Ok(self.buf.get_i32())
    }

    pub fn get_i64(&mut self) -> ClusterResult<i64> {
        self.ensure(INT64_LEN, "i64")?;
        Ok(self.buf.get_i64())
    }

    pub fn get_u64(&mut self) -> ClusterResult<u64> {
        self.ensure(INT64_LEN, "u64")?;
        Ok(self.buf.get_u64())
    }

    pub fn get_string(&mut self) -> ClusterResult<String> {
        let len = self.get_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| ClusterError::decode(format!("negative string length {len}")))?;
        let raw = self.get_bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|err| ClusterError::decode(format!("string is not UTF-8: {err}")))
    }

    /// Splits off the next `len` bytes without copying.
    pub fn get_bytes(&mut self, len: usize) -> ClusterResult<Bytes> {
        self.ensure(len, "byte array")?;
        Ok(self.buf.split_to(len))
    }

    /// Reads an `int32` record count and checks it against what is left.
    ///
    /// A negative count, or one whose records cannot fit in the remaining
    /// bytes at `min_record_len` each, is rejected before any record is read.
    pub fn get_count(&mut self, min_record_len: usize, what: &str) -> ClusterResult<usize> {
        let count = self.get_i32()?;
        let count = usize::try_from(count)
            .map_err(|_| ClusterError::decode(format!("{what}: negative count {count}")))?;
        self.check_count(count, min_record_len, what)
    }

    /// Same as [`WireReader::get_count`] for formats that carry an unsigned count.
    pub fn get_u32_count(&mut self, min_record_len: usize, what: &str) -> ClusterResult<usize> {
        let count = self.get_u32()? as usize;
        self.check_count(count, min_record_len, what)
    }

    /// Same as [`WireReader::get_count`] for `uint16` counts.
    pub fn get_u16_count(&mut self, min_record_len: usize, what: &str) -> ClusterResult<usize> {
        let count = usize::from(self.get_u16()?);
        self.check_count(count, min_record_len, what)
    }

    fn check_count(&self, count: usize, min_record_len: usize, what: &str) -> ClusterResult<usize> {
        let needed = count.checked_mul(min_record_len).ok_or_else(|| {
            ClusterError::decode(format!("{what}: count {count} overflows"))
        })?;
        if needed > self.buf.remaining() {
            return Err(ClusterError::decode(format!(
                "{what}: count {count} needs at least {needed} bytes, {} remaining",
                self.buf.remaining()
            )));
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::{WireReader, WireWriter};
    use crate::error::ClusterError;

    #[test]
    fn integers_are_written_big_endian() {
        let mut writer = WireWriter::new();
        writer.put_i32(1);
        writer.put_u16(0x0102);
        writer.put_i64(-2);

        assert_eq!(
            writer.as_slice(),
            &[0, 0, 0, 1, 1, 2, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]
        );
    }

    #[test]
    fn string_is_length_prefixed() {
        let mut writer = WireWriter::new();
        writer.put_string("uid").expect("short string");

        assert_eq!(writer.as_slice(), &[0, 0, 0, 3, b'u', b'i', b'd']);

        let mut reader = WireReader::new(writer.freeze());
        assert_eq!(reader.get_string().expect("decode string"), "uid");
        assert!(!reader.has_remaining());
    }

    #[test]
    fn truncated_read_is_a_decode_error() {
        let mut reader = WireReader::from_slice(&[0, 0, 0]);
        assert!(matches!(reader.get_i32(), Err(ClusterError::Decode(_))));
    }

    #[test]
    fn negative_string_length_is_rejected() {
        let mut writer = WireWriter::new();
        writer.put_i32(-5);
        let mut reader = WireReader::new(writer.freeze());

        assert!(matches!(reader.get_string(), Err(ClusterError::Decode(_))));
    }

    #[test]
    fn count_that_cannot_fit_is_rejected() {
        let mut writer = WireWriter::new();
        writer.put_i32(1_000_000);
        writer.put_i64(7);
        let mut reader = WireReader::new(writer.freeze());

        assert!(matches!(
            reader.get_count(12, "records"),
            Err(ClusterError::Decode(_))
        ));
    }

    #[test]
    fn negative_count_is_rejected() {
        let mut writer = WireWriter::new();
        writer.put_i32(-1);
        let mut reader = WireReader::new(writer.freeze());

        assert!(matches!(
            reader.get_count(1, "records"),
            Err(ClusterError::Decode(_))
        ));
    }
}
