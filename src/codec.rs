//! Byte-level encoding primitives.
//!
//! A [`ByteBuffer`] is a small wrapper around a growable byte array with an
//! explicit write position, together with append-style writers for
//! little-endian primitives, LEB128 varints and length-prefixed byte
//! strings. A [`ByteReader`] mirrors every writer over a borrowed slice.
//!
//! The compact structures in this crate ([`crate::rle::RleBitmap`],
//! [`crate::store::FingerprintStore`], the index blob itself) are all
//! assembled through these two types, so the byte layout is defined in one
//! place.

use crate::error::{Error, Result};

/// Maximum number of bytes a varint-encoded u32 occupies.
pub const VARINT32_MAX_BYTES: usize = 5;
/// Maximum number of bytes a varint-encoded u64 occupies.
pub const VARINT64_MAX_BYTES: usize = 10;

/// Growable byte array with an explicit write position.
///
/// The initialized region may extend past `pos`: bit-packed writers scribble
/// a full 64-bit word at a time and only then commit the logical end. The
/// serialized artifact is always `as_slice()`, i.e. the bytes up to `pos`.
#[derive(Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Logical end of the written data.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Moves the logical end. The target must lie within the initialized
    /// region (see [`ByteBuffer::ensure_size`]).
    #[inline]
    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.data.len());
        self.pos = pos;
    }

    /// The initialized region, which may extend past `pos`.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The serialized bytes written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.pos]
    }

    /// Consumes the buffer, returning the bytes up to `pos`.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.pos);
        self.data
    }

    /// Grows the initialized region to at least `size` bytes, at least
    /// doubling on each growth so repeated appends stay amortized O(1).
    pub fn ensure_size(&mut self, size: usize) {
        if size > self.data.len() {
            let new_len = size.max(self.data.len() * 2);
            self.data.resize(new_len, 0);
        }
    }

    /// Writes a little-endian u64 at an absolute position without moving
    /// `pos`. The 8 target bytes must already be initialized.
    #[inline]
    pub fn put_u64_at(&mut self, pos: usize, value: u64) {
        self.data[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn append(&mut self, bytes: &[u8]) {
        self.ensure_size(self.pos + bytes.len());
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    pub fn put_u8(&mut self, value: u8) {
        self.append(&[value]);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.append(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.append(&value.to_le_bytes());
    }

    /// LEB128-encodes a u32 (1 to 5 bytes).
    pub fn put_varint32(&mut self, value: u32) {
        self.put_varint64(u64::from(value));
    }

    /// LEB128-encodes a u64 (1 to 10 bytes).
    pub fn put_varint64(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.put_u8(byte);
                return;
            }
            self.put_u8(byte | 0x80);
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.append(bytes);
    }

    /// Writes `varint(len) || bytes`. Copes with zero bytes inside.
    pub fn put_string(&mut self, bytes: &[u8]) {
        self.put_varint64(bytes.len() as u64);
        self.put_bytes(bytes);
    }
}

/// Cursor over a borrowed byte slice, mirroring the [`ByteBuffer`] writers.
///
/// Every getter fails with [`Error::SerializationFormat`] on truncated
/// input rather than panicking, so decode paths can surface a diagnostic.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::format(format!(
                "need {n} bytes at offset {}, only {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn get_varint32(&mut self) -> Result<u32> {
        let value = self.get_varint64()?;
        u32::try_from(value)
            .map_err(|_| Error::format(format!("varint32 overflow: {value}")))
    }

    pub fn get_varint64(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        for shift in 0..VARINT64_MAX_BYTES {
            let byte = self.get_u8()?;
            value |= u64::from(byte & 0x7f) << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::format("varint64 longer than 10 bytes"))
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Reads a length-prefixed byte string written by
    /// [`ByteBuffer::put_string`]. The returned slice borrows the input.
    pub fn get_string(&mut self) -> Result<&'a [u8]> {
        let len = self.get_varint64()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.put_u8(0xab);
        buf.put_u32(0xdead_beef);
        buf.put_u64(0x0123_4567_89ab_cdef);

        let mut reader = ByteReader::new(buf.as_slice());
        assert_eq!(reader.get_u8().unwrap(), 0xab);
        assert_eq!(reader.get_u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.get_u64().unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn varints_round_trip() {
        let values = [
            0u64,
            1,
            127,
            128,
            300,
            16_383,
            16_384,
            u32::MAX as u64,
            u64::MAX,
        ];
        let mut buf = ByteBuffer::new();
        for &v in &values {
            buf.put_varint64(v);
        }
        let mut reader = ByteReader::new(buf.as_slice());
        for &v in &values {
            assert_eq!(reader.get_varint64().unwrap(), v);
        }
    }

    #[test]
    fn varint_sizes() {
        let mut buf = ByteBuffer::new();
        buf.put_varint32(127);
        assert_eq!(buf.pos(), 1);
        buf.put_varint32(128);
        assert_eq!(buf.pos(), 3);
        buf.put_varint64(u64::MAX);
        assert_eq!(buf.pos(), 3 + VARINT64_MAX_BYTES);
    }

    #[test]
    fn strings_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.put_string(b"hello");
        buf.put_string(b"");
        buf.put_string(&[0u8, 1, 0, 2]);

        let mut reader = ByteReader::new(buf.as_slice());
        assert_eq!(reader.get_string().unwrap(), b"hello");
        assert_eq!(reader.get_string().unwrap(), b"");
        assert_eq!(reader.get_string().unwrap(), &[0u8, 1, 0, 2]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut buf = ByteBuffer::new();
        buf.put_u32(42);
        let mut reader = ByteReader::new(&buf.as_slice()[..2]);
        assert!(reader.get_u32().is_err());
    }

    #[test]
    fn ensure_size_doubles() {
        let mut buf = ByteBuffer::new();
        buf.put_bytes(&[1; 10]);
        let len_before = buf.data().len();
        buf.ensure_size(len_before + 1);
        assert!(buf.data().len() >= 2 * len_before);
    }
}
