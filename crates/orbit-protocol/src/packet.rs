//! Length-prefixed binary packet reader and writer.
//!
//! Integers are little-endian. Strings, byte arrays and nested sub-packets
//! are all written as a `u32` byte length followed by the raw bytes, so a
//! reader can always tell a short packet from a complete one.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// Builds a packet field by field.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Writes a bool as one byte, `1` or `0`.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u8(u8::from(value))
    }

    /// Writes a little-endian `i32`.
    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        self.buf.put_i32_le(value);
        self
    }

    /// Writes a little-endian `u32`.
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32_le(value);
        self
    }

    /// Writes UTF-8 text with a `u32` length prefix.
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    /// Writes a length-prefixed byte array.
    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.put_len(value.len());
        self.buf.put_slice(value);
        self
    }

    /// Writes `sub` as a nested, length-prefixed packet.
    pub fn put_subpacket(&mut self, sub: &PacketWriter) -> &mut Self {
        self.put_bytes(&sub.buf)
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` before anything is written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finishes the packet.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    fn put_len(&mut self, len: usize) {
        // Frames are capped far below 4 GiB by every transport.
        self.buf.put_u32_le(len as u32);
    }
}

/// Reads fields out of a received packet.
///
/// Every read checks the remaining length first and fails with
/// [`ProtocolError::Truncated`] instead of panicking.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
}

impl<'a> PacketReader<'a> {
    /// Reads from the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// `true` once every byte has been read.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Any non-zero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads length-prefixed text; invalid UTF-8 is an error.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let raw = self.read_slice()?;
        Ok(std::str::from_utf8(raw)?.to_owned())
    }

    /// Reads a length-prefixed byte array.
    pub fn read_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        self.read_slice().map(Bytes::copy_from_slice)
    }

    /// Reads a nested packet. The returned reader only sees the
    /// sub-packet's bytes.
    pub fn read_subpacket(&mut self) -> Result<PacketReader<'a>, ProtocolError> {
        self.read_slice().map(PacketReader::new)
    }

    fn read_slice(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_u32()? as usize;
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_reads_fields_in_written_order() {
        let mut w = PacketWriter::new();
        w.put_u8(9).put_bool(true).put_i32(-5).put_string("héllo");
        w.put_bytes(&[1, 2, 3]);
        let bytes = w.freeze();

        let mut r = PacketReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 9);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_string().unwrap(), "héllo");
        assert_eq!(r.read_bytes().unwrap().as_ref(), &[1, 2, 3]);
        assert!(r.is_empty());
    }

    #[test]
    fn test_i32_is_little_endian() {
        let mut w = PacketWriter::new();
        w.put_i32(1);
        assert_eq!(w.freeze().as_ref(), &[1, 0, 0, 0]);
    }

    #[test]
    fn test_subpacket_reader_is_bounded() {
        let mut inner = PacketWriter::new();
        inner.put_i32(7);
        let mut outer = PacketWriter::new();
        outer.put_subpacket(&inner).put_u8(0xEE);
        let bytes = outer.freeze();

        let mut r = PacketReader::new(&bytes);
        let mut sub = r.read_subpacket().unwrap();
        assert_eq!(sub.read_i32().unwrap(), 7);
        assert!(matches!(
            sub.read_u8(),
            Err(ProtocolError::Truncated { needed: 1, available: 0 })
        ));
        assert_eq!(r.read_u8().unwrap(), 0xEE);
    }

    #[test]
    fn test_read_i32_short_buffer_is_truncated() {
        let mut r = PacketReader::new(&[1, 2]);
        assert!(matches!(
            r.read_i32(),
            Err(ProtocolError::Truncated { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_read_bytes_length_beyond_buffer_is_truncated() {
        let mut w = PacketWriter::new();
        w.put_u32(100).put_u8(1);
        let bytes = w.freeze();
        let mut r = PacketReader::new(&bytes);
        assert!(matches!(
            r.read_bytes(),
            Err(ProtocolError::Truncated { needed: 100, available: 1 })
        ));
    }

    #[test]
    fn test_read_string_invalid_utf8_errors() {
        let mut w = PacketWriter::new();
        w.put_bytes(&[0xFF, 0xFE]);
        let bytes = w.freeze();
        let mut r = PacketReader::new(&bytes);
        assert!(matches!(r.read_string(), Err(ProtocolError::InvalidUtf8(_))));
    }
}
