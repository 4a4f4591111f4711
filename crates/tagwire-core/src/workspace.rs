//! Scratch output buffer for a single serialization.

use crate::wire::varint::{encode_fixed32, encode_fixed64, encode_varint};
use crate::wire::FieldTag;
use bytes::{Bytes, BytesMut};
use std::ops::Deref;

/// Growable output buffer owned by one top-level serialize call.
///
/// Nested messages write into the same workspace through `&mut`, so any
/// growth a nested write causes is visible to the caller once it returns.
/// A workspace is never shared between independent top-level calls; reuse
/// one across calls by clearing it in between.
#[derive(Debug, Default)]
pub struct Workspace {
    buf: BytesMut,
}

impl Workspace {
    /// Creates an empty workspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty workspace with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current allocation size
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Ensures room for at least `additional` more bytes
    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    /// Discards the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Writes a single byte
    pub fn put_u8(&mut self, byte: u8) {
        self.buf.extend_from_slice(&[byte]);
    }

    /// Writes a varint
    pub fn put_varint(&mut self, value: u64) {
        encode_varint(value, &mut self.buf);
    }

    /// Writes a field tag
    pub fn put_tag(&mut self, tag: FieldTag) {
        tag.encode(&mut self.buf);
    }

    /// Writes four little-endian bytes
    pub fn put_fixed32(&mut self, value: u32) {
        encode_fixed32(value, &mut self.buf);
    }

    /// Writes eight little-endian bytes
    pub fn put_fixed64(&mut self, value: u64) {
        encode_fixed64(value, &mut self.buf);
    }

    /// Writes raw bytes
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a varint length prefix followed by `bytes`
    pub fn put_length_delimited(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as u64);
        self.put_slice(bytes);
    }

    /// Takes the written bytes out, leaving the workspace empty
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// The written bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Deref for Workspace {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::WireType;

    #[test]
    fn test_writes_in_order() {
        let mut ws = Workspace::new();
        ws.put_tag(FieldTag::new(1, WireType::Varint).unwrap());
        ws.put_varint(150);
        ws.put_tag(FieldTag::new(2, WireType::LengthDelimited).unwrap());
        ws.put_length_delimited(b"hi");
        assert_eq!(ws.as_slice(), &[0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_growth_is_visible_to_owner() {
        fn nested(ws: &mut Workspace) {
            ws.reserve(4096);
            ws.put_slice(&[0u8; 4096]);
        }

        let mut ws = Workspace::with_capacity(8);
        ws.put_u8(1);
        nested(&mut ws);
        assert_eq!(ws.len(), 4097);
        assert!(ws.capacity() >= 4097);
    }

    #[test]
    fn test_take_leaves_workspace_empty() {
        let mut ws = Workspace::new();
        ws.put_fixed32(7);
        let bytes = ws.take();
        assert_eq!(&bytes[..], &[7, 0, 0, 0]);
        assert!(ws.is_empty());
    }
}
