//! Bounded sequential reader over encoded bytes.

use super::varint::{decode_fixed32, decode_fixed64, decode_varint_at};
use super::{FieldTag, WireType};
use crate::error::{Error, Result};
use tracing::trace;

/// Default maximum depth of nested frames
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// A forward-only reader over one frame of encoded data.
///
/// The reader tracks the absolute offset of every read so errors point at
/// the byte position in the original input. [`WireReader::read_frame`]
/// carves a nested frame out of the current one: the child can never read
/// past its declared length, and the parent is advanced past the whole
/// frame up front, so the parent stays aligned no matter how much of the
/// frame the child actually consumes.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
    depth: usize,
    recursion_limit: usize,
    check_required: bool,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over a complete top-level input
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            base: 0,
            depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            check_required: false,
        }
    }

    /// Sets the maximum depth of nested frames
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Makes every message decoded through this reader, and through frames
    /// carved from it, fail when a required field never appears
    pub fn with_required_check(mut self, check: bool) -> Self {
        self.check_required = check;
        self
    }

    /// True when decoded messages must carry all their required fields
    pub fn checks_required(&self) -> bool {
        self.check_required
    }

    /// Absolute offset of the next byte to be read
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Bytes left in this frame
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Total length of this frame
    pub fn frame_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes consumed from this frame so far
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// True when the frame has been read to its end
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Nesting depth of this frame (0 for the top level)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Reads a single byte
    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::truncated(self.position(), 1, 0))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a varint; running out of data anywhere is a truncation error
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = decode_varint_at(&self.data[self.pos..], self.position())?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a varint, or returns `None` when the frame is exhausted before
    /// its first byte. Truncation after the first byte is still an error.
    pub fn try_read_varint(&mut self) -> Result<Option<u64>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        self.read_varint().map(Some)
    }

    /// Reads a varint and keeps its low 32 bits
    pub fn read_varint32(&mut self) -> Result<u32> {
        Ok(self.read_varint()? as u32)
    }

    /// Reads four little-endian bytes
    pub fn read_fixed32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read_slice(4)?);
        Ok(decode_fixed32(bytes))
    }

    /// Reads eight little-endian bytes
    pub fn read_fixed64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.read_slice(8)?);
        Ok(decode_fixed64(bytes))
    }

    /// Reads exactly `len` bytes
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::truncated(self.position(), len, self.remaining()));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Reads a varint length prefix followed by that many bytes
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8]> {
        let len = self.read_length()?;
        self.read_slice(len)
    }

    /// Reads a length prefix and checks it fits in this frame
    fn read_length(&mut self) -> Result<usize> {
        let offset = self.position();
        let len = self.read_varint()?;
        match usize::try_from(len) {
            Ok(len) if len <= self.remaining() => Ok(len),
            _ => Err(Error::truncated(
                offset,
                usize::try_from(len).unwrap_or(usize::MAX),
                self.remaining(),
            )),
        }
    }

    /// Reads the next field tag, or `None` at a clean end of frame
    pub fn read_tag(&mut self) -> Result<Option<FieldTag>> {
        let offset = self.position();
        match self.try_read_varint()? {
            Some(raw) => FieldTag::from_raw(raw, offset).map(Some),
            None => Ok(None),
        }
    }

    /// Reads a length prefix and returns a reader bounded to that frame.
    ///
    /// This reader is advanced past the frame immediately.
    pub fn read_frame(&mut self) -> Result<WireReader<'a>> {
        let depth = self.depth + 1;
        if depth > self.recursion_limit {
            return Err(Error::RecursionLimit {
                limit: self.recursion_limit,
            });
        }
        self.child(depth)
    }

    /// Reads a length prefix and returns a reader bounded to that run of
    /// bytes at the current depth. Used for payloads that are not messages,
    /// such as packed repeated scalars.
    pub fn read_bounded(&mut self) -> Result<WireReader<'a>> {
        self.child(self.depth)
    }

    fn child(&mut self, depth: usize) -> Result<WireReader<'a>> {
        let len = self.read_length()?;
        let base = self.position();
        let data = self.read_slice(len)?;
        Ok(WireReader {
            data,
            pos: 0,
            base,
            depth,
            recursion_limit: self.recursion_limit,
            check_required: self.check_required,
        })
    }

    /// Skips the body of a field whose tag has just been read
    pub fn skip_field(&mut self, tag: FieldTag) -> Result<()> {
        let offset = self.position();
        match tag.wire_type() {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.read_slice(8)?;
            }
            WireType::Fixed32 => {
                self.read_slice(4)?;
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.pos += len;
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Error::UnsupportedWireType {
                    wire_type: tag.wire_type(),
                    field: tag.field(),
                    offset,
                });
            }
        }
        trace!("Skipped field {} ending at offset {}", tag, self.position());
        Ok(())
    }

    /// Bytes from absolute offset `start` up to the current position
    pub fn slice_from(&self, start: usize) -> &'a [u8] {
        let start = start.saturating_sub(self.base).min(self.pos);
        &self.data[start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_end_is_not_an_error() {
        let mut reader = WireReader::new(&[]);
        assert_eq!(reader.read_tag().unwrap(), None);
        assert_eq!(reader.try_read_varint().unwrap(), None);
    }

    #[test]
    fn test_truncated_inside_value_is_an_error() {
        let mut reader = WireReader::new(&[0x96]);
        assert!(matches!(
            reader.try_read_varint().unwrap_err(),
            Error::Truncated { offset: 0, .. }
        ));
    }

    #[test]
    fn test_fixed_reads() {
        let mut reader = WireReader::new(&[1, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 9]);
        assert_eq!(reader.read_fixed32().unwrap(), 1);
        assert_eq!(reader.read_fixed64().unwrap(), 2);
        assert!(matches!(
            reader.read_fixed32().unwrap_err(),
            Error::Truncated {
                offset: 12,
                needed: 4,
                available: 1
            }
        ));
    }

    #[test]
    fn test_frame_keeps_parent_aligned() {
        // frame of 3 bytes, then a trailing byte for the parent
        let data = [0x03, 0x08, 0x01, 0x10, 0x2A];
        let mut reader = WireReader::new(&data);
        let mut frame = reader.read_frame().unwrap();

        // consume only part of the frame
        assert_eq!(frame.read_byte().unwrap(), 0x08);
        assert_eq!(frame.position(), 2);
        assert_eq!(frame.depth(), 1);

        assert_eq!(reader.position(), 4);
        assert_eq!(reader.read_byte().unwrap(), 0x2A);
    }

    #[test]
    fn test_frame_cannot_read_past_its_length() {
        let data = [0x01, 0x08, 0x01];
        let mut reader = WireReader::new(&data);
        let mut frame = reader.read_frame().unwrap();
        frame.read_byte().unwrap();
        assert!(frame.is_exhausted());
        assert!(frame.read_byte().is_err());
        assert_eq!(frame.read_tag().unwrap(), None);
    }

    #[test]
    fn test_frame_longer_than_input_is_an_error() {
        let data = [0x05, 0x08, 0x01];
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            Error::Truncated {
                offset: 0,
                needed: 5,
                available: 2
            }
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let data = [0x02, 0x00, 0x00];
        let mut reader = WireReader::new(&data).with_recursion_limit(1);
        let mut frame = reader.read_frame().unwrap();
        assert!(matches!(
            frame.read_frame().unwrap_err(),
            Error::RecursionLimit { limit: 1 }
        ));
    }

    #[test]
    fn test_bounded_run_keeps_depth() {
        let data = [0x02, 0x01, 0x02, 0x03];
        let mut reader = WireReader::new(&data).with_recursion_limit(0);
        let mut run = reader.read_bounded().unwrap();
        assert_eq!(run.depth(), 0);
        assert_eq!(run.position(), 1);
        assert_eq!(run.read_varint().unwrap(), 1);
        assert_eq!(run.read_varint().unwrap(), 2);
        assert!(run.is_exhausted());
        assert_eq!(reader.read_byte().unwrap(), 0x03);
    }

    #[test]
    fn test_frames_inherit_required_check() {
        let data = [0x02, 0x01, 0x00];
        let mut reader = WireReader::new(&data).with_required_check(true);
        let mut frame = reader.read_frame().unwrap();
        assert!(frame.checks_required());
        assert!(frame.read_bounded().unwrap().checks_required());
        assert!(!WireReader::new(&data).checks_required());
    }

    #[test]
    fn test_skip_and_capture() {
        let data = [0x08, 0x96, 0x01, 0x12, 0x02, 0xAA, 0xBB, 0x18, 0x01];
        let mut reader = WireReader::new(&data);

        let start = reader.position();
        let tag = reader.read_tag().unwrap().unwrap();
        reader.skip_field(tag).unwrap();
        assert_eq!(reader.slice_from(start), &[0x08, 0x96, 0x01]);

        let start = reader.position();
        let tag = reader.read_tag().unwrap().unwrap();
        reader.skip_field(tag).unwrap();
        assert_eq!(reader.slice_from(start), &[0x12, 0x02, 0xAA, 0xBB]);
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_skip_length_past_end_fails() {
        let data = [0x12, 0x09, 0xAA];
        let mut reader = WireReader::new(&data);
        let tag = reader.read_tag().unwrap().unwrap();
        assert!(matches!(
            reader.skip_field(tag).unwrap_err(),
            Error::Truncated { offset: 1, .. }
        ));
    }
}
