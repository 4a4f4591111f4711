//! Low-level protobuf wire format primitives.
//!
//! This module implements the pieces of the wire format every other layer
//! is built from: wire types, field tags, the varint family of integer
//! encodings and a bounded reader over encoded bytes.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages)
//! - 3, 4: group markers (recognized, always rejected)
//! - 5: I32 (fixed32, sfixed32, float)

mod reader;
pub mod varint;

use crate::error::{Error, Result};
use bytes::BufMut;
use std::fmt;

pub use reader::{WireReader, DEFAULT_RECURSION_LIMIT};

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width, little-endian
    Fixed64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    LengthDelimited = 2,
    /// Start group (never supported)
    StartGroup = 3,
    /// End group (never supported)
    EndGroup = 4,
    /// 32-bit fixed-width, little-endian
    Fixed32 = 5,
}

impl WireType {
    /// Decodes the low three bits of a tag
    pub fn from_bits(value: u8, offset: usize) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            _ => Err(Error::InvalidWireType { value, offset }),
        }
    }

    /// Returns true for the deprecated group markers
    pub fn is_group(self) -> bool {
        matches!(self, WireType::StartGroup | WireType::EndGroup)
    }

    /// Returns true for wire types that may appear inside a packed run
    pub fn is_packable(self) -> bool {
        matches!(self, WireType::Varint | WireType::Fixed32 | WireType::Fixed64)
    }
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        WireType::from_bits(value, 0)
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "length-delimited",
            WireType::StartGroup => "start-group",
            WireType::EndGroup => "end-group",
            WireType::Fixed32 => "fixed32",
        };
        f.write_str(name)
    }
}

/// A field number paired with the wire type of its payload.
///
/// Encoded as the single varint `(field << 3) | wire_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldTag {
    field: u32,
    wire_type: WireType,
}

impl FieldTag {
    /// Creates a tag, returning `None` for field numbers outside
    /// `1..=MAX_FIELD_NUMBER`
    pub fn new(field: u32, wire_type: WireType) -> Option<Self> {
        (1..=MAX_FIELD_NUMBER)
            .contains(&field)
            .then_some(Self { field, wire_type })
    }

    /// Splits a raw tag varint read at `offset`
    pub fn from_raw(raw: u64, offset: usize) -> Result<Self> {
        let wire_type = WireType::from_bits((raw & 0x07) as u8, offset)?;
        let number = raw >> 3;
        if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
            return Err(Error::InvalidFieldNumber { number, offset });
        }
        Ok(Self {
            field: number as u32,
            wire_type,
        })
    }

    /// The field number
    pub fn field(&self) -> u32 {
        self.field
    }

    /// The wire type
    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// The raw tag value as written on the wire
    pub fn to_raw(&self) -> u64 {
        (u64::from(self.field) << 3) | self.wire_type as u64
    }

    /// Number of bytes the tag occupies on the wire
    pub fn encoded_len(&self) -> usize {
        varint::encoded_len_varint(self.to_raw())
    }

    /// Writes the tag varint
    pub fn encode(&self, buf: &mut impl BufMut) {
        varint::encode_varint(self.to_raw(), buf);
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.field, self.wire_type)
    }
}

/// Measure a single encoded field at the start of `data`.
///
/// Returns the tag and the total bytes the field occupies, tag included.
/// Group markers are rejected.
pub fn consume_field(data: &[u8]) -> Result<(FieldTag, usize)> {
    let mut reader = WireReader::new(data);
    let tag = reader
        .read_tag()?
        .ok_or_else(|| Error::truncated(0, 1, 0))?;
    reader.skip_field(tag)?;
    Ok((tag, reader.position()))
}
