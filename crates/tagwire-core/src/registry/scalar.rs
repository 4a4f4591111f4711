//! Built-in scalar serializers.

use super::{DataFormat, Serializer, SerializerRegistry};
use crate::error::{Error, Result};
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::varint::{
    decode_zigzag32, decode_zigzag64, encode_zigzag32, encode_zigzag64, encoded_len_varint,
    encoded_len_varint32,
};
use crate::wire::{WireReader, WireType};
use crate::workspace::Workspace;
use bytes::Bytes;
use prost_types::field_descriptor_proto::Type;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

// Raw tags of the seconds and nanos fields, both varints
const SECONDS_TAG: u64 = 1 << 3;
const NANOS_TAG: u64 = 2 << 3;

// Raw tags of the decimal fields, all varints
const LO_TAG: u64 = 1 << 3;
const HI_TAG: u64 = 2 << 3;
const SIGN_SCALE_TAG: u64 = 3 << 3;

const SECONDS_NANOS_LAYOUT: &[(&str, i32, Type)] =
    &[("seconds", 1, Type::Int64), ("nanos", 2, Type::Int32)];

const MAX_DECIMAL_SCALE: u32 = 28;

const DECIMAL_LAYOUT: &[(&str, i32, Type)] = &[
    ("lo", 1, Type::Uint64),
    ("hi", 2, Type::Uint32),
    ("signScale", 3, Type::Uint32),
];

/// A serializer made of plain functions, one per operation.
///
/// Every built-in scalar kind and format is one `ScalarSerializer` value;
/// custom scalar kinds can be registered the same way through
/// [`SerializerRegistry::register_scalar`].
pub struct ScalarSerializer<T> {
    /// Rust type name, for diagnostics
    pub kind: &'static str,
    /// Wire type produced
    pub wire_type: WireType,
    /// Schema representation
    pub schema_type: SchemaType,
    /// Exact encoded length
    pub len: fn(&T) -> usize,
    /// Writes a value
    pub write: fn(&T, &mut Workspace),
    /// Reads a value
    pub read: fn(&mut WireReader<'_>) -> Result<T>,
    /// Omission predicate
    pub is_default: fn(&T) -> bool,
}

impl<T> fmt::Debug for ScalarSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarSerializer")
            .field("kind", &self.kind)
            .field("wire_type", &self.wire_type)
            .field("schema_type", &self.schema_type)
            .finish()
    }
}

impl<T: Send + Sync> Serializer<T> for ScalarSerializer<T> {
    fn wire_type(&self) -> WireType {
        self.wire_type
    }

    fn schema_type(&self) -> SchemaType {
        self.schema_type
    }

    fn is_default(&self, value: &T, _registry: &SerializerRegistry) -> Result<bool> {
        Ok((self.is_default)(value))
    }

    fn encoded_len(&self, value: &T, _registry: &SerializerRegistry) -> Result<usize> {
        Ok((self.len)(value))
    }

    fn write(&self, value: &T, ws: &mut Workspace, _registry: &SerializerRegistry) -> Result<()> {
        (self.write)(value, ws);
        Ok(())
    }

    fn read(&self, reader: &mut WireReader<'_>, _registry: &SerializerRegistry) -> Result<T> {
        (self.read)(reader)
    }

    fn describe(&self, _registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        match self.schema_type {
            SchemaType::Message(name @ ("Timestamp" | "Duration")) => {
                schema.add_layout(name, SECONDS_NANOS_LAYOUT)
            }
            SchemaType::Message(name @ "Decimal") => schema.add_layout(name, DECIMAL_LAYOUT),
            _ => {}
        }
        Ok(())
    }
}

/// Implements [`ProtoValue`](crate::registry::ProtoValue) for scalar types by registry lookup.
///
/// Custom scalar types registered with
/// [`SerializerRegistry::register_scalar`] can use the same macro.
#[macro_export]
macro_rules! scalar_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::registry::ProtoValue<$crate::registry::ScalarValue> for $ty {
                fn serializer(
                    registry: &$crate::registry::SerializerRegistry,
                    format: $crate::registry::DataFormat,
                ) -> ::std::result::Result<
                    ::std::sync::Arc<dyn $crate::registry::Serializer<Self>>,
                    $crate::error::ModelError,
                > {
                    registry.scalar::<$ty>(format).ok_or_else(|| {
                        $crate::error::ModelError::no_serializer(stringify!($ty), format)
                    })
                }
            }
        )*
    };
}

scalar_value!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, Vec<u8>, Bytes, SystemTime,
    Duration, Decimal,
);

fn register<T: Send + Sync + 'static>(
    registry: &mut SerializerRegistry,
    serializer: ScalarSerializer<T>,
    formats: &[DataFormat],
) {
    registry.register_scalar::<T>(Arc::new(serializer), formats);
}

/// Registers every built-in kind under every format it supports
pub(super) fn register_builtin(registry: &mut SerializerRegistry) {
    use DataFormat::{Default, FixedSize, TwosComplement, ZigZag};

    register(
        registry,
        ScalarSerializer::<bool> {
            kind: "bool",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Bool),
            len: |_| 1,
            write: |v, ws| ws.put_u8(u8::from(*v)),
            read: |r| Ok(r.read_varint()? != 0),
            is_default: |v| !*v,
        },
        &[Default],
    );

    // 32-bit signed
    register(
        registry,
        ScalarSerializer::<i32> {
            kind: "i32",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Int32),
            len: |v| encoded_len_varint32(*v as u32),
            write: |v, ws| ws.put_varint(u64::from(*v as u32)),
            read: |r| Ok(r.read_varint32()? as i32),
            is_default: |v| *v == 0,
        },
        &[Default, TwosComplement],
    );
    register(
        registry,
        ScalarSerializer::<i32> {
            kind: "i32",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Sint32),
            len: |v| encoded_len_varint32(encode_zigzag32(*v)),
            write: |v, ws| ws.put_varint(u64::from(encode_zigzag32(*v))),
            read: |r| Ok(decode_zigzag32(r.read_varint32()?)),
            is_default: |v| *v == 0,
        },
        &[ZigZag],
    );
    register(
        registry,
        ScalarSerializer::<i32> {
            kind: "i32",
            wire_type: WireType::Fixed32,
            schema_type: SchemaType::Scalar(Type::Sfixed32),
            len: |_| 4,
            write: |v, ws| ws.put_fixed32(*v as u32),
            read: |r| Ok(r.read_fixed32()? as i32),
            is_default: |v| *v == 0,
        },
        &[FixedSize],
    );

    // 64-bit signed
    register(
        registry,
        ScalarSerializer::<i64> {
            kind: "i64",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Int64),
            len: |v| encoded_len_varint(*v as u64),
            write: |v, ws| ws.put_varint(*v as u64),
            read: |r| Ok(r.read_varint()? as i64),
            is_default: |v| *v == 0,
        },
        &[Default, TwosComplement],
    );
    register(
        registry,
        ScalarSerializer::<i64> {
            kind: "i64",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Sint64),
            len: |v| encoded_len_varint(encode_zigzag64(*v)),
            write: |v, ws| ws.put_varint(encode_zigzag64(*v)),
            read: |r| Ok(decode_zigzag64(r.read_varint()?)),
            is_default: |v| *v == 0,
        },
        &[ZigZag],
    );
    register(
        registry,
        ScalarSerializer::<i64> {
            kind: "i64",
            wire_type: WireType::Fixed64,
            schema_type: SchemaType::Scalar(Type::Sfixed64),
            len: |_| 8,
            write: |v, ws| ws.put_fixed64(*v as u64),
            read: |r| Ok(r.read_fixed64()? as i64),
            is_default: |v| *v == 0,
        },
        &[FixedSize],
    );

    // Unsigned
    register(
        registry,
        ScalarSerializer::<u32> {
            kind: "u32",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Uint32),
            len: |v| encoded_len_varint32(*v),
            write: |v, ws| ws.put_varint(u64::from(*v)),
            read: |r| r.read_varint32(),
            is_default: |v| *v == 0,
        },
        &[Default],
    );
    register(
        registry,
        ScalarSerializer::<u32> {
            kind: "u32",
            wire_type: WireType::Fixed32,
            schema_type: SchemaType::Scalar(Type::Fixed32),
            len: |_| 4,
            write: |v, ws| ws.put_fixed32(*v),
            read: |r| r.read_fixed32(),
            is_default: |v| *v == 0,
        },
        &[FixedSize],
    );
    register(
        registry,
        ScalarSerializer::<u64> {
            kind: "u64",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Uint64),
            len: |v| encoded_len_varint(*v),
            write: |v, ws| ws.put_varint(*v),
            read: |r| r.read_varint(),
            is_default: |v| *v == 0,
        },
        &[Default],
    );
    register(
        registry,
        ScalarSerializer::<u64> {
            kind: "u64",
            wire_type: WireType::Fixed64,
            schema_type: SchemaType::Scalar(Type::Fixed64),
            len: |_| 8,
            write: |v, ws| ws.put_fixed64(*v),
            read: |r| r.read_fixed64(),
            is_default: |v| *v == 0,
        },
        &[FixedSize],
    );

    // Narrow integers travel as 32-bit values and are range checked on read
    register(
        registry,
        ScalarSerializer::<i8> {
            kind: "i8",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Int32),
            len: |v| encoded_len_varint32(i32::from(*v) as u32),
            write: |v, ws| ws.put_varint(u64::from(i32::from(*v) as u32)),
            read: |r| narrow_signed(r, false),
            is_default: |v| *v == 0,
        },
        &[Default, TwosComplement],
    );
    register(
        registry,
        ScalarSerializer::<i8> {
            kind: "i8",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Sint32),
            len: |v| encoded_len_varint32(encode_zigzag32(i32::from(*v))),
            write: |v, ws| ws.put_varint(u64::from(encode_zigzag32(i32::from(*v)))),
            read: |r| narrow_signed(r, true),
            is_default: |v| *v == 0,
        },
        &[ZigZag],
    );
    register(
        registry,
        ScalarSerializer::<i16> {
            kind: "i16",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Int32),
            len: |v| encoded_len_varint32(i32::from(*v) as u32),
            write: |v, ws| ws.put_varint(u64::from(i32::from(*v) as u32)),
            read: |r| narrow_signed(r, false),
            is_default: |v| *v == 0,
        },
        &[Default, TwosComplement],
    );
    register(
        registry,
        ScalarSerializer::<i16> {
            kind: "i16",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Sint32),
            len: |v| encoded_len_varint32(encode_zigzag32(i32::from(*v))),
            write: |v, ws| ws.put_varint(u64::from(encode_zigzag32(i32::from(*v)))),
            read: |r| narrow_signed(r, true),
            is_default: |v| *v == 0,
        },
        &[ZigZag],
    );
    register(
        registry,
        ScalarSerializer::<u8> {
            kind: "u8",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Uint32),
            len: |v| encoded_len_varint32(u32::from(*v)),
            write: |v, ws| ws.put_varint(u64::from(*v)),
            read: narrow_unsigned,
            is_default: |v| *v == 0,
        },
        &[Default],
    );
    register(
        registry,
        ScalarSerializer::<u16> {
            kind: "u16",
            wire_type: WireType::Varint,
            schema_type: SchemaType::Scalar(Type::Uint32),
            len: |v| encoded_len_varint32(u32::from(*v)),
            write: |v, ws| ws.put_varint(u64::from(*v)),
            read: narrow_unsigned,
            is_default: |v| *v == 0,
        },
        &[Default],
    );

    // Floating point is always fixed width
    register(
        registry,
        ScalarSerializer::<f32> {
            kind: "f32",
            wire_type: WireType::Fixed32,
            schema_type: SchemaType::Scalar(Type::Float),
            len: |_| 4,
            write: |v, ws| ws.put_fixed32(v.to_bits()),
            read: |r| Ok(f32::from_bits(r.read_fixed32()?)),
            // Bit comparison keeps -0.0 on the wire
            is_default: |v| v.to_bits() == 0,
        },
        &[Default, FixedSize],
    );
    register(
        registry,
        ScalarSerializer::<f64> {
            kind: "f64",
            wire_type: WireType::Fixed64,
            schema_type: SchemaType::Scalar(Type::Double),
            len: |_| 8,
            write: |v, ws| ws.put_fixed64(v.to_bits()),
            read: |r| Ok(f64::from_bits(r.read_fixed64()?)),
            is_default: |v| v.to_bits() == 0,
        },
        &[Default, FixedSize],
    );

    // Length-delimited
    register(
        registry,
        ScalarSerializer::<String> {
            kind: "String",
            wire_type: WireType::LengthDelimited,
            schema_type: SchemaType::Scalar(Type::String),
            len: |v| delimited_len(v.len()),
            write: |v, ws| ws.put_length_delimited(v.as_bytes()),
            read: |r| {
                let offset = r.position();
                let bytes = r.read_length_delimited()?;
                std::str::from_utf8(bytes)
                    .map(str::to_owned)
                    .map_err(|_| Error::InvalidUtf8 { offset })
            },
            is_default: |v| v.is_empty(),
        },
        &[Default],
    );
    register(
        registry,
        ScalarSerializer::<Vec<u8>> {
            kind: "Vec<u8>",
            wire_type: WireType::LengthDelimited,
            schema_type: SchemaType::Scalar(Type::Bytes),
            len: |v| delimited_len(v.len()),
            write: |v, ws| ws.put_length_delimited(v),
            read: |r| Ok(r.read_length_delimited()?.to_vec()),
            is_default: |v| v.is_empty(),
        },
        &[Default],
    );
    register(
        registry,
        ScalarSerializer::<Bytes> {
            kind: "Bytes",
            wire_type: WireType::LengthDelimited,
            schema_type: SchemaType::Scalar(Type::Bytes),
            len: |v| delimited_len(v.len()),
            write: |v, ws| ws.put_length_delimited(v),
            read: |r| Ok(Bytes::copy_from_slice(r.read_length_delimited()?)),
            is_default: |v| v.is_empty(),
        },
        &[Default],
    );

    // Date and time as {1: int64 seconds, 2: int32 nanos}
    register(
        registry,
        ScalarSerializer::<SystemTime> {
            kind: "SystemTime",
            wire_type: WireType::LengthDelimited,
            schema_type: SchemaType::Message("Timestamp"),
            len: |v| {
                let (seconds, nanos) = timestamp_parts(v);
                delimited_len(seconds_nanos_len(seconds, nanos))
            },
            write: |v, ws| {
                let (seconds, nanos) = timestamp_parts(v);
                write_seconds_nanos(seconds, nanos, ws);
            },
            read: read_timestamp,
            is_default: |v| *v == UNIX_EPOCH,
        },
        &[Default],
    );
    register(
        registry,
        ScalarSerializer::<Duration> {
            kind: "Duration",
            wire_type: WireType::LengthDelimited,
            schema_type: SchemaType::Message("Duration"),
            len: |v| {
                let (seconds, nanos) = duration_parts(v);
                delimited_len(seconds_nanos_len(seconds, nanos))
            },
            write: |v, ws| {
                let (seconds, nanos) = duration_parts(v);
                write_seconds_nanos(seconds, nanos, ws);
            },
            read: read_duration,
            is_default: |v| v.is_zero(),
        },
        &[Default],
    );

    // Decimal as {1: uint64 lo, 2: uint32 hi, 3: uint32 signScale}
    register(
        registry,
        ScalarSerializer::<Decimal> {
            kind: "Decimal",
            wire_type: WireType::LengthDelimited,
            schema_type: SchemaType::Message("Decimal"),
            len: |v| delimited_len(decimal_body_len(decimal_parts(v))),
            write: write_decimal,
            read: read_decimal,
            is_default: |v| decimal_parts(v) == (0, 0, 0),
        },
        &[Default],
    );
}

fn delimited_len(body: usize) -> usize {
    encoded_len_varint(body as u64) + body
}

fn narrow_signed<T: TryFrom<i32>>(reader: &mut WireReader<'_>, zigzag: bool) -> Result<T> {
    let offset = reader.position();
    let raw = reader.read_varint32()?;
    let value = if zigzag {
        decode_zigzag32(raw)
    } else {
        raw as i32
    };
    T::try_from(value).map_err(|_| Error::out_of_range(std::any::type_name::<T>(), value, offset))
}

fn narrow_unsigned<T: TryFrom<u64>>(reader: &mut WireReader<'_>) -> Result<T> {
    let offset = reader.position();
    let value = reader.read_varint()?;
    T::try_from(value).map_err(|_| Error::out_of_range(std::any::type_name::<T>(), value, offset))
}

/// Splits a time point into seconds since the epoch and a non-negative
/// nanosecond adjustment, the layout of the well-known Timestamp
fn timestamp_parts(time: &SystemTime) -> (i64, i32) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (
            i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
            after.subsec_nanos() as i32,
        ),
        Err(err) => {
            let before = err.duration();
            let seconds = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
            match before.subsec_nanos() {
                0 => (-seconds, 0),
                nanos => (-seconds - 1, (NANOS_PER_SECOND - i64::from(nanos)) as i32),
            }
        }
    }
}

fn duration_parts(duration: &Duration) -> (i64, i32) {
    (
        i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
        duration.subsec_nanos() as i32,
    )
}

fn seconds_nanos_len(seconds: i64, nanos: i32) -> usize {
    let mut len = 0;
    if seconds != 0 {
        len += 1 + encoded_len_varint(seconds as u64);
    }
    if nanos != 0 {
        len += 1 + encoded_len_varint32(nanos as u32);
    }
    len
}

fn write_seconds_nanos(seconds: i64, nanos: i32, ws: &mut Workspace) {
    ws.put_varint(seconds_nanos_len(seconds, nanos) as u64);
    if seconds != 0 {
        ws.put_varint(SECONDS_TAG);
        ws.put_varint(seconds as u64);
    }
    if nanos != 0 {
        ws.put_varint(NANOS_TAG);
        ws.put_varint(u64::from(nanos as u32));
    }
}

fn read_seconds_nanos(reader: &mut WireReader<'_>) -> Result<(i64, i32, usize)> {
    let offset = reader.position();
    let mut frame = reader.read_frame()?;
    let (mut seconds, mut nanos) = (0i64, 0i32);

    while let Some(tag) = frame.read_tag()? {
        match (tag.field(), tag.wire_type()) {
            (1, WireType::Varint) => seconds = frame.read_varint()? as i64,
            (2, WireType::Varint) => nanos = frame.read_varint32()? as i32,
            (1 | 2, actual) => {
                return Err(Error::WireTypeMismatch {
                    field: tag.field(),
                    expected: WireType::Varint,
                    actual,
                    offset: frame.position(),
                })
            }
            _ => frame.skip_field(tag)?,
        }
    }

    if !(0..NANOS_PER_SECOND as i32).contains(&nanos) {
        return Err(Error::out_of_range("nanos", nanos, offset));
    }
    Ok((seconds, nanos, offset))
}

fn read_timestamp(reader: &mut WireReader<'_>) -> Result<SystemTime> {
    let (seconds, nanos, offset) = read_seconds_nanos(reader)?;
    let whole = Duration::from_secs(seconds.unsigned_abs());
    let base = if seconds >= 0 {
        UNIX_EPOCH.checked_add(whole)
    } else {
        UNIX_EPOCH.checked_sub(whole)
    };
    base.and_then(|t| t.checked_add(Duration::from_nanos(nanos as u64)))
        .ok_or_else(|| Error::out_of_range("SystemTime", seconds, offset))
}

fn read_duration(reader: &mut WireReader<'_>) -> Result<Duration> {
    let (seconds, nanos, offset) = read_seconds_nanos(reader)?;
    let seconds =
        u64::try_from(seconds).map_err(|_| Error::out_of_range("Duration", seconds, offset))?;
    Ok(Duration::new(seconds, nanos as u32))
}

/// Splits a decimal into the low 64 and high 32 bits of its 96-bit
/// magnitude, and its scale shifted left by one with the sign in bit 0
fn decimal_parts(value: &Decimal) -> (u64, u32, u32) {
    let magnitude = value.mantissa().unsigned_abs();
    let sign_scale = (value.scale() << 1) | u32::from(value.is_sign_negative());
    (magnitude as u64, (magnitude >> 64) as u32, sign_scale)
}

fn decimal_body_len((lo, hi, sign_scale): (u64, u32, u32)) -> usize {
    let mut len = 0;
    if lo != 0 {
        len += 1 + encoded_len_varint(lo);
    }
    if hi != 0 {
        len += 1 + encoded_len_varint32(hi);
    }
    if sign_scale != 0 {
        len += 1 + encoded_len_varint32(sign_scale);
    }
    len
}

fn write_decimal(value: &Decimal, ws: &mut Workspace) {
    let (lo, hi, sign_scale) = decimal_parts(value);
    ws.put_varint(decimal_body_len((lo, hi, sign_scale)) as u64);
    for (tag, part) in [
        (LO_TAG, lo),
        (HI_TAG, u64::from(hi)),
        (SIGN_SCALE_TAG, u64::from(sign_scale)),
    ] {
        if part != 0 {
            ws.put_varint(tag);
            ws.put_varint(part);
        }
    }
}

fn read_decimal(reader: &mut WireReader<'_>) -> Result<Decimal> {
    let offset = reader.position();
    let mut frame = reader.read_frame()?;
    let (mut lo, mut hi, mut sign_scale) = (0u64, 0u32, 0u32);

    while let Some(tag) = frame.read_tag()? {
        match (tag.field(), tag.wire_type()) {
            (1, WireType::Varint) => lo = frame.read_varint()?,
            (2, WireType::Varint) => hi = frame.read_varint32()?,
            (3, WireType::Varint) => sign_scale = frame.read_varint32()?,
            (1..=3, actual) => {
                return Err(Error::WireTypeMismatch {
                    field: tag.field(),
                    expected: WireType::Varint,
                    actual,
                    offset: frame.position(),
                })
            }
            _ => frame.skip_field(tag)?,
        }
    }

    let scale = sign_scale >> 1;
    if scale > MAX_DECIMAL_SCALE {
        return Err(Error::out_of_range("Decimal scale", scale, offset));
    }
    Ok(Decimal::from_parts(
        lo as u32,
        (lo >> 32) as u32,
        hi,
        sign_scale & 1 == 1,
        scale,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn encode<T: 'static>(registry: &SerializerRegistry, format: DataFormat, value: &T) -> Vec<u8> {
        let serializer = registry.scalar::<T>(format).unwrap();
        let mut ws = Workspace::new();
        serializer.write(value, &mut ws, registry).unwrap();
        assert_eq!(
            serializer.encoded_len(value, registry).unwrap(),
            ws.len(),
            "length law for {}",
            std::any::type_name::<T>()
        );
        ws.as_slice().to_vec()
    }

    fn round_trip<T: PartialEq + fmt::Debug + 'static>(
        registry: &SerializerRegistry,
        format: DataFormat,
        value: T,
    ) {
        let bytes = encode(registry, format, &value);
        let serializer = registry.scalar::<T>(format).unwrap();
        let mut reader = WireReader::new(&bytes);
        assert_eq!(serializer.read(&mut reader, registry).unwrap(), value);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_integer_round_trips_and_length_law() {
        let registry = SerializerRegistry::new();
        for format in [DataFormat::Default, DataFormat::ZigZag, DataFormat::FixedSize] {
            for v in [0i32, -1, 1, i32::MIN, i32::MAX, -64, 64] {
                round_trip(&registry, format, v);
            }
            for v in [0i64, -1, 1, i64::MIN, i64::MAX] {
                round_trip(&registry, format, v);
            }
        }
        for format in [DataFormat::Default, DataFormat::FixedSize] {
            for v in [0u32, 1, u32::MAX] {
                round_trip(&registry, format, v);
            }
            for v in [0u64, 1, u64::MAX] {
                round_trip(&registry, format, v);
            }
        }
        for v in [0i8, -1, i8::MIN, i8::MAX] {
            round_trip(&registry, DataFormat::Default, v);
            round_trip(&registry, DataFormat::ZigZag, v);
        }
        for v in [0i16, -1, i16::MIN, i16::MAX] {
            round_trip(&registry, DataFormat::Default, v);
            round_trip(&registry, DataFormat::TwosComplement, v);
            round_trip(&registry, DataFormat::ZigZag, v);
        }
        for v in [0u8, 1, u8::MAX] {
            round_trip(&registry, DataFormat::Default, v);
        }
        for v in [0u16, 1, u16::MAX] {
            round_trip(&registry, DataFormat::Default, v);
        }
        round_trip(&registry, DataFormat::Default, true);
        round_trip(&registry, DataFormat::Default, false);
    }

    #[test]
    fn test_negative_default_is_max_width() {
        let registry = SerializerRegistry::new();
        assert_eq!(
            encode(&registry, DataFormat::Default, &-1i32),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
        );
        assert_eq!(encode(&registry, DataFormat::ZigZag, &-1i32), vec![0x01]);
        assert_eq!(encode(&registry, DataFormat::Default, &-1i64).len(), 10);
        assert_eq!(encode(&registry, DataFormat::Default, &i32::MIN).len(), 5);
        assert_eq!(encode(&registry, DataFormat::Default, &-1i16).len(), 5);

        for v in [-1i32, -2, -63, -64] {
            let zigzag = encode(&registry, DataFormat::ZigZag, &v).len();
            let cast = encode(&registry, DataFormat::Default, &v).len();
            assert!(zigzag < cast, "zigzag {zigzag} vs cast {cast} for {v}");
        }
    }

    #[test]
    fn test_narrow_widths() {
        let registry = SerializerRegistry::new();
        let i16_cases: [(i16, DataFormat, &[u8]); 6] = [
            (i16::MIN, DataFormat::Default, &[0x80, 0x80, 0xFE, 0xFF, 0x0F]),
            (i16::MAX, DataFormat::Default, &[0xFF, 0xFF, 0x01]),
            (i16::MIN, DataFormat::ZigZag, &[0xFF, 0xFF, 0x03]),
            (i16::MAX, DataFormat::ZigZag, &[0xFE, 0xFF, 0x03]),
            (0, DataFormat::Default, &[0x00]),
            (0, DataFormat::ZigZag, &[0x00]),
        ];
        for (value, format, expected) in i16_cases {
            assert_eq!(
                encode(&registry, format, &value),
                expected.to_vec(),
                "{value} as {format:?}"
            );
        }

        assert_eq!(encode(&registry, DataFormat::Default, &0u8), vec![0x00]);
        assert_eq!(encode(&registry, DataFormat::Default, &u8::MAX), vec![0xFF, 0x01]);
        assert_eq!(encode(&registry, DataFormat::Default, &0u16), vec![0x00]);
        assert_eq!(
            encode(&registry, DataFormat::Default, &u16::MAX),
            vec![0xFF, 0xFF, 0x03]
        );

        let serializer = registry.scalar::<u16>(DataFormat::Default).unwrap();
        assert!(serializer.is_default(&0, &registry).unwrap());
        assert!(!serializer.is_default(&1, &registry).unwrap());
    }

    #[test]
    fn test_i64_zigzag_against_default_width() {
        let registry = SerializerRegistry::new();
        // (value, default width, zigzag width)
        let cases: [(i64, usize, usize); 9] = [
            (0, 1, 1),
            (1, 1, 1),
            (-1, 10, 1),
            (63, 1, 1),
            (64, 1, 2),
            (-64, 10, 1),
            (-65, 10, 2),
            (i64::MAX, 9, 10),
            (i64::MIN, 10, 10),
        ];
        for (value, default_len, zigzag_len) in cases {
            assert_eq!(
                encode(&registry, DataFormat::Default, &value).len(),
                default_len,
                "default width of {value}"
            );
            assert_eq!(
                encode(&registry, DataFormat::ZigZag, &value).len(),
                zigzag_len,
                "zigzag width of {value}"
            );
            if value < 0 && value > -(1 << 62) {
                assert!(zigzag_len < default_len);
            }
        }
    }

    #[test]
    fn test_fixed_matches_prost() {
        let registry = SerializerRegistry::new();
        let mut expected = Vec::new();
        prost::encoding::sfixed32::encode(1, &-2, &mut expected);
        // prost writes the tag first
        assert_eq!(encode(&registry, DataFormat::FixedSize, &-2i32), expected[1..].to_vec());

        let mut expected = Vec::new();
        prost::encoding::sint64::encode(1, &-300, &mut expected);
        assert_eq!(encode(&registry, DataFormat::ZigZag, &-300i64), expected[1..].to_vec());
    }

    #[test]
    fn test_floats() {
        let registry = SerializerRegistry::new();
        for v in [0.0f32, -0.0, 1.5, f32::MAX, f32::MIN_POSITIVE, f32::INFINITY] {
            round_trip(&registry, DataFormat::Default, v);
        }
        for v in [0.0f64, -2.25, f64::MAX, f64::NEG_INFINITY] {
            round_trip(&registry, DataFormat::Default, v);
        }
        assert_eq!(
            encode(&registry, DataFormat::Default, &1.0f32),
            vec![0x00, 0x00, 0x80, 0x3F]
        );

        let serializer = registry.scalar::<f64>(DataFormat::Default).unwrap();
        assert!(serializer.is_default(&0.0, &registry).unwrap());
        assert!(!serializer.is_default(&-0.0, &registry).unwrap());
    }

    #[test]
    fn test_strings_and_bytes() {
        let registry = SerializerRegistry::new();
        round_trip(&registry, DataFormat::Default, String::new());
        round_trip(&registry, DataFormat::Default, "héllo".to_string());
        round_trip(&registry, DataFormat::Default, vec![0u8, 1, 2, 255]);
        round_trip(&registry, DataFormat::Default, Bytes::from_static(b"raw"));
        round_trip(&registry, DataFormat::Default, "x".repeat(300));
        assert_eq!(
            encode(&registry, DataFormat::Default, &"hi".to_string()),
            vec![0x02, b'h', b'i']
        );
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let registry = SerializerRegistry::new();
        let serializer = registry.scalar::<String>(DataFormat::Default).unwrap();
        let mut reader = WireReader::new(&[0x02, 0xC3, 0x28]);
        assert!(matches!(
            serializer.read(&mut reader, &registry).unwrap_err(),
            Error::InvalidUtf8 { offset: 0 }
        ));
    }

    #[test]
    fn test_narrow_out_of_range() {
        let registry = SerializerRegistry::new();
        let serializer = registry.scalar::<u8>(DataFormat::Default).unwrap();
        let mut reader = WireReader::new(&[0xAC, 0x02]);
        assert!(matches!(
            serializer.read(&mut reader, &registry).unwrap_err(),
            Error::ValueOutOfRange { value: 300, .. }
        ));

        let serializer = registry.scalar::<i8>(DataFormat::Default).unwrap();
        let mut reader = WireReader::new(&[0x80, 0x01]);
        assert!(serializer.read(&mut reader, &registry).is_err());
    }

    #[test]
    fn test_timestamps() {
        let registry = SerializerRegistry::new();
        round_trip(&registry, DataFormat::Default, UNIX_EPOCH);
        round_trip(
            &registry,
            DataFormat::Default,
            UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789),
        );
        round_trip(
            &registry,
            DataFormat::Default,
            UNIX_EPOCH - Duration::new(86_400, 250_000_000),
        );
        round_trip(&registry, DataFormat::Default, Duration::new(90, 5));
        round_trip(&registry, DataFormat::Default, Duration::ZERO);

        // epoch is the empty nested message
        assert_eq!(encode(&registry, DataFormat::Default, &UNIX_EPOCH), vec![0x00]);
    }

    #[test]
    fn test_timestamp_layout_matches_well_known_type() {
        use prost::Message as _;

        let registry = SerializerRegistry::new();
        let time = UNIX_EPOCH - Duration::new(10, 250_000_000);
        let ours = encode(&registry, DataFormat::Default, &time);

        let expected = prost_types::Timestamp {
            seconds: -11,
            nanos: 750_000_000,
        };
        assert_eq!(ours[1..].to_vec(), expected.encode_to_vec());
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let registry = SerializerRegistry::new();
        let serializer = registry.scalar::<Duration>(DataFormat::Default).unwrap();
        // seconds = -1
        let mut data = vec![0x0B, 0x08];
        data.extend_from_slice(&[0xFF; 9]);
        data.push(0x01);
        let mut reader = WireReader::new(&data);
        assert!(matches!(
            serializer.read(&mut reader, &registry).unwrap_err(),
            Error::ValueOutOfRange { kind: "Duration", .. }
        ));
    }

    #[test]
    fn test_decimals() {
        let registry = SerializerRegistry::new();
        for v in [
            Decimal::ZERO,
            Decimal::MIN,
            Decimal::MAX,
            Decimal::new(-15, 1),
            Decimal::new(12_345, 3),
            Decimal::new(0, 2),
            Decimal::new(1, 28),
        ] {
            round_trip(&registry, DataFormat::Default, v);
        }

        assert_eq!(encode(&registry, DataFormat::Default, &Decimal::ZERO), vec![0x00]);
        assert_eq!(
            encode(&registry, DataFormat::Default, &Decimal::new(15, 1)),
            vec![0x04, 0x08, 0x0F, 0x18, 0x02]
        );
        assert_eq!(
            encode(&registry, DataFormat::Default, &Decimal::new(-15, 1)),
            vec![0x04, 0x08, 0x0F, 0x18, 0x03]
        );
        // 96 set bits: ten-byte lo, five-byte hi, sign only for MIN
        assert_eq!(encode(&registry, DataFormat::Default, &Decimal::MAX).len(), 18);
        assert_eq!(encode(&registry, DataFormat::Default, &Decimal::MIN).len(), 20);

        let serializer = registry.scalar::<Decimal>(DataFormat::Default).unwrap();
        assert!(serializer.is_default(&Decimal::ZERO, &registry).unwrap());
        assert!(!serializer.is_default(&Decimal::new(0, 2), &registry).unwrap());
    }

    #[test]
    fn test_decimal_layout_matches_reference() {
        use prost::Message as _;

        #[derive(Clone, PartialEq, prost::Message)]
        struct DecimalPb {
            #[prost(uint64, tag = "1")]
            lo: u64,
            #[prost(uint32, tag = "2")]
            hi: u32,
            #[prost(uint32, tag = "3")]
            sign_scale: u32,
        }

        let registry = SerializerRegistry::new();
        let ours = encode(&registry, DataFormat::Default, &Decimal::MIN);
        let decoded = DecimalPb::decode(&ours[1..]).unwrap();
        assert_eq!(
            decoded,
            DecimalPb {
                lo: u64::MAX,
                hi: u32::MAX,
                sign_scale: 1,
            }
        );
        assert_eq!(decoded.encode_to_vec(), ours[1..].to_vec());
    }

    #[test]
    fn test_decimal_scale_above_limit_is_rejected() {
        let registry = SerializerRegistry::new();
        let serializer = registry.scalar::<Decimal>(DataFormat::Default).unwrap();
        // signScale 58 is scale 29
        let mut reader = WireReader::new(&[0x02, 0x18, 0x3A]);
        assert!(matches!(
            serializer.read(&mut reader, &registry).unwrap_err(),
            Error::ValueOutOfRange {
                kind: "Decimal scale",
                value: 29,
                ..
            }
        ));
    }
}
