//! Message framing.
//!
//! A nested message is written as a varint length prefix followed by its
//! body. The body length is measured first and the body written second; the
//! write is checked against the measurement so a disagreement between the two
//! passes surfaces as [`Error::LengthMismatch`] instead of a corrupt frame.
//!
//! On decode the frame is read through a bounded [`WireReader`] that cannot
//! see past the prefix's length, and the parent reader is already positioned
//! after the frame.

use crate::error::{Error, Result};
use crate::model::{Message, TypeDescriptor};
use crate::registry::SerializerRegistry;
use crate::wire::varint::encoded_len_varint;
use crate::wire::WireReader;
use crate::workspace::Workspace;

/// Length of `message` framed as a nested value, prefix included
pub fn encoded_len_nested<M: Message>(message: &M, registry: &SerializerRegistry) -> Result<usize> {
    let body = registry.descriptor::<M>()?.encoded_len(message, registry)?;
    Ok(encoded_len_varint(body as u64) + body)
}

/// Writes `message` as a length prefix and body
pub fn write_nested<M: Message>(
    message: &M,
    ws: &mut Workspace,
    registry: &SerializerRegistry,
) -> Result<()> {
    let descriptor = registry.descriptor::<M>()?;
    let body = descriptor.encoded_len(message, registry)?;
    ws.put_varint(body as u64);
    write_measured(&descriptor, message, body, ws, registry)
}

/// Writes the body of `message` and checks it is exactly `expected` bytes
pub fn write_measured<M: Message>(
    descriptor: &TypeDescriptor<M>,
    message: &M,
    expected: usize,
    ws: &mut Workspace,
    registry: &SerializerRegistry,
) -> Result<()> {
    let start = ws.len();
    descriptor.encode(message, ws, registry)?;
    let actual = ws.len() - start;
    if actual != expected {
        return Err(Error::LengthMismatch {
            message: descriptor.name(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Reads a length-prefixed frame onto `message`
pub fn merge_nested<M: Message>(
    message: &mut M,
    reader: &mut WireReader<'_>,
    registry: &SerializerRegistry,
) -> Result<()> {
    let descriptor = registry.descriptor::<M>()?;
    let mut frame = reader.read_frame()?;
    descriptor.merge_from(message, &mut frame, registry)?;
    debug_assert!(
        frame.is_exhausted(),
        "frame of {} consumed {} of {} bytes",
        descriptor.name(),
        frame.consumed(),
        frame.frame_len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message;
    use crate::model::Member;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, PartialEq)]
    struct Inner {
        value: u32,
    }

    message!(Inner {
        field value: Member::tag(1),
    });

    #[derive(Debug, Default, PartialEq)]
    struct Outer {
        inner: Inner,
        after: u32,
    }

    message!(Outer {
        field inner: Member::tag(1),
        field after: Member::tag(2),
    });

    #[test]
    fn test_empty_nested_message_is_a_zero_length_frame() {
        let registry = SerializerRegistry::new();
        let mut ws = Workspace::new();
        write_nested(&Inner::default(), &mut ws, &registry).unwrap();
        assert_eq!(ws.as_slice(), &[0x00]);
        assert_eq!(encoded_len_nested(&Inner::default(), &registry).unwrap(), 1);

        let mut reader = WireReader::new(&[0x00]);
        let mut inner = Inner { value: 9 };
        merge_nested(&mut inner, &mut reader, &registry).unwrap();
        assert_eq!(inner.value, 9);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_nested_frame_round_trip() {
        let registry = SerializerRegistry::new();
        let outer = Outer {
            inner: Inner { value: 300 },
            after: 1,
        };
        let mut ws = Workspace::new();
        write_nested(&outer, &mut ws, &registry).unwrap();
        assert_eq!(
            ws.as_slice(),
            &[0x07, 0x0A, 0x03, 0x08, 0xAC, 0x02, 0x10, 0x01]
        );

        let mut decoded = Outer::default();
        let mut reader = WireReader::new(ws.as_slice());
        merge_nested(&mut decoded, &mut reader, &registry).unwrap();
        assert_eq!(decoded, outer);
    }

    #[test]
    fn test_short_frame_is_an_error() {
        let registry = SerializerRegistry::new();
        // declares 5 bytes, only 2 remain
        let mut reader = WireReader::new(&[0x05, 0x08, 0x01]);
        let err = merge_nested(&mut Inner::default(), &mut reader, &registry).unwrap_err();
        assert!(matches!(err, Error::Truncated { needed: 5, available: 2, .. }));
    }

    #[test]
    fn test_unread_frame_tail_does_not_misalign_parent() {
        let registry = SerializerRegistry::new();
        // Outer { inner: { value: 1, unknown 9: 7 }, after: 2 }
        let data = [0x0A, 0x04, 0x08, 0x01, 0x48, 0x07, 0x10, 0x02];
        let mut reader = WireReader::new(&data);
        let mut outer = Outer::default();
        registry
            .descriptor::<Outer>()
            .unwrap()
            .merge_from(&mut outer, &mut reader, &registry)
            .unwrap();
        assert_eq!(outer.inner.value, 1);
        assert_eq!(outer.after, 2);
    }
}
