//! Unknown-field preservation.
//!
//! An extensible message owns an [`ExtensionBuffer`]. Fields its type does
//! not declare are appended to the buffer during decode exactly as they were
//! written, tag included, and the buffer is replayed verbatim after the known
//! fields on encode. A reader built against an older schema can therefore
//! pass a newer message through without losing anything.

use crate::error::{Error, Result};
use crate::registry::{DataFormat, ProtoValue, SerializerRegistry};
use crate::wire::{consume_field, FieldTag, WireReader};
use crate::workspace::Workspace;
use bytes::BytesMut;

/// Raw bytes of the unknown fields of one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionBuffer {
    bytes: BytesMut,
}

impl ExtensionBuffer {
    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of captured bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if nothing has been captured
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The captured bytes, in the order they were read
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Appends one or more complete encoded fields
    pub fn append_raw(&mut self, field: &[u8]) {
        self.bytes.extend_from_slice(field);
    }

    /// Discards everything captured
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Replaces the contents with `bytes`
    pub fn replace(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
    }

    /// Iterates the captured fields as `(tag, raw field bytes)` pairs
    pub fn fields(&self) -> ExtensionFields<'_> {
        ExtensionFields {
            data: &self.bytes,
            pos: 0,
        }
    }

    /// Decodes the captured occurrences of field `number` as a `T`.
    ///
    /// Occurrences are merged in order, so for scalars the last one wins.
    /// Since a message value may be split across occurrences, its required
    /// fields are not checked. Returns `None` if the field was never captured.
    pub fn get_value<T, K>(
        &self,
        registry: &SerializerRegistry,
        number: u32,
        format: DataFormat,
    ) -> Result<Option<T>>
    where
        T: ProtoValue<K>,
    {
        let serializer = T::serializer(registry, format)?;
        let mut value: Option<T> = None;

        for entry in self.fields() {
            let (tag, raw) = entry?;
            if tag.field() != number {
                continue;
            }
            if tag.wire_type() != serializer.wire_type() {
                return Err(Error::WireTypeMismatch {
                    field: number,
                    expected: serializer.wire_type(),
                    actual: tag.wire_type(),
                    offset: 0,
                });
            }

            let mut reader =
                WireReader::new(raw).with_recursion_limit(registry.config().recursion_limit);
            reader.read_tag()?;
            match value.as_mut() {
                Some(existing) => serializer.merge(existing, &mut reader, registry)?,
                None => value = Some(serializer.read(&mut reader, registry)?),
            }
        }
        Ok(value)
    }

    /// Encodes `value` as field `number` and appends it
    pub fn append_value<T, K>(
        &mut self,
        registry: &SerializerRegistry,
        number: u32,
        format: DataFormat,
        value: &T,
    ) -> Result<()>
    where
        T: ProtoValue<K>,
    {
        let serializer = T::serializer(registry, format)?;
        let tag = FieldTag::new(number, serializer.wire_type()).ok_or(
            Error::InvalidFieldNumber {
                number: u64::from(number),
                offset: 0,
            },
        )?;

        let len = tag.encoded_len() + serializer.encoded_len(value, registry)?;
        let mut ws = Workspace::with_capacity(len);
        ws.put_tag(tag);
        serializer.write(value, &mut ws, registry)?;
        self.append_raw(&ws);
        Ok(())
    }
}

/// Iterator over the fields of an [`ExtensionBuffer`]
#[derive(Debug, Clone)]
pub struct ExtensionFields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for ExtensionFields<'a> {
    type Item = Result<(FieldTag, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        match consume_field(&self.data[self.pos..]) {
            Ok((tag, len)) => {
                let raw = &self.data[self.pos..self.pos + len];
                self.pos += len;
                Some(Ok((tag, raw)))
            }
            Err(err) => {
                self.pos = self.data.len();
                Some(Err(err))
            }
        }
    }
}
