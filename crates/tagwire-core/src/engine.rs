//! Top-level serialize, deserialize and merge operations.
//!
//! Every operation runs synchronously against one registry and aborts on the
//! first error. Nothing is committed to the caller's output on failure except
//! what a [`Workspace`] had already received, which callers discard.

use crate::error::Result;
use crate::framing;
use crate::model::Message;
use crate::registry::SerializerRegistry;
use crate::wire::varint::encoded_len_varint;
use crate::wire::WireReader;
use crate::workspace::Workspace;
use bytes::{BufMut, Bytes};
use std::io::{Read, Write};
use tracing::trace;

impl SerializerRegistry {
    /// Creates a reader over `data` for fresh decodes, honoring this
    /// registry's recursion limit and required-field enforcement
    pub fn reader<'a>(&self, data: &'a [u8]) -> WireReader<'a> {
        WireReader::new(data)
            .with_recursion_limit(self.config().recursion_limit)
            .with_required_check(self.config().enforce_required)
    }

    /// Creates a workspace with this registry's initial capacity
    pub fn workspace(&self) -> Workspace {
        Workspace::with_capacity(self.config().initial_capacity)
    }

    /// Number of bytes `serialize` produces for `message`
    pub fn encoded_len<M: Message>(&self, message: &M) -> Result<usize> {
        self.descriptor::<M>()?.encoded_len(message, self)
    }

    /// Appends the encoding of `message` to `ws`
    pub fn serialize<M: Message>(&self, message: &M, ws: &mut Workspace) -> Result<()> {
        let descriptor = self.descriptor::<M>()?;
        let len = descriptor.encoded_len(message, self)?;
        ws.reserve(len);
        framing::write_measured(&descriptor, message, len, ws, self)?;
        trace!("Serialized {} ({} bytes)", M::type_name(), len);
        Ok(())
    }

    /// Encodes `message` into a new vector
    pub fn serialize_to_vec<M: Message>(&self, message: &M) -> Result<Vec<u8>> {
        Ok(self.to_bytes(message)?.to_vec())
    }

    /// Encodes `message` into immutable bytes
    pub fn to_bytes<M: Message>(&self, message: &M) -> Result<Bytes> {
        let mut ws = self.workspace();
        self.serialize(message, &mut ws)?;
        Ok(ws.take())
    }

    /// Encodes `message` onto the end of `buf`
    pub fn serialize_into<M: Message>(&self, message: &M, buf: &mut impl BufMut) -> Result<()> {
        let bytes = self.to_bytes(message)?;
        buf.put_slice(&bytes);
        Ok(())
    }

    /// Encodes `message` and writes it to `writer`
    pub fn serialize_to_writer<M: Message>(&self, message: &M, mut writer: impl Write) -> Result<()> {
        let bytes = self.to_bytes(message)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Appends `message` preceded by its length as a varint, for streams
    /// of messages
    pub fn serialize_length_delimited<M: Message>(
        &self,
        message: &M,
        ws: &mut Workspace,
    ) -> Result<()> {
        let len = self.encoded_len(message)?;
        ws.reserve(encoded_len_varint(len as u64) + len);
        framing::write_nested(message, ws, self)
    }

    /// Decodes a complete input as a fresh `M`
    pub fn deserialize<M: Message>(&self, data: &[u8]) -> Result<M> {
        let mut message = M::default();
        let mut reader = self.reader(data);
        self.descriptor::<M>()?
            .merge_from(&mut message, &mut reader, self)?;
        trace!("Deserialized {} ({} bytes)", M::type_name(), data.len());
        Ok(message)
    }

    /// Reads `reader` to its end and decodes the contents as a fresh `M`
    pub fn deserialize_from_reader<M: Message>(&self, mut reader: impl Read) -> Result<M> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.deserialize(&data)
    }

    /// Reads the next length-prefixed `M` from a stream of messages.
    ///
    /// Returns `None` when `reader` is exhausted before a prefix. Required
    /// fields are checked when `reader` came from [`Self::reader`].
    pub fn deserialize_length_delimited<M: Message>(
        &self,
        reader: &mut WireReader<'_>,
    ) -> Result<Option<M>> {
        if reader.is_exhausted() {
            return Ok(None);
        }
        let mut message = M::default();
        framing::merge_nested(&mut message, reader, self)?;
        Ok(Some(message))
    }

    /// Decodes `data` onto an existing `message`.
    ///
    /// Singular fields present in `data` are overwritten, nested messages
    /// are merged, repeated fields and unknown fields are appended. Required
    /// fields are never checked, at any depth.
    pub fn merge<M: Message>(&self, message: &mut M, data: &[u8]) -> Result<()> {
        let mut reader = self.reader(data).with_required_check(false);
        self.descriptor::<M>()?.merge_from(message, &mut reader, self)?;
        trace!("Merged {} bytes into {}", data.len(), M::type_name());
        Ok(())
    }
}
