//! Nested message serializer.

use super::{Serializer, SerializerRegistry};
use crate::error::Result;
use crate::framing;
use crate::model::Message;
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::{WireReader, WireType};
use crate::workspace::Workspace;
use std::fmt;
use std::marker::PhantomData;

/// Encodes a message as a length-prefixed nested frame.
///
/// The descriptor of `M` is looked up on every call rather than captured,
/// so building one type's descriptor never requires another's.
pub struct MessageSerializer<M>(PhantomData<fn() -> M>);

impl<M> MessageSerializer<M> {
    /// Creates the serializer
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M> Default for MessageSerializer<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for MessageSerializer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageSerializer")
            .field(&std::any::type_name::<M>())
            .finish()
    }
}

impl<M: Message> Serializer<M> for MessageSerializer<M> {
    fn wire_type(&self) -> WireType {
        WireType::LengthDelimited
    }

    fn schema_type(&self) -> SchemaType {
        SchemaType::Message(M::type_name())
    }

    // A nested message field is always written; an empty one is a single
    // zero length byte
    fn is_default(&self, _value: &M, _registry: &SerializerRegistry) -> Result<bool> {
        Ok(false)
    }

    fn encoded_len(&self, value: &M, registry: &SerializerRegistry) -> Result<usize> {
        framing::encoded_len_nested(value, registry)
    }

    fn write(&self, value: &M, ws: &mut Workspace, registry: &SerializerRegistry) -> Result<()> {
        framing::write_nested(value, ws, registry)
    }

    fn read(&self, reader: &mut WireReader<'_>, registry: &SerializerRegistry) -> Result<M> {
        let mut value = M::default();
        framing::merge_nested(&mut value, reader, registry)?;
        Ok(value)
    }

    fn merge(
        &self,
        slot: &mut M,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        framing::merge_nested(slot, reader, registry)
    }

    fn describe(&self, registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        schema.add_message::<M>(registry)
    }
}
