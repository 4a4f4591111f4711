//! Field codecs and the member listing builder.

use super::descriptor::{Cardinality, FieldDescriptor};
use super::{Member, Message};
use crate::error::{Error, ModelError, Result};
use crate::registry::{ProtoValue, Serializer, SerializerRegistry};
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::{FieldTag, WireReader, WireType, MAX_FIELD_NUMBER};
use crate::workspace::Workspace;
use std::sync::Arc;

/// Encodes one member of `M`, tag headers included
pub(crate) trait FieldCodec<M>: Send + Sync {
    fn wire_type(&self) -> WireType;

    fn schema_type(&self) -> SchemaType;

    fn encoded_len(&self, tag: FieldTag, message: &M, registry: &SerializerRegistry)
        -> Result<usize>;

    fn write(
        &self,
        tag: FieldTag,
        message: &M,
        ws: &mut Workspace,
        registry: &SerializerRegistry,
    ) -> Result<()>;

    /// Reads one occurrence whose tag has just been consumed
    fn merge(
        &self,
        tag: FieldTag,
        message: &mut M,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()>;

    fn describe(&self, registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()>;
}

/// A field holding one value
struct SingularField<M, T> {
    get: fn(&M) -> &T,
    get_mut: fn(&mut M) -> &mut T,
    serializer: Arc<dyn Serializer<T>>,
    always_written: bool,
}

impl<M, T> SingularField<M, T> {
    // Shared by the measuring and writing passes so they cannot disagree
    fn present(&self, value: &T, registry: &SerializerRegistry) -> Result<bool> {
        if self.always_written {
            return Ok(true);
        }
        Ok(!self.serializer.is_default(value, registry)?)
    }
}

impl<M: Send + Sync, T: Send + Sync> FieldCodec<M> for SingularField<M, T> {
    fn wire_type(&self) -> WireType {
        self.serializer.wire_type()
    }

    fn schema_type(&self) -> SchemaType {
        self.serializer.schema_type()
    }

    fn encoded_len(
        &self,
        tag: FieldTag,
        message: &M,
        registry: &SerializerRegistry,
    ) -> Result<usize> {
        let value = (self.get)(message);
        if !self.present(value, registry)? {
            return Ok(0);
        }
        Ok(tag.encoded_len() + self.serializer.encoded_len(value, registry)?)
    }

    fn write(
        &self,
        tag: FieldTag,
        message: &M,
        ws: &mut Workspace,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        let value = (self.get)(message);
        if !self.present(value, registry)? {
            return Ok(());
        }
        ws.put_tag(tag);
        self.serializer.write(value, ws, registry)
    }

    fn merge(
        &self,
        tag: FieldTag,
        message: &mut M,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        check_wire_type(tag, self.serializer.wire_type(), reader)?;
        self.serializer
            .merge((self.get_mut)(message), reader, registry)
    }

    fn describe(&self, registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        self.serializer.describe(registry, schema)
    }
}

/// A field holding a list, one tag per element
struct RepeatedField<M, T> {
    get: fn(&M) -> &Vec<T>,
    get_mut: fn(&mut M) -> &mut Vec<T>,
    serializer: Arc<dyn Serializer<T>>,
}

impl<M: Send + Sync, T: Send + Sync> FieldCodec<M> for RepeatedField<M, T> {
    fn wire_type(&self) -> WireType {
        self.serializer.wire_type()
    }

    fn schema_type(&self) -> SchemaType {
        self.serializer.schema_type()
    }

    fn encoded_len(
        &self,
        tag: FieldTag,
        message: &M,
        registry: &SerializerRegistry,
    ) -> Result<usize> {
        let values = (self.get)(message);
        let mut len = tag.encoded_len() * values.len();
        for value in values {
            len += self.serializer.encoded_len(value, registry)?;
        }
        Ok(len)
    }

    fn write(
        &self,
        tag: FieldTag,
        message: &M,
        ws: &mut Workspace,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        for value in (self.get)(message) {
            ws.put_tag(tag);
            self.serializer.write(value, ws, registry)?;
        }
        Ok(())
    }

    fn merge(
        &self,
        tag: FieldTag,
        message: &mut M,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        let element = self.serializer.wire_type();
        let values = (self.get_mut)(message);

        // Packed run of numeric elements
        if tag.wire_type() == WireType::LengthDelimited && element.is_packable() {
            let mut run = reader.read_bounded()?;
            while !run.is_exhausted() {
                values.push(self.serializer.read(&mut run, registry)?);
            }
            return Ok(());
        }

        check_wire_type(tag, element, reader)?;
        values.push(self.serializer.read(reader, registry)?);
        Ok(())
    }

    fn describe(&self, registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        self.serializer.describe(registry, schema)
    }
}

fn check_wire_type(tag: FieldTag, expected: WireType, reader: &WireReader<'_>) -> Result<()> {
    if tag.wire_type() == expected {
        return Ok(());
    }
    Err(Error::WireTypeMismatch {
        field: tag.field(),
        expected,
        actual: tag.wire_type(),
        offset: reader.position(),
    })
}

/// Collects the members of `M` into field descriptors.
///
/// Each method resolves the member's serializer immediately, so a member
/// whose type has no serializer in the requested format fails the build.
pub struct FieldsBuilder<'r, M> {
    registry: &'r SerializerRegistry,
    message: &'static str,
    fields: Vec<FieldDescriptor<M>>,
}

impl<'r, M: Message> FieldsBuilder<'r, M> {
    pub(crate) fn new(registry: &'r SerializerRegistry) -> Self {
        Self {
            registry,
            message: M::type_name(),
            fields: Vec::new(),
        }
    }

    pub(crate) fn finish(self) -> Vec<FieldDescriptor<M>> {
        self.fields
    }

    /// The registry serializers are resolved from
    pub fn registry(&self) -> &'r SerializerRegistry {
        self.registry
    }

    /// Adds a member holding one value, omitted when it equals its default
    /// unless required
    pub fn field<T, K>(
        &mut self,
        member: Member,
        get: fn(&M) -> &T,
        get_mut: fn(&mut M) -> &mut T,
    ) -> std::result::Result<&mut Self, ModelError>
    where
        T: ProtoValue<K>,
    {
        let Some(tag) = self.checked_tag(&member)? else {
            return Ok(self);
        };
        let serializer = self.resolve::<T, K>(&member)?;
        self.push(
            tag,
            &member,
            Cardinality::Singular,
            Box::new(SingularField {
                get,
                get_mut,
                serializer,
                always_written: member.is_required(),
            }),
        )?;
        Ok(self)
    }

    /// Adds a member whose presence is explicit: `None` is never written
    /// and `Some` is always written
    pub fn optional<T, K>(
        &mut self,
        member: Member,
        get: fn(&M) -> &Option<T>,
        get_mut: fn(&mut M) -> &mut Option<T>,
    ) -> std::result::Result<&mut Self, ModelError>
    where
        T: ProtoValue<K>,
    {
        let Some(tag) = self.checked_tag(&member)? else {
            return Ok(self);
        };
        let inner = self.resolve::<T, K>(&member)?;
        self.push(
            tag,
            &member,
            Cardinality::Optional,
            Box::new(SingularField {
                get,
                get_mut,
                serializer: self.registry.nullable(inner),
                always_written: false,
            }),
        )?;
        Ok(self)
    }

    /// Adds a list member
    pub fn repeated<T, K>(
        &mut self,
        member: Member,
        get: fn(&M) -> &Vec<T>,
        get_mut: fn(&mut M) -> &mut Vec<T>,
    ) -> std::result::Result<&mut Self, ModelError>
    where
        T: ProtoValue<K>,
    {
        let Some(tag) = self.checked_tag(&member)? else {
            return Ok(self);
        };
        let serializer = self.resolve::<T, K>(&member)?;
        self.push(
            tag,
            &member,
            Cardinality::Repeated,
            Box::new(RepeatedField {
                get,
                get_mut,
                serializer,
            }),
        )?;
        Ok(self)
    }

    // None for members left off the wire
    fn checked_tag(&self, member: &Member) -> std::result::Result<Option<u32>, ModelError> {
        let Some(tag) = member.declared_tag() else {
            return Ok(None);
        };
        match u32::try_from(tag) {
            Ok(tag) if (1..=MAX_FIELD_NUMBER).contains(&tag) => Ok(Some(tag)),
            _ => Err(ModelError::InvalidTag {
                message: self.message,
                member: member_name(member, tag),
                tag,
            }),
        }
    }

    fn resolve<T, K>(
        &self,
        member: &Member,
    ) -> std::result::Result<Arc<dyn Serializer<T>>, ModelError>
    where
        T: ProtoValue<K>,
    {
        T::serializer(self.registry, member.data_format()).map_err(|err| {
            err.for_member(
                self.message,
                member_name(member, member.declared_tag().unwrap_or_default()),
            )
        })
    }

    fn push(
        &mut self,
        tag: u32,
        member: &Member,
        cardinality: Cardinality,
        codec: Box<dyn FieldCodec<M>>,
    ) -> std::result::Result<(), ModelError> {
        let name = member_name(member, i64::from(tag));
        let Some(wire_tag) = FieldTag::new(tag, codec.wire_type()) else {
            return Err(ModelError::InvalidTag {
                message: self.message,
                member: name,
                tag: i64::from(tag),
            });
        };
        self.fields.push(FieldDescriptor::new(
            wire_tag,
            name,
            member.is_required(),
            cardinality,
            codec,
        ));
        Ok(())
    }
}

fn member_name(member: &Member, tag: i64) -> String {
    match member.name() {
        Some(name) => name.to_string(),
        None => format!("field_{tag}"),
    }
}
