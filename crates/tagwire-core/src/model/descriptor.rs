//! Resolved per-type field tables.

use super::field::{FieldCodec, FieldsBuilder};
use super::Message;
use crate::error::{Error, ModelError, Result};
use crate::registry::SerializerRegistry;
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::{FieldTag, WireReader, WireType};
use crate::workspace::Workspace;
use std::fmt;
use tracing::{debug, trace};

/// How many values a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one value, omitted when default
    Singular,
    /// Zero or one value, present exactly when set
    Optional,
    /// Any number of values, one tag each
    Repeated,
}

/// One entry of a [`TypeDescriptor`]
pub struct FieldDescriptor<M> {
    tag: FieldTag,
    name: String,
    required: bool,
    cardinality: Cardinality,
    codec: Box<dyn FieldCodec<M>>,
}

impl<M> FieldDescriptor<M> {
    pub(crate) fn new(
        tag: FieldTag,
        name: String,
        required: bool,
        cardinality: Cardinality,
        codec: Box<dyn FieldCodec<M>>,
    ) -> Self {
        Self {
            tag,
            name,
            required,
            cardinality,
            codec,
        }
    }

    /// Field number
    pub fn number(&self) -> u32 {
        self.tag.field()
    }

    /// Tag written before each value
    pub fn tag(&self) -> FieldTag {
        self.tag
    }

    /// Member name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field is required
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// How many values the field holds
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Wire type of each value
    pub fn wire_type(&self) -> WireType {
        self.codec.wire_type()
    }

    /// Schema representation of each value
    pub fn schema_type(&self) -> SchemaType {
        self.codec.schema_type()
    }

    pub(crate) fn describe(
        &self,
        registry: &SerializerRegistry,
        schema: &mut SchemaBuilder,
    ) -> Result<()> {
        self.codec.describe(registry, schema)
    }
}

impl<M> fmt::Debug for FieldDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("required", &self.required)
            .field("cardinality", &self.cardinality)
            .finish()
    }
}

/// The tag-ordered field table of one message type.
///
/// Built once per type by [`SerializerRegistry::descriptor`] and read-only
/// afterwards.
pub struct TypeDescriptor<M> {
    name: &'static str,
    fields: Vec<FieldDescriptor<M>>,
}

impl<M> fmt::Debug for TypeDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<M: Message> TypeDescriptor<M> {
    /// Collects and validates the members of `M`
    pub fn build(registry: &SerializerRegistry) -> std::result::Result<Self, ModelError> {
        let mut builder = FieldsBuilder::new(registry);
        M::describe(&mut builder)?;
        let mut fields = builder.finish();
        fields.sort_by_key(FieldDescriptor::number);

        if let Some(pair) = fields
            .windows(2)
            .find(|pair| pair[0].number() == pair[1].number())
        {
            return Err(ModelError::DuplicateTag {
                message: M::type_name(),
                tag: pair[0].number(),
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }

        debug!(
            "Built type descriptor for {} with {} fields",
            M::type_name(),
            fields.len()
        );
        Ok(Self {
            name: M::type_name(),
            fields,
        })
    }

    /// Message type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in ascending tag order
    pub fn fields(&self) -> &[FieldDescriptor<M>] {
        &self.fields
    }

    /// Finds the field numbered `number`, scanning circularly from `hint`.
    ///
    /// On a match `hint` is moved to the matching index, so a monotonic
    /// stream of tags resolves each lookup on the first comparison.
    pub fn find(&self, number: u32, hint: &mut usize) -> Option<&FieldDescriptor<M>> {
        let len = self.fields.len();
        let start = if *hint < len { *hint } else { 0 };
        (0..len)
            .map(|i| (start + i) % len)
            .find(|&idx| self.fields[idx].number() == number)
            .map(|idx| {
                *hint = idx;
                &self.fields[idx]
            })
    }

    /// Bytes `encode` produces for `message`, unknown fields included
    pub fn encoded_len(&self, message: &M, registry: &SerializerRegistry) -> Result<usize> {
        let mut len = message.extensions().map_or(0, |ext| ext.len());
        for field in &self.fields {
            len += field
                .codec
                .encoded_len(field.tag, message, registry)
                .map_err(|err| err.in_field(self.name, field.number()))?;
        }
        Ok(len)
    }

    /// Writes the fields in tag order, then any captured unknown fields
    pub fn encode(
        &self,
        message: &M,
        ws: &mut Workspace,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        for field in &self.fields {
            field
                .codec
                .write(field.tag, message, ws, registry)
                .map_err(|err| err.in_field(self.name, field.number()))?;
        }
        if let Some(ext) = message.extensions() {
            ws.put_slice(ext.as_bytes());
        }
        Ok(())
    }

    /// Reads fields until the end of the reader's frame.
    ///
    /// Unknown fields are appended to the message's extension buffer when it
    /// has one and skipped otherwise. Missing required fields are an error
    /// only when the reader was created with
    /// [`WireReader::with_required_check`].
    pub fn merge_from(
        &self,
        message: &mut M,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        let check_required = reader.checks_required();
        let mut seen = vec![false; if check_required { self.fields.len() } else { 0 }];
        let mut hint = 0;

        loop {
            let start = reader.position();
            let Some(tag) = reader.read_tag()? else {
                break;
            };
            if tag.wire_type().is_group() {
                return Err(Error::UnsupportedWireType {
                    wire_type: tag.wire_type(),
                    field: tag.field(),
                    offset: start,
                });
            }

            match self.find(tag.field(), &mut hint) {
                Some(field) => {
                    field
                        .codec
                        .merge(tag, message, reader, registry)
                        .map_err(|err| err.in_field(self.name, tag.field()))?;
                    if let Some(slot) = seen.get_mut(hint) {
                        *slot = true;
                    }
                }
                None => {
                    reader.skip_field(tag)?;
                    match message.extensions_mut() {
                        Some(ext) => {
                            ext.append_raw(reader.slice_from(start));
                            trace!(
                                "Captured unknown field {} of {} at offset {}",
                                tag,
                                self.name,
                                start
                            );
                        }
                        None => trace!(
                            "Skipped unknown field {} of {} at offset {}",
                            tag,
                            self.name,
                            start
                        ),
                    }
                }
            }
        }

        if check_required {
            if let Some(field) = self
                .fields
                .iter()
                .zip(&seen)
                .find_map(|(field, &seen)| (field.required && !seen).then_some(field))
            {
                return Err(Error::MissingRequiredField {
                    message: self.name,
                    field: field.number(),
                });
            }
        }
        Ok(())
    }
}
