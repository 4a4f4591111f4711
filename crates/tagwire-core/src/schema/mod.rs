//! Schema description.
//!
//! The field tables of message types can be exported three ways:
//!
//! - as `.proto`-like text for diagnostics ([`SerializerRegistry::describe_schema`])
//! - as a [`prost_types::FileDescriptorSet`] ([`file_descriptor_set`])
//! - as a resolved [`prost_reflect::MessageDescriptor`] ([`message_descriptor`]),
//!   which can decode any payload the codec produces with `DynamicMessage`
//!
//! Schemas use proto2 syntax so required and optional labels and unpacked
//! repeated fields describe the wire contract exactly.

mod writer;

use crate::error::{Error, Result};
use crate::model::{Cardinality, Message};
use crate::registry::SerializerRegistry;
use prost_reflect::{DescriptorPool, MessageDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};
use std::collections::HashSet;

pub use writer::SchemaWriter;

/// How a field's values appear in a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    /// A protobuf scalar type
    Scalar(Type),
    /// A message type, by name
    Message(&'static str),
    /// An enum type, by name
    Enum(&'static str),
}

impl SchemaType {
    fn proto_type(self) -> Type {
        match self {
            SchemaType::Scalar(ty) => ty,
            SchemaType::Message(_) => Type::Message,
            SchemaType::Enum(_) => Type::Enum,
        }
    }

    fn type_name(self) -> Option<String> {
        match self {
            SchemaType::Scalar(_) => None,
            SchemaType::Message(name) | SchemaType::Enum(name) => Some(format!(".{name}")),
        }
    }
}

/// Collects the message and enum definitions reachable from a root type
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    messages: Vec<DescriptorProto>,
    enums: Vec<EnumDescriptorProto>,
    seen: HashSet<&'static str>,
}

impl SchemaBuilder {
    /// Creates an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `M` and every type its fields refer to
    pub fn add_message<M: Message>(&mut self, registry: &SerializerRegistry) -> Result<()> {
        if !self.seen.insert(M::type_name()) {
            return Ok(());
        }
        let descriptor = registry.descriptor::<M>()?;

        let field = descriptor
            .fields()
            .iter()
            .map(|field| {
                let schema_type = field.schema_type();
                let label = match field.cardinality() {
                    Cardinality::Repeated => Label::Repeated,
                    _ if field.is_required() => Label::Required,
                    _ => Label::Optional,
                };
                FieldDescriptorProto {
                    name: Some(field.name().to_string()),
                    number: Some(field.number() as i32),
                    label: Some(label as i32),
                    r#type: Some(schema_type.proto_type() as i32),
                    type_name: schema_type.type_name(),
                    ..Default::default()
                }
            })
            .collect();

        self.messages.push(DescriptorProto {
            name: Some(M::type_name().to_string()),
            field,
            ..Default::default()
        });

        for field in descriptor.fields() {
            field.describe(registry, self)?;
        }
        Ok(())
    }

    /// Adds an enum definition
    pub fn add_enum(
        &mut self,
        name: &'static str,
        values: impl IntoIterator<Item = (&'static str, i32)>,
    ) {
        if !self.seen.insert(name) {
            return;
        }
        self.enums.push(EnumDescriptorProto {
            name: Some(name.to_string()),
            value: values
                .into_iter()
                .map(|(name, number)| EnumValueDescriptorProto {
                    name: Some(name.to_string()),
                    number: Some(number),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
    }

    /// Adds a message of optional scalar fields, given as
    /// `(name, number, type)`, that a built-in scalar kind travels as
    pub fn add_layout(&mut self, name: &'static str, fields: &[(&'static str, i32, Type)]) {
        if !self.seen.insert(name) {
            return;
        }
        self.messages.push(DescriptorProto {
            name: Some(name.to_string()),
            field: fields
                .iter()
                .map(|&(field, number, ty)| FieldDescriptorProto {
                    name: Some(field.to_string()),
                    number: Some(number),
                    label: Some(Label::Optional as i32),
                    r#type: Some(ty as i32),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        });
    }

    /// Finishes the schema as a single file
    pub fn build(self, file_name: impl Into<String>) -> FileDescriptorProto {
        FileDescriptorProto {
            name: Some(file_name.into()),
            syntax: Some("proto2".to_string()),
            message_type: self.messages,
            enum_type: self.enums,
            ..Default::default()
        }
    }
}

fn file_name<M: Message>() -> String {
    format!("{}.proto", M::type_name().to_lowercase())
}

/// Describes `M` and the types it refers to as a single-file descriptor set
pub fn file_descriptor_set<M: Message>(registry: &SerializerRegistry) -> Result<FileDescriptorSet> {
    let mut builder = SchemaBuilder::new();
    builder.add_message::<M>(registry)?;
    Ok(FileDescriptorSet {
        file: vec![builder.build(file_name::<M>())],
    })
}

/// Resolves `M`'s schema into a reflective message descriptor
pub fn message_descriptor<M: Message>(registry: &SerializerRegistry) -> Result<MessageDescriptor> {
    let fds = file_descriptor_set::<M>(registry)?;
    let pool = DescriptorPool::from_file_descriptor_set(fds).map_err(|e| {
        Error::descriptor_build(format!("failed to build descriptor pool: {}", e))
    })?;
    pool.get_message_by_name(M::type_name())
        .ok_or_else(|| Error::descriptor_build(format!("message {} not found in pool", M::type_name())))
}

impl SerializerRegistry {
    /// Renders `M` and every type it refers to as `.proto`-like text
    pub fn describe_schema<M: Message>(&self) -> Result<String> {
        let mut builder = SchemaBuilder::new();
        builder.add_message::<M>(self)?;
        let file = builder.build(file_name::<M>());

        let mut output = String::new();
        SchemaWriter::new(&mut output)
            .write_file(&file)
            .map_err(|e| Error::descriptor_build(format!("failed to render schema: {}", e)))?;
        Ok(output)
    }
}
