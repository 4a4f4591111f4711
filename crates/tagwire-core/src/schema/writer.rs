//! `.proto`-like text rendering of a collected schema.

use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto};
use std::fmt::{Result, Write};

const INDENT: &str = "  ";

/// Writes schema definitions as `.proto` source text.
///
/// Only the constructs the type model produces are rendered: top-level
/// messages with labelled fields and top-level enums.
pub struct SchemaWriter<'a, W: Write> {
    writer: &'a mut W,
    indent_level: usize,
}

impl<'a, W: Write> SchemaWriter<'a, W> {
    /// Creates a writer appending to `writer`
    pub fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            indent_level: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> Result {
        for _ in 0..self.indent_level {
            self.writer.write_str(INDENT)?;
        }
        Ok(())
    }

    /// Writes the syntax line, then every message and enum
    pub fn write_file(&mut self, file: &FileDescriptorProto) -> Result {
        writeln!(self.writer, "syntax = \"{}\";", file.syntax())?;
        writeln!(self.writer)?;

        if !file.package().is_empty() {
            writeln!(self.writer, "package {};", file.package())?;
            writeln!(self.writer)?;
        }

        for message in &file.message_type {
            self.write_message(message)?;
        }

        for enum_type in &file.enum_type {
            self.write_enum(enum_type)?;
        }

        Ok(())
    }

    /// Writes one message definition
    pub fn write_message(&mut self, message: &DescriptorProto) -> Result {
        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name())?;
        self.indent();

        for field in &message.field {
            self.write_field(field)?;
        }

        self.dedent();
        self.write_indent()?;
        writeln!(self.writer, "}}")?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Writes one field line
    pub fn write_field(&mut self, field: &FieldDescriptorProto) -> Result {
        self.write_indent()?;
        let label = match field.label() {
            Label::Repeated => "repeated",
            Label::Required => "required",
            Label::Optional => "optional",
        };
        writeln!(
            self.writer,
            "{} {} {} = {};",
            label,
            field_type_name(field),
            field.name(),
            field.number()
        )
    }

    /// Writes one enum definition
    pub fn write_enum(&mut self, enum_type: &EnumDescriptorProto) -> Result {
        self.write_indent()?;
        writeln!(self.writer, "enum {} {{", enum_type.name())?;
        self.indent();

        for value in &enum_type.value {
            self.write_indent()?;
            writeln!(self.writer, "{} = {};", value.name(), value.number())?;
        }

        self.dedent();
        self.write_indent()?;
        writeln!(self.writer, "}}")?;
        writeln!(self.writer)?;
        Ok(())
    }
}

fn field_type_name(field: &FieldDescriptorProto) -> &str {
    match field.r#type() {
        Type::Double => "double",
        Type::Float => "float",
        Type::Int64 => "int64",
        Type::Uint64 => "uint64",
        Type::Int32 => "int32",
        Type::Fixed64 => "fixed64",
        Type::Fixed32 => "fixed32",
        Type::Bool => "bool",
        Type::String => "string",
        Type::Bytes => "bytes",
        Type::Uint32 => "uint32",
        Type::Sfixed32 => "sfixed32",
        Type::Sfixed64 => "sfixed64",
        Type::Sint32 => "sint32",
        Type::Sint64 => "sint64",
        Type::Group => "group",
        // Single-file schemas refer to their types by bare name
        Type::Message | Type::Enum => field.type_name().trim_start_matches('.'),
    }
}
