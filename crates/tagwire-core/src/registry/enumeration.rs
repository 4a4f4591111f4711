//! Closed-world enum adapter.

use super::{short_type_name, Serializer, SerializerRegistry};
use crate::error::{Error, ModelError, Result};
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::varint::encoded_len_varint32;
use crate::wire::{WireReader, WireType};
use crate::workspace::Workspace;
use std::collections::HashMap;
use tracing::debug;

/// One declared constant of an enum type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumConstant<E> {
    /// The constant
    pub value: E,
    /// Declared name
    pub name: &'static str,
    /// Declaration ordinal
    pub ordinal: i32,
    /// Explicit wire integer, overriding the ordinal
    pub wire_value: Option<i32>,
}

impl<E> EnumConstant<E> {
    /// Creates a constant encoded as its ordinal
    pub const fn new(value: E, name: &'static str, ordinal: i32) -> Self {
        Self {
            value,
            name,
            ordinal,
            wire_value: None,
        }
    }

    /// Overrides the wire integer
    pub const fn with_wire_value(mut self, wire_value: i32) -> Self {
        self.wire_value = Some(wire_value);
        self
    }

    /// The integer this constant is encoded as
    pub const fn wire_value(&self) -> i32 {
        match self.wire_value {
            Some(value) => value,
            None => self.ordinal,
        }
    }
}

/// An enum type with a fixed set of constants.
///
/// Usually implemented with the [`proto_enum!`](crate::proto_enum) macro.
/// The `Default` value is the one omitted from the wire.
pub trait ProtoEnum: Copy + Eq + Default + Send + Sync + 'static {
    /// Name used in errors and schemas
    fn type_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Every declared constant
    fn constants() -> &'static [EnumConstant<Self>];
}

/// Bidirectional constant/wire-integer table for one enum type
#[derive(Debug)]
pub struct EnumSerializer<E: ProtoEnum> {
    to_wire: Vec<(E, i32)>,
    from_wire: HashMap<i32, E>,
}

impl<E: ProtoEnum> EnumSerializer<E> {
    /// Builds the table from `E`'s constants.
    ///
    /// Two constants sharing a wire integer is a model error.
    pub fn build() -> std::result::Result<Self, ModelError> {
        let constants = E::constants();
        let mut to_wire = Vec::with_capacity(constants.len());
        let mut from_wire = HashMap::with_capacity(constants.len());
        let mut names: HashMap<i32, &'static str> = HashMap::with_capacity(constants.len());

        for constant in constants {
            let wire = constant.wire_value();
            if let Some(first) = names.insert(wire, constant.name) {
                return Err(ModelError::DuplicateEnumWireValue {
                    enum_name: E::type_name(),
                    value: wire,
                    first,
                    second: constant.name,
                });
            }
            from_wire.insert(wire, constant.value);
            to_wire.push((constant.value, wire));
        }

        debug!(
            "Built enum table for {} with {} constants",
            E::type_name(),
            to_wire.len()
        );
        Ok(Self { to_wire, from_wire })
    }

    /// The wire integer for `value`
    pub fn to_wire(&self, value: E) -> Option<i32> {
        self.to_wire
            .iter()
            .find_map(|&(constant, wire)| (constant == value).then_some(wire))
    }

    /// The constant for wire integer `wire`
    pub fn from_wire(&self, wire: i32) -> Option<E> {
        self.from_wire.get(&wire).copied()
    }

    // Values outside the declared constants encode as 0
    fn wire_of(&self, value: &E) -> i32 {
        self.to_wire(*value).unwrap_or_default()
    }
}

impl<E: ProtoEnum> Serializer<E> for EnumSerializer<E> {
    fn wire_type(&self) -> WireType {
        WireType::Varint
    }

    fn schema_type(&self) -> SchemaType {
        SchemaType::Enum(E::type_name())
    }

    fn is_default(&self, value: &E, _registry: &SerializerRegistry) -> Result<bool> {
        Ok(*value == E::default())
    }

    fn encoded_len(&self, value: &E, _registry: &SerializerRegistry) -> Result<usize> {
        Ok(encoded_len_varint32(self.wire_of(value) as u32))
    }

    fn write(&self, value: &E, ws: &mut Workspace, _registry: &SerializerRegistry) -> Result<()> {
        ws.put_varint(u64::from(self.wire_of(value) as u32));
        Ok(())
    }

    fn read(&self, reader: &mut WireReader<'_>, _registry: &SerializerRegistry) -> Result<E> {
        let offset = reader.position();
        let wire = reader.read_varint32()? as i32;
        self.from_wire(wire).ok_or(Error::UnknownEnumValue {
            enum_name: E::type_name(),
            value: wire,
            offset,
        })
    }

    fn describe(&self, _registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        schema.add_enum(
            E::type_name(),
            E::constants().iter().map(|c| (c.name, c.wire_value())),
        );
        Ok(())
    }
}

/// Implements [`ProtoEnum`] for a fieldless enum.
///
/// Each variant is encoded as its discriminant unless an explicit wire
/// integer follows it:
///
/// ```
/// use tagwire_core::proto_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// enum Level {
///     #[default]
///     Low,
///     High,
/// }
///
/// proto_enum!(Level { Low, High => 5 });
/// ```
#[macro_export]
macro_rules! proto_enum {
    ($ty:ident { $($variant:ident $(=> $wire:expr)?),* $(,)? }) => {
        impl $crate::registry::ProtoEnum for $ty {
            fn type_name() -> &'static str {
                stringify!($ty)
            }

            fn constants() -> &'static [$crate::registry::EnumConstant<Self>] {
                const CONSTANTS: &[$crate::registry::EnumConstant<$ty>] = &[
                    $(
                        $crate::registry::EnumConstant::new(
                            $ty::$variant,
                            stringify!($variant),
                            $ty::$variant as i32,
                        )
                        $(.with_wire_value($wire))?
                    ),*
                ];
                CONSTANTS
            }
        }
    };
}
