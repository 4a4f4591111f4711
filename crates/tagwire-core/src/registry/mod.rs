//! Serializer registry.
//!
//! The [`SerializerRegistry`] maps a value type and a [`DataFormat`] to the
//! [`Serializer`] that encodes it. Built-in scalar kinds are registered when
//! the registry is created; enum tables are built on first use of each enum
//! type; message types resolve to a framing serializer whose field table is
//! built once by the type model and cached for the registry's lifetime.
//!
//! Most callers use the process-wide [`SerializerRegistry::global`]. An
//! explicit registry can be created with a custom [`CodecConfig`] or extra
//! scalar registrations and passed around by reference.

mod enumeration;
mod message;
mod nullable;
mod scalar;

use crate::config::CodecConfig;
use crate::error::{Error, ModelError, Result};
use crate::model::{Message, TypeDescriptor};
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::{WireReader, WireType};
use crate::workspace::Workspace;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;

pub use enumeration::{EnumConstant, EnumSerializer, ProtoEnum};
pub use message::MessageSerializer;
pub use nullable::Nullable;
pub use scalar::ScalarSerializer;

/// Encoding variant requested for a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataFormat {
    /// The kind's canonical encoding
    #[default]
    Default,
    /// Zigzag varint (sint32 / sint64)
    ZigZag,
    /// Two's-complement bit pattern cast to unsigned varint
    TwosComplement,
    /// Fixed-width little-endian (fixed32 / fixed64 / sfixed32 / sfixed64)
    FixedSize,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataFormat::Default => "default",
            DataFormat::ZigZag => "zigzag",
            DataFormat::TwosComplement => "two's-complement",
            DataFormat::FixedSize => "fixed-size",
        };
        f.write_str(name)
    }
}

/// Encodes and decodes values of one type in one format.
///
/// `encoded_len` must return exactly the number of bytes `write` produces
/// for the same value. Lengths and writes never include the field tag;
/// length-delimited serializers include their own length prefix.
pub trait Serializer<T>: Send + Sync {
    /// Wire type of the values this serializer produces
    fn wire_type(&self) -> WireType;

    /// How the values appear in a described schema
    fn schema_type(&self) -> SchemaType;

    /// True if `value` is the kind's default and may be omitted
    fn is_default(&self, value: &T, registry: &SerializerRegistry) -> Result<bool>;

    /// Exact number of bytes `write` produces for `value`
    fn encoded_len(&self, value: &T, registry: &SerializerRegistry) -> Result<usize>;

    /// Writes `value`
    fn write(&self, value: &T, ws: &mut Workspace, registry: &SerializerRegistry) -> Result<()>;

    /// Reads a fresh value
    fn read(&self, reader: &mut WireReader<'_>, registry: &SerializerRegistry) -> Result<T>;

    /// Reads a value onto an existing one; scalars overwrite
    fn merge(
        &self,
        slot: &mut T,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        *slot = self.read(reader, registry)?;
        Ok(())
    }

    /// Adds any message or enum definitions this serializer refers to
    fn describe(&self, registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        let _ = (registry, schema);
        Ok(())
    }
}

/// A value type that can resolve its serializer from a registry.
///
/// `K` is a marker selecting between the scalar, message and enum families
/// so each family can be implemented generically; it is always inferred.
pub trait ProtoValue<K>: Sized + Send + Sync + 'static {
    /// Looks up or builds the serializer for this type in `format`
    fn serializer(
        registry: &SerializerRegistry,
        format: DataFormat,
    ) -> std::result::Result<Arc<dyn Serializer<Self>>, ModelError>;
}

/// Marker for types registered as scalars
#[derive(Debug)]
pub enum ScalarValue {}

/// Marker for [`Message`] types
#[derive(Debug)]
pub enum MessageValue {}

/// Marker for [`ProtoEnum`] types
#[derive(Debug)]
pub enum EnumValue {}

impl<M: Message> ProtoValue<MessageValue> for M {
    fn serializer(
        registry: &SerializerRegistry,
        format: DataFormat,
    ) -> std::result::Result<Arc<dyn Serializer<Self>>, ModelError> {
        match format {
            DataFormat::Default => Ok(registry.message::<M>()),
            other => Err(ModelError::no_serializer(M::type_name(), other)),
        }
    }
}

impl<E: ProtoEnum> ProtoValue<EnumValue> for E {
    fn serializer(
        registry: &SerializerRegistry,
        format: DataFormat,
    ) -> std::result::Result<Arc<dyn Serializer<Self>>, ModelError> {
        match format {
            DataFormat::Default | DataFormat::TwosComplement => {
                let serializer: Arc<dyn Serializer<Self>> = registry.enumeration::<E>()?;
                Ok(serializer)
            }
            other => Err(ModelError::no_serializer(E::type_name(), other)),
        }
    }
}

type ScalarKey = (TypeId, DataFormat);
type EnumEntry<E> = std::result::Result<Arc<EnumSerializer<E>>, ModelError>;
type DescriptorCell<M> = OnceLock<std::result::Result<Arc<TypeDescriptor<M>>, ModelError>>;

/// Registry of serializers keyed by value type
pub struct SerializerRegistry {
    config: CodecConfig,
    // Each value is an `Arc<dyn Serializer<T>>` for the `T` in its key.
    scalars: HashMap<ScalarKey, Box<dyn Any + Send + Sync>>,
    // Each value is an `EnumEntry<E>` for the `E` in its key.
    enums: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    // Each value is a `DescriptorCell<M>` for the `M` in its key.
    descriptors: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("config", &self.config)
            .field("scalars", &self.scalars.len())
            .finish_non_exhaustive()
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    /// Creates a registry with every built-in scalar kind and the default config
    pub fn new() -> Self {
        Self::with_config(CodecConfig::default())
    }

    /// Creates a registry with every built-in scalar kind and a custom config
    pub fn with_config(config: CodecConfig) -> Self {
        let mut registry = Self {
            config,
            scalars: HashMap::new(),
            enums: RwLock::new(HashMap::new()),
            descriptors: RwLock::new(HashMap::new()),
        };
        scalar::register_builtin(&mut registry);
        debug!(
            "Created serializer registry with {} scalar entries",
            registry.scalars.len()
        );
        registry
    }

    /// The lazily created process-wide registry
    pub fn global() -> &'static SerializerRegistry {
        static GLOBAL: OnceLock<SerializerRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SerializerRegistry::new)
    }

    /// The configuration of this registry
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Registers a scalar serializer for `T` under each of `formats`,
    /// replacing any previous entry
    pub fn register_scalar<T: 'static>(
        &mut self,
        serializer: Arc<dyn Serializer<T>>,
        formats: &[DataFormat],
    ) {
        for &format in formats {
            self.scalars
                .insert((TypeId::of::<T>(), format), Box::new(serializer.clone()));
        }
    }

    /// Looks up the scalar serializer for `T` in `format`
    pub fn scalar<T: 'static>(&self, format: DataFormat) -> Option<Arc<dyn Serializer<T>>> {
        self.scalars
            .get(&(TypeId::of::<T>(), format))
            .and_then(|entry| entry.downcast_ref::<Arc<dyn Serializer<T>>>())
            .cloned()
    }

    /// Returns the serializer for enum `E`, building its table on first use
    pub fn enumeration<E: ProtoEnum>(
        &self,
    ) -> std::result::Result<Arc<EnumSerializer<E>>, ModelError> {
        let key = TypeId::of::<E>();
        {
            let enums = self.enums.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = enums.get(&key).and_then(|e| e.downcast_ref::<EnumEntry<E>>()) {
                return entry.clone();
            }
        }

        let mut enums = self.enums.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = enums.get(&key).and_then(|e| e.downcast_ref::<EnumEntry<E>>()) {
            return entry.clone();
        }
        let entry: EnumEntry<E> = EnumSerializer::build().map(Arc::new);
        enums.insert(key, Box::new(entry.clone()));
        entry
    }

    /// Returns the framing serializer for message `M`.
    ///
    /// The serializer resolves `M`'s descriptor lazily, so mutually
    /// recursive message types can refer to each other.
    pub fn message<M: Message>(&self) -> Arc<dyn Serializer<M>> {
        Arc::new(MessageSerializer::<M>::new())
    }

    /// Wraps `inner` so that `None` is absent on the wire
    pub fn nullable<T: Send + Sync + 'static>(
        &self,
        inner: Arc<dyn Serializer<T>>,
    ) -> Arc<dyn Serializer<Option<T>>> {
        Arc::new(Nullable::new(inner))
    }

    /// Returns the type descriptor for `M`, building it exactly once.
    ///
    /// Concurrent first callers block until the single build finishes. A
    /// failed build is cached and returned to every caller.
    pub fn descriptor<M: Message>(&self) -> Result<Arc<TypeDescriptor<M>>> {
        let key = TypeId::of::<M>();
        let existing = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => self
                .descriptors
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_insert_with(|| Arc::new(DescriptorCell::<M>::new()))
                .clone(),
        };

        let Some(cell) = cell.downcast_ref::<DescriptorCell<M>>() else {
            return Err(Error::descriptor_build(format!(
                "descriptor cell for {} has the wrong type",
                M::type_name()
            )));
        };
        cell.get_or_init(|| TypeDescriptor::build(self).map(Arc::new))
            .clone()
            .map_err(Into::into)
    }

    /// Number of message types whose descriptors have been requested
    pub fn cached_descriptors(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Last path segment of a Rust type name
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = SerializerRegistry::new();
        assert!(registry.scalar::<i32>(DataFormat::Default).is_some());
        assert!(registry.scalar::<i32>(DataFormat::ZigZag).is_some());
        assert!(registry.scalar::<u64>(DataFormat::FixedSize).is_some());
        assert!(registry.scalar::<String>(DataFormat::Default).is_some());
        assert!(registry.scalar::<bool>(DataFormat::ZigZag).is_none());
        assert!(registry.scalar::<u32>(DataFormat::ZigZag).is_none());
        assert!(registry.scalar::<char>(DataFormat::Default).is_none());
    }

    #[test]
    fn test_custom_scalar_registration_replaces_entry() {
        let mut registry = SerializerRegistry::new();
        let zigzag = registry.scalar::<i32>(DataFormat::ZigZag).unwrap();
        registry.register_scalar::<i32>(zigzag, &[DataFormat::Default]);

        let serializer = registry.scalar::<i32>(DataFormat::Default).unwrap();
        assert_eq!(serializer.encoded_len(&-1, &registry).unwrap(), 1);
    }

    #[test]
    fn test_global_is_shared() {
        let a = SerializerRegistry::global() as *const _;
        let b = SerializerRegistry::global() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
        assert_eq!(short_type_name::<i32>(), "i32");
    }
}
