//! Optional-value adapter.

use super::{Serializer, SerializerRegistry};
use crate::error::Result;
use crate::schema::{SchemaBuilder, SchemaType};
use crate::wire::{WireReader, WireType};
use crate::workspace::Workspace;
use std::sync::Arc;

/// Wraps a serializer so that `None` is never written.
///
/// Presence is explicit: `Some(default)` is written, `None` is omitted.
/// Merging onto `Some` merges into the held value.
pub struct Nullable<T> {
    inner: Arc<dyn Serializer<T>>,
}

impl<T> Nullable<T> {
    /// Wraps `inner`
    pub fn new(inner: Arc<dyn Serializer<T>>) -> Self {
        Self { inner }
    }
}

impl<T: Send + Sync> Serializer<Option<T>> for Nullable<T> {
    fn wire_type(&self) -> WireType {
        self.inner.wire_type()
    }

    fn schema_type(&self) -> SchemaType {
        self.inner.schema_type()
    }

    fn is_default(&self, value: &Option<T>, _registry: &SerializerRegistry) -> Result<bool> {
        Ok(value.is_none())
    }

    fn encoded_len(&self, value: &Option<T>, registry: &SerializerRegistry) -> Result<usize> {
        match value {
            Some(value) => self.inner.encoded_len(value, registry),
            None => Ok(0),
        }
    }

    fn write(
        &self,
        value: &Option<T>,
        ws: &mut Workspace,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        match value {
            Some(value) => self.inner.write(value, ws, registry),
            None => Ok(()),
        }
    }

    fn read(&self, reader: &mut WireReader<'_>, registry: &SerializerRegistry) -> Result<Option<T>> {
        self.inner.read(reader, registry).map(Some)
    }

    fn merge(
        &self,
        slot: &mut Option<T>,
        reader: &mut WireReader<'_>,
        registry: &SerializerRegistry,
    ) -> Result<()> {
        match slot {
            Some(value) => self.inner.merge(value, reader, registry),
            None => {
                *slot = Some(self.inner.read(reader, registry)?);
                Ok(())
            }
        }
    }

    fn describe(&self, registry: &SerializerRegistry, schema: &mut SchemaBuilder) -> Result<()> {
        self.inner.describe(registry, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DataFormat;

    #[test]
    fn test_none_is_absent_and_some_zero_is_present() {
        let registry = SerializerRegistry::new();
        let inner = registry.scalar::<i32>(DataFormat::Default).unwrap();
        let nullable = registry.nullable(inner);

        assert!(nullable.is_default(&None, &registry).unwrap());
        assert_eq!(nullable.encoded_len(&None, &registry).unwrap(), 0);

        assert!(!nullable.is_default(&Some(0), &registry).unwrap());
        let mut ws = Workspace::new();
        nullable.write(&Some(0), &mut ws, &registry).unwrap();
        assert_eq!(ws.as_slice(), &[0x00]);

        let mut reader = WireReader::new(&[0x00]);
        assert_eq!(nullable.read(&mut reader, &registry).unwrap(), Some(0));
    }
}
