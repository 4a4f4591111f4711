//! Type model: per-type field tables built from member metadata.
//!
//! A message type implements [`Message`] by listing its members with a
//! [`FieldsBuilder`], usually through the [`message!`](crate::message)
//! macro. The registry turns that listing into a [`TypeDescriptor`] once per
//! type and caches it.
//!
//! ## Example
//!
//! ```
//! use tagwire_core::model::Member;
//! use tagwire_core::{message, SerializerRegistry};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//!     label: Option<String>,
//! }
//!
//! message!(Point {
//!     field x: Member::tag(1).zigzag(),
//!     field y: Member::tag(2).zigzag(),
//!     optional label: Member::tag(3),
//! });
//!
//! let registry = SerializerRegistry::new();
//! let point = Point { x: -1, y: 2, label: None };
//! let bytes = registry.serialize_to_vec(&point)?;
//! assert_eq!(bytes, vec![0x08, 0x01, 0x10, 0x04]);
//! assert_eq!(registry.deserialize::<Point>(&bytes)?, point);
//! # Ok::<(), tagwire_core::Error>(())
//! ```

mod descriptor;
mod field;

use crate::error::ModelError;
use crate::extension::ExtensionBuffer;
use crate::registry::{short_type_name, DataFormat};

pub use descriptor::{Cardinality, FieldDescriptor, TypeDescriptor};
pub use field::FieldsBuilder;

/// A type encoded as a protobuf message
pub trait Message: Default + Send + Sync + 'static {
    /// Name used in errors and schemas
    fn type_name() -> &'static str {
        short_type_name::<Self>()
    }

    /// Lists the members of this type
    fn describe(fields: &mut FieldsBuilder<'_, Self>) -> Result<(), ModelError>;

    /// Unknown-field storage, for extensible types
    fn extensions(&self) -> Option<&ExtensionBuffer> {
        None
    }

    /// Mutable unknown-field storage, for extensible types
    fn extensions_mut(&mut self) -> Option<&mut ExtensionBuffer> {
        None
    }
}

/// Wire metadata for one member of a message type.
///
/// Members without a tag are left out of the wire contract entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Member {
    tag: Option<i64>,
    name: Option<&'static str>,
    format: DataFormat,
    required: bool,
}

impl Member {
    /// A member carried on the wire under `tag`
    pub const fn tag(tag: i64) -> Self {
        Self {
            tag: Some(tag),
            name: None,
            format: DataFormat::Default,
            required: false,
        }
    }

    /// A member that never appears on the wire
    pub const fn untagged() -> Self {
        Self {
            tag: None,
            name: None,
            format: DataFormat::Default,
            required: false,
        }
    }

    /// Sets the member name
    pub const fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the encoding format
    pub const fn format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }

    /// Zigzag varint encoding
    pub const fn zigzag(self) -> Self {
        self.format(DataFormat::ZigZag)
    }

    /// Fixed-width encoding
    pub const fn fixed(self) -> Self {
        self.format(DataFormat::FixedSize)
    }

    /// Always written, and required on decode
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the name unless one was already given
    pub const fn or_named(mut self, name: &'static str) -> Self {
        if self.name.is_none() {
            self.name = Some(name);
        }
        self
    }

    /// The declared tag, if any
    pub const fn declared_tag(&self) -> Option<i64> {
        self.tag
    }

    /// The declared name, if any
    pub const fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// The encoding format
    pub const fn data_format(&self) -> DataFormat {
        self.format
    }

    /// Whether the member is required
    pub const fn is_required(&self) -> bool {
        self.required
    }
}

/// Implements [`Message`] for a struct from a member list.
///
/// Each entry is `field`, `optional` or `repeated`, then the struct field
/// and its [`Member`] metadata. The struct field name is used as the member
/// name unless the metadata names it. An extensible type names its
/// [`ExtensionBuffer`] field in brackets:
///
/// ```
/// use tagwire_core::extension::ExtensionBuffer;
/// use tagwire_core::model::Member;
/// use tagwire_core::message;
///
/// #[derive(Debug, Default)]
/// struct Envelope {
///     id: u64,
///     tags: Vec<String>,
///     unknown: ExtensionBuffer,
/// }
///
/// message!(Envelope [extensions: unknown] {
///     field id: Member::tag(1).required(),
///     repeated tags: Member::tag(2),
/// });
/// ```
#[macro_export]
macro_rules! message {
    ($ty:ident $([extensions: $ext:ident])? { $($kind:ident $member:ident : $meta:expr),* $(,)? }) => {
        impl $crate::model::Message for $ty {
            fn type_name() -> &'static str {
                stringify!($ty)
            }

            #[allow(unused_variables)]
            fn describe(
                fields: &mut $crate::model::FieldsBuilder<'_, Self>,
            ) -> ::std::result::Result<(), $crate::error::ModelError> {
                $(
                    fields.$kind(
                        $crate::model::Member::or_named($meta, stringify!($member)),
                        |m| &m.$member,
                        |m| &mut m.$member,
                    )?;
                )*
                Ok(())
            }

            $(
                fn extensions(&self) -> Option<&$crate::extension::ExtensionBuffer> {
                    Some(&self.$ext)
                }

                fn extensions_mut(&mut self) -> Option<&mut $crate::extension::ExtensionBuffer> {
                    Some(&mut self.$ext)
                }
            )?
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_builder() {
        const ID: Member = Member::tag(4).zigzag().required();
        assert_eq!(ID.declared_tag(), Some(4));
        assert_eq!(ID.data_format(), DataFormat::ZigZag);
        assert!(ID.is_required());

        let named = Member::tag(1).named("explicit").or_named("field");
        assert_eq!(named.name(), Some("explicit"));
        assert_eq!(Member::tag(1).or_named("field").name(), Some("field"));
        assert_eq!(Member::untagged().declared_tag(), None);
    }
}
