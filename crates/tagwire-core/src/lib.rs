//! # tagwire-core
//!
//! A Protocol Buffers compatible wire codec driven by a runtime type model.
//!
//! Rust types describe their members once (tag, format, cardinality) and a
//! [`SerializerRegistry`] turns that description into a cached field table
//! used for every encode and decode. Payloads are byte-compatible with any
//! conforming protobuf implementation for the supported subset.
//!
//! ## Architecture
//!
//! - [`wire`]: varint, zigzag and fixed-width primitives, tags and the bounded reader
//! - [`registry`]: serializers per value type and [`DataFormat`]
//! - [`model`]: member metadata and per-type field tables
//! - [`framing`]: length-prefixed nested messages
//! - [`extension`]: unknown-field capture and replay
//! - [`schema`]: schema export as text, descriptor sets and reflective descriptors
//! - [`error`]: error types and handling
//!
//! ## Example
//!
//! ```
//! use tagwire_core::extension::ExtensionBuffer;
//! use tagwire_core::model::Member;
//! use tagwire_core::{message, proto_enum};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
//! enum Level {
//!     #[default]
//!     Info,
//!     Warn,
//! }
//!
//! proto_enum!(Level { Info, Warn });
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Event {
//!     id: u64,
//!     level: Level,
//!     tags: Vec<String>,
//!     unknown: ExtensionBuffer,
//! }
//!
//! message!(Event [extensions: unknown] {
//!     field id: Member::tag(1).required(),
//!     field level: Member::tag(2),
//!     repeated tags: Member::tag(3),
//! });
//!
//! let event = Event {
//!     id: 42,
//!     level: Level::Warn,
//!     tags: vec!["disk".to_string()],
//!     ..Default::default()
//! };
//! let bytes = tagwire_core::to_vec(&event)?;
//! let decoded: Event = tagwire_core::deserialize(&bytes)?;
//! assert_eq!(decoded, event);
//! # Ok::<(), tagwire_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - Custom scalar kinds: implement [`Serializer`] and register it with
//!   [`SerializerRegistry::register_scalar`], then use [`scalar_value!`]
//! - Custom enum wire values: `proto_enum!(E { A, B => 5 })`
//! - Forward compatibility: give a message an [`ExtensionBuffer`] and name it
//!   in `message!(T [extensions: field] { .. })`

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod config;
mod engine;
pub mod error;
pub mod extension;
pub mod framing;
pub mod model;
pub mod registry;
pub mod schema;
pub mod wire;
pub mod workspace;

// Re-export primary types for convenience
pub use config::CodecConfig;
pub use error::{Error, ModelError, Result};
pub use extension::ExtensionBuffer;
pub use model::{Member, Message};
pub use registry::{DataFormat, ProtoEnum, Serializer, SerializerRegistry};
pub use wire::{FieldTag, WireReader, WireType, MAX_FIELD_NUMBER};
pub use workspace::Workspace;

use bytes::Bytes;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Encodes `message` with the global registry
pub fn to_vec<M: Message>(message: &M) -> Result<Vec<u8>> {
    SerializerRegistry::global().serialize_to_vec(message)
}

/// Encodes `message` into immutable bytes with the global registry
pub fn to_bytes<M: Message>(message: &M) -> Result<Bytes> {
    SerializerRegistry::global().to_bytes(message)
}

/// Appends the encoding of `message` to `ws` with the global registry
pub fn serialize<M: Message>(message: &M, ws: &mut Workspace) -> Result<()> {
    SerializerRegistry::global().serialize(message, ws)
}

/// Decodes a fresh `M` with the global registry
pub fn deserialize<M: Message>(data: &[u8]) -> Result<M> {
    SerializerRegistry::global().deserialize(data)
}

/// Decodes `data` onto `message` with the global registry
pub fn merge<M: Message>(message: &mut M, data: &[u8]) -> Result<()> {
    SerializerRegistry::global().merge(message, data)
}

/// Renders the schema of `M` with the global registry
pub fn describe_schema<M: Message>() -> Result<String> {
    SerializerRegistry::global().describe_schema::<M>()
}
