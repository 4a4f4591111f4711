//! Error types for the tagwire-core library.
//!
//! Every failure aborts the whole serialize, deserialize or merge call that
//! raised it. Decode errors carry the absolute byte offset where the problem
//! was detected; errors raised inside a field are wrapped once with the
//! owning message and field number (see [`Error::root_cause`]).
//!
//! Type-model construction problems are reported as [`ModelError`], which is
//! cloneable so a failed build can be cached and replayed on every later use.

use crate::registry::DataFormat;
use crate::wire::{WireType, MAX_FIELD_NUMBER};
use thiserror::Error;

/// Result type alias for tagwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all encode and decode operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Input ended in the middle of a value
    #[error("truncated input at offset {offset}: needed {needed} byte(s), {available} available")]
    Truncated {
        /// Byte offset where the read started
        offset: usize,
        /// Number of bytes the read required
        needed: usize,
        /// Number of bytes left in the current frame
        available: usize,
    },

    /// A varint ran past ten bytes or past 64 bits
    #[error("varint at offset {offset} overflows 64 bits")]
    VarintOverflow {
        /// Byte offset of the first varint byte
        offset: usize,
    },

    /// Field number of zero or above the protocol maximum
    #[error("invalid field number {number} at offset {offset}: must be between 1 and {max}", max = MAX_FIELD_NUMBER)]
    InvalidFieldNumber {
        /// The decoded field number
        number: u64,
        /// Byte offset of the tag
        offset: usize,
    },

    /// Wire type bits 6 or 7
    #[error("invalid wire type {value} at offset {offset}")]
    InvalidWireType {
        /// The raw wire type bits
        value: u8,
        /// Byte offset of the tag
        offset: usize,
    },

    /// Group markers are recognized but never supported
    #[error("unsupported wire type {wire_type} for field {field} at offset {offset}")]
    UnsupportedWireType {
        /// The rejected wire type
        wire_type: WireType,
        /// Field number carrying it
        field: u32,
        /// Byte offset of the tag
        offset: usize,
    },

    /// A known field arrived with a wire type its serializer cannot read
    #[error("field {field} expects wire type {expected} but found {actual} at offset {offset}")]
    WireTypeMismatch {
        /// Field number
        field: u32,
        /// Wire type produced by the field's serializer
        expected: WireType,
        /// Wire type found in the input
        actual: WireType,
        /// Byte offset of the field value
        offset: usize,
    },

    /// Closed-world enum received a wire integer with no constant
    #[error("unknown value {value} for enum {enum_name} at offset {offset}")]
    UnknownEnumValue {
        /// Name of the enum type
        enum_name: &'static str,
        /// The unregistered wire integer
        value: i32,
        /// Byte offset of the value
        offset: usize,
    },

    /// Decoded integer does not fit the target kind
    #[error("value {value} at offset {offset} does not fit in {kind}")]
    ValueOutOfRange {
        /// Target Rust type
        kind: &'static str,
        /// The decoded value
        value: i128,
        /// Byte offset of the value
        offset: usize,
    },

    /// String field holding invalid UTF-8
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 {
        /// Byte offset of the string body
        offset: usize,
    },

    /// Nested frames deeper than the configured limit
    #[error("message nesting exceeds the recursion limit of {limit}")]
    RecursionLimit {
        /// The configured limit
        limit: usize,
    },

    /// A fresh decode never saw a required field
    #[error("required field {field} of {message} is missing")]
    MissingRequiredField {
        /// Message type name
        message: &'static str,
        /// Field number
        field: u32,
    },

    /// Measuring pass and writing pass disagree
    #[error("{message} measured {expected} byte(s) but wrote {actual}")]
    LengthMismatch {
        /// Message type name
        message: &'static str,
        /// Length from the measuring pass
        expected: usize,
        /// Bytes produced by the writing pass
        actual: usize,
    },

    /// Failure inside one field of a message
    #[error("field {field} of {message}: {source}")]
    Field {
        /// Message type name
        message: &'static str,
        /// Field number
        field: u32,
        /// The failure inside the field
        #[source]
        source: Box<Error>,
    },

    /// The type model for a message could not be built
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Failed to build a reflective descriptor from the type model
    #[error("failed to build descriptor: {0}")]
    DescriptorBuild(String),

    /// Failed to read from or write to an I/O adaptor
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new truncation error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::Truncated {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new varint overflow error
    pub fn varint_overflow(offset: usize) -> Self {
        Self::VarintOverflow { offset }
    }

    /// Creates a new out-of-range error
    pub fn out_of_range(kind: &'static str, value: impl Into<i128>, offset: usize) -> Self {
        Self::ValueOutOfRange {
            kind,
            value: value.into(),
            offset,
        }
    }

    /// Creates a new descriptor build error
    pub fn descriptor_build(msg: impl Into<String>) -> Self {
        Self::DescriptorBuild(msg.into())
    }

    /// Wraps this error with the message and field it occurred in
    pub fn in_field(self, message: &'static str, field: u32) -> Self {
        Self::Field {
            message,
            field,
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping field context wrappers
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Self::Field { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns the field numbers from the outermost message inward
    pub fn field_path(&self) -> Vec<u32> {
        let mut path = Vec::new();
        let mut current = self;
        while let Self::Field { field, source, .. } = current {
            path.push(*field);
            current = source;
        }
        path
    }

    /// Returns true if the failure comes from type-model construction
    /// rather than from the bytes being encoded or decoded
    pub fn is_model_error(&self) -> bool {
        matches!(self.root_cause(), Self::Model(_))
    }
}

/// Errors raised while building a type descriptor or enum table.
///
/// These are properties of the declared types, not of any payload, so they
/// surface on first use of a type and are replayed from the cache afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModelError {
    /// Tag outside `1..=MAX_FIELD_NUMBER`
    #[error("member `{member}` of {message} has invalid tag {tag}: must be between 1 and {max}", max = MAX_FIELD_NUMBER)]
    InvalidTag {
        /// Message type name
        message: &'static str,
        /// Member name
        member: String,
        /// The declared tag
        tag: i64,
    },

    /// Two members declare the same tag
    #[error("tag {tag} of {message} is declared by both `{first}` and `{second}`")]
    DuplicateTag {
        /// Message type name
        message: &'static str,
        /// The shared tag
        tag: u32,
        /// First member declaring it
        first: String,
        /// Second member declaring it
        second: String,
    },

    /// No serializer exists for a member's value type in the requested format
    #[error("no serializer for {value_type} in {format} format (member `{member}` of {message})")]
    NoSerializer {
        /// Message type name
        message: &'static str,
        /// Member name
        member: String,
        /// Rust value type
        value_type: &'static str,
        /// Requested format
        format: DataFormat,
    },

    /// Two enum constants resolve to the same wire integer
    #[error("enum {enum_name} maps both `{first}` and `{second}` to wire value {value}")]
    DuplicateEnumWireValue {
        /// Enum type name
        enum_name: &'static str,
        /// Shared wire integer
        value: i32,
        /// First constant
        first: &'static str,
        /// Second constant
        second: &'static str,
    },
}

impl ModelError {
    /// Creates a serializer lookup failure not yet tied to a member
    pub fn no_serializer(value_type: &'static str, format: DataFormat) -> Self {
        Self::NoSerializer {
            message: "",
            member: String::new(),
            value_type,
            format,
        }
    }

    /// Fills in the owning message and member of a lookup failure
    pub fn for_member(self, message: &'static str, member: impl Into<String>) -> Self {
        match self {
            Self::NoSerializer {
                value_type, format, ..
            } => Self::NoSerializer {
                message,
                member: member.into(),
                value_type,
                format,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::truncated(7, 4, 2);
        assert!(err.to_string().contains("offset 7"));
        assert!(err.to_string().contains("needed 4"));
    }

    #[test]
    fn test_root_cause_and_path() {
        let err = Error::varint_overflow(3).in_field("Inner", 2).in_field("Outer", 5);
        assert!(matches!(err.root_cause(), Error::VarintOverflow { offset: 3 }));
        assert_eq!(err.field_path(), vec![5, 2]);
        assert!(!err.is_model_error());
    }

    #[test]
    fn test_model_error_context() {
        let err = ModelError::no_serializer("bool", DataFormat::ZigZag).for_member("Person", "active");
        let text = err.to_string();
        assert!(text.contains("bool"));
        assert!(text.contains("`active` of Person"));
        assert!(Error::from(err).is_model_error());
    }
}
