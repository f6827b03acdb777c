//! # senax-msgpack
//!
//! A MessagePack codec with a dynamic value model and a versionable, table-driven object serializer.
//!
//! - [`Packer`] / [`Unpacker`] speak the MessagePack byte grammar, always choosing the smallest valid header
//! - [`Unpacker`] decodes with an explicit frame stack, can be fed bytes piecemeal, and checks every claimed length
//!   against [`UnpackingLimits`] before allocating
//! - [`WireValue`] holds any decoded value, with integers and floats comparing by mathematical value
//! - [`SerializationContext`] resolves each structured type once into a [`SerializerDescriptor`] (array or map shape,
//!   per-member nil implication, constructor choice, polymorphic members) and caches it
//! - `#[derive(MessagePackObject)]` describes a type's members so the resolver can do its work
//!
//! ## Attribute Macros
//!
//! Container attributes:
//!
//! - `#[msgpack(array)]` / `#[msgpack(map)]` — Wire shape to use when no member carries an explicit key.
//! - `#[msgpack(default)]` — The type has a no-argument constructor (`Default`); also supplies the member default.
//! - `#[msgpack(custom)]` — Only the type description is derived; the type implements the pack/unpack hooks itself.
//! - `#[msgpack(type_tag = "name")]` — Implements [`TypeTagged`] so the type can travel inside a [`Polymorphic`] member.
//! - `#[msgpack(by_value)]` — Unit-only enums are written as their variant index instead of their name.
//! - `#[msgpack(constructor(new(a, b)))]` — Rebuilds the type through `Self::new(a, b)` when the resolver chooses
//!   that constructor. Repeatable. Without it the struct literal is the only constructor.
//!
//! Field attributes:
//!
//! - `#[msgpack(key = N)]` — Explicit position in array shape. Positions are part of the wire contract.
//! - `#[msgpack(key = "name")]` — Explicit key in map shape.
//! - `#[msgpack(ignore)]` — Never written; set to `Default::default()` on read.
//! - `#[msgpack(read_only)]` — Can only be set through a constructor.
//! - `#[msgpack(nil = "member_default" | "null" | "prohibit")]` — Overrides the member's nil implication.
//! - `#[msgpack(known_types("a", "b"))]` / `#[msgpack(runtime_type)]` — Polymorphism for `Polymorphic<dyn Trait>` members.
//! - `#[msgpack(extension_data)]` — An [`ExtensionData`] field that captures unknown members and writes them back.
//!
//! ## Feature Flags
//!
//! - `indexmap` — Enables `IndexMap` and `IndexSet` (insertion order is kept on the wire).
//! - `chrono` — Enables `chrono::DateTime<Utc>` as the timestamp extension type (-1).
//! - `uuid` — Enables `uuid::Uuid` as 16-byte binary.
//! - `serde_json` — Enables `serde_json::Value` and conversions to and from [`WireValue`].
//! - `smol_str` — Enables `smol_str::SmolStr`.

pub mod context;
pub mod core;
pub mod ext;
mod features;
pub mod object;
pub mod packer;
pub mod polymorphic;
pub mod resolver;
pub mod serializer;
pub mod unpacker;
pub mod value;

use bytes::Bytes;
use std::io::{Read, Write};

pub use context::{ConcreteTypes, ContextOptions, SerializationContext};
pub use ext::{ExtObject, Timestamp, TIMESTAMP_TYPE_CODE};
pub use object::{ExtensionData, MessagePackObject};
pub use packer::{CompatibilityMode, LengthClass, Packer};
pub use polymorphic::{Polymorphic, TypeTagged};
pub use resolver::{
    AbstractRef, Construction, ConstructorInfo, DescriptorKind, MemberBinding, MemberInfo,
    MemberKey, NilImplication, ObjectLayout, ObjectRef, Polymorphism, SerializationMethod,
    SerializerDescriptor, ShapeKind, TypeCategory, TypeFacts, TypeShape, WireShape,
};
pub use senax_msgpack_derive::MessagePackObject;
pub use serializer::{MessagePackDeserialize, MessagePackSerialize};
pub use unpacker::{Header, StreamUnpacker, Unpacker, UnpackingLimits, ValidationLevel};
pub use value::{StrEncoding, WireString, WireValue};

/// Errors that can occur while packing, unpacking, or resolving serializers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value could not be written, or a claimed length or magnitude is out of bounds.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The input could not be decoded (truncated, malformed, or not what the caller asked for).
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A type could not be mapped onto the wire. Raised once per type and context.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when more input may complete the current item. This is the only retryable condition.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Error::Decode(DecodeError::Truncated { .. }))
    }

    /// True for errors raised by serializer resolution.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Error::Resolution(_))
    }
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The length-prefixed construct a length limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    Array,
    Map,
    Str,
    Bin,
    Ext,
}

impl std::fmt::Display for LengthKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LengthKind::Array => "array",
            LengthKind::Map => "map",
            LengthKind::Str => "str",
            LengthKind::Bin => "bin",
            LengthKind::Ext => "ext",
        })
    }
}

/// Encoding-level errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Length class holds at most {available} but {required} is required")]
    ReservedLength { required: usize, available: usize },
    #[error("Claimed {kind} length {claimed} exceeds the limit of {limit}")]
    LengthExceedsLimit {
        kind: LengthKind,
        claimed: u64,
        limit: u64,
    },
    #[error("Value {value} does not fit in {target}")]
    Overflow { target: &'static str, value: String },
    #[error("Nesting depth {depth} exceeds the limit of {limit}")]
    DepthExceedsLimit { depth: usize, limit: usize },
    #[error("{what} cannot be encoded in {mode:?} compatibility mode")]
    IncompatibleEncoding {
        what: &'static str,
        mode: CompatibilityMode,
    },
    #[error("Member '{member}' of {type_name} is nil but its nil implication is Prohibit")]
    NilProhibited {
        type_name: &'static str,
        member: &'static str,
    },
}

/// Decoding errors. Only [`DecodeError::Truncated`] is retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Not enough data: {needed} more byte(s) required")]
    Truncated { needed: usize },
    #[error("Malformed MessagePack data: {0}")]
    Malformed(String),
    #[error("Expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Member '{member}' of {type_name} is nil or missing but its nil implication is Prohibit")]
    UnexpectedNil {
        type_name: &'static str,
        member: &'static str,
    },
    #[error("Unknown type tag '{tag}' for {abstract_type}")]
    UnknownTypeTag {
        abstract_type: &'static str,
        tag: String,
    },
    #[error("Window {offset}+{len} is outside of a {available} byte buffer")]
    WindowOutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },
}

/// Serializer resolution errors. Cached as permanent failures for the type within a context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("{type_name} has {candidates} constructors matching its members")]
    AmbiguousConstructor {
        type_name: &'static str,
        candidates: usize,
    },
    #[error("{type_name} cannot be constructed: {reason}")]
    Unconstructable {
        type_name: &'static str,
        reason: String,
    },
    #[error("Member '{member}' of {type_name} has an abstract type with no default, known types, or runtime type tag")]
    UnresolvableAbstractType {
        type_name: &'static str,
        member: &'static str,
    },
    #[error("Member '{member}' of {type_name} is not nullable, so its nil implication cannot be Null")]
    InvalidNilImplication {
        type_name: &'static str,
        member: &'static str,
    },
    #[error("{type_name} mixes positional and named member keys")]
    MixedMemberKeys { type_name: &'static str },
    #[error("Member '{member}' of {type_name} has no explicit order while other members do")]
    PartialMemberOrder {
        type_name: &'static str,
        member: &'static str,
    },
    #[error("Member key {key} is used more than once in {type_name}")]
    DuplicateMemberKey { type_name: &'static str, key: String },
}

/// Packs a [`WireValue`] into bytes using the modern grammar.
///
/// # Example
/// ```rust
/// use senax_msgpack::{pack, unpack, WireValue};
///
/// let value = WireValue::Array(vec![WireValue::from(1u8), WireValue::from("two")]);
/// let bytes = pack(&value).unwrap();
/// assert_eq!(&bytes[..], &[0x92, 0x01, 0xa3, b't', b'w', b'o']);
/// assert_eq!(unpack(&bytes).unwrap(), value);
/// ```
pub fn pack(value: &WireValue) -> Result<Bytes> {
    let mut packer = Packer::new();
    packer.pack_value(value)?;
    Ok(packer.into_bytes())
}

/// Packs a [`WireValue`] into a writer. Returns the number of bytes written.
pub fn pack_to_writer<W: Write>(writer: &mut W, value: &WireValue) -> Result<usize> {
    let bytes = pack(value)?;
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Unpacks exactly one [`WireValue`] from the start of `bytes`.
pub fn unpack(bytes: &[u8]) -> Result<WireValue> {
    Unpacker::from_slice(bytes).next_value()
}

/// Unpacks one [`WireValue`] from the `len` bytes starting at `offset`.
pub fn unpack_window(bytes: &[u8], offset: usize, len: usize) -> Result<WireValue> {
    Unpacker::from_window(bytes, offset, len)?.next_value()
}

/// Unpacks one [`WireValue`] from a blocking reader.
pub fn unpack_from_reader<R: Read>(reader: R) -> Result<WireValue> {
    StreamUnpacker::new(reader).require_value()
}

/// Serializes a value with the shared default context.
///
/// # Example
/// ```rust
/// use senax_msgpack::{serialize, deserialize, MessagePackObject};
///
/// #[derive(MessagePackObject, PartialEq, Debug)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
///
/// let bytes = serialize(&Point { x: 1, y: -2 }).unwrap();
/// assert_eq!(&bytes[..], &[0x92, 0x01, 0xfe]);
/// let point: Point = deserialize(&bytes).unwrap();
/// assert_eq!(point, Point { x: 1, y: -2 });
/// ```
pub fn serialize<T: MessagePackSerialize + ?Sized>(value: &T) -> Result<Bytes> {
    SerializationContext::shared_default().serialize(value)
}

/// Serializes a value into a writer with the shared default context.
pub fn serialize_to_writer<W: Write, T: MessagePackSerialize + ?Sized>(
    writer: &mut W,
    value: &T,
) -> Result<usize> {
    SerializationContext::shared_default().serialize_to_writer(writer, value)
}

/// Deserializes a value from the start of `bytes` with the shared default context.
pub fn deserialize<T: MessagePackDeserialize>(bytes: &[u8]) -> Result<T> {
    SerializationContext::shared_default().deserialize(bytes)
}

/// Deserializes a value from the `len` bytes starting at `offset`.
pub fn deserialize_window<T: MessagePackDeserialize>(
    bytes: &[u8],
    offset: usize,
    len: usize,
) -> Result<T> {
    SerializationContext::shared_default().deserialize_window(bytes, offset, len)
}

/// Deserializes a value from a blocking reader with the shared default context.
pub fn deserialize_from_reader<T: MessagePackDeserialize, R: Read>(reader: R) -> Result<T> {
    SerializationContext::shared_default().deserialize_from_reader(reader)
}
