//! The dynamic value model.
//!
//! [`WireValue`] can hold anything the unpacker decodes. Integers and floats compare by
//! mathematical value regardless of the width or signedness they were stored with, so
//! `UInt(0) == Int(0) == Float64(0.0)`. Float comparison is exact and NaN never compares
//! equal. `Str` and `Bin` share the "Raw" family of the classic grammar and compare equal
//! when their bytes are equal.

use bytes::Bytes;
use std::fmt;

use crate::{EncodingError, ExtObject, Result};

/// The declared encoding of a [`WireString`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrEncoding {
    /// The bytes were produced from (or validated as) UTF-8 text.
    #[default]
    Utf8,
    /// Raw bytes from a str/raw header that are not valid UTF-8.
    Unknown,
}

/// String bytes plus the encoding hint they were declared with.
#[derive(Debug, Clone)]
pub struct WireString {
    bytes: Bytes,
    encoding: StrEncoding,
}

impl WireString {
    /// Wraps bytes read from the wire, recording whether they are valid UTF-8.
    pub fn from_wire(bytes: Bytes) -> Self {
        let encoding = if std::str::from_utf8(&bytes).is_ok() {
            StrEncoding::Utf8
        } else {
            StrEncoding::Unknown
        };
        Self { bytes, encoding }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn encoding(&self) -> StrEncoding {
        self.encoding
    }

    /// The text, if the bytes are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

impl From<&str> for WireString {
    fn from(value: &str) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(value.as_bytes()),
            encoding: StrEncoding::Utf8,
        }
    }
}

impl From<String> for WireString {
    fn from(value: String) -> Self {
        Self {
            bytes: Bytes::from(value.into_bytes()),
            encoding: StrEncoding::Utf8,
        }
    }
}

impl PartialEq for WireString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

/// Any MessagePack value.
#[derive(Debug, Clone)]
pub enum WireValue {
    Nil,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float32(f32),
    Float64(f64),
    Str(WireString),
    Bin(Bytes),
    Array(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
    Ext(ExtObject),
}

/// An integer widened so that every `u64` and `i64` is representable.
#[inline]
fn widen(value: &WireValue) -> Option<i128> {
    match value {
        WireValue::UInt(v) => Some(*v as i128),
        WireValue::Int(v) => Some(*v as i128),
        _ => None,
    }
}

/// The float as `f64`, widening `f32` exactly.
#[inline]
fn float(value: &WireValue) -> Option<f64> {
    match value {
        WireValue::Float32(v) => Some(f64::from(*v)),
        WireValue::Float64(v) => Some(*v),
        _ => None,
    }
}

/// True when `f` is exactly the integer `i`.
fn int_equals_float(i: i128, f: f64) -> bool {
    // -2^63 ..= 2^64 covers every stored integer; outside of it (or for NaN/inf) no match.
    const LOWER: f64 = -9_223_372_036_854_775_808.0;
    const UPPER: f64 = 18_446_744_073_709_551_616.0;
    if !f.is_finite() || f.fract() != 0.0 || f < LOWER || f >= UPPER {
        return false;
    }
    f as i128 == i
}

impl PartialEq for WireValue {
    fn eq(&self, other: &Self) -> bool {
        use WireValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (UInt(_) | Int(_), UInt(_) | Int(_)) => widen(self) == widen(other),
            (Float32(_) | Float64(_), Float32(_) | Float64(_)) => float(self) == float(other),
            (UInt(_) | Int(_), Float32(_) | Float64(_)) => {
                int_equals_float(widen(self).unwrap_or_default(), float(other).unwrap_or(f64::NAN))
            }
            (Float32(_) | Float64(_), UInt(_) | Int(_)) => {
                int_equals_float(widen(other).unwrap_or_default(), float(self).unwrap_or(f64::NAN))
            }
            (Str(a), Str(b)) => a == b,
            (Bin(a), Bin(b)) => a == b,
            (Str(a), Bin(b)) | (Bin(b), Str(a)) => a.as_bytes() == &b[..],
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Ext(a), Ext(b)) => a == b,
            _ => false,
        }
    }
}

impl WireValue {
    /// A short name of the value's family, used in type-mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Nil => "nil",
            WireValue::Bool(_) => "bool",
            WireValue::UInt(_) | WireValue::Int(_) => "integer",
            WireValue::Float32(_) | WireValue::Float64(_) => "float",
            WireValue::Str(_) => "str",
            WireValue::Bin(_) => "bin",
            WireValue::Array(_) => "array",
            WireValue::Map(_) => "map",
            WireValue::Ext(_) => "ext",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, WireValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `u64`, if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        widen(self).and_then(|v| u64::try_from(v).ok())
    }

    /// The value as `i64`, if it is an integer in range.
    pub fn as_i64(&self) -> Option<i64> {
        widen(self).and_then(|v| i64::try_from(v).ok())
    }

    /// The value as `f64`. Integers are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::UInt(v) => Some(*v as f64),
            WireValue::Int(v) => Some(*v as f64),
            _ => float(self),
        }
    }

    /// The text of a `Str` value, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::Str(s) => s.as_str(),
            _ => None,
        }
    }

    /// The bytes of a `Str` or `Bin` value (the classic "Raw" family).
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            WireValue::Str(s) => Some(s.as_bytes()),
            WireValue::Bin(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[WireValue]> {
        match self {
            WireValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(WireValue, WireValue)]> {
        match self {
            WireValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_ext(&self) -> Option<&ExtObject> {
        match self {
            WireValue::Ext(ext) => Some(ext),
            _ => None,
        }
    }

    /// Looks up the first entry of a map whose key is the given string.
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

macro_rules! impl_from_unsigned {
    ($($ty:ty),*) => {$(
        impl From<$ty> for WireValue {
            fn from(value: $ty) -> Self {
                WireValue::UInt(value as u64)
            }
        }
    )*};
}

macro_rules! impl_from_signed {
    ($($ty:ty),*) => {$(
        impl From<$ty> for WireValue {
            fn from(value: $ty) -> Self {
                WireValue::Int(value as i64)
            }
        }
    )*};
}

impl_from_unsigned!(u8, u16, u32, u64, usize);
impl_from_signed!(i8, i16, i32, i64, isize);

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        WireValue::Bool(value)
    }
}

impl From<f32> for WireValue {
    fn from(value: f32) -> Self {
        WireValue::Float32(value)
    }
}

impl From<f64> for WireValue {
    fn from(value: f64) -> Self {
        WireValue::Float64(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        WireValue::Str(value.into())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        WireValue::Str(value.into())
    }
}

impl From<Bytes> for WireValue {
    fn from(value: Bytes) -> Self {
        WireValue::Bin(value)
    }
}

impl From<ExtObject> for WireValue {
    fn from(value: ExtObject) -> Self {
        WireValue::Ext(value)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(value: Vec<WireValue>) -> Self {
        WireValue::Array(value)
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(WireValue::Nil, Into::into)
    }
}

macro_rules! impl_try_from_integer {
    ($($ty:ty),*) => {$(
        impl TryFrom<&WireValue> for $ty {
            type Error = crate::Error;

            fn try_from(value: &WireValue) -> Result<Self> {
                let wide = widen(value).ok_or(crate::DecodeError::TypeMismatch {
                    expected: "integer",
                    found: value.kind_name(),
                })?;
                <$ty>::try_from(wide).map_err(|_| {
                    EncodingError::Overflow {
                        target: stringify!($ty),
                        value: wide.to_string(),
                    }
                    .into()
                })
            }
        }
    )*};
}

impl_try_from_integer!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

/// Canonical text form: JSON-like, with `nil`, hex for binary, and `ext(code, hex)` for extensions.
impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Nil => f.write_str("nil"),
            WireValue::Bool(v) => write!(f, "{}", v),
            WireValue::UInt(v) => write!(f, "{}", v),
            WireValue::Int(v) => write!(f, "{}", v),
            WireValue::Float32(v) => write!(f, "{:?}", v),
            WireValue::Float64(v) => write!(f, "{:?}", v),
            WireValue::Str(s) => match s.as_str() {
                Some(text) => write_quoted(f, text),
                None => write!(f, "0x{}", hex::encode(s.as_bytes())),
            },
            WireValue::Bin(b) => write!(f, "0x{}", hex::encode(b)),
            WireValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            WireValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            WireValue::Ext(ext) => write!(f, "{}", ext),
        }
    }
}
