//! Extension objects and the standard timestamp extension.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::core::{read_u32_at, read_u64_at, read_i64_at, FIXEXT_SIZES};
use crate::{DecodeError, Result};

/// Type code of the timestamp extension.
pub const TIMESTAMP_TYPE_CODE: i8 = -1;

/// An application-defined type code and its opaque payload.
///
/// Two extension objects are equal only when both the type code and the payload bytes are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtObject {
    type_code: i8,
    payload: Bytes,
}

impl ExtObject {
    pub fn new(type_code: i8, payload: impl Into<Bytes>) -> Self {
        Self {
            type_code,
            payload: payload.into(),
        }
    }

    pub fn type_code(&self) -> i8 {
        self.type_code
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// True when the payload fits one of the fixext headers (1, 2, 4, 8 or 16 bytes).
    pub fn is_fixed_length(&self) -> bool {
        FIXEXT_SIZES.contains(&self.payload.len())
    }
}

/// Renders the payload as a hex dump; binary payloads are never assumed to be text.
impl fmt::Display for ExtObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ext({}, 0x{})", self.type_code, hex::encode(&self.payload))
    }
}

/// A point in time as carried by extension type -1.
///
/// `seconds` counts from the Unix epoch and may be negative, `nanoseconds` is always below 10^9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    seconds: i64,
    nanoseconds: u32,
}

const NANOS_PER_SECOND: u32 = 1_000_000_000;

impl Timestamp {
    pub const UNIX_EPOCH: Timestamp = Timestamp {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Returns `None` when `nanoseconds` is 10^9 or more.
    pub fn new(seconds: i64, nanoseconds: u32) -> Option<Self> {
        (nanoseconds < NANOS_PER_SECOND).then_some(Self {
            seconds,
            nanoseconds,
        })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Encodes into the smallest of the 32-, 64- and 96-bit layouts.
    pub fn to_ext(&self) -> ExtObject {
        let mut payload = BytesMut::with_capacity(12);
        if self.seconds >> 34 == 0 {
            let packed = (u64::from(self.nanoseconds) << 34) | self.seconds as u64;
            if packed & 0xffff_ffff_0000_0000 == 0 {
                payload.put_u32(packed as u32);
            } else {
                payload.put_u64(packed);
            }
        } else {
            payload.put_u32(self.nanoseconds);
            payload.put_i64(self.seconds);
        }
        ExtObject::new(TIMESTAMP_TYPE_CODE, payload.freeze())
    }

    /// Decodes a timestamp extension object.
    ///
    /// # Errors
    /// Returns a type mismatch for other type codes and a malformed error for unknown payload sizes
    /// or out-of-range nanoseconds.
    pub fn from_ext(ext: &ExtObject) -> Result<Self> {
        if ext.type_code() != TIMESTAMP_TYPE_CODE {
            return Err(DecodeError::TypeMismatch {
                expected: "timestamp extension",
                found: "ext",
            }
            .into());
        }
        let payload = ext.payload();
        let (seconds, nanoseconds) = match payload.len() {
            4 => (i64::from(read_u32_at(payload, 0)?), 0),
            8 => {
                let packed = read_u64_at(payload, 0)?;
                ((packed & 0x0000_0003_ffff_ffff) as i64, (packed >> 34) as u32)
            }
            12 => (read_i64_at(payload, 4)?, read_u32_at(payload, 0)?),
            other => {
                return Err(DecodeError::Malformed(format!(
                    "timestamp payload must be 4, 8 or 12 bytes, got {}",
                    other
                ))
                .into())
            }
        };
        Timestamp::new(seconds, nanoseconds).ok_or_else(|| {
            DecodeError::Malformed(format!("timestamp nanoseconds out of range: {}", nanoseconds))
                .into()
        })
    }
}

impl From<Timestamp> for ExtObject {
    fn from(value: Timestamp) -> Self {
        value.to_ext()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}
