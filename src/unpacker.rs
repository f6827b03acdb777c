//! The MessagePack decoder.
//!
//! [`Unpacker`] owns a byte buffer that may be filled all at once ([`Unpacker::from_slice`])
//! or piecemeal ([`Unpacker::feed`]). Whenever the buffer ends in the middle of an item the
//! decoder reports [`DecodeError::Truncated`]; invalid input is reported as
//! [`DecodeError::Malformed`]. The two are never conflated.
//!
//! [`Unpacker::next_value`] decodes a whole value tree with an explicit frame stack and keeps
//! that stack across `Truncated`, so it resumes exactly where it stopped once more bytes
//! arrive. Typed reads are all-or-nothing: on any error the read position is restored.

use bytes::{Buf, Bytes, BytesMut};
use std::io::Read;

use crate::core::*;
use crate::{
    DecodeError, EncodingError, ExtObject, LengthKind, MessagePackDeserialize, Result,
    SerializationContext, WireString, WireValue,
};

/// Which claimed lengths are checked against [`UnpackingLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// Nothing is checked. Only for trusted input.
    None,
    /// Array and map element counts, plus nesting depth.
    #[default]
    Collections,
    /// Everything `Collections` checks, plus str, bin and ext payload sizes.
    Strict,
}

/// Default nesting cap for typed reads.
pub const DEFAULT_MAX_TYPED_DEPTH: usize = 128;

/// Caps applied to claimed lengths before anything proportional to them is allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackingLimits {
    pub level: ValidationLevel,
    pub max_array_len: usize,
    pub max_map_len: usize,
    pub max_str_len: usize,
    pub max_bin_len: usize,
    pub max_ext_len: usize,
    pub max_depth: usize,
    /// Nesting allowed for typed reads, which recurse on the call stack. Checked at every
    /// validation level.
    pub max_typed_depth: usize,
}

impl Default for UnpackingLimits {
    fn default() -> Self {
        Self {
            level: ValidationLevel::default(),
            max_array_len: 16 * 1024 * 1024,
            max_map_len: 16 * 1024 * 1024,
            max_str_len: 256 * 1024 * 1024,
            max_bin_len: 256 * 1024 * 1024,
            max_ext_len: 256 * 1024 * 1024,
            max_depth: 1024,
            max_typed_depth: DEFAULT_MAX_TYPED_DEPTH,
        }
    }
}

impl UnpackingLimits {
    /// No caps at all.
    pub fn unlimited() -> Self {
        Self {
            level: ValidationLevel::None,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_max_array_len(mut self, len: usize) -> Self {
        self.max_array_len = len;
        self
    }

    pub fn with_max_map_len(mut self, len: usize) -> Self {
        self.max_map_len = len;
        self
    }

    pub fn with_max_str_len(mut self, len: usize) -> Self {
        self.max_str_len = len;
        self
    }

    pub fn with_max_bin_len(mut self, len: usize) -> Self {
        self.max_bin_len = len;
        self
    }

    pub fn with_max_ext_len(mut self, len: usize) -> Self {
        self.max_ext_len = len;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_max_typed_depth(mut self, depth: usize) -> Self {
        self.max_typed_depth = depth;
        self
    }

    fn check_len(&self, kind: LengthKind, claimed: u32) -> Result<()> {
        let limit = match (self.level, kind) {
            (ValidationLevel::None, _) => return Ok(()),
            (_, LengthKind::Array) => self.max_array_len,
            (_, LengthKind::Map) => self.max_map_len,
            (ValidationLevel::Collections, _) => return Ok(()),
            (_, LengthKind::Str) => self.max_str_len,
            (_, LengthKind::Bin) => self.max_bin_len,
            (_, LengthKind::Ext) => self.max_ext_len,
        };
        if claimed as u64 > limit as u64 {
            return Err(EncodingError::LengthExceedsLimit {
                kind,
                claimed: claimed as u64,
                limit: limit as u64,
            }
            .into());
        }
        Ok(())
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if self.level != ValidationLevel::None && depth > self.max_depth {
            return Err(EncodingError::DepthExceedsLimit {
                depth,
                limit: self.max_depth,
            }
            .into());
        }
        Ok(())
    }
}

/// A decoded header. Lengths are element, pair or byte counts as claimed on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Header {
    Nil,
    Bool(bool),
    UInt(u64),
    Int(i64),
    F32(f32),
    F64(f64),
    Str(u32),
    Bin(u32),
    Array(u32),
    Map(u32),
    Ext { type_code: i8, len: u32 },
}

impl Header {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Header::Nil => "nil",
            Header::Bool(_) => "bool",
            Header::UInt(_) | Header::Int(_) => "integer",
            Header::F32(_) | Header::F64(_) => "float",
            Header::Str(_) => "str",
            Header::Bin(_) => "bin",
            Header::Array(_) => "array",
            Header::Map(_) => "map",
            Header::Ext { .. } => "ext",
        }
    }

    /// Payload bytes that follow the header.
    fn payload_len(&self) -> usize {
        match self {
            Header::Str(len) | Header::Bin(len) | Header::Ext { len, .. } => *len as usize,
            _ => 0,
        }
    }

    fn limited_kind(&self) -> Option<(LengthKind, u32)> {
        match *self {
            Header::Str(len) => Some((LengthKind::Str, len)),
            Header::Bin(len) => Some((LengthKind::Bin, len)),
            Header::Array(len) => Some((LengthKind::Array, len)),
            Header::Map(len) => Some((LengthKind::Map, len)),
            Header::Ext { len, .. } => Some((LengthKind::Ext, len)),
            _ => None,
        }
    }
}

fn mismatch(expected: &'static str, found: &Header) -> crate::Error {
    DecodeError::TypeMismatch {
        expected,
        found: found.kind_name(),
    }
    .into()
}

/// Decodes the header at the start of `buf`. Returns the header and its size in bytes.
fn parse_header(buf: &[u8]) -> Result<(Header, usize)> {
    let code = read_u8_at(buf, 0)?;
    let parsed = match code {
        0x00..=POSFIXINT_MAX => (Header::UInt(u64::from(code)), 1),
        FIXMAP..=FIXMAP_MAX => (Header::Map(u32::from(code & 0x0f)), 1),
        FIXARRAY..=FIXARRAY_MAX => (Header::Array(u32::from(code & 0x0f)), 1),
        FIXSTR..=FIXSTR_MAX => (Header::Str(u32::from(code & 0x1f)), 1),
        NIL => (Header::Nil, 1),
        RESERVED => {
            return Err(DecodeError::Malformed("reserved header byte 0xc1".to_string()).into())
        }
        FALSE => (Header::Bool(false), 1),
        TRUE => (Header::Bool(true), 1),
        BIN8 => (Header::Bin(u32::from(read_u8_at(buf, 1)?)), 2),
        BIN16 => (Header::Bin(u32::from(read_u16_at(buf, 1)?)), 3),
        BIN32 => (Header::Bin(read_u32_at(buf, 1)?), 5),
        EXT8 => {
            let len = u32::from(read_u8_at(buf, 1)?);
            (Header::Ext { type_code: read_i8_at(buf, 2)?, len }, 3)
        }
        EXT16 => {
            let len = u32::from(read_u16_at(buf, 1)?);
            (Header::Ext { type_code: read_i8_at(buf, 3)?, len }, 4)
        }
        EXT32 => {
            let len = read_u32_at(buf, 1)?;
            (Header::Ext { type_code: read_i8_at(buf, 5)?, len }, 6)
        }
        FLOAT32 => (Header::F32(read_f32_at(buf, 1)?), 5),
        FLOAT64 => (Header::F64(read_f64_at(buf, 1)?), 9),
        UINT8 => (Header::UInt(u64::from(read_u8_at(buf, 1)?)), 2),
        UINT16 => (Header::UInt(u64::from(read_u16_at(buf, 1)?)), 3),
        UINT32 => (Header::UInt(u64::from(read_u32_at(buf, 1)?)), 5),
        UINT64 => (Header::UInt(read_u64_at(buf, 1)?), 9),
        INT8 => (Header::Int(i64::from(read_i8_at(buf, 1)?)), 2),
        INT16 => (Header::Int(i64::from(read_i16_at(buf, 1)?)), 3),
        INT32 => (Header::Int(i64::from(read_i32_at(buf, 1)?)), 5),
        INT64 => (Header::Int(read_i64_at(buf, 1)?), 9),
        FIXEXT1..=FIXEXT16 => {
            let len = FIXEXT_SIZES[usize::from(code - FIXEXT1)] as u32;
            (Header::Ext { type_code: read_i8_at(buf, 1)?, len }, 2)
        }
        STR8 => (Header::Str(u32::from(read_u8_at(buf, 1)?)), 2),
        STR16 => (Header::Str(u32::from(read_u16_at(buf, 1)?)), 3),
        STR32 => (Header::Str(read_u32_at(buf, 1)?), 5),
        ARRAY16 => (Header::Array(u32::from(read_u16_at(buf, 1)?)), 3),
        ARRAY32 => (Header::Array(read_u32_at(buf, 1)?), 5),
        MAP16 => (Header::Map(u32::from(read_u16_at(buf, 1)?)), 3),
        MAP32 => (Header::Map(read_u32_at(buf, 1)?), 5),
        NEGFIXINT..=0xff => (Header::Int(i64::from(code as i8)), 1),
    };
    Ok(parsed)
}

/// A collection whose elements are still being decoded.
#[derive(Debug)]
enum Frame {
    Array {
        remaining: usize,
        items: Vec<WireValue>,
    },
    Map {
        remaining: usize,
        entries: Vec<(WireValue, WireValue)>,
        key: Option<WireValue>,
    },
}

impl Frame {
    fn is_complete(&self) -> bool {
        match self {
            Frame::Array { remaining, .. } => *remaining == 0,
            Frame::Map { remaining, key, .. } => *remaining == 0 && key.is_none(),
        }
    }

    fn into_value(self) -> WireValue {
        match self {
            Frame::Array { items, .. } => WireValue::Array(items),
            Frame::Map { entries, .. } => WireValue::Map(entries),
        }
    }

    /// Stores a finished child value.
    fn push(&mut self, value: WireValue) {
        match self {
            Frame::Array { remaining, items } => {
                items.push(value);
                *remaining -= 1;
            }
            Frame::Map {
                remaining,
                entries,
                key,
            } => match key.take() {
                None => *key = Some(value),
                Some(k) => {
                    entries.push((k, value));
                    *remaining -= 1;
                }
            },
        }
    }
}

/// Decodes MessagePack from an owned, growable buffer.
#[derive(Debug, Default)]
pub struct Unpacker {
    buf: BytesMut,
    pos: usize,
    limits: UnpackingLimits,
    frames: Vec<Frame>,
    depth: usize,
}

impl Unpacker {
    /// An empty unpacker that is filled with [`Unpacker::feed`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(bytes),
            ..Self::default()
        }
    }

    /// An unpacker over the `len` bytes of `bytes` starting at `offset`.
    pub fn from_window(bytes: &[u8], offset: usize, len: usize) -> Result<Self> {
        let window = offset
            .checked_add(len)
            .and_then(|end| bytes.get(offset..end))
            .ok_or(DecodeError::WindowOutOfRange {
                offset,
                len,
                available: bytes.len(),
            })?;
        Ok(Self::from_slice(window))
    }

    pub fn with_limits(mut self, limits: UnpackingLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> &UnpackingLimits {
        &self.limits
    }

    /// Appends input. Bytes already consumed are released first.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.pos > 0 {
            self.buf.advance(self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Unconsumed bytes in the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// True while [`Unpacker::next_value`] holds a partially decoded collection.
    pub fn is_mid_value(&self) -> bool {
        !self.frames.is_empty()
    }

    fn rest(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Decodes the next header and checks its claimed length without consuming anything.
    pub fn peek_header(&self) -> Result<(Header, usize)> {
        let (header, size) = parse_header(self.rest())?;
        if let Some((kind, len)) = header.limited_kind() {
            self.limits.check_len(kind, len)?;
        }
        Ok((header, size))
    }

    /// Fails with `Truncated` unless `len` bytes are buffered.
    fn require(&self, len: usize) -> Result<()> {
        let remaining = self.remaining();
        if remaining < len {
            return Err(DecodeError::Truncated {
                needed: len - remaining,
            }
            .into());
        }
        Ok(())
    }

    /// Consumes a header of `size` bytes plus its `len` byte payload and returns the payload.
    fn take_payload(&mut self, size: usize, len: usize) -> Result<Bytes> {
        self.require(size + len)?;
        let start = self.pos + size;
        let payload = Bytes::copy_from_slice(&self.buf[start..start + len]);
        self.pos = start + len;
        Ok(payload)
    }

    fn scalar(&mut self, header: Header, size: usize) -> Result<WireValue> {
        let value = match header {
            Header::Nil => WireValue::Nil,
            Header::Bool(v) => WireValue::Bool(v),
            Header::UInt(v) => WireValue::UInt(v),
            Header::Int(v) => WireValue::Int(v),
            Header::F32(v) => WireValue::Float32(v),
            Header::F64(v) => WireValue::Float64(v),
            Header::Str(len) => {
                let bytes = self.take_payload(size, len as usize)?;
                return Ok(WireValue::Str(WireString::from_wire(bytes)));
            }
            Header::Bin(len) => return Ok(WireValue::Bin(self.take_payload(size, len as usize)?)),
            Header::Ext { type_code, len } => {
                let payload = self.take_payload(size, len as usize)?;
                return Ok(WireValue::Ext(ExtObject::new(type_code, payload)));
            }
            Header::Array(_) | Header::Map(_) => return Err(mismatch("scalar", &header)),
        };
        self.pos += size;
        Ok(value)
    }

    /// Runs the frame machine until the outermost value on `frames` (or a new one) completes.
    fn drive(&mut self, frames: &mut Vec<Frame>) -> Result<WireValue> {
        loop {
            let value = match frames.last() {
                Some(frame) if frame.is_complete() => match frames.pop() {
                    Some(frame) => frame.into_value(),
                    None => continue,
                },
                _ => {
                    let (header, size) = self.peek_header()?;
                    match header {
                        Header::Array(len) => {
                            self.limits.check_depth(self.depth + frames.len() + 1)?;
                            self.pos += size;
                            let len = len as usize;
                            frames.push(Frame::Array {
                                remaining: len,
                                items: Vec::with_capacity(len.min(self.remaining())),
                            });
                            continue;
                        }
                        Header::Map(len) => {
                            self.limits.check_depth(self.depth + frames.len() + 1)?;
                            self.pos += size;
                            let len = len as usize;
                            frames.push(Frame::Map {
                                remaining: len,
                                entries: Vec::with_capacity(len.min(self.remaining() / 2)),
                                key: None,
                            });
                            continue;
                        }
                        _ => self.scalar(header, size)?,
                    }
                }
            };
            match frames.last_mut() {
                Some(parent) => parent.push(value),
                None => return Ok(value),
            }
        }
    }

    /// Decodes the next complete value.
    ///
    /// On `Truncated` the partially decoded collections are kept; feed more bytes and call
    /// again to continue. Any other error discards them.
    pub fn next_value(&mut self) -> Result<WireValue> {
        let mut frames = std::mem::take(&mut self.frames);
        let result = self.drive(&mut frames);
        if matches!(&result, Err(e) if e.is_truncated()) {
            self.frames = frames;
        }
        result
    }

    /// Restores the read position when `read` fails.
    fn atomically<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.pos;
        read(self).map_err(|e| {
            self.pos = start;
            e
        })
    }

    /// Runs a read of one nesting level deeper, enforcing both depth limits.
    pub fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.depth + 1;
        if depth > self.limits.max_typed_depth {
            return Err(EncodingError::DepthExceedsLimit {
                depth,
                limit: self.limits.max_typed_depth,
            }
            .into());
        }
        self.limits.check_depth(depth)?;
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    /// Consumes a nil if one is next. Returns whether it did.
    pub fn try_read_nil(&mut self) -> Result<bool> {
        let (header, size) = self.peek_header()?;
        if header == Header::Nil {
            self.pos += size;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn read_nil(&mut self) -> Result<()> {
        let (header, size) = self.peek_header()?;
        match header {
            Header::Nil => {
                self.pos += size;
                Ok(())
            }
            other => Err(mismatch("nil", &other)),
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let (header, size) = self.peek_header()?;
        match header {
            Header::Bool(v) => {
                self.pos += size;
                Ok(v)
            }
            other => Err(mismatch("bool", &other)),
        }
    }

    /// Reads an integer of any stored width into `T`.
    ///
    /// # Errors
    /// `EncodingError::Overflow` when the value does not fit `T`. Nothing is consumed then.
    pub fn read_int<T: TryFrom<i128>>(&mut self) -> Result<T> {
        let (header, size) = self.peek_header()?;
        let wide = match header {
            Header::UInt(v) => i128::from(v),
            Header::Int(v) => i128::from(v),
            other => return Err(mismatch("integer", &other)),
        };
        let value = T::try_from(wide).map_err(|_| EncodingError::Overflow {
            target: std::any::type_name::<T>(),
            value: wide.to_string(),
        })?;
        self.pos += size;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_int()
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_int()
    }

    /// Reads a float. Integers are converted.
    pub fn read_f64(&mut self) -> Result<f64> {
        let (header, size) = self.peek_header()?;
        let value = match header {
            Header::F32(v) => f64::from(v),
            Header::F64(v) => v,
            Header::UInt(v) => v as f64,
            Header::Int(v) => v as f64,
            other => return Err(mismatch("float", &other)),
        };
        self.pos += size;
        Ok(value)
    }

    /// Reads a float into `f32`. Finite doubles beyond the `f32` range overflow.
    pub fn read_f32(&mut self) -> Result<f32> {
        let (header, size) = self.peek_header()?;
        if let Header::F32(v) = header {
            self.pos += size;
            return Ok(v);
        }
        self.atomically(|this| {
            let value = this.read_f64()?;
            if value.is_finite() && value.abs() > f64::from(f32::MAX) {
                return Err(EncodingError::Overflow {
                    target: "f32",
                    value: value.to_string(),
                }
                .into());
            }
            Ok(value as f32)
        })
    }

    /// Reads the bytes of a str or bin value (the classic "Raw" family).
    pub fn read_raw(&mut self) -> Result<Bytes> {
        let (header, size) = self.peek_header()?;
        match header {
            Header::Str(len) | Header::Bin(len) => self.take_payload(size, len as usize),
            other => Err(mismatch("str or bin", &other)),
        }
    }

    /// Reads text. Invalid UTF-8 is malformed.
    pub fn read_str(&mut self) -> Result<String> {
        self.atomically(|this| {
            let bytes = this.read_raw()?;
            String::from_utf8(bytes.to_vec())
                .map_err(|e| DecodeError::Malformed(format!("invalid UTF-8 in str: {}", e)).into())
        })
    }

    pub fn read_bin(&mut self) -> Result<Bytes> {
        self.read_raw()
    }

    /// Consumes an array header and returns the claimed element count.
    pub fn read_array_len(&mut self) -> Result<usize> {
        let (header, size) = self.peek_header()?;
        match header {
            Header::Array(len) => {
                self.pos += size;
                Ok(len as usize)
            }
            other => Err(mismatch("array", &other)),
        }
    }

    /// Consumes a map header and returns the claimed pair count.
    pub fn read_map_len(&mut self) -> Result<usize> {
        let (header, size) = self.peek_header()?;
        match header {
            Header::Map(len) => {
                self.pos += size;
                Ok(len as usize)
            }
            other => Err(mismatch("map", &other)),
        }
    }

    pub fn read_ext(&mut self) -> Result<ExtObject> {
        let (header, size) = self.peek_header()?;
        match header {
            Header::Ext { type_code, len } => {
                let payload = self.take_payload(size, len as usize)?;
                Ok(ExtObject::new(type_code, payload))
            }
            other => Err(mismatch("ext", &other)),
        }
    }

    /// Discards one complete value, however deeply nested, without building it.
    pub fn skip_value(&mut self) -> Result<()> {
        self.atomically(|this| {
            let mut pending: u64 = 1;
            while pending > 0 {
                let (header, size) = this.peek_header()?;
                pending -= 1;
                match header {
                    Header::Array(len) => pending += u64::from(len),
                    Header::Map(len) => pending += 2 * u64::from(len),
                    _ => {}
                }
                let total = size + header.payload_len();
                this.require(total)?;
                this.pos += total;
            }
            Ok(())
        })
    }

    /// Reads one complete value as a typed read: all or nothing.
    pub fn read_value(&mut self) -> Result<WireValue> {
        self.atomically(|this| this.drive(&mut Vec::new()))
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_mid_value() {
            return Err(DecodeError::Malformed(
                "a partially decoded value is pending in this unpacker".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Decodes the next value as `T` with the shared default context.
    ///
    /// # Example
    /// ```rust
    /// use senax_msgpack::Unpacker;
    ///
    /// let mut unpacker = Unpacker::from_slice(&[0xcd, 0x01, 0x00]);
    /// assert!(unpacker.unpack_as::<u8>().is_err());
    /// assert_eq!(unpacker.unpack_as::<u16>().unwrap(), 256);
    /// ```
    pub fn unpack_as<T: MessagePackDeserialize>(&mut self) -> Result<T> {
        self.deserialize(SerializationContext::shared_default())
    }

    /// Decodes the next value as `T`. On any error the position is restored, so a
    /// `Truncated` read can be retried after [`Unpacker::feed`].
    pub fn deserialize<T: MessagePackDeserialize>(
        &mut self,
        ctx: &SerializationContext,
    ) -> Result<T> {
        self.ensure_idle()?;
        self.atomically(|this| T::unpack_from(this, ctx))
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// Decodes values from a blocking reader, reading more whenever the buffer runs short.
pub struct StreamUnpacker<R> {
    reader: R,
    unpacker: Unpacker,
    chunk: Box<[u8]>,
}

impl<R: Read> StreamUnpacker<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limits(reader, UnpackingLimits::default())
    }

    pub fn with_limits(reader: R, limits: UnpackingLimits) -> Self {
        Self {
            reader,
            unpacker: Unpacker::new().with_limits(limits),
            chunk: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Reads one chunk into the unpacker. Returns 0 at end of input.
    fn fill(&mut self) -> Result<usize> {
        loop {
            match self.reader.read(&mut self.chunk) {
                Ok(n) => {
                    self.unpacker.feed(&self.chunk[..n]);
                    return Ok(n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decodes the next value, or returns `None` at a clean end of input.
    ///
    /// End of input in the middle of a value is reported as `Truncated`.
    pub fn next_value(&mut self) -> Result<Option<WireValue>> {
        loop {
            if self.unpacker.has_remaining() || self.unpacker.is_mid_value() {
                match self.unpacker.next_value() {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) if e.is_truncated() => {
                        if self.fill()? == 0 {
                            return Err(e);
                        }
                    }
                    Err(e) => return Err(e),
                }
            } else if self.fill()? == 0 {
                return Ok(None);
            }
        }
    }

    /// Decodes the next value. End of input is `Truncated`.
    pub fn require_value(&mut self) -> Result<WireValue> {
        self.next_value()?
            .ok_or_else(|| DecodeError::Truncated { needed: 1 }.into())
    }

    /// Decodes the next value as `T`.
    pub fn deserialize<T: MessagePackDeserialize>(
        &mut self,
        ctx: &SerializationContext,
    ) -> Result<T> {
        loop {
            match self.unpacker.deserialize(ctx) {
                Err(e) if e.is_truncated() => {
                    if self.fill()? == 0 {
                        return Err(e);
                    }
                }
                other => return other,
            }
        }
    }

    /// Returns the reader. Buffered but undecoded bytes are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
