//! The MessagePack encoder.
//!
//! Every `pack_*` method returns the number of bytes written. Headers are always the smallest
//! valid encoding for the value; the `*_with_class` variants let the caller force a larger
//! length class (for example to reserve room for in-place patching). They fail with
//! [`EncodingError::ReservedLength`] when the forced class is too small, and with
//! [`EncodingError::IncompatibleEncoding`] when the family or mode has no such class.

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::*;
use crate::{EncodingError, ExtObject, LengthKind, Result, WireValue};

/// Which revision of the MessagePack grammar the packer may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompatibilityMode {
    /// The current grammar: distinct str/bin families, str8, ext types, unsigned integer tags.
    #[default]
    Modern,
    /// The grammar before the str/bin split: text and binary both use the "Raw" family
    /// (fixraw/raw16/raw32), integers use signed tags only, and ext types do not exist.
    Classic,
}

/// The header size a caller may force for a length-prefixed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LengthClass {
    /// Length packed into the header byte (fixstr, fixarray, fixmap).
    Fix,
    Bits8,
    Bits16,
    Bits32,
}

/// Encodes MessagePack into an owned buffer.
#[derive(Debug, Default)]
pub struct Packer {
    writer: BytesMut,
    mode: CompatibilityMode,
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: CompatibilityMode) -> Self {
        Self {
            writer: BytesMut::new(),
            mode,
        }
    }

    pub fn mode(&self) -> CompatibilityMode {
        self.mode
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.writer
    }

    pub fn into_bytes(self) -> Bytes {
        self.writer.freeze()
    }

    /// Writes a header byte followed by a big-endian operand of 0, 1, 2, 4 or 8 bytes.
    #[inline]
    fn put_header(&mut self, code: u8, width: usize, operand: u64) -> Result<usize> {
        self.writer.put_u8(code);
        match width {
            0 => {}
            1 => self.writer.put_u8(operand as u8),
            2 => self.writer.put_u16(operand as u16),
            4 => self.writer.put_u32(operand as u32),
            _ => self.writer.put_u64(operand),
        }
        Ok(1 + width)
    }

    pub fn pack_nil(&mut self) -> Result<usize> {
        self.writer.put_u8(NIL);
        Ok(1)
    }

    pub fn pack_bool(&mut self, value: bool) -> Result<usize> {
        self.writer.put_u8(if value { TRUE } else { FALSE });
        Ok(1)
    }

    /// Packs an unsigned integer.
    ///
    /// In modern mode non-negative values above the fixint range use the smallest uint tag.
    /// In classic mode they use the smallest signed tag, and uint64 only above `i64::MAX`.
    pub fn pack_u64(&mut self, value: u64) -> Result<usize> {
        if value <= POSFIXINT_MAX as u64 {
            self.writer.put_u8(value as u8);
            return Ok(1);
        }
        match self.mode {
            CompatibilityMode::Modern => {
                if value <= u8::MAX as u64 {
                    self.put_header(UINT8, 1, value)
                } else if value <= u16::MAX as u64 {
                    self.put_header(UINT16, 2, value)
                } else if value <= u32::MAX as u64 {
                    self.put_header(UINT32, 4, value)
                } else {
                    self.put_header(UINT64, 8, value)
                }
            }
            CompatibilityMode::Classic => match i64::try_from(value) {
                Ok(signed) => self.pack_signed(signed),
                Err(_) => self.put_header(UINT64, 8, value),
            },
        }
    }

    /// Packs a signed integer. Non-negative values follow the rules of [`Packer::pack_u64`].
    pub fn pack_i64(&mut self, value: i64) -> Result<usize> {
        if value >= 0 {
            return self.pack_u64(value as u64);
        }
        self.pack_signed(value)
    }

    fn pack_signed(&mut self, value: i64) -> Result<usize> {
        if (MIN_NEGFIXINT..=POSFIXINT_MAX as i64).contains(&value) {
            self.writer.put_u8(value as u8);
            Ok(1)
        } else if i8::try_from(value).is_ok() {
            self.put_header(INT8, 1, value as u64)
        } else if i16::try_from(value).is_ok() {
            self.put_header(INT16, 2, value as u64)
        } else if i32::try_from(value).is_ok() {
            self.put_header(INT32, 4, value as u64)
        } else {
            self.put_header(INT64, 8, value as u64)
        }
    }

    pub fn pack_f32(&mut self, value: f32) -> Result<usize> {
        self.put_header(FLOAT32, 4, u64::from(value.to_bits()))
    }

    pub fn pack_f64(&mut self, value: f64) -> Result<usize> {
        self.put_header(FLOAT64, 8, value.to_bits())
    }

    fn check_wire_len(kind: LengthKind, len: usize) -> Result<()> {
        if len > MAX_WIRE_LEN {
            return Err(EncodingError::LengthExceedsLimit {
                kind,
                claimed: len as u64,
                limit: MAX_WIRE_LEN as u64,
            }
            .into());
        }
        Ok(())
    }

    fn smallest_raw_class(&self, len: usize) -> LengthClass {
        if len <= MAX_FIXSTR_LEN {
            LengthClass::Fix
        } else if len <= u8::MAX as usize && self.mode == CompatibilityMode::Modern {
            LengthClass::Bits8
        } else if len <= u16::MAX as usize {
            LengthClass::Bits16
        } else {
            LengthClass::Bits32
        }
    }

    fn raw_header(&mut self, len: usize, class: LengthClass) -> Result<usize> {
        Self::check_wire_len(LengthKind::Str, len)?;
        if class == LengthClass::Bits8 && self.mode == CompatibilityMode::Classic {
            return Err(EncodingError::IncompatibleEncoding {
                what: "str8",
                mode: self.mode,
            }
            .into());
        }
        let available = class_capacity(class, MAX_FIXSTR_LEN);
        if len > available {
            return Err(EncodingError::ReservedLength {
                required: len,
                available,
            }
            .into());
        }
        match class {
            LengthClass::Fix => {
                self.writer.put_u8(FIXSTR | len as u8);
                Ok(1)
            }
            LengthClass::Bits8 => self.put_header(STR8, 1, len as u64),
            LengthClass::Bits16 => self.put_header(STR16, 2, len as u64),
            LengthClass::Bits32 => self.put_header(STR32, 4, len as u64),
        }
    }

    /// Packs text with the smallest str header.
    pub fn pack_str(&mut self, value: &str) -> Result<usize> {
        self.pack_str_bytes(value.as_bytes())
    }

    /// Packs bytes under a str header (the raw family in classic mode).
    pub fn pack_str_bytes(&mut self, value: &[u8]) -> Result<usize> {
        let class = self.smallest_raw_class(value.len());
        self.pack_str_with_class(value, class)
    }

    /// Packs bytes under a str header of the requested class.
    pub fn pack_str_with_class(&mut self, value: &[u8], class: LengthClass) -> Result<usize> {
        let header = self.raw_header(value.len(), class)?;
        self.writer.put_slice(value);
        Ok(header + value.len())
    }

    /// Packs binary data. Classic mode writes it as raw (str tags).
    pub fn pack_bin(&mut self, value: &[u8]) -> Result<usize> {
        match self.mode {
            CompatibilityMode::Modern => {
                let class = if value.len() <= u8::MAX as usize {
                    LengthClass::Bits8
                } else if value.len() <= u16::MAX as usize {
                    LengthClass::Bits16
                } else {
                    LengthClass::Bits32
                };
                self.pack_bin_with_class(value, class)
            }
            CompatibilityMode::Classic => self.pack_str_bytes(value),
        }
    }

    /// Packs binary data under a bin header of the requested class.
    pub fn pack_bin_with_class(&mut self, value: &[u8], class: LengthClass) -> Result<usize> {
        let len = value.len();
        Self::check_wire_len(LengthKind::Bin, len)?;
        if self.mode == CompatibilityMode::Classic {
            return Err(EncodingError::IncompatibleEncoding {
                what: "bin",
                mode: self.mode,
            }
            .into());
        }
        if class == LengthClass::Fix {
            return Err(EncodingError::IncompatibleEncoding {
                what: "fix bin header",
                mode: self.mode,
            }
            .into());
        }
        let available = class_capacity(class, 0);
        if len > available {
            return Err(EncodingError::ReservedLength {
                required: len,
                available,
            }
            .into());
        }
        let header = match class {
            LengthClass::Bits8 => self.put_header(BIN8, 1, len as u64)?,
            LengthClass::Bits16 => self.put_header(BIN16, 2, len as u64)?,
            _ => self.put_header(BIN32, 4, len as u64)?,
        };
        self.writer.put_slice(value);
        Ok(header + len)
    }

    fn collection_header(
        &mut self,
        kind: LengthKind,
        len: usize,
        class: LengthClass,
        codes: (u8, u8, u8),
    ) -> Result<usize> {
        Self::check_wire_len(kind, len)?;
        if class == LengthClass::Bits8 {
            return Err(EncodingError::IncompatibleEncoding {
                what: "8-bit collection header",
                mode: self.mode,
            }
            .into());
        }
        let available = class_capacity(class, MAX_FIXCOLLECTION_LEN);
        if len > available {
            return Err(EncodingError::ReservedLength {
                required: len,
                available,
            }
            .into());
        }
        let (fix, bits16, bits32) = codes;
        match class {
            LengthClass::Fix => {
                self.writer.put_u8(fix | len as u8);
                Ok(1)
            }
            LengthClass::Bits16 => self.put_header(bits16, 2, len as u64),
            _ => self.put_header(bits32, 4, len as u64),
        }
    }

    fn smallest_collection_class(len: usize) -> LengthClass {
        if len <= MAX_FIXCOLLECTION_LEN {
            LengthClass::Fix
        } else if len <= u16::MAX as usize {
            LengthClass::Bits16
        } else {
            LengthClass::Bits32
        }
    }

    /// Packs an array header for `len` elements. The elements follow.
    pub fn pack_array_header(&mut self, len: usize) -> Result<usize> {
        self.pack_array_header_with_class(len, Self::smallest_collection_class(len))
    }

    pub fn pack_array_header_with_class(&mut self, len: usize, class: LengthClass) -> Result<usize> {
        self.collection_header(LengthKind::Array, len, class, (FIXARRAY, ARRAY16, ARRAY32))
    }

    /// Packs a map header for `len` key/value pairs. The pairs follow.
    pub fn pack_map_header(&mut self, len: usize) -> Result<usize> {
        self.pack_map_header_with_class(len, Self::smallest_collection_class(len))
    }

    pub fn pack_map_header_with_class(&mut self, len: usize, class: LengthClass) -> Result<usize> {
        self.collection_header(LengthKind::Map, len, class, (FIXMAP, MAP16, MAP32))
    }

    /// Packs an extension value: fixext for 1/2/4/8/16-byte payloads, otherwise ext8/16/32.
    pub fn pack_ext(&mut self, type_code: i8, payload: &[u8]) -> Result<usize> {
        let len = payload.len();
        Self::check_wire_len(LengthKind::Ext, len)?;
        self.check_ext_mode()?;
        match fixext_code(len) {
            Some(code) => {
                let header = self.put_header(code, 0, 0)?;
                self.writer.put_i8(type_code);
                self.writer.put_slice(payload);
                Ok(header + 1 + len)
            }
            None => {
                let class = if len <= u8::MAX as usize {
                    LengthClass::Bits8
                } else if len <= u16::MAX as usize {
                    LengthClass::Bits16
                } else {
                    LengthClass::Bits32
                };
                self.pack_ext_with_class(type_code, payload, class)
            }
        }
    }

    /// Packs an extension value under an ext8/16/32 header of the requested class, even when
    /// a fixext header would fit.
    pub fn pack_ext_with_class(
        &mut self,
        type_code: i8,
        payload: &[u8],
        class: LengthClass,
    ) -> Result<usize> {
        let len = payload.len();
        Self::check_wire_len(LengthKind::Ext, len)?;
        self.check_ext_mode()?;
        if class == LengthClass::Fix {
            return Err(EncodingError::IncompatibleEncoding {
                what: "fix ext header",
                mode: self.mode,
            }
            .into());
        }
        let available = class_capacity(class, 0);
        if len > available {
            return Err(EncodingError::ReservedLength {
                required: len,
                available,
            }
            .into());
        }
        let header = match class {
            LengthClass::Bits8 => self.put_header(EXT8, 1, len as u64)?,
            LengthClass::Bits16 => self.put_header(EXT16, 2, len as u64)?,
            _ => self.put_header(EXT32, 4, len as u64)?,
        };
        self.writer.put_i8(type_code);
        self.writer.put_slice(payload);
        Ok(header + 1 + len)
    }

    fn check_ext_mode(&self) -> Result<()> {
        if self.mode == CompatibilityMode::Classic {
            return Err(EncodingError::IncompatibleEncoding {
                what: "ext",
                mode: self.mode,
            }
            .into());
        }
        Ok(())
    }

    pub fn pack_ext_object(&mut self, ext: &ExtObject) -> Result<usize> {
        self.pack_ext(ext.type_code(), ext.payload())
    }

    /// Packs a whole value tree.
    ///
    /// Nested collections are walked with an explicit stack, so arbitrarily deep trees
    /// cannot exhaust the call stack.
    pub fn pack_value(&mut self, value: &WireValue) -> Result<usize> {
        enum Pending<'a> {
            Value(&'a WireValue),
            Pairs(std::slice::Iter<'a, (WireValue, WireValue)>),
            Items(std::slice::Iter<'a, WireValue>),
        }

        let start = self.len();
        let mut stack = vec![Pending::Value(value)];
        while let Some(top) = stack.last_mut() {
            let next = match top {
                Pending::Value(v) => {
                    let v = *v;
                    stack.pop();
                    v
                }
                Pending::Items(items) => match items.next() {
                    Some(item) => item,
                    None => {
                        stack.pop();
                        continue;
                    }
                },
                Pending::Pairs(pairs) => match pairs.next() {
                    Some((k, v)) => {
                        stack.push(Pending::Value(v));
                        k
                    }
                    None => {
                        stack.pop();
                        continue;
                    }
                },
            };
            match next {
                WireValue::Nil => self.pack_nil()?,
                WireValue::Bool(v) => self.pack_bool(*v)?,
                WireValue::UInt(v) => self.pack_u64(*v)?,
                WireValue::Int(v) => self.pack_i64(*v)?,
                WireValue::Float32(v) => self.pack_f32(*v)?,
                WireValue::Float64(v) => self.pack_f64(*v)?,
                WireValue::Str(s) => self.pack_str_bytes(s.as_bytes())?,
                WireValue::Bin(b) => self.pack_bin(b)?,
                WireValue::Ext(ext) => self.pack_ext_object(ext)?,
                WireValue::Array(items) => {
                    self.pack_array_header(items.len())?;
                    stack.push(Pending::Items(items.iter()));
                    0
                }
                WireValue::Map(entries) => {
                    self.pack_map_header(entries.len())?;
                    stack.push(Pending::Pairs(entries.iter()));
                    0
                }
            };
        }
        Ok(self.len() - start)
    }
}
