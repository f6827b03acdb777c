//! Wire header codes and the primitive big-endian byte codec.
//!
//! The constants below are the MessagePack header bytes. They are part of the wire format
//! and never change. The `read_*_at` helpers operate on a byte slice at an explicit offset
//! and bounds-check every access: a short read reports [`DecodeError::Truncated`] with the
//! number of missing bytes so that streaming callers can feed more input. Writing goes
//! through [`bytes::BufMut`] in the packer.

use crate::{DecodeError, LengthClass, Result};

///< 0x00-0x7f: the value is the byte itself
pub const POSFIXINT_MAX: u8 = 0x7f;
///< 0x80-0x8f: low nibble is the pair count
pub const FIXMAP: u8 = 0x80;
pub const FIXMAP_MAX: u8 = 0x8f;
///< 0x90-0x9f: low nibble is the element count
pub const FIXARRAY: u8 = 0x90;
pub const FIXARRAY_MAX: u8 = 0x9f;
///< 0xa0-0xbf: low five bits are the byte length (fixraw in the classic grammar)
pub const FIXSTR: u8 = 0xa0;
pub const FIXSTR_MAX: u8 = 0xbf;
pub const NIL: u8 = 0xc0;
///< Never used; decoding it is always malformed
pub const RESERVED: u8 = 0xc1;
pub const FALSE: u8 = 0xc2;
pub const TRUE: u8 = 0xc3;
pub const BIN8: u8 = 0xc4;
pub const BIN16: u8 = 0xc5;
pub const BIN32: u8 = 0xc6;
pub const EXT8: u8 = 0xc7;
pub const EXT16: u8 = 0xc8;
pub const EXT32: u8 = 0xc9;
pub const FLOAT32: u8 = 0xca;
pub const FLOAT64: u8 = 0xcb;
pub const UINT8: u8 = 0xcc;
pub const UINT16: u8 = 0xcd;
pub const UINT32: u8 = 0xce;
pub const UINT64: u8 = 0xcf;
pub const INT8: u8 = 0xd0;
pub const INT16: u8 = 0xd1;
pub const INT32: u8 = 0xd2;
pub const INT64: u8 = 0xd3;
pub const FIXEXT1: u8 = 0xd4;
pub const FIXEXT2: u8 = 0xd5;
pub const FIXEXT4: u8 = 0xd6;
pub const FIXEXT8: u8 = 0xd7;
pub const FIXEXT16: u8 = 0xd8;
pub const STR8: u8 = 0xd9;
///< raw16 in the classic grammar
pub const STR16: u8 = 0xda;
///< raw32 in the classic grammar
pub const STR32: u8 = 0xdb;
pub const ARRAY16: u8 = 0xdc;
pub const ARRAY32: u8 = 0xdd;
pub const MAP16: u8 = 0xde;
pub const MAP32: u8 = 0xdf;
///< 0xe0-0xff: the value is the byte read as `i8` (-32..=-1)
pub const NEGFIXINT: u8 = 0xe0;

pub const MAX_FIXSTR_LEN: usize = 31;
pub const MAX_FIXCOLLECTION_LEN: usize = 15;
pub const MIN_NEGFIXINT: i64 = -32;

/// Largest payload or element count any length class can describe.
pub const MAX_WIRE_LEN: usize = u32::MAX as usize;

/// Fixed-length ext payload sizes, in header order (`FIXEXT1`..=`FIXEXT16`).
pub const FIXEXT_SIZES: [usize; 5] = [1, 2, 4, 8, 16];

/// Returns the fixext header for a payload of `len` bytes, if one exists.
pub fn fixext_code(len: usize) -> Option<u8> {
    match len {
        1 => Some(FIXEXT1),
        2 => Some(FIXEXT2),
        4 => Some(FIXEXT4),
        8 => Some(FIXEXT8),
        16 => Some(FIXEXT16),
        _ => None,
    }
}

/// Returns the maximum length a given length class can describe.
pub fn class_capacity(class: LengthClass, fix_max: usize) -> usize {
    match class {
        LengthClass::Fix => fix_max,
        LengthClass::Bits8 => u8::MAX as usize,
        LengthClass::Bits16 => u16::MAX as usize,
        LengthClass::Bits32 => MAX_WIRE_LEN,
    }
}

#[inline]
fn window<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N]> {
    let end = offset.checked_add(N).ok_or(DecodeError::Truncated { needed: N })?;
    match buf.get(offset..end) {
        Some(bytes) => {
            let mut out = [0u8; N];
            out.copy_from_slice(bytes);
            Ok(out)
        }
        None => Err(DecodeError::Truncated {
            needed: end.saturating_sub(buf.len()),
        }
        .into()),
    }
}

/// Reads one byte at `offset`.
#[inline]
pub fn read_u8_at(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(window::<1>(buf, offset)?[0])
}

/// Reads a big-endian `u16` at `offset`.
#[inline]
pub fn read_u16_at(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(u16::from_be_bytes(window(buf, offset)?))
}

/// Reads a big-endian `u32` at `offset`.
#[inline]
pub fn read_u32_at(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(u32::from_be_bytes(window(buf, offset)?))
}

/// Reads a big-endian `u64` at `offset`.
#[inline]
pub fn read_u64_at(buf: &[u8], offset: usize) -> Result<u64> {
    Ok(u64::from_be_bytes(window(buf, offset)?))
}

#[inline]
pub fn read_i8_at(buf: &[u8], offset: usize) -> Result<i8> {
    Ok(i8::from_be_bytes(window(buf, offset)?))
}

#[inline]
pub fn read_i16_at(buf: &[u8], offset: usize) -> Result<i16> {
    Ok(i16::from_be_bytes(window(buf, offset)?))
}

#[inline]
pub fn read_i32_at(buf: &[u8], offset: usize) -> Result<i32> {
    Ok(i32::from_be_bytes(window(buf, offset)?))
}

#[inline]
pub fn read_i64_at(buf: &[u8], offset: usize) -> Result<i64> {
    Ok(i64::from_be_bytes(window(buf, offset)?))
}

/// Reads a big-endian IEEE 754 single at `offset`.
#[inline]
pub fn read_f32_at(buf: &[u8], offset: usize) -> Result<f32> {
    Ok(f32::from_be_bytes(window(buf, offset)?))
}

/// Reads a big-endian IEEE 754 double at `offset`.
#[inline]
pub fn read_f64_at(buf: &[u8], offset: usize) -> Result<f64> {
    Ok(f64::from_be_bytes(window(buf, offset)?))
}
