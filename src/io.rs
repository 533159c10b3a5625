//! Little-endian primitives shared by every codec.
//!
//! Reads go through [`Reader`], which addresses an immutable buffer by absolute
//! offset and bound-checks every access. Writes append to a plain `Vec<u8>` with
//! `byteorder::WriteBytesExt`.

use crate::error::{CodecError, Result, unencodable};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use half::f16;
use std::borrow::Cow;

/// Every container starts with a 4-byte magic such as `#EMD`.
pub type Magic = [u8; 4];

/// Header bytes 4..6 of every container.
pub const ENDIAN_MARK: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .map(|end| &self.data[offset..end])
            .ok_or(CodecError::OffsetOutOfBounds {
                offset,
                len,
                size: self.data.len(),
            })
    }

    pub fn expect_magic(&self, expected: Magic) -> Result<()> {
        let found = self.slice(0, 4)?;
        if found != expected {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(found);
            return Err(CodecError::SignatureMismatch {
                expected,
                found: bytes,
            });
        }
        Ok(())
    }

    /// Adds a stored relative pointer to its base, rejecting targets past the end.
    pub fn resolve(&self, base: usize, relative: u32) -> Result<usize> {
        let target = base
            .checked_add(relative as usize)
            .ok_or(CodecError::OffsetOutOfBounds {
                offset: base,
                len: relative as usize,
                size: self.data.len(),
            })?;
        if target > self.data.len() {
            return Err(CodecError::OffsetOutOfBounds {
                offset: target,
                len: 0,
                size: self.data.len(),
            });
        }
        Ok(target)
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn i16(&self, offset: usize) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.slice(offset, 2)?))
    }

    pub fn u16(&self, offset: usize) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.slice(offset, 2)?))
    }

    pub fn i32(&self, offset: usize) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.slice(offset, 4)?))
    }

    pub fn u32(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    pub fn u64(&self, offset: usize) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.slice(offset, 8)?))
    }

    pub fn f32(&self, offset: usize) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.slice(offset, 4)?))
    }

    pub fn f16(&self, offset: usize) -> Result<f32> {
        Ok(half_to_f32(self.u16(offset)?))
    }

    pub fn f32_array<const N: usize>(&self, offset: usize) -> Result<[f32; N]> {
        let bytes = self.slice(offset, N * 4)?;
        let mut out = [0.0f32; N];
        LittleEndian::read_f32_into(bytes, &mut out);
        Ok(out)
    }

    /// Reads a NUL-terminated string; a missing terminator ends at the buffer end.
    pub fn cstring(&self, offset: usize) -> Result<String> {
        let tail = self.slice(offset, 0).map(|_| &self.data[offset..])?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(decode_text(&tail[..end]))
    }

    pub fn fixed_string(&self, offset: usize, len: usize) -> Result<String> {
        let raw = self.slice(offset, len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(decode_text(&raw[..end]))
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let (text, _had_errors) = encoding_rs::UTF_8.decode_without_bom_handling(bytes);
    match text {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
    }
}

#[inline]
pub fn half_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Converts to binary16, refusing values the format cannot represent.
pub fn f32_to_half(value: f32) -> Result<u16> {
    if !value.is_finite() {
        return Err(unencodable("half float", format!("{value} is not finite")));
    }
    let half = f16::from_f32(value);
    if half.is_infinite() {
        return Err(unencodable(
            "half float",
            format!("{value} overflows half precision"),
        ));
    }
    Ok(half.to_bits())
}

pub fn finite(value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(unencodable("float", format!("{value} is not finite")))
    }
}

pub fn write_f32s(out: &mut Vec<u8>, values: &[f32]) -> Result<()> {
    for &value in values {
        out.write_f32::<LittleEndian>(finite(value)?)?;
    }
    Ok(())
}

pub fn write_halves(out: &mut Vec<u8>, values: &[f32]) -> Result<()> {
    for &value in values {
        out.write_u16::<LittleEndian>(f32_to_half(value)?)?;
    }
    Ok(())
}

pub fn write_cstring(out: &mut Vec<u8>, value: &str) -> Result<()> {
    if value.as_bytes().contains(&0) {
        return Err(unencodable(
            format!("string {value:?}"),
            "contains an interior NUL byte",
        ));
    }
    out.extend_from_slice(value.as_bytes());
    out.write_u8(0)?;
    Ok(())
}

/// Writes `value` NUL-padded into exactly `len` bytes, keeping one byte for the terminator.
pub fn write_fixed_string(out: &mut Vec<u8>, value: &str, len: usize) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() >= len {
        return Err(unencodable(
            format!("string {value:?}"),
            format!("longer than the {} byte field", len - 1),
        ));
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + (len - bytes.len()), 0);
    Ok(())
}

pub fn pad_to(out: &mut Vec<u8>, alignment: usize) {
    let pad = (alignment - out.len() % alignment) % alignment;
    out.resize(out.len() + pad, 0);
}

pub fn write_header_prefix(out: &mut Vec<u8>, magic: Magic, header_size: u16) -> Result<()> {
    out.extend_from_slice(&magic);
    out.write_u16::<LittleEndian>(ENDIAN_MARK)?;
    out.write_u16::<LittleEndian>(header_size)?;
    Ok(())
}
