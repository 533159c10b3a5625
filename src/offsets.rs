//! Relative pointer tables.
//!
//! Every pointer in these formats is a `u32` added to a base that depends on the
//! structure holding it: the file start, the start of the owning structure, or the
//! slot's own position. Callers always pass the base explicitly.

use crate::error::{CodecError, Result};
use crate::io::Reader;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// A reserved `u32` placeholder inside an output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

impl Slot {
    pub fn reserve(out: &mut Vec<u8>) -> Self {
        let position = out.len();
        out.extend_from_slice(&[0; 4]);
        Slot(position)
    }

    /// A slot at a known position, e.g. a header field written as zero earlier.
    pub fn at(position: usize) -> Self {
        Slot(position)
    }

    pub fn position(&self) -> usize {
        self.0
    }

    /// Writes `out.len() - base`, i.e. points the slot at whatever comes next.
    pub fn commit(&self, out: &mut Vec<u8>, base: usize) -> Result<()> {
        let current = out.len();
        self.set(out, relative(current, base)?)
    }

    pub fn set(&self, out: &mut [u8], value: u32) -> Result<()> {
        let end = self.0 + 4;
        if end > out.len() {
            return Err(CodecError::OffsetOutOfBounds {
                offset: self.0,
                len: 4,
                size: out.len(),
            });
        }
        LittleEndian::write_u32(&mut out[self.0..end], value);
        Ok(())
    }
}

/// `n` consecutive placeholder slots, filled in once their targets are emitted.
#[derive(Debug, Clone, Default)]
pub struct OffsetTable {
    slots: Vec<Slot>,
}

impl OffsetTable {
    pub fn reserve(out: &mut Vec<u8>, n: usize) -> Self {
        let slots = (0..n).map(|_| Slot::reserve(out)).collect();
        Self { slots }
    }

    pub fn start(&self) -> Option<usize> {
        self.slots.first().map(Slot::position)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> Result<Slot> {
        self.slots.get(index).copied().ok_or_else(|| {
            CodecError::SanityCheckFailed(format!(
                "offset table has {} slots, slot {index} requested",
                self.slots.len()
            ))
        })
    }

    /// Points slot `index` at the current end of `out`, relative to `base`.
    pub fn commit(&self, out: &mut Vec<u8>, index: usize, base: usize) -> Result<()> {
        self.slot(index)?.commit(out, base)
    }

    /// Points slot `index` at the end of `out`, relative to the slot's own position.
    pub fn commit_self_relative(&self, out: &mut Vec<u8>, index: usize) -> Result<()> {
        let slot = self.slot(index)?;
        slot.commit(out, slot.position())
    }
}

pub fn relative(current: usize, base: usize) -> Result<u32> {
    current
        .checked_sub(base)
        .and_then(|delta| u32::try_from(delta).ok())
        .ok_or(CodecError::OffsetOverflow(current))
}

pub fn write_u32_at(out: &mut [u8], position: usize, value: u32) -> Result<()> {
    Slot::at(position).set(out, value)
}

pub fn push_u32(out: &mut Vec<u8>, value: u32) -> Result<()> {
    out.write_u32::<LittleEndian>(value)?;
    Ok(())
}

/// Reads `count` consecutive `u32` pointers starting at `table`.
pub fn read_table(reader: &Reader, table: usize, count: usize) -> Result<Vec<u32>> {
    let bytes = reader.slice(table, count.checked_mul(4).ok_or(CodecError::OffsetOutOfBounds {
        offset: table,
        len: usize::MAX,
        size: reader.len(),
    })?)?;
    Ok(bytes.chunks_exact(4).map(LittleEndian::read_u32).collect())
}
