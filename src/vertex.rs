//! Flag-driven vertex layout.
//!
//! A vertex is a fixed sequence of optional channels. Each channel contributes a
//! fixed number of bytes, smaller when `COMPRESSED` swaps its floats for halves.
//! Decode and encode both walk [`CHANNELS`] in order, so the stride always balances.

use crate::error::{CodecError, Result, unencodable};
use crate::io::{f32_to_half, finite, half_to_f32};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct VertexFormat: u32 {
        const POSITION = 0x1;
        const NORMAL = 0x2;
        const TEX_UV = 0x4;
        const TEX2_UV = 0x8;
        const COLOR = 0x40;
        const TANGENT = 0x80;
        const BLEND_WEIGHT = 0x200;
        const COMPRESSED = 0x8000;
    }
}

impl VertexFormat {
    pub fn is_compressed(&self) -> bool {
        self.contains(VertexFormat::COMPRESSED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// In-memory V runs the other way from the file: `v = 1 - stored_v`.
    pub uv: [f32; 2],
    pub uv2: [f32; 2],
    pub tangent: [f32; 3],
    pub color: [f32; 4],
    /// Palette-local when the owning triangle group carries a palette.
    pub bone_ids: [u8; 4],
    /// The last weight is never stored; it is `1 - sum(first three)`.
    pub bone_weights: [f32; 4],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0; 3],
            uv: [0.0; 2],
            uv2: [0.0; 2],
            tangent: [0.0; 3],
            color: [1.0; 4],
            bone_ids: [0; 4],
            bone_weights: [0.0; 4],
        }
    }
}

type DecodeFn = fn(&mut Cursor<&[u8]>, bool, &mut Vertex) -> Result<()>;
type EncodeFn = fn(&mut Vec<u8>, bool, &Vertex) -> Result<()>;

pub struct Channel {
    pub flag: VertexFormat,
    pub size: usize,
    pub compressed_size: usize,
    decode: DecodeFn,
    encode: EncodeFn,
}

impl Channel {
    pub fn byte_size(&self, compressed: bool) -> usize {
        if compressed {
            self.compressed_size
        } else {
            self.size
        }
    }
}

/// Channel order is part of the wire format.
pub static CHANNELS: [Channel; 7] = [
    Channel {
        flag: VertexFormat::POSITION,
        size: 12,
        compressed_size: 12,
        decode: decode_position,
        encode: encode_position,
    },
    Channel {
        flag: VertexFormat::NORMAL,
        size: 12,
        compressed_size: 8,
        decode: decode_normal,
        encode: encode_normal,
    },
    Channel {
        flag: VertexFormat::TEX_UV,
        size: 8,
        compressed_size: 4,
        decode: decode_uv,
        encode: encode_uv,
    },
    Channel {
        flag: VertexFormat::TEX2_UV,
        size: 8,
        compressed_size: 4,
        decode: decode_uv2,
        encode: encode_uv2,
    },
    Channel {
        flag: VertexFormat::TANGENT,
        size: 12,
        compressed_size: 8,
        decode: decode_tangent,
        encode: encode_tangent,
    },
    Channel {
        flag: VertexFormat::COLOR,
        size: 4,
        compressed_size: 4,
        decode: decode_color,
        encode: encode_color,
    },
    Channel {
        flag: VertexFormat::BLEND_WEIGHT,
        size: 16,
        compressed_size: 12,
        decode: decode_blend,
        encode: encode_blend,
    },
];

pub fn vertex_size(flags: VertexFormat) -> usize {
    let compressed = flags.is_compressed();
    CHANNELS
        .iter()
        .filter(|channel| flags.contains(channel.flag))
        .map(|channel| channel.byte_size(compressed))
        .sum()
}

pub fn decode_vertex(flags: VertexFormat, bytes: &[u8]) -> Result<Vertex> {
    let expected = vertex_size(flags);
    if bytes.len() != expected {
        return Err(CodecError::StrideMismatch {
            declared: bytes.len(),
            expected,
        });
    }

    let compressed = flags.is_compressed();
    let mut cursor = Cursor::new(bytes);
    let mut vertex = Vertex::default();
    for channel in CHANNELS.iter().filter(|c| flags.contains(c.flag)) {
        let start = cursor.position() as usize;
        (channel.decode)(&mut cursor, compressed, &mut vertex)?;
        check_consumed(cursor.position() as usize - start, channel.byte_size(compressed))?;
    }
    check_consumed(cursor.position() as usize, expected)?;
    Ok(vertex)
}

pub fn encode_vertex(flags: VertexFormat, vertex: &Vertex, out: &mut Vec<u8>) -> Result<()> {
    let compressed = flags.is_compressed();
    let start = out.len();
    for channel in CHANNELS.iter().filter(|c| flags.contains(c.flag)) {
        let before = out.len();
        (channel.encode)(out, compressed, vertex)?;
        check_consumed(out.len() - before, channel.byte_size(compressed))?;
    }
    check_consumed(out.len() - start, vertex_size(flags))
}

fn check_consumed(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(CodecError::StrideMismatch {
            declared: actual,
            expected,
        });
    }
    Ok(())
}

fn read_floats<const N: usize>(cursor: &mut Cursor<&[u8]>, compressed: bool) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    for value in out.iter_mut() {
        *value = if compressed {
            half_to_f32(cursor.read_u16::<LittleEndian>()?)
        } else {
            cursor.read_f32::<LittleEndian>()?
        };
    }
    Ok(out)
}

fn write_floats(out: &mut Vec<u8>, compressed: bool, values: &[f32]) -> Result<()> {
    for &value in values {
        if compressed {
            out.write_u16::<LittleEndian>(f32_to_half(value)?)?;
        } else {
            out.write_f32::<LittleEndian>(finite(value)?)?;
        }
    }
    Ok(())
}

fn skip_pad(cursor: &mut Cursor<&[u8]>, compressed: bool) -> Result<()> {
    if compressed {
        cursor.read_u16::<LittleEndian>()?;
    }
    Ok(())
}

fn write_pad(out: &mut Vec<u8>, compressed: bool) -> Result<()> {
    if compressed {
        out.write_u16::<LittleEndian>(0)?;
    }
    Ok(())
}

fn decode_position(cursor: &mut Cursor<&[u8]>, _: bool, vertex: &mut Vertex) -> Result<()> {
    vertex.position = read_floats(cursor, false)?;
    Ok(())
}

fn encode_position(out: &mut Vec<u8>, _: bool, vertex: &Vertex) -> Result<()> {
    write_floats(out, false, &vertex.position)
}

fn decode_normal(cursor: &mut Cursor<&[u8]>, compressed: bool, vertex: &mut Vertex) -> Result<()> {
    vertex.normal = read_floats(cursor, compressed)?;
    skip_pad(cursor, compressed)
}

fn encode_normal(out: &mut Vec<u8>, compressed: bool, vertex: &Vertex) -> Result<()> {
    write_floats(out, compressed, &vertex.normal)?;
    write_pad(out, compressed)
}

fn flip_v(uv: [f32; 2]) -> [f32; 2] {
    [uv[0], 1.0 - uv[1]]
}

fn decode_uv(cursor: &mut Cursor<&[u8]>, compressed: bool, vertex: &mut Vertex) -> Result<()> {
    vertex.uv = flip_v(read_floats(cursor, compressed)?);
    Ok(())
}

fn encode_uv(out: &mut Vec<u8>, compressed: bool, vertex: &Vertex) -> Result<()> {
    write_floats(out, compressed, &flip_v(vertex.uv))
}

fn decode_uv2(cursor: &mut Cursor<&[u8]>, compressed: bool, vertex: &mut Vertex) -> Result<()> {
    vertex.uv2 = flip_v(read_floats(cursor, compressed)?);
    Ok(())
}

fn encode_uv2(out: &mut Vec<u8>, compressed: bool, vertex: &Vertex) -> Result<()> {
    write_floats(out, compressed, &flip_v(vertex.uv2))
}

fn decode_tangent(cursor: &mut Cursor<&[u8]>, compressed: bool, vertex: &mut Vertex) -> Result<()> {
    vertex.tangent = read_floats(cursor, compressed)?;
    skip_pad(cursor, compressed)
}

fn encode_tangent(out: &mut Vec<u8>, compressed: bool, vertex: &Vertex) -> Result<()> {
    write_floats(out, compressed, &vertex.tangent)?;
    write_pad(out, compressed)
}

fn decode_color(cursor: &mut Cursor<&[u8]>, _: bool, vertex: &mut Vertex) -> Result<()> {
    for channel in vertex.color.iter_mut() {
        *channel = cursor.read_u8()? as f32 / 255.0;
    }
    Ok(())
}

fn encode_color(out: &mut Vec<u8>, _: bool, vertex: &Vertex) -> Result<()> {
    for &channel in &vertex.color {
        if !(0.0..=1.0).contains(&channel) {
            return Err(unencodable(
                "vertex color",
                format!("{channel} is outside the 0..=1 range"),
            ));
        }
        out.write_u8((channel * 255.0).round() as u8)?;
    }
    Ok(())
}

fn decode_blend(cursor: &mut Cursor<&[u8]>, compressed: bool, vertex: &mut Vertex) -> Result<()> {
    for id in vertex.bone_ids.iter_mut() {
        *id = cursor.read_u8()?;
    }
    let [w0, w1, w2] = read_floats::<3>(cursor, compressed)?;
    skip_pad(cursor, compressed)?;
    vertex.bone_weights = [w0, w1, w2, 1.0 - (w0 + w1 + w2)];
    Ok(())
}

fn encode_blend(out: &mut Vec<u8>, compressed: bool, vertex: &Vertex) -> Result<()> {
    out.extend_from_slice(&vertex.bone_ids);
    write_floats(out, compressed, &vertex.bone_weights[..3])?;
    write_pad(out, compressed)
}
