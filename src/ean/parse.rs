use super::EAN_MAGIC;
use super::types::*;
use crate::error::{Result, sanity};
use crate::io::Reader;
use crate::offsets::read_table;
use crate::skeleton::{Skeleton, parse_skeleton};
use tracing::debug;

pub fn parse_ean(data: &[u8]) -> Result<EanFile> {
    let reader = Reader::new(data);
    reader.expect_magic(EAN_MAGIC)?;

    let version = reader.u32(8)?;
    let unknown_0c = reader.u32(12)?;
    let is_camera = reader.u8(16)? != 0;
    let i_17 = reader.u8(17)?;
    let animation_count = reader.u16(18)? as usize;
    let skeleton_offset = reader.u32(20)?;
    debug!(version, is_camera, animation_count, "parsing ean");

    let skeleton = if skeleton_offset != 0 {
        parse_skeleton(&reader, reader.resolve(0, skeleton_offset)?)?
    } else {
        Skeleton {
            flag: 0,
            unknown: 0,
            id: 0,
            bones: Vec::new(),
            absolute_matrices: None,
        }
    };

    let mut animations = Vec::with_capacity(animation_count);
    if animation_count > 0 {
        let table = reader.resolve(0, reader.u32(24)?)?;
        let names = reader.resolve(0, reader.u32(28)?)?;
        let offsets = read_table(&reader, table, animation_count)?;
        let name_offsets = read_table(&reader, names, animation_count)?;
        for (index, (offset, name_offset)) in offsets.into_iter().zip(name_offsets).enumerate() {
            if offset == 0 {
                debug!(index, "skipping empty animation slot");
                continue;
            }
            let name = if name_offset != 0 {
                reader.cstring(reader.resolve(0, name_offset)?)?
            } else {
                String::new()
            };
            let name = if name.is_empty() { index.to_string() } else { name };
            let base = reader.resolve(0, offset)?;
            animations.push(parse_animation(&reader, base, index, name)?);
        }
    }

    Ok(EanFile {
        version,
        unknown_0c,
        is_camera,
        i_17,
        skeleton,
        animations,
    })
}

fn parse_animation(reader: &Reader, base: usize, index: usize, name: String) -> Result<Animation> {
    let index_size = reader.u8(base + 2)?;
    let float_size = reader.u8(base + 3)?;
    let frame_count = reader.u32(base + 4)?;
    let node_count = reader.u32(base + 8)? as usize;
    let node_table = reader.resolve(base, reader.u32(base + 12)?)?;

    let wide = match index_size {
        0 => false,
        1 => true,
        other => return Err(sanity(format!("animation {name}: frame index size {other}"))),
    };
    let precision = FloatPrecision::from_byte(float_size)
        .ok_or_else(|| sanity(format!("animation {name}: float size {float_size}")))?;

    let nodes = read_table(reader, node_table, node_count)?
        .into_iter()
        .map(|offset| parse_node(reader, reader.resolve(base, offset)?, wide, precision))
        .collect::<Result<Vec<_>>>()?;

    Ok(Animation {
        name,
        index,
        frame_count,
        precision,
        nodes,
    })
}

fn parse_node(reader: &Reader, base: usize, wide: bool, precision: FloatPrecision) -> Result<Node> {
    let bone_index = reader.i16(base)?;
    let count = reader.i16(base + 2)?;
    if count < 0 {
        return Err(sanity(format!("node for bone {bone_index} has {count} components")));
    }
    let table = reader.resolve(base, reader.u32(base + 4)?)?;
    let components = read_table(reader, table, count as usize)?
        .into_iter()
        .map(|offset| parse_component(reader, reader.resolve(base, offset)?, wide, precision))
        .collect::<Result<Vec<_>>>()?;
    Ok(Node {
        bone_index,
        components,
    })
}

fn parse_component(
    reader: &Reader,
    base: usize,
    wide: bool,
    precision: FloatPrecision,
) -> Result<Component> {
    let kind = ComponentKind::from_byte(reader.u8(base)?);
    let i_01 = reader.u8(base + 1)?;
    let i_02 = reader.i16(base + 2)?;
    let count = reader.u32(base + 4)? as usize;
    let frames_at = reader.resolve(base, reader.u32(base + 8)?)?;
    let values_at = reader.resolve(base, reader.u32(base + 12)?)?;

    let keyframes = (0..count)
        .map(|i| {
            let frame = if wide {
                reader.u16(frames_at + 2 * i)?
            } else {
                reader.u8(frames_at + i)? as u16
            };
            let at = values_at + precision.value_size() * i;
            let value = match precision {
                FloatPrecision::Half => [
                    reader.f16(at)?,
                    reader.f16(at + 2)?,
                    reader.f16(at + 4)?,
                    reader.f16(at + 6)?,
                ],
                FloatPrecision::Single => reader.f32_array::<4>(at)?,
            };
            Ok(Keyframe { frame, value })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Component {
        kind,
        i_01,
        i_02,
        keyframes,
    })
}
