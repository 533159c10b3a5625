use super::EAN_MAGIC;
use super::types::*;
use crate::error::{Result, unencodable};
use crate::io::{pad_to, write_cstring, write_f32s, write_halves, write_header_prefix};
use crate::offsets::{OffsetTable, Slot};
use crate::skeleton::write_skeleton;
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use tracing::debug;

const HEADER_SIZE: u16 = 32;
const ANIMATION_HEADER_SIZE: u32 = 16;
const NODE_HEADER_SIZE: u32 = 8;
const ANIMATION_TRAILER: [u8; 12] = [0; 12];

pub fn write_ean(ean: &EanFile) -> Result<Vec<u8>> {
    let mut slots: BTreeMap<usize, &Animation> = BTreeMap::new();
    for animation in &ean.animations {
        if slots.insert(animation.index, animation).is_some() {
            return Err(unencodable(
                format!("animation {}", animation.name),
                format!("index {} is used twice", animation.index),
            ));
        }
    }
    let count = slots.keys().next_back().map_or(0, |last| last + 1);
    let count = u16::try_from(count)
        .map_err(|_| unencodable("animation table", format!("{count} slots exceed u16")))?;

    let mut out = Vec::new();
    write_header_prefix(&mut out, EAN_MAGIC, HEADER_SIZE)?;
    out.write_u32::<LittleEndian>(ean.version)?;
    out.write_u32::<LittleEndian>(ean.unknown_0c)?;
    out.write_u8(ean.is_camera as u8)?;
    out.write_u8(ean.i_17)?;
    out.write_u16::<LittleEndian>(count)?;
    let skeleton_slot = Slot::reserve(&mut out);
    let table_slot = Slot::reserve(&mut out);
    let names_slot = Slot::reserve(&mut out);

    skeleton_slot.commit(&mut out, 0)?;
    write_skeleton(&mut out, &ean.skeleton)?;

    if count > 0 {
        table_slot.commit(&mut out, 0)?;
        let table = OffsetTable::reserve(&mut out, count as usize);
        for (&index, animation) in &slots {
            pad_to(&mut out, 16);
            table.commit(&mut out, index, 0)?;
            write_animation(&mut out, animation)
                .map_err(|e| e.within(format!("animation {index} ({})", animation.name)))?;
        }

        names_slot.commit(&mut out, 0)?;
        let names = OffsetTable::reserve(&mut out, count as usize);
        for (&index, animation) in &slots {
            names.commit(&mut out, index, 0)?;
            write_cstring(&mut out, &animation.name)?;
        }
    }

    debug!(animations = slots.len(), bytes = out.len(), "wrote ean");
    Ok(out)
}

fn write_animation(out: &mut Vec<u8>, animation: &Animation) -> Result<()> {
    let base = out.len();
    let wide = animation.wide_frame_indices();
    out.write_u16::<LittleEndian>(0)?;
    out.write_u8(wide as u8)?;
    out.write_u8(animation.precision.to_byte())?;
    out.write_u32::<LittleEndian>(animation.frame_count)?;
    out.write_u32::<LittleEndian>(animation.nodes.len() as u32)?;
    let nodes_at = if animation.nodes.is_empty() { 0 } else { ANIMATION_HEADER_SIZE };
    out.write_u32::<LittleEndian>(nodes_at)?;

    let nodes = OffsetTable::reserve(out, animation.nodes.len());
    for (index, node) in animation.nodes.iter().enumerate() {
        nodes.commit(out, index, base)?;
        write_node(out, node, wide, animation.precision)
            .map_err(|e| e.within(format!("node for bone {}", node.bone_index)))?;
    }

    out.extend_from_slice(&ANIMATION_TRAILER);
    Ok(())
}

fn write_node(out: &mut Vec<u8>, node: &Node, wide: bool, precision: FloatPrecision) -> Result<()> {
    let base = out.len();
    let count = i16::try_from(node.components.len())
        .map_err(|_| unencodable("component table", "too many components"))?;
    out.write_i16::<LittleEndian>(node.bone_index)?;
    out.write_i16::<LittleEndian>(count)?;
    out.write_u32::<LittleEndian>(if count > 0 { NODE_HEADER_SIZE } else { 0 })?;

    let components = OffsetTable::reserve(out, node.components.len());
    for (index, component) in node.components.iter().enumerate() {
        components.commit(out, index, base)?;
        write_component(out, component, wide, precision)
            .map_err(|e| e.within(format!("{:?} component", component.kind)))?;
    }
    Ok(())
}

fn write_component(
    out: &mut Vec<u8>,
    component: &Component,
    wide: bool,
    precision: FloatPrecision,
) -> Result<()> {
    let base = out.len();
    out.write_u8(component.kind.to_byte())?;
    out.write_u8(component.i_01)?;
    out.write_i16::<LittleEndian>(component.i_02)?;
    out.write_u32::<LittleEndian>(component.keyframes.len() as u32)?;
    let frames_slot = Slot::reserve(out);
    let values_slot = Slot::reserve(out);

    frames_slot.commit(out, base)?;
    for keyframe in &component.keyframes {
        if wide {
            out.write_u16::<LittleEndian>(keyframe.frame)?;
        } else {
            let frame = u8::try_from(keyframe.frame).map_err(|_| {
                unencodable("frame index", format!("frame {} needs 16-bit indices", keyframe.frame))
            })?;
            out.write_u8(frame)?;
        }
    }
    pad_to(out, 16);

    values_slot.commit(out, base)?;
    for keyframe in &component.keyframes {
        let written = match precision {
            FloatPrecision::Half => write_halves(out, &keyframe.value),
            FloatPrecision::Single => write_f32s(out, &keyframe.value),
        };
        written.map_err(|e| e.within(format!("keyframe at frame {}", keyframe.frame)))?;
    }
    Ok(())
}
