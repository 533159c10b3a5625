use super::types::*;
use super::{
    BCS_MAGIC, BCS_BONE_SIZE, COLORS_SIZE, LEGACY_SKELETON_BASE, LEGACY_SKELETON_OFFSET,
    MAX_PART_HIDE_FLAGS, MAX_PHYSICS_HIDE_FLAGS, PARTS_PER_SET, PHYSICS_PART_SIZE,
};
use crate::error::{Result, unencodable};
use crate::io::{pad_to, write_cstring, write_f32s, write_header_prefix};
use crate::offsets::{OffsetTable, Slot};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

const PART_SET_HEADER_SIZE: u32 = 28;

/// String pointers waiting for their text, each relative to its owner.
#[derive(Default)]
struct Strings<'a> {
    pending: Vec<(Slot, usize, &'a str)>,
}

impl<'a> Strings<'a> {
    fn reserve(&mut self, out: &mut Vec<u8>, base: usize, value: &'a str) {
        let slot = Slot::reserve(out);
        if !value.is_empty() {
            self.pending.push((slot, base, value));
        }
    }

    fn flush(self, out: &mut Vec<u8>) -> Result<()> {
        for (slot, base, value) in self.pending {
            slot.commit(out, base)?;
            write_cstring(out, value)?;
        }
        pad_to(out, 4);
        Ok(())
    }
}

fn table_len(ids: impl Iterator<Item = usize>, what: &str) -> Result<u16> {
    let len = ids.max().map_or(0, |id| id + 1);
    u16::try_from(len).map_err(|_| unencodable(what, format!("{len} slots exceed u16")))
}

fn count_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| unencodable(what, format!("{len} entries exceed u16")))
}

fn write_chara_code(out: &mut Vec<u8>, code: &str) -> Result<()> {
    let bytes = code.as_bytes();
    if bytes.len() > 4 {
        return Err(unencodable(format!("character code {code:?}"), "longer than 4 bytes"));
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + (4 - bytes.len()), 0);
    Ok(())
}

fn check_hide_flags(hide: PartTypeFlags, hide_mat: PartTypeFlags, max: u32) -> Result<()> {
    if hide.bits() > max || hide_mat.bits() > max {
        return Err(unencodable(
            "hide flags",
            format!("{:#x}/{:#x} exceed {max:#x}", hide.bits(), hide_mat.bits()),
        ));
    }
    Ok(())
}

pub fn write_bcs(bcs: &BcsFile) -> Result<Vec<u8>> {
    let version = bcs.version;
    let part_set_count = table_len(bcs.part_sets.iter().map(|s| s.id), "part set table")?;
    let part_color_count = table_len(bcs.part_colors.iter().map(|c| c.id), "part color table")?;
    let body_count = table_len(bcs.bodies.iter().map(|b| b.id), "body table")?;

    let mut out = Vec::new();
    write_header_prefix(&mut out, BCS_MAGIC, version.signature() as u16)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(part_set_count)?;
    out.write_u16::<LittleEndian>(part_color_count)?;
    out.write_u16::<LittleEndian>(body_count)?;
    out.write_u16::<LittleEndian>(0)?;
    if version == BcsVersion::Current {
        out.write_u32::<LittleEndian>(0)?;
    }
    let part_sets_slot = Slot::reserve(&mut out);
    let part_colors_slot = Slot::reserve(&mut out);
    let bodies_slot = Slot::reserve(&mut out);
    let skeleton_cells = match version {
        BcsVersion::Current => Some((Slot::reserve(&mut out), Slot::reserve(&mut out))),
        BcsVersion::Legacy => None,
    };
    out.write_u8(bcs.race.to_byte())?;
    out.write_u8(bcs.gender.to_byte())?;
    out.write_u16::<LittleEndian>(0)?;
    write_f32s(&mut out, &bcs.f_48).map_err(|e| e.within("header"))?;

    let legacy_bones_slot = match version {
        BcsVersion::Legacy => {
            debug_assert_eq!(out.len(), LEGACY_SKELETON_OFFSET);
            let skeleton = bcs.skeleton1.as_ref();
            out.write_i16::<LittleEndian>(skeleton.map_or(0, |s| s.i_00))?;
            let count = skeleton.map_or(0, |s| s.bones.len());
            out.write_u16::<LittleEndian>(count_u16(count, "skeleton bones")?)?;
            Some(Slot::reserve(&mut out))
        }
        BcsVersion::Current => None,
    };

    let part_sets = reserve_table(&mut out, part_sets_slot, part_set_count)?;
    let part_colors = reserve_table(&mut out, part_colors_slot, part_color_count)?;
    let bodies = reserve_table(&mut out, bodies_slot, body_count)?;

    let mut skeleton_targets = Vec::new();
    if let Some((skeleton2_cell, skeleton1_cell)) = skeleton_cells {
        let cells = [(skeleton2_cell, &bcs.skeleton2), (skeleton1_cell, &bcs.skeleton1)];
        for (cell, skeleton) in cells {
            if let Some(skeleton) = skeleton {
                cell.commit(&mut out, 0)?;
                skeleton_targets.push((Slot::reserve(&mut out), skeleton));
            }
        }
    }

    for set in &bcs.part_sets {
        pad_to(&mut out, 4);
        part_sets.commit(&mut out, set.id, 0)?;
        write_part_set(&mut out, set, version)
            .map_err(|e| e.within(format!("part set {}", set.id)))?;
    }
    for color in &bcs.part_colors {
        pad_to(&mut out, 4);
        part_colors.commit(&mut out, color.id, 0)?;
        write_part_color(&mut out, color)
            .map_err(|e| e.within(format!("part color {} ({})", color.id, color.name)))?;
    }
    for body in &bcs.bodies {
        pad_to(&mut out, 4);
        bodies.commit(&mut out, body.id, 0)?;
        write_body(&mut out, body).map_err(|e| e.within(format!("body {}", body.id)))?;
    }

    match (legacy_bones_slot, &bcs.skeleton1) {
        (Some(slot), Some(skeleton)) if !skeleton.bones.is_empty() => {
            pad_to(&mut out, 4);
            slot.commit(&mut out, LEGACY_SKELETON_BASE)?;
            write_bones(&mut out, skeleton, version).map_err(|e| e.within("skeleton"))?;
        }
        _ => {}
    }
    for (target, skeleton) in skeleton_targets {
        pad_to(&mut out, 4);
        target.commit(&mut out, 0)?;
        write_skeleton(&mut out, skeleton, version).map_err(|e| e.within("skeleton"))?;
    }

    debug!(?version, bytes = out.len(), "wrote bcs");
    Ok(out)
}

/// Points `header_slot` at a fresh table of `count` absolute pointers.
fn reserve_table(out: &mut Vec<u8>, header_slot: Slot, count: u16) -> Result<OffsetTable> {
    if count == 0 {
        return Ok(OffsetTable::default());
    }
    header_slot.commit(out, 0)?;
    Ok(OffsetTable::reserve(out, count as usize))
}

fn write_part_set(out: &mut Vec<u8>, set: &PartSet, version: BcsVersion) -> Result<()> {
    let base = out.len();
    out.resize(base + 20, 0);
    out.write_i32::<LittleEndian>(PARTS_PER_SET as i32)?;
    out.write_u32::<LittleEndian>(PART_SET_HEADER_SIZE)?;
    let table = OffsetTable::reserve(out, PARTS_PER_SET);
    for (slot, part_type) in PartType::ALL.into_iter().enumerate() {
        if let Some(part) = set.part(part_type) {
            pad_to(out, 4);
            table.commit(out, slot, base)?;
            write_part(out, part, version).map_err(|e| e.within(format!("{part_type:?}")))?;
        }
    }
    Ok(())
}

fn write_part(out: &mut Vec<u8>, part: &Part, version: BcsVersion) -> Result<()> {
    check_hide_flags(part.hide_flags, part.hide_mat_flags, MAX_PART_HIDE_FLAGS)?;
    if version == BcsVersion::Legacy && !part.unk3.is_empty() {
        return Err(unencodable("unk3 entries", "the legacy layout has no room for them"));
    }

    let base = out.len();
    let mut strings = Strings::default();
    out.write_i16::<LittleEndian>(part.model)?;
    out.write_i16::<LittleEndian>(part.model2)?;
    out.write_i16::<LittleEndian>(part.texture)?;
    out.resize(out.len() + 10, 0);
    out.write_i16::<LittleEndian>(part.shader)?;
    out.write_u16::<LittleEndian>(count_u16(part.color_selectors.len(), "color selectors")?)?;
    let selectors_slot = Slot::reserve(out);
    out.write_u32::<LittleEndian>(part.flags.bits())?;
    out.write_u32::<LittleEndian>(part.hide_flags.bits())?;
    out.write_u32::<LittleEndian>(part.hide_mat_flags.bits())?;
    write_f32s(out, &[part.f_36, part.f_40])?;
    out.write_i32::<LittleEndian>(part.i_44)?;
    out.write_i32::<LittleEndian>(part.i_48)?;
    write_chara_code(out, &part.chara_code)?;
    for path in [&part.emd_path, &part.emm_path, &part.emb_path, &part.ean_path] {
        strings.reserve(out, base, path);
    }
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(count_u16(part.physics_parts.len(), "physics parts")?)?;
    let physics_slot = Slot::reserve(out);
    let unk3_slot = match version {
        BcsVersion::Current => {
            out.write_u16::<LittleEndian>(0)?;
            out.write_u16::<LittleEndian>(count_u16(part.unk3.len(), "unk3 entries")?)?;
            Some(Slot::reserve(out))
        }
        BcsVersion::Legacy => None,
    };
    debug_assert_eq!(out.len() - base, version.part_size());

    if !part.color_selectors.is_empty() {
        selectors_slot.commit(out, base)?;
        for selector in &part.color_selectors {
            out.write_u16::<LittleEndian>(selector.part_color_group)?;
            out.write_u16::<LittleEndian>(selector.color_index)?;
        }
    }

    if !part.physics_parts.is_empty() {
        physics_slot.commit(out, base)?;
        for (index, physics) in part.physics_parts.iter().enumerate() {
            write_physics_part(out, physics, &mut strings)
                .map_err(|e| e.within(format!("physics part {index}")))?;
        }
    }

    if let Some(slot) = unk3_slot.filter(|_| !part.unk3.is_empty()) {
        slot.commit(out, base)?;
        for entry in &part.unk3 {
            for value in entry.values {
                out.write_i16::<LittleEndian>(value)?;
            }
        }
    }

    strings.flush(out)
}

fn write_physics_part<'a>(
    out: &mut Vec<u8>,
    physics: &'a PhysicsPart,
    strings: &mut Strings<'a>,
) -> Result<()> {
    check_hide_flags(physics.hide_flags, physics.hide_mat_flags, MAX_PHYSICS_HIDE_FLAGS)?;
    let base = out.len();
    out.write_i16::<LittleEndian>(physics.model1)?;
    out.write_i16::<LittleEndian>(physics.model2)?;
    out.write_i16::<LittleEndian>(physics.texture)?;
    out.resize(out.len() + 18, 0);
    out.write_u32::<LittleEndian>(physics.flags.bits())?;
    out.write_u32::<LittleEndian>(physics.hide_flags.bits())?;
    out.write_u32::<LittleEndian>(physics.hide_mat_flags.bits())?;
    write_chara_code(out, &physics.chara_code)?;
    for path in [
        &physics.emd_path,
        &physics.emm_path,
        &physics.emb_path,
        &physics.ean_path,
        &physics.bone_to_attach,
        &physics.scd_path,
    ] {
        strings.reserve(out, base, path);
    }
    out.resize(out.len() + 8, 0);
    debug_assert_eq!(out.len() - base, PHYSICS_PART_SIZE);
    Ok(())
}

fn write_part_color(out: &mut Vec<u8>, color: &PartColor) -> Result<()> {
    let base = out.len();
    let mut strings = Strings::default();
    strings.reserve(out, base, &color.name);
    out.write_u32::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0)?;
    let count = table_len(color.colors.iter().map(|c| c.id), "colors")?;
    out.write_u16::<LittleEndian>(count)?;
    let colors_slot = Slot::reserve(out);

    if count > 0 {
        colors_slot.commit(out, base)?;
        let start = out.len();
        out.resize(start + COLORS_SIZE * count as usize, 0);
        for entry in &color.colors {
            let mut quads = Vec::with_capacity(16 * 4);
            write_f32s(&mut quads, entry.colors.as_flattened())
                .map_err(|e| e.within(format!("colors {}", entry.id)))?;
            let at = start + COLORS_SIZE * entry.id;
            out[at..at + quads.len()].copy_from_slice(&quads);
        }
    }

    strings.flush(out)
}

fn write_body(out: &mut Vec<u8>, body: &Body) -> Result<()> {
    let base = out.len();
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(count_u16(body.scales.len(), "bone scales")?)?;
    let scales_slot = Slot::reserve(out);
    if body.scales.is_empty() {
        return Ok(());
    }

    scales_slot.commit(out, base)?;
    let mut strings = Strings::default();
    for scale in &body.scales {
        let entry = out.len();
        write_f32s(out, &scale.scale)
            .map_err(|e| e.within(format!("bone scale {}", scale.bone_name)))?;
        strings.reserve(out, entry, &scale.bone_name);
    }
    strings.flush(out)
}

fn write_skeleton(out: &mut Vec<u8>, skeleton: &BcsSkeleton, version: BcsVersion) -> Result<()> {
    let base = out.len();
    out.write_i16::<LittleEndian>(skeleton.i_00)?;
    out.write_u16::<LittleEndian>(count_u16(skeleton.bones.len(), "skeleton bones")?)?;
    let bones_slot = Slot::reserve(out);
    if skeleton.bones.is_empty() {
        return Ok(());
    }
    bones_slot.commit(out, base)?;
    write_bones(out, skeleton, version)
}

fn write_bones(out: &mut Vec<u8>, skeleton: &BcsSkeleton, version: BcsVersion) -> Result<()> {
    let mut strings = Strings::default();
    for bone in &skeleton.bones {
        let entry = out.len();
        out.write_i32::<LittleEndian>(bone.i_00)?;
        out.write_i32::<LittleEndian>(bone.i_04)?;
        out.write_i32::<LittleEndian>(bone.i_08)?;
        let written = match version {
            BcsVersion::Legacy => {
                strings.reserve(out, entry, &bone.name);
                write_f32s(out, &bone.values)
            }
            BcsVersion::Current => write_f32s(out, &bone.values)
                .map(|()| strings.reserve(out, entry, &bone.name)),
        };
        written.map_err(|e| e.within(format!("bone {}", bone.name)))?;
        debug_assert_eq!(out.len() - entry, BCS_BONE_SIZE);
    }
    strings.flush(out)
}
