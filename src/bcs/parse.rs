use super::types::*;
use super::{BCS_MAGIC, MAX_PART_HIDE_FLAGS, MAX_PHYSICS_HIDE_FLAGS, PARTS_PER_SET};
use crate::error::{CodecError, Result, sanity};
use crate::io::Reader;
use crate::offsets::read_table;
use tracing::debug;

/// Header positions that differ between the two layouts.
struct HeaderLayout {
    part_sets: usize,
    part_colors: usize,
    bodies: usize,
    race: usize,
    floats: usize,
}

impl HeaderLayout {
    fn of(version: BcsVersion) -> Self {
        match version {
            BcsVersion::Legacy => Self {
                part_sets: 20,
                part_colors: 24,
                bodies: 28,
                race: 32,
                floats: 36,
            },
            BcsVersion::Current => Self {
                part_sets: 24,
                part_colors: 28,
                bodies: 32,
                race: 44,
                floats: 48,
            },
        }
    }
}

pub fn parse_bcs(data: &[u8]) -> Result<BcsFile> {
    let reader = Reader::new(data);
    reader.expect_magic(BCS_MAGIC)?;
    let version = BcsVersion::from_signature(reader.i16(6)?)?;
    let layout = HeaderLayout::of(version);

    let part_set_count = reader.u16(12)? as usize;
    let part_color_count = reader.u16(14)? as usize;
    let body_count = reader.u16(16)? as usize;
    debug!(?version, part_set_count, part_color_count, body_count, "parsing bcs");

    let mut bcs = BcsFile::new(version);
    bcs.race = Race::from_byte(reader.u8(layout.race)?);
    bcs.gender = Gender::from_byte(reader.u8(layout.race + 1)?);
    bcs.f_48 = reader.f32_array::<7>(layout.floats)?;

    for (id, pointer) in pointers(&reader, layout.part_sets, part_set_count)? {
        bcs.part_sets.push(parse_part_set(&reader, pointer, id, version)?);
    }
    for (id, pointer) in pointers(&reader, layout.part_colors, part_color_count)? {
        bcs.part_colors.push(parse_part_color(&reader, pointer, id)?);
    }
    for (id, pointer) in pointers(&reader, layout.bodies, body_count)? {
        let body = parse_body(&reader, pointer, id)?;
        if body.scales.is_empty() {
            debug!(id, "dropping empty body");
        } else {
            bcs.bodies.push(body);
        }
    }

    match version {
        BcsVersion::Legacy => {
            let skeleton = parse_skeleton(&reader, super::LEGACY_SKELETON_OFFSET, version)?;
            if skeleton.i_00 != 0 || !skeleton.bones.is_empty() {
                bcs.skeleton1 = Some(skeleton);
            }
        }
        BcsVersion::Current => {
            bcs.skeleton2 = indirect_skeleton(&reader, reader.u32(36)?, version)?;
            bcs.skeleton1 = indirect_skeleton(&reader, reader.u32(40)?, version)?;
        }
    }

    Ok(bcs)
}

/// Non-zero entries of the absolute pointer table whose offset is stored at
/// `header_field`, paired with their slot index.
fn pointers(reader: &Reader, header_field: usize, count: usize) -> Result<Vec<(usize, usize)>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let table = reader.resolve(0, reader.u32(header_field)?)?;
    read_table(reader, table, count)?
        .into_iter()
        .enumerate()
        .filter(|&(_, pointer)| pointer != 0)
        .map(|(id, pointer)| Ok((id, reader.resolve(0, pointer)?)))
        .collect()
}

fn indirect_skeleton(
    reader: &Reader,
    cell: u32,
    version: BcsVersion,
) -> Result<Option<BcsSkeleton>> {
    if cell == 0 {
        return Ok(None);
    }
    let pointer = reader.u32(reader.resolve(0, cell)?)?;
    if pointer == 0 {
        return Ok(None);
    }
    parse_skeleton(reader, reader.resolve(0, pointer)?, version).map(Some)
}

/// A string behind a pointer relative to `base`; 0 means empty.
fn string_at(reader: &Reader, base: usize, field: usize) -> Result<String> {
    match reader.u32(field)? {
        0 => Ok(String::new()),
        rel => reader.cstring(reader.resolve(base, rel)?),
    }
}

/// Start of a sub-array, or `None` when it has no entries.
fn sub_array(reader: &Reader, base: usize, count: usize, field: usize) -> Result<Option<usize>> {
    let rel = reader.u32(field)?;
    if count == 0 || rel == 0 {
        return Ok(None);
    }
    reader.resolve(base, rel).map(Some)
}

fn check_hide_flags(owner: &str, hide: u32, hide_mat: u32, max: u32) -> Result<()> {
    if hide > max || hide_mat > max {
        return Err(sanity(format!(
            "{owner}: hide flags {hide:#x}/{hide_mat:#x} exceed {max:#x}"
        )));
    }
    Ok(())
}

fn parse_part_set(reader: &Reader, at: usize, id: usize, version: BcsVersion) -> Result<PartSet> {
    let count = reader.i32(at + 20)?;
    if count != PARTS_PER_SET as i32 {
        return Err(sanity(format!(
            "part set {id} has {count} parts, expected {PARTS_PER_SET}"
        )));
    }
    let table = reader.resolve(at, reader.u32(at + 24)?)?;
    let mut set = PartSet::new(id);
    let offsets = read_table(reader, table, PARTS_PER_SET)?;
    for (part_type, rel) in PartType::ALL.into_iter().zip(offsets) {
        if rel == 0 {
            continue;
        }
        let part = parse_part(reader, reader.resolve(at, rel)?, version)
            .map_err(|e| match e {
                CodecError::SanityCheckFailed(m) => {
                    sanity(format!("part set {id} {part_type:?}: {m}"))
                }
                other => other,
            })?;
        set.set(part_type, part);
    }
    Ok(set)
}

fn parse_part(reader: &Reader, at: usize, version: BcsVersion) -> Result<Part> {
    let hide = reader.u32(at + 28)?;
    let hide_mat = reader.u32(at + 32)?;
    check_hide_flags("part", hide, hide_mat, MAX_PART_HIDE_FLAGS)?;

    let selector_count = reader.u16(at + 18)? as usize;
    let color_selectors = match sub_array(reader, at, selector_count, at + 20)? {
        Some(start) => (0..selector_count)
            .map(|i| {
                Ok(ColorSelector {
                    part_color_group: reader.u16(start + 4 * i)?,
                    color_index: reader.u16(start + 4 * i + 2)?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let physics_count = reader.u16(at + 74)? as usize;
    let physics_parts = match sub_array(reader, at, physics_count, at + 76)? {
        Some(start) => (0..physics_count)
            .map(|i| parse_physics_part(reader, start + super::PHYSICS_PART_SIZE * i))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let unk3 = match version {
        BcsVersion::Legacy => Vec::new(),
        BcsVersion::Current => {
            let count = reader.u16(at + 82)? as usize;
            match sub_array(reader, at, count, at + 84)? {
                Some(start) => (0..count)
                    .map(|i| {
                        let entry = start + 12 * i;
                        let mut values = [0i16; 6];
                        for (j, value) in values.iter_mut().enumerate() {
                            *value = reader.i16(entry + 2 * j)?;
                        }
                        Ok(Unk3 { values })
                    })
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            }
        }
    };

    Ok(Part {
        model: reader.i16(at)?,
        model2: reader.i16(at + 2)?,
        texture: reader.i16(at + 4)?,
        shader: reader.i16(at + 16)?,
        flags: PartFlags::from_bits_retain(reader.u32(at + 24)?),
        hide_flags: PartTypeFlags::from_bits_retain(hide),
        hide_mat_flags: PartTypeFlags::from_bits_retain(hide_mat),
        f_36: reader.f32(at + 36)?,
        f_40: reader.f32(at + 40)?,
        i_44: reader.i32(at + 44)?,
        i_48: reader.i32(at + 48)?,
        chara_code: reader.fixed_string(at + 52, 4)?,
        emd_path: string_at(reader, at, at + 56)?,
        emm_path: string_at(reader, at, at + 60)?,
        emb_path: string_at(reader, at, at + 64)?,
        ean_path: string_at(reader, at, at + 68)?,
        color_selectors,
        physics_parts,
        unk3,
    })
}

fn parse_physics_part(reader: &Reader, at: usize) -> Result<PhysicsPart> {
    let hide = reader.u32(at + 28)?;
    let hide_mat = reader.u32(at + 32)?;
    check_hide_flags("physics part", hide, hide_mat, MAX_PHYSICS_HIDE_FLAGS)?;
    Ok(PhysicsPart {
        model1: reader.i16(at)?,
        model2: reader.i16(at + 2)?,
        texture: reader.i16(at + 4)?,
        flags: PartFlags::from_bits_retain(reader.u32(at + 24)?),
        hide_flags: PartTypeFlags::from_bits_retain(hide),
        hide_mat_flags: PartTypeFlags::from_bits_retain(hide_mat),
        chara_code: reader.fixed_string(at + 36, 4)?,
        emd_path: string_at(reader, at, at + 40)?,
        emm_path: string_at(reader, at, at + 44)?,
        emb_path: string_at(reader, at, at + 48)?,
        ean_path: string_at(reader, at, at + 52)?,
        bone_to_attach: string_at(reader, at, at + 56)?,
        scd_path: string_at(reader, at, at + 60)?,
    })
}

fn parse_part_color(reader: &Reader, at: usize, id: usize) -> Result<PartColor> {
    let name = string_at(reader, at, at)?;
    let count = reader.u16(at + 10)? as usize;
    let mut colors = Vec::with_capacity(count);
    if let Some(start) = sub_array(reader, at, count, at + 12)? {
        for index in 0..count {
            let entry = start + super::COLORS_SIZE * index;
            let mut quads = [[0.0f32; 4]; 4];
            for (q, quad) in quads.iter_mut().enumerate() {
                *quad = reader.f32_array::<4>(entry + 16 * q)?;
            }
            let entry = Colors { id: index, colors: quads };
            if !entry.is_null() {
                colors.push(entry);
            }
        }
    }
    Ok(PartColor { id, name, colors })
}

fn parse_body(reader: &Reader, at: usize, id: usize) -> Result<Body> {
    let count = reader.u16(at + 2)? as usize;
    let scales = match sub_array(reader, at, count, at + 4)? {
        Some(start) => (0..count)
            .map(|i| {
                let entry = start + 16 * i;
                let [x, y, z] = reader.f32_array::<3>(entry)?;
                Ok(BoneScale {
                    bone_name: string_at(reader, entry, entry + 12)?,
                    scale: [x, y, z],
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(Body { id, scales })
}

fn parse_skeleton(reader: &Reader, at: usize, version: BcsVersion) -> Result<BcsSkeleton> {
    let i_00 = reader.i16(at)?;
    let count = reader.u16(at + 2)? as usize;
    let base = match version {
        BcsVersion::Legacy => super::LEGACY_SKELETON_BASE,
        BcsVersion::Current => at,
    };
    let bones = match sub_array(reader, base, count, at + 4)? {
        Some(start) => (0..count)
            .map(|i| {
                let entry = start + super::BCS_BONE_SIZE * i;
                let (name_field, floats) = match version {
                    BcsVersion::Legacy => (entry + 12, entry + 16),
                    BcsVersion::Current => (entry + 48, entry + 12),
                };
                Ok(BcsBone {
                    name: string_at(reader, entry, name_field)?,
                    i_00: reader.i32(entry)?,
                    i_04: reader.i32(entry + 4)?,
                    i_08: reader.i32(entry + 8)?,
                    values: reader.f32_array::<9>(floats)?,
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(BcsSkeleton { i_00, bones })
}
