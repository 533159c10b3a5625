use super::types::*;
use super::{EMD_MAGIC, MAX_PALETTE_BONES};
use crate::error::{CodecError, Result, unencodable};
use crate::io::{pad_to, write_cstring, write_f32s, write_header_prefix};
use crate::offsets::{OffsetTable, Slot};
use crate::vertex::{VertexFormat, encode_vertex, vertex_size};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

const HEADER_SIZE: u16 = 28;
const GROUP_HEADER_SIZE: u32 = 16;

pub fn write_emd(emd: &EmdFile) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_header_prefix(&mut out, EMD_MAGIC, HEADER_SIZE)?;
    out.write_u32::<LittleEndian>(emd.version)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(count_u16(emd.models.len(), "model table")?)?;
    let model_table = Slot::reserve(&mut out);
    let name_table = Slot::reserve(&mut out);

    model_table.commit(&mut out, 0)?;
    let models = OffsetTable::reserve(&mut out, emd.models.len());
    for (index, model) in emd.models.iter().enumerate() {
        pad_to(&mut out, 16);
        models.commit(&mut out, index, 0)?;
        write_model(&mut out, model)
            .map_err(|e| e.within(format!("model {index} ({})", model.name)))?;
    }

    pad_to(&mut out, 4);
    name_table.commit(&mut out, 0)?;
    let names = OffsetTable::reserve(&mut out, emd.models.len());
    for (index, model) in emd.models.iter().enumerate() {
        names.commit(&mut out, index, 0)?;
        write_cstring(&mut out, &model.name)?;
    }

    debug!(models = emd.models.len(), bytes = out.len(), "wrote emd");
    Ok(out)
}

fn write_model(out: &mut Vec<u8>, model: &Model) -> Result<()> {
    let base = out.len();
    out.write_u16::<LittleEndian>(model.unknown_00)?;
    out.write_u16::<LittleEndian>(count_u16(model.meshes.len(), "mesh table")?)?;
    let table = Slot::reserve(out);
    table.commit(out, base)?;
    let meshes = OffsetTable::reserve(out, model.meshes.len());
    pad_to(out, 16);

    for (index, mesh) in model.meshes.iter().enumerate() {
        pad_to(out, 16);
        meshes.commit(out, index, base)?;
        write_mesh(out, mesh).map_err(|e| e.within(format!("mesh {index} ({})", mesh.name)))?;
    }
    Ok(())
}

fn write_mesh(out: &mut Vec<u8>, mesh: &Mesh) -> Result<()> {
    let base = out.len();
    write_f32s(out, &mesh.aabb.floats())?;
    let name = Slot::reserve(out);
    out.write_u16::<LittleEndian>(mesh.unknown_52)?;
    out.write_u16::<LittleEndian>(count_u16(mesh.submeshes.len(), "submesh table")?)?;
    let table = Slot::reserve(out);

    name.commit(out, base)?;
    write_cstring(out, &mesh.name)?;
    pad_to(out, 4);

    table.commit(out, base)?;
    let submeshes = OffsetTable::reserve(out, mesh.submeshes.len());
    pad_to(out, 16);

    for (index, submesh) in mesh.submeshes.iter().enumerate() {
        pad_to(out, 16);
        submeshes.commit(out, index, base)?;
        write_submesh(out, submesh)
            .map_err(|e| e.within(format!("submesh {index} ({})", submesh.name)))?;
    }
    Ok(())
}

fn write_submesh(out: &mut Vec<u8>, submesh: &Submesh) -> Result<()> {
    validate_submesh(submesh)?;
    let base = out.len();
    let samplers = u8::try_from(submesh.samplers.len())
        .map_err(|_| {
            let detail = format!("{} samplers exceed 255", submesh.samplers.len());
            unencodable("sampler table", detail)
        })?;

    write_f32s(out, &submesh.aabb.floats())?;
    out.write_u32::<LittleEndian>(submesh.flags.bits())?;
    out.write_u32::<LittleEndian>(vertex_size(submesh.flags) as u32)?;
    out.write_u32::<LittleEndian>(submesh.vertices.len() as u32)?;
    let vertex_slot = Slot::reserve(out);
    let name_slot = Slot::reserve(out);
    out.write_u8(submesh.unknown_68)?;
    out.write_u8(samplers)?;
    let group_count = count_u16(submesh.triangle_groups.len(), "triangle group table")?;
    out.write_u16::<LittleEndian>(group_count)?;
    let sampler_slot = Slot::reserve(out);
    let group_slot = Slot::reserve(out);

    name_slot.commit(out, base)?;
    write_cstring(out, &submesh.name)?;
    pad_to(out, 4);

    sampler_slot.commit(out, base)?;
    for sampler in &submesh.samplers {
        out.write_u8(sampler.flag0)?;
        out.write_u8(sampler.texture_index)?;
        out.write_u8(sampler.address_v.to_nibble() << 4 | sampler.address_u.to_nibble())?;
        out.write_u8(sampler.filtering_mag.to_nibble() << 4 | sampler.filtering_min.to_nibble())?;
        write_f32s(out, &[sampler.scale_u, sampler.scale_v])?;
    }

    group_slot.commit(out, base)?;
    let groups = OffsetTable::reserve(out, submesh.triangle_groups.len());
    for (index, group) in submesh.triangle_groups.iter().enumerate() {
        groups.commit(out, index, base)?;
        write_triangle_group(out, group).map_err(|e| e.within(format!("triangle group {index}")))?;
    }

    vertex_slot.commit(out, base)?;
    for (index, vertex) in submesh.vertices.iter().enumerate() {
        encode_vertex(submesh.flags, vertex, out).map_err(|e| e.within(format!("vertex {index}")))?;
    }
    Ok(())
}

fn write_triangle_group(out: &mut Vec<u8>, group: &TriangleGroup) -> Result<()> {
    let base = out.len();
    let count = group.indices.len();
    out.write_u32::<LittleEndian>(count as u32)?;
    out.write_u32::<LittleEndian>(group.bones.len() as u32)?;
    out.write_u32::<LittleEndian>(if count > 0 { GROUP_HEADER_SIZE } else { 0 })?;
    let bone_slot = Slot::reserve(out);

    let wide = count > u16::MAX as usize;
    for &index in &group.indices {
        if wide {
            out.write_u32::<LittleEndian>(index)?;
        } else {
            let narrow = u16::try_from(index).map_err(|_| {
                unencodable(
                    "index buffer",
                    format!(
                        "index {index} does not fit the 16-bit buffer of a {count}-index group"
                    ),
                )
            })?;
            out.write_u16::<LittleEndian>(narrow)?;
        }
    }
    pad_to(out, 4);

    if !group.bones.is_empty() {
        bone_slot.commit(out, base)?;
        let names = OffsetTable::reserve(out, group.bones.len());
        for (index, bone) in group.bones.iter().enumerate() {
            if bone.is_empty() {
                continue;
            }
            names.commit(out, index, base)?;
            write_cstring(out, bone)?;
        }
        pad_to(out, 4);
    }
    Ok(())
}

/// Structural checks the decoder cannot express in types: palette capacity,
/// index range and palette-local bone ids.
pub fn validate_submesh(submesh: &Submesh) -> Result<()> {
    let vertex_count = submesh.vertices.len();
    let skinned = submesh.flags.contains(VertexFormat::BLEND_WEIGHT);
    for (group_index, group) in submesh.triangle_groups.iter().enumerate() {
        if group.bones.len() > MAX_PALETTE_BONES {
            return Err(CodecError::PaletteCapacityExceeded {
                group: group_index,
                bones: group.bones.len(),
            });
        }
        for &index in &group.indices {
            let vertex = submesh.vertices.get(index as usize).ok_or_else(|| {
                unencodable(
                    format!("triangle group {group_index}"),
                    format!("index {index} is past the {vertex_count} vertices"),
                )
            })?;
            if !skinned || group.bones.is_empty() {
                continue;
            }
            for (&id, &weight) in vertex.bone_ids.iter().zip(&vertex.bone_weights) {
                if weight.abs() > 1e-4 && id as usize >= group.bones.len() {
                    return Err(unencodable(
                        format!("triangle group {group_index}, vertex {index}"),
                        format!("bone id {id} is outside the {}-bone palette", group.bones.len()),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn count_u16(count: usize, table: &str) -> Result<u16> {
    u16::try_from(count).map_err(|_| unencodable(table, format!("{count} entries exceed u16")))
}
