use super::EMD_MAGIC;
use super::types::*;
use crate::error::{CodecError, Result};
use crate::io::Reader;
use crate::offsets::read_table;
use crate::vertex::{VertexFormat, decode_vertex, vertex_size};
use tracing::{debug, warn};

const SUBMESH_HEADER_SIZE: usize = 80;
const SAMPLER_SIZE: usize = 12;
const GROUP_HEADER_SIZE: usize = 16;

pub fn parse_emd(data: &[u8]) -> Result<EmdFile> {
    let reader = Reader::new(data);
    reader.expect_magic(EMD_MAGIC)?;

    let version = reader.u32(8)?;
    let model_count = reader.u16(18)? as usize;
    let model_table = reader.resolve(0, reader.u32(20)?)?;
    let name_table = reader.resolve(0, reader.u32(24)?)?;
    debug!(version, model_count, "parsing emd");

    let model_offsets = read_table(&reader, model_table, model_count)?;
    let name_offsets = read_table(&reader, name_table, model_count)?;

    let mut models = Vec::with_capacity(model_count);
    let pairs = model_offsets.into_iter().zip(name_offsets);
    for (index, (model_offset, name_offset)) in pairs.enumerate() {
        if model_offset == 0 {
            debug!(index, "skipping absent model");
            continue;
        }
        let name = if name_offset != 0 {
            reader.cstring(reader.resolve(0, name_offset)?)?
        } else {
            String::new()
        };
        let base = reader.resolve(0, model_offset)?;
        models.push(parse_model(&reader, base, name)?);
    }

    Ok(EmdFile { version, models })
}

fn parse_model(reader: &Reader, base: usize, name: String) -> Result<Model> {
    let unknown_00 = reader.u16(base)?;
    let mesh_count = reader.u16(base + 2)? as usize;
    let mesh_table = reader.resolve(base, reader.u32(base + 4)?)?;

    let mut meshes = Vec::with_capacity(mesh_count);
    for offset in read_table(reader, mesh_table, mesh_count)? {
        if offset == 0 {
            continue;
        }
        meshes.push(parse_mesh(reader, reader.resolve(base, offset)?)?);
    }
    Ok(Model {
        name,
        unknown_00,
        meshes,
    })
}

fn parse_mesh(reader: &Reader, base: usize) -> Result<Mesh> {
    let aabb = Aabb::from_floats(reader.f32_array::<12>(base)?);
    let name = optional_name(reader, base, reader.u32(base + 48)?)?;
    let unknown_52 = reader.u16(base + 52)?;
    let submesh_count = reader.u16(base + 54)? as usize;
    let submesh_table = reader.resolve(base, reader.u32(base + 56)?)?;

    let mut submeshes = Vec::with_capacity(submesh_count);
    for offset in read_table(reader, submesh_table, submesh_count)? {
        if offset == 0 {
            continue;
        }
        submeshes.push(parse_submesh(reader, reader.resolve(base, offset)?)?);
    }
    Ok(Mesh {
        name,
        aabb,
        unknown_52,
        submeshes,
    })
}

fn parse_submesh(reader: &Reader, base: usize) -> Result<Submesh> {
    reader.slice(base, SUBMESH_HEADER_SIZE)?;
    let aabb = Aabb::from_floats(reader.f32_array::<12>(base)?);
    let flags = VertexFormat::from_bits_retain(reader.u32(base + 48)?);
    let declared = reader.u32(base + 52)? as usize;
    let vertex_count = reader.u32(base + 56)? as usize;
    let vertex_rel = reader.u32(base + 60)?;
    let name = optional_name(reader, base, reader.u32(base + 64)?)?;
    let unknown_68 = reader.u8(base + 68)?;
    let sampler_count = reader.u8(base + 69)? as usize;
    let group_count = reader.u16(base + 70)? as usize;
    let sampler_rel = reader.u32(base + 72)?;
    let group_table = reader.resolve(base, reader.u32(base + 76)?)?;

    let expected = vertex_size(flags);
    if declared != expected {
        return Err(CodecError::StrideMismatch { declared, expected });
    }

    let vertices = if vertex_count > 0 {
        let start = reader.resolve(base, vertex_rel)?;
        let total = vertex_count.checked_mul(declared).ok_or(CodecError::OffsetOutOfBounds {
            offset: start,
            len: usize::MAX,
            size: reader.len(),
        })?;
        let bytes = reader.slice(start, total)?;
        (0..vertex_count)
            .map(|i| decode_vertex(flags, &bytes[i * declared..(i + 1) * declared]))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let samplers = if sampler_count > 0 && sampler_rel != 0 {
        parse_samplers(reader, reader.resolve(base, sampler_rel)?, sampler_count)?
    } else {
        Vec::new()
    };

    let mut triangle_groups = Vec::with_capacity(group_count);
    for offset in read_table(reader, group_table, group_count)? {
        if offset == 0 {
            continue;
        }
        triangle_groups.push(parse_triangle_group(reader, reader.resolve(base, offset)?)?);
    }

    if flags.contains(VertexFormat::BLEND_WEIGHT)
        && triangle_groups.iter().any(|g| g.bones.is_empty() && !g.indices.is_empty())
    {
        warn!(submesh = %name, "skinned submesh has a triangle group without a bone palette");
    }

    Ok(Submesh {
        name,
        aabb,
        flags,
        unknown_68,
        vertices,
        samplers,
        triangle_groups,
    })
}

fn parse_samplers(reader: &Reader, start: usize, count: usize) -> Result<Vec<TextureSampler>> {
    (0..count)
        .map(|index| {
            let at = start + SAMPLER_SIZE * index;
            let address = reader.u8(at + 2)?;
            let filtering = reader.u8(at + 3)?;
            Ok(TextureSampler {
                flag0: reader.u8(at)?,
                texture_index: reader.u8(at + 1)?,
                address_u: AddressMode::from_nibble(address & 0x0F),
                address_v: AddressMode::from_nibble(address >> 4),
                filtering_min: Filtering::from_nibble(filtering & 0x0F),
                filtering_mag: Filtering::from_nibble(filtering >> 4),
                scale_u: reader.f32(at + 4)?,
                scale_v: reader.f32(at + 8)?,
            })
        })
        .collect()
}

fn parse_triangle_group(reader: &Reader, base: usize) -> Result<TriangleGroup> {
    let index_count = reader.u32(base)? as usize;
    let bone_count = reader.u32(base + 4)? as usize;
    let index_rel = reader.u32(base + 8)?;
    let bone_rel = reader.u32(base + 12)?;

    let index_start = if index_rel != 0 {
        reader.resolve(base, index_rel)?
    } else {
        base + GROUP_HEADER_SIZE
    };
    let wide = index_count > u16::MAX as usize;
    let width = if wide { 4 } else { 2 };
    let indices = (0..index_count)
        .map(|i| {
            let at = index_start + width * i;
            if wide {
                reader.u32(at)
            } else {
                reader.u16(at).map(u32::from)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let bones = if bone_count > 0 && bone_rel != 0 {
        let table = reader.resolve(base, bone_rel)?;
        read_table(reader, table, bone_count)?
            .into_iter()
            .map(|offset| optional_name(reader, base, offset))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    Ok(TriangleGroup { indices, bones })
}

fn optional_name(reader: &Reader, base: usize, offset: u32) -> Result<String> {
    if offset == 0 {
        return Ok(String::new());
    }
    reader.cstring(reader.resolve(base, offset)?)
}
