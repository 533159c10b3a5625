//! `#EMM` material libraries: named shaders with typed parameter lists.

use crate::error::{Result, unencodable};
use crate::io::{Magic, Reader, write_fixed_string, write_header_prefix};
use crate::offsets::{OffsetTable, read_table};
use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const EMM_MAGIC: Magic = *b"#EMM";
const HEADER_SIZE: u16 = 16;
const NAME_SIZE: usize = 32;
const MATERIAL_HEADER_SIZE: usize = 68;
const PARAMETER_SIZE: usize = 40;

const TYPE_FLOAT: i32 = 0;
const TYPE_INT: i32 = 65537;
const TYPE_FLOAT2: i32 = 131074;
const TYPE_BOOL: i32 = 196611;

/// A parameter's 4-byte value slot, decoded according to its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    /// Float stored under the vector type tag.
    Float2(f32),
    Bool(bool),
    Unknown { tag: i32, raw: [u8; 4] },
}

impl ParamValue {
    pub fn decode(tag: i32, raw: [u8; 4]) -> Self {
        match tag {
            TYPE_FLOAT => ParamValue::Float(f32::from_le_bytes(raw)),
            TYPE_INT => ParamValue::Int(i32::from_le_bytes(raw)),
            TYPE_FLOAT2 => ParamValue::Float2(f32::from_le_bytes(raw)),
            TYPE_BOOL => match i32::from_le_bytes(raw) {
                0 => ParamValue::Bool(false),
                1 => ParamValue::Bool(true),
                _ => ParamValue::Unknown { tag, raw },
            },
            _ => ParamValue::Unknown { tag, raw },
        }
    }

    pub fn encode(&self) -> (i32, [u8; 4]) {
        match *self {
            ParamValue::Float(v) => (TYPE_FLOAT, v.to_le_bytes()),
            ParamValue::Int(v) => (TYPE_INT, v.to_le_bytes()),
            ParamValue::Float2(v) => (TYPE_FLOAT2, v.to_le_bytes()),
            ParamValue::Bool(v) => (TYPE_BOOL, (v as i32).to_le_bytes()),
            ParamValue::Unknown { tag, raw } => (tag, raw),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            ParamValue::Float(v) | ParamValue::Float2(v) => Some(v),
            ParamValue::Int(v) => Some(v as f32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialParam {
    pub name: String,
    pub value: ParamValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub shader: String,
    pub unknown_66: u16,
    pub params: Vec<MaterialParam>,
}

impl Material {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmmFile {
    pub version: u32,
    pub materials: Vec<Material>,
}

impl EmmFile {
    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }
}

pub fn parse_emm(data: &[u8]) -> Result<EmmFile> {
    let reader = Reader::new(data);
    reader.expect_magic(EMM_MAGIC)?;
    let version = reader.u32(8)?;
    let table_offset = reader.u32(12)?;
    // material pointers are based on the low half of the table offset
    let base = (table_offset & 0xFFFF) as usize;
    let table = reader.resolve(0, table_offset)?;
    let count = reader.u32(table)? as usize;
    debug!(version, materials = count, "parsing emm");

    let mut materials = Vec::with_capacity(count);
    for (index, rel) in read_table(&reader, table + 4, count)?.into_iter().enumerate() {
        if rel == 0 {
            debug!(index, "skipping empty material slot");
            continue;
        }
        materials.push(parse_material(&reader, reader.resolve(base, rel)?)?);
    }
    Ok(EmmFile { version, materials })
}

fn parse_material(reader: &Reader, at: usize) -> Result<Material> {
    let name = reader.fixed_string(at, NAME_SIZE)?;
    let shader = reader.fixed_string(at + NAME_SIZE, NAME_SIZE)?;
    let count = reader.u16(at + 64)? as usize;
    let unknown_66 = reader.u16(at + 66)?;
    let params = (0..count)
        .map(|i| {
            let entry = at + MATERIAL_HEADER_SIZE + PARAMETER_SIZE * i;
            let raw = reader.slice(entry + 36, 4)?;
            Ok(MaterialParam {
                name: reader.fixed_string(entry, NAME_SIZE)?,
                value: ParamValue::decode(
                    reader.i32(entry + 32)?,
                    [raw[0], raw[1], raw[2], raw[3]],
                ),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Material {
        name,
        shader,
        unknown_66,
        params,
    })
}

pub fn write_emm(emm: &EmmFile) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_header_prefix(&mut out, EMM_MAGIC, HEADER_SIZE)?;
    out.write_u32::<LittleEndian>(emm.version)?;
    let base = out.len() + 4;
    out.write_u32::<LittleEndian>(base as u32)?;

    out.write_u32::<LittleEndian>(emm.materials.len() as u32)?;
    let table = OffsetTable::reserve(&mut out, emm.materials.len());
    for (index, material) in emm.materials.iter().enumerate() {
        table.commit(&mut out, index, base)?;
        write_material(&mut out, material)
            .map_err(|e| e.within(format!("material {index} ({})", material.name)))?;
    }

    debug!(materials = emm.materials.len(), bytes = out.len(), "wrote emm");
    Ok(out)
}

fn write_material(out: &mut Vec<u8>, material: &Material) -> Result<()> {
    write_fixed_string(out, &material.name, NAME_SIZE)?;
    write_fixed_string(out, &material.shader, NAME_SIZE)?;
    let count = u16::try_from(material.params.len())
        .map_err(|_| unencodable("parameter list", "more than 65535 parameters"))?;
    out.write_u16::<LittleEndian>(count)?;
    out.write_u16::<LittleEndian>(material.unknown_66)?;
    for param in &material.params {
        write_fixed_string(out, &param.name, NAME_SIZE)
            .map_err(|e| e.within(format!("parameter {}", param.name)))?;
        let (tag, raw) = param.value.encode();
        out.write_i32::<LittleEndian>(tag)?;
        out.extend_from_slice(&raw);
    }
    Ok(())
}
