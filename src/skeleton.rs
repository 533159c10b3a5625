//! Bone hierarchies, both as standalone `.esk` files and as the block embedded in
//! animation files.

use crate::error::{Result, sanity, unencodable};
use crate::io::{Magic, Reader, pad_to, write_cstring, write_f32s, write_header_prefix};
use crate::offsets::{OffsetTable, Slot, push_u32, read_table, write_u32_at};
use byteorder::{LittleEndian, WriteBytesExt};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ESK_MAGIC: Magic = *b"#ESK";
const ESK_HEADER_SIZE: u16 = 32;
const SKELETON_HEADER_SIZE: usize = 36;
const INDEX_ENTRY_SIZE: usize = 8;
const TRANSFORM_SIZE: usize = 48;
const MATRIX_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl Transform {
    pub fn to_mat4(&self) -> Mat4 {
        let [x, y, z, w] = self.rotation;
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            Quat::from_xyzw(x, y, z, w),
            Vec3::from_array(self.position),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub parent: i16,
    pub child: i16,
    pub sibling: i16,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub flag: u16,
    pub unknown: u32,
    pub id: u64,
    pub bones: Vec<Bone>,
    /// Row-major, translation in the last row. Either one per bone or absent.
    pub absolute_matrices: Option<Vec<[f32; 16]>>,
}

impl Skeleton {
    /// Builds a skeleton from `(name, parent, transform)` triples, deriving the
    /// child and sibling links from the parent indices.
    pub fn from_parents(entries: Vec<(String, i16, Transform)>) -> Result<Self> {
        let bones = entries
            .into_iter()
            .map(|(name, parent, transform)| Bone {
                name,
                parent,
                child: -1,
                sibling: -1,
                transform,
            })
            .collect();
        let mut skeleton = Self {
            flag: 0,
            unknown: 0,
            id: 0,
            bones,
            absolute_matrices: None,
        };
        skeleton.relink();
        skeleton.validate()?;
        skeleton.id = skeleton.name_hash();
        Ok(skeleton)
    }

    /// Regenerates child and sibling links from the parent array. The first bone
    /// naming a parent becomes its child; later ones chain through `sibling`.
    pub fn relink(&mut self) {
        for bone in &mut self.bones {
            bone.child = -1;
            bone.sibling = -1;
        }
        let count = self.bones.len();
        let mut last_child: Vec<Option<usize>> = vec![None; count];
        let mut last_root: Option<usize> = None;
        for index in 0..count {
            let parent = self.bones[index].parent;
            let previous = if parent >= 0 && (parent as usize) < count {
                let slot = &mut last_child[parent as usize];
                let previous = slot.replace(index);
                if previous.is_none() {
                    self.bones[parent as usize].child = index as i16;
                }
                previous
            } else {
                last_root.replace(index)
            };
            if let Some(previous) = previous {
                self.bones[previous].sibling = index as i16;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let count = self.bones.len();
        let in_range = |link: i16| link == -1 || (link >= 0 && (link as usize) < count);
        for (index, bone) in self.bones.iter().enumerate() {
            let links = [
                ("parent", bone.parent),
                ("child", bone.child),
                ("sibling", bone.sibling),
            ];
            for (label, link) in links {
                if !in_range(link) {
                    return Err(sanity(format!(
                        "bone {index} ({}) has {label} index {link} outside 0..{count}",
                        bone.name
                    )));
                }
            }
        }
        for start in 0..count {
            let mut current = self.bones[start].parent;
            let mut steps = 0;
            while current >= 0 {
                steps += 1;
                if steps > count {
                    return Err(sanity(format!(
                        "parent chain of bone {start} ({}) contains a cycle",
                        self.bones[start].name
                    )));
                }
                current = self.bones[current as usize].parent;
            }
        }
        if let Some(matrices) = &self.absolute_matrices {
            if matrices.len() != count {
                return Err(sanity(format!(
                    "{} absolute matrices for {count} bones",
                    matrices.len()
                )));
            }
        }
        Ok(())
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    /// World matrix from the stored absolute matrix, if the skeleton carries them.
    pub fn absolute_world_matrix(&self, index: usize) -> Option<Mat4> {
        let stored = self.absolute_matrices.as_ref()?.get(index)?;
        Some(Mat4::from_cols_array(stored).inverse())
    }

    /// World matrices obtained by chaining local transforms up to the roots.
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut world: Vec<Option<Mat4>> = vec![None; self.bones.len()];
        for index in 0..self.bones.len() {
            let mut chain = vec![index];
            let mut parent = self.bones[index].parent;
            while parent >= 0
                && (parent as usize) < self.bones.len()
                && world[parent as usize].is_none()
            {
                if chain.contains(&(parent as usize)) {
                    break;
                }
                chain.push(parent as usize);
                parent = self.bones[parent as usize].parent;
            }
            for &bone in chain.iter().rev() {
                if world[bone].is_some() {
                    continue;
                }
                let local = self.bones[bone].transform.to_mat4();
                let parent = self.bones[bone].parent;
                let base = if parent >= 0 {
                    world.get(parent as usize).copied().flatten()
                } else {
                    None
                };
                world[bone] = Some(base.map_or(local, |parent| parent * local));
            }
        }
        world.into_iter().map(|m| m.unwrap_or(Mat4::IDENTITY)).collect()
    }

    /// FNV-1a over the bone names, used as the id of freshly built skeletons.
    fn name_hash(&self) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for bone in &self.bones {
            for byte in bone.name.bytes().chain(std::iter::once(0)) {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
        hash.max(1)
    }
}

/// Reads a skeleton block whose pointers are relative to `base`.
pub fn parse_skeleton(reader: &Reader, base: usize) -> Result<Skeleton> {
    let bone_count = reader.i16(base)?;
    if bone_count < 0 {
        return Err(sanity(format!("negative bone count {bone_count}")));
    }
    let count = bone_count as usize;
    let flag = reader.u16(base + 2)?;
    let index_table = reader.resolve(base, reader.u32(base + 4)?)?;
    let name_table = reader.resolve(base, reader.u32(base + 8)?)?;
    let transform_table = reader.resolve(base, reader.u32(base + 12)?)?;
    let absolute_rel = reader.u32(base + 16)?;
    let unknown = reader.u32(base + 20)?;
    let id = reader.u64(base + 28)?;
    debug!(bones = count, base, has_absolute = absolute_rel != 0, "parsing skeleton");

    let name_offsets = read_table(reader, name_table, count)?;
    let mut bones = Vec::with_capacity(count);
    for (index, name_rel) in name_offsets.into_iter().enumerate() {
        let entry = index_table + INDEX_ENTRY_SIZE * index;
        let name = reader.cstring(reader.resolve(base, name_rel)?)?;
        let [px, py, pz, pw, rx, ry, rz, rw, sx, sy, sz, sw] =
            reader.f32_array::<12>(transform_table + TRANSFORM_SIZE * index)?;
        bones.push(Bone {
            name,
            parent: reader.i16(entry)?,
            child: reader.i16(entry + 2)?,
            sibling: reader.i16(entry + 4)?,
            transform: Transform {
                position: [px * pw, py * pw, pz * pw],
                rotation: [rx, ry, rz, rw],
                scale: [sx * sw, sy * sw, sz * sw],
            },
        });
    }

    let absolute_matrices = if absolute_rel != 0 {
        let table = reader.resolve(base, absolute_rel)?;
        let matrices = (0..count)
            .map(|index| reader.f32_array::<16>(table + MATRIX_SIZE * index))
            .collect::<Result<Vec<_>>>()?;
        Some(matrices)
    } else {
        None
    };

    let skeleton = Skeleton {
        flag,
        unknown,
        id,
        bones,
        absolute_matrices,
    };
    skeleton.validate()?;
    Ok(skeleton)
}

/// Appends a skeleton block at the current end of `out`; its pointers are
/// relative to that position.
pub fn write_skeleton(out: &mut Vec<u8>, skeleton: &Skeleton) -> Result<()> {
    skeleton.validate()?;
    let count = i16::try_from(skeleton.bones.len())
        .map_err(|_| {
            unencodable("skeleton", format!("{} bones exceed i16", skeleton.bones.len()))
        })?;
    let base = out.len();

    out.write_i16::<LittleEndian>(count)?;
    out.write_u16::<LittleEndian>(skeleton.flag)?;
    let index_slot = Slot::reserve(out);
    let name_slot = Slot::reserve(out);
    let transform_slot = Slot::reserve(out);
    let absolute_slot = Slot::reserve(out);
    out.write_u32::<LittleEndian>(skeleton.unknown)?;
    let length_slot = Slot::reserve(out);
    out.write_u64::<LittleEndian>(skeleton.id)?;
    debug_assert_eq!(out.len() - base, SKELETON_HEADER_SIZE);

    index_slot.commit(out, base)?;
    for bone in &skeleton.bones {
        out.write_i16::<LittleEndian>(bone.parent)?;
        out.write_i16::<LittleEndian>(bone.child)?;
        out.write_i16::<LittleEndian>(bone.sibling)?;
        out.write_u16::<LittleEndian>(0)?;
    }

    name_slot.commit(out, base)?;
    let names = OffsetTable::reserve(out, skeleton.bones.len());
    for (index, bone) in skeleton.bones.iter().enumerate() {
        names.commit(out, index, base)?;
        write_cstring(out, &bone.name).map_err(|e| e.within(format!("bone {index} name")))?;
    }
    pad_to(out, 4);

    transform_slot.commit(out, base)?;
    for (index, bone) in skeleton.bones.iter().enumerate() {
        let t = &bone.transform;
        let [rx, ry, rz, rw] = t.rotation;
        write_f32s(
            out,
            &[
                t.position[0], t.position[1], t.position[2], 1.0,
                rx, ry, rz, rw,
                t.scale[0], t.scale[1], t.scale[2], 1.0,
            ],
        )
        .map_err(|e| e.within(format!("bone {index} ({}) transform", bone.name)))?;
    }

    if let Some(matrices) = &skeleton.absolute_matrices {
        absolute_slot.commit(out, base)?;
        for (index, matrix) in matrices.iter().enumerate() {
            write_f32s(out, matrix).map_err(|e| e.within(format!("bone {index} absolute matrix")))?;
        }
    }

    length_slot.commit(out, base)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EskFile {
    pub version: u16,
    pub unknown: u16,
    pub skeleton: Skeleton,
}

impl EskFile {
    pub fn new(skeleton: Skeleton) -> Self {
        Self {
            version: 1,
            unknown: 0,
            skeleton,
        }
    }
}

pub fn parse_esk(data: &[u8]) -> Result<EskFile> {
    let reader = Reader::new(data);
    reader.expect_magic(ESK_MAGIC)?;
    let version = reader.u16(8)?;
    let unknown = reader.u16(10)?;
    let skeleton_offset = reader.resolve(0, reader.u32(16)?)?;
    Ok(EskFile {
        version,
        unknown,
        skeleton: parse_skeleton(&reader, skeleton_offset)?,
    })
}

pub fn write_esk(esk: &EskFile) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_header_prefix(&mut out, ESK_MAGIC, ESK_HEADER_SIZE)?;
    out.write_u16::<LittleEndian>(esk.version)?;
    out.write_u16::<LittleEndian>(esk.unknown)?;
    let file_size = Slot::reserve(&mut out);
    let skeleton_offset = Slot::reserve(&mut out);
    let skeleton_length = Slot::reserve(&mut out);
    push_u32(&mut out, 0)?;
    push_u32(&mut out, 0)?;

    skeleton_offset.commit(&mut out, 0)?;
    let start = out.len();
    write_skeleton(&mut out, &esk.skeleton)?;
    let length = out.len() - start;
    write_u32_at(&mut out, skeleton_length.position(), length as u32)?;
    file_size.commit(&mut out, 0)?;
    Ok(out)
}
