//! Export-side submesh assembly.
//!
//! Triangles arrive with named bone influences. Each triangle is placed in the
//! first triangle group whose palette can absorb its bones without growing past
//! [`MAX_PALETTE_BONES`]; otherwise a new group is opened. Vertex bone ids are
//! rewritten to palette-local indices of the group that draws them.

use super::MAX_PALETTE_BONES;
use super::types::{Aabb, Submesh, TextureSampler, TriangleGroup};
use crate::error::{CodecError, Result};
use crate::skeleton::Skeleton;
use crate::vertex::{Vertex, VertexFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    pub bone: String,
    pub weight: f32,
}

impl Influence {
    pub fn new(bone: impl Into<String>, weight: f32) -> Self {
        Self {
            bone: bone.into(),
            weight,
        }
    }
}

/// A vertex whose skinning is still expressed with bone names. The
/// `bone_ids`/`bone_weights` of `vertex` are ignored and regenerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinnedVertex {
    pub vertex: Vertex,
    pub influences: Vec<Influence>,
}

impl SkinnedVertex {
    pub fn rigid(vertex: Vertex) -> Self {
        Self {
            vertex,
            influences: Vec::new(),
        }
    }
}

#[derive(Default)]
struct PaletteGroup {
    bones: Vec<String>,
    lookup: HashMap<String, u8>,
    indices: Vec<u32>,
}

impl PaletteGroup {
    fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a String> {
        required.iter().filter(|name| !self.lookup.contains_key(*name)).collect()
    }

    fn intern(&mut self, name: &str) -> u8 {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = self.bones.len() as u8;
        self.bones.push(name.to_string());
        self.lookup.insert(name.to_string(), id);
        id
    }
}

/// Bit-exact identity of an emitted vertex, palette-local ids included.
#[derive(PartialEq, Eq, Hash)]
struct VertexKey([u32; 24], [u8; 4]);

impl VertexKey {
    fn of(vertex: &Vertex) -> Self {
        let mut bits = [0u32; 24];
        let floats = vertex
            .position
            .iter()
            .chain(&vertex.normal)
            .chain(&vertex.uv)
            .chain(&vertex.uv2)
            .chain(&vertex.tangent)
            .chain(&vertex.color)
            .chain(&vertex.bone_weights);
        for (slot, value) in bits.iter_mut().zip(floats) {
            *slot = value.to_bits();
        }
        VertexKey(bits, vertex.bone_ids)
    }
}

pub struct SubmeshBuilder<'a> {
    name: String,
    flags: VertexFormat,
    skeleton: Option<&'a Skeleton>,
    samplers: Vec<TextureSampler>,
    vertices: Vec<Vertex>,
    lookup: HashMap<VertexKey, u32>,
    groups: Vec<PaletteGroup>,
    submitted: usize,
}

impl<'a> SubmeshBuilder<'a> {
    pub fn new(name: impl Into<String>, flags: VertexFormat) -> Self {
        Self {
            name: name.into(),
            flags,
            skeleton: None,
            samplers: Vec::new(),
            vertices: Vec::new(),
            lookup: HashMap::new(),
            groups: Vec::new(),
            submitted: 0,
        }
    }

    /// Influences naming bones outside `skeleton` are rejected.
    pub fn with_skeleton(mut self, skeleton: &'a Skeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    pub fn with_samplers(mut self, samplers: Vec<TextureSampler>) -> Self {
        self.samplers = samplers;
        self
    }

    pub fn add_triangle(&mut self, corners: [SkinnedVertex; 3]) -> Result<()> {
        let mut required: Vec<String> = Vec::new();
        for (offset, corner) in corners.iter().enumerate() {
            let vertex_number = self.submitted + offset;
            if corner.influences.len() > 4 {
                return Err(CodecError::TooManyInfluences {
                    vertex: vertex_number,
                    count: corner.influences.len(),
                });
            }
            for influence in &corner.influences {
                if let Some(skeleton) = self.skeleton {
                    if skeleton.find_bone(&influence.bone).is_none() {
                        return Err(CodecError::UnknownBone(influence.bone.clone()));
                    }
                }
                if influence.weight > 0.0 && !required.contains(&influence.bone) {
                    required.push(influence.bone.clone());
                }
            }
        }

        self.submitted += corners.len();
        let group_index = self.group_for(&required);
        for corner in corners {
            let vertex = self.localize(group_index, corner);
            let key = VertexKey::of(&vertex);
            let index = match self.lookup.get(&key) {
                Some(&existing) => existing,
                None => {
                    let index = self.vertices.len() as u32;
                    self.vertices.push(vertex);
                    self.lookup.insert(key, index);
                    index
                }
            };
            self.groups[group_index].indices.push(index);
        }
        Ok(())
    }

    /// First-fit: the earliest group whose palette stays within capacity.
    fn group_for(&mut self, required: &[String]) -> usize {
        let fit = self.groups.iter().position(|group| {
            group.bones.len() + group.missing(required).len() <= MAX_PALETTE_BONES
        });
        let index = match fit {
            Some(index) => index,
            None => {
                self.groups.push(PaletteGroup::default());
                let group = self.groups.len() - 1;
                debug!(submesh = %self.name, group, "opened triangle group");
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[index];
        for name in required {
            group.intern(name);
        }
        index
    }

    fn localize(&mut self, group_index: usize, corner: SkinnedVertex) -> Vertex {
        let group = &mut self.groups[group_index];
        let mut influences: Vec<(u8, f32)> = corner
            .influences
            .iter()
            .filter(|influence| influence.weight > 0.0)
            .map(|influence| (group.intern(&influence.bone), influence.weight))
            .collect();
        influences.sort_by(|a, b| b.1.total_cmp(&a.1));
        influences.resize(4, (0, 0.0));

        let mut vertex = corner.vertex;
        if influences.iter().all(|&(_, weight)| weight <= 0.0) {
            vertex.bone_ids = [influences[0].0, 0, 0, 0];
            vertex.bone_weights = [0.0, 0.0, 0.0, 1.0];
        } else {
            // Heaviest influence goes last, where its weight is derived rather than stored.
            for (slot, &(id, weight)) in influences.iter().rev().enumerate() {
                vertex.bone_ids[slot] = id;
                vertex.bone_weights[slot] = weight;
            }
        }
        vertex
    }

    pub fn build(self) -> Result<Submesh> {
        let samplers = if self.samplers.is_empty() {
            TextureSampler::defaults()
        } else {
            self.samplers
        };
        let triangle_groups: Vec<TriangleGroup> = self
            .groups
            .into_iter()
            .map(|group| TriangleGroup {
                indices: group.indices,
                bones: group.bones,
            })
            .collect();
        for (index, group) in triangle_groups.iter().enumerate() {
            if group.bones.len() > MAX_PALETTE_BONES {
                return Err(CodecError::PaletteCapacityExceeded {
                    group: index,
                    bones: group.bones.len(),
                });
            }
            if self.flags.contains(VertexFormat::BLEND_WEIGHT) && group.bones.is_empty() {
                warn!(
                    submesh = %self.name,
                    group = index,
                    "skinned triangle group has no weighted bones"
                );
            }
        }
        let aabb = Aabb::from_points(self.vertices.iter().map(|v| &v.position));
        debug!(
            submesh = %self.name,
            vertices = self.vertices.len(),
            groups = triangle_groups.len(),
            "built submesh"
        );
        Ok(Submesh {
            name: self.name,
            aabb,
            flags: self.flags,
            unknown_68: 0,
            vertices: self.vertices,
            samplers,
            triangle_groups,
        })
    }
}
