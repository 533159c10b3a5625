use crate::vertex::{Vertex, VertexFormat};
use serde::{Deserialize, Serialize};

/// Bounding box as stored on meshes and submeshes. The fourth lane of each row
/// carries one axis of the box extent: `center.w = size_x`, `min.w = size_y`,
/// `max.w = size_z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: [f32; 4],
    pub min: [f32; 4],
    pub max: [f32; 4],
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Self {
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        let mut any = false;
        for point in points {
            any = true;
            for axis in 0..3 {
                lo[axis] = lo[axis].min(point[axis]);
                hi[axis] = hi[axis].max(point[axis]);
            }
        }
        if !any {
            return Self::default();
        }
        let size = [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]];
        Self {
            center: [
                (hi[0] + lo[0]) / 2.0,
                (hi[1] + lo[1]) / 2.0,
                (hi[2] + lo[2]) / 2.0,
                size[0],
            ],
            min: [lo[0], lo[1], lo[2], size[1]],
            max: [hi[0], hi[1], hi[2], size[2]],
        }
    }

    pub fn floats(&self) -> [f32; 12] {
        let mut out = [0.0; 12];
        out[..4].copy_from_slice(&self.center);
        out[4..8].copy_from_slice(&self.min);
        out[8..].copy_from_slice(&self.max);
        out
    }

    pub fn from_floats(values: [f32; 12]) -> Self {
        let mut aabb = Self::default();
        aabb.center.copy_from_slice(&values[..4]);
        aabb.min.copy_from_slice(&values[4..8]);
        aabb.max.copy_from_slice(&values[8..]);
        aabb
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
    Unknown(u8),
}

impl AddressMode {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0 => AddressMode::Wrap,
            1 => AddressMode::Mirror,
            2 => AddressMode::Clamp,
            other => AddressMode::Unknown(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            AddressMode::Wrap => 0,
            AddressMode::Mirror => 1,
            AddressMode::Clamp => 2,
            AddressMode::Unknown(other) => other & 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filtering {
    None,
    Point,
    Linear,
    Unknown(u8),
}

impl Filtering {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            0 => Filtering::None,
            1 => Filtering::Point,
            2 => Filtering::Linear,
            other => Filtering::Unknown(other),
        }
    }

    pub fn to_nibble(self) -> u8 {
        match self {
            Filtering::None => 0,
            Filtering::Point => 1,
            Filtering::Linear => 2,
            Filtering::Unknown(other) => other & 0x0F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureSampler {
    pub flag0: u8,
    pub texture_index: u8,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub filtering_min: Filtering,
    pub filtering_mag: Filtering,
    pub scale_u: f32,
    pub scale_v: f32,
}

impl TextureSampler {
    /// Linear, wrapped, unscaled sampler bound to `texture_index`.
    pub fn linear(texture_index: u8) -> Self {
        Self {
            flag0: 0,
            texture_index,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            filtering_min: Filtering::Linear,
            filtering_mag: Filtering::Linear,
            scale_u: 1.0,
            scale_v: 1.0,
        }
    }

    /// The pair used when a submesh is exported without explicit samplers.
    pub fn defaults() -> Vec<Self> {
        vec![Self::linear(0), Self::linear(1)]
    }
}

/// A batch of triangles drawn with one bone palette.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleGroup {
    pub indices: Vec<u32>,
    /// Palette-local bone id `n` refers to `bones[n]`.
    pub bones: Vec<String>,
}

impl TriangleGroup {
    pub fn faces(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|f| [f[0], f[1], f[2]])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submesh {
    pub name: String,
    pub aabb: Aabb,
    pub flags: VertexFormat,
    pub unknown_68: u8,
    pub vertices: Vec<Vertex>,
    pub samplers: Vec<TextureSampler>,
    pub triangle_groups: Vec<TriangleGroup>,
}

impl Submesh {
    pub fn faces(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.triangle_groups.iter().flat_map(TriangleGroup::faces)
    }

    pub fn recompute_aabb(&mut self) {
        self.aabb = Aabb::from_points(self.vertices.iter().map(|v| &v.position));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub aabb: Aabb,
    pub unknown_52: u16,
    pub submeshes: Vec<Submesh>,
}

impl Mesh {
    /// Wraps submeshes, deriving the mesh box from every vertex they hold.
    pub fn from_submeshes(name: impl Into<String>, submeshes: Vec<Submesh>) -> Self {
        let aabb = Aabb::from_points(
            submeshes
                .iter()
                .flat_map(|s| s.vertices.iter().map(|v| &v.position)),
        );
        Self {
            name: name.into(),
            aabb,
            unknown_52: 0,
            submeshes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub unknown_00: u16,
    pub meshes: Vec<Mesh>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmdFile {
    pub version: u32,
    pub models: Vec<Model>,
}

impl EmdFile {
    pub const DEFAULT_VERSION: u32 = 0x201;

    /// A file holding one model with one mesh, both called `name`.
    pub fn single(name: impl Into<String>, submeshes: Vec<Submesh>) -> Self {
        let name = name.into();
        Self {
            version: Self::DEFAULT_VERSION,
            models: vec![Model {
                name: name.clone(),
                unknown_00: 0,
                meshes: vec![Mesh::from_submeshes(name, submeshes)],
            }],
        }
    }

    pub fn submeshes(&self) -> impl Iterator<Item = &Submesh> {
        self.models
            .iter()
            .flat_map(|m| m.meshes.iter())
            .flat_map(|m| m.submeshes.iter())
    }
}
