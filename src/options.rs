//! JSON options for OBJ to EMD export. Every field is optional.

use crate::emd::{EmdFile, TextureSampler};
use crate::error::Result;
use crate::vertex::VertexFormat;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjExportOptions {
    pub model_name: String,
    pub version: u32,
    /// Store vertex channels as halves.
    pub compressed: bool,
    /// Bone every imported vertex is rigidly bound to. Without one the
    /// submeshes carry no blend weights.
    pub bone: Option<String>,
    /// Empty means the two default linear samplers.
    pub samplers: Vec<TextureSampler>,
}

impl Default for ObjExportOptions {
    fn default() -> Self {
        Self {
            model_name: "model".to_string(),
            version: EmdFile::DEFAULT_VERSION,
            compressed: false,
            bone: None,
            samplers: Vec::new(),
        }
    }
}

impl ObjExportOptions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn vertex_format(&self, has_normals: bool, has_uvs: bool) -> VertexFormat {
        let mut flags = VertexFormat::POSITION;
        flags.set(VertexFormat::NORMAL, has_normals);
        flags.set(VertexFormat::TEX_UV, has_uvs);
        flags.set(VertexFormat::BLEND_WEIGHT, self.bone.is_some());
        flags.set(VertexFormat::COMPRESSED, self.compressed);
        flags
    }
}
