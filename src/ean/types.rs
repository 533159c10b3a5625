use crate::skeleton::Skeleton;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Position,
    Rotation,
    Scale,
    Unknown(u8),
}

impl ComponentKind {
    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => ComponentKind::Position,
            1 => ComponentKind::Rotation,
            2 => ComponentKind::Scale,
            other => ComponentKind::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ComponentKind::Position => 0,
            ComponentKind::Rotation => 1,
            ComponentKind::Scale => 2,
            ComponentKind::Unknown(other) => other,
        }
    }
}

/// Storage width of keyframe values, chosen once per animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FloatPrecision {
    Half,
    Single,
}

impl FloatPrecision {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(FloatPrecision::Half),
            2 => Some(FloatPrecision::Single),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            FloatPrecision::Half => 1,
            FloatPrecision::Single => 2,
        }
    }

    pub fn value_size(self) -> usize {
        match self {
            FloatPrecision::Half => 8,
            FloatPrecision::Single => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: u16,
    pub value: [f32; 4],
}

impl Keyframe {
    pub fn new(frame: u16, value: [f32; 4]) -> Self {
        Self { frame, value }
    }
}

/// One animated channel. Its keyframes are independent of the node's other
/// components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub kind: ComponentKind,
    pub i_01: u8,
    pub i_02: i16,
    pub keyframes: Vec<Keyframe>,
}

impl Component {
    pub fn max_frame(&self) -> Option<u16> {
        self.keyframes.iter().map(|k| k.frame).max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub bone_index: i16,
    pub components: Vec<Component>,
}

impl Node {
    pub fn component(&self, kind: ComponentKind) -> Option<&Component> {
        self.components.iter().find(|c| c.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub name: String,
    /// Slot in the file's animation table. Gaps are legal.
    pub index: usize,
    pub frame_count: u32,
    pub precision: FloatPrecision,
    pub nodes: Vec<Node>,
}

impl Animation {
    pub fn max_frame(&self) -> Option<u16> {
        self.nodes
            .iter()
            .flat_map(|n| n.components.iter())
            .filter_map(Component::max_frame)
            .max()
    }

    /// Frame indices are 16-bit once any frame number can exceed a byte.
    pub fn wide_frame_indices(&self) -> bool {
        self.frame_count > 255 || self.max_frame().is_some_and(|f| f > 255)
    }

    pub fn node_for_bone(&self, bone_index: i16) -> Option<&Node> {
        self.nodes.iter().find(|n| n.bone_index == bone_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EanFile {
    pub version: u32,
    pub unknown_0c: u32,
    pub is_camera: bool,
    pub i_17: u8,
    pub skeleton: Skeleton,
    pub animations: Vec<Animation>,
}

impl EanFile {
    pub const CHARACTER_VERSION: u32 = 37505;
    pub const CAMERA_VERSION: u32 = 37568;

    pub fn character(skeleton: Skeleton, animations: Vec<Animation>) -> Self {
        Self {
            version: Self::CHARACTER_VERSION,
            unknown_0c: 0,
            is_camera: false,
            i_17: 4,
            skeleton,
            animations,
        }
    }

    pub fn node_name(&self, node: &Node) -> Option<&str> {
        usize::try_from(node.bone_index)
            .ok()
            .and_then(|i| self.skeleton.bones.get(i))
            .map(|bone| bone.name.as_str())
    }

    pub fn animation(&self, name: &str) -> Option<&Animation> {
        self.animations.iter().find(|a| a.name == name)
    }
}
