//! Camera clips: a one-node skeleton whose components carry camera state
//! rather than a bone transform.
//!
//! * Position is the camera's eye position.
//! * Rotation holds the look-at target's position.
//! * Scale packs the roll (x, negated radians) and field of view (y, radians).

use super::builder::ClipBuilder;
use super::sample::sample;
use super::types::*;
use crate::error::Result;
use crate::skeleton::{Bone, Skeleton, Transform};
use serde::{Deserialize, Serialize};

pub const CAMERA_NODE: &str = "Node";
pub const CAMERA_COMPONENT_FLAG: u8 = 3;
pub const DEFAULT_FOV_DEGREES: f32 = 40.0;

pub fn camera_skeleton() -> Skeleton {
    Skeleton {
        flag: 0,
        unknown: 0,
        id: 1,
        bones: vec![Bone {
            name: CAMERA_NODE.to_string(),
            parent: -1,
            child: -1,
            sibling: -1,
            transform: Transform::default(),
        }],
        absolute_matrices: None,
    }
}

/// Camera state at one frame, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSample {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub roll: f32,
    pub fov: f32,
}

/// A keyed camera state. Keys without a target leave the target track
/// unkeyed at that frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraKey {
    pub frame: u16,
    pub position: [f32; 3],
    pub target: Option<[f32; 3]>,
    pub roll: f32,
    pub fov: f32,
}

fn camera_node(animation: &Animation) -> Option<&Node> {
    animation
        .nodes
        .iter()
        .find(|n| n.bone_index == 0)
        .or_else(|| animation.nodes.first())
}

pub fn sample_camera(animation: &Animation, frame: f32) -> CameraSample {
    let node = camera_node(animation);
    let component = |kind| node.and_then(|n| n.component(kind));

    let [px, py, pz, _] = sample(component(ComponentKind::Position), frame, [0.0, 0.0, 0.0, 1.0]);
    let target_track = component(ComponentKind::Rotation).or(component(ComponentKind::Position));
    let [tx, ty, tz, _] = sample(target_track, frame, [0.0, 0.0, 0.0, 1.0]);
    let [roll, fov, _, _] = sample(
        component(ComponentKind::Scale),
        frame,
        [0.0, DEFAULT_FOV_DEGREES.to_radians(), 0.0, 0.0],
    );

    CameraSample {
        position: [px, py, pz],
        target: [tx, ty, tz],
        roll: -roll.to_degrees(),
        fov: fov.to_degrees(),
    }
}

/// Builds a half-precision camera clip. Components are written position,
/// scale, then target, and the clip is at least `frame_count` frames long.
pub fn build_camera_clip(
    name: impl Into<String>,
    index: usize,
    keys: &[CameraKey],
    frame_count: Option<u32>,
) -> Result<Animation> {
    let skeleton = camera_skeleton();
    let mut builder = ClipBuilder::new(&skeleton, name).component_flag(CAMERA_COMPONENT_FLAG);
    if let Some(frame_count) = frame_count {
        builder = builder.frame_count(frame_count);
    }

    builder.component(
        CAMERA_NODE,
        ComponentKind::Position,
        keys.iter().map(|k| {
            let [x, y, z] = k.position;
            Keyframe::new(k.frame, [x, y, z, 1.0])
        }),
    )?;
    builder.component(
        CAMERA_NODE,
        ComponentKind::Scale,
        keys.iter()
            .map(|k| Keyframe::new(k.frame, [-k.roll.to_radians(), k.fov.to_radians(), 0.0, 0.0])),
    )?;
    let targets: Vec<Keyframe> = keys
        .iter()
        .filter_map(|k| {
            let [x, y, z] = k.target?;
            Some(Keyframe::new(k.frame, [x, y, z, 1.0]))
        })
        .collect();
    if !targets.is_empty() {
        builder.component(CAMERA_NODE, ComponentKind::Rotation, targets)?;
    }

    builder.finish(index)
}

impl EanFile {
    pub fn camera(animations: Vec<Animation>) -> Self {
        Self {
            version: Self::CAMERA_VERSION,
            unknown_0c: 0,
            is_camera: true,
            i_17: 4,
            skeleton: camera_skeleton(),
            animations,
        }
    }
}
