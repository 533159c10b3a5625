use super::types::*;
use crate::error::{CodecError, Result, unencodable};
use crate::skeleton::Skeleton;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Component flag written by the game's character animations.
pub const CHARACTER_COMPONENT_FLAG: u8 = 7;

/// Assembles an [`Animation`] from named bone tracks.
///
/// Keys may be added in any order. [`ClipBuilder::finish`] sorts them, pads
/// every component so it covers frame 0 and the final frame, and lays nodes
/// out in skeleton order.
pub struct ClipBuilder<'a> {
    skeleton: &'a Skeleton,
    name: String,
    precision: FloatPrecision,
    frame_count: Option<u32>,
    component_flag: u8,
    tracks: BTreeMap<i16, Vec<(ComponentKind, Vec<Keyframe>)>>,
}

impl<'a> ClipBuilder<'a> {
    pub fn new(skeleton: &'a Skeleton, name: impl Into<String>) -> Self {
        Self {
            skeleton,
            name: name.into(),
            precision: FloatPrecision::Half,
            frame_count: None,
            component_flag: CHARACTER_COMPONENT_FLAG,
            tracks: BTreeMap::new(),
        }
    }

    pub fn precision(mut self, precision: FloatPrecision) -> Self {
        self.precision = precision;
        self
    }

    /// Minimum clip length. The clip always extends past its last key.
    pub fn frame_count(mut self, frame_count: u32) -> Self {
        self.frame_count = Some(frame_count);
        self
    }

    pub fn component_flag(mut self, flag: u8) -> Self {
        self.component_flag = flag;
        self
    }

    fn bone_index(&self, bone: &str) -> Result<i16> {
        let index = self
            .skeleton
            .find_bone(bone)
            .ok_or_else(|| CodecError::UnknownBone(bone.to_string()))?;
        i16::try_from(index).map_err(|_| unencodable(format!("bone {bone}"), "index exceeds i16"))
    }

    fn track(&mut self, bone_index: i16, kind: ComponentKind) -> &mut Vec<Keyframe> {
        let components = self.tracks.entry(bone_index).or_default();
        let position = match components.iter().position(|(k, _)| *k == kind) {
            Some(position) => position,
            None => {
                components.push((kind, Vec::new()));
                components.len() - 1
            }
        };
        &mut components[position].1
    }

    pub fn key(
        &mut self,
        bone: &str,
        kind: ComponentKind,
        frame: u16,
        value: [f32; 4],
    ) -> Result<&mut Self> {
        let index = self.bone_index(bone)?;
        self.track(index, kind).push(Keyframe::new(frame, value));
        Ok(self)
    }

    pub fn component(
        &mut self,
        bone: &str,
        kind: ComponentKind,
        keyframes: impl IntoIterator<Item = Keyframe>,
    ) -> Result<&mut Self> {
        let index = self.bone_index(bone)?;
        self.track(index, kind).extend(keyframes);
        Ok(self)
    }

    /// Keys the rest transform of every non-root bone that has no track yet.
    pub fn fill_rest_pose(&mut self) -> &mut Self {
        let skeleton = self.skeleton;
        for (index, bone) in skeleton.bones.iter().enumerate().skip(1) {
            let Ok(index) = i16::try_from(index) else {
                break;
            };
            if self.tracks.contains_key(&index) {
                continue;
            }
            let t = &bone.transform;
            let [px, py, pz] = t.position;
            let [sx, sy, sz] = t.scale;
            self.tracks.insert(
                index,
                vec![
                    (ComponentKind::Position, vec![Keyframe::new(0, [px, py, pz, 1.0])]),
                    (ComponentKind::Rotation, vec![Keyframe::new(0, t.rotation)]),
                    (ComponentKind::Scale, vec![Keyframe::new(0, [sx, sy, sz, 1.0])]),
                ],
            );
        }
        self
    }

    pub fn finish(self, index: usize) -> Result<Animation> {
        let last = self
            .tracks
            .values()
            .flatten()
            .flat_map(|(_, keys)| keys.iter().map(|k| k.frame))
            .max();
        let frame_count = match last {
            Some(last) => self.frame_count.unwrap_or(0).max(last as u32 + 1),
            None => self.frame_count.unwrap_or(0),
        };
        let end = match frame_count.checked_sub(1) {
            Some(end) => u16::try_from(end).map_err(|_| {
                unencodable(
                    format!("animation {}", self.name),
                    format!("{frame_count} frames exceed 16-bit frame indices"),
                )
            })?,
            None => 0,
        };

        let mut nodes = Vec::with_capacity(self.tracks.len());
        for (bone_index, tracks) in self.tracks {
            let bone_name = self
                .skeleton
                .bones
                .get(bone_index as usize)
                .map_or("?", |b| b.name.as_str());
            let mut components = Vec::with_capacity(tracks.len());
            for (kind, mut keyframes) in tracks {
                if keyframes.is_empty() {
                    warn!(bone = bone_name, ?kind, "dropping component without keyframes");
                    continue;
                }
                keyframes.sort_by_key(|k| k.frame);
                if let Some(pair) = keyframes.windows(2).find(|w| w[0].frame == w[1].frame) {
                    return Err(unencodable(
                        format!("animation {} > bone {bone_name} > {kind:?} component", self.name),
                        format!("frame {} is keyed twice", pair[0].frame),
                    ));
                }
                pad_boundaries(&mut keyframes, end);
                components.push(Component {
                    kind,
                    i_01: self.component_flag,
                    i_02: 0,
                    keyframes,
                });
            }
            if !components.is_empty() {
                nodes.push(Node {
                    bone_index,
                    components,
                });
            }
        }

        debug!(name = %self.name, nodes = nodes.len(), frame_count, "built animation");
        Ok(Animation {
            name: self.name,
            index,
            frame_count,
            precision: self.precision,
            nodes,
        })
    }
}

/// Duplicates the first and last keys out to frame 0 and `end`.
fn pad_boundaries(keyframes: &mut Vec<Keyframe>, end: u16) {
    let (Some(first), Some(last)) = (keyframes.first().copied(), keyframes.last().copied()) else {
        return;
    };
    if first.frame != 0 {
        keyframes.insert(0, Keyframe::new(0, first.value));
    }
    if last.frame < end {
        keyframes.push(Keyframe::new(end, last.value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Transform;

    fn skeleton() -> Skeleton {
        Skeleton::from_parents(vec![
            ("root".into(), -1, Transform::default()),
            ("spine".into(), 0, Transform::default()),
            (
                "head".into(),
                1,
                Transform {
                    position: [0.0, 1.5, 0.0],
                    ..Transform::default()
                },
            ),
        ])
        .unwrap()
    }

    #[test]
    fn components_cover_first_and_last_frame() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "wave").frame_count(30);
        builder
            .key("head", ComponentKind::Rotation, 20, [0.0, 0.0, 0.0, 1.0])
            .unwrap()
            .key("head", ComponentKind::Rotation, 5, [0.0, 1.0, 0.0, 0.0])
            .unwrap();
        let animation = builder.finish(3).unwrap();

        assert_eq!(animation.frame_count, 30);
        assert_eq!(animation.index, 3);
        let frames: Vec<u16> = animation.nodes[0].components[0]
            .keyframes
            .iter()
            .map(|k| k.frame)
            .collect();
        assert_eq!(frames, vec![0, 5, 20, 29]);
        let keys = &animation.nodes[0].components[0].keyframes;
        assert_eq!(keys[0].value, keys[1].value);
        assert_eq!(keys[3].value, keys[2].value);
    }

    #[test]
    fn clip_grows_to_fit_last_key() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "run").frame_count(10);
        builder
            .key("spine", ComponentKind::Position, 300, [0.0; 4])
            .unwrap();
        let animation = builder.finish(0).unwrap();
        assert_eq!(animation.frame_count, 301);
        assert!(animation.wide_frame_indices());
    }

    #[test]
    fn duplicate_frames_are_rejected() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "idle");
        builder
            .key("spine", ComponentKind::Scale, 4, [1.0; 4])
            .unwrap()
            .key("spine", ComponentKind::Scale, 4, [2.0; 4])
            .unwrap();
        match builder.finish(0) {
            Err(CodecError::Unencodable { entity, .. }) => {
                assert_eq!(entity, "animation idle > bone spine > Scale component")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_bone_is_reported_by_name() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "idle");
        assert!(matches!(
            builder.key("tail", ComponentKind::Position, 0, [0.0; 4]),
            Err(CodecError::UnknownBone(name)) if name == "tail"
        ));
    }

    #[test]
    fn empty_components_are_dropped_and_nodes_follow_skeleton_order() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "idle");
        builder
            .key("head", ComponentKind::Position, 2, [0.0; 4])
            .unwrap()
            .component("spine", ComponentKind::Rotation, Vec::new())
            .unwrap()
            .key("spine", ComponentKind::Position, 1, [0.0; 4])
            .unwrap();
        let animation = builder.finish(0).unwrap();
        let bones: Vec<i16> = animation.nodes.iter().map(|n| n.bone_index).collect();
        assert_eq!(bones, vec![1, 2]);
        assert_eq!(animation.nodes[0].components.len(), 1);
        assert_eq!(animation.nodes[0].components[0].kind, ComponentKind::Position);
    }

    #[test]
    fn rest_pose_fill_keys_untouched_bones() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "pose");
        builder
            .key("spine", ComponentKind::Rotation, 8, [0.0, 0.0, 0.0, 1.0])
            .unwrap()
            .fill_rest_pose();
        let animation = builder.finish(0).unwrap();
        let head = animation.node_for_bone(2).unwrap();
        assert_eq!(head.components.len(), 3);
        let position = head.component(ComponentKind::Position).unwrap();
        assert_eq!(position.keyframes.first().unwrap().value, [0.0, 1.5, 0.0, 1.0]);
        assert_eq!(position.keyframes.last().unwrap().frame, 8);
        assert!(animation.node_for_bone(0).is_none());
    }
}
