use super::types::{Animation, Component, ComponentKind};
use crate::skeleton::Transform;

/// Value of `component` at `frame`.
///
/// A stored keyframe is returned unchanged. Between keys each channel is
/// interpolated linearly. A side with no key uses `default` one frame away
/// from the query.
pub fn sample(component: Option<&Component>, frame: f32, default: [f32; 4]) -> [f32; 4] {
    let Some(component) = component.filter(|c| !c.keyframes.is_empty()) else {
        return default;
    };

    let mut prev = None;
    let mut next = None;
    for keyframe in &component.keyframes {
        let at = keyframe.frame as f32;
        if at == frame {
            return keyframe.value;
        }
        if at < frame && prev.is_none_or(|(f, _)| at > f) {
            prev = Some((at, keyframe.value));
        }
        if at > frame && next.is_none_or(|(f, _)| at < f) {
            next = Some((at, keyframe.value));
        }
    }

    let (prev_frame, prev_value) = prev.unwrap_or((frame - 1.0, default));
    let (next_frame, next_value) = next.unwrap_or((frame + 1.0, default));
    if next_frame == prev_frame {
        return prev_value;
    }

    let t = (frame - prev_frame) / (next_frame - prev_frame);
    std::array::from_fn(|i| prev_value[i] + (next_value[i] - prev_value[i]) * t)
}

/// Local transform of `bone_index` at `frame`, falling back to `rest` for
/// channels the animation leaves unkeyed.
pub fn sample_transform(
    animation: &Animation,
    bone_index: i16,
    frame: f32,
    rest: &Transform,
) -> Transform {
    let Some(node) = animation.node_for_bone(bone_index) else {
        return *rest;
    };
    let [px, py, pz, _] = sample(
        node.component(ComponentKind::Position),
        frame,
        [rest.position[0], rest.position[1], rest.position[2], 1.0],
    );
    let rotation = sample(node.component(ComponentKind::Rotation), frame, rest.rotation);
    let [sx, sy, sz, _] = sample(
        node.component(ComponentKind::Scale),
        frame,
        [rest.scale[0], rest.scale[1], rest.scale[2], 1.0],
    );
    Transform {
        position: [px, py, pz],
        rotation,
        scale: [sx, sy, sz],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ean::types::{Keyframe, Node};

    fn component(keys: &[(u16, f32)]) -> Component {
        Component {
            kind: ComponentKind::Position,
            i_01: 7,
            i_02: 0,
            keyframes: keys
                .iter()
                .map(|&(frame, v)| Keyframe::new(frame, [v, v * 2.0, -v, 1.0]))
                .collect(),
        }
    }

    #[test]
    fn stored_keyframes_are_returned_verbatim() {
        let c = component(&[(0, 0.1), (7, 0.3333), (19, 123.456)]);
        for key in &c.keyframes {
            assert_eq!(sample(Some(&c), key.frame as f32, [9.0; 4]), key.value);
        }
    }

    #[test]
    fn interpolates_between_neighbours() {
        let c = component(&[(5, 1.0), (20, 4.0)]);
        let value = sample(Some(&c), 12.0, [0.0; 4]);
        let expected = 1.0 + (12.0 - 5.0) / (20.0 - 5.0) * 3.0;
        assert!((value[0] - expected).abs() < 1e-6);
        assert!((value[1] - 2.0 * expected).abs() < 1e-6);
        assert_eq!(value[3], 1.0);
    }

    #[test]
    fn missing_side_uses_default_one_frame_away() {
        let c = component(&[(5, 2.0)]);
        // prev at frame 5, next is the default at frame 7
        let after = sample(Some(&c), 6.0, [0.0; 4]);
        assert!((after[0] - 1.0).abs() < 1e-6);
        // prev is the default at frame 2, next at frame 5
        let before = sample(Some(&c), 3.0, [8.0, 8.0, 8.0, 8.0]);
        assert!((before[0] - (8.0 + (2.0 - 8.0) / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn absent_component_yields_default() {
        assert_eq!(sample(None, 3.0, [1.0, 2.0, 3.0, 4.0]), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn transform_falls_back_to_rest_pose() {
        let animation = Animation {
            name: "idle".into(),
            index: 0,
            frame_count: 10,
            precision: crate::ean::FloatPrecision::Single,
            nodes: vec![Node {
                bone_index: 1,
                components: vec![component(&[(0, 1.0), (9, 1.0)])],
            }],
        };
        let rest = Transform {
            rotation: [0.0, 0.0, 0.7071, 0.7071],
            ..Transform::default()
        };
        let t = sample_transform(&animation, 1, 4.0, &rest);
        assert_eq!(t.position, [1.0, 2.0, -1.0]);
        assert_eq!(t.rotation, rest.rotation);
        assert_eq!(t.scale, [1.0, 1.0, 1.0]);
        assert_eq!(sample_transform(&animation, 2, 4.0, &rest), rest);
    }
}
