//! `#EAN` animation files: an embedded skeleton plus clips of sparse,
//! per-component keyframe streams.

mod builder;
mod camera;
mod parse;
mod sample;
mod ser;
mod types;

use crate::io::Magic;

pub use builder::{CHARACTER_COMPONENT_FLAG, ClipBuilder};
pub use camera::{
    CAMERA_COMPONENT_FLAG, CAMERA_NODE, CameraKey, CameraSample, DEFAULT_FOV_DEGREES,
    build_camera_clip, camera_skeleton, sample_camera,
};
pub use parse::parse_ean;
pub use sample::{sample, sample_transform};
pub use ser::write_ean;
pub use types::*;

pub const EAN_MAGIC: Magic = *b"#EAN";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::io::Reader;
    use crate::skeleton::{Skeleton, Transform};
    use pretty_assertions::assert_eq;

    fn skeleton() -> Skeleton {
        Skeleton::from_parents(vec![
            ("root".into(), -1, Transform::default()),
            ("hips".into(), 0, Transform::default()),
            ("spine".into(), 1, Transform::default()),
        ])
        .unwrap()
    }

    fn clip(skeleton: &Skeleton, name: &str, index: usize, last: u16) -> Animation {
        let mut builder = ClipBuilder::new(skeleton, name).precision(FloatPrecision::Single);
        builder
            .key("hips", ComponentKind::Position, 0, [0.0, 1.0, 0.0, 1.0])
            .unwrap()
            .key("hips", ComponentKind::Position, last, [0.5, 1.0, 0.25, 1.0])
            .unwrap()
            .key("spine", ComponentKind::Rotation, 3, [0.0, 0.0, 0.3826834, 0.9238795])
            .unwrap();
        builder.finish(index).unwrap()
    }

    #[test]
    fn round_trip_preserves_clips_and_gaps() {
        let skeleton = skeleton();
        let ean = EanFile::character(
            skeleton.clone(),
            vec![clip(&skeleton, "idle", 0, 12), clip(&skeleton, "walk", 2, 400)],
        );
        let bytes = write_ean(&ean).unwrap();
        let decoded = parse_ean(&bytes).unwrap();
        assert_eq!(decoded, ean);
        assert_eq!(write_ean(&decoded).unwrap(), bytes);

        let reader = Reader::new(&bytes);
        assert_eq!(reader.u16(18).unwrap(), 3);
        let table = reader.u32(24).unwrap() as usize;
        assert_eq!(reader.u32(table + 4).unwrap(), 0);
        assert_eq!(reader.u32(table).unwrap() % 16, 0);
    }

    #[test]
    fn frame_index_width_follows_clip_length() {
        let skeleton = skeleton();
        let ean = EanFile::character(
            skeleton.clone(),
            vec![clip(&skeleton, "short", 0, 12), clip(&skeleton, "long", 1, 400)],
        );
        let bytes = write_ean(&ean).unwrap();
        let reader = Reader::new(&bytes);
        let table = reader.u32(24).unwrap() as usize;
        let short = reader.u32(table).unwrap() as usize;
        let long = reader.u32(table + 4).unwrap() as usize;
        assert_eq!(reader.u8(short + 2).unwrap(), 0);
        assert_eq!(reader.u8(long + 2).unwrap(), 1);
        assert_eq!(reader.u8(long + 3).unwrap(), 2);
    }

    #[test]
    fn half_precision_stays_within_tolerance() {
        let skeleton = skeleton();
        let mut builder = ClipBuilder::new(&skeleton, "h");
        builder
            .key("spine", ComponentKind::Scale, 1, [1.1, 0.9, 1.33, 1.0])
            .unwrap();
        let ean = EanFile::character(skeleton.clone(), vec![builder.finish(0).unwrap()]);
        let decoded = parse_ean(&write_ean(&ean).unwrap()).unwrap();
        let before = &ean.animations[0].nodes[0].components[0].keyframes;
        let after = &decoded.animations[0].nodes[0].components[0].keyframes;
        for (a, b) in before.iter().zip(after) {
            assert_eq!(a.frame, b.frame);
            for (x, y) in a.value.iter().zip(&b.value) {
                assert!((x - y).abs() <= 2f32.powi(-10) * x.abs().max(1.0));
            }
        }
    }

    #[test]
    fn node_names_resolve_through_the_skeleton() {
        let skeleton = skeleton();
        let ean = EanFile::character(skeleton.clone(), vec![clip(&skeleton, "idle", 0, 5)]);
        let names: Vec<&str> = ean.animations[0]
            .nodes
            .iter()
            .filter_map(|n| ean.node_name(n))
            .collect();
        assert_eq!(names, vec!["hips", "spine"]);
    }

    #[test]
    fn duplicate_animation_index_is_refused() {
        let skeleton = skeleton();
        let ean = EanFile::character(
            skeleton.clone(),
            vec![clip(&skeleton, "a", 1, 5), clip(&skeleton, "b", 1, 5)],
        );
        assert!(matches!(write_ean(&ean), Err(CodecError::Unencodable { .. })));
    }

    #[test]
    fn truncated_file_is_out_of_bounds() {
        let skeleton = skeleton();
        let ean = EanFile::character(skeleton.clone(), vec![clip(&skeleton, "idle", 0, 12)]);
        let bytes = write_ean(&ean).unwrap();
        for cut in [24, bytes.len() / 2, bytes.len() - 20] {
            assert!(
                matches!(parse_ean(&bytes[..cut]), Err(CodecError::OffsetOutOfBounds { .. })),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn wrong_magic_is_a_signature_mismatch() {
        let mut bytes = write_ean(&EanFile::camera(Vec::new())).unwrap();
        bytes[1] = b'X';
        assert!(matches!(parse_ean(&bytes), Err(CodecError::SignatureMismatch { .. })));
    }
}
