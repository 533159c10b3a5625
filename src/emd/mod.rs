//! `#EMD` model files: model → mesh → submesh → triangle group.

mod palette;
mod parse;
mod ser;
mod types;

use crate::io::Magic;

pub use palette::{Influence, SkinnedVertex, SubmeshBuilder};
pub use parse::parse_emd;
pub use ser::{validate_submesh, write_emd};
pub use types::*;

pub const EMD_MAGIC: Magic = *b"#EMD";

/// Bones a single triangle group may reference.
pub const MAX_PALETTE_BONES: usize = 24;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::io::Reader;
    use crate::vertex::{Vertex, VertexFormat};
    use pretty_assertions::assert_eq;

    fn triangle_submesh(flags: VertexFormat) -> Submesh {
        let vertices = (0..3)
            .map(|i| Vertex {
                position: [i as f32, 1.0, -2.0],
                normal: [0.0, 0.0, 1.0],
                uv: [0.5, 0.25],
                color: [1.0, 0.0, 0.0, 1.0],
                bone_ids: [0, 0, 1, 0],
                bone_weights: [0.0, 0.0, 0.5, 0.5],
                ..Default::default()
            })
            .collect();
        let mut submesh = Submesh {
            name: "face".into(),
            aabb: Aabb::default(),
            flags,
            unknown_68: 0,
            vertices,
            samplers: TextureSampler::defaults(),
            triangle_groups: vec![TriangleGroup {
                indices: vec![0, 1, 2],
                bones: vec!["head".into(), "jaw".into()],
            }],
        };
        submesh.recompute_aabb();
        submesh
    }

    fn flags() -> VertexFormat {
        VertexFormat::POSITION
            | VertexFormat::NORMAL
            | VertexFormat::TEX_UV
            | VertexFormat::COLOR
            | VertexFormat::BLEND_WEIGHT
    }

    #[test]
    fn round_trip_is_structurally_equal() {
        let emd = EmdFile::single("hum", vec![triangle_submesh(flags())]);
        let bytes = write_emd(&emd).unwrap();
        let decoded = parse_emd(&bytes).unwrap();
        assert_eq!(decoded, emd);
        assert_eq!(write_emd(&decoded).unwrap(), bytes);
    }

    #[test]
    fn header_points_at_tables() {
        let emd = EmdFile::single("hum", vec![triangle_submesh(flags())]);
        let bytes = write_emd(&emd).unwrap();
        let reader = Reader::new(&bytes);
        assert_eq!(reader.u32(8).unwrap(), 0x201);
        assert_eq!(reader.u16(18).unwrap(), 1);
        assert_eq!(reader.u32(20).unwrap(), 28);
        let model = reader.u32(28).unwrap() as usize;
        assert_eq!(model % 16, 0);
        assert_eq!(reader.u32(model + 4).unwrap(), 8);
        let names = reader.u32(24).unwrap() as usize;
        assert_eq!(reader.cstring(reader.u32(names).unwrap() as usize).unwrap(), "hum");
    }

    #[test]
    fn declared_stride_must_match_flags() {
        let emd = EmdFile::single("hum", vec![triangle_submesh(flags())]);
        let mut bytes = write_emd(&emd).unwrap();
        let reader = Reader::new(&bytes);
        let model = reader.u32(28).unwrap() as usize;
        let mesh = model + reader.u32(model + 8).unwrap() as usize;
        let table = mesh + reader.u32(mesh + 56).unwrap() as usize;
        let submesh = mesh + reader.u32(table).unwrap() as usize;
        let stride = reader.u32(submesh + 52).unwrap();
        bytes[submesh + 52..submesh + 56].copy_from_slice(&(stride + 4).to_le_bytes());
        assert!(matches!(
            parse_emd(&bytes),
            Err(CodecError::StrideMismatch { .. })
        ));
    }

    #[test]
    fn compressed_round_trip_stays_within_half_tolerance() {
        let emd = EmdFile::single(
            "hum",
            vec![triangle_submesh(flags() | VertexFormat::COMPRESSED)],
        );
        let decoded = parse_emd(&write_emd(&emd).unwrap()).unwrap();
        let before = &emd.models[0].meshes[0].submeshes[0].vertices;
        let after = &decoded.models[0].meshes[0].submeshes[0].vertices;
        for (a, b) in before.iter().zip(after) {
            for (x, y) in a.normal.iter().zip(&b.normal) {
                assert!((x - y).abs() <= 2f32.powi(-10) * x.abs().max(1.0));
            }
            assert_eq!(a.position, b.position);
            assert_eq!(a.bone_ids, b.bone_ids);
        }
    }

    #[test]
    fn wide_indices_are_used_past_u16_count() {
        let mut submesh = triangle_submesh(VertexFormat::POSITION);
        submesh.triangle_groups[0].indices = (0..65538u32).map(|i| i % 3).collect();
        submesh.triangle_groups[0].bones.clear();
        let emd = EmdFile::single("big", vec![submesh]);
        let decoded = parse_emd(&write_emd(&emd).unwrap()).unwrap();
        let group = &decoded.models[0].meshes[0].submeshes[0].triangle_groups[0];
        assert_eq!(group.indices.len(), 65538);
    }

    #[test]
    fn oversized_palette_is_refused() {
        let mut submesh = triangle_submesh(flags());
        submesh.triangle_groups[0].bones = (0..25).map(|i| format!("b{i}")).collect();
        let emd = EmdFile::single("hum", vec![submesh]);
        assert!(matches!(
            write_emd(&emd),
            Err(CodecError::PaletteCapacityExceeded { group: 0, bones: 25 })
        ));
    }

    #[test]
    fn truncated_file_is_out_of_bounds() {
        let bytes = write_emd(&EmdFile::single("hum", vec![triangle_submesh(flags())])).unwrap();
        for cut in [40, bytes.len() / 2, bytes.len() - 8] {
            assert!(
                matches!(parse_emd(&bytes[..cut]), Err(CodecError::OffsetOutOfBounds { .. })),
                "cut at {cut}"
            );
        }
    }
}
