use pretty_assertions::assert_eq;
use xv2_formats::CodecError;
use xv2_formats::ean::{
    ClipBuilder, ComponentKind, EanFile, FloatPrecision, parse_ean, sample, write_ean,
};
use xv2_formats::emd::{
    EmdFile, Influence, MAX_PALETTE_BONES, SkinnedVertex, SubmeshBuilder, parse_emd, write_emd,
};
use xv2_formats::skeleton::{EskFile, Skeleton, Transform, parse_esk, write_esk};
use xv2_formats::vertex::{Vertex, VertexFormat, encode_vertex, vertex_size};

fn three_bone_skeleton() -> Skeleton {
    Skeleton::from_parents(vec![
        ("b_C_Base".into(), -1, Transform::default()),
        (
            "b_C_Pelvis".into(),
            0,
            Transform {
                position: [0.0, 0.9, 0.0],
                ..Default::default()
            },
        ),
        (
            "b_C_Spine1".into(),
            1,
            Transform {
                position: [0.0, 0.15, 0.02],
                rotation: [0.0, 0.0, 0.38268343, 0.9238795],
                scale: [1.0, 1.0, 1.0],
            },
        ),
    ])
    .unwrap()
}

#[test]
fn skeleton_file_round_trips() {
    let esk = EskFile::new(three_bone_skeleton());
    let bytes = write_esk(&esk).unwrap();
    let decoded = parse_esk(&bytes).unwrap();
    assert_eq!(decoded, esk);
    assert_eq!(decoded.skeleton.bones[2].parent, 1);
    assert_eq!(decoded.skeleton.bones[0].child, 1);
    assert_eq!(write_esk(&decoded).unwrap(), bytes);
}

fn rigid_corner(bone: usize) -> SkinnedVertex {
    SkinnedVertex {
        vertex: Vertex {
            position: [bone as f32, 0.0, 0.0],
            ..Default::default()
        },
        influences: vec![Influence::new(format!("b_{bone}"), 1.0)],
    }
}

#[test]
fn oversized_palette_is_split_and_keeps_bone_mapping() {
    let flags = VertexFormat::POSITION | VertexFormat::BLEND_WEIGHT;
    let mut builder = SubmeshBuilder::new("body", flags);
    // nine triangles, each bound to three bones of its own: 27 bones in all
    for triangle in 0..9 {
        let first = triangle * 3;
        builder
            .add_triangle([rigid_corner(first), rigid_corner(first + 1), rigid_corner(first + 2)])
            .unwrap();
    }
    let emd = EmdFile::single("body", vec![builder.build().unwrap()]);
    let decoded = parse_emd(&write_emd(&emd).unwrap()).unwrap();
    let submesh = decoded.submeshes().next().unwrap();

    assert!(submesh.triangle_groups.len() >= 2);
    let mut seen = Vec::new();
    for group in &submesh.triangle_groups {
        assert!(group.bones.len() <= MAX_PALETTE_BONES);
        for index in &group.indices {
            let vertex = &submesh.vertices[*index as usize];
            let bone = &group.bones[vertex.bone_ids[3] as usize];
            assert_eq!(bone, &format!("b_{}", vertex.position[0] as usize));
            assert_eq!(vertex.bone_weights[3], 1.0);
            if !seen.contains(bone) {
                seen.push(bone.clone());
            }
        }
    }
    assert_eq!(seen.len(), 27);
}

#[test]
fn sparse_keys_are_padded_and_interpolated() {
    let skeleton = three_bone_skeleton();
    let mut builder = ClipBuilder::new(&skeleton, "walk").frame_count(30);
    builder
        .key("b_C_Pelvis", ComponentKind::Position, 5, [1.5, 0.0, 0.0, 1.0])
        .unwrap()
        .key("b_C_Pelvis", ComponentKind::Position, 20, [3.0, 0.0, 0.0, 1.0])
        .unwrap();
    let animation = builder.finish(0).unwrap();
    assert_eq!(animation.frame_count, 30);
    assert_eq!(animation.precision, FloatPrecision::Half);

    let ean = EanFile::character(skeleton.clone(), vec![animation]);
    let decoded = parse_ean(&write_ean(&ean).unwrap()).unwrap();
    let clip = decoded.animation("walk").unwrap();
    let node = clip.node_for_bone(1).unwrap();
    let position = node.component(ComponentKind::Position);

    let frames: Vec<u16> = position.unwrap().keyframes.iter().map(|k| k.frame).collect();
    assert_eq!(frames, vec![0, 5, 20, 29]);

    let value = sample(position, 12.0, [0.0, 0.0, 0.0, 1.0]);
    assert!((value[0] - 2.2).abs() < 1e-3, "sampled {value:?}");
    assert_eq!(sample(position, 0.0, [0.0; 4])[0], 1.5);
    assert_eq!(sample(position, 29.0, [0.0; 4])[0], 3.0);
}

#[test]
fn truncated_model_is_out_of_bounds() {
    let flags = VertexFormat::POSITION | VertexFormat::BLEND_WEIGHT;
    let mut builder = SubmeshBuilder::new("body", flags);
    builder
        .add_triangle([rigid_corner(0), rigid_corner(1), rigid_corner(2)])
        .unwrap();
    let bytes = write_emd(&EmdFile::single("body", vec![builder.build().unwrap()])).unwrap();
    for cut in [40, bytes.len() / 2] {
        assert!(
            matches!(parse_emd(&bytes[..cut]), Err(CodecError::OffsetOutOfBounds { .. })),
            "cut at {cut}"
        );
    }
}

#[test]
fn encoded_vertex_length_matches_the_flag_stride() {
    let vertex = Vertex {
        position: [1.0, -2.0, 0.5],
        normal: [0.0, 1.0, 0.0],
        uv: [0.25, 0.75],
        tangent: [1.0, 0.0, 0.0],
        bone_weights: [0.1, 0.2, 0.3, 0.4],
        ..Default::default()
    };
    let everything = VertexFormat::POSITION
        | VertexFormat::NORMAL
        | VertexFormat::TEX_UV
        | VertexFormat::TEX2_UV
        | VertexFormat::COLOR
        | VertexFormat::TANGENT
        | VertexFormat::BLEND_WEIGHT;
    for flags in [
        VertexFormat::POSITION,
        VertexFormat::POSITION | VertexFormat::TEX_UV,
        everything,
        everything | VertexFormat::COMPRESSED,
    ] {
        let mut out = Vec::new();
        encode_vertex(flags, &vertex, &mut out).unwrap();
        assert_eq!(out.len(), vertex_size(flags), "{flags:?}");
    }
}
