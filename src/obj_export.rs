use crate::emd::{EmdFile, Submesh};
use crate::error::{CodecError, Result};
use crate::vertex::VertexFormat;
use std::fmt::{self, Write};

/// Writes every submesh as its own OBJ object. Skinning and the second UV
/// channel have no OBJ counterpart and are left out.
pub fn emd_to_obj(emd: &EmdFile) -> Result<String> {
    let mut output = String::new();
    let mut first_index = 1u32;
    for model in &emd.models {
        for mesh in &model.meshes {
            for submesh in &mesh.submeshes {
                write_submesh(&mut output, &model.name, submesh, first_index)?;
                first_index += submesh.vertices.len() as u32;
            }
        }
    }
    Ok(output)
}

fn write_submesh(
    output: &mut String,
    model: &str,
    submesh: &Submesh,
    first_index: u32,
) -> Result<()> {
    let has_uvs = submesh.flags.contains(VertexFormat::TEX_UV);
    let has_normals = submesh.flags.contains(VertexFormat::NORMAL);

    fmt_ok(writeln!(output, "o {model}_{}", submesh.name))?;
    for vertex in &submesh.vertices {
        let [x, y, z] = vertex.position;
        fmt_ok(writeln!(output, "v {x:.6} {y:.6} {z:.6}"))?;
    }
    if has_uvs {
        for vertex in &submesh.vertices {
            let [u, v] = vertex.uv;
            fmt_ok(writeln!(output, "vt {u:.6} {v:.6}"))?;
        }
    }
    if has_normals {
        for vertex in &submesh.vertices {
            let [x, y, z] = vertex.normal;
            fmt_ok(writeln!(output, "vn {x:.6} {y:.6} {z:.6}"))?;
        }
    }

    for face in submesh.faces() {
        output.push('f');
        for index in face.map(|i| i + first_index) {
            let corner = match (has_uvs, has_normals) {
                (true, true) => format!(" {index}/{index}/{index}"),
                (true, false) => format!(" {index}/{index}"),
                (false, true) => format!(" {index}//{index}"),
                (false, false) => format!(" {index}"),
            };
            output.push_str(&corner);
        }
        output.push('\n');
    }
    Ok(())
}

fn fmt_ok(result: fmt::Result) -> Result<()> {
    result.map_err(|_| CodecError::Unsupported("failed to format obj output".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emd::TriangleGroup;
    use crate::importer::obj_to_emd;
    use crate::options::ObjExportOptions;
    use crate::vertex::Vertex;
    use pretty_assertions::assert_eq;

    fn triangle(name: &str, flags: VertexFormat) -> Submesh {
        let mut submesh = Submesh {
            name: name.into(),
            aabb: Default::default(),
            flags,
            unknown_68: 0,
            vertices: (0..3)
                .map(|i| Vertex {
                    position: [i as f32, 0.0, 0.0],
                    normal: [0.0, 0.0, 1.0],
                    uv: [0.5, 0.25],
                    ..Default::default()
                })
                .collect(),
            samplers: Vec::new(),
            triangle_groups: vec![TriangleGroup {
                indices: vec![0, 1, 2],
                bones: Vec::new(),
            }],
        };
        submesh.recompute_aabb();
        submesh
    }

    #[test]
    fn faces_are_offset_per_submesh() {
        let emd = EmdFile::single(
            "body",
            vec![
                triangle("a", VertexFormat::POSITION | VertexFormat::NORMAL | VertexFormat::TEX_UV),
                triangle("b", VertexFormat::POSITION),
            ],
        );
        let obj = emd_to_obj(&emd).unwrap();
        let faces: Vec<&str> = obj.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(faces, vec!["f 1/1/1 2/2/2 3/3/3", "f 4 5 6"]);
        assert!(obj.contains("o body_a\n"));
        assert!(obj.contains("vt 0.500000 0.250000\n"));
        assert_eq!(obj.lines().filter(|l| l.starts_with("vn ")).count(), 3);
    }

    #[test]
    fn obj_survives_import_and_export() {
        let source = "o panel\nv 0 0 0\nv 1 0 0\nv 1 1 0\nvt 0 0\nvt 1 0\nvt 1 1\nf 1/1 2/2 3/3\n";
        let emd = obj_to_emd(source.as_bytes(), &ObjExportOptions::default()).unwrap();
        let obj = emd_to_obj(&emd).unwrap();
        let again = obj_to_emd(obj.as_bytes(), &ObjExportOptions::default()).unwrap();
        let before = emd.submeshes().next().unwrap();
        let after = again.submeshes().next().unwrap();
        assert_eq!(after.vertices, before.vertices);
        assert_eq!(after.triangle_groups, before.triangle_groups);
    }
}
