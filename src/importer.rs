use crate::emd::{EmdFile, Influence, SkinnedVertex, SubmeshBuilder};
use crate::error::{CodecError, Result, sanity};
use crate::options::ObjExportOptions;
use crate::vertex::Vertex;
use tracing::debug;

/// Builds a single-model EMD from Wavefront OBJ text. Each OBJ object becomes
/// one submesh; vertices are rigidly bound to `options.bone` when set.
pub fn obj_to_emd(obj_data: &[u8], options: &ObjExportOptions) -> Result<EmdFile> {
    let (models, _) = tobj::load_obj_buf(
        &mut obj_data.as_ref(),
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Ok(Default::default()),
    )?;

    if models.iter().all(|model| model.mesh.indices.is_empty()) {
        return Err(CodecError::NoMeshData);
    }

    let influences: Vec<Influence> = options
        .bone
        .iter()
        .map(|bone| Influence::new(bone.as_str(), 1.0))
        .collect();

    let mut submeshes = Vec::with_capacity(models.len());
    for model in &models {
        let mesh = &model.mesh;
        if mesh.indices.is_empty() {
            debug!(object = %model.name, "skipping obj object without faces");
            continue;
        }

        let has_normals = !mesh.normals.is_empty();
        let has_uvs = !mesh.texcoords.is_empty();
        let flags = options.vertex_format(has_normals, has_uvs);
        let mut builder = SubmeshBuilder::new(model.name.as_str(), flags)
            .with_samplers(options.samplers.clone());

        for face in mesh.indices.chunks_exact(3) {
            let corner = |index: u32| -> Result<SkinnedVertex> {
                Ok(SkinnedVertex {
                    vertex: obj_vertex(mesh, index as usize)?,
                    influences: influences.clone(),
                })
            };
            builder
                .add_triangle([corner(face[0])?, corner(face[1])?, corner(face[2])?])
                .map_err(|e| e.within(format!("obj object {}", model.name)))?;
        }
        submeshes.push(builder.build()?);
    }

    debug!(submeshes = submeshes.len(), "imported obj");
    let mut emd = EmdFile::single(options.model_name.as_str(), submeshes);
    emd.version = options.version;
    Ok(emd)
}

fn obj_vertex(mesh: &tobj::Mesh, index: usize) -> Result<Vertex> {
    let position = components::<3>(&mesh.positions, index)
        .ok_or_else(|| sanity(format!("obj index {index} has no position")))?;
    let normal = components::<3>(&mesh.normals, index).unwrap_or([0.0, 1.0, 0.0]);
    let uv = components::<2>(&mesh.texcoords, index).unwrap_or([0.0, 0.0]);
    Ok(Vertex {
        position,
        normal,
        uv,
        ..Default::default()
    })
}

fn components<const N: usize>(values: &[f32], index: usize) -> Option<[f32; N]> {
    values.get(index * N..index * N + N)?.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::VertexFormat;
    use pretty_assertions::assert_eq;

    const QUAD: &str = "\
o panel
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_is_triangulated_into_one_submesh() {
        let emd = obj_to_emd(QUAD.as_bytes(), &ObjExportOptions::default()).unwrap();
        let submeshes: Vec<_> = emd.submeshes().collect();
        assert_eq!(submeshes.len(), 1);
        let submesh = submeshes[0];
        assert_eq!(submesh.name, "panel");
        assert_eq!(
            submesh.flags,
            VertexFormat::POSITION | VertexFormat::NORMAL | VertexFormat::TEX_UV
        );
        assert_eq!(submesh.vertices.len(), 4);
        assert_eq!(submesh.faces().count(), 2);
        let max = submesh.aabb.max;
        assert_eq!([max[0], max[1], max[2]], [1.0, 1.0, 0.0]);
        assert_eq!(emd.models[0].name, "model");
    }

    #[test]
    fn rigid_bone_becomes_the_palette() {
        let options = ObjExportOptions {
            bone: Some("b_C_Head".into()),
            model_name: "head".into(),
            ..Default::default()
        };
        let emd = obj_to_emd(QUAD.as_bytes(), &options).unwrap();
        let submesh = emd.submeshes().next().unwrap();
        assert!(submesh.flags.contains(VertexFormat::BLEND_WEIGHT));
        assert_eq!(submesh.triangle_groups.len(), 1);
        assert_eq!(submesh.triangle_groups[0].bones, vec!["b_C_Head".to_string()]);
        assert_eq!(submesh.vertices[0].bone_weights[3], 1.0);
        assert_eq!(emd.models[0].name, "head");
    }

    #[test]
    fn empty_obj_has_no_mesh_data() {
        assert!(matches!(
            obj_to_emd(b"v 0 0 0\n", &ObjExportOptions::default()),
            Err(CodecError::NoMeshData)
        ));
    }
}
