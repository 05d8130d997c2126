//! Loads the input triangle soup from a Wavefront OBJ file.

use std::path::Path;

use anyhow::{Context as _, bail};
use glam::{UVec3, Vec3A};
use rerecast::{AreaType, TriMesh};
use tracing::{debug, warn};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Loads every model in the OBJ file at `path` into a single [`TriMesh`].
///
/// All triangles start out as [`AreaType::NOT_WALKABLE`]. The builders mark the walkable ones.
pub fn load_obj(path: &Path) -> anyhow::Result<TriMesh> {
    let (models, materials) = tobj::load_obj(path, &load_options())?;
    if let Err(err) = materials {
        debug!("Ignoring materials of {}: {err}", path.display());
    }
    to_trimesh(models)
}

/// Loads an OBJ file from a reader. Material libraries are not resolved.
#[cfg(test)]
fn load_obj_from_reader(reader: &mut impl std::io::BufRead) -> anyhow::Result<TriMesh> {
    let (models, _materials) =
        tobj::load_obj_buf(reader, &load_options(), |_| Err(tobj::LoadError::OpenFileFailed))?;
    to_trimesh(models)
}

fn to_trimesh(models: Vec<tobj::Model>) -> anyhow::Result<TriMesh> {
    let mut trimesh = TriMesh::default();
    for model in models {
        let mesh = model.mesh;
        if mesh.indices.len() % 3 != 0 {
            warn!(
                "Model `{}` has {} indices, which is not a multiple of 3. Skipping.",
                model.name,
                mesh.indices.len()
            );
            continue;
        }
        let vertex_count = mesh.positions.len() / 3;
        if let Some(index) = mesh.indices.iter().find(|i| **i as usize >= vertex_count) {
            bail!(
                "Model `{}` references vertex {index}, but only has {vertex_count} vertices",
                model.name
            );
        }
        let indices: Vec<UVec3> = mesh
            .indices
            .chunks_exact(3)
            .map(UVec3::from_slice)
            .collect();
        let part = TriMesh {
            vertices: mesh
                .positions
                .chunks_exact(3)
                .map(Vec3A::from_slice)
                .collect(),
            area_types: vec![AreaType::NOT_WALKABLE; indices.len()],
            indices,
        };
        trimesh
            .extend(part)
            .with_context(|| format!("Failed to merge model `{}`", model.name))?;
    }
    if trimesh.indices.is_empty() {
        bail!("The file contains no triangles");
    }
    debug!(
        "Loaded {} vertices and {} triangles",
        trimesh.vertices.len(),
        trimesh.indices.len()
    );
    Ok(trimesh)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const TWO_QUADS: &str = "\
o first
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
f 1 2 3 4
o second
v 5 1 5
v 6 1 5
v 6 1 6
f 5 6 7
";

    #[test]
    fn merges_models_and_triangulates() {
        let trimesh = load_obj_from_reader(&mut Cursor::new(TWO_QUADS)).unwrap();
        assert_eq!(trimesh.vertices.len(), 7);
        assert_eq!(trimesh.indices.len(), 3);
        assert_eq!(trimesh.area_types, vec![AreaType::NOT_WALKABLE; 3]);
        // The second model's indices are offset past the first model's vertices.
        assert!(trimesh.indices[2].min_element() >= 4);
    }

    #[test]
    fn file_without_triangles_is_an_error() {
        let result = load_obj_from_reader(&mut Cursor::new("v 0 0 0\nv 1 0 0\n"));
        assert!(result.is_err());
    }
}
