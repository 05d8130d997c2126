//! Procedural geometry shared by the unit tests.

use glam::Vec3A;

use crate::{Aabb3d, AreaType, CompactHeightfield, HeightfieldBuilder, TriMesh};

/// A walkable square on the xz-plane at height `y`, spanning `0..size` on both axes.
pub(crate) fn flat_trimesh(size: f32, y: f32) -> TriMesh {
    TriMesh {
        vertices: vec![
            Vec3A::new(0.0, y, 0.0),
            Vec3A::new(size, y, 0.0),
            Vec3A::new(size, y, size),
            Vec3A::new(0.0, y, size),
        ],
        indices: vec![[0, 2, 1].into(), [0, 3, 2].into()],
        area_types: vec![AreaType::DEFAULT_WALKABLE; 2],
    }
}

/// A compact heightfield of `size`x`size` cells with one walkable span per cell.
pub(crate) fn flat_compact_heightfield(size: u16) -> CompactHeightfield {
    let extent = size as f32;
    let mut heightfield = HeightfieldBuilder {
        aabb: Aabb3d {
            min: Vec3A::new(0.0, -1.0, 0.0),
            max: Vec3A::new(extent, 1.0, extent),
        },
        cell_size: 1.0,
        cell_height: 0.5,
    }
    .build()
    .unwrap();
    heightfield
        .rasterize_triangles(&flat_trimesh(extent, 0.0), 1)
        .unwrap();
    heightfield.into_compact(4, 1).unwrap()
}
