//! The triangle soup that is fed into [`Heightfield`](crate::Heightfield) rasterization.

use glam::{UVec3, Vec3A, Vec3Swizzles as _};

use crate::{
    Aabb2d,
    math::{Aabb3d, TriangleIndices as _},
    span::AreaType,
};

/// A mesh used as input for [`Heightfield`](crate::Heightfield) rasterization.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// The vertices of the mesh in world space.
    pub vertices: Vec<Vec3A>,

    /// The vertex indices of each triangle.
    pub indices: Vec<UVec3>,

    /// The area types of the trimesh. Each index corresponds 1:1 to the [`TriMesh::indices`].
    pub area_types: Vec<AreaType>,
}

impl TriMesh {
    /// Extends the trimesh with the vertices and indices of another trimesh.
    /// The indices of `other` will be offset by the number of vertices in `self`.
    pub fn extend(&mut self, other: TriMesh) -> Result<(), TriMeshError> {
        let next_vertex_index = u32::try_from(self.vertices.len())
            .map_err(|_| TriMeshError::TooManyVertices(self.vertices.len()))?;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.iter().map(|i| i + next_vertex_index));
        self.area_types.extend(other.area_types);
        Ok(())
    }

    /// Computes the AABB of the trimesh.
    /// Returns `None` if the trimesh is empty.
    pub fn compute_aabb(&self) -> Option<Aabb3d> {
        Aabb3d::from_verts(&self.vertices)
    }

    /// Marks the triangles whose slope is at most `threshold_rad` as [`AreaType::DEFAULT_WALKABLE`].
    ///
    /// A triangle is walkable when the y-component of its normal is greater than the cosine of the threshold angle.
    /// Triangles that fail the test keep their current area type.
    pub fn mark_walkable_triangles(&mut self, threshold_rad: f32) {
        let threshold_cos = threshold_rad.cos();
        for (i, indices) in self.indices.iter().enumerate() {
            let normal = indices.normal(&self.vertices);

            if normal.y > threshold_cos {
                self.area_types[i] = AreaType::DEFAULT_WALKABLE;
            }
        }
    }

    /// Returns a copy of the triangles whose xz-bounds overlap `bounds`.
    ///
    /// The vertex array is shared with `self`, only the triangle list is filtered.
    pub fn triangles_overlapping(&self, bounds: &Aabb2d) -> TriMesh {
        let mut subset = TriMesh {
            vertices: self.vertices.clone(),
            ..Default::default()
        };
        for (indices, area) in self.indices.iter().zip(&self.area_types) {
            let triangle = [
                self.vertices[indices.x as usize].xz(),
                self.vertices[indices.y as usize].xz(),
                self.vertices[indices.z as usize].xz(),
            ];
            let Some(triangle_bounds) = Aabb2d::from_verts(&triangle) else {
                continue;
            };
            if triangle_bounds.intersects(bounds) {
                subset.indices.push(*indices);
                subset.area_types.push(*area);
            }
        }
        subset
    }
}

/// Errors that can occur when combining [`TriMesh`]es.
#[derive(thiserror::Error, Debug)]
pub enum TriMeshError {
    /// Triangle indices are 32 bit.
    #[error("Cannot address {0} vertices with 32 bit triangle indices")]
    TooManyVertices(usize),
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;

    fn ramp(height: f32) -> TriMesh {
        TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 0.0, 0.0),
                Vec3A::new(0.0, 0.0, 1.0),
                Vec3A::new(1.0, height, 0.0),
            ],
            indices: vec![UVec3::new(0, 1, 2)],
            area_types: vec![AreaType::NOT_WALKABLE],
        }
    }

    #[test]
    fn gentle_slope_is_walkable() {
        let mut trimesh = ramp(0.5);
        trimesh.mark_walkable_triangles(45.0_f32.to_radians());
        assert_eq!(trimesh.area_types[0], AreaType::DEFAULT_WALKABLE);
    }

    #[test]
    fn steep_slope_is_not_walkable() {
        let mut trimesh = ramp(2.0);
        trimesh.mark_walkable_triangles(45.0_f32.to_radians());
        assert_eq!(trimesh.area_types[0], AreaType::NOT_WALKABLE);
    }

    #[test]
    fn extend_offsets_indices() {
        let mut trimesh = ramp(0.0);
        trimesh.extend(ramp(0.0)).unwrap();
        assert_eq!(trimesh.vertices.len(), 6);
        assert_eq!(trimesh.indices[1], UVec3::new(3, 4, 5));
        assert_eq!(trimesh.area_types.len(), 2);
    }

    #[test]
    fn overlapping_triangles_are_kept() {
        let trimesh = ramp(0.0);
        let inside = trimesh.triangles_overlapping(&Aabb2d {
            min: Vec2::new(0.5, 0.5),
            max: Vec2::new(2.0, 2.0),
        });
        assert_eq!(inside.indices.len(), 1);
        let outside = trimesh.triangles_overlapping(&Aabb2d {
            min: Vec2::new(5.0, 5.0),
            max: Vec2::new(6.0, 6.0),
        });
        assert!(outside.indices.is_empty());
    }
}
