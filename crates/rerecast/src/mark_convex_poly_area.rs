use glam::{IVec3, Vec2};

use crate::{Aabb2d, AreaType, CompactHeightfield};

impl CompactHeightfield {
    /// Sets the [`AreaType`] of the spans within the given convex volume.
    ///
    /// The value of spans with an [`AreaType::NOT_WALKABLE`] will not be changed.
    pub fn mark_convex_poly_area(&mut self, volume: ConvexVolume) {
        // Compute the bounding box of the polygon
        let Some(aabb) = Aabb2d::from_verts(&volume.vertices) else {
            // The volume is empty
            return;
        };

        // Compute the grid footprint of the polygon
        let min = IVec3::new(
            ((aabb.min.x - self.aabb.min.x) / self.cell_size) as i32,
            ((volume.min_y - self.aabb.min.y) / self.cell_height) as i32,
            ((aabb.min.y - self.aabb.min.z) / self.cell_size) as i32,
        );
        let max = IVec3::new(
            ((aabb.max.x - self.aabb.min.x) / self.cell_size) as i32,
            ((volume.max_y - self.aabb.min.y) / self.cell_height) as i32,
            ((aabb.max.y - self.aabb.min.z) / self.cell_size) as i32,
        );

        // Early-out if the polygon lies entirely outside the grid.
        if max.x < 0 || min.x >= self.width as i32 || max.z < 0 || min.z >= self.height as i32 {
            return;
        }

        // Clamp the polygon footprint to the grid
        let min_x = min.x.max(0);
        let max_x = max.x.min(self.width as i32 - 1);
        let min_z = min.z.max(0);
        let max_z = max.z.min(self.height as i32 - 1);

        for z in min_z..=max_z {
            for x in min_x..=max_x {
                let cell = *self.cell_at(x as u16, z as u16);
                for i in cell.index_range() {
                    // Skip if span is removed.
                    if !self.areas[i].is_walkable() {
                        continue;
                    }

                    // Skip if y extents don't overlap.
                    let y = self.spans[i].y as i32;
                    if y < min.y || y > max.y {
                        continue;
                    }

                    let point = Vec2::new(
                        self.aabb.min.x + (x as f32 + 0.5) * self.cell_size,
                        self.aabb.min.z + (z as f32 + 0.5) * self.cell_size,
                    );
                    if point_in_poly(point, &volume.vertices) {
                        self.areas[i] = volume.area;
                    }
                }
            }
        }
    }
}

/// Even-odd test of `point` against the polygon on the xz-plane.
fn point_in_poly(point: Vec2, vertices: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let vi = vertices[i];
        let vj = vertices[j];
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// A convex prism on the xz-plane that marks the spans inside it with an [`AreaType`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexVolume {
    /// The vertices of the polygon, as (x, z) coordinates.
    pub vertices: Vec<Vec2>,
    /// The lower y-coordinate of the volume.
    pub min_y: f32,
    /// The upper y-coordinate of the volume.
    pub max_y: f32,
    /// The area type to apply to the spans inside the volume.
    pub area: AreaType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::flat_compact_heightfield;

    #[test]
    fn point_in_square() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(point_in_poly(Vec2::new(1.0, 1.0), &square));
        assert!(!point_in_poly(Vec2::new(3.0, 1.0), &square));
    }

    #[test]
    fn marks_spans_inside_volume() {
        let mut chf = flat_compact_heightfield(6);
        chf.mark_convex_poly_area(ConvexVolume {
            vertices: vec![
                Vec2::new(1.0, 1.0),
                Vec2::new(3.0, 1.0),
                Vec2::new(3.0, 3.0),
                Vec2::new(1.0, 3.0),
            ],
            min_y: -1.0,
            max_y: 1.0,
            area: AreaType(3),
        });
        for z in 0..chf.height {
            for x in 0..chf.width {
                let i = chf.cell_at(x, z).index() as usize;
                let expected = if (1..3).contains(&x) && (1..3).contains(&z) {
                    AreaType(3)
                } else {
                    AreaType::DEFAULT_WALKABLE
                };
                assert_eq!(chf.areas[i], expected, "span at {x},{z}");
            }
        }
    }

    #[test]
    fn volume_outside_height_range_is_ignored() {
        let mut chf = flat_compact_heightfield(4);
        chf.mark_convex_poly_area(ConvexVolume {
            vertices: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(4.0, 0.0),
                Vec2::new(4.0, 4.0),
                Vec2::new(0.0, 4.0),
            ],
            min_y: 5.0,
            max_y: 6.0,
            area: AreaType(3),
        });
        assert!(chf.areas.iter().all(|area| *area == AreaType::DEFAULT_WALKABLE));
    }
}
