//! Conservative voxelization of triangles into a [`Heightfield`].

use glam::Vec3A;
use thiserror::Error;

use crate::{
    Aabb3d, AreaType, TriMesh,
    heightfield::{Heightfield, SpanInsertionError},
    span::Span,
};

/// The maximum height a span can have. Span heights are 13 bit.
const SPAN_MAX_HEIGHT: i32 = (1 << 13) - 1;

impl Heightfield {
    /// Rasterizes all triangles of a [`TriMesh`] into the heightfield.
    ///
    /// Spans that overlap are merged. When their ceilings are within `walkable_climb`,
    /// the higher area type wins.
    pub fn rasterize_triangles(
        &mut self,
        trimesh: &TriMesh,
        walkable_climb: u16,
    ) -> Result<(), RasterizationError> {
        for (i, triangle) in trimesh.indices.iter().enumerate() {
            let triangle = [
                trimesh.vertices[triangle[0] as usize],
                trimesh.vertices[triangle[1] as usize],
                trimesh.vertices[triangle[2] as usize],
            ];
            let area_type = trimesh
                .area_types
                .get(i)
                .copied()
                .unwrap_or(AreaType::NOT_WALKABLE);
            self.rasterize_triangle(triangle, area_type, walkable_climb)?;
        }
        Ok(())
    }

    /// Rasterizes a single triangle into the heightfield.
    pub fn rasterize_triangle(
        &mut self,
        triangle: [Vec3A; 3],
        area_type: AreaType,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        let inverse_cell_size = 1.0 / self.cell_size;
        let inverse_cell_height = 1.0 / self.cell_height;
        let by = self.aabb.max.y - self.aabb.min.y;

        // Calculate the bounding box of the triangle.
        let Some(triangle_aabb) = Aabb3d::from_verts(&triangle) else {
            return Ok(());
        };

        // If the triangle does not touch the bounding box of the heightfield, skip the triangle.
        if !triangle_aabb.intersects(&self.aabb) {
            return Ok(());
        }

        let w = self.width as i32;
        let h = self.height as i32;

        // Calculate the footprint of the triangle on the grid's z-axis
        let z0 = ((triangle_aabb.min.z - self.aabb.min.z) * inverse_cell_size) as i32;
        let z1 = ((triangle_aabb.max.z - self.aabb.min.z) * inverse_cell_size) as i32;

        // Use -1 rather than 0 to cut the polygon properly at the start of the tile
        let z0 = z0.clamp(-1, h - 1);
        let z1 = z1.clamp(0, h - 1);

        let mut input = Vec::with_capacity(7);
        input.extend_from_slice(&triangle);
        let mut row = Vec::with_capacity(7);
        let mut rest = Vec::with_capacity(7);
        let mut cell = Vec::with_capacity(7);
        let mut row_rest = Vec::with_capacity(7);

        for z in z0..=z1 {
            // Clip polygon to row. Store the remaining polygon as well
            let cell_z = self.aabb.min.z + z as f32 * self.cell_size;
            divide_poly(
                &input,
                &mut row,
                &mut rest,
                cell_z + self.cell_size,
                Axis::Z,
            );
            std::mem::swap(&mut input, &mut rest);

            if row.len() < 3 || z < 0 {
                continue;
            }

            // Find horizontal bounds in the row
            let (min_x, max_x) = row
                .iter()
                .fold((row[0].x, row[0].x), |(min, max), v| (min.min(v.x), max.max(v.x)));
            let x0 = ((min_x - self.aabb.min.x) * inverse_cell_size) as i32;
            let x1 = ((max_x - self.aabb.min.x) * inverse_cell_size) as i32;
            if x1 < 0 || x0 >= w {
                continue;
            }
            let x0 = x0.clamp(-1, w - 1);
            let x1 = x1.clamp(0, w - 1);

            for x in x0..=x1 {
                // Clip polygon to column. Store the remaining polygon as well
                let cell_x = self.aabb.min.x + x as f32 * self.cell_size;
                divide_poly(
                    &row,
                    &mut cell,
                    &mut row_rest,
                    cell_x + self.cell_size,
                    Axis::X,
                );
                std::mem::swap(&mut row, &mut row_rest);

                if cell.len() < 3 || x < 0 {
                    continue;
                }

                // Calculate min and max of the span.
                let (span_min, span_max) = cell
                    .iter()
                    .fold((cell[0].y, cell[0].y), |(min, max), v| (min.min(v.y), max.max(v.y)));
                let mut span_min = span_min - self.aabb.min.y;
                let mut span_max = span_max - self.aabb.min.y;

                // Skip the span if it's completely outside the heightfield bounding box
                if span_max < 0.0 || span_min > by {
                    continue;
                }

                // Clamp the span to the heightfield bounding box.
                span_min = span_min.max(0.0);
                span_max = span_max.min(by);

                // Snap the span to the heightfield height grid.
                // Leave room for the ceiling, which must lie above the floor.
                let span_min_cell_index = ((span_min * inverse_cell_height).floor() as i32)
                    .clamp(0, SPAN_MAX_HEIGHT - 1);
                let span_max_cell_index = ((span_max * inverse_cell_height).ceil() as i32)
                    .clamp(span_min_cell_index + 1, SPAN_MAX_HEIGHT);

                let span = Span::new(
                    span_min_cell_index as u16,
                    span_max_cell_index as u16,
                    area_type,
                );
                self.add_span(x as u16, z as u16, span, flag_merge_threshold)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Z,
}

impl Axis {
    #[inline]
    fn of(self, v: Vec3A) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Z => v.z,
        }
    }
}

/// Divides a convex polygon into two along an axis-aligned line.
/// `below` receives the part whose coordinate is `<= axis_offset`, `above` the rest.
fn divide_poly(
    input: &[Vec3A],
    below: &mut Vec<Vec3A>,
    above: &mut Vec<Vec3A>,
    axis_offset: f32,
    axis: Axis,
) {
    below.clear();
    above.clear();
    if input.is_empty() {
        return;
    }
    // How far positive or negative away from the separating axis is each vertex.
    let mut delta = [0.0_f32; 12];
    for (d, v) in delta.iter_mut().zip(input) {
        *d = axis_offset - axis.of(*v);
    }

    let mut b = input.len() - 1;
    for a in 0..input.len() {
        // If the two vertices are on the same side of the separating axis
        let same_side = (delta[a] >= 0.0) == (delta[b] >= 0.0);
        if !same_side {
            let s = delta[b] / (delta[b] - delta[a]);
            let intersection = input[b] + (input[a] - input[b]) * s;
            below.push(intersection);
            above.push(intersection);
            // Add the inVertA point to the right polygon. Do NOT add points that are on the dividing line
            // since these were already added above
            if delta[a] > 0.0 {
                below.push(input[a]);
            } else if delta[a] < 0.0 {
                above.push(input[a]);
            }
        } else {
            // Add the inVertA point to the right polygon. Addition is done even for points on the dividing line
            if delta[a] >= 0.0 {
                below.push(input[a]);
                if delta[a] != 0.0 {
                    b = a;
                    continue;
                }
            }
            above.push(input[a]);
        }
        b = a;
    }
}

/// Errors that can occur during rasterization.
#[derive(Error, Debug)]
pub enum RasterizationError {
    /// A span could not be inserted into the heightfield.
    #[error("Failed to insert span: {0}")]
    SpanInsertion(#[from] SpanInsertionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeightfieldBuilder, test_utils::flat_trimesh};

    fn heightfield() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3A::new(0.0, 0.0, 0.0),
                max: Vec3A::new(4.0, 4.0, 4.0),
            },
            cell_size: 1.0,
            cell_height: 0.5,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn divides_square_in_half() {
        let square = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 0.0),
            Vec3A::new(2.0, 0.0, 2.0),
            Vec3A::new(0.0, 0.0, 2.0),
        ];
        let mut below = Vec::new();
        let mut above = Vec::new();
        divide_poly(&square, &mut below, &mut above, 1.0, Axis::X);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }

    #[test]
    fn flat_quad_fills_every_column_once() {
        let mut heightfield = heightfield();
        let a = Vec3A::new(0.0, 1.0, 0.0);
        let b = Vec3A::new(4.0, 1.0, 0.0);
        let c = Vec3A::new(4.0, 1.0, 4.0);
        let d = Vec3A::new(0.0, 1.0, 4.0);
        heightfield
            .rasterize_triangle([a, c, b], AreaType::DEFAULT_WALKABLE, 1)
            .unwrap();
        heightfield
            .rasterize_triangle([a, d, c], AreaType::DEFAULT_WALKABLE, 1)
            .unwrap();
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                assert_eq!(heightfield.column_keys(x, z).count(), 1, "column {x},{z}");
                let span = heightfield.span_at(x, z).unwrap();
                assert_eq!(span.min(), 2);
                assert_eq!(span.max(), 3);
                assert_eq!(span.area(), AreaType::DEFAULT_WALKABLE);
            }
        }
    }

    #[test]
    fn spans_above_the_height_limit_are_clamped() {
        let mut heightfield = HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3A::ZERO,
                max: Vec3A::new(4.0, 2000.0, 4.0),
            },
            cell_size: 1.0,
            cell_height: 0.2,
        }
        .build()
        .unwrap();
        let mut floors = flat_trimesh(4.0, 0.0);
        floors.extend(flat_trimesh(4.0, 2000.0)).unwrap();
        heightfield.rasterize_triangles(&floors, 1).unwrap();

        let heights: Vec<_> = heightfield
            .column_keys(1, 1)
            .map(|key| {
                let span = heightfield.span(key);
                (span.min(), span.max())
            })
            .collect();
        let top = SPAN_MAX_HEIGHT as u16;
        assert_eq!(heights, [(0, 1), (top - 1, top)]);
    }

    #[test]
    fn triangle_outside_bounds_is_ignored() {
        let mut heightfield = heightfield();
        heightfield
            .rasterize_triangle(
                [
                    Vec3A::new(10.0, 1.0, 10.0),
                    Vec3A::new(11.0, 1.0, 10.0),
                    Vec3A::new(10.0, 1.0, 11.0),
                ],
                AreaType::DEFAULT_WALKABLE,
                1,
            )
            .unwrap();
        assert!(heightfield.allocated_spans.is_empty());
    }
}
