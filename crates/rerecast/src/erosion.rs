use crate::{AreaType, CompactHeightfield};

impl CompactHeightfield {
    /// Erode the walkable area by agent radius.
    ///
    /// Basically, any spans that are closer to a boundary or obstruction than the specified radius
    /// are marked as not walkable.
    pub fn erode_walkable_area(&mut self, walkable_radius: u16) {
        let mut distance_to_boundary = vec![u8::MAX; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for span_index in cell.index_range() {
                    if !self.areas[span_index].is_walkable() {
                        distance_to_boundary[span_index] = 0;
                        continue;
                    }
                    let span = &self.spans[span_index];
                    // Check that there is a non-null adjacent span in each of the 4 cardinal directions.
                    let mut neighbor_count = 0;
                    for direction in 0..4 {
                        let Some(neighbor_connection) = span.con(direction) else {
                            break;
                        };
                        let (_, _, neighbor_span_index) =
                            self.con_indices(x as i32, z as i32, direction, neighbor_connection);
                        if !self.areas[neighbor_span_index].is_walkable() {
                            break;
                        }
                        neighbor_count += 1;
                    }

                    // At least one missing neighbour, so this is a boundary cell.
                    if neighbor_count != 4 {
                        distance_to_boundary[span_index] = 0;
                    }
                }
            }
        }

        // Pass 1
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    // (-1,0) then (-1,-1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 0, 3);
                    // (0,-1) then (1,-1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 3, 2);
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    // (1,0) then (1,1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 2, 1);
                    // (0,1) then (-1,1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 1, 0);
                }
            }
        }

        let min_boundary_distance = (walkable_radius * 2).min(u8::MAX as u16) as u8;
        for (area, distance) in self.areas.iter_mut().zip(distance_to_boundary) {
            if distance < min_boundary_distance {
                *area = AreaType::NOT_WALKABLE;
            }
        }
    }

    /// Propagates the boundary distance from the straight neighbor in `dir`
    /// and the diagonal neighbor reached by continuing in `diagonal_dir`.
    #[inline]
    fn relax_distance(
        &self,
        distance: &mut [u8],
        x: u16,
        z: u16,
        i: usize,
        dir: u8,
        diagonal_dir: u8,
    ) {
        let span = &self.spans[i];
        let Some(con) = span.con(dir) else {
            return;
        };
        let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
        let new_distance = distance[a_i].saturating_add(2);
        if new_distance < distance[i] {
            distance[i] = new_distance;
        }
        let Some(con) = self.spans[a_i].con(diagonal_dir) else {
            return;
        };
        let (_, _, b_i) = self.con_indices(a_x, a_z, diagonal_dir, con);
        let new_distance = distance[b_i].saturating_add(3);
        if new_distance < distance[i] {
            distance[i] = new_distance;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::flat_compact_heightfield;

    #[test]
    fn erosion_shrinks_walkable_area_by_radius() {
        let mut chf = flat_compact_heightfield(9);
        chf.erode_walkable_area(2);
        for z in 0..chf.height {
            for x in 0..chf.width {
                let i = chf.cell_at(x, z).index() as usize;
                let inside = (2..7).contains(&x) && (2..7).contains(&z);
                assert_eq!(chf.areas[i].is_walkable(), inside, "span at {x},{z}");
            }
        }
    }

    #[test]
    fn zero_radius_keeps_everything() {
        let mut chf = flat_compact_heightfield(4);
        chf.erode_walkable_area(0);
        assert!(chf.areas.iter().all(|area| area.is_walkable()));
    }
}
