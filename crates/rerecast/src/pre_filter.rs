use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::AreaType,
};

const MAX_HEIGHT: i32 = 0xffff;

impl Heightfield {
    /// Marks non-walkable spans as walkable if their maximum is within `walkable_climb` of the span below them.
    ///
    /// This removes small obstacles and rasterization artifacts that the agent would be able to walk over
    /// such as curbs. It also allows agents to move up terraced structures like stairs.
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: u16) {
        let mut column = Vec::new();
        for z in 0..self.height {
            for x in 0..self.width {
                column.clear();
                column.extend(self.column_keys(x, z));

                let mut previous_max = None;
                let mut previous_was_walkable = false;
                let mut previous_area = AreaType::NOT_WALKABLE;

                // For each span in the column...
                for key in column.iter().copied() {
                    let span = self.span_mut(key);
                    let walkable = span.area().is_walkable();

                    // If current span is not walkable, but there is walkable span just below it and the height difference
                    // is small enough for the agent to walk over, mark the current span as walkable too.
                    if let Some(previous_max) = previous_max
                        && !walkable
                        && previous_was_walkable
                        && (span.max() as i32 - previous_max as i32) <= walkable_climb as i32
                    {
                        span.set_area(previous_area);
                    }

                    // Copy the original walkable value regardless of whether we changed it.
                    // This prevents multiple consecutive non-walkable spans from being erroneously marked as walkable.
                    previous_max = Some(span.max());
                    previous_was_walkable = walkable;
                    previous_area = span.area();
                }
            }
        }
    }

    /// Marks spans that are ledges as not-walkable.
    ///
    /// A ledge is a span with one or more neighbors whose maximum is further away than `walkable_climb`
    /// from the current span's maximum.
    /// This method removes the impact of the overestimation of conservative voxelization
    /// so the resulting mesh will not have regions hanging in the air over ledges.
    pub fn filter_ledge_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        let walkable_height = walkable_height as i32;
        let walkable_climb = walkable_climb as i32;
        let mut column = Vec::new();
        let mut unwalkable = Vec::new();

        // Mark spans that are adjacent to a ledge as unwalkable.
        for z in 0..self.height {
            for x in 0..self.width {
                column.clear();
                column.extend(self.column_keys(x, z));
                unwalkable.clear();

                for key in column.iter().copied() {
                    let span = self.span(key);
                    // Skip non-walkable spans.
                    if !span.area().is_walkable() {
                        continue;
                    }

                    let floor = span.max() as i32;
                    let ceiling = span
                        .next()
                        .map(|next| self.span(next).min() as i32)
                        .unwrap_or(MAX_HEIGHT);

                    // The difference between this walkable area and the lowest neighbor walkable area.
                    // This is the difference between the current span and all neighbor spans that have
                    // enough space for an agent to move between, but not accounting at all for surface slope.
                    let mut lowest_neighbor_floor_difference = MAX_HEIGHT;

                    // Min and max height of accessible neighbours.
                    let mut lowest_traversable_neighbor_floor = span.max() as i32;
                    let mut highest_traversable_neighbor_floor = span.max() as i32;

                    for direction in 0..4 {
                        let neighbor_x = x as i32 + dir_offset_x(direction) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(direction) as i32;

                        // Skip neighbours which are out of bounds.
                        if !self.contains(neighbor_x, neighbor_z) {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }
                        let neighbor_x = neighbor_x as u16;
                        let neighbor_z = neighbor_z as u16;

                        let mut neighbor_key = self.span_key_at(neighbor_x, neighbor_z);

                        // The most we can step down to the neighbor is the walkable climb distance.
                        // Start with the area under the neighbor span
                        let neighbor_ceiling = neighbor_key
                            .map(|key| self.span(key).min() as i32)
                            .unwrap_or(MAX_HEIGHT);

                        // Skip neighbour if the gap between the spans is too small.
                        if ceiling.min(neighbor_ceiling) - floor >= walkable_height {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }

                        // For each span in the neighboring column...
                        while let Some(key) = neighbor_key {
                            let neighbor_span = self.span(key);
                            neighbor_key = neighbor_span.next();

                            let neighbor_floor = neighbor_span.max() as i32;
                            let neighbor_ceiling = neighbor_span
                                .next()
                                .map(|next| self.span(next).min() as i32)
                                .unwrap_or(MAX_HEIGHT);

                            // Only consider neighboring areas that have enough overlap to be potentially traversable.
                            if ceiling.min(neighbor_ceiling) - floor.max(neighbor_floor)
                                < walkable_height
                            {
                                // No space to traverse between them.
                                continue;
                            }

                            let neighbor_floor_difference = neighbor_floor - floor;
                            lowest_neighbor_floor_difference =
                                lowest_neighbor_floor_difference.min(neighbor_floor_difference);

                            // Find min/max accessible neighbor height.
                            // Only consider neighbors that are at most walkableClimb away.
                            if neighbor_floor_difference.abs() <= walkable_climb {
                                // There is space to move to the neighbor cell and the slope isn't too much.
                                lowest_traversable_neighbor_floor =
                                    lowest_traversable_neighbor_floor.min(neighbor_floor);
                                highest_traversable_neighbor_floor =
                                    highest_traversable_neighbor_floor.max(neighbor_floor);
                            } else if neighbor_floor_difference < -walkable_climb {
                                // We already know this will be considered a ledge span so we can early-out
                                break;
                            }
                        }
                    }

                    // The current span is close to a ledge if the magnitude of the drop to any neighbour span
                    // is greater than the walkableClimb distance.
                    // That is, there is a gap that is large enough to let an agent move between them,
                    // but the drop (surface slope) is too large to allow it.
                    if lowest_neighbor_floor_difference < -walkable_climb {
                        unwalkable.push(key);
                    }
                    // If the difference between all neighbor floors is too large, this is a steep slope,
                    // so mark the span as an unwalkable ledge.
                    else if highest_traversable_neighbor_floor - lowest_traversable_neighbor_floor
                        > walkable_climb
                    {
                        unwalkable.push(key);
                    }
                }
                for key in unwalkable.iter().copied() {
                    self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
                }
            }
        }
    }

    /// Marks walkable spans as not walkable if the clearance above the span is less than the specified `walkable_height`.
    ///
    /// For this filter, the clearance above the span is the distance from the span's
    /// maximum to the minimum of the next higher span in the same column.
    /// If there is no higher span in the column, the clearance is computed as the
    /// distance from the top of the span to the maximum heightfield height.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: u16) {
        let mut column = Vec::new();
        // Remove walkable flag from spans which do not have enough
        // space above them for the agent to stand there.
        for z in 0..self.height {
            for x in 0..self.width {
                column.clear();
                column.extend(self.column_keys(x, z));
                for key in column.iter().copied() {
                    let span = self.span(key);
                    let floor = span.max() as i32;
                    let ceiling = span
                        .next()
                        .map(|next| self.span(next).min() as i32)
                        .unwrap_or(MAX_HEIGHT);
                    if ceiling - floor < walkable_height as i32 {
                        self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3A;

    use crate::{
        Aabb3d, HeightfieldBuilder,
        span::{AreaType, Span},
    };

    use super::*;

    fn heightfield() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3A::ZERO,
                max: Vec3A::new(3.0, 20.0, 3.0),
            },
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn add(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, area: AreaType) {
        heightfield
            .add_span(x, z, Span::new(min, max, area), 0)
            .unwrap();
    }

    #[test]
    fn low_hanging_obstacle_becomes_walkable() {
        let mut heightfield = heightfield();
        add(&mut heightfield, 1, 1, 0, 2, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 1, 1, 3, 4, AreaType::NOT_WALKABLE);
        add(&mut heightfield, 1, 1, 5, 9, AreaType::NOT_WALKABLE);
        heightfield.filter_low_hanging_walkable_obstacles(2);

        let areas: Vec<_> = heightfield
            .column_keys(1, 1)
            .map(|key| heightfield.span(key).area())
            .collect();
        assert_eq!(
            areas,
            vec![
                AreaType::DEFAULT_WALKABLE,
                AreaType::DEFAULT_WALKABLE,
                AreaType::NOT_WALKABLE
            ]
        );
    }

    #[test]
    fn low_ceiling_is_filtered() {
        let mut heightfield = heightfield();
        add(&mut heightfield, 0, 0, 0, 2, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 0, 0, 4, 5, AreaType::DEFAULT_WALKABLE);
        heightfield.filter_walkable_low_height_spans(3);

        let areas: Vec<_> = heightfield
            .column_keys(0, 0)
            .map(|key| heightfield.span(key).area())
            .collect();
        assert_eq!(areas, vec![AreaType::NOT_WALKABLE, AreaType::DEFAULT_WALKABLE]);
    }

    #[test]
    fn spans_at_the_border_are_ledges() {
        let mut heightfield = heightfield();
        for z in 0..3 {
            for x in 0..3 {
                add(&mut heightfield, x, z, 0, 1, AreaType::DEFAULT_WALKABLE);
            }
        }
        heightfield.filter_ledge_spans(2, 1);
        for z in 0..3 {
            for x in 0..3 {
                let area = heightfield.span_at(x, z).unwrap().area();
                let expected = if x == 1 && z == 1 {
                    AreaType::DEFAULT_WALKABLE
                } else {
                    AreaType::NOT_WALKABLE
                };
                assert_eq!(area, expected, "span at {x},{z}");
            }
        }
    }
}
