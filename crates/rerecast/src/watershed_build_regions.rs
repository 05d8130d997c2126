use thiserror::Error;

use crate::{CompactHeightfield, RegionId};

impl CompactHeightfield {
    /// Partitions the walkable spans into regions by flooding the distance field from its
    /// peaks downwards, two distance levels at a time.
    ///
    /// Every resulting region is a connected set of non-overlapping spans with a single
    /// outline. Islands smaller than `min_region_area` lose their region, and regions below
    /// `merge_region_area` are merged into a neighbor, which cleans up the slivers the
    /// flooding leaves in diagonal corridors.
    ///
    /// Call [`CompactHeightfield::build_distance_field`] first. The result is written to
    /// [`CompactSpan::region`](crate::CompactSpan::region) and [`CompactHeightfield::max_region`].
    pub fn build_regions(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionBuildError> {
        const STACK_COUNT: usize = 8;
        let mut level_stacks: [Vec<LevelStackEntry>; STACK_COUNT] =
            std::array::from_fn(|_| Vec::with_capacity(256));
        let mut flood_stack = Vec::with_capacity(256);

        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut src_dist = vec![0_u16; self.spans.len()];

        // Levels come in pairs, starting from the first even level above the peak.
        let mut level = (self.max_distance + 1) & !1;

        // How far the watershed overflows into unassigned spans per level.
        let expand_iters = 8;

        let mut region_id = self.paint_border_regions(border_size, &mut src_reg);
        self.border_size = border_size;

        let mut pass = 0_usize;
        while level > 0 {
            level = level.saturating_sub(2);
            let current = pass % STACK_COUNT;
            pass += 1;

            if current == 0 {
                self.sort_cells_by_level(level, &src_reg, &mut level_stacks, 1);
            } else {
                // Unassigned spans carry over to the next level.
                let (src, dst) = level_stacks.split_at_mut(current);
                append_stacks(&src[current - 1], &mut dst[0], &src_reg);
            }

            self.expand_regions(
                expand_iters,
                level,
                &mut src_reg,
                &mut src_dist,
                &mut level_stacks[current],
                false,
            );

            // Whatever is still unassigned at this level seeds a new region.
            for j in 0..level_stacks[current].len() {
                let entry = level_stacks[current][j].clone();
                let Some(i) = entry.index else {
                    continue;
                };
                if src_reg[i] != RegionId::NONE {
                    continue;
                }
                if self.flood_region(
                    entry.x,
                    entry.z,
                    i,
                    level,
                    RegionId::from(region_id),
                    &mut src_reg,
                    &mut src_dist,
                    &mut flood_stack,
                ) {
                    if region_id == u16::MAX {
                        return Err(RegionBuildError::RegionIdOverflow);
                    }
                    region_id += 1;
                }
            }
        }

        // Grow into everything that is left.
        self.expand_regions(
            expand_iters * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut flood_stack,
            true,
        );

        let mut max_region_id = region_id;
        let overlaps = self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            &mut max_region_id,
            &mut src_reg,
        );
        self.max_region = RegionId::from(max_region_id);

        if !overlaps.is_empty() {
            tracing::error!("build_regions: {} overlapping regions.", overlaps.len());
        }

        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }

    /// Paints the four border strips with their own border regions.
    /// Returns the next free region id.
    pub(crate) fn paint_border_regions(&self, border_size: u16, src_reg: &mut [RegionId]) -> u16 {
        let mut region_id = 1;
        if border_size == 0 {
            return region_id;
        }
        let border_width = border_size.min(self.width);
        let border_height = border_size.min(self.height);
        let rects = [
            (0, border_width, 0, self.height),
            (self.width - border_width, self.width, 0, self.height),
            (0, self.width, 0, border_height),
            (0, self.width, self.height - border_height, self.height),
        ];
        for (min_x, max_x, min_z, max_z) in rects {
            self.paint_rect_region(
                min_x,
                max_x,
                min_z,
                max_z,
                RegionId::from(region_id) | RegionId::BORDER_REGION,
                src_reg,
            );
            region_id += 1;
        }
        region_id
    }

    fn paint_rect_region(
        &self,
        min_x: u16,
        max_x: u16,
        min_z: u16,
        max_z: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
    ) {
        for z in min_z..max_z {
            for x in min_x..max_x {
                let cell = self.cell_at(x, z);
                for i in cell.index_range() {
                    if self.areas[i].is_walkable() {
                        src_reg[i] = region;
                    }
                }
            }
        }
    }

    fn sort_cells_by_level(
        &self,
        start_level: u16,
        src_reg: &[RegionId],
        stacks: &mut [Vec<LevelStackEntry>],
        log_levels_per_stack: u16,
    ) {
        let start_level = start_level >> log_levels_per_stack;
        for stack in stacks.iter_mut() {
            stack.clear();
        }

        // Bucket the unassigned spans by level, highest first.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = self.cell_at(x, z);
                for i in cell.index_range() {
                    if !self.areas[i].is_walkable() || src_reg[i] != RegionId::NONE {
                        continue;
                    }
                    let level = self.dist[i] >> log_levels_per_stack;
                    let s_id = start_level.saturating_sub(level);
                    if s_id as usize >= stacks.len() {
                        continue;
                    }
                    stacks[s_id as usize].push(LevelStackEntry {
                        x,
                        z,
                        index: Some(i),
                    });
                }
            }
        }
    }

    fn expand_regions(
        &self,
        max_iter: u16,
        level: u16,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
        fill_stack: bool,
    ) {
        if fill_stack {
            // Everything at or above `level` that is still unassigned.
            stack.clear();
            for z in 0..self.height {
                for x in 0..self.width {
                    let cell = self.cell_at(x, z);
                    for i in cell.index_range() {
                        if self.dist[i] >= level
                            && src_reg[i] == RegionId::NONE
                            && self.areas[i].is_walkable()
                        {
                            stack.push(LevelStackEntry {
                                x,
                                z,
                                index: Some(i),
                            });
                        }
                    }
                }
            }
        } else {
            // Drop the entries that were assigned in the meantime.
            for entry in stack.iter_mut() {
                if let Some(i) = entry.index
                    && src_reg[i] != RegionId::NONE
                {
                    entry.index = None;
                }
            }
        }

        let mut updates: Vec<DirtyEntry> = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            updates.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };

                let mut r = src_reg[i];
                let mut d2 = u16::MAX;
                let area = self.areas[i];
                let span = &self.spans[i];
                for dir in 0..4 {
                    let Some(con) = span.con(dir) else {
                        continue;
                    };
                    let (_, _, a_i) = self.con_indices(entry.x as i32, entry.z as i32, dir, con);
                    if self.areas[a_i] != area {
                        continue;
                    }
                    let a_region = src_reg[a_i];
                    if a_region != RegionId::NONE
                        && !a_region.is_border()
                        && (src_dist[a_i] as u32 + 2) < d2 as u32
                    {
                        r = a_region;
                        d2 = src_dist[a_i] + 2;
                    }
                }
                if r != RegionId::NONE {
                    entry.index = None;
                    updates.push(DirtyEntry {
                        index: i,
                        region: r,
                        distance2: d2,
                    });
                } else {
                    failed += 1;
                }
            }
            // Applied after the sweep so one pass only grows regions by one span.
            for update in &updates {
                src_reg[update.index] = update.region;
                src_dist[update.index] = update.distance2;
            }

            if failed == stack.len() {
                break;
            }

            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    /// Flood fills a new region starting at span `i`.
    /// Returns `false` if the seed was absorbed by a neighboring region instead.
    fn flood_region(
        &self,
        x: u16,
        z: u16,
        i: usize,
        level: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) -> bool {
        let area = self.areas[i];

        stack.clear();
        stack.push(LevelStackEntry {
            x,
            z,
            index: Some(i),
        });
        src_reg[i] = region;
        src_dist[i] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some(back) = stack.pop() {
            let (cx, cz) = (back.x as i32, back.z as i32);
            let Some(ci) = back.index else {
                continue;
            };
            let cs = &self.spans[ci];

            // Give up the span if it touches another region, diagonals included.
            let mut ar = RegionId::NONE;
            for dir in 0..4 {
                let Some(con) = cs.con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = self.con_indices(cx, cz, dir, con);
                if self.areas[a_i] != area {
                    continue;
                }
                let nr = src_reg[a_i];
                if nr.is_border() {
                    continue;
                }
                if nr != RegionId::NONE && nr != region {
                    ar = nr;
                    break;
                }

                let a_span = &self.spans[a_i];
                let dir2 = (dir + 1) & 0x3;
                if let Some(con2) = a_span.con(dir2) {
                    let (_, _, a_i2) = self.con_indices(a_x, a_z, dir2, con2);
                    if self.areas[a_i2] != area {
                        continue;
                    }
                    let nr2 = src_reg[a_i2];
                    if nr2 != RegionId::NONE && nr2 != region {
                        ar = nr2;
                        break;
                    }
                }
            }
            if ar != RegionId::NONE {
                src_reg[ci] = RegionId::NONE;
                continue;
            }

            count += 1;

            for dir in 0..4 {
                let Some(con) = cs.con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = self.con_indices(cx, cz, dir, con);
                if self.areas[a_i] != area {
                    continue;
                }
                if self.dist[a_i] >= lev && src_reg[a_i] == RegionId::NONE {
                    src_reg[a_i] = region;
                    src_dist[a_i] = 0;
                    stack.push(LevelStackEntry {
                        x: a_x as u16,
                        z: a_z as u16,
                        index: Some(a_i),
                    });
                }
            }
        }
        count > 0
    }
}

fn append_stacks(
    src_stack: &[LevelStackEntry],
    dst_stack: &mut Vec<LevelStackEntry>,
    src_region: &[RegionId],
) {
    for entry in src_stack.iter() {
        let Some(i) = entry.index else {
            continue;
        };
        if src_region[i] != RegionId::NONE {
            continue;
        }
        dst_stack.push(entry.clone());
    }
}

#[derive(Clone, Debug)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    index: Option<usize>,
}

#[derive(Clone, Debug)]
struct DirtyEntry {
    index: usize,
    region: RegionId,
    distance2: u16,
}

/// Errors that can occur while partitioning a [`CompactHeightfield`] into regions.
#[derive(Error, Debug)]
pub enum RegionBuildError {
    /// More regions were created than a [`RegionId`] can address.
    #[error("Region ID overflow")]
    RegionIdOverflow,
}

#[cfg(test)]
mod tests {
    use crate::{RegionId, test_utils::flat_compact_heightfield};

    #[test]
    fn open_floor_becomes_a_single_region() {
        let mut chf = flat_compact_heightfield(12);
        chf.build_distance_field();
        chf.build_regions(0, 4, 20).unwrap();
        assert!(chf.max_region >= RegionId::from(1));
        assert!(chf.spans.iter().all(|span| span.region.is_walkable_region()));
    }

    #[test]
    fn border_strips_are_border_regions() {
        let mut chf = flat_compact_heightfield(12);
        chf.build_distance_field();
        chf.build_regions(2, 4, 20).unwrap();
        assert_eq!(chf.border_size, 2);
        for z in 0..chf.height {
            for x in 0..chf.width {
                let region = chf.spans[chf.cell_at(x, z).index() as usize].region;
                let in_border = x < 2 || z < 2 || x >= 10 || z >= 10;
                assert_eq!(region.is_border(), in_border, "span at {x},{z}");
                if !in_border {
                    assert!(region.is_walkable_region(), "span at {x},{z}");
                }
            }
        }
    }

    #[test]
    fn tiny_islands_are_removed() {
        let mut chf = flat_compact_heightfield(3);
        chf.build_distance_field();
        chf.build_regions(0, 64, 20).unwrap();
        assert_eq!(chf.max_region, RegionId::NONE);
        assert!(chf.spans.iter().all(|span| span.region == RegionId::NONE));
    }
}
