use crate::{CompactHeightfield, RegionId, watershed_build_regions::RegionBuildError};

const NULL_NEIGHBOR: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// The region assigned to the sweep.
    id: u16,
    /// How many spans of the previous row border this sweep.
    sample_count: u16,
    /// The single region bordering the sweep in the previous row. 0 if none, [`NULL_NEIGHBOR`] if several.
    neighbor: u16,
}

impl CompactHeightfield {
    /// Builds region data for the heightfield using simple monotone partitioning.
    ///
    /// Monotone partitioning is fast and never produces holes or overlaps,
    /// but tends to create long thin regions. Does not need a distance field.
    ///
    /// See [`CompactHeightfield::build_regions`] for the meaning of the parameters.
    pub fn build_regions_monotone(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionBuildError> {
        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut region_id = self.sweep_rows(border_size, &mut src_reg)?;

        // Merge regions and filter out small regions.
        // Monotone partitioning does not generate overlapping regions.
        let _ = self.merge_and_filter_regions(
            min_region_area,
            merge_region_area,
            &mut region_id,
            &mut src_reg,
        );
        self.max_region = RegionId::from(region_id);

        // Store the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }

    /// Builds region data for the heightfield by partitioning it into non-overlapping layers.
    ///
    /// Produces the fewest regions of the three partitioning methods, at the cost of
    /// more complex and less regular polygons. Does not need a distance field.
    ///
    /// See [`CompactHeightfield::build_regions`] for the meaning of the parameters.
    pub fn build_layer_regions(
        &mut self,
        border_size: u16,
        min_region_area: u16,
    ) -> Result<(), RegionBuildError> {
        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut region_id = self.sweep_rows(border_size, &mut src_reg)?;

        // Merge monotone regions to layers and remove small regions.
        self.merge_and_filter_layer_regions(min_region_area, &mut region_id, &mut src_reg);
        self.max_region = RegionId::from(region_id);

        // Store the result out.
        for (span, region) in self.spans.iter_mut().zip(src_reg) {
            span.region = region;
        }
        Ok(())
    }

    /// Assigns monotone region ids by sweeping the field one row at a time.
    /// Returns the first unused region id.
    fn sweep_rows(
        &mut self,
        border_size: u16,
        src_reg: &mut [RegionId],
    ) -> Result<u16, RegionBuildError> {
        let mut id = self.paint_border_regions(border_size, src_reg);
        self.border_size = border_size;

        let sweep_count = self.width.max(self.height) as usize;
        let mut sweeps = vec![SweepSpan::default(); sweep_count + 1];
        let mut prev: Vec<u16> = Vec::with_capacity(256);

        // Sweep one line at a time.
        for z in border_size..self.height.saturating_sub(border_size) {
            // Collect spans from this row.
            prev.clear();
            prev.resize(id as usize + 1, 0);
            let mut row_id = 1_u16;

            for x in border_size..self.width.saturating_sub(border_size) {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let span = &self.spans[i];
                    let area = self.areas[i];
                    if !area.is_walkable() {
                        continue;
                    }

                    // -x
                    let mut prev_id = 0;
                    if let Some(con) = span.con(0) {
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, 0, con);
                        if !src_reg[a_i].is_border() && area == self.areas[a_i] {
                            prev_id = src_reg[a_i].bits();
                        }
                    }

                    if prev_id == 0 {
                        prev_id = row_id;
                        row_id += 1;
                        if prev_id as usize >= sweeps.len() {
                            sweeps.resize(prev_id as usize + 1, SweepSpan::default());
                        }
                        sweeps[prev_id as usize] = SweepSpan::default();
                    }

                    // -z
                    if let Some(con) = span.con(3) {
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, 3, con);
                        let neighbor_region = src_reg[a_i];
                        if neighbor_region.is_walkable_region() && area == self.areas[a_i] {
                            let nr = neighbor_region.bits();
                            let sweep = &mut sweeps[prev_id as usize];
                            if sweep.neighbor == 0 || sweep.neighbor == nr {
                                sweep.neighbor = nr;
                                sweep.sample_count += 1;
                                prev[nr as usize] += 1;
                            } else {
                                sweep.neighbor = NULL_NEIGHBOR;
                            }
                        }
                    }

                    src_reg[i] = RegionId::from(prev_id);
                }
            }

            // Create unique ID.
            for sweep in sweeps.iter_mut().take(row_id as usize).skip(1) {
                if sweep.neighbor != NULL_NEIGHBOR
                    && sweep.neighbor != 0
                    && prev[sweep.neighbor as usize] == sweep.sample_count
                {
                    sweep.id = sweep.neighbor;
                } else {
                    if id == u16::MAX {
                        return Err(RegionBuildError::RegionIdOverflow);
                    }
                    sweep.id = id;
                    id += 1;
                }
            }

            // Remap IDs
            for x in border_size..self.width.saturating_sub(border_size) {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let region = src_reg[i].bits();
                    if region > 0 && region < row_id {
                        src_reg[i] = RegionId::from(sweeps[region as usize].id);
                    }
                }
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use crate::{RegionId, test_utils::flat_compact_heightfield};

    #[test]
    fn monotone_regions_cover_open_floor() {
        let mut chf = flat_compact_heightfield(10);
        chf.build_regions_monotone(0, 4, 20).unwrap();
        assert_eq!(chf.max_region, RegionId::from(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId::from(1)));
    }

    #[test]
    fn layer_regions_cover_open_floor() {
        let mut chf = flat_compact_heightfield(10);
        chf.build_layer_regions(0, 4).unwrap();
        assert_eq!(chf.max_region, RegionId::from(1));
        assert!(chf.spans.iter().all(|span| span.region == RegionId::from(1)));
    }

    #[test]
    fn monotone_respects_border() {
        let mut chf = flat_compact_heightfield(10);
        chf.build_regions_monotone(3, 1, 20).unwrap();
        let corner = chf.spans[chf.cell_at(0, 0).index() as usize].region;
        let center = chf.spans[chf.cell_at(5, 5).index() as usize].region;
        assert!(corner.is_border());
        assert_eq!(center, RegionId::from(1));
    }

    #[test]
    fn layer_regions_drop_small_islands() {
        let mut chf = flat_compact_heightfield(3);
        chf.build_layer_regions(0, 64).unwrap();
        assert_eq!(chf.max_region, RegionId::NONE);
    }
}
