use crate::CompactHeightfield;

impl CompactHeightfield {
    /// Builds the distance field for the heightfield, which is the distance of each span to the closest boundary.
    /// The result is stored in [`CompactHeightfield::dist`] and [`CompactHeightfield::max_distance`].
    ///
    /// This is usually the second to the last step in creating a fully built compact heightfield.
    /// This step is required before regions are built using [`CompactHeightfield::build_regions`].
    pub fn build_distance_field(&mut self) {
        let (distances, max_distance) = self.calculate_distance_field();
        self.max_distance = max_distance;
        // Blur
        self.dist = self.box_blur(1, &distances);
    }

    fn calculate_distance_field(&self) -> (Vec<u16>, u16) {
        // Init distance and points.
        let mut src = vec![u16::MAX; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let span = &self.spans[i];
                    let area = self.areas[i];
                    let mut neighbor_count = 0;
                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            continue;
                        };
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        if area == self.areas[a_i] {
                            neighbor_count += 1;
                        }
                    }
                    if neighbor_count != 4 {
                        src[i] = 0;
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
                    self.relax_distance_field(&mut src, x, z, i, 0, 3);
                    // (0,-1) then (1,-1)
                    self.relax_distance_field(&mut src, x, z, i, 3, 2);
                }
            }
        }

        // Pass 2
        for z in (0..self.height).rev() {
            for x in (0..self.width).rev() {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    // (1,0) then (1,1)
                    self.relax_distance_field(&mut src, x, z, i, 2, 1);
                    // (0,1) then (-1,1)
                    self.relax_distance_field(&mut src, x, z, i, 1, 0);
                }
            }
        }

        let max_distance = src.iter().copied().max().unwrap_or(0);
        (src, max_distance)
    }

    #[inline]
    fn relax_distance_field(
        &self,
        src: &mut [u16],
        x: u16,
        z: u16,
        i: usize,
        dir: u8,
        diagonal_dir: u8,
    ) {
        let Some(con) = self.spans[i].con(dir) else {
            return;
        };
        let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
        if (src[a_i] as u32 + 2) < src[i] as u32 {
            src[i] = src[a_i] + 2;
        }
        let Some(con) = self.spans[a_i].con(diagonal_dir) else {
            return;
        };
        let (_, _, b_i) = self.con_indices(a_x, a_z, diagonal_dir, con);
        if (src[b_i] as u32 + 3) < src[i] as u32 {
            src[i] = src[b_i] + 3;
        }
    }

    fn box_blur(&self, threshold: u16, src: &[u16]) -> Vec<u16> {
        let threshold = threshold * 2;
        let mut dst = vec![0; src.len()];
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let span = &self.spans[i];
                    let cd = src[i];
                    if cd <= threshold {
                        dst[i] = cd;
                        continue;
                    }

                    let mut d = cd as u32;
                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            d += cd as u32 * 2;
                            continue;
                        };
                        let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        d += src[a_i] as u32;

                        let a_span = &self.spans[a_i];
                        let dir2 = (dir + 1) & 0x3;
                        if let Some(con) = a_span.con(dir2) {
                            let (_, _, b_i) = self.con_indices(a_x, a_z, dir2, con);
                            d += src[b_i] as u32;
                        } else {
                            d += cd as u32;
                        }
                    }
                    dst[i] = ((d + 5) / 9) as u16;
                }
            }
        }
        dst
    }
}
