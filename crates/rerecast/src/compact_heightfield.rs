use thiserror::Error;

use crate::{
    Aabb3d,
    compact_cell::CompactCell,
    compact_span::CompactSpan,
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    region::RegionId,
    span::AreaType,
};

/// A packed representation of a [`Heightfield`].
///
/// Where a [`Heightfield`] stores the solid spans, this stores the open space above each walkable span,
/// together with the connections to the neighboring columns.
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The walkable height used during the build of the field
    pub walkable_height: u16,
    /// The walkable climb used during the build of the field.
    pub walkable_climb: u16,
    /// The AABB border size used during the build of the field.
    pub border_size: u16,
    /// The maximum distance value of any span within the field.
    pub max_distance: u16,
    /// The maximum region id of any span within the field.
    pub max_region: RegionId,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The cells in the heightfield [Size: `width * height`]
    pub cells: Vec<CompactCell>,
    /// All walkable spans in the heightfield
    pub spans: Vec<CompactSpan>,
    /// Vector containing border distance data. [Size: `spans.len()`]
    pub dist: Vec<u16>,
    /// Vector containing area type data. [Size: `spans.len()`]
    pub areas: Vec<AreaType>,
}

impl Heightfield {
    /// Builds a [`CompactHeightfield`] from this heightfield.
    /// See [`CompactHeightfield::from_heightfield`].
    pub fn into_compact(
        self,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<CompactHeightfield, CompactHeightfieldError> {
        CompactHeightfield::from_heightfield(self, walkable_height, walkable_climb)
    }
}

impl CompactHeightfield {
    const MAX_HEIGHT: u16 = u16::MAX;
    /// The highest layer index a connection can encode.
    const MAX_LAYERS: u8 = CompactSpan::NOT_CONNECTED - 1;

    /// Builds a compact heightfield from a heightfield.
    ///
    /// Only walkable spans are kept. Each one becomes the open space between its ceiling and
    /// the floor of the span above it, and is linked to the neighboring spans an agent of
    /// `walkable_height` and `walkable_climb` can step to.
    ///
    /// # Errors
    ///
    /// Returns an error if a neighbor lies in a layer higher than a connection can encode.
    pub fn from_heightfield(
        heightfield: Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<Self, CompactHeightfieldError> {
        let walkable_span_count = heightfield
            .allocated_spans
            .values()
            .filter(|span| span.area().is_walkable())
            .count();
        let column_count = heightfield.width as usize * heightfield.height as usize;

        let mut aabb = heightfield.aabb;
        aabb.max.y += walkable_height as f32 * heightfield.cell_height;
        let mut chf = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            aabb,
            max_distance: 0,
            max_region: RegionId::NONE,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: vec![CompactCell::default(); column_count],
            spans: Vec::with_capacity(walkable_span_count),
            dist: Vec::new(),
            areas: Vec::with_capacity(walkable_span_count),
        };
        chf.collect_open_spans(&heightfield);
        chf.connect_neighbors(walkable_height, walkable_climb)?;
        Ok(chf)
    }

    /// Turns the walkable solid spans of every column into open spans.
    fn collect_open_spans(&mut self, heightfield: &Heightfield) {
        for z in 0..self.height {
            for x in 0..self.width {
                let column = self.column_index(x, z);
                self.cells[column].set_index(self.spans.len() as u32);
                for key in heightfield.column_keys(x, z) {
                    let span = heightfield.span(key);
                    if !span.area().is_walkable() {
                        continue;
                    }
                    let floor = span.max();
                    let ceiling = span
                        .next()
                        .map_or(Self::MAX_HEIGHT, |next| heightfield.span(next).min());
                    let height = ceiling.saturating_sub(floor).min(u8::MAX.into()) as u8;
                    self.spans.push(CompactSpan::new(floor, height));
                    self.areas.push(span.area());
                    self.cells[column].inc_count();
                }
            }
        }
    }

    /// Links every span to the first span in each neighboring column that has
    /// enough headroom and is within climbing distance.
    fn connect_neighbors(
        &mut self,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<(), CompactHeightfieldError> {
        let mut too_high_layer = None;
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    for dir in 0..4_u8 {
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                        if neighbor_x < 0
                            || neighbor_z < 0
                            || neighbor_x >= self.width as i32
                            || neighbor_z >= self.height as i32
                        {
                            self.spans[i].set_con(dir, None);
                            continue;
                        }
                        let neighbor_cell = *self.cell_at(neighbor_x as u16, neighbor_z as u16);
                        let span = &self.spans[i];
                        let (floor, ceiling) = (span.y as i32, span.y as i32 + span.height() as i32);
                        let layer = neighbor_cell.index_range().position(|k| {
                            let other = &self.spans[k];
                            let gap = ceiling.min(other.y as i32 + other.height() as i32)
                                - floor.max(other.y as i32);
                            gap >= walkable_height as i32
                                && (other.y as i32 - floor).abs() <= walkable_climb as i32
                        });
                        let con = match layer {
                            Some(layer) if layer >= Self::MAX_LAYERS as usize => {
                                too_high_layer = too_high_layer.max(Some(layer as u32));
                                None
                            }
                            Some(layer) => Some(layer as u8),
                            None => None,
                        };
                        self.spans[i].set_con(dir, con);
                    }
                }
            }
        }
        match too_high_layer {
            Some(layer_index) => Err(CompactHeightfieldError::TooManyLayers {
                max_layer_index: Self::MAX_LAYERS,
                layer_index,
            }),
            None => Ok(()),
        }
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    /// Returns the cell at the given coordinates. Returns `None` if the coordinates are invalid.
    #[inline]
    pub fn get_cell_at(&self, x: u16, z: u16) -> Option<&CompactCell> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.cells.get(self.column_index(x, z))
    }

    /// Returns the cell at the given coordinates. Panics if the coordinates are invalid.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &CompactCell {
        &self.cells[self.column_index(x, z)]
    }

    /// Resolves the neighbor of the span at `(x, z)` in `dir`, given its connection value.
    /// Returns the neighbor's cell coordinates and span index.
    #[inline]
    pub(crate) fn con_indices(&self, x: i32, z: i32, dir: u8, con: u8) -> (i32, i32, usize) {
        let a_x = x + dir_offset_x(dir) as i32;
        let a_z = z + dir_offset_z(dir) as i32;
        let a_i = self.cells[(a_x + a_z * self.width as i32) as usize].index() as usize
            + con as usize;
        (a_x, a_z, a_i)
    }
}

/// Errors that can occur when building a compact heightfield.
#[derive(Debug, Error)]
pub enum CompactHeightfieldError {
    /// The heightfield has too many layers.
    #[error(
        "Heightfield has too many layers. Max layer index is {max_layer_index}, but got {layer_index}"
    )]
    TooManyLayers {
        /// The maximum layer index.
        max_layer_index: u8,
        /// The layer index that caused the error.
        layer_index: u32,
    },
}

#[cfg(test)]
mod tests {
    use crate::test_utils::flat_compact_heightfield;

    #[test]
    fn flat_field_has_one_span_per_cell() {
        let chf = flat_compact_heightfield(5);
        assert_eq!(chf.spans.len(), 25);
        assert!(chf.cells.iter().all(|cell| cell.count() == 1));
        assert!(chf.areas.iter().all(|area| area.is_walkable()));
    }

    #[test]
    fn interior_spans_are_connected_in_all_directions() {
        let chf = flat_compact_heightfield(5);
        let center = &chf.spans[chf.cell_at(2, 2).index() as usize];
        for dir in 0..4 {
            assert_eq!(center.con(dir), Some(0), "direction {dir}");
        }
        let corner = &chf.spans[chf.cell_at(0, 0).index() as usize];
        // -x and -z lead out of the field.
        assert_eq!(corner.con(0), None);
        assert_eq!(corner.con(3), None);
        assert_eq!(corner.con(1), Some(0));
        assert_eq!(corner.con(2), Some(0));
    }
}
