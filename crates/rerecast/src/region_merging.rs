//! Bookkeeping shared by all region partitioning methods:
//! small regions are removed or merged into their neighbors, and the remaining ids are compacted.

use crate::{AreaType, CompactHeightfield, RegionId};

const BORDER: u16 = RegionId::BORDER_REGION.bits();

#[derive(Debug, Clone)]
struct Region {
    span_count: u32,
    id: u16,
    area_type: AreaType,
    remap: bool,
    visited: bool,
    overlap: bool,
    connects_to_border: bool,
    y_min: u16,
    y_max: u16,
    connections: Vec<u16>,
    floors: Vec<u16>,
}

impl Region {
    fn new(id: u16) -> Self {
        Self {
            span_count: 0,
            id,
            area_type: AreaType::NOT_WALKABLE,
            remap: false,
            visited: false,
            overlap: false,
            connects_to_border: false,
            y_min: u16::MAX,
            y_max: 0,
            connections: Vec::new(),
            floors: Vec::new(),
        }
    }

    #[inline]
    fn is_null_or_border(&self) -> bool {
        self.id == 0 || self.id & BORDER != 0
    }

    fn remove_adjacent_neighbors(&mut self) {
        remove_adjacent_duplicates(&mut self.connections);
    }

    fn replace_neighbor(&mut self, old_id: u16, new_id: u16) {
        let mut neighbor_changed = false;
        for connection in self.connections.iter_mut() {
            if *connection == old_id {
                *connection = new_id;
                neighbor_changed = true;
            }
        }
        for floor in self.floors.iter_mut() {
            if *floor == old_id {
                *floor = new_id;
            }
        }
        if neighbor_changed {
            self.remove_adjacent_neighbors();
        }
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        if self.area_type != other.area_type {
            return false;
        }
        let shared = self.connections.iter().filter(|c| **c == other.id).count();
        if shared > 1 {
            return false;
        }
        !self.floors.contains(&other.id)
    }

    fn add_unique_floor(&mut self, floor: u16) {
        if !self.floors.contains(&floor) {
            self.floors.push(floor);
        }
    }

    fn add_unique_connection(&mut self, connection: u16) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    /// Region is connected to border if one of the neighbours is null id.
    fn is_connected_to_border(&self) -> bool {
        self.connections.contains(&0)
    }
}

/// Removes adjacent duplicates of a circular list.
fn remove_adjacent_duplicates(list: &mut Vec<u16>) {
    let mut i = 0;
    while i < list.len() && list.len() > 1 {
        let ni = (i + 1) % list.len();
        if list[i] == list[ni] {
            list.remove(i);
        } else {
            i += 1;
        }
    }
}

/// Merges `b` into `a`, splicing their circular neighbor lists at the shared edge.
fn merge_regions(a: &mut Region, b: &mut Region) -> bool {
    let a_id = a.id;
    let b_id = b.id;

    // Duplicate current neighbourhood.
    let a_connections = a.connections.clone();

    // Find insertion point on A.
    let Some(insert_a) = a_connections.iter().position(|c| *c == b_id) else {
        return false;
    };
    // Find insertion point on B.
    let Some(insert_b) = b.connections.iter().position(|c| *c == a_id) else {
        return false;
    };

    // Merge neighbours.
    a.connections.clear();
    let n = a_connections.len();
    for i in 0..n - 1 {
        a.connections.push(a_connections[(insert_a + 1 + i) % n]);
    }
    let n = b.connections.len();
    for i in 0..n - 1 {
        a.connections.push(b.connections[(insert_b + 1 + i) % n]);
    }

    a.remove_adjacent_neighbors();

    for floor in b.floors.iter() {
        a.add_unique_floor(*floor);
    }
    a.span_count += b.span_count;
    b.span_count = 0;
    b.connections.clear();
    true
}

/// Mutable access to two distinct elements of a slice.
fn pair_mut<T>(slice: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (left, right) = slice.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = slice.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Compacts the surviving region ids to `1..=n` and writes them back into `src_reg`.
/// Returns the new maximum region id.
fn compress_region_ids(regions: &mut [Region], src_reg: &mut [RegionId]) -> u16 {
    for region in regions.iter_mut() {
        // Skip nil and external regions.
        region.remap = !region.is_null_or_border();
    }

    let mut region_id_gen = 0;
    for i in 0..regions.len() {
        if !regions[i].remap {
            continue;
        }
        let old_id = regions[i].id;
        region_id_gen += 1;
        let new_id = region_id_gen;
        for region in regions[i..].iter_mut() {
            if region.id == old_id {
                region.id = new_id;
                region.remap = false;
            }
        }
    }

    // Remap regions.
    for region in src_reg.iter_mut() {
        if !region.is_border() {
            *region = RegionId::from(regions[region.bits() as usize].id);
        }
    }
    region_id_gen
}

impl CompactHeightfield {
    /// Removes regions smaller than `min_region_area` and merges regions of at most
    /// `merge_region_area` spans into their smallest compatible neighbor.
    ///
    /// Returns the ids of regions that were found to overlap themselves.
    pub(crate) fn merge_and_filter_regions(
        &self,
        min_region_area: u16,
        merge_region_area: u16,
        max_region_id: &mut u16,
        src_reg: &mut [RegionId],
    ) -> Vec<u16> {
        let region_count = *max_region_id as usize + 1;
        let mut regions: Vec<Region> = (0..region_count).map(|i| Region::new(i as u16)).collect();

        // Find edge of a region and find connections around the contour.
        let src: &[RegionId] = src_reg;
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let r = src[i].bits();
                    if r == 0 || r as usize >= region_count {
                        continue;
                    }
                    let region = &mut regions[r as usize];
                    region.span_count += 1;

                    // Update floors.
                    for j in cell.index_range() {
                        if i == j {
                            continue;
                        }
                        let floor_id = src[j].bits();
                        if floor_id == 0 || floor_id as usize >= region_count {
                            continue;
                        }
                        if floor_id == r {
                            region.overlap = true;
                        }
                        region.add_unique_floor(floor_id);
                    }

                    // Have found contour
                    if !region.connections.is_empty() {
                        continue;
                    }

                    region.area_type = self.areas[i];

                    // Check if this cell is next to a border.
                    let Some(dir) = (0..4).find(|dir| self.is_solid_edge(src, x, z, i, *dir))
                    else {
                        continue;
                    };
                    // The cell is at border.
                    // Walk around the contour to find all the neighbours.
                    region.connections = self.walk_region_contour(x, z, i, dir, src);
                }
            }
        }

        // Ids reserved for border strips never own a span.
        for region in regions.iter_mut() {
            if region.span_count == 0 {
                region.id = 0;
            }
        }

        // Remove too small regions.
        let mut stack = Vec::with_capacity(32);
        let mut trace = Vec::with_capacity(32);
        for i in 0..region_count {
            let region = &regions[i];
            if region.is_null_or_border() || region.span_count == 0 || region.visited {
                continue;
            }

            // Count the total size of all the connected regions.
            // Also keep track of the regions connects to a tile border.
            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();

            regions[i].visited = true;
            stack.push(i);

            while let Some(ri) = stack.pop() {
                span_count += regions[ri].span_count;
                trace.push(ri);

                for j in 0..regions[ri].connections.len() {
                    let connection = regions[ri].connections[j];
                    if connection & BORDER != 0 {
                        connects_to_border = true;
                        continue;
                    }
                    let neighbor = &mut regions[connection as usize];
                    if neighbor.visited || neighbor.is_null_or_border() {
                        continue;
                    }
                    // Visit
                    stack.push(neighbor.id as usize);
                    neighbor.visited = true;
                }
            }

            // If the accumulated regions size is too small, remove it.
            // Do not remove areas which connect to tile borders
            // as their size cannot be estimated correctly and removing them
            // can potentially remove necessary areas.
            if span_count < min_region_area as u32 && !connects_to_border {
                // Kill all visited regions.
                for &index in &trace {
                    regions[index].span_count = 0;
                    regions[index].id = 0;
                }
            }
        }

        // Merge too small regions to neighbour regions.
        loop {
            let mut merge_count = 0;
            for i in 0..region_count {
                let region = &regions[i];
                if region.is_null_or_border() || region.overlap || region.span_count == 0 {
                    continue;
                }

                // Check to see if the region should be merged.
                if region.span_count > merge_region_area as u32 && region.is_connected_to_border()
                {
                    continue;
                }

                // Small region with more than 1 connection.
                // Or region which is not connected to a border at all.
                // Find smallest neighbour region that connects to this one.
                let mut smallest = u32::MAX;
                let mut merge_id = region.id;
                for &connection in &region.connections {
                    if connection & BORDER != 0 {
                        continue;
                    }
                    let other = &regions[connection as usize];
                    if other.is_null_or_border() || other.overlap {
                        continue;
                    }
                    if other.span_count < smallest
                        && region.can_merge_with(other)
                        && other.can_merge_with(region)
                    {
                        smallest = other.span_count;
                        merge_id = other.id;
                    }
                }

                // Found new id.
                if merge_id == region.id {
                    continue;
                }
                let old_id = region.id;
                if merge_id as usize == i {
                    continue;
                }
                let (target, region) = pair_mut(&mut regions, merge_id as usize, i);
                // Merge neighbours.
                if !merge_regions(target, region) {
                    continue;
                }
                // Fixup regions pointing to current region.
                for other in regions.iter_mut() {
                    if other.is_null_or_border() {
                        continue;
                    }
                    // If another region was already merged into current region
                    // change the nid of the previous region too.
                    if other.id == old_id {
                        other.id = merge_id;
                    }
                    // Replace the current region with the new one if the
                    // current regions is neighbour.
                    other.replace_neighbor(old_id, merge_id);
                }
                merge_count += 1;
            }
            if merge_count == 0 {
                break;
            }
        }

        *max_region_id = compress_region_ids(&mut regions, src_reg);

        // Return regions that we found to be overlapping.
        regions
            .iter()
            .filter(|region| region.overlap)
            .map(|region| region.id)
            .collect()
    }

    /// Merges monotone regions into non-overlapping layers and removes layers smaller than `min_region_area`.
    pub(crate) fn merge_and_filter_layer_regions(
        &self,
        min_region_area: u16,
        max_region_id: &mut u16,
        src_reg: &mut [RegionId],
    ) {
        let region_count = *max_region_id as usize + 1;
        let mut regions: Vec<Region> = (0..region_count).map(|i| Region::new(i as u16)).collect();

        // Find region neighbours and overlapping regions.
        let mut layer_regions = Vec::with_capacity(32);
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                layer_regions.clear();

                for i in cell.index_range() {
                    let span = &self.spans[i];
                    let ri = src_reg[i].bits();
                    if ri == 0 || ri as usize >= region_count {
                        continue;
                    }
                    let region = &mut regions[ri as usize];
                    region.span_count += 1;
                    region.area_type = self.areas[i];
                    region.y_min = region.y_min.min(span.y);
                    region.y_max = region.y_max.max(span.y);

                    // Collect all region layers.
                    layer_regions.push(ri);

                    // Update neighbours
                    for dir in 0..4 {
                        let Some(con) = span.con(dir) else {
                            continue;
                        };
                        let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                        let rai = src_reg[a_i].bits();
                        if rai > 0 && (rai as usize) < region_count && rai != ri {
                            region.add_unique_connection(rai);
                        }
                        if rai & BORDER != 0 {
                            region.connects_to_border = true;
                        }
                    }
                }

                // Update overlapping regions.
                for i in 0..layer_regions.len() {
                    for j in i + 1..layer_regions.len() {
                        let (ri, rj) = (layer_regions[i], layer_regions[j]);
                        if ri != rj {
                            regions[ri as usize].add_unique_floor(rj);
                            regions[rj as usize].add_unique_floor(ri);
                        }
                    }
                }
            }
        }

        // Create 2D layers from regions.
        let mut layer_id = 1;
        for region in regions.iter_mut() {
            region.id = 0;
        }

        // Merge montone regions to create non-overlapping areas.
        let mut stack = std::collections::VecDeque::with_capacity(32);
        for i in 1..region_count {
            // Skip already visited and unused ids.
            if regions[i].id != 0 || regions[i].span_count == 0 {
                continue;
            }

            // Start search.
            regions[i].id = layer_id;
            stack.clear();
            stack.push_back(i);

            while let Some(current) = stack.pop_front() {
                let area_type = regions[current].area_type;
                let connections = regions[current].connections.clone();
                for neighbor in connections {
                    let neighbor = neighbor as usize;
                    // Skip already visited.
                    if regions[neighbor].id != 0 {
                        continue;
                    }
                    // Skip if different area type, do not connect regions with different area type.
                    if regions[neighbor].area_type != area_type {
                        continue;
                    }
                    // Skip if the neighbour is overlapping root region.
                    if regions[i].floors.contains(&(neighbor as u16)) {
                        continue;
                    }

                    // Deepen
                    stack.push_back(neighbor);

                    let (root, other) = pair_mut(&mut regions, i, neighbor);
                    // Mark layer id
                    other.id = layer_id;
                    // Merge current layers to root.
                    for &floor in &other.floors {
                        root.add_unique_floor(floor);
                    }
                    root.y_min = root.y_min.min(other.y_min);
                    root.y_max = root.y_max.max(other.y_max);
                    root.span_count += other.span_count;
                    other.span_count = 0;
                    root.connects_to_border |= other.connects_to_border;
                }
            }

            layer_id += 1;
        }

        // Remove small regions
        for i in 0..region_count {
            let region = &regions[i];
            if region.span_count > 0
                && region.span_count < min_region_area as u32
                && !region.connects_to_border
            {
                let id = region.id;
                for other in regions.iter_mut() {
                    if other.id == id {
                        other.id = 0;
                    }
                }
            }
        }

        *max_region_id = compress_region_ids(&mut regions, src_reg);
    }

    fn is_solid_edge(&self, src_reg: &[RegionId], x: u16, z: u16, i: usize, dir: u8) -> bool {
        let neighbor_region = self.spans[i]
            .con(dir)
            .map(|con| {
                let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                src_reg[a_i]
            })
            .unwrap_or(RegionId::NONE);
        neighbor_region != src_reg[i]
    }

    /// Walks the outline of the region containing span `i` and collects the ids of the regions on the other side.
    fn walk_region_contour(
        &self,
        mut x: u16,
        mut z: u16,
        mut i: usize,
        mut dir: u8,
        src_reg: &[RegionId],
    ) -> Vec<u16> {
        let start_dir = dir;
        let start_i = i;

        let neighbor_region = |x: u16, z: u16, i: usize, dir: u8| {
            self.spans[i]
                .con(dir)
                .map(|con| {
                    let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                    src_reg[a_i].bits()
                })
                .unwrap_or(0)
        };

        let mut current_region = neighbor_region(x, z, i, dir);
        let mut contour = vec![current_region];

        let mut iter = 0;
        loop {
            iter += 1;
            if iter >= 40000 {
                break;
            }
            if self.is_solid_edge(src_reg, x, z, i, dir) {
                // Choose the edge corner
                let r = neighbor_region(x, z, i, dir);
                if r != current_region {
                    current_region = r;
                    contour.push(current_region);
                }
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some(con) = self.spans[i].con(dir) else {
                    // Should not happen.
                    return contour;
                };
                let (n_x, n_z, n_i) = self.con_indices(x as i32, z as i32, dir, con);
                x = n_x as u16;
                z = n_z as u16;
                i = n_i;
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }

            if start_i == i && start_dir == dir {
                break;
            }
        }

        // Remove adjacent duplicates.
        remove_adjacent_duplicates(&mut contour);
        contour
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_duplicates_wrap_around() {
        let mut list = vec![1, 1, 2, 3, 3, 1];
        remove_adjacent_duplicates(&mut list);
        assert_eq!(list, vec![1, 2, 3]);
    }

    #[test]
    fn single_element_is_kept() {
        let mut list = vec![4, 4, 4];
        remove_adjacent_duplicates(&mut list);
        assert_eq!(list, vec![4]);
    }

    #[test]
    fn merging_splices_neighbor_rings() {
        let mut a = Region::new(1);
        a.connections = vec![0, 2, 3];
        a.span_count = 4;
        let mut b = Region::new(2);
        b.connections = vec![0, 1];
        b.span_count = 3;

        assert!(merge_regions(&mut a, &mut b));
        assert_eq!(a.span_count, 7);
        assert_eq!(b.span_count, 0);
        assert!(b.connections.is_empty());
        assert!(!a.connections.contains(&2));
        assert!(a.connections.contains(&3));
    }

    #[test]
    fn merging_requires_shared_edge() {
        let mut a = Region::new(1);
        a.connections = vec![0];
        let mut b = Region::new(2);
        b.connections = vec![0];
        assert!(!merge_regions(&mut a, &mut b));
    }
}
