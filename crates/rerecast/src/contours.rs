use glam::{U16Vec3, Vec2};

use crate::{
    Aabb3d, AreaType, CompactHeightfield, RegionId,
    math::{
        distance_squared_between_point_and_line_vec2, intersect, left, left_on, next, prev,
        vequal,
    },
};

impl CompactHeightfield {
    /// Builds a contour set from the region outlines in the provided compact heightfield.
    ///
    /// The raw contours will match the region outlines exactly. The `max_error` and `max_edge_len`
    /// parameters control how closely the simplified contours will match the raw contours.
    ///
    /// Simplified contours are generated such that the vertices for portals between areas match up.
    /// (They are considered mandatory vertices.)
    ///
    /// Setting `max_edge_len` to zero will disable the edge length feature.
    pub fn build_contours(
        &self,
        max_error: f32,
        max_edge_len: u16,
        build_flags: BuildContoursFlags,
    ) -> ContourSet {
        let border_size = self.border_size;
        let mut cset = ContourSet {
            contours: Vec::with_capacity(self.max_region.bits().max(8) as usize),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width - border_size * 2,
            height: self.height - border_size * 2,
            border_size,
            max_error,
        };
        if border_size > 0 {
            // If the heightfield was built with border_size, remove the offset
            let pad = border_size as f32 * self.cell_size;
            cset.aabb.min.x += pad;
            cset.aabb.min.z += pad;
            cset.aabb.max.x -= pad;
            cset.aabb.max.z -= pad;
        }

        let mut flags = vec![0_u8; self.spans.len()];

        // Mark boundaries.
        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    let span = &self.spans[i];
                    if !span.region.is_walkable_region() {
                        flags[i] = 0;
                        continue;
                    }
                    let mut res = 0;
                    for dir in 0..4 {
                        let mut r = RegionId::NONE;
                        if let Some(con) = span.con(dir) {
                            let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                            r = self.spans[a_i].region;
                        }
                        if r == span.region {
                            res |= 1 << dir;
                        }
                    }
                    // Inverse, mark non connected edges.
                    flags[i] = res ^ 0xf;
                }
            }
        }

        let mut verts = Vec::with_capacity(256);
        let mut simplified = Vec::with_capacity(64);

        for z in 0..self.height {
            for x in 0..self.width {
                let cell = *self.cell_at(x, z);
                for i in cell.index_range() {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let region = self.spans[i].region;
                    if !region.is_walkable_region() {
                        continue;
                    }
                    let area = self.areas[i];

                    verts.clear();
                    simplified.clear();

                    self.walk_contour(x, z, i, &mut flags, &mut verts);
                    simplify_contour(
                        &verts,
                        &mut simplified,
                        max_error,
                        max_edge_len,
                        build_flags,
                    );
                    remove_degenerate_segments(&mut simplified);

                    // Create contour.
                    if simplified.len() < 3 {
                        continue;
                    }
                    let offset = U16Vec3::new(border_size, 0, border_size);
                    // If the heightfield was built with border_size, remove the offset.
                    let remove_border = |(vertex, data): &(U16Vec3, RegionVertexId)| {
                        (*vertex - offset, *data)
                    };
                    cset.contours.push(Contour {
                        vertices: simplified.iter().map(remove_border).collect(),
                        raw_vertices: verts.iter().map(remove_border).collect(),
                        region,
                        area,
                    });
                }
            }
        }

        // Merge holes if needed.
        if !cset.contours.is_empty() {
            self.merge_holes(&mut cset.contours);
        }

        cset
    }

    fn merge_holes(&self, contours: &mut [Contour]) {
        // Calculate winding of all polygons.
        // If the contour is wound backwards, it is a hole.
        let winding: Vec<bool> = contours
            .iter()
            .map(|contour| calc_area_of_polygon_2d(&contour.vertices) < 0)
            .collect();
        if !winding.iter().any(|is_hole| *is_hole) {
            return;
        }

        // Collect outline contour and holes contours per region.
        // We assume that there is one outline and multiple holes.
        let region_count = self.max_region.bits() as usize + 1;
        let mut regions: Vec<ContourRegion> = vec![ContourRegion::default(); region_count];
        for (i, contour) in contours.iter().enumerate() {
            let region = &mut regions[contour.region.bits() as usize];
            // Positively wound contours are outlines, negative holes.
            if winding[i] {
                region.holes.push(ContourHole {
                    contour: i,
                    ..Default::default()
                });
            } else {
                if region.outline.is_some() {
                    tracing::error!(
                        "build_contours: Multiple outlines for region {}.",
                        contour.region.bits()
                    );
                }
                region.outline = Some(i);
            }
        }

        // Finally merge each regions holes into the outline.
        for (i, region) in regions.iter_mut().enumerate() {
            if region.holes.is_empty() {
                continue;
            }
            if region.outline.is_some() {
                merge_region_holes(region, contours);
            } else {
                // The region does not have an outline.
                // This can happen if the contour becomes selfoverlapping because of
                // too aggressive simplification settings.
                tracing::error!(
                    "build_contours: Bad outline for region {i}, contour simplification is likely too aggressive."
                );
            }
        }
    }

    fn walk_contour(
        &self,
        mut x: u16,
        mut z: u16,
        mut i: usize,
        flags: &mut [u8],
        points: &mut Vec<(U16Vec3, RegionVertexId)>,
    ) {
        // Choose the first non-connected edge
        let mut dir = 0;
        while flags[i] & (1 << dir) == 0 {
            dir += 1;
        }

        let start_dir = dir;
        let start_i = i;
        let area = self.areas[i];

        for _ in 0..40_000 {
            if flags[i] & (1 << dir) != 0 {
                // Choose the edge corner
                let (p_y, is_border_vertex) = self.get_corner_height(x, z, i, dir);
                let mut is_area_border = false;
                let (p_x, p_z) = match dir {
                    0 => (x, z + 1),
                    1 => (x + 1, z + 1),
                    2 => (x + 1, z),
                    _ => (x, z),
                };
                let mut r = RegionVertexId::NONE;
                if let Some(con) = self.spans[i].con(dir) {
                    let (_, _, a_i) = self.con_indices(x as i32, z as i32, dir, con);
                    r = RegionVertexId::from(self.spans[a_i].region);
                    if area != self.areas[a_i] {
                        is_area_border = true;
                    }
                }
                if is_border_vertex {
                    r |= RegionVertexId::BORDER_VERTEX;
                }
                if is_area_border {
                    r |= RegionVertexId::AREA_BORDER;
                }
                points.push((U16Vec3::new(p_x, p_y, p_z), r));

                // Remove visited edges
                flags[i] &= !(1 << dir);
                // Rotate clockwise
                dir = (dir + 1) & 0x3;
            } else {
                let Some(con) = self.spans[i].con(dir) else {
                    // Should not happen.
                    return;
                };
                let (n_x, n_z, n_i) = self.con_indices(x as i32, z as i32, dir, con);
                x = n_x as u16;
                z = n_z as u16;
                i = n_i;
                // Rotate counterclockwise
                dir = (dir + 3) & 0x3;
            }
            if start_i == i && start_dir == dir {
                break;
            }
        }
    }

    fn get_corner_height(&self, x: u16, z: u16, i: usize, dir: u8) -> (u16, bool) {
        let span = &self.spans[i];
        let mut ch = span.y;
        let dir_p = (dir + 1) & 0x3;

        // Combine region and area codes in order to prevent
        // border vertices which are in between two areas to be removed.
        let get_reg = |i: usize| self.spans[i].region.bits() as u32 | ((*self.areas[i] as u32) << 16);
        let mut regs = [0_u32; 4];
        regs[0] = get_reg(i);

        if let Some(con) = span.con(dir) {
            let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir, con);
            let a_span = &self.spans[a_i];
            ch = ch.max(a_span.y);
            regs[1] = get_reg(a_i);
            if let Some(con) = a_span.con(dir_p) {
                let (_, _, b_i) = self.con_indices(a_x, a_z, dir_p, con);
                ch = ch.max(self.spans[b_i].y);
                regs[2] = get_reg(b_i);
            }
        }
        if let Some(con) = span.con(dir_p) {
            let (a_x, a_z, a_i) = self.con_indices(x as i32, z as i32, dir_p, con);
            let a_span = &self.spans[a_i];
            ch = ch.max(a_span.y);
            regs[3] = get_reg(a_i);
            if let Some(con) = a_span.con(dir) {
                let (_, _, b_i) = self.con_indices(a_x, a_z, dir, con);
                ch = ch.max(self.spans[b_i].y);
                regs[2] = get_reg(b_i);
            }
        }

        // Check if the vertex is special edge vertex, these vertices will be removed later.
        let border = RegionId::BORDER_REGION.bits() as u32;
        let is_border_vertex = (0..4).any(|j| {
            let a = j;
            let b = (j + 1) & 0x3;
            let c = (j + 2) & 0x3;
            let d = (j + 3) & 0x3;

            // The vertex is a border vertex there are two same exterior cells in a row,
            // followed by two interior cells and none of the regions are out of bounds.
            let two_same_exts = (regs[a] & regs[b] & border) != 0 && regs[a] == regs[b];
            let two_ints = ((regs[c] | regs[d]) & border) == 0;
            let ints_same_area = (regs[c] >> 16) == (regs[d] >> 16);
            let no_zeros = regs.iter().all(|r| *r != 0);
            two_same_exts && two_ints && ints_same_area && no_zeros
        });
        (ch, is_border_vertex)
    }
}

fn simplify_contour(
    points: &[(U16Vec3, RegionVertexId)],
    simplified: &mut Vec<(U16Vec3, RegionVertexId)>,
    max_error: f32,
    max_edge_len: u16,
    flags: BuildContoursFlags,
) {
    let region_of = |data: RegionVertexId| data.bits() & RegionVertexId::REGION_MASK.bits();
    // Simplified vertices paired with the index of the raw vertex they originate from.
    let mut simple: Vec<(U16Vec3, usize)> = Vec::with_capacity(points.len());

    // Add initial points.
    let has_connections = points.iter().any(|(_, r)| region_of(*r) != 0);
    if has_connections {
        // The contour has some portals to other regions.
        // Add a new point to every location where the region changes.
        let n = points.len();
        for i in 0..n {
            let ii = (i + 1) % n;
            let different_regs = region_of(points[i].1) != region_of(points[ii].1);
            let area_borders = points[i].1.contains(RegionVertexId::AREA_BORDER)
                != points[ii].1.contains(RegionVertexId::AREA_BORDER);
            if different_regs || area_borders {
                simple.push((points[i].0, i));
            }
        }
    }

    if simple.is_empty() {
        // If there is no connections at all,
        // create some initial points for the simplification process.
        // Find lower-left and upper-right vertices of the contour.
        let mut lower_left = (points[0].0, 0);
        let mut upper_right = (points[0].0, 0);
        for (i, (point, _)) in points.iter().enumerate() {
            let (ll, ur) = (lower_left.0, upper_right.0);
            if point.x < ll.x || (point.x == ll.x && point.z < ll.z) {
                lower_left = (*point, i);
            }
            if point.x > ur.x || (point.x == ur.x && point.z > ur.z) {
                upper_right = (*point, i);
            }
        }
        simple.push(lower_left);
        simple.push(upper_right);
    }

    // Add points until all raw points are within
    // error tolerance to the simplified shape.
    let pn = points.len();
    let mut i = 0;
    while i < simple.len() {
        let ii = (i + 1) % simple.len();

        let (mut a, a_i) = simple[i];
        let (mut b, b_i) = simple[ii];

        // Find maximum deviation from the segment.
        let mut max_d = 0.0;
        let mut max_i = None;

        // Traverse the segment in lexilogical order so that the
        // max deviation is calculated similarly when traversing
        // opposite segments.
        let (mut ci, c_inc, end_i) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            ((a_i + 1) % pn, 1, b_i)
        } else {
            std::mem::swap(&mut a, &mut b);
            ((b_i + pn - 1) % pn, pn - 1, a_i)
        };

        // Tessellate only outer edges or edges between areas.
        let data = points[ci].1;
        if region_of(data) == 0 || data.contains(RegionVertexId::AREA_BORDER) {
            let segment = (Vec2::new(a.x as f32, a.z as f32), Vec2::new(b.x as f32, b.z as f32));
            while ci != end_i {
                let point = points[ci].0;
                let d = distance_squared_between_point_and_line_vec2(
                    Vec2::new(point.x as f32, point.z as f32),
                    segment,
                );
                if d > max_d {
                    max_d = d;
                    max_i = Some(ci);
                }
                ci = (ci + c_inc) % pn;
            }
        }

        // If the max deviation is larger than accepted error,
        // add new point, else continue to next segment.
        match max_i {
            Some(max_i) if max_d > max_error * max_error => {
                simple.insert(i + 1, (points[max_i].0, max_i));
            }
            _ => i += 1,
        }
    }

    // Split too long edges.
    let tessellate_walls = flags.contains(BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES);
    let tessellate_areas = flags.contains(BuildContoursFlags::TESSELLATE_AREA_EDGES);
    if max_edge_len > 0 && (tessellate_walls || tessellate_areas) {
        let max_edge_len = max_edge_len as i32;
        let mut i = 0;
        while i < simple.len() {
            let ii = (i + 1) % simple.len();

            let (a, a_i) = simple[i];
            let (b, b_i) = simple[ii];

            // Find maximum deviation from the segment.
            let mut max_i = None;
            let ci = (a_i + 1) % pn;

            // Tessellate only outer edges or edges between areas.
            let data = points[ci].1;
            let tessellate = (tessellate_walls && region_of(data) == 0)
                || (tessellate_areas && data.contains(RegionVertexId::AREA_BORDER));

            if tessellate {
                let dx = b.x as i32 - a.x as i32;
                let dz = b.z as i32 - a.z as i32;
                if dx * dx + dz * dz > max_edge_len * max_edge_len {
                    // Round based on the segments in lexilogical order so that the
                    // max tesselation is consistent regardless in which direction
                    // segments are traversed.
                    let n = if b_i < a_i {
                        b_i + pn - a_i
                    } else {
                        b_i - a_i
                    };
                    if n > 1 {
                        max_i = if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            Some((a_i + n / 2) % pn)
                        } else {
                            Some((a_i + (n + 1) / 2) % pn)
                        };
                    }
                }
            }

            // If the max deviation is larger than accepted error,
            // add new point, else continue to next segment.
            if let Some(max_i) = max_i {
                simple.insert(i + 1, (points[max_i].0, max_i));
            } else {
                i += 1;
            }
        }
    }

    simplified.extend(simple.into_iter().map(|(vertex, raw_index)| {
        // The edge vertex flag is take from the current raw point,
        // and the neighbour region is take from the next raw point.
        let a_i = (raw_index + 1) % pn;
        let b_i = raw_index;
        let data = (points[a_i].1 & (RegionVertexId::REGION_MASK | RegionVertexId::AREA_BORDER))
            | (points[b_i].1 & RegionVertexId::BORDER_VERTEX);
        (vertex, data)
    }));
}

/// Remove adjacent vertices which are equal on xz-plane,
/// or else the triangulator will get confused.
fn remove_degenerate_segments(simplified: &mut Vec<(U16Vec3, RegionVertexId)>) {
    let mut i = 0;
    while i < simplified.len() {
        let ni = next(i, simplified.len());
        if simplified.len() > 1 && vequal(simplified[i].0, simplified[ni].0) {
            // Degenerate segment, remove.
            simplified.remove(i);
        }
        i += 1;
    }
}

fn calc_area_of_polygon_2d(vertices: &[(U16Vec3, RegionVertexId)]) -> i32 {
    let n = vertices.len();
    let mut area = 0;
    for i in 0..n {
        let vi = vertices[i].0;
        let vj = vertices[prev(i, n)].0;
        area += vi.x as i32 * vj.z as i32 - vj.x as i32 * vi.z as i32;
    }
    (area + 1) / 2
}

fn intersect_seg_contour(
    d0: U16Vec3,
    d1: U16Vec3,
    i: Option<usize>,
    vertices: &[(U16Vec3, RegionVertexId)],
) -> bool {
    // For each edge (k,k+1) of P
    let n = vertices.len();
    for k in 0..n {
        let k1 = next(k, n);
        // Skip edges incident to i.
        if i == Some(k) || i == Some(k1) {
            continue;
        }
        let p0 = vertices[k].0;
        let p1 = vertices[k1].0;
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return true;
        }
    }
    false
}

fn in_cone(i: usize, vertices: &[(U16Vec3, RegionVertexId)], pj: U16Vec3) -> bool {
    let n = vertices.len();
    let pi = vertices[i].0;
    let pi1 = vertices[next(i, n)].0;
    let pin1 = vertices[prev(i, n)].0;

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Splices contour `b` into `a` at vertices `ia` and `ib`, leaving `b` empty.
fn merge_contours(a: &mut Contour, b: &mut Contour, ia: usize, ib: usize) {
    let mut vertices = Vec::with_capacity(a.vertices.len() + b.vertices.len() + 2);

    // Copy contour A.
    for i in 0..=a.vertices.len() {
        vertices.push(a.vertices[(ia + i) % a.vertices.len()]);
    }

    // Copy contour B
    for i in 0..=b.vertices.len() {
        vertices.push(b.vertices[(ib + i) % b.vertices.len()]);
    }

    a.vertices = vertices;
    b.vertices.clear();
}

#[derive(Debug, Clone, Default)]
struct ContourHole {
    contour: usize,
    min_x: u16,
    min_z: u16,
    leftmost: usize,
}

#[derive(Debug, Clone, Default)]
struct ContourRegion {
    outline: Option<usize>,
    holes: Vec<ContourHole>,
}

/// Finds the lowest leftmost vertex of a contour.
fn find_left_most_vertex(contour: &Contour) -> (u16, u16, usize) {
    let mut min_x = contour.vertices[0].0.x;
    let mut min_z = contour.vertices[0].0.z;
    let mut leftmost = 0;
    for (i, (vertex, _)) in contour.vertices.iter().enumerate().skip(1) {
        if vertex.x < min_x || (vertex.x == min_x && vertex.z < min_z) {
            min_x = vertex.x;
            min_z = vertex.z;
            leftmost = i;
        }
    }
    (min_x, min_z, leftmost)
}

fn merge_region_holes(region: &mut ContourRegion, contours: &mut [Contour]) {
    let Some(outline) = region.outline else {
        return;
    };
    // Sort holes from left to right.
    for hole in region.holes.iter_mut() {
        (hole.min_x, hole.min_z, hole.leftmost) = find_left_most_vertex(&contours[hole.contour]);
    }
    region
        .holes
        .sort_by(|a, b| a.min_x.cmp(&b.min_x).then(a.min_z.cmp(&b.min_z)));

    let mut diagonals: Vec<(usize, i32)> = Vec::new();

    // Merge holes into the outline one by one.
    for i in 0..region.holes.len() {
        let hole = region.holes[i].contour;

        let mut index = None;
        let mut best_vertex = region.holes[i].leftmost;
        for _ in 0..contours[hole].vertices.len() {
            // Find potential diagonals.
            // The 'best' vertex must be in the cone described by 3 cosequtive vertices of the outline.
            // ..o j-1
            //   |
            //   |   * best
            //   |
            // j o-----o j+1
            //         :
            diagonals.clear();
            let corner = contours[hole].vertices[best_vertex].0;
            let outline_vertices = &contours[outline].vertices;
            for j in 0..outline_vertices.len() {
                if in_cone(j, outline_vertices, corner) {
                    let dx = outline_vertices[j].0.x as i32 - corner.x as i32;
                    let dz = outline_vertices[j].0.z as i32 - corner.z as i32;
                    diagonals.push((j, dx * dx + dz * dz));
                }
            }
            // Sort potential diagonals by distance, we want to make the connection as short as possible.
            diagonals.sort_by_key(|(_, dist)| *dist);

            // Find a diagonal that is not intersecting the outline not the remaining holes.
            index = diagonals.iter().map(|(vert, _)| *vert).find(|&vert| {
                let pt = outline_vertices[vert].0;
                !intersect_seg_contour(pt, corner, Some(vert), outline_vertices)
                    && !region.holes[i..].iter().any(|other| {
                        intersect_seg_contour(pt, corner, None, &contours[other.contour].vertices)
                    })
            });

            // If found non-intersecting diagonal, stop looking.
            if index.is_some() {
                break;
            }
            // All the potential diagonals for the current vertex were intersecting, try next vertex.
            best_vertex = (best_vertex + 1) % contours[hole].vertices.len();
        }

        let Some(index) = index else {
            tracing::warn!(
                "merge_holes: Failed to find merge points for outline {outline} and hole {hole}."
            );
            continue;
        };
        let (outline_contour, hole_contour) = if outline < hole {
            let (left, right) = contours.split_at_mut(hole);
            (&mut left[outline], &mut right[0])
        } else {
            let (left, right) = contours.split_at_mut(outline);
            (&mut right[0], &mut left[hole])
        };
        merge_contours(outline_contour, hole_contour, index, best_vertex);
    }
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourSet {
    /// An array of the contours in the set.
    pub contours: Vec<Contour>,
    /// The AABB in world space
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The width of the set. (Along the x-axis in cell units.)
    pub width: u16,
    /// The height of the set. (Along the z-axis in cell units.)
    pub height: u16,
    /// The AABB border size used to generate the source data from which the contours were derived.
    pub border_size: u16,
    /// The max edge error that this contour set was simplified with.
    pub max_error: f32,
}

bitflags::bitflags! {
    /// The vertex data of a contour: the region on the other side of the edge plus some flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegionVertexId: u32 {
        /// No neighboring region.
        const NONE = 0;

        /// Applied to the region id field of contour vertices in order to extract the region id.
        /// The region id field of a vertex may have several flags applied to it.  So the
        /// fields value can't be used directly.
        const REGION_MASK = RegionId::MAX.bits() as u32;

        /// Border vertex flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// a tile border. If a contour vertex's region ID has this bit set, the
        /// vertex will later be removed in order to match the segments and vertices
        /// at tile boundaries.
        /// (Used during the build process.)
        const BORDER_VERTEX = 0x10_000;

        /// Area border flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// the border of an area.
        /// (Used during the region and contour build process.)
        const AREA_BORDER = 0x20_000;
    }
}

impl From<u32> for RegionVertexId {
    fn from(bits: u32) -> Self {
        RegionVertexId::from_bits_retain(bits)
    }
}

impl From<RegionId> for RegionVertexId {
    fn from(region_id: RegionId) -> Self {
        RegionVertexId::from_bits_retain(region_id.bits() as u32)
    }
}

impl From<RegionVertexId> for RegionId {
    fn from(region_vertex_id: RegionVertexId) -> Self {
        let bits = region_vertex_id.bits() & RegionVertexId::REGION_MASK.bits();
        RegionId::from_bits_retain(bits as u16)
    }
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Contour {
    /// Simplified contour vertex and connection data.
    pub vertices: Vec<(U16Vec3, RegionVertexId)>,
    /// Raw contour vertex and connection data.
    pub raw_vertices: Vec<(U16Vec3, RegionVertexId)>,
    /// Region ID of the contour.
    pub region: RegionId,
    /// Area type of the contour.
    pub area: AreaType,
}

bitflags::bitflags! {
    /// Contour build flags used in [`CompactHeightfield::build_contours`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct BuildContoursFlags: u8 {
        /// Tessellate solid (impassable) edges during contour simplification.
        const TESSELLATE_SOLID_WALL_EDGES = 1;
        /// Tessellate edges between areas during contour simplification.
        const TESSELLATE_AREA_EDGES = 2;

        /// Default flags for building contours.
        const DEFAULT = Self::TESSELLATE_SOLID_WALL_EDGES.bits();
    }
}

impl Default for BuildContoursFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::flat_compact_heightfield;

    fn square(size: u16) -> Vec<(U16Vec3, RegionVertexId)> {
        [(0, 0), (0, size), (size, size), (size, 0)]
            .into_iter()
            .map(|(x, z)| (U16Vec3::new(x, 0, z), RegionVertexId::NONE))
            .collect()
    }

    #[test]
    fn open_floor_yields_one_rectangle() {
        let mut chf = flat_compact_heightfield(8);
        chf.build_distance_field();
        chf.build_regions(0, 1, 20).unwrap();
        let cset = chf.build_contours(1.3, 12, BuildContoursFlags::DEFAULT);
        assert!(!cset.contours.is_empty());
        assert!(cset.contours.len() <= chf.max_region.bits() as usize);
        assert!(cset.contours.iter().all(|c| c.vertices.len() >= 3));
        assert!(
            cset.contours
                .iter()
                .all(|c| calc_area_of_polygon_2d(&c.vertices) > 0)
        );
        assert_eq!(cset.width, 8);
        assert_eq!(cset.height, 8);
    }

    #[test]
    fn border_offset_is_removed() {
        let mut chf = flat_compact_heightfield(10);
        chf.build_regions_monotone(2, 1, 20).unwrap();
        let cset = chf.build_contours(1.3, 0, BuildContoursFlags::DEFAULT);
        assert_eq!(cset.width, 6);
        assert_eq!(cset.border_size, 2);
        assert!(!cset.contours.is_empty());
        for contour in &cset.contours {
            for (vertex, _) in &contour.vertices {
                assert!(vertex.x <= 6 && vertex.z <= 6, "{vertex:?}");
            }
        }
        assert_eq!(cset.aabb.min.x, 2.0);
        assert_eq!(cset.aabb.max.x, 8.0);
    }

    #[test]
    fn polygon_area_sign_follows_winding() {
        let outline = square(4);
        assert_eq!(calc_area_of_polygon_2d(&outline), 16);
        let hole: Vec<_> = outline.iter().rev().copied().collect();
        assert!(calc_area_of_polygon_2d(&hole) < 0);
    }

    #[test]
    fn degenerate_segments_are_removed() {
        let mut vertices = square(3);
        vertices.insert(1, vertices[0]);
        remove_degenerate_segments(&mut vertices);
        assert_eq!(vertices, square(3));
    }

    #[test]
    fn simplification_keeps_corners_of_a_square() {
        // A raw 4x4 square outline, one vertex per cell edge.
        let mut raw = Vec::new();
        for z in 0..4 {
            raw.push((U16Vec3::new(0, 0, z), RegionVertexId::NONE));
        }
        for x in 0..4 {
            raw.push((U16Vec3::new(x, 0, 4), RegionVertexId::NONE));
        }
        for z in (1..=4).rev() {
            raw.push((U16Vec3::new(4, 0, z), RegionVertexId::NONE));
        }
        for x in (1..=4).rev() {
            raw.push((U16Vec3::new(x, 0, 0), RegionVertexId::NONE));
        }
        let mut simplified = Vec::new();
        simplify_contour(&raw, &mut simplified, 0.5, 0, BuildContoursFlags::DEFAULT);
        let mut corners: Vec<_> = simplified.iter().map(|(v, _)| (v.x, v.z)).collect();
        corners.sort();
        assert_eq!(corners, vec![(0, 0), (0, 4), (4, 0), (4, 4)]);
    }

    #[test]
    fn holes_are_merged_into_the_outline() {
        let outline = Contour {
            vertices: square(10),
            region: RegionId::from(1),
            ..Default::default()
        };
        let hole = Contour {
            vertices: [(4, 4), (6, 4), (6, 6), (4, 6)]
                .into_iter()
                .map(|(x, z)| (U16Vec3::new(x, 0, z), RegionVertexId::NONE))
                .collect(),
            region: RegionId::from(1),
            ..Default::default()
        };
        assert!(calc_area_of_polygon_2d(&hole.vertices) < 0);
        let mut contours = vec![outline, hole];
        let mut region = ContourRegion {
            outline: Some(0),
            holes: vec![ContourHole {
                contour: 1,
                ..Default::default()
            }],
        };
        merge_region_holes(&mut region, &mut contours);
        assert_eq!(contours[0].vertices.len(), 4 + 4 + 2);
        assert!(contours[1].vertices.is_empty());
    }
}
