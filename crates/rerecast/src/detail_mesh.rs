use std::collections::VecDeque;

use glam::{U16Vec3, Vec3A, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    CompactHeightfield, PolygonNavmesh, RegionId,
    math::{
        dir_offset, distance_squared_between_point_and_line_vec2,
        distance_squared_between_point_and_line_vec3, next, prev, vcross2,
    },
    poly_mesh::MULTIPLE_REGIONS,
};

const UNSET_HEIGHT: u16 = u16::MAX;
const MAX_VERTS: usize = 127;
/// Max tris for delaunay is 2n-2-k (n=num verts, k=num hull verts).
const MAX_TRIS: usize = 255;
const MAX_VERTS_PER_EDGE: usize = 32;

const EV_UNDEF: i32 = -1;
const EV_HULL: i32 = -2;

/// Contains triangle meshes that represent detailed height data associated
/// with the polygons in its associated polygon mesh object.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailNavmesh {
    /// The sub-mesh data, one entry per polygon of the polygon mesh.
    pub meshes: Vec<SubMesh>,
    /// The mesh vertices in world space.
    pub vertices: Vec<Vec3A>,
    /// The mesh triangles. The indices are relative to [`SubMesh::base_vertex_index`].
    pub triangles: Vec<[u8; 3]>,
    /// Per triangle edge flags. Bits `2 * n` mark edge `n` as lying on the polygon boundary.
    pub triangle_flags: Vec<u8>,
}

/// The part of a [`DetailNavmesh`] that belongs to a single polygon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMesh {
    /// Index of the first vertex in [`DetailNavmesh::vertices`].
    pub base_vertex_index: u32,
    /// Number of vertices.
    pub vertex_count: u32,
    /// Index of the first triangle in [`DetailNavmesh::triangles`].
    pub base_triangle_index: u32,
    /// Number of triangles.
    pub triangle_count: u32,
}

impl DetailNavmesh {
    /// Edge flag marking a detail triangle edge as part of the polygon boundary.
    pub const DETAIL_EDGE_BOUNDARY: u8 = 0x1;

    /// Builds a detail mesh from the provided polygon mesh.
    ///
    /// - `sample_distance`: Sets the distance to use when sampling the heightfield. [Limit: >=0] [Units: wu]
    /// - `sample_max_error`: The maximum distance the detail mesh surface should deviate from heightfield data. [Limit: >=0] [Units: wu]
    pub fn new(
        mesh: &PolygonNavmesh,
        heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> Result<Self, DetailNavmeshError> {
        let mut dmesh = DetailNavmesh::default();
        if mesh.vertices.is_empty() || mesh.polygon_count() == 0 {
            return Ok(dmesh);
        }

        let chf = heightfield;
        let cs = mesh.cell_size;
        let ch = mesh.cell_height;
        let orig = mesh.aabb.min;
        let border_size = mesh.border_size as i32;
        let height_search_radius = 1.max(mesh.max_edge_error.ceil() as i32);

        let mut edges = Vec::with_capacity(64);
        let mut tris = Vec::with_capacity(512);
        let mut queue = VecDeque::with_capacity(512);
        let mut samples = Vec::with_capacity(512);
        let mut verts = Vec::with_capacity(256);
        let mut hp = HeightPatch::default();
        let mut poly_vertex_count = 0;
        let mut max_hw = 0;
        let mut max_hh = 0;

        // Find max size for a polygon area.
        let bounds: Vec<PatchBounds> = (0..mesh.polygon_count())
            .map(|i| {
                let mut b = PatchBounds {
                    xmin: chf.width as i32,
                    xmax: 0,
                    zmin: chf.height as i32,
                    zmax: 0,
                };
                for index in mesh.polygon_vertices(i) {
                    let v = mesh.vertices[*index as usize];
                    b.xmin = b.xmin.min(v.x as i32);
                    b.xmax = b.xmax.max(v.x as i32);
                    b.zmin = b.zmin.min(v.z as i32);
                    b.zmax = b.zmax.max(v.z as i32);
                    poly_vertex_count += 1;
                }
                b.xmin = 0.max(b.xmin - 1);
                b.xmax = (chf.width as i32).min(b.xmax + 1);
                b.zmin = 0.max(b.zmin - 1);
                b.zmax = (chf.height as i32).min(b.zmax + 1);
                if b.xmin < b.xmax && b.zmin < b.zmax {
                    max_hw = max_hw.max(b.xmax - b.xmin);
                    max_hh = max_hh.max(b.zmax - b.zmin);
                }
                b
            })
            .collect();
        hp.data.reserve((max_hw * max_hh) as usize);

        let vertex_capacity = poly_vertex_count + poly_vertex_count / 2;
        dmesh.meshes.reserve(mesh.polygon_count());
        dmesh.vertices.reserve(vertex_capacity);
        dmesh.triangles.reserve(vertex_capacity * 2);
        dmesh.triangle_flags.reserve(vertex_capacity * 2);

        let mut poly = Vec::with_capacity(mesh.max_vertices_per_polygon as usize);
        for (i, b) in bounds.iter().enumerate() {
            let p = mesh.polygon_vertices(i);

            // Store polygon vertices for processing.
            poly.clear();
            poly.extend(p.iter().map(|index| {
                let v = mesh.vertices[*index as usize];
                Vec3A::new(v.x as f32 * cs, v.y as f32 * ch, v.z as f32 * cs)
            }));

            // Get the height data from the area of the polygon.
            hp.xmin = b.xmin;
            hp.zmin = b.zmin;
            hp.width = b.xmax - b.xmin;
            hp.height = b.zmax - b.zmin;
            if !hp.sample_heights(
                chf,
                p,
                &mesh.vertices,
                border_size,
                &mut queue,
                mesh.regions[i],
            ) {
                return Err(DetailNavmeshError::NoSeedSpan { polygon: i });
            }

            // Build detail mesh.
            build_poly_detail(
                &poly,
                sample_distance,
                sample_max_error,
                height_search_radius,
                chf,
                &hp,
                &mut verts,
                &mut tris,
                &mut edges,
                &mut samples,
            );

            // Move detail verts to world space.
            let offset = orig + Vec3A::new(0.0, chf.cell_height, 0.0);
            dmesh.meshes.push(SubMesh {
                base_vertex_index: dmesh.vertices.len() as u32,
                vertex_count: verts.len() as u32,
                base_triangle_index: dmesh.triangles.len() as u32,
                triangle_count: tris.len() as u32,
            });
            dmesh.vertices.extend(verts.iter().map(|v| *v + offset));
            for t in &tris {
                dmesh
                    .triangles
                    .push([t[0] as u8, t[1] as u8, t[2] as u8]);
                dmesh.triangle_flags.push(t[3] as u8);
            }
        }

        Ok(dmesh)
    }

    /// The vertices of the sub-mesh at `index`.
    pub fn submesh_vertices(&self, index: usize) -> &[Vec3A] {
        let mesh = &self.meshes[index];
        let start = mesh.base_vertex_index as usize;
        &self.vertices[start..start + mesh.vertex_count as usize]
    }

    /// The triangles of the sub-mesh at `index`.
    pub fn submesh_triangles(&self, index: usize) -> &[[u8; 3]] {
        let mesh = &self.meshes[index];
        let start = mesh.base_triangle_index as usize;
        &self.triangles[start..start + mesh.triangle_count as usize]
    }
}

#[derive(Debug, Clone, Copy)]
struct PatchBounds {
    xmin: i32,
    xmax: i32,
    zmin: i32,
    zmax: i32,
}

/// Height samples of the heightfield under a single polygon, in cell coordinates without the border.
#[derive(Debug, Default)]
struct HeightPatch {
    data: Vec<u16>,
    xmin: i32,
    zmin: i32,
    width: i32,
    height: i32,
}

impl HeightPatch {
    fn reset(&mut self, value: u16) {
        self.data.clear();
        self.data
            .resize((self.width.max(0) * self.height.max(0)) as usize, value);
    }

    #[inline]
    fn contains(&self, hx: i32, hz: i32) -> bool {
        hx >= 0 && hz >= 0 && hx < self.width && hz < self.height
    }

    #[inline]
    fn index(&self, hx: i32, hz: i32) -> usize {
        (hx + hz * self.width) as usize
    }

    /// Fills the patch with the span heights under the polygon.
    ///
    /// Reads to the compact heightfield are offset by `border_size`
    /// since the border is already removed from the polygon mesh vertices.
    /// Returns `false` if no span could be found to start sampling from.
    fn sample_heights(
        &mut self,
        chf: &CompactHeightfield,
        polygon: &[u16],
        vertices: &[U16Vec3],
        border_size: i32,
        queue: &mut VecDeque<(i32, i32, usize)>,
        region: RegionId,
    ) -> bool {
        queue.clear();
        self.reset(UNSET_HEIGHT);

        let mut empty = true;

        // We cannot sample from this poly if it was created from polys
        // of different regions. If it was then it could potentially be overlapping
        // with polys of that region and the heights sampled here could be wrong.
        if region != MULTIPLE_REGIONS {
            // Copy the height from the same region, and mark region borders
            // as seed points to fill the rest.
            for hz in 0..self.height {
                let z = self.zmin + hz + border_size;
                for hx in 0..self.width {
                    let x = self.xmin + hx + border_size;
                    let cell = chf.cell_at(x as u16, z as u16);
                    for i in cell.index_range() {
                        let span = &chf.spans[i];
                        if span.region != region {
                            continue;
                        }
                        // Store height
                        let index = self.index(hx, hz);
                        self.data[index] = span.y;
                        empty = false;

                        // If any of the neighbours is not in same region,
                        // add the current location as flood fill start
                        let border = (0..4).any(|dir| {
                            span.con(dir).is_some_and(|con| {
                                let (_, _, a_i) = chf.con_indices(x, z, dir, con);
                                chf.spans[a_i].region != region
                            })
                        });
                        if border {
                            queue.push_back((x, z, i));
                        }
                        break;
                    }
                }
            }
        }

        // if the polygon does not contain any points from the current region (rare, but happens)
        // or if it could potentially be overlapping polygons of the same region,
        // then use the center as the seed point.
        if empty && !self.seed_with_poly_center(chf, polygon, vertices, border_size, queue) {
            return false;
        }

        // We assume the seed is centered in the polygon, so a BFS to collect
        // height data will ensure we do not move onto overlapping polygons and
        // sample wrong heights.
        while let Some((cx, cz, ci)) = queue.pop_front() {
            let span = &chf.spans[ci];
            for dir in 0..4 {
                let Some(con) = span.con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = chf.con_indices(cx, cz, dir, con);
                let hx = a_x - self.xmin - border_size;
                let hz = a_z - self.zmin - border_size;
                if !self.contains(hx, hz) {
                    continue;
                }
                let index = self.index(hx, hz);
                if self.data[index] != UNSET_HEIGHT {
                    continue;
                }
                self.data[index] = chf.spans[a_i].y;
                queue.push_back((a_x, a_z, a_i));
            }
        }
        true
    }

    fn seed_with_poly_center(
        &mut self,
        chf: &CompactHeightfield,
        polygon: &[u16],
        vertices: &[U16Vec3],
        border_size: i32,
        queue: &mut VecDeque<(i32, i32, usize)>,
    ) -> bool {
        const OFFSET: [(i32, i32); 9] = [
            (0, 0),
            (-1, -1),
            (0, -1),
            (1, -1),
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
        ];
        let bs = border_size;

        // Find cell closest to a poly vertex
        let mut start = None;
        let mut dmin = UNSET_HEIGHT as i32;
        'search: for index in polygon {
            let v = vertices[*index as usize];
            for (ox, oz) in OFFSET {
                let ax = v.x as i32 + ox;
                let ay = v.y as i32;
                let az = v.z as i32 + oz;
                if ax < self.xmin
                    || ax >= self.xmin + self.width
                    || az < self.zmin
                    || az >= self.zmin + self.height
                {
                    continue;
                }
                let cell = chf.cell_at((ax + bs) as u16, (az + bs) as u16);
                for i in cell.index_range() {
                    let d = (ay - chf.spans[i].y as i32).abs();
                    if d < dmin {
                        start = Some((ax, az, i));
                        dmin = d;
                    }
                    if dmin == 0 {
                        break 'search;
                    }
                }
            }
        }
        let Some(start) = start else {
            return false;
        };

        // Find center of the polygon
        let (sum_x, sum_z) = polygon.iter().fold((0, 0), |(x, z), index| {
            let v = vertices[*index as usize];
            (x + v.x as i32, z + v.z as i32)
        });
        let pcx = sum_x / polygon.len() as i32;
        let pcz = sum_z / polygon.len() as i32;

        // DFS to move to the center. Note that we need a DFS here and can not just move
        // directly towards the center without recording intermediate nodes, even though the polygons
        // are convex. In very rare we can get stuck due to contour simplification if we do not
        // record nodes.
        let mut stack = vec![start];
        let mut dirs = [0, 1, 2, 3];
        self.reset(0);
        let mut current = start;
        loop {
            let Some(top) = stack.pop() else {
                tracing::warn!("Walk towards polygon center failed to reach center");
                break;
            };
            current = top;
            let (cx, cz, ci) = current;
            if cx == pcx && cz == pcz {
                break;
            }

            // If we are already at the correct X-position, prefer direction
            // directly towards the center in the Z-axis; otherwise prefer
            // direction in the X-axis
            let direct_dir = if cx == pcx {
                dir_offset(0, if pcz > cz { 1 } else { -1 })
            } else {
                dir_offset(if pcx > cx { 1 } else { -1 }, 0)
            };
            let direct_dir = direct_dir as usize;

            // Push the direct dir last so we start with this on next iteration
            dirs.swap(direct_dir, 3);

            let span = &chf.spans[ci];
            for dir in dirs {
                let Some(con) = span.con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = chf.con_indices(cx + bs, cz + bs, dir, con);
                let new_x = a_x - bs;
                let new_z = a_z - bs;
                let hx = new_x - self.xmin;
                let hz = new_z - self.zmin;
                if !self.contains(hx, hz) {
                    continue;
                }
                let index = self.index(hx, hz);
                if self.data[index] != 0 {
                    continue;
                }
                self.data[index] = 1;
                stack.push((new_x, new_z, a_i));
            }

            dirs.swap(direct_dir, 3);
        }

        let (cx, cz, ci) = current;
        queue.clear();
        // The flood fill runs in coordinates with borders
        queue.push_back((cx + bs, cz + bs, ci));
        self.reset(UNSET_HEIGHT);
        let index = self.index(cx - self.xmin, cz - self.zmin);
        self.data[index] = chf.spans[ci].y;
        true
    }

    fn get_height(
        &self,
        pos: Vec3A,
        inverse_cell_size: f32,
        cell_height: f32,
        radius: i32,
    ) -> u16 {
        if self.data.is_empty() {
            return UNSET_HEIGHT;
        }
        let ix = ((pos.x * inverse_cell_size + 0.01).floor() as i32 - self.xmin)
            .clamp(0, self.width - 1);
        let iz = ((pos.z * inverse_cell_size + 0.01).floor() as i32 - self.zmin)
            .clamp(0, self.height - 1);
        let mut h = self.data[self.index(ix, iz)];
        if h != UNSET_HEIGHT {
            return h;
        }

        // Special case when data might be bad.
        // Walk adjacent cells in a spiral up to 'radius', and look
        // for a pixel which has a valid height.
        let (mut x, mut z, mut dx, mut dz) = (1, 0, 1, 0);
        let max_size = radius * 2 + 1;
        let max_iter = max_size * max_size - 1;

        let mut next_ring_iter_start = 8;
        let mut next_ring_iters = 16;

        let mut dmin = f32::MAX;
        for i in 0..max_iter {
            let nx = ix + x;
            let nz = iz + z;

            if self.contains(nx, nz) {
                let nh = self.data[self.index(nx, nz)];
                if nh != UNSET_HEIGHT {
                    let d = (nh as f32 * cell_height - pos.y).abs();
                    if d < dmin {
                        h = nh;
                        dmin = d;
                    }
                }
            }

            // The search covers rings of cells around the center, each ring 8 cells
            // larger than the previous one. Stop at the end of the first ring that
            // contains a valid height, picking the best height of that ring.
            if i + 1 == next_ring_iter_start {
                if h != UNSET_HEIGHT {
                    break;
                }
                next_ring_iter_start += next_ring_iters;
                next_ring_iters += 8;
            }

            if x == z || (x < 0 && x == -z) || (x > 0 && x == 1 - z) {
                let tmp = dx;
                dx = -dz;
                dz = tmp;
            }
            x += dx;
            z += dz;
        }
        h
    }
}

#[allow(clippy::too_many_arguments)]
fn build_poly_detail(
    input: &[Vec3A],
    sample_distance: f32,
    sample_max_error: f32,
    height_search_radius: i32,
    chf: &CompactHeightfield,
    hp: &HeightPatch,
    verts: &mut Vec<Vec3A>,
    tris: &mut Vec<[i32; 4]>,
    edges: &mut Vec<[i32; 4]>,
    samples: &mut Vec<[i32; 4]>,
) {
    let nin = input.len();
    let mut hull: Vec<usize> = Vec::with_capacity(MAX_VERTS);

    verts.clear();
    verts.extend_from_slice(input);
    edges.clear();
    tris.clear();

    let cs = chf.cell_size;
    let ics = 1.0 / cs;
    let ch = chf.cell_height;

    // Calculate minimum extents of the polygon based on input data.
    let min_extent = poly_min_extent(verts);

    // Tessellate outlines.
    // This is done in separate pass in order to ensure
    // seamless height values across the ply boundaries.
    if sample_distance > 0.0 {
        let mut edge = [Vec3A::ZERO; MAX_VERTS_PER_EDGE + 1];
        let mut j = nin - 1;
        for i in 0..nin {
            let mut vj = input[j];
            let mut vi = input[i];
            let mut swapped = false;
            // Make sure the segments are always handled in same order
            // using lexological sort or else there will be seams.
            if (vj.x - vi.x).abs() < 1e-6 {
                if vj.z > vi.z {
                    std::mem::swap(&mut vj, &mut vi);
                    swapped = true;
                }
            } else if vj.x > vi.x {
                std::mem::swap(&mut vj, &mut vi);
                swapped = true;
            }

            // Create samples along the edge.
            let delta = vi - vj;
            let d = delta.xz().length();
            let mut nn = 1 + (d / sample_distance).floor() as usize;
            if nn >= MAX_VERTS_PER_EDGE {
                nn = MAX_VERTS_PER_EDGE - 1;
            }
            if verts.len() + nn >= MAX_VERTS {
                nn = (MAX_VERTS - 1).saturating_sub(verts.len()).max(1);
            }

            for (k, pos) in edge.iter_mut().enumerate().take(nn + 1) {
                let u = k as f32 / nn as f32;
                *pos = vj + delta * u;
                pos.y = hp.get_height(*pos, ics, ch, height_search_radius) as f32 * ch;
            }

            // Simplify samples.
            let mut idx = vec![0, nn];
            let mut k = 0;
            while k + 1 < idx.len() {
                let a = idx[k];
                let b = idx[k + 1];
                let va = edge[a];
                let vb = edge[b];
                // Find maximum deviation along the segment.
                let mut maxd = 0.0;
                let mut maxi = None;
                for (m, point) in edge.iter().enumerate().take(b).skip(a + 1) {
                    let dev = distance_squared_between_point_and_line_vec3(*point, (va, vb));
                    if dev > maxd {
                        maxd = dev;
                        maxi = Some(m);
                    }
                }
                // If the max deviation is larger than accepted error,
                // add new point, else continue to next segment.
                match maxi {
                    Some(m) if maxd > sample_max_error * sample_max_error => idx.insert(k + 1, m),
                    _ => k += 1,
                }
            }

            hull.push(j);
            // Add new vertices.
            let interior = &idx[1..idx.len() - 1];
            let mut add = |k: &usize| {
                hull.push(verts.len());
                verts.push(edge[*k]);
            };
            if swapped {
                interior.iter().rev().for_each(&mut add);
            } else {
                interior.iter().for_each(&mut add);
            }
            j = i;
        }
    } else {
        hull.extend(0..nin);
    }

    // If the polygon minimum extent is small (sliver or small triangle), do not try to add internal points.
    if min_extent < sample_distance * 2.0 {
        triangulate_hull(verts, &hull, nin, tris);
        set_tri_flags(tris, &hull);
        return;
    }

    // Tessellate the base mesh.
    // We're using the triangulate_hull instead of delaunay_hull as it tends to
    // create a bit better triangulation for long thin triangles when there
    // are no internal points.
    triangulate_hull(verts, &hull, nin, tris);

    if tris.is_empty() {
        // Could not triangulate the poly, make sure there is some valid data there.
        tracing::warn!(
            "build_poly_detail: Could not triangulate polygon ({} verts).",
            verts.len()
        );
        return;
    }

    if sample_distance > 0.0 {
        // Create sample locations in a grid.
        let (bmin, bmax) = input[1..]
            .iter()
            .fold((input[0], input[0]), |(min, max), v| (min.min(*v), max.max(*v)));
        let x0 = (bmin.x / sample_distance).floor() as i32;
        let x1 = (bmax.x / sample_distance).ceil() as i32;
        let z0 = (bmin.z / sample_distance).floor() as i32;
        let z1 = (bmax.z / sample_distance).ceil() as i32;
        samples.clear();
        for z in z0..z1 {
            for x in x0..x1 {
                let pt = Vec3A::new(
                    x as f32 * sample_distance,
                    (bmax.y + bmin.y) * 0.5,
                    z as f32 * sample_distance,
                );
                // Make sure the samples are not too close to the edges.
                if dist_to_poly(input, pt) > -sample_distance / 2.0 {
                    continue;
                }
                let y = hp.get_height(pt, ics, ch, height_search_radius);
                // The last entry marks whether the sample was added.
                samples.push([x, y as i32, z, 0]);
            }
        }

        // Add the samples starting from the one that has the most
        // error. The procedure stops when all samples are added
        // or when the max error is within treshold.
        for _ in 0..samples.len() {
            if verts.len() >= MAX_VERTS {
                break;
            }

            // Find sample with most error.
            let mut best_pt = Vec3A::ZERO;
            let mut best_d = 0.0;
            let mut best_i = None;
            for (i, s) in samples.iter().enumerate() {
                if s[3] != 0 {
                    continue;
                }
                // The sample location is jittered to get rid of some bad triangulations
                // which are cause by symmetrical data from the grid structure.
                let pt = Vec3A::new(
                    s[0] as f32 * sample_distance + jitter_x(i) * cs * 0.1,
                    s[1] as f32 * ch,
                    s[2] as f32 * sample_distance + jitter_z(i) * cs * 0.1,
                );
                // Samples that miss the mesh are skipped.
                let Some(d) = dist_to_tri_mesh(pt, verts, tris) else {
                    continue;
                };
                if d > best_d {
                    best_d = d;
                    best_i = Some(i);
                    best_pt = pt;
                }
            }
            // If the max error is within accepted threshold, stop tesselating.
            let Some(best_i) = best_i else {
                break;
            };
            if best_d <= sample_max_error {
                break;
            }
            // Mark sample as added.
            samples[best_i][3] = 1;
            // Add the new sample point.
            verts.push(best_pt);

            // Create new triangulation.
            delaunay_hull(verts, &hull, tris, edges);
        }
    }

    if tris.len() > MAX_TRIS {
        tracing::error!(
            "DetailNavmesh::new: Shrinking triangle count from {} to max {MAX_TRIS}.",
            tris.len()
        );
        tris.truncate(MAX_TRIS);
    }
    set_tri_flags(tris, &hull);
}

#[inline]
fn jitter_x(i: usize) -> f32 {
    ((i as u32).wrapping_mul(0x8da6b343) & 0xffff) as f32 / 65535.0 * 2.0 - 1.0
}

#[inline]
fn jitter_z(i: usize) -> f32 {
    ((i as u32).wrapping_mul(0xd8163841) & 0xffff) as f32 / 65535.0 * 2.0 - 1.0
}

#[inline]
fn vdist2(a: Vec3A, b: Vec3A) -> f32 {
    a.xz().distance(b.xz())
}

#[inline]
fn distance_squared_2d(pt: Vec3A, p: Vec3A, q: Vec3A) -> f32 {
    distance_squared_between_point_and_line_vec2(pt.xz(), (p.xz(), q.xz()))
}

/// Calculate minimum extend of the polygon.
fn poly_min_extent(verts: &[Vec3A]) -> f32 {
    let n = verts.len();
    let mut min_dist = f32::MAX;
    for i in 0..n {
        let ni = (i + 1) % n;
        let p1 = verts[i];
        let p2 = verts[ni];
        let max_edge_dist = verts
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i && *j != ni)
            .map(|(_, v)| distance_squared_2d(*v, p1, p2))
            .fold(0.0_f32, f32::max);
        min_dist = min_dist.min(max_edge_dist);
    }
    min_dist.sqrt()
}

/// Signed squared distance from `p` to the polygon outline, negative inside the polygon.
fn dist_to_poly(verts: &[Vec3A], p: Vec3A) -> f32 {
    let mut dmin = f32::MAX;
    let mut inside = false;
    let mut j = verts.len() - 1;
    for i in 0..verts.len() {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > p.z) != (vj.z > p.z))
            && (p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        dmin = dmin.min(distance_squared_2d(p, vj, vi));
        j = i;
    }
    if inside { -dmin } else { dmin }
}

/// Vertical distance from `p` to the triangle, if `p` lies above or below it.
fn dist_pt_tri(p: Vec3A, a: Vec3A, b: Vec3A, c: Vec3A) -> Option<f32> {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    let dot00 = v0.xz().dot(v0.xz());
    let dot01 = v0.xz().dot(v1.xz());
    let dot02 = v0.xz().dot(v2.xz());
    let dot11 = v1.xz().dot(v1.xz());
    let dot12 = v1.xz().dot(v2.xz());

    // Compute barycentric coordinates
    let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

    // If point lies inside the triangle, return interpolated y-coord.
    const EPS: f32 = 1e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a.y + v0.y * u + v1.y * v;
        return Some((y - p.y).abs());
    }
    None
}

fn dist_to_tri_mesh(p: Vec3A, verts: &[Vec3A], tris: &[[i32; 4]]) -> Option<f32> {
    tris.iter()
        .filter_map(|t| {
            dist_pt_tri(
                p,
                verts[t[0] as usize],
                verts[t[1] as usize],
                verts[t[2] as usize],
            )
        })
        .reduce(f32::min)
}

fn circum_circle(p1: Vec3A, p2: Vec3A, p3: Vec3A) -> (Vec3A, f32) {
    const EPS: f32 = 1e-6;
    // Calculate the circle relative to p1, to avoid some precision issues.
    let v1 = Vec3A::ZERO;
    let v2 = p2 - p1;
    let v3 = p3 - p1;

    let cp = vcross2(v1, v2, v3);
    if cp.abs() <= EPS {
        return (p1, 0.0);
    }
    let v1_sq = v1.xz().length_squared();
    let v2_sq = v2.xz().length_squared();
    let v3_sq = v3.xz().length_squared();
    let c = Vec3A::new(
        (v1_sq * (v2.z - v3.z) + v2_sq * (v3.z - v1.z) + v3_sq * (v1.z - v2.z)) / (2.0 * cp),
        0.0,
        (v1_sq * (v3.x - v2.x) + v2_sq * (v1.x - v3.x) + v3_sq * (v2.x - v1.x)) / (2.0 * cp),
    );
    let r = vdist2(c, v1);
    (c + p1, r)
}

fn find_edge(edges: &[[i32; 4]], s: i32, t: i32) -> Option<usize> {
    edges
        .iter()
        .position(|e| (e[0] == s && e[1] == t) || (e[0] == t && e[1] == s))
}

fn add_edge(edges: &mut Vec<[i32; 4]>, max_edges: usize, s: i32, t: i32, l: i32, r: i32) {
    if edges.len() >= max_edges {
        tracing::error!("add_edge: Too many edges ({}/{max_edges}).", edges.len());
        return;
    }
    // Add edge if not already in the triangulation.
    if find_edge(edges, s, t).is_none() {
        edges.push([s, t, l, r]);
    }
}

fn update_left_face(e: &mut [i32; 4], s: i32, t: i32, f: i32) {
    if e[0] == s && e[1] == t && e[2] == EV_UNDEF {
        e[2] = f;
    } else if e[1] == s && e[0] == t && e[3] == EV_UNDEF {
        e[3] = f;
    }
}

fn overlap_seg_seg_2d(a: Vec3A, b: Vec3A, c: Vec3A, d: Vec3A) -> bool {
    let a1 = vcross2(a, b, d);
    let a2 = vcross2(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = vcross2(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}

fn overlap_edges(pts: &[Vec3A], edges: &[[i32; 4]], s1: i32, t1: i32) -> bool {
    edges.iter().any(|e| {
        let (s0, t0) = (e[0], e[1]);
        // Same or connected edges do not overlap.
        if s0 == s1 || s0 == t1 || t0 == s1 || t0 == t1 {
            return false;
        }
        overlap_seg_seg_2d(
            pts[s0 as usize],
            pts[t0 as usize],
            pts[s1 as usize],
            pts[t1 as usize],
        )
    })
}

fn complete_facet(
    pts: &[Vec3A],
    edges: &mut Vec<[i32; 4]>,
    max_edges: usize,
    face_count: &mut i32,
    e: usize,
) {
    const EPS: f32 = 1e-5;
    const TOLERANCE: f32 = 0.001;

    let edge = edges[e];

    // Cache s and t.
    let (s, t) = if edge[2] == EV_UNDEF {
        (edge[0], edge[1])
    } else if edge[3] == EV_UNDEF {
        (edge[1], edge[0])
    } else {
        // Edge already completed.
        return;
    };
    let ps = pts[s as usize];
    let pt_t = pts[t as usize];

    // Find best point on left of edge.
    let mut best = None;
    let mut c = Vec3A::ZERO;
    let mut r = -1.0;
    for (u, pu) in pts.iter().enumerate() {
        let u_i = u as i32;
        if u_i == s || u_i == t {
            continue;
        }
        if vcross2(ps, pt_t, *pu) <= EPS {
            continue;
        }
        if r < 0.0 {
            // The circle is not updated yet, do it now.
            best = Some(u_i);
            (c, r) = circum_circle(ps, pt_t, *pu);
            continue;
        }
        let d = vdist2(c, *pu);
        if d > r * (1.0 + TOLERANCE) {
            // Outside current circumcircle, skip.
            continue;
        } else if d >= r * (1.0 - TOLERANCE) {
            // Inside epsilon circum circle, do extra tests to make sure the edge is valid.
            // s-u and t-u cannot overlap with s-pt nor t-pt if they exists.
            if overlap_edges(pts, edges, s, u_i) || overlap_edges(pts, edges, t, u_i) {
                continue;
            }
        }
        // Edge is valid.
        best = Some(u_i);
        (c, r) = circum_circle(ps, pt_t, *pu);
    }

    // Add new triangle or update edge info if s-t is on hull.
    let Some(pt) = best else {
        update_left_face(&mut edges[e], s, t, EV_HULL);
        return;
    };
    // Update face information of edge being completed.
    update_left_face(&mut edges[e], s, t, *face_count);

    // Add new edge or update face info of old edge.
    match find_edge(edges, pt, s) {
        None => add_edge(edges, max_edges, pt, s, *face_count, EV_UNDEF),
        Some(e) => update_left_face(&mut edges[e], pt, s, *face_count),
    }

    // Add new edge or update face info of old edge.
    match find_edge(edges, t, pt) {
        None => add_edge(edges, max_edges, t, pt, *face_count, EV_UNDEF),
        Some(e) => update_left_face(&mut edges[e], t, pt, *face_count),
    }

    *face_count += 1;
}

fn delaunay_hull(
    pts: &[Vec3A],
    hull: &[usize],
    tris: &mut Vec<[i32; 4]>,
    edges: &mut Vec<[i32; 4]>,
) {
    let mut face_count = 0;
    let max_edges = pts.len() * 10;
    edges.clear();

    let mut j = hull.len() - 1;
    for i in 0..hull.len() {
        add_edge(edges, max_edges, hull[j] as i32, hull[i] as i32, EV_HULL, EV_UNDEF);
        j = i;
    }

    let mut current_edge = 0;
    while current_edge < edges.len() {
        if edges[current_edge][2] == EV_UNDEF {
            complete_facet(pts, edges, max_edges, &mut face_count, current_edge);
        }
        if edges[current_edge][3] == EV_UNDEF {
            complete_facet(pts, edges, max_edges, &mut face_count, current_edge);
        }
        current_edge += 1;
    }

    // Create tris
    tris.clear();
    tris.resize(face_count as usize, [-1; 4]);
    for e in edges.iter() {
        if e[3] >= 0 {
            // Left face
            let t = &mut tris[e[3] as usize];
            if t[0] == -1 {
                t[0] = e[0];
                t[1] = e[1];
            } else if t[0] == e[1] {
                t[2] = e[0];
            } else if t[1] == e[0] {
                t[2] = e[1];
            }
        }
        if e[2] >= 0 {
            // Right
            let t = &mut tris[e[2] as usize];
            if t[0] == -1 {
                t[0] = e[1];
                t[1] = e[0];
            } else if t[0] == e[0] {
                t[2] = e[1];
            } else if t[1] == e[1] {
                t[2] = e[0];
            }
        }
    }

    let mut i = 0;
    while i < tris.len() {
        let t = tris[i];
        if t[0] == -1 || t[1] == -1 || t[2] == -1 {
            tracing::warn!(
                "delaunay_hull: Removing dangling face {i} [{},{},{}].",
                t[0],
                t[1],
                t[2]
            );
            tris.swap_remove(i);
        } else {
            i += 1;
        }
    }
}

fn triangulate_hull(verts: &[Vec3A], hull: &[usize], nin: usize, tris: &mut Vec<[i32; 4]>) {
    let nhull = hull.len();
    let mut start = 0;
    let mut left = 1;
    let mut right = nhull - 1;

    // Start from an ear with shortest perimeter.
    // This tends to favor well formed triangles as starting point.
    let mut dmin = f32::MAX;
    for i in 0..nhull {
        // Ears are triangles with original vertices as middle vertex while others are actually line segments on edges
        if hull[i] >= nin {
            continue;
        }
        let pi = prev(i, nhull);
        let ni = next(i, nhull);
        let pv = verts[hull[pi]];
        let cv = verts[hull[i]];
        let nv = verts[hull[ni]];
        let d = vdist2(pv, cv) + vdist2(cv, nv) + vdist2(nv, pv);
        if d < dmin {
            start = i;
            left = ni;
            right = pi;
            dmin = d;
        }
    }

    // Add first triangle
    tris.push([hull[start] as i32, hull[left] as i32, hull[right] as i32, 0]);

    // Triangulate the polygon by moving left or right,
    // depending on which triangle has shorter perimeter.
    // This heuristic was chose empirically, since it seems
    // handle tessellated straight edges well.
    while next(left, nhull) != right {
        // Check to see if se should advance left or right.
        let nleft = next(left, nhull);
        let nright = prev(right, nhull);

        let cvleft = verts[hull[left]];
        let nvleft = verts[hull[nleft]];
        let cvright = verts[hull[right]];
        let nvright = verts[hull[nright]];
        let dleft = vdist2(cvleft, nvleft) + vdist2(nvleft, cvright);
        let dright = vdist2(cvright, nvright) + vdist2(cvleft, nvright);

        if dleft < dright {
            tris.push([hull[left] as i32, hull[nleft] as i32, hull[right] as i32, 0]);
            left = nleft;
        } else {
            tris.push([hull[left] as i32, hull[nright] as i32, hull[right] as i32, 0]);
            right = nright;
        }
    }
}

fn on_hull(a: i32, b: i32, hull: &[usize]) -> bool {
    // All internal sampled points come after the hull so we can early out for those.
    if a as usize >= hull.len() || b as usize >= hull.len() {
        return false;
    }
    let mut j = hull.len() - 1;
    for i in 0..hull.len() {
        if a as usize == hull[j] && b as usize == hull[i] {
            return true;
        }
        j = i;
    }
    false
}

fn set_tri_flags(tris: &mut [[i32; 4]], hull: &[usize]) {
    let boundary = DetailNavmesh::DETAIL_EDGE_BOUNDARY as i32;
    for t in tris.iter_mut() {
        let (a, b, c) = (t[0], t[1], t[2]);
        let mut flags = 0;
        if on_hull(a, b, hull) {
            flags |= boundary;
        }
        if on_hull(b, c, hull) {
            flags |= boundary << 2;
        }
        if on_hull(c, a, hull) {
            flags |= boundary << 4;
        }
        t[3] = flags;
    }
}

/// Errors that can occur when building a [`DetailNavmesh`].
#[derive(Error, Debug)]
pub enum DetailNavmeshError {
    /// No heightfield span was found near the polygon to sample heights from.
    #[error("Could not find a heightfield span to sample heights of polygon {polygon}")]
    NoSeedSpan {
        /// The index of the polygon.
        polygon: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildContoursFlags, test_utils::flat_compact_heightfield};

    fn square(size: f32) -> Vec<Vec3A> {
        vec![
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, size),
            Vec3A::new(size, 0.0, size),
            Vec3A::new(size, 0.0, 0.0),
        ]
    }

    #[test]
    fn hull_triangulation_covers_polygon() {
        let verts = square(4.0);
        let hull = [0, 1, 2, 3];
        let mut tris = Vec::new();
        triangulate_hull(&verts, &hull, 4, &mut tris);
        assert_eq!(tris.len(), 2);
        set_tri_flags(&mut tris, &hull);
        // Every triangle of a quad has two boundary edges.
        for t in &tris {
            assert_eq!((t[3] & 0b010101).count_ones(), 2);
        }
    }

    #[test]
    fn delaunay_adds_interior_point() {
        let mut verts = square(4.0);
        verts.push(Vec3A::new(2.0, 1.0, 2.0));
        let hull = [0, 1, 2, 3];
        let mut tris = Vec::new();
        let mut edges = Vec::new();
        delaunay_hull(&verts, &hull, &mut tris, &mut edges);
        assert_eq!(tris.len(), 4);
        assert!(tris.iter().all(|t| t.contains(&4)));
    }

    #[test]
    fn point_inside_polygon_has_negative_distance() {
        let poly = square(4.0);
        assert!(dist_to_poly(&poly, Vec3A::new(2.0, 0.0, 2.0)) < 0.0);
        assert!(dist_to_poly(&poly, Vec3A::new(6.0, 0.0, 2.0)) > 0.0);
    }

    #[test]
    fn circumcircle_of_right_triangle() {
        let (c, r) = circum_circle(
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 2.0),
            Vec3A::new(2.0, 0.0, 0.0),
        );
        assert!((c.x - 1.0).abs() < 1e-5);
        assert!((c.z - 1.0).abs() < 1e-5);
        assert!((r - 2.0_f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn flat_floor_detail_mesh_matches_polygons() {
        let mut chf = flat_compact_heightfield(10);
        chf.build_distance_field();
        chf.build_regions(0, 1, 20).unwrap();
        let poly_mesh = chf
            .build_contours(1.3, 12, BuildContoursFlags::DEFAULT)
            .into_polygon_mesh(6)
            .unwrap();
        let detail = DetailNavmesh::new(&poly_mesh, &chf, 6.0, 1.0).unwrap();

        assert_eq!(detail.meshes.len(), poly_mesh.polygon_count());
        assert_eq!(detail.triangles.len(), detail.triangle_flags.len());
        for (i, submesh) in detail.meshes.iter().enumerate() {
            let polygon_vertices = poly_mesh.polygon_vertices(i).len() as u32;
            assert!(submesh.vertex_count >= polygon_vertices);
            assert!(submesh.triangle_count >= polygon_vertices - 2);
            for t in detail.submesh_triangles(i) {
                assert!(t.iter().all(|index| (*index as u32) < submesh.vertex_count));
            }
        }
        for vertex in &detail.vertices {
            assert!((0.0..=1.0).contains(&vertex.y), "{vertex}");
        }
    }

    #[test]
    fn empty_polygon_mesh_gives_empty_detail_mesh() {
        let chf = flat_compact_heightfield(4);
        let detail = DetailNavmesh::new(&PolygonNavmesh::default(), &chf, 6.0, 1.0).unwrap();
        assert!(detail.meshes.is_empty());
        assert!(detail.vertices.is_empty());
    }
}
