use std::collections::VecDeque;

use glam::U16Vec3;
use thiserror::Error;

use crate::{
    Aabb3d, AreaType, RegionId, RegionVertexId,
    contours::ContourSet,
    math::{intersect, intersect_prop, left, left_on, next, prev, vequal},
};

/// A value which indicates an invalid index within a mesh.
///
/// This does not necessarily indicate an error.
pub const RC_MESH_NULL_IDX: u16 = u16::MAX;

/// Polygons that were merged from more than one region get this region id.
pub(crate) const MULTIPLE_REGIONS: RegionId = RegionId::NONE;

const VERTEX_BUCKET_COUNT: usize = 1 << 12;

/// Represents a polygon mesh suitable for use in building a navigation mesh.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolygonNavmesh {
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The maximum number of vertices per polygon
    pub max_vertices_per_polygon: u16,
    /// The AABB border size used to generate the source data from which the mesh was derived.
    pub border_size: u16,
    /// The max error of the polygon edges in the mesh.
    pub max_edge_error: f32,
    /// The mesh vertices in voxel coordinates.
    pub vertices: Vec<U16Vec3>,
    /// The vertex indices of each polygon, padded with [`RC_MESH_NULL_IDX`].
    /// [Length: `polygon_count * max_vertices_per_polygon`]
    pub polygons: Vec<u16>,
    /// For each polygon edge, the index of the polygon on the other side.
    ///
    /// [`RC_MESH_NULL_IDX`] marks a solid edge. If the highest bit is set, the edge is a portal
    /// to a neighboring tile and the low bits hold the direction: 0 for -x, 1 for +z, 2 for +x and 3 for -z.
    pub polygon_neighbors: Vec<u16>,
    /// The user defined flags of each polygon.
    pub flags: Vec<u16>,
    /// The area id assigned to each polygon.
    pub areas: Vec<AreaType>,
    /// The region id assigned to each polygon.
    pub regions: Vec<RegionId>,
}

impl PolygonNavmesh {
    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        if self.max_vertices_per_polygon == 0 {
            return 0;
        }
        self.polygons.len() / self.max_vertices_per_polygon as usize
    }

    /// The vertex indices of the polygon at `index`, including the [`RC_MESH_NULL_IDX`] padding.
    #[inline]
    pub fn polygon(&self, index: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon as usize;
        &self.polygons[index * nvp..(index + 1) * nvp]
    }

    /// The neighbor data of the polygon at `index`. See [`PolygonNavmesh::polygon_neighbors`].
    #[inline]
    pub fn neighbors(&self, index: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon as usize;
        &self.polygon_neighbors[index * nvp..(index + 1) * nvp]
    }

    /// The vertex indices of the polygon at `index` without padding.
    #[inline]
    pub fn polygon_vertices(&self, index: usize) -> &[u16] {
        let polygon = self.polygon(index);
        &polygon[..count_poly_verts(polygon)]
    }

    fn push_polygon(&mut self, vertices: &[u16], region: RegionId, area: AreaType) {
        self.polygons.extend_from_slice(vertices);
        self.regions.push(region);
        self.areas.push(area);
    }

    fn swap_remove_polygon(&mut self, index: usize) {
        let nvp = self.max_vertices_per_polygon as usize;
        let last = self.polygon_count() - 1;
        if index != last {
            let (head, tail) = self.polygons.split_at_mut(last * nvp);
            head[index * nvp..(index + 1) * nvp].copy_from_slice(&tail[..nvp]);
        }
        self.polygons.truncate(last * nvp);
        self.regions.swap_remove(index);
        self.areas.swap_remove(index);
    }
}

impl ContourSet {
    /// Builds a polygon mesh from the provided contours.
    ///
    /// Every contour is triangulated and the triangles are merged into convex polygons
    /// with at most `max_vertices_per_polygon` vertices.
    pub fn into_polygon_mesh(
        self,
        max_vertices_per_polygon: u16,
    ) -> Result<PolygonNavmesh, PolygonMeshError> {
        let nvp = max_vertices_per_polygon as usize;
        if nvp < 3 {
            return Err(PolygonMeshError::TooFewVerticesPerPolygon(
                max_vertices_per_polygon,
            ));
        }

        let mut max_vertices = 0;
        let mut max_tris = 0;
        let mut max_verts_per_contour = 0;
        // Skip null contours.
        for contour in self.contours.iter().filter(|c| c.vertices.len() >= 3) {
            max_vertices += contour.vertices.len();
            max_tris += contour.vertices.len() - 2;
            max_verts_per_contour = max_verts_per_contour.max(contour.vertices.len());
        }
        if max_vertices >= 0xfffe {
            return Err(PolygonMeshError::TooManyVertices(max_vertices));
        }

        let mut mesh = PolygonNavmesh {
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            max_vertices_per_polygon,
            border_size: self.border_size,
            max_edge_error: self.max_error,
            vertices: Vec::with_capacity(max_vertices),
            polygons: Vec::with_capacity(max_tris * nvp),
            ..Default::default()
        };

        let mut vertex_flags = vec![false; max_vertices];
        let mut buckets = VertexBuckets::new(max_vertices);
        let mut indices = Vec::with_capacity(max_verts_per_contour);
        let mut tris = Vec::with_capacity(max_verts_per_contour);
        let mut polys = Vec::with_capacity(max_verts_per_contour);

        for (i, contour) in self.contours.iter().enumerate() {
            // Skip null contours.
            if contour.vertices.len() < 3 {
                continue;
            }

            // Triangulate contour
            let contour_vertices: Vec<U16Vec3> =
                contour.vertices.iter().map(|(vertex, _)| *vertex).collect();
            indices.clear();
            indices.extend((0..contour_vertices.len()).map(|j| (j, false)));
            tris.clear();
            if !triangulate(&contour_vertices, &mut indices, &mut tris) {
                // Bad triangulation, should not happen.
                tracing::warn!("into_polygon_mesh: Bad triangulation Contour {i}.");
            }

            // Add and merge vertices.
            let vertex_indices: Vec<u16> = contour
                .vertices
                .iter()
                .map(|(vertex, data)| {
                    let index = buckets.add_vertex(*vertex, &mut mesh.vertices);
                    if data.contains(RegionVertexId::BORDER_VERTEX) {
                        // This vertex should be removed.
                        vertex_flags[index as usize] = true;
                    }
                    index
                })
                .collect();

            // Build initial polygons.
            polys.clear();
            for t in &tris {
                if t[0] != t[1] && t[0] != t[2] && t[1] != t[2] {
                    let mut vertices = vec![RC_MESH_NULL_IDX; nvp];
                    vertices[0] = vertex_indices[t[0]];
                    vertices[1] = vertex_indices[t[1]];
                    vertices[2] = vertex_indices[t[2]];
                    polys.push(PendingPolygon {
                        vertices,
                        region: contour.region,
                        area: contour.area,
                    });
                }
            }
            if polys.is_empty() {
                continue;
            }

            // Merge polygons.
            if nvp > 3 {
                merge_polygons(&mut polys, &mesh.vertices);
            }

            // Store polygons.
            for poly in &polys {
                mesh.push_polygon(&poly.vertices, poly.region, poly.area);
                if mesh.polygon_count() > max_tris {
                    return Err(PolygonMeshError::TooManyPolygons {
                        count: mesh.polygon_count(),
                        max: max_tris,
                    });
                }
            }
        }

        // Remove edge vertices.
        let mut i = 0;
        while i < mesh.vertices.len() {
            if vertex_flags[i] && mesh.can_remove_vertex(i as u16) {
                mesh.remove_vertex(i as u16, max_tris)?;
                // Fixup vertex flags
                vertex_flags.remove(i);
                continue;
            }
            i += 1;
        }

        // Calculate adjacency.
        mesh.build_mesh_adjacency();

        // Find portal edges
        if mesh.border_size > 0 {
            mesh.mark_portal_edges(self.width, self.height);
        }

        // Just allocate the mesh flags array. The user is responsible to fill it.
        mesh.flags = vec![0; mesh.polygon_count()];

        if mesh.vertices.len() > 0xffff {
            return Err(PolygonMeshError::TooManyVertices(mesh.vertices.len()));
        }
        if mesh.polygon_count() > 0xffff {
            return Err(PolygonMeshError::TooManyPolygons {
                count: mesh.polygon_count(),
                max: 0xffff,
            });
        }

        Ok(mesh)
    }
}

impl PolygonNavmesh {
    fn can_remove_vertex(&self, rem: u16) -> bool {
        // Count number of polygons to remove.
        let mut num_touched_verts = 0;
        let mut num_remaining_edges = 0;
        for i in 0..self.polygon_count() {
            let p = self.polygon_vertices(i);
            let num_removed = p.iter().filter(|v| **v == rem).count();
            if num_removed > 0 {
                num_touched_verts += num_removed;
                num_remaining_edges += p.len() - (num_removed + 1);
            }
        }

        // There would be too few edges remaining to create a polygon.
        // This can happen for example when a tip of a triangle is marked
        // as deletion, but there are no other polys that share the vertex.
        // In this case, the vertex should not be removed.
        if num_remaining_edges <= 2 {
            return false;
        }

        // Find edges which share the removed vertex.
        let mut edges: Vec<(u16, u16, u32)> = Vec::with_capacity(num_touched_verts * 2);
        for i in 0..self.polygon_count() {
            let p = self.polygon_vertices(i);
            let nv = p.len();

            // Collect edges which touches the removed vertex.
            let mut k = nv - 1;
            for j in 0..nv {
                if p[j] == rem || p[k] == rem {
                    // Arrange edge so that a=rem.
                    let (mut a, mut b) = (p[j], p[k]);
                    if b == rem {
                        std::mem::swap(&mut a, &mut b);
                    }

                    // Check if the edge exists
                    let mut exists = false;
                    for edge in edges.iter_mut() {
                        if edge.1 == b {
                            // Exists, increment vertex share count.
                            edge.2 += 1;
                            exists = true;
                        }
                    }
                    // Add new edge.
                    if !exists {
                        edges.push((a, b, 1));
                    }
                }
                k = j;
            }
        }

        // There should be no more than 2 open edges.
        // This catches the case that two non-adjacent polygons
        // share the removed vertex. In that case, do not remove the vertex.
        let num_open_edges = edges.iter().filter(|edge| edge.2 < 2).count();
        num_open_edges <= 2
    }

    fn remove_vertex(&mut self, rem: u16, max_tris: usize) -> Result<(), PolygonMeshError> {
        let nvp = self.max_vertices_per_polygon as usize;

        let mut edges: Vec<(u16, u16, RegionId, AreaType)> = Vec::new();
        let mut i = 0;
        while i < self.polygon_count() {
            let p = self.polygon_vertices(i);
            if !p.contains(&rem) {
                i += 1;
                continue;
            }
            // Collect edges which does not touch the removed vertex.
            let nv = p.len();
            let mut k = nv - 1;
            for j in 0..nv {
                if p[j] != rem && p[k] != rem {
                    edges.push((p[k], p[j], self.regions[i], self.areas[i]));
                }
                k = j;
            }
            // Remove the polygon.
            self.swap_remove_polygon(i);
        }

        // Remove vertex.
        self.vertices.remove(rem as usize);

        // Adjust indices to match the removed vertex layout.
        for index in self.polygons.iter_mut() {
            if *index != RC_MESH_NULL_IDX && *index > rem {
                *index -= 1;
            }
        }
        for edge in edges.iter_mut() {
            if edge.0 > rem {
                edge.0 -= 1;
            }
            if edge.1 > rem {
                edge.1 -= 1;
            }
        }

        let Some(first) = edges.first() else {
            return Ok(());
        };

        // Start with one vertex, keep appending connected
        // segments to the start and end of the hole.
        let mut hole = VecDeque::from([(first.0, first.2, first.3)]);
        while !edges.is_empty() {
            let mut matched = false;
            let mut i = 0;
            while i < edges.len() {
                let (ea, eb, region, area) = edges[i];
                let mut add = false;
                if hole.front().is_some_and(|front| front.0 == eb) {
                    // The segment matches the beginning of the hole boundary.
                    hole.push_front((ea, region, area));
                    add = true;
                } else if hole.back().is_some_and(|back| back.0 == ea) {
                    // The segment matches the end of the hole boundary.
                    hole.push_back((eb, region, area));
                    add = true;
                }
                if add {
                    // The edge segment was added, remove it.
                    edges.swap_remove(i);
                    matched = true;
                } else {
                    i += 1;
                }
            }
            if !matched {
                break;
            }
        }

        if hole.len() < 3 {
            return Ok(());
        }

        // Generate temp vertex array for triangulation.
        let hole_vertices: Vec<U16Vec3> = hole
            .iter()
            .map(|(vertex, _, _)| self.vertices[*vertex as usize])
            .collect();
        let mut indices: Vec<(usize, bool)> = (0..hole.len()).map(|i| (i, false)).collect();
        let mut tris = Vec::with_capacity(hole.len());

        // Triangulate the hole.
        if !triangulate(&hole_vertices, &mut indices, &mut tris) {
            tracing::warn!("remove_vertex: triangulate() returned bad results.");
        }

        // Merge the hole triangles back to polygons.
        let mut polys = Vec::with_capacity(tris.len());
        for t in &tris {
            if t[0] != t[1] && t[0] != t[2] && t[1] != t[2] {
                let mut vertices = vec![RC_MESH_NULL_IDX; nvp];
                vertices[0] = hole[t[0]].0;
                vertices[1] = hole[t[1]].0;
                vertices[2] = hole[t[2]].0;
                // If this polygon covers multiple region types then
                // mark it as such
                let region = if hole[t[0]].1 != hole[t[1]].1 || hole[t[1]].1 != hole[t[2]].1 {
                    MULTIPLE_REGIONS
                } else {
                    hole[t[0]].1
                };
                polys.push(PendingPolygon {
                    vertices,
                    region,
                    area: hole[t[0]].2,
                });
            }
        }
        if polys.is_empty() {
            return Ok(());
        }

        // Merge polygons.
        if nvp > 3 {
            merge_polygons(&mut polys, &self.vertices);
        }

        // Store polygons.
        for poly in &polys {
            if self.polygon_count() >= max_tris {
                tracing::error!(
                    "remove_vertex: Too many polygons {} (max:{max_tris}).",
                    self.polygon_count() + 1
                );
                return Err(PolygonMeshError::RemoveVertex(rem));
            }
            self.push_polygon(&poly.vertices, poly.region, poly.area);
        }
        Ok(())
    }

    fn build_mesh_adjacency(&mut self) {
        // Based on code by Eric Lengyel from:
        // https://web.archive.org/web/20080704083314/http://www.terathon.com/code/edges.php
        struct Edge {
            vert: [u16; 2],
            poly_edge: [usize; 2],
            poly: [usize; 2],
        }

        let polygon_count = self.polygon_count();
        let mut first_edge: Vec<Option<usize>> = vec![None; self.vertices.len()];
        let mut next_edge: Vec<Option<usize>> = Vec::new();
        let mut edges: Vec<Edge> = Vec::new();

        let edge_vertices = |p: &[u16], j: usize| {
            let v0 = p[j];
            let v1 = if j + 1 >= p.len() { p[0] } else { p[j + 1] };
            (v0, v1)
        };

        for i in 0..polygon_count {
            let p = self.polygon_vertices(i);
            for j in 0..p.len() {
                let (v0, v1) = edge_vertices(p, j);
                if v0 < v1 {
                    // Insert edge
                    next_edge.push(first_edge[v0 as usize]);
                    first_edge[v0 as usize] = Some(edges.len());
                    edges.push(Edge {
                        vert: [v0, v1],
                        poly: [i, i],
                        poly_edge: [j, 0],
                    });
                }
            }
        }

        for i in 0..polygon_count {
            let p = self.polygon_vertices(i);
            for j in 0..p.len() {
                let (v0, v1) = edge_vertices(p, j);
                if v0 > v1 {
                    let mut e = first_edge[v1 as usize];
                    while let Some(index) = e {
                        let edge = &mut edges[index];
                        if edge.vert[1] == v0 && edge.poly[0] == edge.poly[1] {
                            edge.poly[1] = i;
                            edge.poly_edge[1] = j;
                            break;
                        }
                        e = next_edge[index];
                    }
                }
            }
        }

        // Store adjacency
        let nvp = self.max_vertices_per_polygon as usize;
        self.polygon_neighbors = vec![RC_MESH_NULL_IDX; self.polygons.len()];
        for edge in &edges {
            if edge.poly[0] != edge.poly[1] {
                self.polygon_neighbors[edge.poly[0] * nvp + edge.poly_edge[0]] = edge.poly[1] as u16;
                self.polygon_neighbors[edge.poly[1] * nvp + edge.poly_edge[1]] = edge.poly[0] as u16;
            }
        }
    }

    fn mark_portal_edges(&mut self, width: u16, height: u16) {
        let nvp = self.max_vertices_per_polygon as usize;
        for i in 0..self.polygon_count() {
            let nv = self.polygon_vertices(i).len();
            for j in 0..nv {
                // Skip connected edges.
                if self.polygon_neighbors[i * nvp + j] != RC_MESH_NULL_IDX {
                    continue;
                }
                let nj = if j + 1 >= nv { 0 } else { j + 1 };
                let va = self.vertices[self.polygons[i * nvp + j] as usize];
                let vb = self.vertices[self.polygons[i * nvp + nj] as usize];

                let direction = if va.x == 0 && vb.x == 0 {
                    0
                } else if va.z == height && vb.z == height {
                    1
                } else if va.x == width && vb.x == width {
                    2
                } else if va.z == 0 && vb.z == 0 {
                    3
                } else {
                    continue;
                };
                self.polygon_neighbors[i * nvp + j] = 0x8000 | direction;
            }
        }
    }
}

/// A polygon that is still being assembled, before it is stored in the mesh.
struct PendingPolygon {
    vertices: Vec<u16>,
    region: RegionId,
    area: AreaType,
}

/// Spatial hash used to weld vertices shared by neighboring contours.
struct VertexBuckets {
    first: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
}

impl VertexBuckets {
    fn new(capacity: usize) -> Self {
        Self {
            first: vec![None; VERTEX_BUCKET_COUNT],
            next: Vec::with_capacity(capacity),
        }
    }

    fn hash(vertex: U16Vec3) -> usize {
        // Large multiplicative constants; here arbitrarily chosen primes
        const H1: u32 = 0x8da6b343;
        const H3: u32 = 0xcb1ab31f;
        let n = H1
            .wrapping_mul(vertex.x as u32)
            .wrapping_add(H3.wrapping_mul(vertex.z as u32));
        n as usize & (VERTEX_BUCKET_COUNT - 1)
    }

    /// Returns the index of an existing vertex at the same xz-location and a similar height,
    /// or adds `vertex` to `vertices`.
    fn add_vertex(&mut self, vertex: U16Vec3, vertices: &mut Vec<U16Vec3>) -> u16 {
        let bucket = Self::hash(vertex);
        let mut i = self.first[bucket];
        while let Some(index) = i {
            let v = vertices[index];
            if v.x == vertex.x && (v.y as i32 - vertex.y as i32).abs() <= 2 && v.z == vertex.z {
                return index as u16;
            }
            i = self.next[index];
        }

        // Could not find, create new.
        let index = vertices.len();
        vertices.push(vertex);
        self.next.push(self.first[bucket]);
        self.first[bucket] = Some(index);
        index as u16
    }
}

#[inline]
fn count_poly_verts(p: &[u16]) -> usize {
    p.iter()
        .position(|index| *index == RC_MESH_NULL_IDX)
        .unwrap_or(p.len())
}

/// Greedily merges pairs of polygons sharing the longest edge while the result stays convex.
fn merge_polygons(polys: &mut Vec<PendingPolygon>, vertices: &[U16Vec3]) {
    loop {
        // Find best polygons to merge.
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..polys.len().saturating_sub(1) {
            for k in j + 1..polys.len() {
                let Some((value, ea, eb)) =
                    get_poly_merge_value(&polys[j].vertices, &polys[k].vertices, vertices)
                else {
                    continue;
                };
                if value > best.map_or(0, |b| b.0) {
                    best = Some((value, j, k, ea, eb));
                }
            }
        }

        // Could not merge any polygons, stop.
        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        // Found best, merge.
        polys[pa].vertices = merge_poly_verts(&polys[pa].vertices, &polys[pb].vertices, ea, eb);
        if polys[pa].region != polys[pb].region {
            polys[pa].region = MULTIPLE_REGIONS;
        }
        polys.swap_remove(pb);
    }
}

/// Returns the squared length of the shared edge and the edge indices in `pa` and `pb`,
/// or `None` if the polygons cannot be merged into a convex polygon.
fn get_poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    vertices: &[U16Vec3],
) -> Option<(i32, usize, usize)> {
    let nvp = pa.len();
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);

    // If the merged polygon would be too big, do not merge.
    if na + nb - 2 > nvp {
        return None;
    }

    // Check if the polygons share an edge.
    let mut shared = None;
    for i in 0..na {
        let mut va0 = pa[i];
        let mut va1 = pa[(i + 1) % na];
        if va0 > va1 {
            std::mem::swap(&mut va0, &mut va1);
        }
        for j in 0..nb {
            let mut vb0 = pb[j];
            let mut vb1 = pb[(j + 1) % nb];
            if vb0 > vb1 {
                std::mem::swap(&mut vb0, &mut vb1);
            }
            if va0 == vb0 && va1 == vb1 {
                shared = Some((i, j));
                break;
            }
        }
    }

    // No common edge, cannot merge.
    let (ea, eb) = shared?;

    // Check to see if the merged polygon would be convex.
    let v = |index: u16| vertices[index as usize];
    let va = pa[(ea + na - 1) % na];
    let vb = pa[ea];
    let vc = pb[(eb + 2) % nb];
    if !left(v(va), v(vb), v(vc)) {
        return None;
    }

    let va = pb[(eb + nb - 1) % nb];
    let vb = pb[eb];
    let vc = pa[(ea + 2) % na];
    if !left(v(va), v(vb), v(vc)) {
        return None;
    }

    let va = v(pa[ea]);
    let vb = v(pa[(ea + 1) % na]);
    let dx = va.x as i32 - vb.x as i32;
    let dz = va.z as i32 - vb.z as i32;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);

    // Merge polygons.
    let mut merged = Vec::with_capacity(pa.len());
    // Add pa
    for i in 0..na - 1 {
        merged.push(pa[(ea + 1 + i) % na]);
    }
    // Add pb
    for i in 0..nb - 1 {
        merged.push(pb[(eb + 1 + i) % nb]);
    }
    merged.resize(pa.len(), RC_MESH_NULL_IDX);
    merged
}

/// Ear-clipping triangulation of the polygon formed by `indices` into `vertices`.
/// The flag next to each index marks vertices whose neighbors form a valid diagonal.
///
/// Returns `false` if the polygon could not be fully triangulated. The triangles found so far are still written out.
fn triangulate(
    vertices: &[U16Vec3],
    indices: &mut Vec<(usize, bool)>,
    tris: &mut Vec<[usize; 3]>,
) -> bool {
    let n = indices.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let i1 = next(i, n);
        let i2 = next(i1, n);
        if diagonal(i, i2, vertices, indices) {
            indices[i1].1 = true;
        }
    }

    let vertex = |indices: &[(usize, bool)], i: usize| vertices[indices[i].0];
    let length_squared = |a: U16Vec3, b: U16Vec3| {
        let dx = b.x as i32 - a.x as i32;
        let dz = b.z as i32 - a.z as i32;
        dx * dx + dz * dz
    };

    while indices.len() > 3 {
        let n = indices.len();
        let mut min: Option<(i32, usize)> = None;
        for i in 0..n {
            let i1 = next(i, n);
            if indices[i1].1 {
                let p0 = vertex(indices, i);
                let p2 = vertex(indices, next(i1, n));
                let len = length_squared(p0, p2);
                if min.is_none_or(|(min_len, _)| len < min_len) {
                    min = Some((len, i));
                }
            }
        }

        if min.is_none() {
            // We might get here because the contour has overlapping segments, like this:
            //
            //  A o-o=====o---o B
            //   /  |C   D|    \.
            //  o   o     o     o
            //  :   :     :     :
            // We'll try to recover by loosing up the inCone test a bit so that a diagonal
            // like A-B or C-D can be found and we can continue.
            for i in 0..n {
                let i1 = next(i, n);
                let i2 = next(i1, n);
                if diagonal_loose(i, i2, vertices, indices) {
                    let p0 = vertex(indices, i);
                    let p2 = vertex(indices, i2);
                    let len = length_squared(p0, p2);
                    if min.is_none_or(|(min_len, _)| len < min_len) {
                        min = Some((len, i));
                    }
                }
            }
        }

        let Some((_, i)) = min else {
            // The contour is messed up. This sometimes happens
            // if the contour simplification is too aggressive.
            return false;
        };
        let i1 = next(i, n);
        let i2 = next(i1, n);
        tris.push([indices[i].0, indices[i1].0, indices[i2].0]);

        // Removes P[i1] by copying P[i+1]...P[n-1] left one index.
        indices.remove(i1);
        let n = indices.len();
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = prev(i1, n);
        // Update diagonal flags.
        indices[i].1 = diagonal(prev(i, n), i1, vertices, indices);
        indices[i1].1 = diagonal(i, next(i1, n), vertices, indices);
    }

    // Append the remaining triangle.
    tris.push([indices[0].0, indices[1].0, indices[2].0]);
    true
}

/// Returns true iff (v_i, v_j) is a proper internal *or* external diagonal of P,
/// *ignoring edges incident to v_i and v_j*.
fn diagonalie(
    i: usize,
    j: usize,
    vertices: &[U16Vec3],
    indices: &[(usize, bool)],
    intersects: fn(U16Vec3, U16Vec3, U16Vec3, U16Vec3) -> bool,
) -> bool {
    let n = indices.len();
    let d0 = vertices[indices[i].0];
    let d1 = vertices[indices[j].0];

    // For each edge (k,k+1) of P
    for k in 0..n {
        let k1 = next(k, n);
        // Skip edges incident to i or j
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vertices[indices[k].0];
        let p1 = vertices[indices[k1].0];
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersects(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

/// Returns true iff the diagonal (i,j) is strictly internal to the polygon P in the neighborhood of the i endpoint.
fn in_cone(i: usize, j: usize, vertices: &[U16Vec3], indices: &[(usize, bool)], loose: bool) -> bool {
    let n = indices.len();
    let pi = vertices[indices[i].0];
    let pj = vertices[indices[j].0];
    let pi1 = vertices[indices[next(i, n)].0];
    let pin1 = vertices[indices[prev(i, n)].0];

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if left_on(pin1, pi, pi1) {
        if loose {
            return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
        }
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

/// Returns true iff (v_i, v_j) is a proper internal diagonal of P.
fn diagonal(i: usize, j: usize, vertices: &[U16Vec3], indices: &[(usize, bool)]) -> bool {
    in_cone(i, j, vertices, indices, false) && diagonalie(i, j, vertices, indices, intersect)
}

fn diagonal_loose(i: usize, j: usize, vertices: &[U16Vec3], indices: &[(usize, bool)]) -> bool {
    in_cone(i, j, vertices, indices, true) && diagonalie(i, j, vertices, indices, intersect_prop)
}

/// Errors that can occur when building a [`PolygonNavmesh`].
#[derive(Error, Debug)]
pub enum PolygonMeshError {
    /// Polygons need at least three vertices.
    #[error("Polygons need at least 3 vertices, but max_vertices_per_polygon is {0}")]
    TooFewVerticesPerPolygon(u16),
    /// The mesh has more vertices than a polygon index can address.
    #[error("Too many vertices {0}.")]
    TooManyVertices(usize),
    /// More polygons were created than allocated.
    #[error("Too many polygons {count} (max:{max}).")]
    TooManyPolygons {
        /// The number of polygons.
        count: usize,
        /// The allowed maximum.
        max: usize,
    },
    /// A vertex on a tile border could not be removed.
    #[error("Failed to remove edge vertex {0}.")]
    RemoveVertex(u16),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildContoursFlags, test_utils::flat_compact_heightfield};

    fn vertices(points: &[(u16, u16)]) -> Vec<U16Vec3> {
        points
            .iter()
            .map(|(x, z)| U16Vec3::new(*x, 0, *z))
            .collect()
    }

    #[test]
    fn triangulates_a_convex_polygon() {
        let verts = vertices(&[(0, 0), (0, 4), (4, 4), (4, 0)]);
        let mut indices: Vec<(usize, bool)> = (0..4).map(|i| (i, false)).collect();
        let mut tris = Vec::new();
        assert!(triangulate(&verts, &mut indices, &mut tris));
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn triangulates_a_concave_polygon() {
        // An L-shape.
        let verts = vertices(&[(0, 0), (0, 4), (4, 4), (4, 2), (2, 2), (2, 0)]);
        let mut indices: Vec<(usize, bool)> = (0..6).map(|i| (i, false)).collect();
        let mut tris = Vec::new();
        assert!(triangulate(&verts, &mut indices, &mut tris));
        assert_eq!(tris.len(), 4);
    }

    #[test]
    fn merges_triangles_into_a_quad() {
        let verts = vertices(&[(0, 0), (0, 4), (4, 4), (4, 0)]);
        let mut polys = vec![
            PendingPolygon {
                vertices: vec![0, 1, 2, RC_MESH_NULL_IDX, RC_MESH_NULL_IDX, RC_MESH_NULL_IDX],
                region: RegionId::from(1),
                area: AreaType::DEFAULT_WALKABLE,
            },
            PendingPolygon {
                vertices: vec![0, 2, 3, RC_MESH_NULL_IDX, RC_MESH_NULL_IDX, RC_MESH_NULL_IDX],
                region: RegionId::from(1),
                area: AreaType::DEFAULT_WALKABLE,
            },
        ];
        merge_polygons(&mut polys, &verts);
        assert_eq!(polys.len(), 1);
        assert_eq!(count_poly_verts(&polys[0].vertices), 4);
        assert_eq!(polys[0].region, RegionId::from(1));
    }

    #[test]
    fn vertices_are_welded() {
        let mut buckets = VertexBuckets::new(4);
        let mut verts = Vec::new();
        let a = buckets.add_vertex(U16Vec3::new(1, 5, 1), &mut verts);
        let b = buckets.add_vertex(U16Vec3::new(1, 6, 1), &mut verts);
        let c = buckets.add_vertex(U16Vec3::new(1, 9, 1), &mut verts);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(verts.len(), 2);
    }

    #[test]
    fn open_floor_becomes_a_connected_mesh() {
        let mut chf = flat_compact_heightfield(10);
        chf.build_distance_field();
        chf.build_regions(0, 1, 20).unwrap();
        let mesh = chf
            .build_contours(1.3, 12, BuildContoursFlags::DEFAULT)
            .into_polygon_mesh(6)
            .unwrap();
        assert!(mesh.polygon_count() > 0);
        assert_eq!(mesh.polygons.len(), mesh.polygon_count() * 6);
        assert_eq!(mesh.polygon_neighbors.len(), mesh.polygons.len());
        assert_eq!(mesh.flags.len(), mesh.polygon_count());
        for i in 0..mesh.polygon_count() {
            assert!(mesh.polygon_vertices(i).len() >= 3);
            assert!(mesh.areas[i].is_walkable());
        }
        // Neighbor links are symmetric.
        for i in 0..mesh.polygon_count() {
            for &neighbor in mesh.neighbors(i) {
                if neighbor == RC_MESH_NULL_IDX {
                    continue;
                }
                assert!(mesh.neighbors(neighbor as usize).contains(&(i as u16)));
            }
        }
    }

    #[test]
    fn too_few_vertices_per_polygon_is_an_error() {
        let mut chf = flat_compact_heightfield(4);
        chf.build_regions_monotone(0, 1, 20).unwrap();
        let result = chf
            .build_contours(1.3, 12, BuildContoursFlags::DEFAULT)
            .into_polygon_mesh(2);
        assert!(matches!(
            result,
            Err(PolygonMeshError::TooFewVerticesPerPolygon(2))
        ));
    }
}
