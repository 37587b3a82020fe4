//! Conversion of a [`ContourSet`] into convex polygons.

use std::collections::{HashMap, VecDeque};

use glam::U16Vec3;
use thiserror::Error;

use crate::{
    Aabb3d,
    contours::{ContourSet, RegionVertexId},
    math::grid,
    region::RegionId,
    span::AreaType,
};

/// Represents a polygon mesh suitable for use in building a navigation mesh.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PolygonNavmesh {
    /// The mesh vertices in voxel space.
    pub vertices: Vec<U16Vec3>,
    /// Polygon vertex indices. [Length: polygon count * [`Self::max_vertices_per_polygon`]]
    ///
    /// Unused slots at the end of a polygon are [`Self::NULL_INDEX`].
    pub polygons: Vec<u16>,
    /// Polygon neighbors, parallel to [`Self::polygons`].
    ///
    /// Entry `j` describes the edge from vertex `j` to vertex `j + 1`:
    /// the index of the polygon on the other side, [`Self::NULL_INDEX`] for a solid edge,
    /// or [`Self::EXTERNAL_LINK`] combined with the tile side for an edge on the border.
    pub polygon_neighbors: Vec<u16>,
    /// The region id assigned to each polygon.
    /// [`RegionId::NONE`] if the polygon was merged from several regions.
    pub regions: Vec<RegionId>,
    /// The user defined flags for each polygon.
    pub flags: Vec<u16>,
    /// The area id assigned to each polygon.
    pub areas: Vec<AreaType>,
    /// The maximum number of vertices per polygon
    pub max_vertices_per_polygon: u16,
    /// The bounding box of the mesh in world space.
    pub aabb: Aabb3d,
    /// The size of each cell. (On the xz-plane.)
    pub cell_size: f32,
    /// The height of each cell. (The minimum increment along the y-axis.)
    pub cell_height: f32,
    /// The AABB border size used to generate the source data from which the mesh was derived.
    pub border_size: u16,
    /// The max error of the polygon edges in the mesh.
    pub max_edge_error: f32,
}

impl PolygonNavmesh {
    /// Marks an unused vertex or neighbor slot.
    pub const NULL_INDEX: u16 = 0xffff;
    /// Set on a neighbor entry whose edge lies on the border of the tile.
    /// The low bits hold the side: 0 = -x, 1 = +z, 2 = +x, 3 = -z.
    pub const EXTERNAL_LINK: u16 = 0x8000;
    /// The flag given to every polygon when polygon flags are applied during the build.
    pub const DEFAULT_FLAG: u16 = 0x01;

    /// The number of polygons in the mesh.
    #[inline]
    pub fn polygon_count(&self) -> usize {
        self.regions.len()
    }

    /// The vertex slots of polygon `i`, including trailing [`Self::NULL_INDEX`] entries.
    #[inline]
    pub fn polygon(&self, i: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon as usize;
        &self.polygons[i * nvp..(i + 1) * nvp]
    }

    /// The vertex indices of polygon `i`.
    pub fn polygon_vertices(&self, i: usize) -> &[u16] {
        let polygon = self.polygon(i);
        &polygon[..count_poly_verts(polygon)]
    }

    /// The neighbor slots of polygon `i`.
    #[inline]
    pub fn neighbors(&self, i: usize) -> &[u16] {
        let nvp = self.max_vertices_per_polygon as usize;
        &self.polygon_neighbors[i * nvp..(i + 1) * nvp]
    }

    fn swap_remove_polygon(&mut self, i: usize) {
        let nvp = self.max_vertices_per_polygon as usize;
        let last = self.polygon_count() - 1;
        if i != last {
            let (head, tail) = self.polygons.split_at_mut(last * nvp);
            head[i * nvp..(i + 1) * nvp].copy_from_slice(&tail[..nvp]);
        }
        self.polygons.truncate(last * nvp);
        self.regions.swap_remove(i);
        self.areas.swap_remove(i);
    }

    fn push_polygon(&mut self, polygon: &[u16], region: RegionId, area: AreaType) {
        let nvp = self.max_vertices_per_polygon as usize;
        self.polygons.extend_from_slice(&polygon[..nvp]);
        self.regions.push(region);
        self.areas.push(area);
    }
}

/// Errors that can occur while building a [`PolygonNavmesh`].
#[derive(Debug, Error)]
pub enum PolygonMeshError {
    /// The contours have more vertices than a polygon mesh can address.
    #[error("Too many vertices: {count}, the maximum is {max}", max = MAX_VERTICES)]
    VerticesExceeded {
        /// The number of vertices the contours would produce.
        count: usize,
    },
    /// More polygons were produced than the contours can triangulate into.
    #[error("Too many polygons: {count}, the maximum is {max}")]
    PolygonsExceeded {
        /// The number of polygons produced.
        count: usize,
        /// The maximum number of polygons.
        max: usize,
    },
}

const MAX_VERTICES: usize = 0xfffe;

impl ContourSet {
    /// Builds a polygon mesh from the provided contours.
    ///
    /// Each contour is triangulated, then the triangles are merged greedily into convex polygons
    /// of at most `max_vertices_per_polygon` vertices. Vertices flagged as tile border vertices are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the contours hold too many vertices.
    pub fn into_polygon_mesh(
        self,
        max_vertices_per_polygon: u16,
    ) -> Result<PolygonNavmesh, PolygonMeshError> {
        let nvp = max_vertices_per_polygon.max(3) as usize;
        let mut mesh = PolygonNavmesh {
            vertices: Vec::new(),
            polygons: Vec::new(),
            polygon_neighbors: Vec::new(),
            regions: Vec::new(),
            flags: Vec::new(),
            areas: Vec::new(),
            max_vertices_per_polygon: nvp as u16,
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            border_size: self.border_size,
            max_edge_error: self.max_error,
        };

        let contours = self.contours.iter().filter(|contour| contour.vertices.len() >= 3);
        let max_vertices: usize = contours.clone().map(|c| c.vertices.len()).sum();
        let max_polygons: usize = contours.clone().map(|c| c.vertices.len() - 2).sum();
        if max_vertices >= MAX_VERTICES {
            return Err(PolygonMeshError::VerticesExceeded {
                count: max_vertices,
            });
        }

        let mut vertex_lookup = VertexLookup::default();
        let mut remove_flags = Vec::with_capacity(max_vertices);
        mesh.vertices.reserve(max_vertices);

        for (contour_index, contour) in contours.enumerate() {
            let contour_vertices: Vec<U16Vec3> = contour.vertices.iter().map(|(v, _)| *v).collect();

            // Triangulate contour
            let (triangles, complete) = triangulate(&contour_vertices);
            if !complete {
                // Bad triangulation, should not happen.
                tracing::warn!(contour = contour_index, "Bad triangulation");
            }

            // Add and merge vertices.
            let indices: Vec<u16> = contour
                .vertices
                .iter()
                .map(|(v, r)| {
                    let index = vertex_lookup.add(*v, &mut mesh.vertices);
                    if remove_flags.len() <= index as usize {
                        remove_flags.resize(index as usize + 1, false);
                    }
                    if r.contains(RegionVertexId::BORDER_VERTEX) {
                        // This vertex should be removed.
                        remove_flags[index as usize] = true;
                    }
                    index
                })
                .collect();

            // Build initial polygons.
            let mut polys: Vec<Vec<u16>> = triangles
                .iter()
                .filter(|t| t[0] != t[1] && t[0] != t[2] && t[1] != t[2])
                .map(|t| {
                    let mut polygon = vec![PolygonNavmesh::NULL_INDEX; nvp];
                    for (slot, corner) in polygon.iter_mut().zip(t) {
                        *slot = indices[*corner];
                    }
                    polygon
                })
                .collect();
            if polys.is_empty() {
                continue;
            }
            let mut tags = vec![(contour.region, contour.area); polys.len()];

            // Merge polygons.
            if nvp > 3 {
                merge_polygons(&mut polys, &mut tags, &mesh.vertices, nvp);
            }

            // Store polygons.
            for (polygon, (region, area)) in polys.iter().zip(tags) {
                mesh.push_polygon(polygon, region, area);
                if mesh.polygon_count() > max_polygons {
                    return Err(PolygonMeshError::PolygonsExceeded {
                        count: mesh.polygon_count(),
                        max: max_polygons,
                    });
                }
            }
        }

        // Remove edge vertices.
        let mut i = 0;
        while i < mesh.vertices.len() {
            if !remove_flags[i] || !mesh.can_remove_vertex(i as u16) {
                i += 1;
                continue;
            }
            mesh.remove_vertex(i as u16, max_polygons)?;
            // The vertex array shrank by one, fixup vertex flags.
            remove_flags.remove(i);
        }

        // Calculate adjacency.
        mesh.build_adjacency();

        // Find portal edges
        if mesh.border_size > 0 {
            mesh.mark_portal_edges(self.width, self.height);
        }

        // Just allocate the mesh flags array. The user is resposible to fill it.
        mesh.flags = vec![0; mesh.polygon_count()];

        tracing::debug!(
            vertices = mesh.vertices.len(),
            polygons = mesh.polygon_count(),
            "Built polygon mesh"
        );
        Ok(mesh)
    }
}

impl PolygonNavmesh {
    fn can_remove_vertex(&self, rem: u16) -> bool {
        let nvp = self.max_vertices_per_polygon as usize;

        // Count number of polygons to remove.
        let mut num_touched_verts = 0;
        let mut num_remaining_edges = 0;
        for polygon in self.polygons.chunks_exact(nvp) {
            let nv = count_poly_verts(polygon);
            let num_removed = polygon[..nv].iter().filter(|v| **v == rem).count();
            if num_removed > 0 {
                num_touched_verts += num_removed;
                num_remaining_edges += nv.saturating_sub(num_removed + 1);
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
        // Other end of the edge and how many polygons share it.
        let mut edges: Vec<(u16, u32)> = Vec::with_capacity(num_touched_verts * 2);
        for polygon in self.polygons.chunks_exact(nvp) {
            let nv = count_poly_verts(polygon);

            // Collect edges which touches the removed vertex.
            let mut k = nv - 1;
            for j in 0..nv {
                if polygon[j] == rem || polygon[k] == rem {
                    // Arrange edge so that a=rem.
                    let other = if polygon[k] == rem {
                        polygon[j]
                    } else {
                        polygon[k]
                    };
                    // Check if the edge exists
                    match edges.iter_mut().find(|(b, _)| *b == other) {
                        // Exists, increment vertex share count.
                        Some((_, share_count)) => *share_count += 1,
                        None => edges.push((other, 1)),
                    }
                }
                k = j;
            }
        }

        // There should be no more than 2 open edges.
        // This catches the case that two non-adjacent polygons
        // share the removed vertex. In that case, do not remove the vertex.
        let open_edges = edges.iter().filter(|(_, share_count)| *share_count < 2).count();
        open_edges <= 2
    }

    fn remove_vertex(&mut self, rem: u16, max_polygons: usize) -> Result<(), PolygonMeshError> {
        let nvp = self.max_vertices_per_polygon as usize;

        // Edges of the removed polygons which do not touch the removed vertex,
        // with the region and area of their polygon.
        let mut edges: Vec<(u16, u16, RegionId, AreaType)> = Vec::new();
        let mut i = 0;
        while i < self.polygon_count() {
            let polygon = self.polygon(i);
            let nv = count_poly_verts(polygon);
            if !polygon[..nv].contains(&rem) {
                i += 1;
                continue;
            }
            // Collect edges which does not touch the removed vertex.
            let mut k = nv - 1;
            for j in 0..nv {
                if polygon[j] != rem && polygon[k] != rem {
                    edges.push((polygon[k], polygon[j], self.regions[i], self.areas[i]));
                }
                k = j;
            }
            // Remove the polygon.
            self.swap_remove_polygon(i);
        }

        // Remove vertex.
        self.vertices.remove(rem as usize);

        // Adjust indices to match the removed vertex layout.
        for v in &mut self.polygons {
            if *v != Self::NULL_INDEX && *v > rem {
                *v -= 1;
            }
        }
        for (a, b, _, _) in &mut edges {
            if *a > rem {
                *a -= 1;
            }
            if *b > rem {
                *b -= 1;
            }
        }

        let Some(&(first, _, first_region, first_area)) = edges.first() else {
            return Ok(());
        };

        // Start with one vertex, keep appending connected
        // segments to the start and end of the hole.
        let mut hole = VecDeque::from([first]);
        let mut hole_regions = VecDeque::from([first_region]);
        let mut hole_areas = VecDeque::from([first_area]);

        while !edges.is_empty() {
            let mut matched = false;
            let mut i = 0;
            while i < edges.len() {
                let (ea, eb, region, area) = edges[i];
                let added = if hole.front() == Some(&eb) {
                    // The segment matches the beginning of the hole boundary.
                    hole.push_front(ea);
                    hole_regions.push_front(region);
                    hole_areas.push_front(area);
                    true
                } else if hole.back() == Some(&ea) {
                    // The segment matches the end of the hole boundary.
                    hole.push_back(eb);
                    hole_regions.push_back(region);
                    hole_areas.push_back(area);
                    true
                } else {
                    false
                };
                if added {
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

        // Generate temp vertex array for triangulation.
        let hole_vertices: Vec<U16Vec3> = hole.iter().map(|v| self.vertices[*v as usize]).collect();

        // Triangulate the hole.
        let (triangles, complete) = triangulate(&hole_vertices);
        if !complete {
            tracing::warn!(vertex = rem, "Hole triangulation returned bad results");
        }

        // Merge the hole triangles back to polygons.
        let mut polys = Vec::with_capacity(triangles.len());
        let mut tags = Vec::with_capacity(triangles.len());
        for t in &triangles {
            if t[0] == t[1] || t[0] == t[2] || t[1] == t[2] {
                continue;
            }
            let mut polygon = vec![Self::NULL_INDEX; nvp];
            for (slot, corner) in polygon.iter_mut().zip(t) {
                *slot = hole[*corner];
            }
            // If this polygon covers multiple region types then
            // mark it as such
            let region = if hole_regions[t[0]] != hole_regions[t[1]]
                || hole_regions[t[1]] != hole_regions[t[2]]
            {
                RegionId::NONE
            } else {
                hole_regions[t[0]]
            };
            polys.push(polygon);
            tags.push((region, hole_areas[t[0]]));
        }
        if polys.is_empty() {
            return Ok(());
        }

        // Merge polygons.
        if nvp > 3 {
            merge_polygons(&mut polys, &mut tags, &self.vertices, nvp);
        }

        // Store polygons.
        for (polygon, (region, area)) in polys.iter().zip(tags) {
            if self.polygon_count() >= max_polygons {
                break;
            }
            self.push_polygon(polygon, region, area);
        }
        Ok(())
    }

    fn build_adjacency(&mut self) {
        #[derive(Clone, Copy)]
        struct Edge {
            vert: [u16; 2],
            poly_edge: [usize; 2],
            poly: [usize; 2],
        }

        fn polygon_edges(polygon: &[u16]) -> impl Iterator<Item = (usize, u16, u16)> + '_ {
            let nv = count_poly_verts(polygon);
            (0..nv).map(move |j| (j, polygon[j], polygon[(j + 1) % nv]))
        }

        let nvp = self.max_vertices_per_polygon as usize;
        let mut edges: Vec<Edge> = Vec::with_capacity(self.polygons.len());
        let mut edges_by_vertex: Vec<Vec<usize>> = vec![Vec::new(); self.vertices.len()];

        for i in 0..self.polygon_count() {
            for (j, v0, v1) in polygon_edges(self.polygon(i)) {
                if v0 < v1 {
                    edges_by_vertex[v0 as usize].push(edges.len());
                    edges.push(Edge {
                        vert: [v0, v1],
                        poly_edge: [j, 0],
                        poly: [i, i],
                    });
                }
            }
        }

        for i in 0..self.polygon_count() {
            for (j, v0, v1) in polygon_edges(self.polygon(i)) {
                if v0 > v1 {
                    let shared = edges_by_vertex[v1 as usize].iter().copied().find(|e| {
                        let edge = &edges[*e];
                        edge.vert[1] == v0 && edge.poly[0] == edge.poly[1]
                    });
                    if let Some(e) = shared {
                        edges[e].poly[1] = i;
                        edges[e].poly_edge[1] = j;
                    }
                }
            }
        }

        // Store adjacency
        self.polygon_neighbors = vec![Self::NULL_INDEX; self.polygons.len()];
        for edge in &edges {
            if edge.poly[0] != edge.poly[1] {
                let [p0, p1] = edge.poly;
                let [e0, e1] = edge.poly_edge;
                self.polygon_neighbors[p0 * nvp + e0] = p1 as u16;
                self.polygon_neighbors[p1 * nvp + e1] = p0 as u16;
            }
        }
    }

    fn mark_portal_edges(&mut self, width: u16, height: u16) {
        let nvp = self.max_vertices_per_polygon as usize;
        for i in 0..self.polygon_count() {
            let nv = self.polygon_vertices(i).len();
            for j in 0..nv {
                // Skip connected edges.
                if self.polygon_neighbors[i * nvp + j] != Self::NULL_INDEX {
                    continue;
                }
                let polygon = self.polygon(i);
                let va = self.vertices[polygon[j] as usize];
                let vb = self.vertices[polygon[(j + 1) % nv] as usize];
                let side = if va.x == 0 && vb.x == 0 {
                    Some(0)
                } else if va.z == height && vb.z == height {
                    Some(1)
                } else if va.x == width && vb.x == width {
                    Some(2)
                } else if va.z == 0 && vb.z == 0 {
                    Some(3)
                } else {
                    None
                };
                if let Some(side) = side {
                    self.polygon_neighbors[i * nvp + j] = Self::EXTERNAL_LINK | side;
                }
            }
        }
    }
}

/// Deduplicates vertices that share their xz position and are at most 2 voxels apart vertically.
#[derive(Default)]
struct VertexLookup {
    buckets: HashMap<(u16, u16), Vec<u16>>,
}

impl VertexLookup {
    fn add(&mut self, v: U16Vec3, vertices: &mut Vec<U16Vec3>) -> u16 {
        let bucket = self.buckets.entry((v.x, v.z)).or_default();
        if let Some(existing) = bucket
            .iter()
            .copied()
            .find(|i| (vertices[*i as usize].y as i32 - v.y as i32).abs() <= 2)
        {
            return existing;
        }
        // Could not find, create new.
        let index = vertices.len() as u16;
        vertices.push(v);
        bucket.push(index);
        index
    }
}

pub(crate) fn count_poly_verts(polygon: &[u16]) -> usize {
    polygon
        .iter()
        .position(|v| *v == PolygonNavmesh::NULL_INDEX)
        .unwrap_or(polygon.len())
}

/// Greedily merges pairs of polygons that share an edge, longest shared edge first,
/// as long as the merged polygon stays convex and fits `nvp` vertices.
///
/// A merged polygon whose sources came from different regions gets [`RegionId::NONE`].
fn merge_polygons(
    polys: &mut Vec<Vec<u16>>,
    tags: &mut Vec<(RegionId, AreaType)>,
    vertices: &[U16Vec3],
    nvp: usize,
) {
    loop {
        // Find best polygons to merge.
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..polys.len() {
            for k in j + 1..polys.len() {
                let Some((value, ea, eb)) = poly_merge_value(&polys[j], &polys[k], vertices, nvp)
                else {
                    continue;
                };
                if best.is_none_or(|(best_value, ..)| value > best_value) {
                    best = Some((value, j, k, ea, eb));
                }
            }
        }

        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        // Found best, merge.
        polys[pa] = merge_poly_verts(&polys[pa], &polys[pb], ea, eb, nvp);
        if tags[pa].0 != tags[pb].0 {
            tags[pa].0 = RegionId::NONE;
        }
        polys.swap_remove(pb);
        tags.swap_remove(pb);
    }
}

/// The squared length of the edge shared by `pa` and `pb`, with the index of that edge in both,
/// if the two can be merged into one convex polygon.
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    vertices: &[U16Vec3],
    nvp: usize,
) -> Option<(i32, usize, usize)> {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);

    // If the merged polygon would be too big, do not merge.
    if na + nb - 2 > nvp {
        return None;
    }

    // Check if the polygons share an edge.
    let ordered = |a: u16, b: u16| if a > b { (b, a) } else { (a, b) };
    let (ea, eb) = (0..na).find_map(|i| {
        let edge_a = ordered(pa[i], pa[(i + 1) % na]);
        (0..nb)
            .find(|j| ordered(pb[*j], pb[(j + 1) % nb]) == edge_a)
            .map(|j| (i, j))
    })?;

    // Check to see if the merged polygon would be convex.
    let v = |i: u16| vertices[i as usize];
    if !grid::left(v(pa[(ea + na - 1) % na]), v(pa[ea]), v(pb[(eb + 2) % nb])) {
        return None;
    }
    if !grid::left(v(pb[(eb + nb - 1) % nb]), v(pb[eb]), v(pa[(ea + 2) % na])) {
        return None;
    }

    let va = v(pa[ea]);
    let vb = v(pa[(ea + 1) % na]);
    let dx = va.x as i32 - vb.x as i32;
    let dz = va.z as i32 - vb.z as i32;
    let value = dx * dx + dz * dz;
    (value > 0).then_some((value, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize, nvp: usize) -> Vec<u16> {
    let na = count_poly_verts(pa);
    let nb = count_poly_verts(pb);

    // Merge polygons.
    let mut merged = Vec::with_capacity(nvp);
    // Add pa
    merged.extend((0..na - 1).map(|i| pa[(ea + 1 + i) % na]));
    // Add pb
    merged.extend((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]));
    merged.resize(nvp, PolygonNavmesh::NULL_INDEX);
    merged
}

/// Ear clipping triangulation of a simple polygon, cutting the shortest diagonal first.
///
/// Returns triangles as indices into `vertices`, and `false` if the polygon could not be fully triangulated,
/// in which case the triangles found so far are returned.
pub(crate) fn triangulate(vertices: &[U16Vec3]) -> (Vec<[usize; 3]>, bool) {
    if vertices.len() < 3 {
        return (Vec::new(), false);
    }
    // Vertex index and whether the ear at this vertex can be cut.
    let mut indices: Vec<(usize, bool)> = (0..vertices.len()).map(|i| (i, false)).collect();
    let mut triangles = Vec::with_capacity(vertices.len() - 2);

    let n = indices.len();
    for i in 0..n {
        let i1 = grid::next(i, n);
        let i2 = grid::next(i1, n);
        if diagonal(i, i2, &indices, vertices) {
            indices[i1].1 = true;
        }
    }

    while indices.len() > 3 {
        let n = indices.len();
        let diagonal_length = |i: usize, i2: usize| {
            let p0 = vertices[indices[i].0];
            let p2 = vertices[indices[i2].0];
            let dx = p2.x as i32 - p0.x as i32;
            let dz = p2.z as i32 - p0.z as i32;
            dx * dx + dz * dz
        };

        let mut best: Option<(i32, usize)> = None;
        for i in 0..n {
            let i1 = grid::next(i, n);
            if indices[i1].1 {
                let length = diagonal_length(i, grid::next(i1, n));
                if best.is_none_or(|(min, _)| length < min) {
                    best = Some((length, i));
                }
            }
        }

        if best.is_none() {
            // We might get here because the contour has overlapping segments, like this:
            //
            //  A o-o=====o---o B
            //   /  |C   D|    \.
            //  o   o     o     o
            //  :   :     :     :
            //
            // We'll try to recover by loosing up the in_cone test a bit so that a diagonal
            // like A-B or C-D can be found and we can continue.
            for i in 0..n {
                let i2 = grid::next(grid::next(i, n), n);
                if diagonal_loose(i, i2, &indices, vertices) {
                    let length = diagonal_length(i, i2);
                    if best.is_none_or(|(min, _)| length < min) {
                        best = Some((length, i));
                    }
                }
            }
        }

        let Some((_, i)) = best else {
            // The contour is messed up. This sometimes happens
            // if the contour simplification is too aggressive.
            return (triangles, false);
        };

        let i1 = grid::next(i, n);
        let i2 = grid::next(i1, n);
        triangles.push([indices[i].0, indices[i1].0, indices[i2].0]);

        // Removes P[i1] by copying P[i+1]...P[n-1] left one index.
        indices.remove(i1);
        let n = indices.len();
        let i1 = if i1 >= n { 0 } else { i1 };
        let i = grid::prev(i1, n);
        // Update diagonal flags.
        indices[i].1 = diagonal(grid::prev(i, n), i1, &indices, vertices);
        indices[i1].1 = diagonal(i, grid::next(i1, n), &indices, vertices);
    }

    // Append the remaining triangle.
    triangles.push([indices[0].0, indices[1].0, indices[2].0]);
    (triangles, true)
}

type Indices = [(usize, bool)];

/// Whether the diagonal from `i` to `j` lies inside the polygon.
fn diagonal(i: usize, j: usize, indices: &Indices, vertices: &[U16Vec3]) -> bool {
    in_cone(i, j, indices, vertices, false) && diagonalie(i, j, indices, vertices, false)
}

fn diagonal_loose(i: usize, j: usize, indices: &Indices, vertices: &[U16Vec3]) -> bool {
    in_cone(i, j, indices, vertices, true) && diagonalie(i, j, indices, vertices, true)
}

/// Whether the diagonal from `i` to `j` lies in the cone of the vertex `i`.
fn in_cone(i: usize, j: usize, indices: &Indices, vertices: &[U16Vec3], loose: bool) -> bool {
    let n = indices.len();
    let v = |k: usize| vertices[indices[k].0];
    let pi = v(i);
    let pj = v(j);
    let pi1 = v(grid::next(i, n));
    let pin1 = v(grid::prev(i, n));

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if grid::left_on(pin1, pi, pi1) {
        return if loose {
            grid::left_on(pi, pj, pin1) && grid::left_on(pj, pi, pi1)
        } else {
            grid::left(pi, pj, pin1) && grid::left(pj, pi, pi1)
        };
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(grid::left_on(pi, pj, pi1) && grid::left_on(pj, pi, pin1))
}

/// Whether the diagonal from `i` to `j` does not cross any polygon edge.
/// The loose variant only rejects proper crossings.
fn diagonalie(i: usize, j: usize, indices: &Indices, vertices: &[U16Vec3], loose: bool) -> bool {
    let n = indices.len();
    let d0 = vertices[indices[i].0];
    let d1 = vertices[indices[j].0];

    // For each edge (k,k+1) of P
    for k in 0..n {
        let k1 = grid::next(k, n);
        // Skip edges incident to i or j
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = vertices[indices[k].0];
        let p1 = vertices[indices[k1].0];

        if grid::xz_equal(d0, p0)
            || grid::xz_equal(d1, p0)
            || grid::xz_equal(d0, p1)
            || grid::xz_equal(d1, p1)
        {
            continue;
        }

        let crosses = if loose {
            grid::intersect_prop(d0, d1, p0, p1)
        } else {
            grid::intersect(d0, d1, p0, p1)
        };
        if crosses {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use crate::{
        contours::BuildContoursFlags,
        test_utils::{compact_from, flat_compact},
        CompactHeightfield,
    };

    use super::*;

    fn poly_mesh_for(
        mut compact: CompactHeightfield,
        border_size: u16,
        nvp: u16,
    ) -> PolygonNavmesh {
        compact.build_distance_field();
        compact.build_regions(border_size, 0, 20).unwrap();
        compact
            .build_contours(1.3, 12, BuildContoursFlags::default())
            .into_polygon_mesh(nvp)
            .unwrap()
    }

    #[track_caller]
    fn assert_convex(mesh: &PolygonNavmesh) {
        for i in 0..mesh.polygon_count() {
            let polygon = mesh.polygon_vertices(i);
            assert!(polygon.len() >= 3, "polygon {i} is degenerate");
            assert!(polygon.len() <= mesh.max_vertices_per_polygon as usize);
            let n = polygon.len();
            for j in 0..n {
                let a = mesh.vertices[polygon[j] as usize];
                let b = mesh.vertices[polygon[(j + 1) % n] as usize];
                let c = mesh.vertices[polygon[(j + 2) % n] as usize];
                assert!(grid::left_on(a, b, c), "polygon {i} is not convex at vertex {j}");
            }
        }
    }

    #[track_caller]
    fn assert_symmetric_adjacency(mesh: &PolygonNavmesh) {
        for i in 0..mesh.polygon_count() {
            for &neighbor in mesh.neighbors(i) {
                if neighbor == PolygonNavmesh::NULL_INDEX
                    || neighbor & PolygonNavmesh::EXTERNAL_LINK != 0
                {
                    continue;
                }
                assert!(
                    mesh.neighbors(neighbor as usize).contains(&(i as u16)),
                    "polygon {i} links to {neighbor}, but not the other way around"
                );
            }
        }
    }

    #[test]
    fn triangulates_convex_quad() {
        let quad = [
            U16Vec3::new(0, 0, 0),
            U16Vec3::new(0, 0, 4),
            U16Vec3::new(4, 0, 4),
            U16Vec3::new(4, 0, 0),
        ];
        let (triangles, complete) = triangulate(&quad);
        assert!(complete);
        assert_eq!(triangles.len(), 2);
    }

    #[test]
    fn triangulates_concave_polygon() {
        // An L-shape.
        let l_shape = [
            U16Vec3::new(0, 0, 0),
            U16Vec3::new(0, 0, 4),
            U16Vec3::new(2, 0, 4),
            U16Vec3::new(2, 0, 2),
            U16Vec3::new(4, 0, 2),
            U16Vec3::new(4, 0, 0),
        ];
        let (triangles, complete) = triangulate(&l_shape);
        assert!(complete);
        assert_eq!(triangles.len(), 4);
        // The reflex corner is never cut off as an ear.
        let reflex_ear = triangles.iter().any(|t| t[1] == 3 && t[0] == 2 && t[2] == 4);
        assert!(!reflex_ear);
    }

    #[test]
    fn square_becomes_single_polygon() {
        let mesh = poly_mesh_for(flat_compact(6), 0, 6);
        assert_eq!(mesh.polygon_count(), 1);
        assert_eq!(mesh.polygon_vertices(0).len(), 4);
        assert_eq!(mesh.regions[0], RegionId::from(1));
        assert_eq!(mesh.flags, vec![0]);
        assert_convex(&mesh);
    }

    #[test]
    fn triangles_only_without_merging() {
        let mesh = poly_mesh_for(flat_compact(6), 0, 3);
        assert_eq!(mesh.polygon_count(), 2);
        assert_symmetric_adjacency(&mesh);
        assert_eq!(mesh.neighbors(0)[..3].iter().filter(|n| **n == 1).count(), 1);
    }

    #[test]
    fn concave_floor_gives_convex_polygons() {
        let compact = compact_from(16, 16, |x, z| x < 6 || z < 6 || (x > 10 && z > 10));
        let mesh = poly_mesh_for(compact, 0, 6);
        assert!(mesh.polygon_count() > 1);
        assert_convex(&mesh);
        assert_symmetric_adjacency(&mesh);
        assert_eq!(mesh.neighbors(0).len(), 6);
    }

    #[test]
    fn vertices_are_shared_between_polygons() {
        let compact = compact_from(12, 12, |x, z| x < 4 || z < 4);
        let mesh = poly_mesh_for(compact, 0, 6);
        for (i, a) in mesh.vertices.iter().enumerate() {
            for b in &mesh.vertices[i + 1..] {
                assert!(
                    a.x != b.x || a.z != b.z || (a.y as i32 - b.y as i32).abs() > 2,
                    "duplicate vertex {a}"
                );
            }
        }
    }

    #[test]
    fn border_vertices_are_removed() {
        let mesh = poly_mesh_for(flat_compact(12), 2, 6);
        assert!(mesh.polygon_count() >= 1);
        assert_convex(&mesh);
        assert_symmetric_adjacency(&mesh);
        for v in &mesh.vertices {
            assert!(v.x <= 8 && v.z <= 8);
        }
    }
}
