//! Height detail draped over the polygons of a [`PolygonNavmesh`].

use std::collections::VecDeque;

use glam::{Vec2, Vec3, Vec3A, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    CompactHeightfield,
    math::{dir_for_offset, dir_offset_x, dir_offset_z, distance_point_segment_sq_2d, grid},
    poly_mesh::PolygonNavmesh,
    region::RegionId,
};

/// Contains triangle meshes that represent detailed height data associated
/// with the polygons in its associated polygon mesh object.
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DetailNavmesh {
    /// The sub-mesh data, one per polygon of the source mesh.
    pub meshes: Vec<SubMesh>,
    /// The mesh vertices in world space.
    pub vertices: Vec<Vec3>,
    /// The mesh triangles. Indices are relative to [`SubMesh::base_vertex_index`] of the owning sub-mesh.
    pub triangles: Vec<[u8; 3]>,
    /// Per triangle edge flags, parallel to [`Self::triangles`].
    ///
    /// Bits `2 * j` hold [`DetailNavmesh::EDGE_BOUNDARY`] if edge `j` lies on the polygon outline.
    pub triangle_flags: Vec<u8>,
}

/// The part of a [`DetailNavmesh`] that belongs to one polygon.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SubMesh {
    /// Index of the first vertex in [`DetailNavmesh::vertices`]
    pub base_vertex_index: u32,
    /// Number of vertices
    pub vertex_count: u32,
    /// Index of the first triangle in [`DetailNavmesh::triangles`]
    pub base_triangle_index: u32,
    /// Number of triangles
    pub triangle_count: u32,
}

impl SubMesh {
    /// The vertices of this sub-mesh.
    pub fn vertices<'a>(&self, detail: &'a DetailNavmesh) -> &'a [Vec3] {
        let start = self.base_vertex_index as usize;
        &detail.vertices[start..start + self.vertex_count as usize]
    }

    /// The triangles of this sub-mesh.
    pub fn triangles<'a>(&self, detail: &'a DetailNavmesh) -> &'a [[u8; 3]] {
        let start = self.base_triangle_index as usize;
        &detail.triangles[start..start + self.triangle_count as usize]
    }
}

/// Errors that can occur while building a [`DetailNavmesh`].
#[derive(Debug, Error)]
pub enum DetailMeshError {
    /// No span of the compact heightfield was found near the vertices of a polygon.
    #[error("Found no span to seed the height data of polygon {polygon}")]
    NoSeedSpan {
        /// The index of the polygon.
        polygon: usize,
    },
}

const UNSET_HEIGHT: u16 = 0xffff;
const MAX_VERTS: usize = 127;
// Max tris for delaunay is 2n-2-k (n=num verts, k=num hull verts).
const MAX_TRIS: usize = 255;
const MAX_VERTS_PER_EDGE: usize = 32;

impl DetailNavmesh {
    /// Flag of a triangle edge that lies on the outline of its polygon.
    pub const EDGE_BOUNDARY: u8 = 0x1;

    /// Builds a detail mesh from the provided polygon mesh.
    ///
    /// The height of each polygon is sampled from the compact heightfield every `sample_distance` world units
    /// and points are added until the surface is within `sample_max_error` of the samples.
    /// A `sample_distance` of zero only triangulates the polygons.
    ///
    /// # Errors
    ///
    /// Returns an error if a polygon has no span of the heightfield near its vertices.
    pub fn new(
        mesh: &PolygonNavmesh,
        heightfield: &CompactHeightfield,
        sample_distance: f32,
        sample_max_error: f32,
    ) -> Result<Self, DetailMeshError> {
        let mut detail = DetailNavmesh::default();
        if mesh.vertices.is_empty() || mesh.polygon_count() == 0 {
            return Ok(detail);
        }
        let cs = mesh.cell_size;
        let ch = mesh.cell_height;
        let origin = Vec3A::from(mesh.aabb.min);
        let sampler = Sampler {
            heightfield,
            sample_distance,
            sample_max_error,
            height_search_radius: 1.max(mesh.max_edge_error.ceil() as i32),
        };

        // Find max size for a polygon area.
        let bounds: Vec<PatchBounds> = (0..mesh.polygon_count())
            .map(|i| PatchBounds::new(mesh, heightfield, i))
            .collect();
        let max_patch = bounds
            .iter()
            .map(|b| (b.width() * b.height()).max(0) as usize)
            .max()
            .unwrap_or_default();

        let mut patch = HeightPatch {
            data: Vec::with_capacity(max_patch),
            ..Default::default()
        };
        let mut queue = VecDeque::with_capacity(512);
        let vertex_capacity = mesh.polygons.len() * 3 / 2;
        detail.meshes.reserve(mesh.polygon_count());
        detail.vertices.reserve(vertex_capacity);
        detail.triangles.reserve(vertex_capacity * 2);
        detail.triangle_flags.reserve(vertex_capacity * 2);

        for (i, bounds) in bounds.iter().enumerate() {
            let polygon = mesh.polygon_vertices(i);

            // Store polygon vertices for processing.
            let local: Vec<Vec3A> = polygon
                .iter()
                .map(|v| {
                    let v = mesh.vertices[*v as usize].as_vec3();
                    Vec3A::new(v.x * cs, v.y * ch, v.z * cs)
                })
                .collect();

            let submesh = if bounds.width() <= 0 || bounds.height() <= 0 {
                tracing::warn!(polygon = i, "Polygon has an empty height patch");
                PolyDetail::outline(&local)
            } else {
                // Get the height data from the area of the polygon.
                patch.reset(bounds);
                patch.fill_from(heightfield, mesh, i, &mut queue)?;

                // Build detail mesh.
                sampler.build_poly_detail(&local, &patch)
            };

            let base_vertex_index = detail.vertices.len() as u32;
            let base_triangle_index = detail.triangles.len() as u32;
            // Move detail verts to world space.
            let offset = origin + Vec3A::new(0.0, heightfield.cell_height, 0.0);
            detail
                .vertices
                .extend(submesh.vertices.iter().map(|v| Vec3::from(*v + offset)));
            for triangle in &submesh.triangles {
                detail
                    .triangles
                    .push([triangle[0] as u8, triangle[1] as u8, triangle[2] as u8]);
                detail.triangle_flags.push(triangle_flags(triangle, &submesh.hull));
            }
            detail.meshes.push(SubMesh {
                base_vertex_index,
                vertex_count: submesh.vertices.len() as u32,
                base_triangle_index,
                triangle_count: submesh.triangles.len() as u32,
            });
        }

        tracing::debug!(
            vertices = detail.vertices.len(),
            triangles = detail.triangles.len(),
            "Built detail mesh"
        );
        Ok(detail)
    }

    /// The number of sub-meshes, equal to the polygon count of the source mesh.
    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }
}

struct Sampler<'a> {
    heightfield: &'a CompactHeightfield,
    sample_distance: f32,
    sample_max_error: f32,
    height_search_radius: i32,
}

/// The detail triangulation of one polygon, in coordinates local to the mesh origin.
struct PolyDetail {
    vertices: Vec<Vec3A>,
    triangles: Vec<[usize; 3]>,
    hull: Vec<usize>,
}

impl PolyDetail {
    fn outline(polygon: &[Vec3A]) -> Self {
        let hull: Vec<usize> = (0..polygon.len()).collect();
        Self {
            triangles: triangulate_hull(polygon, &hull, polygon.len()),
            vertices: polygon.to_vec(),
            hull,
        }
    }
}

impl Sampler<'_> {
    fn build_poly_detail(&self, polygon: &[Vec3A], patch: &HeightPatch) -> PolyDetail {
        let sample_distance = self.sample_distance;
        let ch = self.heightfield.cell_height;
        let nin = polygon.len();
        let mut vertices = polygon.to_vec();
        let mut hull = Vec::with_capacity(MAX_VERTS);

        // Calculate minimum extents of the polygon based on input data.
        let min_extent_sq = poly_min_extent_sq(polygon);

        // Tessellate outlines.
        // This is done in separate pass in order to ensure
        // seamless height values across the ply boundaries.
        if sample_distance > 0.0 {
            for i in 0..nin {
                let j = grid::prev(i, nin);
                let mut vj = polygon[j];
                let mut vi = polygon[i];
                let mut swapped = false;
                // Make sure the segments are always handled in same order
                // using lexological sort or else there will be seams.
                if (vj.x - vi.x).abs() < 1.0e-6 {
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
                let nn = (1 + (d / sample_distance).floor() as usize)
                    .min(MAX_VERTS_PER_EDGE - 1)
                    .min((MAX_VERTS - 1).saturating_sub(vertices.len()))
                    .max(1);
                let edge: Vec<Vec3A> = (0..=nn)
                    .map(|k| {
                        let mut pos = vj + delta * (k as f32 / nn as f32);
                        pos.y = self.height(pos, patch) as f32 * ch;
                        pos
                    })
                    .collect();

                // Simplify samples.
                let mut idx = vec![0, nn];
                let mut k = 0;
                while k + 1 < idx.len() {
                    let (a, b) = (idx[k], idx[k + 1]);
                    // Find maximum deviation along the segment.
                    let mut max_deviation = 0.0;
                    let mut max_index = None;
                    for m in a + 1..b {
                        let deviation = distance_point_segment_sq(edge[m], edge[a], edge[b]);
                        if deviation > max_deviation {
                            max_deviation = deviation;
                            max_index = Some(m);
                        }
                    }
                    // If the max deviation is larger than accepted error,
                    // add new point, else continue to next segment.
                    let max_error_sq = self.sample_max_error * self.sample_max_error;
                    match max_index {
                        Some(m) if max_deviation > max_error_sq => {
                            idx.insert(k + 1, m);
                        }
                        _ => k += 1,
                    }
                }

                hull.push(j);
                // Add new vertices.
                let inner = &idx[1..idx.len() - 1];
                let mut push = |k: &usize| {
                    hull.push(vertices.len());
                    vertices.push(edge[*k]);
                };
                if swapped {
                    inner.iter().rev().for_each(&mut push);
                } else {
                    inner.iter().for_each(&mut push);
                }
            }
        } else {
            hull.extend(0..nin);
        }

        // Tessellate the base mesh.
        // We're using the triangulate_hull instead of delaunay_hull as it tends to
        // create a bit better triangulation for long thin triangles when there
        // are no internal points.
        let mut triangles = triangulate_hull(&vertices, &hull, nin);

        // If the polygon minimum extent is small (sliver or small triangle), do not try to add internal points.
        if min_extent_sq < (sample_distance * 2.0) * (sample_distance * 2.0) {
            return PolyDetail {
                vertices,
                triangles,
                hull,
            };
        }

        if triangles.is_empty() {
            // Could not triangulate the poly, make sure there is some valid data there.
            tracing::warn!(vertices = vertices.len(), "Could not triangulate polygon");
            return PolyDetail {
                vertices,
                triangles,
                hull,
            };
        }

        if sample_distance > 0.0 {
            let samples = self.grid_samples(polygon, patch);
            let mut added = vec![false; samples.len()];
            let cs = self.heightfield.cell_size;

            // Add the samples starting from the one that has the most
            // error. The procedure stops when all samples are added
            // or when the max error is within treshold.
            for _ in 0..samples.len() {
                if vertices.len() >= MAX_VERTS {
                    break;
                }

                // Find sample with most error.
                let mut best: Option<(f32, usize, Vec3A)> = None;
                for (i, sample) in samples.iter().enumerate() {
                    if added[i] {
                        continue;
                    }
                    // The sample location is jittered to get rid of some bad triangulations
                    // which are cause by symmetrical data from the grid structure.
                    let pt = Vec3A::new(
                        sample.x + jitter_x(i) * cs * 0.1,
                        sample.y,
                        sample.z + jitter_z(i) * cs * 0.1,
                    );
                    let Some(d) = dist_to_tri_mesh(pt, &vertices, &triangles) else {
                        // did not hit the mesh.
                        continue;
                    };
                    if best.is_none_or(|(best_d, ..)| d > best_d) {
                        best = Some((d, i, pt));
                    }
                }
                // If the max error is within accepted threshold, stop tesselating.
                let Some((d, i, pt)) = best else {
                    break;
                };
                if d <= self.sample_max_error {
                    break;
                }
                // Mark sample as added.
                added[i] = true;
                // Add the new sample point.
                vertices.push(pt);

                // Create new triangulation.
                triangles = delaunay_hull(&vertices, &hull);
            }
        }

        if triangles.len() > MAX_TRIS {
            tracing::error!(
                triangles = triangles.len(),
                max = MAX_TRIS,
                "Too many detail triangles, shrinking"
            );
            triangles.truncate(MAX_TRIS);
        }
        PolyDetail {
            vertices,
            triangles,
            hull,
        }
    }

    /// Sample locations on a grid inside the polygon, away from its edges.
    fn grid_samples(&self, polygon: &[Vec3A], patch: &HeightPatch) -> Vec<Vec3A> {
        let sample_distance = self.sample_distance;
        let (min, max) = polygon
            .iter()
            .fold((polygon[0], polygon[0]), |(min, max), v| (min.min(*v), max.max(*v)));
        let x0 = (min.x / sample_distance).floor() as i32;
        let x1 = (max.x / sample_distance).ceil() as i32;
        let z0 = (min.z / sample_distance).floor() as i32;
        let z1 = (max.z / sample_distance).ceil() as i32;

        let mut samples = Vec::new();
        for z in z0..z1 {
            for x in x0..x1 {
                let mut pt = Vec3A::new(
                    x as f32 * sample_distance,
                    (max.y + min.y) * 0.5,
                    z as f32 * sample_distance,
                );
                // Make sure the samples are not too close to the edges.
                if signed_dist_to_poly(polygon, pt) > -sample_distance / 2.0 {
                    continue;
                }
                pt.y = self.height(pt, patch) as f32 * self.heightfield.cell_height;
                samples.push(pt);
            }
        }
        samples
    }

    /// The height of the patch under `pos`, in voxels.
    fn height(&self, pos: Vec3A, patch: &HeightPatch) -> u16 {
        let ics = 1.0 / self.heightfield.cell_size;
        let ch = self.heightfield.cell_height;
        let ix = (pos.x * ics + 0.01).floor() as i32;
        let iz = (pos.z * ics + 0.01).floor() as i32;
        let ix = (ix - patch.xmin).min(patch.width - 1).max(0);
        let iz = (iz - patch.zmin).min(patch.height - 1).max(0);
        let mut h = patch.at(ix, iz);
        if h != UNSET_HEIGHT {
            return h;
        }

        // Special case when data might be bad.
        // Walk adjacent cells in a spiral up to `height_search_radius`, and look
        // for a pixel which has a valid height.
        let (mut x, mut z) = (1, 0);
        let (mut dx, mut dz) = (1, 0);
        let max_size = self.height_search_radius * 2 + 1;
        let max_iter = max_size * max_size - 1;

        let mut next_ring_iter_start = 8;
        let mut next_ring_iters = 16;

        let mut dmin = f32::MAX;
        for i in 0..max_iter {
            let nx = ix + x;
            let nz = iz + z;
            if nx >= 0 && nz >= 0 && nx < patch.width && nz < patch.height {
                let nh = patch.at(nx, nz);
                if nh != UNSET_HEIGHT {
                    let d = (nh as f32 * ch - pos.y).abs();
                    if d < dmin {
                        h = nh;
                        dmin = d;
                    }
                }
            }
            // Each ring around the center has 8 more cells than the previous one.
            // Stop at the end of the first ring that found a height, so the closest ring wins.
            if i + 1 == next_ring_iter_start {
                if h != UNSET_HEIGHT {
                    break;
                }
                next_ring_iter_start += next_ring_iters;
                next_ring_iters += 8;
            }

            if x == z || (x < 0 && x == -z) || (x > 0 && x == 1 - z) {
                (dx, dz) = (-dz, dx);
            }
            x += dx;
            z += dz;
        }
        h
    }
}

/// Cell bounds of a polygon, grown by one cell and clamped to the heightfield.
struct PatchBounds {
    xmin: i32,
    xmax: i32,
    zmin: i32,
    zmax: i32,
}

impl PatchBounds {
    fn new(mesh: &PolygonNavmesh, heightfield: &CompactHeightfield, polygon: usize) -> Self {
        let mut bounds = Self {
            xmin: heightfield.width as i32,
            xmax: 0,
            zmin: heightfield.height as i32,
            zmax: 0,
        };
        for v in mesh.polygon_vertices(polygon) {
            let v = mesh.vertices[*v as usize];
            bounds.xmin = bounds.xmin.min(v.x as i32);
            bounds.xmax = bounds.xmax.max(v.x as i32);
            bounds.zmin = bounds.zmin.min(v.z as i32);
            bounds.zmax = bounds.zmax.max(v.z as i32);
        }
        bounds.xmin = (bounds.xmin - 1).max(0);
        bounds.xmax = (bounds.xmax + 1).min(heightfield.width as i32);
        bounds.zmin = (bounds.zmin - 1).max(0);
        bounds.zmax = (bounds.zmax + 1).min(heightfield.height as i32);
        bounds
    }

    #[inline]
    fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    #[inline]
    fn height(&self) -> i32 {
        self.zmax - self.zmin
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct HeightPatch {
    data: Vec<u16>,
    xmin: i32,
    zmin: i32,
    width: i32,
    height: i32,
}

/// A span of the compact heightfield queued during the height patch flood fill.
/// Coordinates include the border.
#[derive(Debug, Clone, Copy)]
struct PatchSeed {
    x: i32,
    z: i32,
    index: usize,
}

impl HeightPatch {
    fn reset(&mut self, bounds: &PatchBounds) {
        self.xmin = bounds.xmin;
        self.zmin = bounds.zmin;
        self.width = bounds.width();
        self.height = bounds.height();
        self.data.clear();
        self.data.resize((self.width * self.height) as usize, UNSET_HEIGHT);
    }

    #[inline]
    fn at(&self, x: i32, z: i32) -> u16 {
        self.data[(x + z * self.width) as usize]
    }

    #[inline]
    fn at_mut(&mut self, x: i32, z: i32) -> &mut u16 {
        &mut self.data[(x + z * self.width) as usize]
    }

    #[inline]
    fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width && z >= 0 && z < self.height
    }

    /// Collects the heights under polygon `polygon` of `mesh`.
    ///
    /// Reads from the compact heightfield are offset by the border size
    /// since the border offset is already removed from the polygon mesh vertices.
    fn fill_from(
        &mut self,
        chf: &CompactHeightfield,
        mesh: &PolygonNavmesh,
        polygon: usize,
        queue: &mut VecDeque<PatchSeed>,
    ) -> Result<(), DetailMeshError> {
        let bs = mesh.border_size as i32;
        let region = mesh.regions[polygon];
        queue.clear();
        self.data.fill(UNSET_HEIGHT);

        let mut empty = true;

        // We cannot sample from this poly if it was created from polys
        // of different regions. If it was then it could potentially be overlapping
        // with polys of that region and the heights sampled here could be wrong.
        if region != RegionId::NONE {
            // Copy the height from the same region, and mark region borders
            // as seed points to fill the rest.
            for hz in 0..self.height {
                let z = self.zmin + hz + bs;
                for hx in 0..self.width {
                    let x = self.xmin + hx + bs;
                    if !chf.contains(x, z) {
                        continue;
                    }
                    let cell = chf.cell_at(x as u16, z as u16);
                    let Some(i) = cell.index_range().find(|i| chf.spans[*i].region == region)
                    else {
                        continue;
                    };
                    // Store height
                    *self.at_mut(hx, hz) = chf.spans[i].y;
                    empty = false;

                    // If any of the neighbours is not in same region,
                    // add the current location as flood fill start
                    let border = (0..4).any(|dir| {
                        chf.neighbor_index(x, z, i, dir)
                            .is_some_and(|a_i| chf.spans[a_i].region != region)
                    });
                    if border {
                        queue.push_back(PatchSeed { x, z, index: i });
                    }
                }
            }
        }

        // if the polygon does not contain any points from the current region (rare, but happens)
        // or if it could potentially be overlapping polygons of the same region,
        // then use the center as the seed point.
        if empty {
            self.seed_with_poly_center(chf, mesh, polygon, queue)?;
        }

        // We assume the seed is centered in the polygon, so a BFS to collect
        // height data will ensure we do not move onto overlapping polygons and
        // sample wrong heights.
        while let Some(seed) = queue.pop_front() {
            let span = &chf.spans[seed.index];
            for dir in 0..4 {
                let Some(con) = span.con(dir) else {
                    continue;
                };
                let a_x = seed.x + dir_offset_x(dir) as i32;
                let a_z = seed.z + dir_offset_z(dir) as i32;
                let hx = a_x - self.xmin - bs;
                let hz = a_z - self.zmin - bs;
                if !self.contains(hx, hz) || self.at(hx, hz) != UNSET_HEIGHT {
                    continue;
                }
                let (_, _, a_i) = chf.con_indices(seed.x, seed.z, dir, con);
                *self.at_mut(hx, hz) = chf.spans[a_i].y;
                queue.push_back(PatchSeed {
                    x: a_x,
                    z: a_z,
                    index: a_i,
                });
            }
        }
        Ok(())
    }

    /// Walks from the span closest to a polygon vertex towards the polygon center and seeds the flood fill there.
    fn seed_with_poly_center(
        &mut self,
        chf: &CompactHeightfield,
        mesh: &PolygonNavmesh,
        polygon: usize,
        queue: &mut VecDeque<PatchSeed>,
    ) -> Result<(), DetailMeshError> {
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
        let bs = mesh.border_size as i32;
        let vertices: Vec<_> = mesh
            .polygon_vertices(polygon)
            .iter()
            .map(|v| mesh.vertices[*v as usize])
            .collect();

        // Find cell closest to a poly vertex
        let mut start: Option<PatchSeed> = None;
        let mut dmin = UNSET_HEIGHT as i32;
        'search: for v in &vertices {
            for (ox, oz) in OFFSET {
                if dmin <= 0 {
                    break 'search;
                }
                let a_x = v.x as i32 + ox;
                let a_z = v.z as i32 + oz;
                if !self.contains(a_x - self.xmin, a_z - self.zmin)
                    || !chf.contains(a_x + bs, a_z + bs)
                {
                    continue;
                }
                let cell = chf.cell_at((a_x + bs) as u16, (a_z + bs) as u16);
                for i in cell.index_range() {
                    let d = (v.y as i32 - chf.spans[i].y as i32).abs();
                    if d < dmin {
                        start = Some(PatchSeed {
                            x: a_x,
                            z: a_z,
                            index: i,
                        });
                        dmin = d;
                    }
                }
            }
        }
        let start = start.ok_or(DetailMeshError::NoSeedSpan { polygon })?;

        // Find center of the polygon
        let n = vertices.len() as i32;
        let pcx = vertices.iter().map(|v| v.x as i32).sum::<i32>() / n;
        let pcz = vertices.iter().map(|v| v.z as i32).sum::<i32>() / n;

        // DFS to move to the center. Note that we need a DFS here and can not just move
        // directly towards the center without recording intermediate nodes, even though the polygons
        // are convex. In very rare cases we can get stuck due to contour simplification if we do not
        // record nodes.
        let mut stack = vec![start];
        let mut dirs = [0_u8, 1, 2, 3];
        self.data.fill(0);
        let mut current = start;
        while let Some(seed) = stack.pop() {
            current = seed;
            if seed.x == pcx && seed.z == pcz {
                break;
            }

            // If we are already at the correct X-position, prefer direction
            // directly towards the center in the Z-axis; otherwise prefer
            // direction in the X-axis
            let direct_dir = if seed.x == pcx {
                dir_for_offset(0, if pcz > seed.z { 1 } else { -1 })
            } else {
                dir_for_offset(if pcx > seed.x { 1 } else { -1 }, 0)
            }
            .unwrap_or(3) as usize;

            // Push the direct dir last so we start with this on next iteration
            dirs.swap(direct_dir, 3);

            let span = &chf.spans[seed.index];
            for dir in dirs {
                let Some(con) = span.con(dir) else {
                    continue;
                };
                let new_x = seed.x + dir_offset_x(dir) as i32;
                let new_z = seed.z + dir_offset_z(dir) as i32;
                let hx = new_x - self.xmin;
                let hz = new_z - self.zmin;
                if !self.contains(hx, hz) || self.at(hx, hz) != 0 {
                    continue;
                }
                *self.at_mut(hx, hz) = 1;
                let (_, _, index) = chf.con_indices(seed.x + bs, seed.z + bs, dir, con);
                stack.push(PatchSeed {
                    x: new_x,
                    z: new_z,
                    index,
                });
            }
            dirs.swap(direct_dir, 3);

            if stack.is_empty() {
                tracing::warn!(polygon, "Walk towards polygon center failed to reach center");
            }
        }

        // Flood fill seeds are given in coordinates with borders
        queue.clear();
        queue.push_back(PatchSeed {
            x: current.x + bs,
            z: current.z + bs,
            index: current.index,
        });
        self.data.fill(UNSET_HEIGHT);
        *self.at_mut(current.x - self.xmin, current.z - self.zmin) = chf.spans[current.index].y;
        Ok(())
    }
}

fn distance_point_segment_sq(pt: Vec3A, p: Vec3A, q: Vec3A) -> f32 {
    let pq = q - p;
    let d = pt - p;
    let len_sq = pq.length_squared();
    let mut t = pq.dot(d);
    if len_sq > 0.0 {
        t /= len_sq;
    }
    let t = t.clamp(0.0, 1.0);
    (p + pq * t - pt).length_squared()
}

/// Minimum extent of the polygon, squared.
fn poly_min_extent_sq(vertices: &[Vec3A]) -> f32 {
    let n = vertices.len();
    let mut min_dist = f32::MAX;
    for i in 0..n {
        let ni = grid::next(i, n);
        let p1 = vertices[i].xz();
        let p2 = vertices[ni].xz();
        let max_edge_dist = (0..n)
            .filter(|j| *j != i && *j != ni)
            .map(|j| distance_point_segment_sq_2d(vertices[j].xz(), p1, p2))
            .fold(0.0_f32, f32::max);
        min_dist = min_dist.min(max_edge_dist);
    }
    min_dist
}

/// Distance from `p` to the polygon outline on the xz-plane. Negative inside the polygon.
fn signed_dist_to_poly(vertices: &[Vec3A], p: Vec3A) -> f32 {
    let mut dmin = f32::MAX;
    let mut inside = false;
    let n = vertices.len();
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[grid::prev(i, n)];
        if (vi.z > p.z) != (vj.z > p.z) && p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x
        {
            inside = !inside;
        }
        dmin = dmin.min(distance_point_segment_sq_2d(p.xz(), vj.xz(), vi.xz()));
    }
    let dmin = dmin.sqrt();
    if inside { -dmin } else { dmin }
}

fn dist_to_tri_mesh(p: Vec3A, vertices: &[Vec3A], triangles: &[[usize; 3]]) -> Option<f32> {
    triangles
        .iter()
        .filter_map(|t| dist_pt_tri(p, vertices[t[0]], vertices[t[1]], vertices[t[2]]))
        .reduce(f32::min)
}

/// Vertical distance from `p` to the triangle `a`, `b`, `c`.
/// Returns `None` if the point is outside the triangle on the xz-plane.
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
    const EPS: f32 = 1.0e-4;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        let y = a.y + v0.y * u + v1.y * v;
        Some((y - p.y).abs())
    } else {
        None
    }
}

fn jitter_x(i: usize) -> f32 {
    (((i as u32).wrapping_mul(0x8da6b343) & 0xffff) as f32 / 65535.0 * 2.0) - 1.0
}

fn jitter_z(i: usize) -> f32 {
    (((i as u32).wrapping_mul(0xd8163841) & 0xffff) as f32 / 65535.0 * 2.0) - 1.0
}

/// Marks the edges of `triangle` that lie on the hull.
fn triangle_flags(triangle: &[usize; 3], hull: &[usize]) -> u8 {
    let mut flags = 0;
    for j in 0..3 {
        if on_hull(triangle[j], triangle[(j + 1) % 3], hull) {
            flags |= DetailNavmesh::EDGE_BOUNDARY << (j * 2);
        }
    }
    flags
}

fn on_hull(a: usize, b: usize, hull: &[usize]) -> bool {
    // All internal sampled points come after the hull so we can early out for those.
    let n = hull.len();
    if a >= n || b >= n {
        return false;
    }
    (0..n).any(|i| hull[grid::prev(i, n)] == a && hull[i] == b)
}

/// Fans the hull into triangles, stepping along whichever side gives the shorter perimeter.
fn triangulate_hull(vertices: &[Vec3A], hull: &[usize], nin: usize) -> Vec<[usize; 3]> {
    let n = hull.len();
    if n < 3 {
        return Vec::new();
    }
    let mut start = 0;
    let mut left = 1;
    let mut right = n - 1;

    // Start from an ear with shortest perimeter.
    // This tends to favor well formed triangles as starting point.
    let mut dmin = f32::MAX;
    for i in 0..n {
        if hull[i] >= nin {
            // Ears are triangles with original vertices as middle vertex while others are actually line segments on edges
            continue;
        }
        let pi = grid::prev(i, n);
        let ni = grid::next(i, n);
        let pv = vertices[hull[pi]].xz();
        let cv = vertices[hull[i]].xz();
        let nv = vertices[hull[ni]].xz();
        let d = pv.distance(cv) + cv.distance(nv) + nv.distance(pv);
        if d < dmin {
            start = i;
            left = ni;
            right = pi;
            dmin = d;
        }
    }

    // Add first triangle
    let mut triangles = Vec::with_capacity(n - 2);
    triangles.push([hull[start], hull[left], hull[right]]);

    // Triangulate the polygon by moving left or right,
    // depending on which triangle has shorter perimeter.
    while grid::next(left, n) != right {
        let nleft = grid::next(left, n);
        let nright = grid::prev(right, n);

        let cvleft = vertices[hull[left]].xz();
        let nvleft = vertices[hull[nleft]].xz();
        let cvright = vertices[hull[right]].xz();
        let nvright = vertices[hull[nright]].xz();
        let dleft = cvleft.distance(nvleft) + nvleft.distance(cvright);
        let dright = cvright.distance(nvright) + cvleft.distance(nvright);
        if dleft < dright {
            triangles.push([hull[left], hull[nleft], hull[right]]);
            left = nleft;
        } else {
            triangles.push([hull[left], hull[nright], hull[right]]);
            right = nright;
        }
    }
    triangles
}

/// The face on one side of a Delaunay edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Undefined,
    Hull,
    Index(usize),
}

#[derive(Debug, Clone, Copy)]
struct DelaunayEdge {
    s: usize,
    t: usize,
    left: Face,
    right: Face,
}

impl DelaunayEdge {
    fn update_left_face(&mut self, s: usize, t: usize, face: Face) {
        if self.s == s && self.t == t && self.left == Face::Undefined {
            self.left = face;
        } else if self.t == s && self.s == t && self.right == Face::Undefined {
            self.right = face;
        }
    }
}

/// Incremental Delaunay triangulation bounded by a hull.
struct Delaunay<'a> {
    points: &'a [Vec3A],
    edges: Vec<DelaunayEdge>,
    max_edges: usize,
    face_count: usize,
}

fn delaunay_hull(points: &[Vec3A], hull: &[usize]) -> Vec<[usize; 3]> {
    let mut delaunay = Delaunay {
        points,
        edges: Vec::with_capacity(points.len() * 3),
        max_edges: points.len() * 10,
        face_count: 0,
    };
    let n = hull.len();
    for i in 0..n {
        delaunay.add_edge(hull[grid::prev(i, n)], hull[i], Face::Hull, Face::Undefined);
    }

    let mut current = 0;
    while current < delaunay.edges.len() {
        if delaunay.edges[current].left == Face::Undefined {
            delaunay.complete_facet(current);
        }
        if delaunay.edges[current].right == Face::Undefined {
            delaunay.complete_facet(current);
        }
        current += 1;
    }

    // Create tris
    let mut faces = vec![[None::<usize>; 3]; delaunay.face_count];
    for edge in &delaunay.edges {
        if let Face::Index(f) = edge.right {
            let t = &mut faces[f];
            if t[0].is_none() {
                t[0] = Some(edge.s);
                t[1] = Some(edge.t);
            } else if t[0] == Some(edge.t) {
                t[2] = Some(edge.s);
            } else if t[1] == Some(edge.s) {
                t[2] = Some(edge.t);
            }
        }
        if let Face::Index(f) = edge.left {
            let t = &mut faces[f];
            if t[0].is_none() {
                t[0] = Some(edge.t);
                t[1] = Some(edge.s);
            } else if t[0] == Some(edge.s) {
                t[2] = Some(edge.t);
            } else if t[1] == Some(edge.t) {
                t[2] = Some(edge.s);
            }
        }
    }

    faces
        .into_iter()
        .enumerate()
        .filter_map(|(i, face)| match face {
            [Some(a), Some(b), Some(c)] => Some([a, b, c]),
            _ => {
                tracing::warn!(face = i, "Removing dangling face");
                None
            }
        })
        .collect()
}

impl Delaunay<'_> {
    fn find_edge(&self, s: usize, t: usize) -> Option<usize> {
        self.edges
            .iter()
            .position(|e| (e.s == s && e.t == t) || (e.s == t && e.t == s))
    }

    fn add_edge(&mut self, s: usize, t: usize, left: Face, right: Face) {
        if self.edges.len() >= self.max_edges {
            tracing::error!(max = self.max_edges, "Too many Delaunay edges");
            return;
        }
        // Add edge if not already in the triangulation.
        if self.find_edge(s, t).is_none() {
            self.edges.push(DelaunayEdge { s, t, left, right });
        }
    }

    fn complete_facet(&mut self, e: usize) {
        const EPS: f32 = 1e-5;
        const TOLERANCE: f32 = 0.001;
        let edge = self.edges[e];

        // Cache s and t.
        let (s, t) = if edge.left == Face::Undefined {
            (edge.s, edge.t)
        } else if edge.right == Face::Undefined {
            (edge.t, edge.s)
        } else {
            // Edge already completed.
            return;
        };

        // Find best point on left of edge.
        let points = self.points;
        let mut best = None;
        let mut center = Vec2::ZERO;
        let mut radius = -1.0;
        for u in 0..points.len() {
            if u == s || u == t || cross2(points[s], points[t], points[u]) <= EPS {
                continue;
            }
            if radius >= 0.0 {
                let d = center.distance(points[u].xz());
                if d > radius * (1.0 + TOLERANCE) {
                    // Outside current circumcircle, skip.
                    continue;
                }
                if d >= radius * (1.0 - TOLERANCE)
                    && (self.overlaps_edges(s, u) || self.overlaps_edges(t, u))
                {
                    // Inside epsilon circum circle, and s-u or t-u would cross an existing edge.
                    continue;
                }
            }
            best = Some(u);
            (center, radius) = circum_circle(points[s], points[t], points[u]);
        }

        // Add new triangle or update edge info if s-t is on hull.
        let Some(pt) = best else {
            self.edges[e].update_left_face(s, t, Face::Hull);
            return;
        };
        let face = Face::Index(self.face_count);
        // Update face information of edge being completed.
        self.edges[e].update_left_face(s, t, face);

        // Add new edge or update face info of old edge.
        for (a, b) in [(pt, s), (t, pt)] {
            match self.find_edge(a, b) {
                Some(existing) => self.edges[existing].update_left_face(a, b, face),
                None => self.add_edge(a, b, face, Face::Undefined),
            }
        }
        self.face_count += 1;
    }

    fn overlaps_edges(&self, s1: usize, t1: usize) -> bool {
        let p = self.points;
        self.edges.iter().any(|e| {
            // Same or connected edges do not overlap.
            if e.s == s1 || e.s == t1 || e.t == s1 || e.t == t1 {
                return false;
            }
            overlap_seg_seg_2d(p[e.s], p[e.t], p[s1], p[t1])
        })
    }
}

#[inline]
fn cross2(p1: Vec3A, p2: Vec3A, p3: Vec3A) -> f32 {
    let u1 = p2.x - p1.x;
    let v1 = p2.z - p1.z;
    let u2 = p3.x - p1.x;
    let v2 = p3.z - p1.z;
    u1 * v2 - v1 * u2
}

/// Center and radius of the circle through the three points on the xz-plane.
/// Collinear points give a zero radius circle at `p1`.
fn circum_circle(p1: Vec3A, p2: Vec3A, p3: Vec3A) -> (Vec2, f32) {
    const EPS: f32 = 1e-6;
    // Calculate the circle relative to p1, to avoid some precision issues.
    let v2 = (p2 - p1).xz();
    let v3 = (p3 - p1).xz();
    let cp = v2.perp_dot(v3);
    if cp.abs() <= EPS {
        return (p1.xz(), 0.0);
    }
    let v2_sq = v2.length_squared();
    let v3_sq = v3.length_squared();
    let center = Vec2::new(
        (v2_sq * v3.y - v3_sq * v2.y) / (2.0 * cp),
        (v3_sq * v2.x - v2_sq * v3.x) / (2.0 * cp),
    );
    (center + p1.xz(), center.length())
}

fn overlap_seg_seg_2d(a: Vec3A, b: Vec3A, c: Vec3A, d: Vec3A) -> bool {
    let a1 = cross2(a, b, d);
    let a2 = cross2(a, b, c);
    if a1 * a2 < 0.0 {
        let a3 = cross2(c, d, a);
        let a4 = a3 + a2 - a1;
        if a3 * a4 < 0.0 {
            return true;
        }
    }
    false
}
