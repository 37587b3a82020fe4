use glam::U16Vec3;

use crate::{
    Aabb3d, CompactHeightfield,
    math::grid,
    region::RegionId,
    span::AreaType,
};

impl CompactHeightfield {
    /// Builds simplified contours around every region.
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
        let mut contour_set = ContourSet {
            contours: Vec::with_capacity(self.region_count().max(8)),
            aabb: self.aabb,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            width: self.width.saturating_sub(border_size * 2),
            height: self.height.saturating_sub(border_size * 2),
            border_size,
            max_error,
        };
        if border_size > 0 {
            // If the heightfield was built with border_size, remove the offset
            let pad = border_size as f32 * self.cell_size;
            contour_set.aabb.min.x += pad;
            contour_set.aabb.min.z += pad;
            contour_set.aabb.max.x -= pad;
            contour_set.aabb.max.z -= pad;
        }

        let mut flags = self.mark_boundary_edges();

        let mut verts = Vec::with_capacity(256);
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let region = self.spans[i].region;
                    if region == RegionId::NONE || region.is_border() {
                        continue;
                    }
                    let area = self.areas[i];

                    verts.clear();
                    self.walk_contour_build(x, z, i, &mut flags, &mut verts);

                    let mut simplified =
                        simplify_contour(&verts, max_error, max_edge_len, build_flags);
                    remove_degenerate_segments(&mut simplified);

                    // Create contour.
                    if simplified.len() < 3 {
                        tracing::debug!(
                            region = region.bits(),
                            raw = verts.len(),
                            simplified = simplified.len(),
                            "Skipping degenerate contour"
                        );
                        continue;
                    }
                    let remove_offset = |(v, r): &(U16Vec3, RegionVertexId)| {
                        let offset = U16Vec3::new(border_size, 0, border_size);
                        (v.saturating_sub(offset), *r)
                    };
                    contour_set.contours.push(Contour {
                        vertices: simplified.iter().map(remove_offset).collect(),
                        raw_vertices: verts.iter().map(remove_offset).collect(),
                        region,
                        area,
                    });
                }
            }
        }

        contour_set.merge_holes(self.region_count());
        tracing::debug!(
            contours = contour_set.contours.len(),
            "Built contours"
        );
        contour_set
    }

    /// For each span, a bit per direction set when that edge borders another region.
    fn mark_boundary_edges(&self) -> Vec<u8> {
        let mut flags = vec![0_u8; self.spans.len()];
        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    let region = self.spans[i].region;
                    if region == RegionId::NONE || region.is_border() {
                        continue;
                    }
                    let mut connected = 0;
                    for dir in 0..4 {
                        let neighbor_region = self
                            .neighbor_index(x, z, i, dir)
                            .map_or(RegionId::NONE, |a_i| self.spans[a_i].region);
                        if neighbor_region == region {
                            connected |= 1 << dir;
                        }
                    }
                    // Inverse, mark non connected edges.
                    flags[i] = connected ^ 0xf;
                }
            }
        }
        flags
    }

    fn walk_contour_build(
        &self,
        x: u16,
        z: u16,
        i: usize,
        flags: &mut [u8],
        points: &mut Vec<(U16Vec3, RegionVertexId)>,
    ) {
        let (mut x, mut z, mut i) = (x as i32, z as i32, i);
        // Choose the first non-connected edge
        let Some(mut dir) = (0..4).find(|dir| flags[i] & (1 << dir) != 0) else {
            return;
        };

        let start_dir = dir;
        let start_i = i;
        let area = self.areas[i];

        for _ in 1..40_000 {
            if flags[i] & (1 << dir) != 0 {
                // Choose the edge corner
                let (p_y, is_border_vertex) = self.corner_height(x, z, i, dir);
                let (p_x, p_z) = match dir {
                    0 => (x, z + 1),
                    1 => (x + 1, z + 1),
                    2 => (x + 1, z),
                    _ => (x, z),
                };
                let mut r = RegionVertexId::NONE;
                let mut is_area_border = false;
                if let Some(a_i) = self.neighbor_index(x, z, i, dir) {
                    r = RegionVertexId::from(self.spans[a_i].region);
                    is_area_border = area != self.areas[a_i];
                }
                if is_border_vertex {
                    r |= RegionVertexId::BORDER_VERTEX;
                }
                if is_area_border {
                    r |= RegionVertexId::AREA_BORDER;
                }
                points.push((U16Vec3::new(p_x as u16, p_y, p_z as u16), r));

                // Remove visited edges
                flags[i] &= !(1 << dir);
                // Rotate CW
                dir = (dir + 1) & 0x3;
            } else {
                let Some(con) = self.spans[i].con(dir) else {
                    // Should not happen.
                    tracing::warn!(x, z, "Contour walk left the region");
                    return;
                };
                (x, z, i) = self.con_indices(x, z, dir, con);
                // Rotate CCW
                dir = (dir + 3) & 0x3;
            }

            if start_i == i && start_dir == dir {
                break;
            }
        }
    }

    /// The height of the corner at the clockwise end of edge `dir` of span `i`,
    /// and whether the corner sits on a border between two same exterior cells
    /// and two interior cells of the same area.
    fn corner_height(&self, x: i32, z: i32, i: usize, dir: u8) -> (u16, bool) {
        let mut ch = self.spans[i].y;
        let dir_p = (dir + 1) & 0x3;

        // Combine region and area codes in order to prevent
        // border vertices which are in between two areas to be removed.
        let region_and_area =
            |i: usize| self.spans[i].region.bits() as u32 | ((self.areas[i].0 as u32) << 16);
        let mut regs = [0_u32; 4];
        regs[0] = region_and_area(i);

        if let Some(con) = self.spans[i].con(dir) {
            let (a_x, a_z, a_i) = self.con_indices(x, z, dir, con);
            ch = ch.max(self.spans[a_i].y);
            regs[1] = region_and_area(a_i);
            if let Some(b_i) = self.neighbor_index(a_x, a_z, a_i, dir_p) {
                ch = ch.max(self.spans[b_i].y);
                regs[2] = region_and_area(b_i);
            }
        }
        if let Some(con) = self.spans[i].con(dir_p) {
            let (a_x, a_z, a_i) = self.con_indices(x, z, dir_p, con);
            ch = ch.max(self.spans[a_i].y);
            regs[3] = region_and_area(a_i);
            if let Some(b_i) = self.neighbor_index(a_x, a_z, a_i, dir) {
                ch = ch.max(self.spans[b_i].y);
                regs[2] = region_and_area(b_i);
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
    max_error: f32,
    max_edge_len: u16,
    flags: BuildContoursFlags,
) -> Vec<(U16Vec3, RegionVertexId)> {
    // Vertex and the index of its raw point.
    let mut simplified: Vec<(U16Vec3, usize)> = Vec::with_capacity(64);
    let pn = points.len();
    if pn == 0 {
        return Vec::new();
    }

    // Add initial points.
    let has_connections = points.iter().any(|(_, r)| r.region() != RegionId::NONE);
    if has_connections {
        // The contour has some portals to other regions.
        // Add a new point to every location where the region changes.
        for (i, (point, r)) in points.iter().enumerate() {
            let (_, next) = points[(i + 1) % pn];
            let different_regs = r.region() != next.region();
            let area_borders = r.contains(RegionVertexId::AREA_BORDER)
                != next.contains(RegionVertexId::AREA_BORDER);
            if different_regs || area_borders {
                simplified.push((*point, i));
            }
        }
    }

    if simplified.is_empty() {
        // If there is no connections at all,
        // create some initial points for the simplification process.
        // Find lower-left and upper-right vertices of the contour.
        let mut lower_left = (points[0].0, 0);
        let mut upper_right = (points[0].0, 0);
        for (i, (v, _)) in points.iter().enumerate() {
            let (ll, _) = lower_left;
            if v.x < ll.x || (v.x == ll.x && v.z < ll.z) {
                lower_left = (*v, i);
            }
            let (ur, _) = upper_right;
            if v.x > ur.x || (v.x == ur.x && v.z > ur.z) {
                upper_right = (*v, i);
            }
        }
        simplified.push(lower_left);
        simplified.push(upper_right);
    }

    // Add points until all raw points are within
    // error tolerance to the simplified shape.
    let max_error_sq = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();

        let (mut a, a_i) = simplified[i];
        let (mut b, b_i) = simplified[ii];

        // Traverse the segment in lexilogical order so that the
        // max deviation is calculated similarly when traversing
        // opposite segments.
        let (c_i, c_inc, end_i) = if b.x > a.x || (b.x == a.x && b.z > a.z) {
            ((a_i + 1) % pn, 1, b_i)
        } else {
            std::mem::swap(&mut a, &mut b);
            ((b_i + pn - 1) % pn, pn - 1, a_i)
        };

        // Find maximum deviation from the segment.
        let mut max_deviation = 0.0;
        let mut max_i = None;
        // Tessellate only outer edges or edges between areas.
        let (_, c_r) = points[c_i];
        if c_r.region() == RegionId::NONE || c_r.contains(RegionVertexId::AREA_BORDER) {
            let mut c = c_i;
            while c != end_i {
                let (v, _) = points[c];
                let deviation = distance_point_segment_sq(v, a, b);
                if deviation > max_deviation {
                    max_deviation = deviation;
                    max_i = Some(c);
                }
                c = (c + c_inc) % pn;
            }
        }

        // If the max deviation is larger than accepted error,
        // add new point, else continue to next segment.
        match max_i {
            Some(max_i) if max_deviation > max_error_sq => {
                simplified.insert(i + 1, (points[max_i].0, max_i));
            }
            _ => i += 1,
        }
    }

    // Split too long edges.
    let tessellate_walls = flags.contains(BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES);
    let tessellate_areas = flags.contains(BuildContoursFlags::TESSELLATE_AREA_EDGES);
    if max_edge_len > 0 && (tessellate_walls || tessellate_areas) {
        let max_edge_len_sq = max_edge_len as i32 * max_edge_len as i32;
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let (a, a_i) = simplified[i];
            let (b, b_i) = simplified[ii];

            // Find maximum deviation from the segment.
            let mut max_i = None;
            let (_, c_r) = points[(a_i + 1) % pn];

            // Tessellate only outer edges or edges between areas.
            let tessellate = (tessellate_walls && c_r.region() == RegionId::NONE)
                || (tessellate_areas && c_r.contains(RegionVertexId::AREA_BORDER));
            if tessellate {
                let dx = b.x as i32 - a.x as i32;
                let dz = b.z as i32 - a.z as i32;
                if dx * dx + dz * dz > max_edge_len_sq {
                    // Round based on the segments in lexilogical order so that the
                    // max tesselation is consistent regardless in which direction
                    // segments are traversed.
                    let n = if b_i < a_i { b_i + pn - a_i } else { b_i - a_i };
                    if n > 1 {
                        max_i = Some(if b.x > a.x || (b.x == a.x && b.z > a.z) {
                            (a_i + n / 2) % pn
                        } else {
                            (a_i + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            // If the max deviation is larger than accepted error,
            // add new point, else continue to next segment.
            match max_i {
                Some(max_i) => simplified.insert(i + 1, (points[max_i].0, max_i)),
                None => i += 1,
            }
        }
    }

    simplified
        .into_iter()
        .map(|(v, raw_index)| {
            // The edge vertex flag is take from the current raw point,
            // and the neighbour region is take from the next raw point.
            let (_, next) = points[(raw_index + 1) % pn];
            let (_, current) = points[raw_index];
            let r = (next & (RegionVertexId::REGION_MASK | RegionVertexId::AREA_BORDER))
                | (current & RegionVertexId::BORDER_VERTEX);
            (v, r)
        })
        .collect()
}

fn distance_point_segment_sq(pt: U16Vec3, p: U16Vec3, q: U16Vec3) -> f32 {
    let pq_x = q.x as f32 - p.x as f32;
    let pq_z = q.z as f32 - p.z as f32;
    let mut dx = pt.x as f32 - p.x as f32;
    let mut dz = pt.z as f32 - p.z as f32;
    let d = pq_x * pq_x + pq_z * pq_z;
    let mut t = pq_x * dx + pq_z * dz;
    if d > 0.0 {
        t /= d;
    }
    let t = t.clamp(0.0, 1.0);
    dx = p.x as f32 + t * pq_x - pt.x as f32;
    dz = p.z as f32 + t * pq_z - pt.z as f32;
    dx * dx + dz * dz
}

/// Remove adjacent vertices which are equal on xz-plane,
/// or else the triangulator will get confused.
fn remove_degenerate_segments(simplified: &mut Vec<(U16Vec3, RegionVertexId)>) {
    let mut i = 0;
    while i < simplified.len() {
        let ni = grid::next(i, simplified.len());
        if grid::xz_equal(simplified[i].0, simplified[ni].0) {
            // Degenerate segment, remove.
            simplified.remove(i);
        }
        i += 1;
    }
}

/// Signed area of the contour on the xz-plane. Holes have negative area.
fn signed_area(vertices: &[(U16Vec3, RegionVertexId)]) -> i64 {
    let n = vertices.len();
    let mut area = 0_i64;
    for i in 0..n {
        let j = grid::prev(i, n);
        let (vi, _) = vertices[i];
        let (vj, _) = vertices[j];
        area += vi.x as i64 * vj.z as i64 - vj.x as i64 * vi.z as i64;
    }
    (area + 1) / 2
}

impl ContourSet {
    /// Merges every hole contour into the outline contour of the same region.
    fn merge_holes(&mut self, region_count: usize) {
        let windings: Vec<bool> = self
            .contours
            .iter()
            .map(|contour| signed_area(&contour.vertices) < 0)
            .collect();
        if !windings.iter().any(|is_hole| *is_hole) {
            return;
        }

        // Collect outline contour and holes contours per region.
        // We assume that there is one outline and multiple holes.
        let mut outlines: Vec<Option<usize>> = vec![None; region_count + 1];
        let mut holes: Vec<Vec<usize>> = vec![Vec::new(); region_count + 1];
        for (i, contour) in self.contours.iter().enumerate() {
            let region = contour.region.bits() as usize;
            if region >= outlines.len() {
                continue;
            }
            if windings[i] {
                holes[region].push(i);
            } else if outlines[region].is_some() {
                tracing::error!(region, "Multiple outlines for region");
            } else {
                outlines[region] = Some(i);
            }
        }

        let mut merged_holes = Vec::new();
        for (region, region_holes) in holes.iter().enumerate() {
            if region_holes.is_empty() {
                continue;
            }
            let Some(outline) = outlines[region] else {
                tracing::error!(
                    region,
                    "Missing outline for region, polygon mesh might have holes"
                );
                continue;
            };
            merged_holes.extend(self.merge_region_holes(outline, region_holes));
        }

        // Merged holes are left empty, drop them.
        merged_holes.sort_unstable();
        for i in merged_holes.into_iter().rev() {
            self.contours.remove(i);
        }
    }

    /// Returns the indices of the holes that were merged into the outline.
    fn merge_region_holes(&mut self, outline: usize, region_holes: &[usize]) -> Vec<usize> {
        // Sort holes from left to right.
        let mut sorted: Vec<(usize, usize, U16Vec3)> = region_holes
            .iter()
            .map(|&hole| {
                let (leftmost, v) = leftmost_vertex(&self.contours[hole].vertices);
                (hole, leftmost, v)
            })
            .collect();
        sorted.sort_by(|(_, _, a), (_, _, b)| a.x.cmp(&b.x).then(a.z.cmp(&b.z)));

        let mut merged = Vec::with_capacity(sorted.len());
        let mut diagonals: Vec<(usize, i32)> = Vec::new();
        for (hole_position, &(hole, leftmost, _)) in sorted.iter().enumerate() {
            let hole_vertices = &self.contours[hole].vertices;
            let outline_vertices = &self.contours[outline].vertices;
            let mut index = None;
            let mut best_vertex = leftmost;
            for _ in 0..hole_vertices.len() {
                // Find potential diagonals.
                // The 'best' vertex must be in the cone described by 3 consecutive vertices of the outline.
                // ..o j-1
                //   |
                //   |   * best
                //   |
                // j o-----o j+1
                //         :
                diagonals.clear();
                let (corner, _) = hole_vertices[best_vertex];
                for j in 0..outline_vertices.len() {
                    if in_cone(j, outline_vertices, corner) {
                        let (v, _) = outline_vertices[j];
                        let dx = v.x as i32 - corner.x as i32;
                        let dz = v.z as i32 - corner.z as i32;
                        diagonals.push((j, dx * dx + dz * dz));
                    }
                }
                // Sort potential diagonals by distance, we want to make the connection as short as possible.
                diagonals.sort_by_key(|(_, distance)| *distance);

                // Find a diagonal that is not intersecting the outline not the remaining holes.
                index = diagonals.iter().map(|(j, _)| *j).find(|&j| {
                    let (pt, _) = outline_vertices[j];
                    if intersect_seg_contour(pt, corner, Some(j), outline_vertices) {
                        return false;
                    }
                    !sorted[hole_position..].iter().any(|(other, _, _)| {
                        intersect_seg_contour(pt, corner, None, &self.contours[*other].vertices)
                    })
                });
                // If found non-intersecting diagonal, stop looking.
                if index.is_some() {
                    break;
                }
                // All the potential diagonals for the current vertex were intersecting, try next vertex.
                best_vertex = (best_vertex + 1) % hole_vertices.len();
            }

            let Some(index) = index else {
                tracing::warn!(
                    region = self.contours[outline].region.bits(),
                    "Failed to find merge points for hole"
                );
                continue;
            };
            let hole_vertices = std::mem::take(&mut self.contours[hole].vertices);
            self.contours[outline].vertices = merge_contours(
                &self.contours[outline].vertices,
                &hole_vertices,
                index,
                best_vertex,
            );
            merged.push(hole);
        }
        merged
    }
}

fn leftmost_vertex(vertices: &[(U16Vec3, RegionVertexId)]) -> (usize, U16Vec3) {
    let mut leftmost = 0;
    let mut min = vertices[0].0;
    for (i, (v, _)) in vertices.iter().enumerate().skip(1) {
        if v.x < min.x || (v.x == min.x && v.z < min.z) {
            min = *v;
            leftmost = i;
        }
    }
    (leftmost, min)
}

/// Whether `p` lies inside the cone at vertex `i` of the polygon.
fn in_cone(i: usize, vertices: &[(U16Vec3, RegionVertexId)], p: U16Vec3) -> bool {
    let n = vertices.len();
    let (pi, _) = vertices[i];
    let (pi1, _) = vertices[grid::next(i, n)];
    let (pin1, _) = vertices[grid::prev(i, n)];

    // If P[i] is a convex vertex [ i+1 left or on (i-1,i) ].
    if grid::left_on(pin1, pi, pi1) {
        return grid::left(pi, p, pin1) && grid::left(p, pi, pi1);
    }
    // Assume (i-1,i,i+1) not collinear.
    // else P[i] is reflex.
    !(grid::left_on(pi, p, pi1) && grid::left_on(p, pi, pin1))
}

fn intersect_seg_contour(
    d0: U16Vec3,
    d1: U16Vec3,
    skip_vertex: Option<usize>,
    vertices: &[(U16Vec3, RegionVertexId)],
) -> bool {
    let n = vertices.len();
    // For each edge (k,k+1) of P
    (0..n).any(|k| {
        let k1 = grid::next(k, n);
        // Skip edges incident to i.
        if skip_vertex.is_some_and(|i| i == k || i == k1) {
            return false;
        }
        let (p0, _) = vertices[k];
        let (p1, _) = vertices[k1];
        if grid::xz_equal(d0, p0)
            || grid::xz_equal(d1, p0)
            || grid::xz_equal(d0, p1)
            || grid::xz_equal(d1, p1)
        {
            return false;
        }
        grid::intersect(d0, d1, p0, p1)
    })
}

/// Splices contour `b` into contour `a` along the diagonal between `a[ia]` and `b[ib]`.
/// Both diagonal end points appear twice in the result.
fn merge_contours(
    a: &[(U16Vec3, RegionVertexId)],
    b: &[(U16Vec3, RegionVertexId)],
    ia: usize,
    ib: usize,
) -> Vec<(U16Vec3, RegionVertexId)> {
    let mut vertices = Vec::with_capacity(a.len() + b.len() + 2);
    // Copy contour A.
    for i in 0..=a.len() {
        vertices.push(a[(ia + i) % a.len()]);
    }
    // Copy contour B
    for i in 0..=b.len() {
        vertices.push(b[(ib + i) % b.len()]);
    }
    vertices
}

/// Represents a group of related contours.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
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
    /// The neighbor region of a contour vertex, combined with flags describing the vertex.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    #[repr(transparent)]
    pub struct RegionVertexId: u32 {
        /// No neighbor region and no flags.
        const NONE = 0;

        /// Applied to the region id field of contour vertices in order to extract the region id.
        /// The region id field of a vertex may have several flags applied to it.  So the
        /// fields value can't be used directly.
        const REGION_MASK = 0xffff;

        /// Border vertex flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// a tile border. If a contour vertex's region ID has this bit set, the
        /// vertex will later be removed in order to match the segments and vertices
        /// at tile boundaries.
        const BORDER_VERTEX = 0x10_000;

        /// Area border flag.
        /// If a region ID has this bit set, then the associated element lies on
        /// the border of an area.
        const AREA_BORDER = 0x20_000;
    }
}

impl RegionVertexId {
    /// The neighbor region id stored in this vertex.
    #[inline]
    pub fn region(self) -> RegionId {
        RegionId::from((self.bits() & Self::REGION_MASK.bits()) as u16)
    }
}

impl From<RegionId> for RegionVertexId {
    fn from(region_id: RegionId) -> Self {
        RegionVertexId::from_bits_retain(region_id.bits() as u32)
    }
}

/// Represents a simple, non-overlapping contour in field space.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Contour {
    /// Simplified contour vertices and their neighbor data.
    pub vertices: Vec<(U16Vec3, RegionVertexId)>,
    /// Raw contour vertices and their neighbor data.
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
