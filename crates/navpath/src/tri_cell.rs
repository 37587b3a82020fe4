//! A single triangle of a [`TriNavMesh`](crate::TriNavMesh) and its links to its neighbors.

use glam::{Vec2, Vec3, Vec3Swizzles as _};
use thiserror::Error;

use crate::geom::{Aabb2d, LineRelationship, TOLERANCE, line_relationship, normal_ab, sloppy_eq};

/// Identifies a [`TriCell`] within the mesh that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CellId(pub u32);

impl CellId {
    /// The position of the cell in its owning cell array.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Errors that can occur when creating a [`TriCell`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriCellError {
    /// A vertex index points past the end of the vertex array.
    #[error("Vertex index {index} is out of bounds for {vertex_count} vertices")]
    VertexOutOfBounds {
        /// The offending index.
        index: u32,
        /// The number of vertices available.
        vertex_count: usize,
    },
}

/// How a straight path on the xz-plane relates to a [`TriCell`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathRelationship {
    /// The path leaves the cell through `wall`.
    ExitingCell {
        /// The cell linked across the exit wall, if any.
        next: Option<CellId>,
        /// The wall the path crosses.
        wall: usize,
        /// Where the path crosses the wall.
        point: Vec2,
    },
    /// The path ends inside the cell.
    EndingCell,
    /// The path neither ends inside nor leaves through one of the walls.
    NoRelationship,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
struct Wall {
    normal: Vec2,
    midpoint: Vec3,
    /// Distance from this wall's midpoint to the midpoint of each wall, by wall index.
    distances: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    On,
    Right,
}

/// A triangle of a navigation mesh.
///
/// Wall `i` runs from vertex `i` to vertex `i + 1`. The interior lies to the right of every wall,
/// so triangles are expected to wind clockwise when seen from above.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TriCell {
    id: CellId,
    vertices: [Vec3; 3],
    vertex_indices: [u32; 3],
    normal: Vec3,
    centroid: Vec3,
    d: f32,
    bounds: Aabb2d,
    walls: [Wall; 3],
    links: [Option<CellId>; 3],
    link_walls: [Option<usize>; 3],
}

impl TriCell {
    /// The number of walls and therefore the maximum number of links of a cell.
    pub const MAX_LINKS: usize = 3;

    /// Creates the cell for the triangle `(a, b, c)` of a flat `[x, y, z, x, y, z, ...]` vertex
    /// array.
    pub fn new(id: CellId, vertices: &[f32], a: u32, b: u32, c: u32) -> Result<Self, TriCellError> {
        let vertex_count = vertices.len() / 3;
        let vertex = |index: u32| {
            let i = index as usize;
            if i >= vertex_count {
                return Err(TriCellError::VertexOutOfBounds {
                    index,
                    vertex_count,
                });
            }
            Ok(Vec3::from_slice(&vertices[i * 3..i * 3 + 3]))
        };
        let corners = [vertex(a)?, vertex(b)?, vertex(c)?];
        let [va, vb, vc] = corners;

        let normal = (vb - va).cross(vc - va).normalize_or_zero();
        let centroid = (va + vb + vc) / 3.0;
        let d = -centroid.dot(normal);
        let bounds = Aabb2d::from_points(corners.map(|v| v.xz())).unwrap_or_default();

        let midpoints = [0, 1, 2].map(|i| (corners[i] + corners[(i + 1) % 3]) * 0.5);
        let walls = [0, 1, 2].map(|i| Wall {
            normal: normal_ab(corners[i].xz(), corners[(i + 1) % 3].xz()),
            midpoint: midpoints[i],
            distances: [0, 1, 2].map(|j| midpoints[i].distance(midpoints[j])),
        });

        Ok(Self {
            id,
            vertices: corners,
            vertex_indices: [a, b, c],
            normal,
            centroid,
            d,
            bounds,
            walls,
            links: [None; 3],
            link_walls: [None; 3],
        })
    }

    /// The id of this cell.
    #[inline]
    pub fn id(&self) -> CellId {
        self.id
    }

    /// The three corners of the triangle.
    #[inline]
    pub fn vertices(&self) -> [Vec3; 3] {
        self.vertices
    }

    /// The indices of the corners in the vertex array the cell was created from.
    #[inline]
    pub fn vertex_indices(&self) -> [u32; 3] {
        self.vertex_indices
    }

    /// The unit normal of the triangle's plane.
    #[inline]
    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    /// The centroid of the triangle.
    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    /// The `d` of the plane equation `dot(normal, p) + d = 0`.
    #[inline]
    pub fn d(&self) -> f32 {
        self.d
    }

    /// The bounds of the triangle on the xz-plane.
    #[inline]
    pub fn bounds(&self) -> Aabb2d {
        self.bounds
    }

    /// The cell linked across `wall`, if any.
    #[inline]
    pub fn link(&self, wall: usize) -> Option<CellId> {
        self.links[wall]
    }

    /// The wall of the linked cell that is shared with `wall` of this cell.
    #[inline]
    pub fn link_wall(&self, wall: usize) -> Option<usize> {
        self.link_walls[wall]
    }

    /// The wall through which `cell` is linked to this cell.
    pub fn link_index(&self, cell: CellId) -> Option<usize> {
        self.links.iter().position(|link| *link == Some(cell))
    }

    /// The number of linked walls.
    pub fn link_count(&self) -> usize {
        self.links.iter().filter(|link| link.is_some()).count()
    }

    /// Links this cell to `other` across the wall they share.
    ///
    /// Walls match when this cell's `(v, v_next)` equals the other cell's `(v_next, v)` exactly.
    /// With `cross_link` the other cell is linked back as well. Returns the wall index of this
    /// cell, or `None` if there is no shared wall or the shared wall is already linked on either
    /// side.
    pub fn link_to(&mut self, other: &mut TriCell, cross_link: bool) -> Option<usize> {
        let (wall, other_wall) = self.shared_wall(other)?;
        if self.links[wall].is_some() || (cross_link && other.links[other_wall].is_some()) {
            return None;
        }
        self.links[wall] = Some(other.id);
        self.link_walls[wall] = Some(other_wall);
        if cross_link {
            other.links[other_wall] = Some(self.id);
            other.link_walls[other_wall] = Some(wall);
        }
        Some(wall)
    }

    /// Removes the link across `wall` on this cell only and returns the previously linked cell.
    pub fn unlink(&mut self, wall: usize) -> Option<CellId> {
        self.link_walls[wall] = None;
        self.links[wall].take()
    }

    fn shared_wall(&self, other: &TriCell) -> Option<(usize, usize)> {
        for wall in 0..3 {
            let (v, v_next) = (self.vertices[wall], self.vertices[(wall + 1) % 3]);
            for other_wall in 0..3 {
                let o = other.vertices[other_wall];
                let o_next = other.vertices[(other_wall + 1) % 3];
                if v == o_next && v_next == o {
                    return Some((wall, other_wall));
                }
            }
        }
        None
    }

    /// The distance between the midpoints of two walls.
    #[inline]
    pub fn link_point_distance(&self, from_wall: usize, to_wall: usize) -> f32 {
        self.walls[from_wall].distances[to_wall]
    }

    /// The squared 3D distance from `point` to the midpoint of `wall`.
    #[inline]
    pub fn link_point_distance_sq(&self, point: Vec3, wall: usize) -> f32 {
        point.distance_squared(self.walls[wall].midpoint)
    }

    /// The squared distance on the xz-plane from `point` to the midpoint of `wall`.
    #[inline]
    pub fn link_point_distance_sq_2d(&self, point: Vec2, wall: usize) -> f32 {
        point.distance_squared(self.walls[wall].midpoint.xz())
    }

    /// The midpoint of `wall`.
    #[inline]
    pub fn wall_midpoint(&self, wall: usize) -> Vec3 {
        self.walls[wall].midpoint
    }

    /// The start vertex of `wall`.
    #[inline]
    pub fn wall_left_vertex(&self, wall: usize) -> Vec3 {
        self.vertices[wall]
    }

    /// The end vertex of `wall`.
    #[inline]
    pub fn wall_right_vertex(&self, wall: usize) -> Vec3 {
        self.vertices[(wall + 1) % 3]
    }

    /// The distance on the xz-plane from `point` to the line through `wall`.
    #[inline]
    pub fn wall_distance(&self, point: Vec2, wall: usize) -> f32 {
        self.signed_distance(wall, point).abs()
    }

    fn signed_distance(&self, wall: usize, point: Vec2) -> f32 {
        self.walls[wall]
            .normal
            .dot(point - self.vertices[wall].xz())
    }

    fn side(&self, wall: usize, point: Vec2) -> Side {
        let distance = self.signed_distance(wall, point);
        if distance > TOLERANCE {
            Side::Right
        } else if distance < -TOLERANCE {
            Side::Left
        } else {
            Side::On
        }
    }

    /// Classifies the straight path from `a` to `b` on the xz-plane against this cell.
    pub fn path_relationship(&self, a: Vec2, b: Vec2) -> PathRelationship {
        let mut interior_count = 0;
        for wall in 0..3 {
            if self.side(wall, b) != Side::Left {
                interior_count += 1;
                continue;
            }
            if self.side(wall, a) == Side::Left {
                continue;
            }

            let start = self.vertices[wall].xz();
            let end = self.vertices[(wall + 1) % 3].xz();
            let near_wall_vertex = |point: Vec2| {
                sloppy_eq(point, start, TOLERANCE) || sloppy_eq(point, end, TOLERANCE)
            };
            let crossing = match line_relationship(a, b, start, end) {
                LineRelationship::SegmentsIntersect(point)
                | LineRelationship::ALineCrossesBSeg(point) => Some(point),
                // Float error can put the crossing just past one of the wall's vertices.
                LineRelationship::BLineCrossesASeg(point)
                | LineRelationship::LinesIntersect(point)
                    if near_wall_vertex(point) =>
                {
                    Some(point)
                }
                _ => None,
            };
            if let Some(point) = crossing {
                return PathRelationship::ExitingCell {
                    next: self.links[wall],
                    wall,
                    point,
                };
            }
        }

        if interior_count == 3 {
            PathRelationship::EndingCell
        } else {
            PathRelationship::NoRelationship
        }
    }

    /// The height of the triangle's plane at `(x, z)`, or zero if the plane is vertical.
    pub fn plane_y(&self, x: f32, z: f32) -> f32 {
        if self.normal.y != 0.0 {
            -(self.normal.x * x + self.normal.z * z + self.d) / self.normal.y
        } else {
            0.0
        }
    }

    /// Nudges a point that sits on one of the cell's vertices toward the centroid.
    ///
    /// Points away from every vertex are returned unchanged.
    pub fn safe_point(&self, x: f32, z: f32, offset_scale: f32) -> Vec2 {
        let point = Vec2::new(x, z);
        let mut result = point;
        for vertex in self.vertices {
            if sloppy_eq(point, vertex.xz(), TOLERANCE) {
                result += (self.centroid.xz() - vertex.xz()) * offset_scale;
            }
        }
        result
    }

    /// Moves a point outside of the cell's column onto its boundary, then pulls it toward the
    /// centroid by `offset_scale`.
    pub fn force_to_column(&self, x: f32, z: f32, offset_scale: f32) -> Vec2 {
        let centroid = self.centroid.xz();
        match self.path_relationship(centroid, Vec2::new(x, z)) {
            PathRelationship::ExitingCell { point, .. } => {
                centroid + (point - centroid) * (1.0 - offset_scale)
            }
            PathRelationship::NoRelationship => centroid,
            PathRelationship::EndingCell => Vec2::new(x, z),
        }
    }

    /// Whether `(x, z)` lies inside the vertical column spanned by the triangle. Points on a wall
    /// are inside.
    pub fn is_in_column(&self, x: f32, z: f32) -> bool {
        let point = Vec2::new(x, z);
        (0..3).all(|wall| self.side(wall, point) != Side::Left)
    }

    /// Whether the triangle overlaps the box on the xz-plane.
    pub fn intersects(&self, aabb: &Aabb2d) -> bool {
        if !aabb.intersects(&self.bounds) {
            return false;
        }
        if self.vertices.iter().any(|v| aabb.contains_point(v.xz())) {
            return true;
        }

        // Separating axis test along each wall normal.
        let center = aabb.center();
        let half_extent = aabb.max - center;
        let local = self.vertices.map(|v| v.xz() - center);
        for wall in 0..3 {
            let normal = self.walls[wall].normal;
            let on_wall = local[wall].dot(normal);
            let opposite = local[(wall + 2) % 3].dot(normal);
            let radius = (half_extent.x * normal.x).abs() + (half_extent.y * normal.y).abs();
            if on_wall.min(opposite) > radius || on_wall.max(opposite) < -radius {
                return false;
            }
        }
        true
    }

    /// The index of the vertex within `tolerance` of `(x, z)` on the xz-plane.
    pub fn vertex_index(&self, x: f32, z: f32, tolerance: f32) -> Option<usize> {
        let point = Vec2::new(x, z);
        self.vertices
            .iter()
            .position(|v| sloppy_eq(v.xz(), point, tolerance))
    }

    /// Finds the cell closest to `point` together with the closest point on that cell.
    ///
    /// Cells whose column contains the point are compared by vertical distance. For the others the
    /// point is projected onto the boundary along the line from the centroid.
    pub fn closest_cell<'a>(
        point: Vec3,
        cells: impl IntoIterator<Item = &'a TriCell>,
    ) -> Option<(CellId, Vec3)> {
        let mut closest = None;
        let mut min_distance_sq = f32::MAX;
        for cell in cells {
            let candidate = match cell.path_relationship(cell.centroid.xz(), point.xz()) {
                PathRelationship::ExitingCell { point: edge, .. } => {
                    Vec3::new(edge.x, cell.plane_y(edge.x, edge.y), edge.y)
                }
                _ => Vec3::new(point.x, cell.plane_y(point.x, point.z), point.z),
            };
            let distance_sq = candidate.distance_squared(point);
            if distance_sq < min_distance_sq {
                min_distance_sq = distance_sq;
                closest = Some((cell.id, candidate));
            }
        }
        closest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two triangles forming the unit square, wound clockwise from above.
    ///
    /// ```text
    /// z
    /// 1  1---2
    ///    | / |
    /// 0  0---3
    ///    0   1  x
    /// ```
    const VERTICES: [f32; 12] = [
        0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, //
        1.0, 0.0, 1.0, //
        1.0, 0.0, 0.0,
    ];

    fn square() -> (TriCell, TriCell) {
        let left = TriCell::new(CellId(0), &VERTICES, 0, 1, 2).unwrap();
        let right = TriCell::new(CellId(1), &VERTICES, 0, 2, 3).unwrap();
        (left, right)
    }

    #[test]
    fn construction() {
        let (left, _) = square();
        assert_relative_eq!(left.normal().y, 1.0);
        assert_relative_eq!(left.centroid().x, 1.0 / 3.0);
        assert_relative_eq!(left.centroid().z, 2.0 / 3.0);
        assert_relative_eq!(left.d(), 0.0);
        assert_eq!(left.bounds(), Aabb2d::new(Vec2::ZERO, Vec2::ONE));
        assert_eq!(left.link_count(), 0);
        // Midpoints of (0,1) and (1,2) are half a diagonal apart.
        assert_relative_eq!(left.link_point_distance(0, 1), 0.5_f32.sqrt());
        assert_relative_eq!(left.link_point_distance(1, 0), 0.5_f32.sqrt());
        assert_relative_eq!(left.link_point_distance(2, 2), 0.0);
    }

    #[test]
    fn out_of_bounds_vertex_is_rejected() {
        assert_eq!(
            TriCell::new(CellId(0), &VERTICES, 0, 1, 4),
            Err(TriCellError::VertexOutOfBounds {
                index: 4,
                vertex_count: 4
            })
        );
    }

    #[test]
    fn shared_wall_links_both_ways() {
        let (mut left, mut right) = square();
        assert_eq!(left.link_to(&mut right, true), Some(2));
        assert_eq!(left.link(2), Some(CellId(1)));
        assert_eq!(left.link_wall(2), Some(0));
        assert_eq!(right.link(0), Some(CellId(0)));
        assert_eq!(right.link_index(CellId(0)), Some(0));
        assert_eq!(left.link_count(), 1);

        // Already linked.
        assert_eq!(left.link_to(&mut right, true), None);
        assert_eq!(right.link_to(&mut left, false), None);
    }

    #[test]
    fn one_way_link_leaves_other_untouched() {
        let (mut left, mut right) = square();
        assert_eq!(left.link_to(&mut right, false), Some(2));
        assert_eq!(right.link_count(), 0);
        assert_eq!(right.link_to(&mut left, true), None);
        assert_eq!(right.link_to(&mut left, false), Some(0));
    }

    #[test]
    fn cells_without_shared_wall_do_not_link() {
        let vertices = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 2.0, 0.0, 1.0];
        let mut a = TriCell::new(CellId(0), &vertices, 0, 1, 2).unwrap();
        let mut b = TriCell::new(CellId(1), &vertices, 3, 2, 4).unwrap();
        assert_eq!(a.link_to(&mut b, true), None);
    }

    #[test]
    fn column_membership() {
        let (left, right) = square();
        assert!(left.is_in_column(0.2, 0.7));
        assert!(!right.is_in_column(0.2, 0.7));
        // The shared diagonal belongs to both.
        assert!(left.is_in_column(0.5, 0.5));
        assert!(right.is_in_column(0.5, 0.5));
        assert!(!left.is_in_column(2.0, 0.5));
    }

    #[test]
    fn path_relationships() {
        let (mut left, mut right) = square();
        left.link_to(&mut right, true);

        let inside = left.path_relationship(Vec2::new(0.2, 0.7), Vec2::new(0.3, 0.8));
        assert_eq!(inside, PathRelationship::EndingCell);

        let PathRelationship::ExitingCell { next, wall, point } =
            left.path_relationship(Vec2::new(0.2, 0.7), Vec2::new(0.8, 0.1))
        else {
            panic!("path should leave the cell");
        };
        assert_eq!(next, Some(CellId(1)));
        assert_eq!(wall, 2);
        assert_relative_eq!(point.x, 0.45, epsilon = 1e-5);
        assert_relative_eq!(point.y, 0.45, epsilon = 1e-5);

        let PathRelationship::ExitingCell { next, wall, .. } =
            left.path_relationship(Vec2::new(0.2, 0.7), Vec2::new(-1.0, 0.7))
        else {
            panic!("path should leave the cell");
        };
        assert_eq!(next, None);
        assert_eq!(wall, 0);

        // Starts and ends outside, passing nowhere near the cell.
        let unrelated = left.path_relationship(Vec2::new(2.0, 0.0), Vec2::new(3.0, 0.0));
        assert_eq!(unrelated, PathRelationship::NoRelationship);
    }

    #[test]
    fn plane_height() {
        let vertices = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let ramp = TriCell::new(CellId(0), &vertices, 0, 1, 2).unwrap();
        assert_relative_eq!(ramp.plane_y(0.5, 0.5), 0.5, epsilon = 1e-6);
        assert_relative_eq!(ramp.plane_y(0.2, 0.9), 0.9, epsilon = 1e-6);

        let vertical = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let wall = TriCell::new(CellId(0), &vertical, 0, 1, 2).unwrap();
        assert_eq!(wall.plane_y(0.5, 0.0), 0.0);
    }

    #[test]
    fn safe_point_moves_off_vertices() {
        let (left, _) = square();
        let moved = left.safe_point(0.0, 1.0, 0.1);
        let expected = Vec2::new(0.0, 1.0) + (left.centroid().xz() - Vec2::new(0.0, 1.0)) * 0.1;
        assert_relative_eq!(moved.x, expected.x);
        assert_relative_eq!(moved.y, expected.y);
        assert_eq!(left.safe_point(0.2, 0.7, 0.1), Vec2::new(0.2, 0.7));
    }

    #[test]
    fn force_to_column_pulls_outside_points_in() {
        let (left, _) = square();
        assert_eq!(left.force_to_column(0.2, 0.7, 0.1), Vec2::new(0.2, 0.7));

        let forced = left.force_to_column(-1.0, 2.0 / 3.0, 0.0);
        assert_relative_eq!(forced.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(forced.y, 2.0 / 3.0, epsilon = 1e-5);
        assert!(left.is_in_column(forced.x, forced.y));

        let pulled = left.force_to_column(-1.0, 2.0 / 3.0, 0.5);
        assert_relative_eq!(pulled.x, 1.0 / 6.0, epsilon = 1e-5);
    }

    #[test]
    fn box_intersection() {
        let (left, _) = square();
        assert!(left.intersects(&Aabb2d::new(Vec2::new(0.1, 0.8), Vec2::new(0.2, 0.9))));
        assert!(left.intersects(&Aabb2d::new(Vec2::splat(-1.0), Vec2::splat(2.0))));
        // Inside the bounds, but on the other side of the diagonal.
        assert!(!left.intersects(&Aabb2d::new(Vec2::new(0.7, 0.1), Vec2::new(0.9, 0.2))));
        assert!(!left.intersects(&Aabb2d::new(Vec2::splat(2.0), Vec2::splat(3.0))));
    }

    #[test]
    fn vertex_lookup() {
        let (left, _) = square();
        assert_eq!(left.vertex_index(1.0, 1.0, TOLERANCE), Some(2));
        assert_eq!(left.vertex_index(1.00005, 1.0, TOLERANCE), Some(2));
        assert_eq!(left.vertex_index(0.5, 0.5, TOLERANCE), None);
        assert_eq!(left.wall_left_vertex(2), Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(left.wall_right_vertex(2), Vec3::ZERO);
        assert_relative_eq!(left.wall_distance(Vec2::new(0.5, 0.5), 0), 0.5);
    }

    #[test]
    fn closest_cell_prefers_containing_column() {
        let (left, right) = square();
        let cells = [left, right];
        let (id, on_cell) = TriCell::closest_cell(Vec3::new(0.8, 3.0, 0.1), &cells).unwrap();
        assert_eq!(id, CellId(1));
        assert_relative_eq!(on_cell.y, 0.0);
        assert_relative_eq!(on_cell.x, 0.8);

        let (id, on_cell) = TriCell::closest_cell(Vec3::new(-1.0, 0.0, 0.8), &cells).unwrap();
        assert_eq!(id, CellId(0));
        assert_relative_eq!(on_cell.x, 0.0, epsilon = 1e-5);
        assert!(TriCell::closest_cell(Vec3::ZERO, &[]).is_none());
    }
}
