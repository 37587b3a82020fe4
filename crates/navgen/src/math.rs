//! Small geometry helpers shared by the build stages.

use glam::{U16Vec3, UVec3, Vec2, Vec3, Vec3A, Vec3Swizzles as _};

/// An axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner.
    pub min: Vec3,
    /// The maximum corner.
    pub max: Vec3,
}

impl Aabb3d {
    /// Creates a new AABB from its center and half size.
    #[inline]
    pub fn new(center: impl Into<Vec3>, half_size: impl Into<Vec3>) -> Self {
        let center = center.into();
        let half_size = half_size.into();
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    /// Computes the AABB enclosing all given vertices.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let mut iter = verts.iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self {
            min: min.into(),
            max: max.into(),
        })
    }

    /// Whether this AABB overlaps the other one. Touching boxes overlap.
    #[inline]
    pub fn intersects(&self, other: &Aabb3d) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }
}

/// An axis-aligned bounding box on the xz-plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb2d {
    /// The minimum corner.
    pub min: Vec2,
    /// The maximum corner.
    pub max: Vec2,
}

impl Aabb2d {
    /// Computes the AABB enclosing all given points.
    /// Returns `None` if `points` is empty.
    pub fn from_points(points: &[Vec2]) -> Option<Self> {
        let mut iter = points.iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Self { min, max })
    }
}

impl From<Aabb3d> for Aabb2d {
    fn from(aabb: Aabb3d) -> Self {
        Self {
            min: aabb.min.xz(),
            max: aabb.max.xz(),
        }
    }
}

pub(crate) trait TriangleIndices {
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A;
}

impl TriangleIndices for UVec3 {
    #[inline]
    fn normal(&self, vertices: &[Vec3A]) -> Vec3A {
        let a = vertices[self[0] as usize];
        let b = vertices[self[1] as usize];
        let c = vertices[self[2] as usize];
        let ab = b - a;
        let ac = c - a;
        ab.cross(ac).normalize_or_zero()
    }
}

/// Gets the standard width (x-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The width offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_x(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [-1, 0, 1, 0];
    OFFSET[direction as usize & 0x03]
}

/// Gets the standard height (z-axis) offset for the specified direction.
/// # Arguments
/// - `direction`: The direction. [Limits: 0 <= value < 4]
/// # Returns
///
/// The height offset to apply to the current cell position to move in the direction.
#[inline]
pub(crate) fn dir_offset_z(direction: u8) -> i8 {
    const OFFSET: [i8; 4] = [0, 1, 0, -1];
    OFFSET[direction as usize & 0x03]
}

/// Gets the direction for the specified offset. One of `offset_x` and `offset_z` should be 0.
/// Returns `None` for the zero offset.
#[inline]
pub(crate) fn dir_for_offset(offset_x: i32, offset_z: i32) -> Option<u8> {
    const DIRS: [u8; 5] = [3, 0, u8::MAX, 2, 1];
    let index = (((offset_z + 1) << 1) + offset_x) as usize;
    DIRS.get(index).copied().filter(|dir| *dir != u8::MAX)
}

/// Squared distance from `pt` to the segment `p`-`q` on the xz-plane.
#[inline]
pub(crate) fn distance_point_segment_sq_2d(pt: Vec2, p: Vec2, q: Vec2) -> f32 {
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

/// Even-odd point in polygon test on the xz-plane.
pub(crate) fn point_in_poly(point: Vec2, verts: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = verts.len().wrapping_sub(1);
    for (i, vi) in verts.iter().enumerate() {
        let vj = verts[j];
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Integer predicates on the xz-plane of voxel-space vertices,
/// used by contour hole merging and polygon triangulation.
pub(crate) mod grid {
    use glam::U16Vec3;

    #[inline]
    pub(crate) fn area2(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> i32 {
        (b.x as i32 - a.x as i32) * (c.z as i32 - a.z as i32)
            - (c.x as i32 - a.x as i32) * (b.z as i32 - a.z as i32)
    }

    /// Whether `c` is strictly left of the directed line `a`-`b`.
    #[inline]
    pub(crate) fn left(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
        area2(a, b, c) < 0
    }

    #[inline]
    pub(crate) fn left_on(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
        area2(a, b, c) <= 0
    }

    #[inline]
    pub(crate) fn collinear(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
        area2(a, b, c) == 0
    }

    #[inline]
    pub(crate) fn xz_equal(a: U16Vec3, b: U16Vec3) -> bool {
        a.x == b.x && a.z == b.z
    }

    /// Whether `ab` properly intersects `cd`: they share a point interior to both segments.
    pub(crate) fn intersect_prop(a: U16Vec3, b: U16Vec3, c: U16Vec3, d: U16Vec3) -> bool {
        // Eliminate improper cases.
        if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
            return false;
        }
        (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
    }

    /// Whether `c` lies on the closed segment `ab`.
    fn between(a: U16Vec3, b: U16Vec3, c: U16Vec3) -> bool {
        if !collinear(a, b, c) {
            return false;
        }
        // If ab not vertical, check betweenness on x; else on z.
        if a.x != b.x {
            (a.x <= c.x && c.x <= b.x) || (a.x >= c.x && c.x >= b.x)
        } else {
            (a.z <= c.z && c.z <= b.z) || (a.z >= c.z && c.z >= b.z)
        }
    }

    /// Whether the segments `ab` and `cd` intersect, properly or improperly.
    pub(crate) fn intersect(a: U16Vec3, b: U16Vec3, c: U16Vec3, d: U16Vec3) -> bool {
        intersect_prop(a, b, c, d)
            || between(a, b, c)
            || between(a, b, d)
            || between(c, d, a)
            || between(c, d, b)
    }

    #[inline]
    pub(crate) fn next(i: usize, n: usize) -> usize {
        if i + 1 < n { i + 1 } else { 0 }
    }

    #[inline]
    pub(crate) fn prev(i: usize, n: usize) -> usize {
        if i >= 1 { i - 1 } else { n - 1 }
    }
}

/// Converts a voxel-space vertex to world space.
#[inline]
pub(crate) fn voxel_to_world(v: U16Vec3, origin: Vec3, cell_size: f32, cell_height: f32) -> Vec3 {
    origin + Vec3::new(v.x as f32 * cell_size, v.y as f32 * cell_height, v.z as f32 * cell_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_offsets_round_trip_through_dir_for_offset() {
        for dir in 0..4 {
            let x = dir_offset_x(dir) as i32;
            let z = dir_offset_z(dir) as i32;
            assert_eq!(dir_for_offset(x, z), Some(dir));
        }
        assert_eq!(dir_for_offset(0, 0), None);
    }

    #[test]
    fn point_in_square() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(2.0, 0.0),
        ];
        assert!(point_in_poly(Vec2::new(1.0, 1.0), &square));
        assert!(!point_in_poly(Vec2::new(3.0, 1.0), &square));
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let d = distance_point_segment_sq_2d(Vec2::new(-1.0, 0.0), Vec2::ZERO, Vec2::X);
        assert_eq!(d, 1.0);
        let d = distance_point_segment_sq_2d(Vec2::new(0.5, 2.0), Vec2::ZERO, Vec2::X);
        assert_eq!(d, 4.0);
    }

    #[test]
    fn grid_segments_intersect() {
        let p = |x, z| U16Vec3::new(x, 0, z);
        assert!(grid::intersect(p(0, 0), p(2, 2), p(0, 2), p(2, 0)));
        // Touching at an endpoint counts.
        assert!(grid::intersect(p(0, 0), p(2, 0), p(2, 0), p(2, 2)));
        assert!(!grid::intersect(p(0, 0), p(1, 0), p(0, 1), p(1, 1)));
        assert!(grid::left(p(0, 0), p(0, 2), p(1, 1)));
    }

    #[test]
    fn aabb_from_verts() {
        let aabb = Aabb3d::from_verts(&[Vec3A::new(1.0, -2.0, 3.0), Vec3A::new(-1.0, 2.0, 0.0)])
            .unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
        assert!(Aabb3d::from_verts(&[]).is_none());
    }
}
