//! Planar helpers on the xz-plane.

use glam::Vec2;

/// Tolerance used for wall side tests and vertex equality.
pub const TOLERANCE: f32 = 0.0001;

/// Lengths at or below this are treated as zero when normalizing a direction.
pub const EPSILON: f32 = 0.00001;

/// A 2D axis-aligned bounding box on the xz-plane. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb2d {
    /// The minimum corner.
    pub min: Vec2,
    /// The maximum corner.
    pub max: Vec2,
}

impl Aabb2d {
    /// Creates a new AABB from its corners.
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Computes the AABB enclosing all given points.
    /// Returns `None` if `points` is empty.
    pub fn from_points(points: impl IntoIterator<Item = Vec2>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), v| (min.min(v), max.max(v)));
        Some(Self { min, max })
    }

    /// Whether the point lies inside or on the edge of the box.
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Whether `other` lies fully inside this box. Touching edges count as inside.
    #[inline]
    pub fn contains(&self, other: &Aabb2d) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Whether the two boxes overlap. Touching edges count as overlapping.
    #[inline]
    pub fn intersects(&self, other: &Aabb2d) -> bool {
        !(other.max.x < self.min.x
            || other.min.x > self.max.x
            || other.max.y < self.min.y
            || other.min.y > self.max.y)
    }

    /// Grows the box by `amount` on every side.
    #[inline]
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// The center of the box.
    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Whether the box has a positive extent on both axes.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }
}

/// How two lines, each given by a pair of points, relate to each other.
///
/// The variants that describe an intersection carry the intersection point of the two infinite
/// lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineRelationship {
    /// The lines lie on top of each other.
    Collinear,
    /// The lines never meet.
    Parallel,
    /// Both segments contain the intersection point.
    SegmentsIntersect(Vec2),
    /// Line A crosses segment B, but the intersection lies outside of segment A.
    ALineCrossesBSeg(Vec2),
    /// Line B crosses segment A, but the intersection lies outside of segment B.
    BLineCrossesASeg(Vec2),
    /// The lines intersect outside of both segments.
    LinesIntersect(Vec2),
}

impl LineRelationship {
    /// The intersection point, if the lines meet in exactly one point.
    pub fn intersection(&self) -> Option<Vec2> {
        match *self {
            Self::Collinear | Self::Parallel => None,
            Self::SegmentsIntersect(point)
            | Self::ALineCrossesBSeg(point)
            | Self::BLineCrossesASeg(point)
            | Self::LinesIntersect(point) => Some(point),
        }
    }
}

/// Classifies the relationship between the line through `a` and `b` and the line through `c` and
/// `d`.
pub fn line_relationship(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> LineRelationship {
    let ab = b - a;
    let cd = d - c;
    let ca = a - c;

    let numerator = ca.y * cd.x - ca.x * cd.y;
    let denominator = ab.x * cd.y - ab.y * cd.x;
    if denominator == 0.0 {
        return if numerator == 0.0 {
            LineRelationship::Collinear
        } else {
            LineRelationship::Parallel
        };
    }

    let factor_ab = numerator / denominator;
    let factor_cd = (ca.y * ab.x - ca.x * ab.y) / denominator;
    let point = a + ab * factor_ab;

    let on_ab = (0.0..=1.0).contains(&factor_ab);
    let on_cd = (0.0..=1.0).contains(&factor_cd);
    match (on_ab, on_cd) {
        (true, true) => LineRelationship::SegmentsIntersect(point),
        (false, true) => LineRelationship::ALineCrossesBSeg(point),
        (true, false) => LineRelationship::BLineCrossesASeg(point),
        (false, false) => LineRelationship::LinesIntersect(point),
    }
}

/// The normalized direction from `a` to `b`, or zero if the points coincide.
pub fn direction_ab(a: Vec2, b: Vec2) -> Vec2 {
    let delta = b - a;
    let length = delta.length();
    if length <= EPSILON {
        return Vec2::ZERO;
    }
    delta / length
}

/// The normal of the line running from `a` to `b`, pointing to its right when looking down from
/// above.
///
/// Returns zero if the points are within [`TOLERANCE`] of each other.
pub fn normal_ab(a: Vec2, b: Vec2) -> Vec2 {
    if sloppy_eq(a, b, TOLERANCE) {
        return Vec2::ZERO;
    }
    let direction = direction_ab(a, b);
    Vec2::new(direction.y, -direction.x)
}

/// Whether every component of `a` is within `tolerance` of the same component of `b`.
#[inline]
pub fn sloppy_eq(a: Vec2, b: Vec2, tolerance: f32) -> bool {
    (a - b).abs().cmple(Vec2::splat(tolerance)).all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crossing_segments_intersect() {
        let relationship = line_relationship(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 0.0),
        );
        let LineRelationship::SegmentsIntersect(point) = relationship else {
            panic!("expected intersecting segments, got {relationship:?}");
        };
        assert_relative_eq!(point.x, 1.0);
        assert_relative_eq!(point.y, 1.0);
    }

    #[test]
    fn short_segment_only_reaches_with_its_line() {
        // A ends before reaching B.
        let relationship = line_relationship(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
        );
        assert!(matches!(relationship, LineRelationship::ALineCrossesBSeg(_)));

        let relationship = line_relationship(
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 0.0),
        );
        assert!(matches!(relationship, LineRelationship::BLineCrossesASeg(_)));

        let relationship = line_relationship(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.5, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 2.0),
        );
        assert!(matches!(relationship, LineRelationship::LinesIntersect(_)));
    }

    #[test]
    fn parallel_and_collinear_lines() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(1.0, 0.0);
        assert_eq!(
            line_relationship(a, b, Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0)),
            LineRelationship::Parallel
        );
        assert_eq!(
            line_relationship(a, b, Vec2::new(2.0, 0.0), Vec2::new(3.0, 0.0)),
            LineRelationship::Collinear
        );
        assert_eq!(LineRelationship::Parallel.intersection(), None);
    }

    #[test]
    fn normal_points_right() {
        let normal = normal_ab(Vec2::ZERO, Vec2::new(0.0, 2.0));
        assert_relative_eq!(normal.x, 1.0);
        assert_relative_eq!(normal.y, 0.0);
        assert_eq!(normal_ab(Vec2::ONE, Vec2::ONE), Vec2::ZERO);
    }

    #[test]
    fn aabb_edges_are_inclusive() {
        let aabb = Aabb2d::new(Vec2::ZERO, Vec2::ONE);
        assert!(aabb.contains_point(Vec2::new(1.0, 0.0)));
        assert!(aabb.intersects(&Aabb2d::new(Vec2::ONE, Vec2::splat(2.0))));
        assert!(!aabb.intersects(&Aabb2d::new(Vec2::splat(1.1), Vec2::splat(2.0))));
        assert!(aabb.contains(&Aabb2d::new(Vec2::ZERO, Vec2::new(1.0, 0.5))));
        assert!(Aabb2d::new(Vec2::ZERO, Vec2::new(1.0, 0.0)).is_degenerate());
    }
}
