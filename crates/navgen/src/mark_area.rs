//! Painting custom [`AreaType`]s onto the spans of a [`CompactHeightfield`].

use glam::{IVec3, Vec2, Vec3};

use crate::{Aabb3d, AreaType, CompactHeightfield, math::point_in_poly};

/// A convex prism on the xz-plane, spanning `min_y..=max_y` in world units.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvexVolume {
    /// The footprint of the volume. `x` and `y` of each vertex are the world x and z coordinates.
    pub vertices: Vec<Vec2>,
    /// The world height of the bottom of the volume.
    pub min_y: f32,
    /// The world height of the top of the volume.
    pub max_y: f32,
    /// The area type applied to the spans inside the volume.
    pub area: AreaType,
}

/// An upright cylinder standing on `center_base`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CylinderVolume {
    /// The center of the bottom cap in world units.
    pub center_base: Vec3,
    /// The radius of the cylinder. Negative values are treated as zero.
    pub radius: f32,
    /// The height of the cylinder. Negative values are treated as zero.
    pub height: f32,
    /// The area type applied to the spans inside the volume.
    pub area: AreaType,
}

impl CylinderVolume {
    fn aabb(&self) -> Aabb3d {
        let radius = self.radius.max(0.0);
        let mut min = self.center_base - Vec3::splat(radius);
        let mut max = self.center_base + Vec3::splat(radius);
        min.y = self.center_base.y;
        max.y = self.center_base.y + self.height.max(0.0);
        Aabb3d { min, max }
    }
}

impl CompactHeightfield {
    /// Sets the [`AreaType`] of the walkable spans within the given convex volume.
    ///
    /// A span is inside when its floor lies in the vertical range of the volume
    /// and the center of its cell lies inside the footprint.
    /// Returns the number of spans that were marked.
    pub fn mark_convex_poly_area(&mut self, volume: &ConvexVolume) -> usize {
        let Some(footprint) = crate::Aabb2d::from_points(&volume.vertices) else {
            return 0;
        };
        let aabb = Aabb3d {
            min: Vec3::new(footprint.min.x, volume.min_y, footprint.min.y),
            max: Vec3::new(footprint.max.x, volume.max_y, footprint.max.y),
        };
        self.mark_spans_in(aabb, volume.area, |center| {
            point_in_poly(center, &volume.vertices)
        })
    }

    /// Sets the [`AreaType`] of the walkable spans within the given cylinder.
    ///
    /// Returns the number of spans that were marked.
    pub fn mark_cylinder_area(&mut self, volume: &CylinderVolume) -> usize {
        let radius_sq = volume.radius.max(0.0).powi(2);
        let center = Vec2::new(volume.center_base.x, volume.center_base.z);
        self.mark_spans_in(volume.aabb(), volume.area, |cell_center| {
            cell_center.distance_squared(center) < radius_sq
        })
    }

    fn mark_spans_in(
        &mut self,
        aabb: Aabb3d,
        area: AreaType,
        contains: impl Fn(Vec2) -> bool,
    ) -> usize {
        let scale = Vec3::new(self.cell_size, self.cell_height, self.cell_size);
        let min = ((aabb.min - self.aabb.min) / scale).as_ivec3();
        let max = ((aabb.max - self.aabb.min) / scale).as_ivec3();

        if max.x < 0 || min.x >= self.width as i32 || max.z < 0 || min.z >= self.height as i32 {
            return 0;
        }
        let min = IVec3::new(min.x.max(0), min.y, min.z.max(0));
        let max = IVec3::new(
            max.x.min(self.width as i32 - 1),
            max.y,
            max.z.min(self.height as i32 - 1),
        );

        let mut marked = 0;
        for z in min.z..=max.z {
            for x in min.x..=max.x {
                let cell_center = Vec2::new(
                    self.aabb.min.x + (x as f32 + 0.5) * self.cell_size,
                    self.aabb.min.z + (z as f32 + 0.5) * self.cell_size,
                );
                let range = self.cell_at(x as u16, z as u16).index_range();
                for i in range {
                    if !self.areas[i].is_walkable() {
                        continue;
                    }
                    let y = self.spans[i].y as i32;
                    if y < min.y || y > max.y {
                        continue;
                    }
                    if contains(cell_center) {
                        self.areas[i] = area;
                        marked += 1;
                    }
                }
            }
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{flat_compact, span_index};

    use super::*;

    const WATER: AreaType = AreaType(5);

    fn square(min: f32, max: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(min, min),
            Vec2::new(min, max),
            Vec2::new(max, max),
            Vec2::new(max, min),
        ]
    }

    #[test]
    fn convex_volume_marks_covered_cells() {
        let mut compact = flat_compact(8);
        let marked = compact.mark_convex_poly_area(&ConvexVolume {
            vertices: square(2.0, 4.0),
            min_y: 0.0,
            max_y: 2.0,
            area: WATER,
        });

        assert_eq!(marked, 4);
        assert_eq!(compact.areas[span_index(&compact, 2, 2)], WATER);
        assert_eq!(compact.areas[span_index(&compact, 3, 3)], WATER);
        assert_eq!(
            compact.areas[span_index(&compact, 4, 4)],
            AreaType::DEFAULT_WALKABLE
        );
        assert_eq!(
            compact.areas[span_index(&compact, 1, 2)],
            AreaType::DEFAULT_WALKABLE
        );
    }

    #[test]
    fn convex_volume_respects_height_range() {
        let mut compact = flat_compact(8);
        let marked = compact.mark_convex_poly_area(&ConvexVolume {
            vertices: square(0.0, 8.0),
            min_y: 5.0,
            max_y: 9.0,
            area: WATER,
        });
        assert_eq!(marked, 0);
    }

    #[test]
    fn volume_outside_the_grid_is_ignored() {
        let mut compact = flat_compact(4);
        let marked = compact.mark_convex_poly_area(&ConvexVolume {
            vertices: square(10.0, 12.0),
            min_y: 0.0,
            max_y: 2.0,
            area: WATER,
        });
        assert_eq!(marked, 0);
        assert!(
            compact
                .areas
                .iter()
                .all(|area| *area == AreaType::DEFAULT_WALKABLE)
        );
    }

    #[test]
    fn cylinder_marks_cells_within_radius() {
        let mut compact = flat_compact(9);
        let marked = compact.mark_cylinder_area(&CylinderVolume {
            center_base: Vec3::new(4.5, 0.0, 4.5),
            radius: 1.2,
            height: 2.0,
            area: WATER,
        });

        // The center cell and its four direct neighbours.
        assert_eq!(marked, 5);
        assert_eq!(compact.areas[span_index(&compact, 4, 4)], WATER);
        assert_eq!(compact.areas[span_index(&compact, 5, 4)], WATER);
        assert_eq!(
            compact.areas[span_index(&compact, 5, 5)],
            AreaType::DEFAULT_WALKABLE
        );
    }

    #[test]
    fn negative_radius_marks_nothing() {
        let mut compact = flat_compact(4);
        let marked = compact.mark_cylinder_area(&CylinderVolume {
            center_base: Vec3::new(2.0, 0.0, 2.0),
            radius: -1.0,
            height: 2.0,
            area: WATER,
        });
        assert_eq!(marked, 0);
    }
}
