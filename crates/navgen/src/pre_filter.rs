//! Filters run over a freshly rasterized [`Heightfield`] to remove spans the agent cannot stand on.
//!
//! None of the filters move or merge spans, so the per-column ordering of spans always survives.

use crate::{
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    span::AreaType,
};

const MAX_HEIGHT: i32 = u16::MAX as i32;

impl Heightfield {
    /// Marks non-walkable spans as walkable if their maximum is within `walkable_climb` of the span below them.
    ///
    /// This removes small obstacles and rasterization artifacts that the agent would be able to walk over
    /// such as curbs.  It also allows agents to move up terraced structures like stairs.
    ///
    /// Obstacle spans are marked walkable if: `obstacle_span.max - walkable_span.max < walkable_climb`
    pub fn filter_low_hanging_walkable_obstacles(&mut self, walkable_climb: u16) {
        for z in 0..self.height {
            for x in 0..self.width {
                let mut previous_max = None;
                let mut previous_was_walkable = false;
                let mut previous_area = AreaType::NOT_WALKABLE;

                let keys: Vec<_> = self.column_keys(x, z).collect();
                for key in keys {
                    let span = self.span_mut(key);
                    let walkable = span.area().is_walkable();

                    // If current span is not walkable, but there is walkable span just below it and the height difference
                    // is small enough for the agent to walk over, mark the current span as walkable too.
                    if let Some(previous_max) = previous_max {
                        if !walkable
                            && previous_was_walkable
                            && span.max() as i32 - previous_max as i32 <= walkable_climb as i32
                        {
                            span.set_area(previous_area);
                        }
                    }

                    // Copy the original walkable value regardless of whether we changed it.
                    // This prevents multiple consecutive non-walkable spans from being erroneously marked as walkable.
                    previous_max = Some(span.max());
                    previous_was_walkable = walkable;
                    previous_area = span.area();
                }
            }
        }
    }

    /// Marks spans that are ledges as not-walkable.
    ///
    /// A ledge is a span with one or more neighbors whose maximum is further away than `walkable_climb`
    /// from the current span's maximum.
    /// This method removes the impact of the overestimation of conservative voxelization
    /// so the resulting mesh will not have regions hanging in the air over ledges.
    ///
    /// A span is a ledge if: `abs(current_span.max - neighbor_span.max) > walkable_climb`
    pub fn filter_ledge_spans(&mut self, walkable_height: u16, walkable_climb: u16) {
        let walkable_height = walkable_height as i32;
        let walkable_climb = walkable_climb as i32;
        let mut ledges = Vec::new();

        for z in 0..self.height {
            for x in 0..self.width {
                for key in self.column_keys(x, z) {
                    let span = self.span(key);
                    // Skip non-walkable spans.
                    if !span.area().is_walkable() {
                        continue;
                    }

                    let floor = span.max() as i32;
                    let ceiling = span
                        .next()
                        .map_or(MAX_HEIGHT, |next| self.span(next).min() as i32);

                    // The difference between this walkable area and the lowest neighbor walkable area.
                    // This is the difference between the current span and all neighbor spans that have
                    // enough space for an agent to move between, but not accounting at all for surface slope.
                    let mut lowest_neighbor_floor_difference = MAX_HEIGHT;

                    // Min and max height of accessible neighbours.
                    let mut lowest_traversable_neighbor_floor = floor;
                    let mut highest_traversable_neighbor_floor = floor;

                    for dir in 0..4 {
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;

                        // Skip neighbors which are out of bounds.
                        if !self.contains(neighbor_x, neighbor_z) {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }
                        let neighbor_x = neighbor_x as u16;
                        let neighbor_z = neighbor_z as u16;

                        // The most we can step down to the neighbor is the walkable climb distance.
                        let neighbor_ceiling = self
                            .span_at(neighbor_x, neighbor_z)
                            .map_or(MAX_HEIGHT, |span| span.min() as i32);

                        // Skip neighbour if the gap between the spans is too small.
                        if ceiling.min(neighbor_ceiling) - floor >= walkable_height {
                            lowest_neighbor_floor_difference = -walkable_climb - 1;
                            break;
                        }

                        // For each span in the neighboring column...
                        for neighbor in self.column(neighbor_x, neighbor_z) {
                            let neighbor_floor = neighbor.max() as i32;
                            let neighbor_ceiling = neighbor
                                .next()
                                .map_or(MAX_HEIGHT, |next| self.span(next).min() as i32);

                            // Only consider neighboring areas that have enough overlap to be potentially traversable.
                            if ceiling.min(neighbor_ceiling) - floor.max(neighbor_floor)
                                < walkable_height
                            {
                                // No space to traverse between them.
                                continue;
                            }

                            let neighbor_floor_difference = neighbor_floor - floor;
                            lowest_neighbor_floor_difference =
                                lowest_neighbor_floor_difference.min(neighbor_floor_difference);

                            // Find min/max accessible neighbor height.
                            // Only consider neighbors that are at most walkable_climb away.
                            if neighbor_floor_difference.abs() <= walkable_climb {
                                // There is space to move to the neighbor cell and the slope isn't too much.
                                lowest_traversable_neighbor_floor =
                                    lowest_traversable_neighbor_floor.min(neighbor_floor);
                                highest_traversable_neighbor_floor =
                                    highest_traversable_neighbor_floor.max(neighbor_floor);
                            } else if neighbor_floor_difference < -walkable_climb {
                                // We already know this will be considered a ledge span so we can early-out
                                break;
                            }
                        }
                    }

                    // The current span is close to a ledge if the magnitude of the drop to any neighbour span
                    // is greater than the walkable_climb distance.
                    // That is, there is a gap that is large enough to let an agent move between them,
                    // but the drop (surface slope) is too large to allow it.
                    if lowest_neighbor_floor_difference < -walkable_climb {
                        ledges.push(key);
                        continue;
                    }

                    // If the difference between all neighbor floors is too large, this is a steep slope.
                    if highest_traversable_neighbor_floor - lowest_traversable_neighbor_floor
                        > walkable_climb
                    {
                        ledges.push(key);
                    }
                }
            }
        }

        for key in ledges {
            self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
        }
    }

    /// Marks walkable spans as not walkable if the clearance above the span is less than the specified walkable height.
    ///
    /// For this filter, the clearance above the span is the distance from the span's
    /// maximum to the minimum of the next higher span in the same column.
    /// If there is no higher span in the column, the clearance is computed as the
    /// distance from the top of the span to the maximum heightfield height.
    pub fn filter_walkable_low_height_spans(&mut self, walkable_height: u16) {
        let mut low_spans = Vec::new();
        for z in 0..self.height {
            for x in 0..self.width {
                for key in self.column_keys(x, z) {
                    let span = self.span(key);
                    let floor = span.max() as i32;
                    let ceiling = span
                        .next()
                        .map_or(MAX_HEIGHT, |next| self.span(next).min() as i32);
                    if ceiling - floor < walkable_height as i32 {
                        low_spans.push(key);
                    }
                }
            }
        }
        for key in low_spans {
            self.span_mut(key).set_area(AreaType::NOT_WALKABLE);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::{
        Aabb3d, HeightfieldBuilder,
        heightfield::SpanInsertion,
        span::{SpanBuilder, SpanKey},
    };

    use super::*;

    fn heightfield(size: f32) -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::ZERO,
                max: Vec3::splat(size),
            },
            cell_size: 1.0,
            cell_height: 1.0,
        }
        .build()
        .unwrap()
    }

    fn add(heightfield: &mut Heightfield, x: u16, z: u16, min: u16, max: u16, area: AreaType) {
        heightfield
            .add_span(SpanInsertion {
                x,
                z,
                flag_merge_threshold: 0,
                span: SpanBuilder {
                    min,
                    max,
                    area,
                    next: None,
                }
                .build(),
            })
            .unwrap();
    }

    fn fill_floor(heightfield: &mut Heightfield, max: u16) {
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                add(heightfield, x, z, 0, max, AreaType::DEFAULT_WALKABLE);
            }
        }
    }

    #[track_caller]
    fn assert_column_sorted(heightfield: &Heightfield) {
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let keys: Vec<SpanKey> = heightfield.column_keys(x, z).collect();
                for pair in keys.windows(2) {
                    let below = heightfield.span(pair[0]);
                    let above = heightfield.span(pair[1]);
                    assert!(
                        below.max() < above.min(),
                        "column {x}/{z}: spans overlap or are out of order"
                    );
                }
            }
        }
    }

    #[test]
    fn low_obstacle_on_walkable_floor_becomes_walkable() {
        let mut heightfield = heightfield(3.0);
        add(&mut heightfield, 1, 1, 0, 2, AreaType(3));
        add(&mut heightfield, 1, 1, 3, 4, AreaType::NOT_WALKABLE);
        add(&mut heightfield, 1, 1, 5, 9, AreaType::NOT_WALKABLE);
        heightfield.filter_low_hanging_walkable_obstacles(2);

        let areas: Vec<_> = heightfield.column(1, 1).map(|s| s.area()).collect();
        // The second obstacle sits on an obstacle that was not walkable originally.
        assert_eq!(areas, vec![AreaType(3), AreaType(3), AreaType::NOT_WALKABLE]);
        assert_column_sorted(&heightfield);
    }

    #[test]
    fn border_spans_are_ledges() {
        let mut heightfield = heightfield(3.0);
        fill_floor(&mut heightfield, 1);
        heightfield.filter_ledge_spans(2, 1);

        for z in 0..3 {
            for x in 0..3 {
                let walkable = heightfield.span_at(x, z).unwrap().area().is_walkable();
                let is_center = x == 1 && z == 1;
                assert_eq!(walkable, is_center, "column {x}/{z}");
            }
        }
    }

    #[test]
    fn steep_drop_next_to_span_is_a_ledge() {
        let mut heightfield = heightfield(5.0);
        for z in 0..5 {
            for x in 0..5 {
                let max = if x >= 3 { 1 } else { 10 };
                add(&mut heightfield, x, z, 0, max, AreaType::DEFAULT_WALKABLE);
            }
        }
        heightfield.filter_ledge_spans(2, 1);
        // Column 2 is next to a drop of 9 voxels.
        assert!(!heightfield.span_at(2, 2).unwrap().area().is_walkable());
        // Column 1 is surrounded by floors at the same height.
        assert!(heightfield.span_at(1, 2).unwrap().area().is_walkable());
        assert_column_sorted(&heightfield);
    }

    #[test]
    fn low_ceiling_makes_span_unwalkable() {
        let mut heightfield = heightfield(3.0);
        add(&mut heightfield, 0, 0, 0, 2, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 0, 0, 4, 5, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 1, 0, 0, 2, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 1, 0, 6, 7, AreaType::DEFAULT_WALKABLE);
        heightfield.filter_walkable_low_height_spans(3);

        let column_0: Vec<_> = heightfield.column(0, 0).map(|s| s.area()).collect();
        assert_eq!(column_0, vec![AreaType::NOT_WALKABLE, AreaType::DEFAULT_WALKABLE]);
        let column_1: Vec<_> = heightfield.column(1, 0).map(|s| s.area()).collect();
        assert_eq!(column_1, vec![AreaType::DEFAULT_WALKABLE; 2]);
        assert_column_sorted(&heightfield);
    }
}
