use crate::{
    CompactHeightfield,
    math::{dir_offset_x, dir_offset_z},
    span::AreaType,
};

impl CompactHeightfield {
    /// Erode the walkable area by agent radius.
    ///
    /// Every walkable span closer than `walkable_radius` cells to a boundary becomes unwalkable.
    /// The distance is approximated with a two-pass chamfer transform.
    pub fn erode_walkable_area(&mut self, walkable_radius: u16) {
        let mut distance_to_boundary = vec![u8::MAX; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height {
            for x in 0..self.width {
                for span_index in self.cell_at(x, z).index_range() {
                    if !self.areas[span_index].is_walkable() {
                        distance_to_boundary[span_index] = 0;
                        continue;
                    }
                    // Check that there is a non-null adjacent span in each of the 4 cardinal directions.
                    let mut neighbor_count = 0;
                    for direction in 0..4 {
                        let Some(neighbor_index) =
                            self.neighbor_index(x as i32, z as i32, span_index, direction)
                        else {
                            break;
                        };
                        if !self.areas[neighbor_index].is_walkable() {
                            break;
                        }
                        neighbor_count += 1;
                    }

                    // At least one missing neighbour, so this is a boundary cell.
                    if neighbor_count != 4 {
                        distance_to_boundary[span_index] = 0;
                    }
                }
            }
        }

        // Pass 1
        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    // (-1,0) and (-1,-1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 0, 3);
                    // (0,-1) and (1,-1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 3, 2);
                }
            }
        }

        // Pass 2
        for z in (0..self.height as i32).rev() {
            for x in (0..self.width as i32).rev() {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    // (1,0) and (1,1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 2, 1);
                    // (0,1) and (-1,1)
                    self.relax_distance(&mut distance_to_boundary, x, z, i, 1, 0);
                }
            }
        }

        let min_boundary_distance = (walkable_radius * 2).min(u8::MAX as u16) as u8;
        let mut eroded = 0_usize;
        for (area, distance) in self.areas.iter_mut().zip(&distance_to_boundary) {
            if *distance < min_boundary_distance && area.is_walkable() {
                *area = AreaType::NOT_WALKABLE;
                eroded += 1;
            }
        }
        tracing::debug!(walkable_radius, eroded, "Eroded walkable area");
    }

    /// Chamfer step: an orthogonal neighbor costs 2, the diagonal reached through it costs 3.
    fn relax_distance(&self, dist: &mut [u8], x: i32, z: i32, i: usize, dir: u8, diagonal_dir: u8) {
        let Some(con) = self.spans[i].con(dir) else {
            return;
        };
        let (a_x, a_z, a_i) = self.con_indices(x, z, dir, con);
        let new_distance = dist[a_i].saturating_add(2);
        if new_distance < dist[i] {
            dist[i] = new_distance;
        }
        if let Some(diagonal) = self.neighbor_index(a_x, a_z, a_i, diagonal_dir) {
            let new_distance = dist[diagonal].saturating_add(3);
            if new_distance < dist[i] {
                dist[i] = new_distance;
            }
        }
    }

    /// Applies a 3x3 median filter to the area types of all walkable spans.
    ///
    /// Removes single-cell noise left over after marking areas.
    pub fn median_filter_walkable_area(&mut self) {
        let mut filtered = vec![AreaType::NOT_WALKABLE; self.spans.len()];
        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    let area = self.areas[i];
                    if !area.is_walkable() {
                        filtered[i] = area;
                        continue;
                    }
                    let mut neighbors = [area; 9];
                    for dir in 0..4 {
                        let Some(a_i) = self.neighbor_index(x, z, i, dir) else {
                            continue;
                        };
                        if self.areas[a_i].is_walkable() {
                            neighbors[dir as usize * 2] = self.areas[a_i];
                        }
                        let a_x = x + dir_offset_x(dir) as i32;
                        let a_z = z + dir_offset_z(dir) as i32;
                        let dir2 = (dir + 1) & 0x3;
                        if let Some(b_i) = self.neighbor_index(a_x, a_z, a_i, dir2) {
                            if self.areas[b_i].is_walkable() {
                                neighbors[dir as usize * 2 + 1] = self.areas[b_i];
                            }
                        }
                    }
                    neighbors.sort_unstable();
                    filtered[i] = neighbors[4];
                }
            }
        }
        self.areas = filtered;
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{flat_compact, span_index};

    use super::*;

    fn walkable_at(compact: &CompactHeightfield, x: u16, z: u16) -> bool {
        compact.areas[span_index(compact, x, z)].is_walkable()
    }

    #[test]
    fn erodes_one_cell_per_radius() {
        let mut compact = flat_compact(7);
        compact.erode_walkable_area(2);
        for z in 0..7 {
            for x in 0..7 {
                let expected = (2..=4).contains(&x) && (2..=4).contains(&z);
                assert_eq!(walkable_at(&compact, x, z), expected, "cell {x}/{z}");
            }
        }
    }

    #[test]
    fn zero_radius_keeps_everything() {
        let mut compact = flat_compact(4);
        compact.erode_walkable_area(0);
        assert!(compact.areas.iter().all(|area| area.is_walkable()));
    }

    #[test]
    fn median_filter_removes_single_cell_noise() {
        let mut compact = flat_compact(5);
        let center = span_index(&compact, 2, 2);
        compact.areas[center] = AreaType(9);
        compact.median_filter_walkable_area();
        assert_eq!(compact.areas[center], AreaType::DEFAULT_WALKABLE);
    }
}
