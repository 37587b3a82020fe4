//! Distance field used to drive watershed partitioning.
//!
//! Every span gets the approximate distance to the closest boundary of its area,
//! in chamfer units (2 per orthogonal step, 3 per diagonal step).

use crate::CompactHeightfield;

impl CompactHeightfield {
    /// Prepare for region partitioning, by calculating distance field along the walkable surface.
    ///
    /// The result is stored in [`CompactHeightfield::dist`] and its maximum in
    /// [`CompactHeightfield::max_distance`].
    pub fn build_distance_field(&mut self) {
        let distance_field = self.calculate_distance_field();
        self.max_distance = distance_field.iter().max().copied().unwrap_or_default();
        self.dist = self.box_blur(1, &distance_field);
        tracing::debug!(max_distance = self.max_distance, "Built distance field");
    }

    fn calculate_distance_field(&self) -> Vec<u16> {
        // Init distance and points.
        let mut distance_field = vec![u16::MAX; self.spans.len()];

        // Mark boundary cells.
        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    let area = self.areas[i];
                    let connection_count = (0..4)
                        .filter_map(|dir| self.neighbor_index(x, z, i, dir))
                        .filter(|a_i| self.areas[*a_i] == area)
                        .count();
                    if connection_count < 4 {
                        distance_field[i] = 0;
                    }
                }
            }
        }

        // Pass 1
        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    // (-1,0), then (-1,-1)
                    self.chamfer(&mut distance_field, x, z, i, 0, 3);
                    // (0,-1), then (1,-1)
                    self.chamfer(&mut distance_field, x, z, i, 3, 2);
                }
            }
        }

        // Pass 2
        for z in (0..self.height as i32).rev() {
            for x in (0..self.width as i32).rev() {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    // (1,0), then (1,1)
                    self.chamfer(&mut distance_field, x, z, i, 2, 1);
                    // (0,1), then (-1,1)
                    self.chamfer(&mut distance_field, x, z, i, 1, 0);
                }
            }
        }

        distance_field
    }

    fn chamfer(
        &self,
        distance_field: &mut [u16],
        x: i32,
        z: i32,
        i: usize,
        dir: u8,
        diagonal_dir: u8,
    ) {
        let Some(con) = self.spans[i].con(dir) else {
            return;
        };
        let (a_x, a_z, a_i) = self.con_indices(x, z, dir, con);
        distance_field[i] = distance_field[i].min(distance_field[a_i].saturating_add(2));
        if let Some(b_i) = self.neighbor_index(a_x, a_z, a_i, diagonal_dir) {
            distance_field[i] = distance_field[i].min(distance_field[b_i].saturating_add(3));
        }
    }

    fn box_blur(&self, threshold: u16, distance_field: &[u16]) -> Vec<u16> {
        let threshold = threshold.saturating_mul(2);
        let mut result = vec![0; distance_field.len()];

        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                for i in self.cell_at(x as u16, z as u16).index_range() {
                    let cd = distance_field[i];
                    if cd <= threshold {
                        result[i] = cd;
                        continue;
                    }
                    let mut d = cd as u32;
                    for dir in 0..4 {
                        let Some(con) = self.spans[i].con(dir) else {
                            d += cd as u32 * 2;
                            continue;
                        };
                        let (a_x, a_z, a_i) = self.con_indices(x, z, dir, con);
                        d += distance_field[a_i] as u32;
                        let dir2 = (dir + 1) & 0x3;
                        match self.neighbor_index(a_x, a_z, a_i, dir2) {
                            Some(b_i) => d += distance_field[b_i] as u32,
                            None => d += cd as u32,
                        }
                    }
                    result[i] = ((d + 5) / 9).min(u16::MAX as u32) as u16;
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{flat_compact, heightfield, span_index};

    #[test]
    fn distance_grows_towards_the_center() {
        let mut compact = flat_compact(9);
        compact.build_distance_field();
        let dist_at = |x: u16, z: u16| compact.dist[span_index(&compact, x, z)];

        assert_eq!(dist_at(0, 0), 0);
        assert_eq!(dist_at(0, 4), 0);
        assert!(dist_at(4, 4) > dist_at(2, 4));
        assert!(dist_at(2, 4) > dist_at(1, 4));
        assert_eq!(compact.max_distance, 8);
    }

    #[test]
    fn empty_field_has_zero_max_distance() {
        let mut compact = heightfield(2, 2).into_compact(2, 1).unwrap();
        compact.build_distance_field();
        assert_eq!(compact.max_distance, 0);
        assert!(compact.dist.is_empty());
    }
}
