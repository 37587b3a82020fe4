use crate::{CompactHeightfield, merge_regions::RegionBuildError, region::RegionId};

impl CompactHeightfield {
    /// Partitions the walkable surface into regions using watershed partitioning.
    ///
    /// Non-null regions will consist of connected, non-overlapping walkable spans that form a single contour.
    /// Contours will form simple polygons.
    ///
    /// If multiple regions form an area that is smaller than `min_region_area`, then all spans will be
    /// re-assigned to [`RegionId::NONE`].
    ///
    /// Watershed partitioning can result in smaller than necessary regions, especially in diagonal corridors.
    /// `merge_region_area` helps reduce unnecessarily small regions.
    ///
    /// The distance field must be created using [`CompactHeightfield::build_distance_field`] first.
    /// The result is written to the span regions and to [`CompactHeightfield::max_region`].
    ///
    /// # Errors
    ///
    /// Returns an error if more regions are created than a [`RegionId`] can hold.
    pub fn build_regions(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionBuildError> {
        const LOG_NB_STACKS: usize = 3;
        const NB_STACKS: usize = 1 << LOG_NB_STACKS;
        let mut level_stacks: [Vec<LevelStackEntry>; NB_STACKS] = [const { Vec::new() }; NB_STACKS];
        for stack in &mut level_stacks {
            stack.reserve(256);
        }

        let mut stack: Vec<LevelStackEntry> = Vec::with_capacity(256);

        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut src_dist = vec![0_u16; self.spans.len()];

        let mut region_id = RegionId::from(1);
        let mut level = (self.max_distance + 1) & !1;

        // expand_iters defines how much the watershed "overflows" and simplifies the regions.
        let expand_iters = 8;

        if border_size > 0 {
            region_id = self.paint_border_regions(border_size, region_id, &mut src_reg);
        }
        self.border_size = border_size;

        let mut s_id = -1_i32;
        while level > 0 {
            level = level.saturating_sub(2);
            s_id = (s_id + 1) & (NB_STACKS as i32 - 1);
            let s = s_id as usize;

            if s == 0 {
                self.sort_cells_by_level(level, &src_reg, &mut level_stacks, 1);
            } else {
                // copy left overs from last level
                let (src, dst) = level_stacks.split_at_mut(s);
                append_stacks(&src[s - 1], &mut dst[0], &src_reg);
            }

            self.expand_regions(
                expand_iters,
                level,
                &mut src_reg,
                &mut src_dist,
                &mut level_stacks[s],
                false,
            );

            // Mark new regions with IDs.
            for j in 0..level_stacks[s].len() {
                let entry = level_stacks[s][j].clone();
                let Some(i) = entry.index else {
                    continue;
                };
                if src_reg[i] != RegionId::NONE {
                    continue;
                }
                if self.flood_region(
                    entry,
                    level,
                    region_id,
                    &mut src_reg,
                    &mut src_dist,
                    &mut stack,
                ) {
                    if region_id == RegionId::MAX {
                        tracing::error!("Region id overflow");
                        return Err(RegionBuildError::TooManyRegions);
                    }
                    region_id = region_id.next();
                }
            }
        }

        // Expand current regions until no empty connected cells found.
        self.expand_regions(
            expand_iters * 8,
            0,
            &mut src_reg,
            &mut src_dist,
            &mut stack,
            true,
        );

        // Merge regions and filter out small regions.
        let (max_region, overlaps) = self.merge_and_filter_regions(
            min_region_area as usize,
            merge_region_area as usize,
            region_id.bits(),
            &mut src_reg,
        );
        self.max_region = max_region;
        if !overlaps.is_empty() {
            tracing::error!(count = overlaps.len(), "Found overlapping regions");
        }

        // Write the result out.
        for (span, region) in self.spans.iter_mut().zip(&src_reg) {
            span.region = *region;
        }
        tracing::debug!(regions = self.region_count(), "Built watershed regions");
        Ok(())
    }

    /// Paints the four borders of the field with their own border regions.
    /// Returns the next free region id.
    pub(crate) fn paint_border_regions(
        &self,
        border_size: u16,
        mut region_id: RegionId,
        src_reg: &mut [RegionId],
    ) -> RegionId {
        // Make sure border will not overflow.
        let border_width = border_size.min(self.width);
        let border_height = border_size.min(self.height);
        let (w, h) = (self.width, self.height);

        let rects = [
            (0, border_width, 0, h),
            (w - border_width, w, 0, h),
            (0, w, 0, border_height),
            (0, w, h - border_height, h),
        ];
        for (min_x, max_x, min_z, max_z) in rects {
            self.paint_rect_region(
                min_x,
                max_x,
                min_z,
                max_z,
                region_id | RegionId::BORDER_REGION,
                src_reg,
            );
            region_id = region_id.next();
        }
        region_id
    }

    fn paint_rect_region(
        &self,
        min_x: u16,
        max_x: u16,
        min_z: u16,
        max_z: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
    ) {
        for z in min_z..max_z {
            for x in min_x..max_x {
                for i in self.cell_at(x, z).index_range() {
                    if self.areas[i].is_walkable() {
                        src_reg[i] = region;
                    }
                }
            }
        }
    }

    fn sort_cells_by_level(
        &self,
        start_level: u16,
        src_reg: &[RegionId],
        stacks: &mut [Vec<LevelStackEntry>],
        log_levels_per_stack: u16,
    ) {
        let start_level = start_level >> log_levels_per_stack;
        for stack in stacks.iter_mut() {
            stack.clear();
        }

        // put all cells in the level range into the appropriate stacks
        for z in 0..self.height {
            for x in 0..self.width {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() || src_reg[i] != RegionId::NONE {
                        continue;
                    }
                    let level = self.dist[i] >> log_levels_per_stack;
                    // Cells above the start level go to the first stack.
                    let s_id = start_level.saturating_sub(level) as usize;
                    if s_id >= stacks.len() {
                        continue;
                    }
                    stacks[s_id].push(LevelStackEntry {
                        x,
                        z,
                        index: Some(i),
                    });
                }
            }
        }
    }

    fn expand_regions(
        &self,
        max_iter: u16,
        level: u16,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
        fill_stack: bool,
    ) {
        if fill_stack {
            // Find cells revealed by the raised level.
            stack.clear();
            for z in 0..self.height {
                for x in 0..self.width {
                    for i in self.cell_at(x, z).index_range() {
                        if self.dist[i] >= level
                            && src_reg[i] == RegionId::NONE
                            && self.areas[i].is_walkable()
                        {
                            stack.push(LevelStackEntry {
                                x,
                                z,
                                index: Some(i),
                            });
                        }
                    }
                }
            }
        } else {
            // use cells in the input stack
            // mark all cells which already have a region
            for entry in stack.iter_mut() {
                if entry.index.is_some_and(|i| src_reg[i] != RegionId::NONE) {
                    entry.index = None;
                }
            }
        }

        let mut dirty_entries = Vec::new();
        let mut iter = 0;
        while !stack.is_empty() {
            let mut failed = 0;
            dirty_entries.clear();

            for entry in stack.iter_mut() {
                let Some(i) = entry.index else {
                    failed += 1;
                    continue;
                };

                let mut r = src_reg[i];
                let mut d2 = u16::MAX as u32;
                let area = self.areas[i];
                for dir in 0..4 {
                    let Some(a_i) = self.neighbor_index(entry.x as i32, entry.z as i32, i, dir)
                    else {
                        continue;
                    };
                    if self.areas[a_i] != area {
                        continue;
                    }
                    let a_region = src_reg[a_i];
                    let a_dist = src_dist[a_i] as u32 + 2;
                    if a_region != RegionId::NONE && !a_region.is_border() && a_dist < d2 {
                        r = a_region;
                        d2 = a_dist;
                    }
                }
                if r != RegionId::NONE {
                    // Mark as used
                    entry.index = None;
                    dirty_entries.push(DirtyEntry {
                        index: i,
                        region: r,
                        distance2: d2.min(u16::MAX as u32) as u16,
                    });
                } else {
                    failed += 1;
                }
            }

            // Copy entries that differ between src and dst to keep them in sync.
            for dirty_entry in &dirty_entries {
                src_reg[dirty_entry.index] = dirty_entry.region;
                src_dist[dirty_entry.index] = dirty_entry.distance2;
            }

            if failed == stack.len() {
                break;
            }

            if level > 0 {
                iter += 1;
                if iter >= max_iter {
                    break;
                }
            }
        }
    }

    /// Floods a new region from `entry` over all connected spans at or above `level - 2`.
    /// Returns `false` if the seed was swallowed by a neighboring region instead.
    fn flood_region(
        &self,
        entry: LevelStackEntry,
        level: u16,
        region: RegionId,
        src_reg: &mut [RegionId],
        src_dist: &mut [u16],
        stack: &mut Vec<LevelStackEntry>,
    ) -> bool {
        let Some(seed) = entry.index else {
            return false;
        };
        let area = self.areas[seed];

        // Flood fill mark region.
        stack.clear();
        stack.push(entry);
        src_reg[seed] = region;
        src_dist[seed] = 0;

        let lev = level.saturating_sub(2);
        let mut count = 0;

        while let Some(back) = stack.pop() {
            let (c_x, c_z) = (back.x as i32, back.z as i32);
            let Some(c_i) = back.index else {
                continue;
            };

            // Check if any of the neighbours already have a valid region set.
            let mut neighbor_region = RegionId::NONE;
            for dir in 0..4 {
                let Some(con) = self.spans[c_i].con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = self.con_indices(c_x, c_z, dir, con);
                if self.areas[a_i] != area {
                    continue;
                }
                let n_r = src_reg[a_i];
                // Do not take borders into account.
                if n_r.is_border() {
                    continue;
                }
                if n_r != RegionId::NONE && n_r != region {
                    neighbor_region = n_r;
                    break;
                }

                let dir2 = (dir + 1) & 0x3;
                if let Some(a_i2) = self.neighbor_index(a_x, a_z, a_i, dir2) {
                    if self.areas[a_i2] != area {
                        continue;
                    }
                    let n_r2 = src_reg[a_i2];
                    if n_r2 != RegionId::NONE && n_r2 != region {
                        neighbor_region = n_r2;
                        break;
                    }
                }
            }
            if neighbor_region != RegionId::NONE {
                src_reg[c_i] = RegionId::NONE;
                continue;
            }

            count += 1;

            // Expand neighbours.
            for dir in 0..4 {
                let Some(con) = self.spans[c_i].con(dir) else {
                    continue;
                };
                let (a_x, a_z, a_i) = self.con_indices(c_x, c_z, dir, con);
                if self.areas[a_i] != area {
                    continue;
                }
                if self.dist[a_i] >= lev && src_reg[a_i] == RegionId::NONE {
                    src_reg[a_i] = region;
                    src_dist[a_i] = 0;
                    stack.push(LevelStackEntry {
                        x: a_x as u16,
                        z: a_z as u16,
                        index: Some(a_i),
                    });
                }
            }
        }

        count > 0
    }
}

fn append_stacks(
    src_stack: &[LevelStackEntry],
    dst_stack: &mut Vec<LevelStackEntry>,
    src_reg: &[RegionId],
) {
    for entry in src_stack {
        let Some(i) = entry.index else {
            continue;
        };
        if src_reg[i] != RegionId::NONE {
            continue;
        }
        dst_stack.push(entry.clone());
    }
}

#[derive(Clone, Debug)]
struct LevelStackEntry {
    x: u16,
    z: u16,
    index: Option<usize>,
}

#[derive(Clone, Debug)]
struct DirtyEntry {
    index: usize,
    region: RegionId,
    distance2: u16,
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{compact_from, flat_compact, span_index};

    use super::*;

    fn regions_of(compact: &CompactHeightfield) -> Vec<RegionId> {
        compact.spans.iter().map(|span| span.region).collect()
    }

    #[test]
    fn open_square_becomes_one_region() {
        let mut compact = flat_compact(12);
        compact.build_distance_field();
        compact.build_regions(0, 0, 20).unwrap();

        assert_eq!(compact.region_count(), 1);
        assert!(
            regions_of(&compact)
                .iter()
                .all(|region| *region == RegionId::from(1))
        );
    }

    #[test]
    fn disconnected_islands_get_distinct_regions() {
        let mut compact = compact_from(11, 5, |x, _| x != 5);
        compact.build_distance_field();
        compact.build_regions(0, 0, 0).unwrap();

        assert_eq!(compact.region_count(), 2);
        let left = compact.spans[span_index(&compact, 0, 0)].region;
        let right = compact.spans[span_index(&compact, 10, 4)].region;
        assert_ne!(left, RegionId::NONE);
        assert_ne!(right, RegionId::NONE);
        assert_ne!(left, right);
    }

    #[test]
    fn region_ids_are_dense() {
        let mut compact = compact_from(20, 20, |x, z| x % 7 != 6 && z % 7 != 6);
        compact.build_distance_field();
        compact.build_regions(0, 0, 0).unwrap();

        let max = compact.region_count() as u16;
        assert!(max >= 1);
        for region in regions_of(&compact) {
            assert!(!region.is_border());
            assert!(region.bits() <= max);
        }
        for id in 1..=max {
            assert!(regions_of(&compact).contains(&RegionId::from(id)), "missing {id}");
        }
    }

    #[test]
    fn border_slots_do_not_take_region_ids() {
        let mut compact = flat_compact(12);
        compact.build_distance_field();
        compact.build_regions(2, 0, 0).unwrap();

        assert!(compact.spans[span_index(&compact, 0, 0)].region.is_border());
        assert_eq!(compact.region_count(), 1);
        let interior: Vec<_> = regions_of(&compact)
            .into_iter()
            .filter(|region| !region.is_border())
            .collect();
        assert!(!interior.is_empty());
        assert!(interior.iter().all(|region| *region == RegionId::from(1)));
    }

    #[test]
    fn small_islands_are_removed() {
        // A 10x10 floor and a lone 2x2 island.
        let mut compact = compact_from(16, 10, |x, z| x < 10 || (x >= 13 && x < 15 && z < 2));
        compact.build_distance_field();
        compact.build_regions(0, 8, 20).unwrap();

        assert_eq!(compact.spans[span_index(&compact, 13, 0)].region, RegionId::NONE);
        assert_ne!(compact.spans[span_index(&compact, 0, 0)].region, RegionId::NONE);
    }

    #[test]
    fn border_spans_keep_the_border_flag() {
        let mut compact = flat_compact(10);
        compact.build_distance_field();
        compact.build_regions(2, 0, 20).unwrap();

        assert_eq!(compact.border_size, 2);
        assert!(compact.spans[span_index(&compact, 0, 5)].region.is_border());
        assert!(compact.spans[span_index(&compact, 5, 9)].region.is_border());
        let center = compact.spans[span_index(&compact, 5, 5)].region;
        assert!(!center.is_border());
        assert_ne!(center, RegionId::NONE);
    }
}
