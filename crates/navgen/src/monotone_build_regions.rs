use crate::{CompactHeightfield, merge_regions::RegionBuildError, region::RegionId};

const NULL_NEIGHBOR: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// Region id
    id: u16,
    /// Number of samples
    sample_count: u16,
    /// Neighbour id
    neighbor: u16,
}

impl CompactHeightfield {
    /// Partitions the walkable surface into regions by sweeping it row by row.
    ///
    /// Faster than [`CompactHeightfield::build_regions`] and guaranteed to produce regions
    /// without holes or overlaps, at the cost of long thin regions.
    /// Does not need a distance field.
    ///
    /// # Errors
    ///
    /// Returns an error if more regions are created than a [`RegionId`] can hold.
    pub fn build_regions_monotone(
        &mut self,
        border_size: u16,
        min_region_area: u16,
        merge_region_area: u16,
    ) -> Result<(), RegionBuildError> {
        let w = self.width;
        let h = self.height;
        let mut id = RegionId::from(1);

        let mut src_reg = vec![RegionId::NONE; self.spans.len()];
        let mut sweeps = vec![SweepSpan::default(); w.max(h) as usize + 1];

        // Mark border regions.
        if border_size > 0 {
            id = self.paint_border_regions(border_size, id, &mut src_reg);
        }
        self.border_size = border_size;

        let inner_x = border_size.min(w)..w.saturating_sub(border_size);
        let mut prev = Vec::with_capacity(256);

        // Sweep one line at a time.
        for z in border_size.min(h)..h.saturating_sub(border_size) {
            // Collect spans from this row.
            prev.clear();
            prev.resize(id.bits() as usize + 1, 0_u16);
            let mut row_id = 1_u16;

            for x in inner_x.clone() {
                for i in self.cell_at(x, z).index_range() {
                    if !self.areas[i].is_walkable() {
                        continue;
                    }

                    // -x
                    let mut previous_id = 0;
                    if let Some(a_i) = self.neighbor_index(x as i32, z as i32, i, 0) {
                        if !src_reg[a_i].is_border() && self.areas[i] == self.areas[a_i] {
                            previous_id = src_reg[a_i].bits();
                        }
                    }

                    if previous_id == 0 {
                        previous_id = row_id;
                        row_id = row_id.checked_add(1).ok_or(RegionBuildError::TooManyRegions)?;
                        if sweeps.len() <= previous_id as usize {
                            sweeps.resize(previous_id as usize + 1, SweepSpan::default());
                        }
                        sweeps[previous_id as usize] = SweepSpan::default();
                    }

                    // -z
                    if let Some(a_i) = self.neighbor_index(x as i32, z as i32, i, 3) {
                        let neighbor = src_reg[a_i];
                        if neighbor != RegionId::NONE
                            && !neighbor.is_border()
                            && self.areas[i] == self.areas[a_i]
                        {
                            let neighbor = neighbor.bits();
                            let sweep = &mut sweeps[previous_id as usize];
                            if sweep.neighbor == 0 || sweep.neighbor == neighbor {
                                sweep.neighbor = neighbor;
                                sweep.sample_count += 1;
                                prev[neighbor as usize] += 1;
                            } else {
                                sweep.neighbor = NULL_NEIGHBOR;
                            }
                        }
                    }

                    src_reg[i] = RegionId::from(previous_id);
                }
            }

            // Create unique ID.
            for sweep in sweeps.iter_mut().take(row_id as usize).skip(1) {
                // If the neighbour is set and there is only one continuous connection to it,
                // the sweep will be merged with the previous one, else new region is created.
                if sweep.neighbor != NULL_NEIGHBOR
                    && sweep.neighbor != 0
                    && prev[sweep.neighbor as usize] == sweep.sample_count
                {
                    sweep.id = sweep.neighbor;
                } else {
                    if id == RegionId::MAX {
                        tracing::error!("Region id overflow");
                        return Err(RegionBuildError::TooManyRegions);
                    }
                    sweep.id = id.bits();
                    id = id.next();
                }
            }

            // Remap IDs
            for x in inner_x.clone() {
                for i in self.cell_at(x, z).index_range() {
                    let region = src_reg[i].bits();
                    if region > 0 && region < row_id {
                        src_reg[i] = RegionId::from(sweeps[region as usize].id);
                    }
                }
            }
        }

        // Merge regions and filter out small regions.
        let (max_region, _overlaps) = self.merge_and_filter_regions(
            min_region_area as usize,
            merge_region_area as usize,
            id.bits(),
            &mut src_reg,
        );
        // Monotone partitioning does not generate overlapping regions.
        self.max_region = max_region;

        // Store the result out.
        for (span, region) in self.spans.iter_mut().zip(&src_reg) {
            span.region = *region;
        }
        tracing::debug!(regions = self.region_count(), "Built monotone regions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{compact_from, flat_compact, span_index};

    use super::*;

    #[test]
    fn open_square_becomes_one_region() {
        let mut compact = flat_compact(8);
        compact.build_regions_monotone(0, 0, 20).unwrap();

        assert_eq!(compact.region_count(), 1);
        assert!(
            compact
                .spans
                .iter()
                .all(|span| span.region == RegionId::from(1))
        );
    }

    #[test]
    fn u_shape_is_split_without_overlaps() {
        // Two legs joined at the top row.
        let mut compact = compact_from(7, 7, |x, z| x < 2 || x > 4 || z > 4);
        compact.build_regions_monotone(0, 0, 0).unwrap();

        let left_leg = compact.spans[span_index(&compact, 0, 0)].region;
        let right_leg = compact.spans[span_index(&compact, 6, 0)].region;
        assert_ne!(left_leg, RegionId::NONE);
        assert_ne!(right_leg, RegionId::NONE);
        assert_ne!(left_leg, right_leg);
        assert!(compact.region_count() >= 2);
        for span in &compact.spans {
            assert!(span.region.bits() <= compact.region_count() as u16);
        }
    }

    #[test]
    fn border_rows_are_skipped() {
        let mut compact = flat_compact(8);
        compact.build_regions_monotone(1, 0, 0).unwrap();

        assert!(compact.spans[span_index(&compact, 0, 0)].region.is_border());
        let center = compact.spans[span_index(&compact, 4, 4)].region;
        assert_eq!(center, RegionId::from(1));
    }
}
