//! Filtering and merging of the raw regions produced by the partitioning algorithms.
//!
//! Shared by [`CompactHeightfield::build_regions`] and [`CompactHeightfield::build_regions_monotone`].

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{CompactHeightfield, region::RegionId, span::AreaType};

/// Errors that can occur while building regions.
#[derive(Debug, Error)]
pub enum RegionBuildError {
    /// More regions were created than a [`RegionId`] can address.
    #[error("Region id overflow: more than {max} regions", max = RegionId::MAX.bits())]
    TooManyRegions,
}

#[derive(Debug, Clone)]
struct Region {
    /// Number of spans belonging to this region
    span_count: usize,
    /// Id of the region
    id: RegionId,
    /// Area type
    area: AreaType,
    remap: bool,
    visited: bool,
    overlap: bool,
    /// Neighbor region ids in the order they are met when walking the contour. 0 is the outside.
    connections: Vec<RegionId>,
    /// Regions found above or below this one in the same columns.
    floors: Vec<RegionId>,
    /// Number of span edges shared with each original region slot.
    borders: BTreeMap<usize, u32>,
}

impl Region {
    fn new(id: usize) -> Self {
        Self {
            span_count: 0,
            id: RegionId::from(id as u16),
            area: AreaType::NOT_WALKABLE,
            remap: false,
            visited: false,
            overlap: false,
            connections: Vec::new(),
            floors: Vec::new(),
            borders: BTreeMap::new(),
        }
    }

    fn is_connected_to_border(&self) -> bool {
        // Region is connected to the border if one of the neighbours is the null id.
        self.connections.contains(&RegionId::NONE)
    }

    fn add_unique_floor(&mut self, floor: RegionId) {
        if !self.floors.contains(&floor) {
            self.floors.push(floor);
        }
    }

    fn remove_adjacent_neighbors(&mut self) {
        let mut i = 0;
        while i < self.connections.len() && self.connections.len() > 1 {
            let ni = (i + 1) % self.connections.len();
            if self.connections[i] == self.connections[ni] {
                self.connections.remove(i);
            } else {
                i += 1;
            }
        }
    }

    fn replace_neighbor(&mut self, old_id: RegionId, new_id: RegionId) {
        let mut neighbor_changed = false;
        for connection in self.connections.iter_mut().filter(|c| **c == old_id) {
            *connection = new_id;
            neighbor_changed = true;
        }
        for floor in self.floors.iter_mut().filter(|f| **f == old_id) {
            *floor = new_id;
        }
        if neighbor_changed {
            self.remove_adjacent_neighbors();
        }
    }

    fn can_merge_with(&self, other: &Region) -> bool {
        if self.area != other.area {
            return false;
        }
        let shared_contours = self.connections.iter().filter(|c| **c == other.id).count();
        if shared_contours > 1 {
            return false;
        }
        !self.floors.contains(&other.id)
    }
}

fn is_mergeable_id(id: RegionId) -> bool {
    id != RegionId::NONE && !id.is_border()
}

impl CompactHeightfield {
    /// Removes groups of regions smaller than `min_region_area`, merges regions smaller than
    /// `merge_region_size` into their neighbors and compacts the ids into `1..=N`.
    ///
    /// `max_region_id` is one past the largest raw id in `src_reg`.
    /// Returns the new maximum region id and the ids of regions that overlap themselves vertically.
    pub(crate) fn merge_and_filter_regions(
        &self,
        min_region_area: usize,
        merge_region_size: usize,
        max_region_id: u16,
        src_reg: &mut [RegionId],
    ) -> (RegionId, Vec<RegionId>) {
        let region_count = max_region_id as usize;
        let mut regions: Vec<Region> = (0..region_count).map(Region::new).collect();
        let raw_index = |id: RegionId| -> Option<usize> {
            let index = id.bits() as usize;
            (id != RegionId::NONE && index < region_count).then_some(index)
        };

        // Find edge of a region and find connections around the contour.
        for z in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let cell = *self.cell_at(x as u16, z as u16);
                for i in cell.index_range() {
                    let Some(r) = raw_index(src_reg[i]) else {
                        continue;
                    };
                    let region = &mut regions[r];
                    region.span_count += 1;

                    // Update floors.
                    for j in cell.index_range() {
                        if i == j {
                            continue;
                        }
                        let Some(floor) = raw_index(src_reg[j]) else {
                            continue;
                        };
                        if floor == r {
                            region.overlap = true;
                        }
                        region.add_unique_floor(src_reg[j]);
                    }

                    // Count the span edges shared with other regions.
                    for dir in 0..4 {
                        if let Some(a_i) = self.neighbor_index(x, z, i, dir) {
                            if let Some(other) = raw_index(src_reg[a_i]) {
                                if other != r {
                                    *region.borders.entry(other).or_default() += 1;
                                }
                            }
                        }
                    }

                    // Have found contour
                    if !region.connections.is_empty() {
                        continue;
                    }
                    region.area = self.areas[i];

                    // Check if this cell is next to a border.
                    let solid_edge_dir =
                        (0..4).find(|dir| is_solid_edge(self, src_reg, x, z, i, *dir));
                    if let Some(dir) = solid_edge_dir {
                        // The cell is at border.
                        // Walk around the contour to find all the neighbours.
                        let connections = walk_contour(self, x, z, i, dir, src_reg);
                        regions[r].connections = connections;
                    }
                }
            }
        }

        // Remove too small regions.
        let mut stack = Vec::with_capacity(32);
        let mut trace = Vec::with_capacity(32);
        for i in 0..region_count {
            {
                let region = &regions[i];
                if !is_mergeable_id(region.id) || region.span_count == 0 || region.visited {
                    continue;
                }
            }

            // Count the total size of all the connected regions.
            // Also keep track of the regions connects to a tile border.
            let mut connects_to_border = false;
            let mut span_count = 0;
            stack.clear();
            trace.clear();

            regions[i].visited = true;
            stack.push(i);

            while let Some(ri) = stack.pop() {
                span_count += regions[ri].span_count;
                trace.push(ri);

                for j in 0..regions[ri].connections.len() {
                    let connection = regions[ri].connections[j];
                    if connection.is_border() {
                        connects_to_border = true;
                        continue;
                    }
                    let Some(neighbor) = raw_index(connection) else {
                        continue;
                    };
                    let neighbor_region = &mut regions[neighbor];
                    if neighbor_region.visited || !is_mergeable_id(neighbor_region.id) {
                        continue;
                    }
                    // Visit
                    neighbor_region.visited = true;
                    stack.push(neighbor);
                }
            }

            // If the accumulated regions size is too small, remove it.
            // Do not remove areas which connect to tile borders
            // as their size cannot be estimated correctly and removing them
            // can potentially remove necessary areas.
            if span_count < min_region_area && !connects_to_border {
                // Kill all visited regions.
                for &t in &trace {
                    regions[t].span_count = 0;
                    regions[t].id = RegionId::NONE;
                }
            }
        }

        // Merge too small regions to neighbour regions.
        loop {
            let mut merge_count = 0;
            for i in 0..region_count {
                let region = &regions[i];
                if !is_mergeable_id(region.id) || region.overlap || region.span_count == 0 {
                    continue;
                }

                // Check to see if the region should be merged.
                if region.span_count > merge_region_size && region.is_connected_to_border() {
                    continue;
                }

                // Small region with more than 1 connection.
                // Or region which is not connected to a border at all.
                // Merge into the neighbour sharing the longest border, ties go to the lowest id.
                let mut best: Option<(u32, RegionId)> = None;
                for &connection in &region.connections {
                    if connection.is_border() {
                        continue;
                    }
                    let Some(m) = raw_index(connection) else {
                        continue;
                    };
                    let candidate = &regions[m];
                    if !is_mergeable_id(candidate.id) || candidate.overlap {
                        continue;
                    }
                    if !region.can_merge_with(candidate) || !candidate.can_merge_with(region) {
                        continue;
                    }
                    let border_length: u32 = region
                        .borders
                        .iter()
                        .filter(|(slot, _)| regions[**slot].id == candidate.id)
                        .map(|(_, length)| *length)
                        .sum();
                    let is_better = match best {
                        None => true,
                        Some((best_length, best_id)) => {
                            border_length > best_length
                                || (border_length == best_length && candidate.id < best_id)
                        }
                    };
                    if is_better {
                        best = Some((border_length, candidate.id));
                    }
                }

                let Some((_, merge_id)) = best else {
                    continue;
                };
                let old_id = region.id;
                if merge_id == old_id {
                    continue;
                }
                // Merge neighbours.
                if merge_regions(&mut regions, merge_id.bits() as usize, i) {
                    // Fixup regions pointing to current region.
                    for other in regions.iter_mut() {
                        if !is_mergeable_id(other.id) {
                            continue;
                        }
                        // If another region was already merged into current region
                        // change the nid of the previous region too.
                        if other.id == old_id {
                            other.id = merge_id;
                        }
                        // Replace the current region with the new one if the
                        // current regions is neighbour.
                        other.replace_neighbor(old_id, merge_id);
                    }
                    merge_count += 1;
                }
            }
            if merge_count == 0 {
                break;
            }
        }

        // Compress region Ids.
        // Slots without spans, like the ones reserved for the painted border, get no id.
        let live_ids: BTreeSet<RegionId> = regions
            .iter()
            .filter(|region| region.span_count > 0 && is_mergeable_id(region.id))
            .map(|region| region.id)
            .collect();
        for region in regions.iter_mut() {
            region.remap = live_ids.contains(&region.id);
        }

        let mut region_id_gen = 0_u16;
        for i in 0..region_count {
            if !regions[i].remap {
                continue;
            }
            let old_id = regions[i].id;
            region_id_gen += 1;
            let new_id = RegionId::from(region_id_gen);
            for region in regions[i..].iter_mut() {
                if region.id == old_id {
                    region.id = new_id;
                    region.remap = false;
                }
            }
        }

        // Remap regions.
        for region in src_reg.iter_mut() {
            if !region.is_border() {
                if let Some(index) = raw_index(*region) {
                    *region = regions[index].id;
                }
            }
        }

        // Return regions that we found to be overlapping.
        let overlaps = regions
            .iter()
            .filter(|region| region.overlap)
            .map(|region| region.id)
            .collect();
        (RegionId::from(region_id_gen), overlaps)
    }
}

/// Merges region `b` into region `a`, both given by their slot.
/// Fails if the regions do not touch along their contours.
fn merge_regions(regions: &mut [Region], a: usize, b: usize) -> bool {
    let a_id = regions[a].id;
    let b_id = regions[b].id;

    // Duplicate current neighbourhood.
    let a_connections = regions[a].connections.clone();
    let b_connections = regions[b].connections.clone();

    // Find insertion point on A.
    let Some(insert_a) = a_connections.iter().position(|c| *c == b_id) else {
        return false;
    };
    // Find insertion point on B.
    let Some(insert_b) = b_connections.iter().position(|c| *c == a_id) else {
        return false;
    };

    let mut connections = Vec::with_capacity(a_connections.len() + b_connections.len());
    let na = a_connections.len();
    for i in 0..na - 1 {
        connections.push(a_connections[(insert_a + 1 + i) % na]);
    }
    let nb = b_connections.len();
    for i in 0..nb - 1 {
        connections.push(b_connections[(insert_b + 1 + i) % nb]);
    }

    let b_floors = std::mem::take(&mut regions[b].floors);
    let b_borders = std::mem::take(&mut regions[b].borders);
    let b_span_count = regions[b].span_count;
    regions[b].span_count = 0;
    regions[b].connections.clear();

    let region_a = &mut regions[a];
    region_a.connections = connections;
    region_a.remove_adjacent_neighbors();
    for floor in b_floors {
        region_a.add_unique_floor(floor);
    }
    for (slot, length) in b_borders {
        *region_a.borders.entry(slot).or_default() += length;
    }
    region_a.span_count += b_span_count;
    true
}

fn is_solid_edge(
    chf: &CompactHeightfield,
    src_reg: &[RegionId],
    x: i32,
    z: i32,
    i: usize,
    dir: u8,
) -> bool {
    let r = chf
        .neighbor_index(x, z, i, dir)
        .map_or(RegionId::NONE, |a_i| src_reg[a_i]);
    r != src_reg[i]
}

/// Walks the contour of the region of span `i`, starting at its solid edge `dir`,
/// and returns the ids of the neighbouring regions in the order they are met.
fn walk_contour(
    chf: &CompactHeightfield,
    mut x: i32,
    mut z: i32,
    mut i: usize,
    mut dir: u8,
    src_reg: &[RegionId],
) -> Vec<RegionId> {
    let start_dir = dir;
    let start_i = i;

    let mut current_region = chf
        .neighbor_index(x, z, i, dir)
        .map_or(RegionId::NONE, |a_i| src_reg[a_i]);
    let mut contour = vec![current_region];

    for _ in 1..40_000 {
        if is_solid_edge(chf, src_reg, x, z, i, dir) {
            // Choose the edge corner
            let r = chf
                .neighbor_index(x, z, i, dir)
                .map_or(RegionId::NONE, |a_i| src_reg[a_i]);
            if r != current_region {
                current_region = r;
                contour.push(current_region);
            }
            // Rotate CW
            dir = (dir + 1) & 0x3;
        } else {
            let Some(con) = chf.spans[i].con(dir) else {
                // Should not happen.
                return contour;
            };
            let (n_x, n_z, n_i) = chf.con_indices(x, z, dir, con);
            x = n_x;
            z = n_z;
            i = n_i;
            // Rotate CCW
            dir = (dir + 3) & 0x3;
        }

        if start_i == i && start_dir == dir {
            break;
        }
    }

    // Remove adjacent duplicates.
    if contour.len() > 1 {
        let mut j = 0;
        while j < contour.len() {
            let nj = (j + 1) % contour.len();
            if contour[j] == contour[nj] {
                contour.remove(j);
            } else {
                j += 1;
            }
        }
    }
    contour
}
