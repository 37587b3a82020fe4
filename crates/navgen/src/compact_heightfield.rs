use thiserror::Error;

use crate::{
    Aabb3d,
    compact_cell::CompactCell,
    compact_span::CompactSpan,
    heightfield::Heightfield,
    math::{dir_offset_x, dir_offset_z},
    region::RegionId,
    span::AreaType,
};

/// A packed representation of the walkable spans of a [`Heightfield`], with the
/// open space above each span and the connections between neighboring spans.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CompactHeightfield {
    /// The width of the heightfield along the x-axis in cell units
    pub width: u16,
    /// The height of the heightfield along the z-axis in cell units
    pub height: u16,
    /// The walkable height used during the build of the field
    pub walkable_height: u16,
    /// The walkable climb used during the build of the field.
    pub walkable_climb: u16,
    /// The AABB border size used during the build of the field.
    pub border_size: u16,
    /// The maximum distance value of any span within the field.
    pub max_distance: u16,
    /// The maximum region id of any span within the field.
    pub max_region: RegionId,
    /// The AABB of the heightfield
    pub aabb: Aabb3d,
    /// The size of each cell on the xz-plane
    pub cell_size: f32,
    /// The size of each cell along the y-axis
    pub cell_height: f32,
    /// The cells in the heightfield [Size: `width * height`]
    pub cells: Vec<CompactCell>,
    /// All walkable spans in the heightfield
    pub spans: Vec<CompactSpan>,
    /// Vector containing border distance data. [Size: `spans.len()`]
    pub dist: Vec<u16>,
    /// Vector containing area type data. [Size: `spans.len()`]
    pub areas: Vec<AreaType>,
}

impl Heightfield {
    /// Builds a compact heightfield out of the walkable spans of this heightfield.
    ///
    /// # Errors
    ///
    /// Returns an error if a column has more spans than a neighbor connection can address.
    pub fn into_compact(
        self,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<CompactHeightfield, CompactHeightfieldError> {
        CompactHeightfield::from_heightfield(self, walkable_height, walkable_climb)
    }
}

impl CompactHeightfield {
    const MAX_HEIGHT: u16 = u16::MAX;

    /// Builds a compact heightfield from a heightfield.
    ///
    /// A heightfield without walkable spans produces a compact heightfield without spans.
    ///
    /// # Errors
    ///
    /// Returns an error if the heightfield has too many layers.
    pub fn from_heightfield(
        heightfield: Heightfield,
        walkable_height: u16,
        walkable_climb: u16,
    ) -> Result<Self, CompactHeightfieldError> {
        let walkable_span_count = heightfield.walkable_span_count();

        let mut compact_heightfield = Self {
            width: heightfield.width,
            height: heightfield.height,
            walkable_height,
            walkable_climb,
            border_size: 0,
            aabb: heightfield.aabb,
            max_distance: 0,
            max_region: RegionId::NONE,
            cell_size: heightfield.cell_size,
            cell_height: heightfield.cell_height,
            cells: vec![
                CompactCell::default();
                heightfield.width as usize * heightfield.height as usize
            ],
            spans: vec![CompactSpan::default(); walkable_span_count],
            dist: vec![0; walkable_span_count],
            areas: vec![AreaType::NOT_WALKABLE; walkable_span_count],
        };
        compact_heightfield.aabb.max.y += walkable_height as f32 * compact_heightfield.cell_height;

        let mut cell_index = 0_usize;
        // Fill in cells and spans
        for z in 0..heightfield.height {
            for x in 0..heightfield.width {
                let column_index = heightfield.column_index(x, z);
                let cell = &mut compact_heightfield.cells[column_index];
                cell.set_index(cell_index as u32);
                cell.set_count(0);

                for span in heightfield.column(x, z) {
                    if !span.area().is_walkable() {
                        continue;
                    }
                    let bot = span.max();
                    let top = span
                        .next()
                        .map(|next| heightfield.span(next).min())
                        .unwrap_or(Self::MAX_HEIGHT);
                    let compact_span = &mut compact_heightfield.spans[cell_index];
                    compact_span.y = bot;
                    let height = top.saturating_sub(bot).min(u8::MAX.into()) as u8;
                    compact_span.set_height(height);
                    compact_heightfield.areas[cell_index] = span.area();
                    cell_index += 1;
                    cell.inc_count();
                }
            }
        }

        // Find neighbour connections
        const MAX_LAYERS: u8 = CompactSpan::NOT_CONNECTED - 1;
        let mut too_high_layer_index = None;
        for z in 0..compact_heightfield.height {
            for x in 0..compact_heightfield.width {
                let cell = *compact_heightfield.cell_at(x, z);
                for i in cell.index_range() {
                    for dir in 0..4_u8 {
                        compact_heightfield.spans[i].set_con(dir, None);
                        let neighbor_x = x as i32 + dir_offset_x(dir) as i32;
                        let neighbor_z = z as i32 + dir_offset_z(dir) as i32;
                        // First check that the neighbour cell is in bounds.
                        if !compact_heightfield.contains(neighbor_x, neighbor_z) {
                            continue;
                        }

                        // Iterate over all neighbour spans and check if any of the is
                        // accessible from current cell.
                        let neighbor_cell =
                            *compact_heightfield.cell_at(neighbor_x as u16, neighbor_z as u16);
                        let span = compact_heightfield.spans[i].clone();
                        for k in neighbor_cell.index_range() {
                            let neighbor_span = &compact_heightfield.spans[k];
                            let bot = span.y.max(neighbor_span.y) as i32;
                            let top = (span.y as i32 + span.height() as i32)
                                .min(neighbor_span.y as i32 + neighbor_span.height() as i32);

                            // Check that the gap between the spans is walkable,
                            // and that the climb height between the gaps is not too high.
                            let is_walkable = top - bot >= walkable_height as i32;
                            let is_climbable = (neighbor_span.y as i32 - span.y as i32).abs()
                                <= walkable_climb as i32;
                            if !is_walkable || !is_climbable {
                                continue;
                            }
                            // Mark direction as walkable.
                            let layer_index = k - neighbor_cell.index() as usize;
                            if layer_index >= MAX_LAYERS as usize {
                                too_high_layer_index = too_high_layer_index.max(Some(layer_index));
                                continue;
                            }
                            compact_heightfield.spans[i].set_con(dir, Some(layer_index as u8));
                            break;
                        }
                    }
                }
            }
        }
        if let Some(layer_index) = too_high_layer_index {
            return Err(CompactHeightfieldError::TooManyLayers {
                max_layer_index: MAX_LAYERS,
                layer_index,
            });
        }
        tracing::debug!(
            spans = compact_heightfield.spans.len(),
            "Built compact heightfield"
        );
        Ok(compact_heightfield)
    }

    #[inline]
    pub(crate) fn column_index(&self, x: u16, z: u16) -> usize {
        x as usize + z as usize * self.width as usize
    }

    #[inline]
    pub(crate) fn contains(&self, x: i32, z: i32) -> bool {
        x >= 0 && x < self.width as i32 && z >= 0 && z < self.height as i32
    }

    /// Returns the cell at the given coordinates. Returns `None` if the coordinates are invalid.
    #[inline]
    pub fn get_cell_at(&self, x: u16, z: u16) -> Option<&CompactCell> {
        if x >= self.width || z >= self.height {
            return None;
        }
        self.cells.get(self.column_index(x, z))
    }

    /// Returns the cell at the given coordinates. Panics if the coordinates are invalid.
    #[inline]
    pub fn cell_at(&self, x: u16, z: u16) -> &CompactCell {
        &self.cells[self.column_index(x, z)]
    }

    /// Resolves a neighbor connection of the span at `(x, z)` into the neighbor's
    /// column coordinates and span index.
    #[inline]
    pub(crate) fn con_indices(&self, x: i32, z: i32, dir: u8, con: u8) -> (i32, i32, usize) {
        let a_x = x + dir_offset_x(dir) as i32;
        let a_z = z + dir_offset_z(dir) as i32;
        let cell = &self.cells[(a_x + a_z * self.width as i32) as usize];
        let a_i = cell.index() as usize + con as usize;
        (a_x, a_z, a_i)
    }

    /// The span index of the neighbor of span `i` at `(x, z)` in direction `dir`, if connected.
    #[inline]
    pub(crate) fn neighbor_index(&self, x: i32, z: i32, i: usize, dir: u8) -> Option<usize> {
        let con = self.spans[i].con(dir)?;
        Some(self.con_indices(x, z, dir, con).2)
    }

    /// Number of distinct non-border regions. Equal to the maximum region id once regions are built.
    pub fn region_count(&self) -> usize {
        self.max_region.bits() as usize
    }
}

/// Errors that can occur when building a compact heightfield.
#[derive(Debug, Error)]
pub enum CompactHeightfieldError {
    /// The heightfield has too many layers.
    #[error(
        "Heightfield has too many layers. Max layer index is {max_layer_index}, but got {layer_index}"
    )]
    TooManyLayers {
        /// The maximum layer index.
        max_layer_index: u8,
        /// The layer index that caused the error.
        layer_index: usize,
    },
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use crate::{
        HeightfieldBuilder,
        heightfield::SpanInsertion,
        span::SpanBuilder,
    };

    use super::*;

    fn heightfield() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::ZERO,
                max: Vec3::new(3.0, 10.0, 3.0),
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

    #[test]
    fn empty_heightfield_has_no_spans() {
        let compact = heightfield().into_compact(2, 1).unwrap();
        assert!(compact.spans.is_empty());
        assert_eq!(compact.cells.len(), 9);
        assert_eq!(compact.aabb.max.y, 12.0);
    }

    #[test]
    fn only_walkable_spans_are_kept() {
        let mut heightfield = heightfield();
        add(&mut heightfield, 0, 0, 0, 1, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 0, 0, 5, 6, AreaType::NOT_WALKABLE);
        add(&mut heightfield, 1, 0, 0, 2, AreaType(4));
        let compact = heightfield.into_compact(2, 1).unwrap();

        assert_eq!(compact.spans.len(), 2);
        let cell = compact.cell_at(0, 0);
        assert_eq!(cell.count(), 1);
        let span = &compact.spans[cell.index() as usize];
        assert_eq!(span.y, 1);
        // The open space reaches up to the unwalkable span.
        assert_eq!(span.height(), 4);
        assert_eq!(compact.areas[compact.cell_at(1, 0).index() as usize], AreaType(4));
    }

    #[test]
    fn connects_neighbors_within_climb() {
        let mut heightfield = heightfield();
        add(&mut heightfield, 0, 0, 0, 1, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 1, 0, 0, 2, AreaType::DEFAULT_WALKABLE);
        add(&mut heightfield, 2, 0, 0, 5, AreaType::DEFAULT_WALKABLE);
        let compact = heightfield.into_compact(2, 1).unwrap();

        let i0 = compact.cell_at(0, 0).index() as usize;
        let i1 = compact.cell_at(1, 0).index() as usize;
        let i2 = compact.cell_at(2, 0).index() as usize;
        // Direction 2 is +x, direction 0 is -x.
        assert_eq!(compact.spans[i0].con(2), Some(0));
        assert_eq!(compact.spans[i1].con(0), Some(0));
        // A step of 3 voxels is too high to climb.
        assert_eq!(compact.spans[i1].con(2), None);
        assert_eq!(compact.spans[i2].con(0), None);
        // Nothing along z.
        assert_eq!(compact.spans[i0].con(1), None);
        assert_eq!(compact.spans[i0].con(3), None);
    }
}
