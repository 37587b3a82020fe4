//! Fixtures shared by the unit tests of the build stages.

use glam::Vec3;

use crate::{
    Aabb3d, CompactHeightfield, Heightfield, HeightfieldBuilder,
    heightfield::SpanInsertion,
    span::{AreaType, SpanBuilder},
};

/// An empty heightfield with unit cells covering `[0, width] x [0, 16] x [0, height]`.
pub(crate) fn heightfield(width: u16, height: u16) -> Heightfield {
    HeightfieldBuilder {
        aabb: Aabb3d {
            min: Vec3::ZERO,
            max: Vec3::new(width as f32, 16.0, height as f32),
        },
        cell_size: 1.0,
        cell_height: 1.0,
    }
    .build()
    .unwrap()
}

pub(crate) fn add_span(
    heightfield: &mut Heightfield,
    x: u16,
    z: u16,
    min: u16,
    max: u16,
    area: AreaType,
) {
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

/// A compact heightfield built from a heightfield where the columns selected by `is_floor` hold a
/// walkable floor at height 1.
pub(crate) fn compact_from(
    width: u16,
    height: u16,
    is_floor: impl Fn(u16, u16) -> bool,
) -> CompactHeightfield {
    let mut heightfield = heightfield(width, height);
    for z in 0..height {
        for x in 0..width {
            if is_floor(x, z) {
                add_span(&mut heightfield, x, z, 0, 1, AreaType::DEFAULT_WALKABLE);
            }
        }
    }
    heightfield.into_compact(2, 1).unwrap()
}

/// A square compact heightfield that is walkable everywhere.
pub(crate) fn flat_compact(size: u16) -> CompactHeightfield {
    compact_from(size, size, |_, _| true)
}

/// Index of the lowest span of a column.
pub(crate) fn span_index(compact: &CompactHeightfield, x: u16, z: u16) -> usize {
    compact.cell_at(x, z).index() as usize
}
