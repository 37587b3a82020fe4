//! Conservative voxelization of triangles into a [`Heightfield`].

use glam::Vec3A;
use thiserror::Error;

use crate::{
    heightfield::{Heightfield, SpanInsertion, SpanInsertionError},
    span::{AreaType, Span, SpanBuilder},
    trimesh::TriMesh,
};

impl Heightfield {
    /// Rasterizes the triangles of a [`TriMesh`] into the heightfield.
    ///
    /// Spans produced by a triangle are merged with the existing spans of their column.
    /// When the ceilings of two merged spans are within `flag_merge_threshold` voxels,
    /// the higher area type wins.
    ///
    /// A failed rasterization leaves the heightfield partially filled. Discard it.
    pub fn rasterize_triangles(
        &mut self,
        trimesh: &TriMesh,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        if trimesh.area_types.len() != trimesh.indices.len() {
            return Err(RasterizationError::AreaCountMismatch {
                triangles: trimesh.indices.len(),
                areas: trimesh.area_types.len(),
            });
        }
        for (i, triangle) in trimesh.indices.iter().enumerate() {
            let mut vertices = [Vec3A::ZERO; 3];
            for (vertex, index) in vertices.iter_mut().zip(triangle.to_array()) {
                *vertex = *trimesh.vertices.get(index as usize).ok_or(
                    RasterizationError::VertexIndexOutOfBounds {
                        triangle: i,
                        index,
                        vertex_count: trimesh.vertices.len(),
                    },
                )?;
            }
            self.rasterize_triangle(vertices, trimesh.area_types[i], flag_merge_threshold)?;
        }
        tracing::debug!(
            triangles = trimesh.indices.len(),
            spans = self.span_count(),
            "Rasterized triangles"
        );
        Ok(())
    }

    /// Rasterizes a single triangle into the heightfield.
    pub fn rasterize_triangle(
        &mut self,
        triangle: [Vec3A; 3],
        area_type: AreaType,
        flag_merge_threshold: u16,
    ) -> Result<(), RasterizationError> {
        let aabb_min = Vec3A::from(self.aabb.min);
        let aabb_max = Vec3A::from(self.aabb.max);
        let inverse_cell_size = 1.0 / self.cell_size;
        let inverse_cell_height = 1.0 / self.cell_height;
        let by = aabb_max.y - aabb_min.y;
        let width = self.width as i32;
        let height = self.height as i32;

        let tri_min = triangle[0].min(triangle[1]).min(triangle[2]);
        let tri_max = triangle[0].max(triangle[1]).max(triangle[2]);

        // If the triangle does not touch the bounding box of the heightfield, skip the triangle.
        if tri_min.cmpgt(aabb_max).any() || tri_max.cmplt(aabb_min).any() {
            return Ok(());
        }

        // Calculate the footprint of the triangle on the grid's z-axis
        let z0 = ((tri_min.z - aabb_min.z) * inverse_cell_size) as i32;
        let z1 = ((tri_max.z - aabb_min.z) * inverse_cell_size) as i32;

        // use -1 rather than 0 to cut the polygon properly at the start of the tile
        let z0 = z0.clamp(-1, height - 1);
        let z1 = z1.clamp(0, height - 1);

        let mut remaining: Vec<Vec3A> = triangle.to_vec();
        let mut row = Vec::with_capacity(7);
        let mut rest = Vec::with_capacity(7);
        let mut cell = Vec::with_capacity(7);
        let mut row_rest = Vec::with_capacity(7);

        for z in z0..=z1 {
            // Clip polygon to row. Store the remaining polygon as well
            let cell_z = aabb_min.z + z as f32 * self.cell_size;
            divide_poly(&remaining, &mut row, &mut rest, cell_z + self.cell_size, Axis::Z);
            std::mem::swap(&mut remaining, &mut rest);

            if row.len() < 3 || z < 0 {
                continue;
            }

            // find X-axis bounds of the row
            let (min_x, max_x) = row
                .iter()
                .fold((row[0].x, row[0].x), |(min, max), v| (min.min(v.x), max.max(v.x)));
            let x0 = ((min_x - aabb_min.x) * inverse_cell_size) as i32;
            let x1 = ((max_x - aabb_min.x) * inverse_cell_size) as i32;
            if x1 < 0 || x0 >= width {
                continue;
            }
            let x0 = x0.clamp(-1, width - 1);
            let x1 = x1.clamp(0, width - 1);

            for x in x0..=x1 {
                // Clip polygon to column. Store the remaining polygon as well
                let cell_x = aabb_min.x + x as f32 * self.cell_size;
                divide_poly(&row, &mut cell, &mut row_rest, cell_x + self.cell_size, Axis::X);
                std::mem::swap(&mut row, &mut row_rest);

                if cell.len() < 3 || x < 0 {
                    continue;
                }

                // Calculate min and max of the span.
                let (span_min, span_max) = cell
                    .iter()
                    .fold((cell[0].y, cell[0].y), |(min, max), v| (min.min(v.y), max.max(v.y)));
                let span_min = span_min - aabb_min.y;
                let span_max = span_max - aabb_min.y;

                // Skip the span if it's completely outside the heightfield bounding box
                if span_max < 0.0 || span_min > by {
                    continue;
                }
                // Clamp the span to the heightfield bounding box.
                let span_min = span_min.max(0.0);
                let span_max = span_max.min(by);

                // Snap the span to the heightfield height grid.
                let span_min_cell = ((span_min * inverse_cell_height).floor() as i32)
                    .clamp(0, Span::MAX_HEIGHT as i32) as u16;
                let span_max_cell = ((span_max * inverse_cell_height).ceil() as i32)
                    .clamp(span_min_cell as i32 + 1, Span::MAX_HEIGHT as i32)
                    as u16;

                self.add_span(SpanInsertion {
                    x: x as u16,
                    z: z as u16,
                    flag_merge_threshold,
                    span: SpanBuilder {
                        min: span_min_cell,
                        max: span_max_cell,
                        area: area_type,
                        next: None,
                    }
                    .build(),
                })?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Axis {
    X,
    Z,
}

/// Divides a convex polygon along one axis.
/// `below` receives the part with coordinates less than `axis_offset`, `above` the rest.
fn divide_poly(
    polygon: &[Vec3A],
    below: &mut Vec<Vec3A>,
    above: &mut Vec<Vec3A>,
    axis_offset: f32,
    axis: Axis,
) {
    below.clear();
    above.clear();
    let coord = |v: Vec3A| match axis {
        Axis::X => v.x,
        Axis::Z => v.z,
    };
    let n = polygon.len();
    if n == 0 {
        return;
    }
    let mut j = n - 1;
    for i in 0..n {
        let d_j = axis_offset - coord(polygon[j]);
        let d_i = axis_offset - coord(polygon[i]);
        let in_a = d_j >= 0.0;
        let in_b = d_i >= 0.0;
        if in_a != in_b {
            // The edge crosses the dividing line, add the intersection to both halves.
            let s = d_j / (d_j - d_i);
            let intersection = polygon[j] + (polygon[i] - polygon[j]) * s;
            below.push(intersection);
            above.push(intersection);
            if d_i > 0.0 {
                below.push(polygon[i]);
            } else if d_i < 0.0 {
                above.push(polygon[i]);
            }
        } else {
            if d_i >= 0.0 {
                below.push(polygon[i]);
                if d_i != 0.0 {
                    j = i;
                    continue;
                }
            }
            above.push(polygon[i]);
        }
        j = i;
    }
}

/// Errors that can occur while rasterizing triangles.
#[derive(Error, Debug)]
pub enum RasterizationError {
    /// A triangle references a vertex that does not exist.
    #[error(
        "triangle {triangle} references vertex {index}, but the mesh only has {vertex_count} vertices"
    )]
    VertexIndexOutOfBounds {
        /// The index of the offending triangle
        triangle: usize,
        /// The invalid vertex index
        index: u32,
        /// The number of vertices in the mesh
        vertex_count: usize,
    },
    /// The trimesh does not have exactly one area type per triangle.
    #[error("trimesh has {triangles} triangles but {areas} area types")]
    AreaCountMismatch {
        /// The number of triangles
        triangles: usize,
        /// The number of area types
        areas: usize,
    },
    /// A span could not be inserted.
    #[error(transparent)]
    SpanInsertion(#[from] SpanInsertionError),
}

#[cfg(test)]
mod tests {
    use glam::{UVec3, Vec3};

    use crate::{Aabb3d, HeightfieldBuilder};

    use super::*;

    fn heightfield() -> Heightfield {
        HeightfieldBuilder {
            aabb: Aabb3d {
                min: Vec3::new(0.0, 0.0, 0.0),
                max: Vec3::new(4.0, 4.0, 4.0),
            },
            cell_size: 1.0,
            cell_height: 0.5,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn flat_quad_covers_every_column() {
        let mut heightfield = heightfield();
        let trimesh = TriMesh {
            vertices: vec![
                Vec3A::new(0.0, 1.0, 0.0),
                Vec3A::new(0.0, 1.0, 4.0),
                Vec3A::new(4.0, 1.0, 4.0),
                Vec3A::new(4.0, 1.0, 0.0),
            ],
            indices: vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)],
            area_types: vec![AreaType::DEFAULT_WALKABLE; 2],
        };
        heightfield.rasterize_triangles(&trimesh, 1).unwrap();
        for z in 0..4 {
            for x in 0..4 {
                let spans: Vec<_> = heightfield.column(x, z).collect();
                assert_eq!(spans.len(), 1, "column {x}/{z} should have one span");
                assert_eq!(spans[0].min(), 2);
                assert_eq!(spans[0].max(), 3);
                assert_eq!(spans[0].area(), AreaType::DEFAULT_WALKABLE);
            }
        }
    }

    #[test]
    fn triangle_outside_of_bounds_is_ignored() {
        let mut heightfield = heightfield();
        let triangle = [
            Vec3A::new(10.0, 1.0, 10.0),
            Vec3A::new(10.0, 1.0, 12.0),
            Vec3A::new(12.0, 1.0, 10.0),
        ];
        heightfield
            .rasterize_triangle(triangle, AreaType::DEFAULT_WALKABLE, 1)
            .unwrap();
        assert_eq!(heightfield.span_count(), 0);
    }

    #[test]
    fn invalid_vertex_index_is_an_error() {
        let mut heightfield = heightfield();
        let trimesh = TriMesh {
            vertices: vec![Vec3A::ZERO; 3],
            indices: vec![UVec3::new(0, 1, 3)],
            area_types: vec![AreaType::DEFAULT_WALKABLE],
        };
        let result = heightfield.rasterize_triangles(&trimesh, 1);
        assert!(matches!(
            result,
            Err(RasterizationError::VertexIndexOutOfBounds { index: 3, .. })
        ));
    }

    #[test]
    fn divide_poly_splits_square() {
        let square = [
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 0.0, 2.0),
            Vec3A::new(2.0, 0.0, 2.0),
            Vec3A::new(2.0, 0.0, 0.0),
        ];
        let mut below = Vec::new();
        let mut above = Vec::new();
        divide_poly(&square, &mut below, &mut above, 1.0, Axis::X);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }
}
