//! A triangle navigation mesh with point location and line-of-sight queries.

use glam::{Vec2, Vec3, Vec3Swizzles as _};
use thiserror::Error;

use crate::{
    geom::{Aabb2d, TOLERANCE},
    quad_tree::{QuadTreeError, TriCellQuadTree},
    tri_cell::{CellId, PathRelationship, TriCell, TriCellError},
};

/// Errors that can occur when building a [`TriNavMesh`].
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum TriNavMeshError {
    /// The vertex array does not hold whole `[x, y, z]` triples.
    #[error("Vertex array length {0} is not a multiple of 3")]
    RaggedVertices(usize),
    /// The index array does not hold whole triangles.
    #[error("Index array length {0} is not a multiple of 3")]
    RaggedIndices(usize),
    /// The mesh has no triangles.
    #[error("The mesh has no triangles")]
    Empty,
    /// A triangle could not be created.
    #[error(transparent)]
    Cell(#[from] TriCellError),
    /// The spatial index could not be created.
    #[error(transparent)]
    QuadTree(#[from] QuadTreeError),
}

/// A navigation mesh made of linked [`TriCell`]s.
///
/// The mesh is read-only once built and can be shared between any number of searches.
#[derive(Debug, Clone, PartialEq)]
pub struct TriNavMesh {
    cells: Vec<TriCell>,
    tree: TriCellQuadTree,
    plane_tolerance: f32,
    offset_scale: f32,
}

impl TriNavMesh {
    /// Builds a mesh from flat `[x, y, z, ...]` vertices and triangle indices.
    ///
    /// `spatial_depth` limits the depth of the quad tree. `plane_tolerance` and `offset_scale` are
    /// stored for callers and clamped to be positive and non-negative respectively.
    pub fn build(
        vertices: &[f32],
        indices: &[u32],
        spatial_depth: u32,
        plane_tolerance: f32,
        offset_scale: f32,
    ) -> Result<Self, TriNavMeshError> {
        if vertices.len() % 3 != 0 {
            return Err(TriNavMeshError::RaggedVertices(vertices.len()));
        }
        if indices.len() % 3 != 0 {
            return Err(TriNavMeshError::RaggedIndices(indices.len()));
        }
        if indices.is_empty() {
            return Err(TriNavMeshError::Empty);
        }

        let bounds = Aabb2d::from_points(
            vertices
                .chunks_exact(3)
                .map(|vertex| Vec2::new(vertex[0], vertex[2])),
        )
        .ok_or(TriNavMeshError::Empty)?;
        let mut tree = TriCellQuadTree::new(bounds, spatial_depth)?;

        let cells = indices
            .chunks_exact(3)
            .enumerate()
            .map(|(i, triangle)| {
                TriCell::new(
                    CellId(i as u32),
                    vertices,
                    triangle[0],
                    triangle[1],
                    triangle[2],
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        for cell in &cells {
            if !tree.add(cell) {
                tracing::warn!("Cell {:?} could not be added to the spatial index", cell.id());
            }
        }

        let mut mesh = Self {
            cells,
            tree,
            plane_tolerance: plane_tolerance.max(f32::MIN_POSITIVE),
            offset_scale: offset_scale.max(0.0),
        };
        mesh.link_cells();
        tracing::debug!("Built triangle navmesh with {} cells", mesh.cells.len());
        Ok(mesh)
    }

    fn link_cells(&mut self) {
        for index in 0..self.cells.len() {
            if self.cells[index].link_count() == TriCell::MAX_LINKS {
                continue;
            }
            let column = self.cells[index].bounds().expanded(TOLERANCE);
            for neighbor in self.tree.cells_in_column(&self.cells, &column) {
                if neighbor.index() == index {
                    continue;
                }
                let Some((cell, other)) = pair_mut(&mut self.cells, index, neighbor.index()) else {
                    continue;
                };
                if cell.link_to(other, true).is_some() && cell.link_count() == TriCell::MAX_LINKS
                {
                    break;
                }
            }
        }
    }

    /// Finds the cell closest to `point` and the closest point on it.
    ///
    /// With `must_be_in_column` the point must lie within the column of the returned cell.
    pub fn closest_cell(&self, point: Vec3, must_be_in_column: bool) -> Option<(CellId, Vec3)> {
        self.tree.closest_cell(&self.cells, point, must_be_in_column)
    }

    /// Whether `point` lies in the column of a cell and within `y_tolerance` of its surface.
    pub fn is_valid_position(&self, point: Vec3, y_tolerance: f32) -> bool {
        match self.closest_cell(point, true) {
            Some((_, on_mesh)) => (point.y - on_mesh.y).abs() <= y_tolerance,
            None => false,
        }
    }

    /// Whether the straight line from `start` to `end` stays on the mesh when walked across linked
    /// cells. Heights are ignored.
    ///
    /// Points that sit exactly on a vertex are nudged toward the centroid of their cell by
    /// `offset_scale` first. The nudge only depends on a point and its own cell, so swapping both
    /// endpoints together with their cells gives the same answer. Giving a vertex point a
    /// different one of its cells can change the answer.
    pub fn has_los(
        &self,
        start: Vec3,
        end: Vec3,
        start_cell: CellId,
        end_cell: CellId,
        offset_scale: f32,
    ) -> bool {
        let (Some(first), Some(last)) = (self.cell(start_cell), self.cell(end_cell)) else {
            return false;
        };
        let start = first.safe_point(start.x, start.z, offset_scale);
        let end = last.safe_point(end.x, end.z, offset_scale);

        let mut relationship = first.path_relationship(start, end);
        // A straight line enters every cell at most once.
        for _ in 0..self.cells.len() {
            let PathRelationship::ExitingCell { next, .. } = relationship else {
                break;
            };
            let Some(next) = next else {
                return false;
            };
            if next == end_cell {
                return true;
            }
            let Some(cell) = self.cell(next) else {
                return false;
            };
            relationship = cell.path_relationship(start, end);
        }
        relationship == PathRelationship::EndingCell
    }

    /// Looks up a cell.
    #[inline]
    pub fn cell(&self, id: CellId) -> Option<&TriCell> {
        self.cells.get(id.index())
    }

    /// All cells, indexed by [`CellId::index`].
    #[inline]
    pub fn cells(&self) -> &[TriCell] {
        &self.cells
    }

    /// The number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// The spatial index over the cells.
    #[inline]
    pub fn quad_tree(&self) -> &TriCellQuadTree {
        &self.tree
    }

    /// The vertical tolerance the mesh was built with.
    #[inline]
    pub fn plane_tolerance(&self) -> f32 {
        self.plane_tolerance
    }

    /// The vertex offset scale the mesh was built with.
    #[inline]
    pub fn offset_scale(&self) -> f32 {
        self.offset_scale
    }

    /// Removes the link between two cells in both directions. Returns whether they were linked.
    pub fn unlink(&mut self, a: CellId, b: CellId) -> bool {
        let Some((cell, other)) = pair_mut(&mut self.cells, a.index(), b.index()) else {
            return false;
        };
        let (Some(wall), Some(other_wall)) = (cell.link_index(b), other.link_index(a)) else {
            return false;
        };
        cell.unlink(wall);
        other.unlink(other_wall);
        true
    }
}

/// Borrows two distinct cells mutably.
fn pair_mut(cells: &mut [TriCell], a: usize, b: usize) -> Option<(&mut TriCell, &mut TriCell)> {
    if a == b || a >= cells.len() || b >= cells.len() {
        return None;
    }
    if a < b {
        let (head, tail) = cells.split_at_mut(b);
        Some((&mut head[a], &mut tail[0]))
    } else {
        let (head, tail) = cells.split_at_mut(a);
        Some((&mut tail[0], &mut head[b]))
    }
}
