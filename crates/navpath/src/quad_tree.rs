//! A static quad tree over the xz-bounds of [`TriCell`]s.

use glam::{Vec2, Vec3};
use thiserror::Error;

use crate::{
    geom::Aabb2d,
    tri_cell::{CellId, TriCell},
};

/// Errors that can occur when creating a [`TriCellQuadTree`].
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum QuadTreeError {
    /// The bounds have no area.
    #[error("Quad tree bounds {min} to {max} are degenerate")]
    DegenerateBounds {
        /// The minimum corner.
        min: Vec2,
        /// The maximum corner.
        max: Vec2,
    },
}

/// A quad tree that stores cell ids by their xz-bounds.
///
/// Each cell is stored in the deepest node that fully contains it. Queries take the cell array the
/// ids point into.
#[derive(Debug, Clone, PartialEq)]
pub struct TriCellQuadTree {
    bounds: Aabb2d,
    max_depth: u32,
    depth: u32,
    cells: Vec<CellId>,
    children: Option<Box<[TriCellQuadTree; 4]>>,
}

enum Destination {
    NoFit,
    Here,
    Child(usize),
}

impl TriCellQuadTree {
    /// Creates an empty tree covering `bounds`. `max_depth` is clamped to at least 1.
    pub fn new(bounds: Aabb2d, max_depth: u32) -> Result<Self, QuadTreeError> {
        if bounds.is_degenerate() {
            return Err(QuadTreeError::DegenerateBounds {
                min: bounds.min,
                max: bounds.max,
            });
        }
        Ok(Self {
            bounds,
            max_depth: max_depth.max(1),
            depth: 0,
            cells: Vec::new(),
            children: None,
        })
    }

    fn child(&self, bounds: Aabb2d) -> Self {
        Self {
            bounds,
            max_depth: self.max_depth.saturating_sub(1),
            depth: self.depth + 1,
            cells: Vec::new(),
            children: None,
        }
    }

    /// The area covered by this node.
    #[inline]
    pub fn bounds(&self) -> Aabb2d {
        self.bounds
    }

    /// The depth limit of this node.
    #[inline]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The depth of this node. The root is at depth 0.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// The child nodes, if the node has been split.
    pub fn children(&self) -> Option<&[TriCellQuadTree; 4]> {
        self.children.as_deref()
    }

    /// Both child axes are split using half of the x extent, so children of non-square nodes
    /// overhang or fall short on z.
    fn child_bounds(&self, index: usize) -> Aabb2d {
        let half = (self.bounds.max.x - self.bounds.min.x) * 0.5;
        let min = self.bounds.min;
        let min = match index {
            0 => min,
            1 => Vec2::new(min.x, min.y + half),
            2 => Vec2::new(min.x + half, min.y + half),
            _ => Vec2::new(min.x + half, min.y),
        };
        Aabb2d::new(min, min + Vec2::splat(half))
    }

    fn destination(&self, cell: &TriCell) -> Destination {
        let bounds = cell.bounds();
        if !self.bounds.contains(&bounds) {
            return Destination::NoFit;
        }
        if self.depth < self.max_depth {
            if let Some(index) = (0..4).find(|&i| self.child_bounds(i).contains(&bounds)) {
                return Destination::Child(index);
            }
        }
        Destination::Here
    }

    /// Adds a cell to the deepest node that fully contains its bounds.
    ///
    /// Returns `false` if the cell lies outside of the tree or is already stored.
    pub fn add(&mut self, cell: &TriCell) -> bool {
        match self.destination(cell) {
            Destination::NoFit => false,
            Destination::Child(index) => {
                if self.children.is_none() {
                    let children = [0, 1, 2, 3].map(|i| self.child(self.child_bounds(i)));
                    self.children = Some(Box::new(children));
                }
                match self.children.as_mut() {
                    Some(children) => children[index].add(cell),
                    None => false,
                }
            }
            Destination::Here => {
                if self.cells.contains(&cell.id()) {
                    return false;
                }
                self.cells.push(cell.id());
                true
            }
        }
    }

    /// All stored cell ids, children first.
    pub fn cells(&self) -> Vec<CellId> {
        let mut result = Vec::new();
        self.collect_cells(&mut result);
        result
    }

    fn collect_cells(&self, out: &mut Vec<CellId>) {
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_cells(out);
            }
        }
        out.extend_from_slice(&self.cells);
    }

    /// The cells whose column contains `(x, z)`.
    pub fn cells_for_point(&self, cells: &[TriCell], x: f32, z: f32) -> Vec<CellId> {
        let mut result = Vec::new();
        self.collect_for_point(cells, Vec2::new(x, z), &mut result);
        result
    }

    fn collect_for_point(&self, cells: &[TriCell], point: Vec2, out: &mut Vec<CellId>) {
        if !self.bounds.contains_point(point) {
            return;
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_for_point(cells, point, out);
            }
        }
        out.extend(
            self.cells
                .iter()
                .filter(|id| cells[id.index()].is_in_column(point.x, point.y)),
        );
    }

    /// The cells that overlap `aabb` on the xz-plane.
    pub fn cells_in_column(&self, cells: &[TriCell], aabb: &Aabb2d) -> Vec<CellId> {
        let mut result = Vec::new();
        self.collect_in_column(cells, aabb, &mut result);
        result
    }

    fn collect_in_column(&self, cells: &[TriCell], aabb: &Aabb2d, out: &mut Vec<CellId>) {
        if !self.bounds.intersects(aabb) {
            return;
        }
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_in_column(cells, aabb, out);
            }
        }
        out.extend(
            self.cells
                .iter()
                .filter(|id| cells[id.index()].intersects(aabb)),
        );
    }

    /// Finds the cell closest to `point` and the closest point on it.
    ///
    /// With `must_be_in_column` only cells whose column contains the point are considered and the
    /// one with the smallest vertical distance wins. Otherwise every cell is a candidate.
    pub fn closest_cell(
        &self,
        cells: &[TriCell],
        point: Vec3,
        must_be_in_column: bool,
    ) -> Option<(CellId, Vec3)> {
        if !must_be_in_column {
            let candidates = self.cells();
            return TriCell::closest_cell(point, candidates.iter().map(|id| &cells[id.index()]));
        }

        let mut closest = None;
        let mut min_delta_y = f32::MAX;
        for id in self.cells_for_point(cells, point.x, point.z) {
            let y = cells[id.index()].plane_y(point.x, point.z);
            let delta_y = (y - point.y).abs();
            if delta_y < min_delta_y {
                min_delta_y = delta_y;
                closest = Some((id, Vec3::new(point.x, y, point.z)));
            }
        }
        closest
    }
}
