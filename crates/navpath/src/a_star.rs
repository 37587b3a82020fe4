//! Heuristic corridor search between two cells of a [`TriNavMesh`].

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::{
    SearchState, TriNavMesh,
    path_node::{NodeKey, PathNode, PathNodeHeap},
    tri_cell::{CellId, TriCell},
};

/// Estimates the remaining distance between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceHeuristic {
    /// The largest of the per-axis distances.
    LongestAxis,
    /// The sum of the per-axis distances.
    Manhattan,
}

impl DistanceHeuristic {
    /// The estimated distance from `a` to `b`.
    pub fn estimate(self, a: Vec3, b: Vec3) -> f32 {
        let delta = (a - b).abs();
        match self {
            Self::LongestAxis => delta.max_element(),
            Self::Manhattan => delta.x + delta.y + delta.z,
        }
    }
}

/// Finds a corridor of cells from a start cell to a single goal cell.
///
/// Costs are measured like in [`DijkstraSearch`](crate::DijkstraSearch). Open cells are ordered
/// by that cost plus the [`DistanceHeuristic`] from their centroid to the goal point.
#[derive(Debug, Clone)]
pub struct AStarSearch<'a> {
    mesh: &'a TriNavMesh,
    heuristic: DistanceHeuristic,
    state: SearchState,
    heap: PathNodeHeap,
    open: HashMap<CellId, NodeKey>,
    closed: HashSet<CellId>,
    path: Vec<CellId>,
    start: Vec3,
    goal: Vec3,
    /// Start and goal cell of the current search.
    cells: Option<(CellId, CellId)>,
}

impl<'a> AStarSearch<'a> {
    /// Creates an uninitialized search on `mesh`.
    pub fn new(mesh: &'a TriNavMesh, heuristic: DistanceHeuristic) -> Self {
        Self {
            mesh,
            heuristic,
            state: SearchState::Uninitialized,
            heap: PathNodeHeap::new(),
            open: HashMap::new(),
            closed: HashSet::new(),
            path: Vec::new(),
            start: Vec3::ZERO,
            goal: Vec3::ZERO,
            cells: None,
        }
    }

    /// Sets up a search from `start` in `start_cell` to `goal` in `goal_cell`, discarding any
    /// previous one.
    pub fn initialize(
        &mut self,
        start: Vec3,
        goal: Vec3,
        start_cell: CellId,
        goal_cell: CellId,
    ) -> SearchState {
        self.reset();
        self.start = start;
        self.goal = goal;
        self.cells = Some((start_cell, goal_cell));
        self.heap.push(PathNode::root(start_cell));
        self.state = SearchState::Initialized;
        tracing::trace!("Initialized A* search from {start_cell:?} to {goal_cell:?}");
        self.state
    }

    /// Expands the most promising open node.
    ///
    /// Does nothing unless the search is active.
    pub fn process(&mut self) -> SearchState {
        let Some((start_cell, goal_cell)) = self.cells else {
            return self.state;
        };
        if self.state == SearchState::Initialized {
            self.state = SearchState::Processing;
            if start_cell == goal_cell {
                self.path = vec![start_cell];
                return self.complete();
            }
        }
        if self.state != SearchState::Processing {
            return self.state;
        }

        let mesh = self.mesh;
        let Some(current) = self.heap.poll() else {
            return self.fail();
        };
        let Some(node) = self.heap.get(current).copied() else {
            return self.fail();
        };
        self.closed.insert(node.cell);
        self.open.remove(&node.cell);

        if node.cell == goal_cell {
            self.path = self.heap.path(current);
            return self.complete();
        }
        let Some(cell) = mesh.cell(node.cell) else {
            return self.fail();
        };

        for wall in 0..TriCell::MAX_LINKS {
            let Some(linked) = cell.link(wall) else {
                continue;
            };
            if self.closed.contains(&linked) {
                continue;
            }
            let Some(linked_cell) = mesh.cell(linked) else {
                continue;
            };
            if linked_cell.link_count() == 1 {
                // A dead-end goal can only be reached from here.
                if linked == goal_cell {
                    self.path = self.heap.path(current);
                    self.path.push(linked);
                    return self.complete();
                }
                continue;
            }

            let local_g = self.heap.step_cost(&node, cell, wall, self.start);
            match self.open.get(&linked).copied() {
                Some(existing) => {
                    self.heap.relax(existing, current, local_g);
                }
                None => {
                    if let Some(key) = self.heap.push_child(linked, current, local_g) {
                        let h = self.heuristic.estimate(linked_cell.centroid(), self.goal);
                        self.heap.set_heuristic(key, h);
                        self.open.insert(linked, key);
                    }
                }
            }
        }

        if self.heap.is_empty() {
            return self.fail();
        }
        self.state
    }

    fn complete(&mut self) -> SearchState {
        self.cleanup();
        self.state = SearchState::Complete;
        self.state
    }

    fn fail(&mut self) -> SearchState {
        self.cleanup();
        self.state = SearchState::Failed;
        tracing::trace!("A* search failed");
        self.state
    }

    fn cleanup(&mut self) {
        self.heap.clear();
        self.open.clear();
        self.closed.clear();
    }

    /// Discards the current search and its result.
    pub fn reset(&mut self) {
        self.cleanup();
        self.state = SearchState::Uninitialized;
        self.start = Vec3::ZERO;
        self.goal = Vec3::ZERO;
        self.cells = None;
        self.path.clear();
    }

    /// The state of the search.
    #[inline]
    pub fn state(&self) -> SearchState {
        self.state
    }

    /// Whether the search has been initialized and has not finished yet.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.state, SearchState::Initialized | SearchState::Processing)
    }

    /// The corridor from the start cell to the goal cell, once the search is complete.
    pub fn path_cells(&self) -> Option<&[CellId]> {
        (self.state == SearchState::Complete).then_some(self.path.as_slice())
    }

    /// The goal point passed to [`AStarSearch::initialize`].
    #[inline]
    pub fn goal(&self) -> Vec3 {
        self.goal
    }

    /// The heuristic ordering the open cells.
    #[inline]
    pub fn heuristic(&self) -> DistanceHeuristic {
        self.heuristic
    }

    /// The mesh being searched.
    #[inline]
    pub fn mesh(&self) -> &'a TriNavMesh {
        self.mesh
    }
}
