//! Uniform-cost corridor search over a [`TriNavMesh`].

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::{
    TriNavMesh,
    path_node::{NodeKey, PathNode, PathNodeHeap},
    tri_cell::{CellId, TriCell},
};

/// The state of a [`DijkstraSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchState {
    /// No search has been set up.
    #[default]
    Uninitialized,
    /// A search has been set up but not processed yet.
    Initialized,
    /// The search is running.
    Processing,
    /// At least one goal has been reached.
    Complete,
    /// No goal could be reached.
    Failed,
}

/// Finds corridors of cells from a start cell to one or more goal cells.
///
/// Costs are the distances between the midpoints of the walls a corridor crosses. The first step
/// is measured from the start point. The search advances one node per [`DijkstraSearch::process`]
/// call, so it can be spread over several frames.
#[derive(Debug, Clone)]
pub struct DijkstraSearch<'a> {
    mesh: &'a TriNavMesh,
    state: SearchState,
    heap: PathNodeHeap,
    open: HashMap<CellId, NodeKey>,
    closed: HashSet<CellId>,
    paths: Vec<Vec<CellId>>,
    start: Vec3,
    goals: Vec<Vec3>,
    goal_cells: Vec<CellId>,
    max_search_depth: usize,
    select_first: bool,
}

impl<'a> DijkstraSearch<'a> {
    /// Creates an uninitialized search on `mesh`.
    pub fn new(mesh: &'a TriNavMesh) -> Self {
        Self {
            mesh,
            state: SearchState::Uninitialized,
            heap: PathNodeHeap::new(),
            open: HashMap::new(),
            closed: HashSet::new(),
            paths: Vec::new(),
            start: Vec3::ZERO,
            goals: Vec::new(),
            goal_cells: Vec::new(),
            max_search_depth: 1,
            select_first: false,
        }
    }

    /// Sets up a new search, discarding any previous one.
    ///
    /// `goals` are stored for the caller and do not affect the search. Corridors are cut off once
    /// they are `max_search_depth` cells long, which is clamped to at least 1. With
    /// `select_first` the search stops at the first goal it reaches. It also stops there when
    /// there is only one goal cell.
    pub fn initialize(
        &mut self,
        start: Vec3,
        goals: &[Vec3],
        start_cell: CellId,
        goal_cells: &[CellId],
        max_search_depth: usize,
        select_first: bool,
    ) -> SearchState {
        self.reset();
        self.max_search_depth = max_search_depth.max(1);
        self.start = start;
        self.goals.extend_from_slice(goals);
        self.goal_cells.extend_from_slice(goal_cells);
        self.select_first = select_first;
        self.heap.push(PathNode::root(start_cell));
        self.state = SearchState::Initialized;
        tracing::trace!(
            "Initialized corridor search from {start_cell:?} to {} goal cells",
            goal_cells.len()
        );
        self.state
    }

    /// Expands the cheapest open node.
    ///
    /// Does nothing unless the search is active.
    pub fn process(&mut self) -> SearchState {
        match self.state {
            SearchState::Initialized => self.state = SearchState::Processing,
            SearchState::Processing => {}
            _ => return self.state,
        }

        let mesh = self.mesh;
        let Some(current) = self.heap.poll() else {
            return self.finish();
        };
        let Some(node) = self.heap.get(current).copied() else {
            return self.finish();
        };
        self.closed.insert(node.cell);
        self.open.remove(&node.cell);
        let Some(cell) = mesh.cell(node.cell) else {
            return self.finish();
        };

        for wall in 0..TriCell::MAX_LINKS {
            let Some(linked) = cell.link(wall) else {
                continue;
            };
            if self.closed.contains(&linked) {
                continue;
            }

            if let Some(goal_index) = self.goal_cells.iter().position(|goal| *goal == linked) {
                let mut path = self.heap.path(current);
                path.push(linked);
                self.paths.push(path);
                if self.select_first || self.goal_cells.len() == 1 {
                    self.cleanup();
                    self.state = SearchState::Complete;
                    return self.state;
                }
                self.goal_cells.remove(goal_index);
            }

            let Some(linked_cell) = mesh.cell(linked) else {
                continue;
            };
            // Dead ends can never be part of a corridor to another cell.
            if linked_cell.link_count() == 1 {
                self.closed.insert(linked);
                continue;
            }
            if node.path_size >= self.max_search_depth {
                continue;
            }

            let local_g = self.heap.step_cost(&node, cell, wall, self.start);
            match self.open.get(&linked).copied() {
                Some(existing) => {
                    self.heap.relax(existing, current, local_g);
                }
                None => {
                    if let Some(key) = self.heap.push_child(linked, current, local_g) {
                        self.open.insert(linked, key);
                    }
                }
            }
        }

        if self.heap.is_empty() {
            return self.finish();
        }
        self.state
    }

    fn finish(&mut self) -> SearchState {
        self.cleanup();
        self.state = if self.paths.is_empty() {
            SearchState::Failed
        } else {
            SearchState::Complete
        };
        tracing::trace!("Corridor search finished: {:?}", self.state);
        self.state
    }

    fn cleanup(&mut self) {
        self.heap.clear();
        self.open.clear();
        self.closed.clear();
    }

    /// Discards the current search and its results.
    pub fn reset(&mut self) {
        self.cleanup();
        self.state = SearchState::Uninitialized;
        self.start = Vec3::ZERO;
        self.goals.clear();
        self.goal_cells.clear();
        self.paths.clear();
        self.select_first = false;
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

    /// The number of corridors found.
    #[inline]
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// The cells of corridor `index`, from the start cell to a goal cell.
    pub fn path_cells(&self, index: usize) -> Option<&[CellId]> {
        self.paths.get(index).map(Vec::as_slice)
    }

    /// The goal points passed to [`DijkstraSearch::initialize`].
    #[inline]
    pub fn goals(&self) -> &[Vec3] {
        &self.goals
    }

    /// The mesh being searched.
    #[inline]
    pub fn mesh(&self) -> &'a TriNavMesh {
        self.mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four triangles in a row, each linked to the next.
    fn corridor() -> TriNavMesh {
        let vertices = [
            0.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 0.0, 0.0, //
            2.0, 0.0, 1.0, //
            2.0, 0.0, 0.0,
        ];
        let indices = [0, 1, 2, 0, 2, 3, 3, 2, 4, 3, 4, 5];
        TriNavMesh::build(&vertices, &indices, 4, 0.5, 0.1).unwrap()
    }

    fn run(search: &mut DijkstraSearch) -> SearchState {
        let mut steps = 0;
        while search.is_active() {
            search.process();
            steps += 1;
            assert!(steps < 100, "search did not terminate");
        }
        search.state()
    }

    #[test]
    fn defaults() {
        let mesh = corridor();
        let search = DijkstraSearch::new(&mesh);
        assert_eq!(search.state(), SearchState::Uninitialized);
        assert!(!search.is_active());
        assert_eq!(search.path_count(), 0);
        assert!(search.goals().is_empty());
    }

    #[test]
    fn finds_corridor_to_dead_end_goal() {
        let mesh = corridor();
        let mut search = DijkstraSearch::new(&mesh);
        let goal = Vec3::new(1.9, 0.0, 0.2);
        let state = search.initialize(
            Vec3::new(0.1, 0.0, 0.8),
            &[goal],
            CellId(0),
            &[CellId(3)],
            10,
            true,
        );
        assert_eq!(state, SearchState::Initialized);
        assert_eq!(search.process(), SearchState::Processing);
        assert_eq!(run(&mut search), SearchState::Complete);
        assert_eq!(search.path_count(), 1);
        assert_eq!(
            search.path_cells(0).unwrap(),
            &[CellId(0), CellId(1), CellId(2), CellId(3)]
        );
        assert_eq!(search.goals(), &[goal]);
        assert!(search.path_cells(1).is_none());

        // Finished searches ignore further processing.
        assert_eq!(search.process(), SearchState::Complete);
    }

    #[test]
    fn depth_limit_fails_search() {
        let mesh = corridor();
        let mut search = DijkstraSearch::new(&mesh);
        search.initialize(Vec3::ZERO, &[], CellId(0), &[CellId(3)], 2, false);
        assert_eq!(run(&mut search), SearchState::Failed);
        assert_eq!(search.path_count(), 0);

        search.initialize(Vec3::ZERO, &[], CellId(0), &[CellId(3)], 3, false);
        assert_eq!(run(&mut search), SearchState::Complete);
    }

    #[test]
    fn reset_clears_everything() {
        let mesh = corridor();
        let mut search = DijkstraSearch::new(&mesh);
        search.initialize(Vec3::ONE, &[Vec3::ONE], CellId(0), &[CellId(3)], 0, false);
        run(&mut search);
        search.reset();
        assert_eq!(search.state(), SearchState::Uninitialized);
        assert_eq!(search.path_count(), 0);
        assert!(search.goals().is_empty());
        assert_eq!(search.process(), SearchState::Uninitialized);
    }
}
