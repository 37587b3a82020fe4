#![doc = include_str!("../../../readme.md")]

mod a_star;
mod dijkstra;
mod geom;
mod path_node;
mod quad_tree;
mod tri_cell;
mod tri_nav_mesh;

pub use a_star::{AStarSearch, DistanceHeuristic};
pub use dijkstra::{DijkstraSearch, SearchState};
pub use geom::{
    Aabb2d, EPSILON, LineRelationship, TOLERANCE, direction_ab, line_relationship, normal_ab,
    sloppy_eq,
};
pub use path_node::{NodeKey, PathNode, PathNodeHeap};
pub use quad_tree::{QuadTreeError, TriCellQuadTree};
pub use tri_cell::{CellId, PathRelationship, TriCell, TriCellError};
pub use tri_nav_mesh::{TriNavMesh, TriNavMeshError};
