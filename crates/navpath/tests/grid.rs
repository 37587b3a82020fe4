//! Searches and line-of-sight checks on a 3x3 grid of unit quads.

use glam::Vec3;
use navpath::{AStarSearch, CellId, DijkstraSearch, DistanceHeuristic, SearchState, TriNavMesh};

/// Builds a 3x3 grid of quads on the xz-plane, optionally without the center quad.
///
/// Each quad `(x, z)` is split into an upper triangle touching its left and top edges and a lower
/// triangle touching its right and bottom edges.
fn grid(with_center: bool) -> TriNavMesh {
    let mut vertices = Vec::new();
    for x in 0..=3 {
        for z in 0..=3 {
            vertices.extend([x as f32, 0.0, z as f32]);
        }
    }
    let vertex = |x: u32, z: u32| x * 4 + z;

    let mut indices = Vec::new();
    for x in 0..3 {
        for z in 0..3 {
            if !with_center && x == 1 && z == 1 {
                continue;
            }
            let (p00, p01, p11, p10) = (
                vertex(x, z),
                vertex(x, z + 1),
                vertex(x + 1, z + 1),
                vertex(x + 1, z),
            );
            indices.extend([p00, p01, p11, p00, p11, p10]);
        }
    }
    TriNavMesh::build(&vertices, &indices, 4, 0.5, 0.1).unwrap()
}

fn upper(mesh: &TriNavMesh, x: u32, z: u32) -> CellId {
    cell_at(mesh, x as f32 + 0.25, z as f32 + 0.75)
}

fn lower(mesh: &TriNavMesh, x: u32, z: u32) -> CellId {
    cell_at(mesh, x as f32 + 0.75, z as f32 + 0.25)
}

#[track_caller]
fn cell_at(mesh: &TriNavMesh, x: f32, z: f32) -> CellId {
    mesh.closest_cell(Vec3::new(x, 0.0, z), true)
        .unwrap_or_else(|| panic!("no cell at ({x}, {z})"))
        .0
}

fn search(mesh: &TriNavMesh, start: CellId, goal: CellId) -> Option<Vec<CellId>> {
    let start_point = mesh.cell(start).unwrap().centroid();
    let goal_point = mesh.cell(goal).unwrap().centroid();
    let mut search = DijkstraSearch::new(mesh);
    search.initialize(start_point, &[goal_point], start, &[goal], 100, true);
    while search.is_active() {
        search.process();
    }
    match search.state() {
        SearchState::Complete => search.path_cells(0).map(<[CellId]>::to_vec),
        _ => None,
    }
}

#[track_caller]
fn assert_connected(mesh: &TriNavMesh, path: &[CellId]) {
    for pair in path.windows(2) {
        let cell = mesh.cell(pair[0]).unwrap();
        assert!(
            cell.link_index(pair[1]).is_some(),
            "{:?} and {:?} are not linked",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn every_interior_wall_is_linked() {
    let mesh = grid(true);
    assert_eq!(mesh.cell_count(), 18);
    // 9 diagonals, 6 vertical and 6 horizontal quad edges, each counted from both sides.
    let links: usize = mesh.cells().iter().map(|cell| cell.link_count()).sum();
    assert_eq!(links, 2 * (9 + 6 + 6));
}

#[test]
fn search_finds_the_shortest_corridor() {
    let mesh = grid(false);
    let start = upper(&mesh, 0, 0);
    let goal = lower(&mesh, 0, 2);

    let path = search(&mesh, start, goal).unwrap();
    assert_eq!(path, vec![start, lower(&mesh, 0, 1), upper(&mesh, 0, 1), goal]);
    assert_connected(&mesh, &path);
}

#[test]
fn removing_a_link_forces_the_detour() {
    let mut mesh = grid(false);
    let start = upper(&mesh, 0, 0);
    let goal = lower(&mesh, 0, 2);
    assert!(mesh.unlink(upper(&mesh, 0, 1), goal));

    let path = search(&mesh, start, goal).unwrap();
    // The only way left leads around the hole in the middle.
    let detour = vec![
        start,
        lower(&mesh, 0, 0),
        upper(&mesh, 1, 0),
        lower(&mesh, 1, 0),
        upper(&mesh, 2, 0),
        lower(&mesh, 2, 1),
        upper(&mesh, 2, 1),
        lower(&mesh, 2, 2),
        upper(&mesh, 2, 2),
        lower(&mesh, 1, 2),
        upper(&mesh, 1, 2),
        goal,
    ];
    assert_eq!(path, detour);
    assert_connected(&mesh, &path);
}

#[test]
fn search_fails_between_disconnected_cells() {
    let mut mesh = grid(false);
    let start = upper(&mesh, 0, 0);
    let goal = lower(&mesh, 0, 2);
    assert!(mesh.unlink(upper(&mesh, 0, 1), goal));
    assert!(mesh.unlink(upper(&mesh, 1, 2), goal));
    assert_eq!(search(&mesh, start, goal), None);
}

#[test]
fn search_collects_every_goal() {
    let mesh = grid(true);
    let start = upper(&mesh, 0, 0);
    let goals = [lower(&mesh, 2, 0), upper(&mesh, 0, 2), lower(&mesh, 2, 2)];

    let mut search = DijkstraSearch::new(&mesh);
    search.initialize(Vec3::new(0.3, 0.0, 0.7), &[], start, &goals, 100, false);
    while search.is_active() {
        search.process();
    }
    assert_eq!(search.state(), SearchState::Complete);
    assert_eq!(search.path_count(), goals.len());
    for i in 0..search.path_count() {
        let path = search.path_cells(i).unwrap();
        assert_eq!(path[0], start);
        assert!(goals.contains(path.last().unwrap()));
        assert_connected(&mesh, path);
    }
}

#[test]
fn line_of_sight_is_symmetric_on_open_ground() {
    let mesh = grid(true);
    let pairs = [
        (Vec3::new(0.2, 0.0, 0.7), Vec3::new(2.7, 0.0, 2.3)),
        (Vec3::new(0.3, 0.0, 2.6), Vec3::new(2.8, 0.0, 0.35)),
        (Vec3::new(0.1, 0.0, 0.4), Vec3::new(2.9, 0.0, 0.6)),
    ];
    for (a, b) in pairs {
        let cell_a = cell_at(&mesh, a.x, a.z);
        let cell_b = cell_at(&mesh, b.x, b.z);
        assert!(mesh.has_los(a, b, cell_a, cell_b, 0.1), "{a} -> {b}");
        assert!(mesh.has_los(b, a, cell_b, cell_a, 0.1), "{b} -> {a}");
    }
}

#[test]
fn hole_blocks_line_of_sight() {
    let mesh = grid(false);
    let a = Vec3::new(0.2, 0.0, 1.5);
    let b = Vec3::new(2.8, 0.0, 1.5);
    let cell_a = cell_at(&mesh, a.x, a.z);
    let cell_b = cell_at(&mesh, b.x, b.z);
    assert!(!mesh.has_los(a, b, cell_a, cell_b, 0.1));
    assert!(!mesh.has_los(b, a, cell_b, cell_a, 0.1));
}

#[track_caller]
fn assert_los_both_ways(mesh: &TriNavMesh, a: (Vec3, CellId), b: (Vec3, CellId), expected: bool) {
    assert_eq!(mesh.has_los(a.0, b.0, a.1, b.1, 0.1), expected, "{} -> {}", a.0, b.0);
    assert_eq!(mesh.has_los(b.0, a.0, b.1, a.1, 0.1), expected, "{} -> {}", b.0, a.0);
}

#[test]
fn line_of_sight_between_vertices_is_symmetric() {
    // Endpoints on vertices are nudged toward the centroid of the cell they are given with,
    // so swapping both endpoints and their cells traces the same line.
    let mesh = grid(true);
    let corner = (Vec3::new(0.0, 0.0, 0.0), upper(&mesh, 0, 0));
    let far_corner = (Vec3::new(3.0, 0.0, 3.0), upper(&mesh, 2, 2));
    assert_los_both_ways(&mesh, corner, far_corner, true);

    let left = (Vec3::new(0.0, 0.0, 1.0), upper(&mesh, 0, 0));
    let right = (Vec3::new(3.0, 0.0, 1.0), lower(&mesh, 2, 1));
    assert_los_both_ways(&mesh, left, right, true);
}

#[test]
fn hole_blocks_line_of_sight_between_vertices() {
    let mesh = grid(false);
    let a = (Vec3::new(1.0, 0.0, 1.0), lower(&mesh, 0, 0));
    let b = (Vec3::new(2.0, 0.0, 2.0), upper(&mesh, 2, 2));
    assert_los_both_ways(&mesh, a, b, false);
}

fn a_star(mesh: &TriNavMesh, start: CellId, goal: CellId) -> Option<Vec<CellId>> {
    let start_point = mesh.cell(start).unwrap().centroid();
    let goal_point = mesh.cell(goal).unwrap().centroid();
    let mut search = AStarSearch::new(mesh, DistanceHeuristic::LongestAxis);
    search.initialize(start_point, goal_point, start, goal);
    while search.is_active() {
        search.process();
    }
    search.path_cells().map(<[CellId]>::to_vec)
}

#[test]
fn a_star_finds_the_shortest_corridor() {
    let mesh = grid(false);
    let start = upper(&mesh, 0, 0);
    let goal = lower(&mesh, 0, 2);
    assert_eq!(
        a_star(&mesh, start, goal).unwrap(),
        vec![start, lower(&mesh, 0, 1), upper(&mesh, 0, 1), goal]
    );
}

#[test]
fn a_star_agrees_with_dijkstra_on_the_detour() {
    let mut mesh = grid(false);
    let start = upper(&mesh, 0, 0);
    let goal = lower(&mesh, 0, 2);
    assert!(mesh.unlink(upper(&mesh, 0, 1), goal));

    let path = a_star(&mesh, start, goal).unwrap();
    assert_eq!(path.len(), 12);
    assert_connected(&mesh, &path);
    assert_eq!(Some(path), search(&mesh, start, goal));

    assert!(mesh.unlink(upper(&mesh, 1, 2), goal));
    assert_eq!(a_star(&mesh, start, goal), None);
}

#[test]
fn a_star_reaches_a_dead_end_goal() {
    let mesh = grid(true);
    let start = upper(&mesh, 0, 0);
    // The lower triangle in the corner only touches the rest of its quad.
    let goal = lower(&mesh, 2, 0);
    assert_eq!(mesh.cell(goal).unwrap().link_count(), 1);

    let path = a_star(&mesh, start, goal).unwrap();
    assert_eq!(path[0], start);
    assert_eq!(&path[path.len() - 2..], &[upper(&mesh, 2, 0), goal]);
    assert_connected(&mesh, &path);
}
