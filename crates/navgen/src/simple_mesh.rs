//! A one-call build from flat vertex and index arrays to a single triangle mesh.

use glam::Vec3;
use thiserror::Error;

use crate::{
    BuildContext, BuildContoursFlags, CompactHeightfieldError, DetailMeshError, DetailNavmesh,
    HeightfieldBuilder, HeightfieldBuilderError, PolygonMeshError, RasterizationError,
    RegionBuildError, TriMesh, config::MAX_ALLOWED_VERTS_PER_POLY,
};

/// Vertices closer than this on every axis are merged when flattening a [`DetailNavmesh`].
pub const VERTEX_MERGE_TOLERANCE: f32 = 0.0001;

/// The parameters of [`build_simple_mesh`], all in world units unless noted otherwise.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimpleMeshConfig {
    /// The xz-plane cell size.
    pub xz_cell_size: f32,
    /// The y-axis cell size.
    pub y_cell_size: f32,
    /// The lowest ceiling the agent fits under.
    pub min_traversable_height: f32,
    /// The highest step the agent can climb.
    pub max_traversable_step: f32,
    /// The steepest walkable slope. `[Units: degrees]`
    pub max_traversable_slope: f32,
    /// How far the walkable area is pulled back from obstructions.
    pub traversable_area_border_size: f32,
    /// The width of the non-navigable border around the field.
    pub heightfield_border_size: f32,
    /// The span count below which isolated regions are removed. `[Units: vx]`
    pub min_island_region_size: u16,
    /// The span count below which regions are merged into a neighbour. `[Units: vx]`
    pub merge_region_size: u16,
    /// The longest allowed border edge. Zero disables splitting.
    pub max_edge_length: f32,
    /// How far simplified contours may stray from the raw contours. `[Units: vx]`
    pub edge_max_deviation: f32,
    /// The maximum number of vertices per polygon.
    pub max_verts_per_poly: u16,
    /// The detail sampling distance. Zero disables height sampling.
    pub contour_sample_distance: f32,
    /// How far the detail mesh may stray from the heightfield.
    pub contour_max_deviation: f32,
}

impl Default for SimpleMeshConfig {
    fn default() -> Self {
        Self {
            xz_cell_size: 0.3,
            y_cell_size: 0.2,
            min_traversable_height: 2.0,
            max_traversable_step: 0.9,
            max_traversable_slope: 45.0,
            traversable_area_border_size: 0.6,
            heightfield_border_size: 0.0,
            min_island_region_size: 64,
            merge_region_size: 400,
            max_edge_length: 12.0,
            edge_max_deviation: 1.3,
            max_verts_per_poly: 6,
            contour_sample_distance: 1.8,
            contour_max_deviation: 0.2,
        }
    }
}

/// A flat triangle mesh, the input format of a runtime triangle navmesh.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SimpleMesh {
    /// Unique vertices.
    pub vertices: Vec<Vec3>,
    /// Three indices into [`Self::vertices`] per triangle.
    pub indices: Vec<u32>,
}

impl SimpleMesh {
    /// Merges the sub-meshes of a detail mesh into one mesh.
    ///
    /// Vertices within [`VERTEX_MERGE_TOLERANCE`] of an earlier vertex are merged into it,
    /// so the first occurrence decides the position and order.
    pub fn from_detail_mesh(detail: &DetailNavmesh) -> Self {
        let mut vertices: Vec<Vec3> = Vec::with_capacity(detail.vertices.len());
        let vertex_map: Vec<u32> = detail
            .vertices
            .iter()
            .map(|vertex| {
                let existing = vertices.iter().position(|unique| {
                    (*unique - *vertex).abs().max_element() <= VERTEX_MERGE_TOLERANCE
                });
                match existing {
                    Some(index) => index as u32,
                    None => {
                        vertices.push(*vertex);
                        vertices.len() as u32 - 1
                    }
                }
            })
            .collect();

        let mut indices = Vec::with_capacity(detail.triangles.len() * 3);
        for submesh in &detail.meshes {
            let base = submesh.base_vertex_index as usize;
            for triangle in submesh.triangles(detail) {
                indices.extend(triangle.iter().map(|i| vertex_map[base + *i as usize]));
            }
        }
        Self { vertices, indices }
    }

    /// The number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// The vertices as a flat `[x, y, z, x, y, z, ..]` array.
    pub fn flat_vertices(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| v.to_array()).collect()
    }
}

/// Errors that can occur in [`build_simple_mesh`].
#[derive(Debug, Error)]
pub enum SimpleMeshError {
    /// The input produced no walkable surface.
    #[error("The build produced no mesh")]
    NoResult,
    /// The flat arrays don't describe a triangle list.
    #[error("Invalid input geometry: {vertices} vertex components and {indices} indices")]
    InvalidInput {
        /// The length of the vertex array.
        vertices: usize,
        /// The length of the index array.
        indices: usize,
    },
    /// See [`HeightfieldBuilderError`].
    #[error(transparent)]
    Heightfield(#[from] HeightfieldBuilderError),
    /// See [`RasterizationError`].
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),
    /// See [`CompactHeightfieldError`].
    #[error(transparent)]
    CompactHeightfield(#[from] CompactHeightfieldError),
    /// See [`RegionBuildError`].
    #[error(transparent)]
    Regions(#[from] RegionBuildError),
    /// See [`PolygonMeshError`].
    #[error(transparent)]
    PolygonMesh(#[from] PolygonMeshError),
    /// See [`DetailMeshError`].
    #[error(transparent)]
    DetailMesh(#[from] DetailMeshError),
}

/// Builds a navmesh from flat arrays and flattens its detail mesh into a [`SimpleMesh`].
///
/// Runs every stage with fixed settings: all three span filters with low obstacles first,
/// watershed regions and wall edge tessellation. Progress is written to `context`.
pub fn build_simple_mesh(
    config: &SimpleMeshConfig,
    vertices: &[f32],
    indices: &[u32],
    context: &mut BuildContext,
) -> Result<SimpleMesh, SimpleMeshError> {
    if vertices.len() % 3 != 0 || indices.len() % 3 != 0 {
        context.error("Vertex and index counts must be multiples of three.");
        return Err(SimpleMeshError::InvalidInput {
            vertices: vertices.len(),
            indices: indices.len(),
        });
    }
    let mut trimesh = TriMesh::from_flat(vertices, indices);
    if !trimesh.has_valid_indices() {
        context.error("Triangles reference missing vertices.");
        return Err(SimpleMeshError::InvalidInput {
            vertices: vertices.len(),
            indices: indices.len(),
        });
    }
    let Some(aabb) = trimesh.compute_aabb().filter(|_| !trimesh.is_empty()) else {
        context.warn("Input geometry is empty.");
        return Err(SimpleMeshError::NoResult);
    };

    let cs = config.xz_cell_size.max(crate::config::MIN_CELL_SIZE);
    let ch = config.y_cell_size.max(crate::config::MIN_CELL_SIZE);
    let walkable_climb = (config.max_traversable_step.max(0.0) / ch).floor() as u16;
    let walkable_height = ((config.min_traversable_height / ch).ceil() as u16)
        .max(crate::config::MIN_WALKABLE_HEIGHT);
    let walkable_radius = (config.traversable_area_border_size.max(0.0) / cs).ceil() as u16;
    let border_size = (config.heightfield_border_size.max(0.0) / cs).ceil() as u16;
    let max_edge_len = (config.max_edge_length.max(0.0) / cs).ceil() as u16;
    let max_verts_per_poly = config.max_verts_per_poly.clamp(3, MAX_ALLOWED_VERTS_PER_POLY);
    let slope = config
        .max_traversable_slope
        .clamp(0.0, crate::config::MAX_ALLOWED_SLOPE)
        .to_radians();
    context.log(format!(
        "Voxel config: step {walkable_climb}, height {walkable_height}, radius {walkable_radius}, \
         border {border_size}, max edge {max_edge_len}"
    ));

    trimesh.mark_walkable_triangles(slope);
    let mut heightfield = HeightfieldBuilder {
        aabb,
        cell_size: cs,
        cell_height: ch,
    }
    .build()?;
    heightfield.rasterize_triangles(&trimesh, 1)?;
    context.log(format!(
        "Built solid heightfield: {} spans.",
        heightfield.span_count()
    ));

    heightfield.filter_low_hanging_walkable_obstacles(walkable_climb);
    heightfield.filter_ledge_spans(walkable_height, walkable_climb);
    heightfield.filter_walkable_low_height_spans(walkable_height);

    let mut compact = heightfield.into_compact(walkable_height, walkable_climb)?;
    compact.erode_walkable_area(walkable_radius);
    compact.build_distance_field();
    compact.build_regions(
        border_size,
        config.min_island_region_size,
        config.merge_region_size,
    )?;
    context.log(format!("Built regions: {} regions.", compact.region_count()));

    let contours = compact.build_contours(
        config.edge_max_deviation.max(0.0),
        max_edge_len,
        BuildContoursFlags::DEFAULT,
    );
    context.log(format!(
        "Built contours: {} contours.",
        contours.contours.len()
    ));

    let poly_mesh = contours.into_polygon_mesh(max_verts_per_poly)?;
    context.log(format!(
        "Built poly mesh: {} polygons.",
        poly_mesh.polygon_count()
    ));

    let sample_distance = if config.contour_sample_distance < 0.9 {
        0.0
    } else {
        config.contour_sample_distance
    };
    let detail = DetailNavmesh::new(
        &poly_mesh,
        &compact,
        sample_distance,
        config.contour_max_deviation.max(0.0),
    )?;
    context.log(format!(
        "Built detail mesh: {} submeshes, {} vertices, {} triangles.",
        detail.mesh_count(),
        detail.vertices.len(),
        detail.triangles.len()
    ));
    if detail.vertices.is_empty() {
        context.warn("Build process did not result in a final mesh.");
        return Err(SimpleMeshError::NoResult);
    }

    let mesh = SimpleMesh::from_detail_mesh(&detail);
    context.log(format!(
        "Flattened mesh: {} vertices, {} triangles.",
        mesh.vertices.len(),
        mesh.triangle_count()
    ));
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use crate::SubMesh;

    use super::*;

    #[test]
    fn flattening_merges_shared_vertices() {
        let detail = DetailNavmesh {
            meshes: vec![
                SubMesh {
                    base_vertex_index: 0,
                    vertex_count: 3,
                    base_triangle_index: 0,
                    triangle_count: 1,
                },
                SubMesh {
                    base_vertex_index: 3,
                    vertex_count: 3,
                    base_triangle_index: 1,
                    triangle_count: 1,
                },
            ],
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(0.00005, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 0.0),
            ],
            triangles: vec![[0, 1, 2], [0, 1, 2]],
            triangle_flags: vec![0, 0],
        };

        let mesh = SimpleMesh::from_detail_mesh(&detail);

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.vertices[0], Vec3::ZERO);
        assert_eq!(mesh.indices, [0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.triangle_count(), 2);
    }

    #[test]
    fn empty_input_has_no_result() {
        let mut context = BuildContext::new();
        let result = build_simple_mesh(&SimpleMeshConfig::default(), &[], &[], &mut context);
        assert!(matches!(result, Err(SimpleMeshError::NoResult)));
    }

    #[test]
    fn ragged_input_is_rejected() {
        let mut context = BuildContext::new();
        let result = build_simple_mesh(
            &SimpleMeshConfig::default(),
            &[0.0, 0.0],
            &[0, 1, 2],
            &mut context,
        );
        assert!(matches!(result, Err(SimpleMeshError::InvalidInput { .. })));
        assert!(context.has_errors());
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut context = BuildContext::new();
        let result = build_simple_mesh(
            &SimpleMeshConfig::default(),
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0],
            &[0, 1, 7],
            &mut context,
        );
        assert!(matches!(result, Err(SimpleMeshError::InvalidInput { .. })));
    }
}
