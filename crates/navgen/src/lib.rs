#![doc = include_str!("../../../readme.md")]

mod build;
mod compact_cell;
mod compact_heightfield;
mod compact_span;
mod config;
mod context;
mod contours;
mod detail_mesh;
mod erosion;
mod heightfield;
mod mark_area;
mod merge_regions;
pub(crate) mod math;
mod monotone_build_regions;
mod poly_mesh;
mod pre_filter;
mod processor;
mod rasterize;
mod region;
mod simple_mesh;
mod span;
mod trimesh;
mod watershed_build_regions;
mod watershed_distance_field;

#[cfg(test)]
mod test_utils;

pub use build::{BuildState, IncrementalBuilder, NavmeshOutput};
pub use compact_cell::CompactCell;
pub use compact_heightfield::{CompactHeightfield, CompactHeightfieldError};
pub use compact_span::CompactSpan;
pub use config::{
    BuildFlags, MAX_ALLOWED_SLOPE, MAX_ALLOWED_VERTS_PER_POLY, MIN_CELL_SIZE,
    MIN_DETAIL_SAMPLE_DIST, MIN_WALKABLE_HEIGHT, NavmeshConfig, NavmeshConfigBuilder,
};
pub use context::{BuildContext, BuildMessage, LogLevel};
pub use contours::{BuildContoursFlags, Contour, ContourSet, RegionVertexId};
pub use detail_mesh::{DetailMeshError, DetailNavmesh, SubMesh};
pub use heightfield::{Heightfield, HeightfieldBuilder, HeightfieldBuilderError};
pub use mark_area::{ConvexVolume, CylinderVolume};
pub use math::{Aabb2d, Aabb3d};
pub use merge_regions::RegionBuildError;
pub use poly_mesh::{PolygonMeshError, PolygonNavmesh};
pub use processor::{
    AreaMarker, BuildProcessor, BuildStage, MarkerShape, ProcessorContext, ProcessorSet,
};
pub use rasterize::RasterizationError;
pub use region::RegionId;
pub use simple_mesh::{
    SimpleMesh, SimpleMeshConfig, SimpleMeshError, VERTEX_MERGE_TOLERANCE, build_simple_mesh,
};
pub use span::{AreaType, Span, SpanBuilder, SpanKey, Spans};
pub use trimesh::TriMesh;
