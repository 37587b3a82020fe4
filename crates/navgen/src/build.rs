//! A resumable navmesh build, advanced one stage at a time.

use crate::{
    BuildContext, BuildFlags, BuildMessage, BuildStage, CompactHeightfield, ContourSet,
    DetailNavmesh, Heightfield, HeightfieldBuilder, NavmeshConfig, PolygonNavmesh,
    ProcessorContext, ProcessorSet, TriMesh,
};

/// The progress of an [`IncrementalBuilder`]. Each variant names the last completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildState {
    /// Nothing has run yet.
    Initialized,
    /// Steep triangles of the input were marked as not walkable.
    ClearUnwalkableTris,
    /// The heightfield was rasterized and filtered.
    HeightfieldBuild,
    /// The compact heightfield was built and eroded.
    CompactFieldBuild,
    /// Regions were partitioned.
    RegionBuild,
    /// Contours were traced.
    ContourBuild,
    /// The polygon mesh was assembled.
    PolyMeshBuild,
    /// The detail mesh was built.
    DetailMeshBuild,
    /// The build finished and produced a mesh.
    Complete,
    /// The build finished because the input produced no walkable surface.
    NoResult,
    /// The build stopped on an error or on request.
    Aborted,
}

impl BuildState {
    /// Whether the build can't advance any further.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::NoResult | Self::Aborted)
    }
}

/// The meshes produced by a completed build.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshOutput {
    /// The polygon mesh.
    pub poly_mesh: PolygonNavmesh,
    /// The height detail of [`Self::poly_mesh`].
    pub detail_mesh: DetailNavmesh,
}

/// Builds a navmesh from a [`TriMesh`] one stage per [`IncrementalBuilder::step`].
///
/// Triangles keep the area type they were given unless they are steeper than
/// [`NavmeshConfig::walkable_slope_angle`]. The [`ProcessorSet`] runs after every stage.
#[derive(Debug)]
pub struct IncrementalBuilder {
    config: NavmeshConfig,
    trimesh: TriMesh,
    processors: ProcessorSet,
    context: BuildContext,
    state: BuildState,
    abort_requested: bool,
    heightfield: Option<Heightfield>,
    compact_heightfield: Option<CompactHeightfield>,
    contours: Option<ContourSet>,
    poly_mesh: Option<PolygonNavmesh>,
    detail_mesh: Option<DetailNavmesh>,
}

/// The outcome of a single stage.
enum Stage {
    Done,
    NoResult(&'static str),
    Failed(String),
}

impl IncrementalBuilder {
    /// Prepares a build. Out-of-range config values are clamped with [`NavmeshConfig::clean`].
    pub fn new(mut config: NavmeshConfig, trimesh: TriMesh, processors: ProcessorSet) -> Self {
        config.clean();
        Self {
            config,
            trimesh,
            processors,
            context: BuildContext::new(),
            state: BuildState::Initialized,
            abort_requested: false,
            heightfield: None,
            compact_heightfield: None,
            contours: None,
            poly_mesh: None,
            detail_mesh: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Whether the build has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// The cleaned config used by the build.
    pub fn config(&self) -> &NavmeshConfig {
        &self.config
    }

    /// The messages logged so far.
    pub fn messages(&self) -> &[BuildMessage] {
        self.context.messages()
    }

    /// The message log.
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// The polygon mesh, once [`BuildState::PolyMeshBuild`] has been reached.
    pub fn poly_mesh(&self) -> Option<&PolygonNavmesh> {
        self.poly_mesh.as_ref()
    }

    /// The detail mesh, once [`BuildState::DetailMeshBuild`] has been reached.
    pub fn detail_mesh(&self) -> Option<&DetailNavmesh> {
        self.detail_mesh.as_ref()
    }

    /// The compact heightfield, once [`BuildState::CompactFieldBuild`] has been reached.
    pub fn compact_heightfield(&self) -> Option<&CompactHeightfield> {
        self.compact_heightfield.as_ref()
    }

    /// Makes the next [`Self::step`] abort the build without processing.
    pub fn request_abort(&mut self) {
        self.abort_requested = true;
    }

    /// Runs [`Self::step`] until the build is finished.
    pub fn build(&mut self) -> BuildState {
        while !self.is_finished() {
            self.step();
        }
        self.state
    }

    /// Consumes the builder, returning the meshes if the build completed.
    pub fn into_result(self) -> Option<NavmeshOutput> {
        if self.state != BuildState::Complete {
            return None;
        }
        Some(NavmeshOutput {
            poly_mesh: self.poly_mesh?,
            detail_mesh: self.detail_mesh?,
        })
    }

    /// Runs the next stage and returns the new state.
    /// Does nothing once the build is finished.
    pub fn step(&mut self) -> BuildState {
        if self.is_finished() {
            return self.state;
        }
        if self.abort_requested {
            self.context.error("Build aborted by request.");
            self.state = BuildState::Aborted;
            return self.state;
        }

        let next = match self.state {
            BuildState::Initialized => BuildState::ClearUnwalkableTris,
            BuildState::ClearUnwalkableTris => BuildState::HeightfieldBuild,
            BuildState::HeightfieldBuild => BuildState::CompactFieldBuild,
            BuildState::CompactFieldBuild => BuildState::RegionBuild,
            BuildState::RegionBuild => BuildState::ContourBuild,
            BuildState::ContourBuild => BuildState::PolyMeshBuild,
            BuildState::PolyMeshBuild => BuildState::DetailMeshBuild,
            _ => BuildState::Complete,
        };

        let span = tracing::debug_span!("navmesh_build", stage = ?next);
        let _enter = span.enter();
        let outcome = match next {
            BuildState::ClearUnwalkableTris => self.clear_unwalkable_triangles(),
            BuildState::HeightfieldBuild => self.build_heightfield(),
            BuildState::CompactFieldBuild => self.build_compact_heightfield(),
            BuildState::RegionBuild => self.build_regions(),
            BuildState::ContourBuild => self.build_contours(),
            BuildState::PolyMeshBuild => self.build_poly_mesh(),
            BuildState::DetailMeshBuild => self.build_detail_mesh(),
            _ => {
                self.context.log("Build complete.");
                Stage::Done
            }
        };

        self.state = match outcome {
            Stage::Done => match Self::processor_stage(next) {
                Some(stage) => match self.run_processors(stage) {
                    Ok(()) => next,
                    Err(error) => {
                        self.context.error(format!("{error:#}"));
                        BuildState::Aborted
                    }
                },
                None => next,
            },
            Stage::NoResult(reason) => {
                self.context.warn(reason);
                BuildState::NoResult
            }
            Stage::Failed(error) => {
                self.context.error(error);
                BuildState::Aborted
            }
        };
        self.state
    }

    fn processor_stage(state: BuildState) -> Option<BuildStage> {
        Some(match state {
            BuildState::HeightfieldBuild => BuildStage::HeightfieldBuild,
            BuildState::CompactFieldBuild => BuildStage::CompactFieldBuild,
            BuildState::RegionBuild => BuildStage::RegionBuild,
            BuildState::ContourBuild => BuildStage::ContourBuild,
            BuildState::PolyMeshBuild => BuildStage::PolyMeshBuild,
            BuildState::DetailMeshBuild => BuildStage::DetailMeshBuild,
            _ => return None,
        })
    }

    fn run_processors(&mut self, stage: BuildStage) -> anyhow::Result<()> {
        if self.processors.is_empty() {
            return Ok(());
        }
        let mut context = ProcessorContext {
            config: &self.config,
            log: &mut self.context,
            heightfield: self.heightfield.as_mut(),
            compact_heightfield: self.compact_heightfield.as_mut(),
            contours: self.contours.as_mut(),
            poly_mesh: self.poly_mesh.as_mut(),
            detail_mesh: self.detail_mesh.as_mut(),
        };
        self.processors.process(stage, &mut context)
    }

    fn clear_unwalkable_triangles(&mut self) -> Stage {
        if self.trimesh.is_empty() {
            return Stage::NoResult("Input geometry has no triangles.");
        }
        if !self.trimesh.has_valid_indices() {
            return Stage::Failed("Input geometry references missing vertices.".to_string());
        }
        if self.trimesh.area_types.len() != self.trimesh.indices.len() {
            return Stage::Failed(format!(
                "Input geometry has {} triangles but {} area types.",
                self.trimesh.indices.len(),
                self.trimesh.area_types.len()
            ));
        }
        self.trimesh
            .clear_unwalkable_triangles(self.config.walkable_slope_angle);
        self.processors.log_processors(&mut self.context);
        Stage::Done
    }

    fn build_heightfield(&mut self) -> Stage {
        let config = &self.config;
        let Some(aabb) = config.aabb.or_else(|| self.trimesh.compute_aabb()) else {
            return Stage::NoResult("Input geometry has no vertices.");
        };
        let mut heightfield = match (HeightfieldBuilder {
            aabb,
            cell_size: config.cell_size,
            cell_height: config.cell_height,
        })
        .build()
        {
            Ok(heightfield) => heightfield,
            Err(error) => return Stage::Failed(format!("Could not create heightfield: {error}")),
        };
        if let Err(error) = heightfield.rasterize_triangles(&self.trimesh, config.walkable_climb) {
            return Stage::Failed(format!("Could not rasterize triangles: {error}"));
        }

        let flags = config.build_flags;
        let low_obstacles = flags.contains(BuildFlags::LOW_OBSTACLES_WALKABLE)
            && config.walkable_climb > 0;
        let low_obstacles_first = flags.contains(BuildFlags::LOW_OBSTACLES_FIRST);
        if low_obstacles && low_obstacles_first {
            heightfield.filter_low_hanging_walkable_obstacles(config.walkable_climb);
        }
        if flags.contains(BuildFlags::LEDGE_SPANS_NOT_WALKABLE) {
            heightfield.filter_ledge_spans(config.walkable_height, config.walkable_climb);
        }
        if low_obstacles && !low_obstacles_first {
            heightfield.filter_low_hanging_walkable_obstacles(config.walkable_climb);
        }
        if flags.contains(BuildFlags::LOW_HEIGHT_SPANS_NOT_WALKABLE) {
            heightfield.filter_walkable_low_height_spans(config.walkable_height);
        }

        let walkable = heightfield.walkable_span_count();
        if walkable == 0 {
            return Stage::NoResult("Heightfield has no walkable spans.");
        }
        self.context.log(format!(
            "Built heightfield: {walkable} of {} spans walkable.",
            heightfield.span_count()
        ));
        self.heightfield = Some(heightfield);
        Stage::Done
    }

    fn build_compact_heightfield(&mut self) -> Stage {
        let Some(heightfield) = self.heightfield.take() else {
            return Stage::Failed("Missing heightfield.".to_string());
        };
        let mut compact = match heightfield
            .into_compact(self.config.walkable_height, self.config.walkable_climb)
        {
            Ok(compact) => compact,
            Err(error) => {
                return Stage::Failed(format!("Could not build compact heightfield: {error}"));
            }
        };
        if compact.spans.is_empty() {
            return Stage::NoResult("Compact heightfield has no spans.");
        }
        if self.config.walkable_radius > 0 {
            compact.erode_walkable_area(self.config.walkable_radius);
        }
        self.context.log(format!(
            "Built compact heightfield: {} of {} spans walkable.",
            compact.areas.iter().filter(|area| area.is_walkable()).count(),
            compact.spans.len()
        ));
        self.compact_heightfield = Some(compact);
        Stage::Done
    }

    fn build_regions(&mut self) -> Stage {
        let config = &self.config;
        let Some(compact) = self.compact_heightfield.as_mut() else {
            return Stage::Failed("Missing compact heightfield.".to_string());
        };
        let result = if config
            .build_flags
            .contains(BuildFlags::USE_MONOTONE_PARTITIONING)
        {
            compact.build_regions_monotone(
                config.border_size,
                config.min_region_area,
                config.merge_region_area,
            )
        } else {
            compact.build_distance_field();
            compact.build_regions(
                config.border_size,
                config.min_region_area,
                config.merge_region_area,
            )
        };
        if let Err(error) = result {
            return Stage::Failed(format!("Could not build regions: {error}"));
        }
        let regions = compact.region_count();
        if regions == 0 {
            return Stage::NoResult("No regions were created.");
        }
        self.context.log(format!("Built regions: {regions} regions."));
        Stage::Done
    }

    fn build_contours(&mut self) -> Stage {
        let config = &self.config;
        let Some(compact) = self.compact_heightfield.as_ref() else {
            return Stage::Failed("Missing compact heightfield.".to_string());
        };
        let contours = compact.build_contours(
            config.max_simplification_error,
            config.max_edge_len,
            config.contour_flags(),
        );
        if contours.contours.is_empty() {
            return Stage::NoResult("No contours were created.");
        }
        self.context
            .log(format!("Built contours: {} contours.", contours.contours.len()));
        self.contours = Some(contours);
        Stage::Done
    }

    fn build_poly_mesh(&mut self) -> Stage {
        let Some(contours) = self.contours.take() else {
            return Stage::Failed("Missing contours.".to_string());
        };
        let mut poly_mesh = match contours.into_polygon_mesh(self.config.max_vertices_per_polygon)
        {
            Ok(poly_mesh) => poly_mesh,
            Err(error) => return Stage::Failed(format!("Could not build polygon mesh: {error}")),
        };
        if poly_mesh.polygon_count() == 0 {
            return Stage::NoResult("Polygon mesh has no polygons.");
        }
        if self
            .config
            .build_flags
            .contains(BuildFlags::APPLY_POLY_FLAGS)
        {
            poly_mesh.flags.fill(PolygonNavmesh::DEFAULT_FLAG);
        }
        self.context.log(format!(
            "Built polygon mesh: {} polygons, {} vertices.",
            poly_mesh.polygon_count(),
            poly_mesh.vertices.len()
        ));
        self.poly_mesh = Some(poly_mesh);
        Stage::Done
    }

    fn build_detail_mesh(&mut self) -> Stage {
        let (Some(poly_mesh), Some(compact)) =
            (self.poly_mesh.as_ref(), self.compact_heightfield.as_ref())
        else {
            return Stage::Failed("Missing polygon mesh or compact heightfield.".to_string());
        };
        let detail_mesh = match DetailNavmesh::new(
            poly_mesh,
            compact,
            self.config.detail_sample_dist,
            self.config.detail_sample_max_error,
        ) {
            Ok(detail_mesh) => detail_mesh,
            Err(error) => return Stage::Failed(format!("Could not build detail mesh: {error}")),
        };
        if detail_mesh.mesh_count() == 0 {
            return Stage::NoResult("Detail mesh has no sub-meshes.");
        }
        self.context.log(format!(
            "Built detail mesh: {} sub-meshes, {} vertices, {} triangles.",
            detail_mesh.mesh_count(),
            detail_mesh.vertices.len(),
            detail_mesh.triangles.len()
        ));
        self.detail_mesh = Some(detail_mesh);
        Stage::Done
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;

    use crate::{AreaType, BuildProcessor};

    use super::*;

    /// A flat 10x10 square at y = 0.
    fn floor() -> TriMesh {
        let mut trimesh = TriMesh::from_flat(
            &[
                0.0, 0.0, 0.0, //
                0.0, 0.0, 10.0, //
                10.0, 0.0, 10.0, //
                10.0, 0.0, 0.0,
            ],
            &[0, 1, 2, 0, 2, 3],
        );
        trimesh.area_types.fill(AreaType::DEFAULT_WALKABLE);
        trimesh
    }

    fn config() -> NavmeshConfig {
        NavmeshConfig {
            min_region_area: 0,
            ..Default::default()
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl BuildProcessor for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn process(
            &self,
            stage: BuildStage,
            _context: &mut ProcessorContext,
        ) -> anyhow::Result<()> {
            if stage == BuildStage::RegionBuild {
                bail!("cannot handle regions");
            }
            Ok(())
        }
    }

    #[test]
    fn steps_through_every_stage() {
        let mut builder = IncrementalBuilder::new(config(), floor(), ProcessorSet::default());
        let expected = [
            BuildState::ClearUnwalkableTris,
            BuildState::HeightfieldBuild,
            BuildState::CompactFieldBuild,
            BuildState::RegionBuild,
            BuildState::ContourBuild,
            BuildState::PolyMeshBuild,
            BuildState::DetailMeshBuild,
            BuildState::Complete,
        ];
        for state in expected {
            assert_eq!(builder.step(), state);
        }
        // Finished builds stay put.
        assert_eq!(builder.step(), BuildState::Complete);

        let output = builder.into_result().unwrap();
        assert!(output.poly_mesh.polygon_count() > 0);
        assert_eq!(output.detail_mesh.mesh_count(), output.poly_mesh.polygon_count());
    }

    #[test]
    fn empty_input_has_no_result() {
        let mut builder =
            IncrementalBuilder::new(config(), TriMesh::default(), ProcessorSet::default());
        assert_eq!(builder.build(), BuildState::NoResult);
        assert!(builder.into_result().is_none());
    }

    #[test]
    fn unwalkable_input_has_no_result() {
        let mut trimesh = floor();
        trimesh.area_types.fill(AreaType::NOT_WALKABLE);
        let mut builder = IncrementalBuilder::new(config(), trimesh, ProcessorSet::default());
        assert_eq!(builder.build(), BuildState::NoResult);
    }

    #[test]
    fn abort_request_stops_the_next_step() {
        let mut builder = IncrementalBuilder::new(config(), floor(), ProcessorSet::default());
        builder.step();
        builder.request_abort();
        assert_eq!(builder.step(), BuildState::Aborted);
        assert!(builder.is_finished());
        assert!(builder.context().has_errors());
    }

    #[test]
    fn failing_processor_aborts() {
        let processors = ProcessorSet::new(vec![Box::new(Failing)]);
        let mut builder = IncrementalBuilder::new(config(), floor(), processors);
        assert_eq!(builder.build(), BuildState::Aborted);
        assert!(builder.poly_mesh().is_none());
        let last = builder.messages().last().unwrap();
        assert!(last.text.contains("cannot handle regions"));
    }

    #[test]
    fn poly_flags_are_applied_on_request() {
        let mut config = config();
        config.build_flags |= BuildFlags::APPLY_POLY_FLAGS;
        let mut builder = IncrementalBuilder::new(config, floor(), ProcessorSet::default());
        assert_eq!(builder.build(), BuildState::Complete);
        let poly_mesh = builder.poly_mesh().unwrap();
        assert!(
            poly_mesh
                .flags
                .iter()
                .all(|flag| *flag == PolygonNavmesh::DEFAULT_FLAG)
        );
    }

    #[test]
    fn config_is_cleaned() {
        let config = NavmeshConfig {
            max_vertices_per_polygon: 40,
            ..config()
        };
        let builder = IncrementalBuilder::new(config, floor(), ProcessorSet::default());
        assert!(builder.config().is_valid());
    }
}
