//! Build parameters, in voxel units ([`NavmeshConfig`]) and in world units ([`NavmeshConfigBuilder`]).

use crate::{Aabb3d, BuildContoursFlags};

/// The smallest allowed [`NavmeshConfig::cell_size`] and [`NavmeshConfig::cell_height`]. `[Units: wu]`
pub const MIN_CELL_SIZE: f32 = 0.01;

/// The smallest allowed [`NavmeshConfig::walkable_height`]. `[Units: vx]`
pub const MIN_WALKABLE_HEIGHT: u16 = 3;

/// The steepest allowed [`NavmeshConfig::walkable_slope_angle`]. `[Units: degrees]`
pub const MAX_ALLOWED_SLOPE: f32 = 85.0;

/// The largest allowed [`NavmeshConfig::max_vertices_per_polygon`].
pub const MAX_ALLOWED_VERTS_PER_POLY: u16 = 6;

/// The smallest non-zero [`NavmeshConfig::detail_sample_dist`]. Smaller values disable height sampling.
pub const MIN_DETAIL_SAMPLE_DIST: f32 = 0.9;

/// The parameters of a navmesh build. Usually created with [`NavmeshConfigBuilder`].
///
/// Units are either voxels (vx) or world units (wu). One voxel is [`Self::cell_size`] wide on
/// the xz-plane and [`Self::cell_height`] tall.
///
/// Out-of-range values are never an error: [`Self::clean`] clamps them into range, and the
/// [`IncrementalBuilder`](crate::IncrementalBuilder) cleans its config before building.
///
/// > Note:
/// >
/// > Start from the size of your agent. For a human-sized agent in a world measured in meters,
/// > a radius of 0.4 and a height of 2.0 are reasonable.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfig {
    /// The size of the non-navigable border around the heightfield. `[Limit: >= 0] [Units: vx]`
    ///
    /// Only affects the outer edges of the field, not the borders around internal obstructions.
    pub border_size: u16,

    /// The xz-plane cell size. `[Limit: >= MIN_CELL_SIZE] [Units: wu]`
    ///
    /// Usually a half or a third of the agent radius. Smaller cells give a more detailed mesh,
    /// but build time grows quickly. Use the largest value you can get away with.
    pub cell_size: f32,

    /// The y-axis cell size. `[Limit: >= MIN_CELL_SIZE] [Units: wu]`
    ///
    /// Half of [`Self::cell_size`] is a good start. Lower it if the mesh develops holes around
    /// stairs or curbs.
    pub cell_height: f32,

    /// The bounds of the field. `None` uses the bounds of the input geometry. `[Units: wu]`
    pub aabb: Option<Aabb3d>,

    /// The maximum slope that is considered walkable. `[Limits: 0 <= value <= MAX_ALLOWED_SLOPE] [Units: Radians]`
    ///
    /// The angle between the surface normal of a triangle and the up axis.
    pub walkable_slope_angle: f32,

    /// Minimum floor to ceiling height that still allows the floor to be walkable. `[Limit: >= MIN_WALKABLE_HEIGHT] [Units: vx]`
    ///
    /// Usually `(agent_height / cell_height).ceil()`.
    pub walkable_height: u16,

    /// Maximum ledge height that is still traversable. `[Limit: >= 0] [Units: vx]`
    ///
    /// Usually `(max_climb / cell_height).floor()`. Lets the mesh flow over curbs and stairs.
    pub walkable_climb: u16,

    /// The distance to erode the walkable area away from obstructions. `[Limit: >= 0] [Units: vx]`
    ///
    /// Usually `(agent_radius / cell_size).ceil()`. With a non-zero radius, an agent only
    /// needs its center inside the mesh to be clear of walls. Zero is allowed but produces a
    /// mesh that touches every obstruction.
    pub walkable_radius: u16,

    /// The maximum length of contour edges along the border of the mesh. `[Limit: >= 0] [Units: vx]`
    ///
    /// Long edges are split into shorter segments. Zero disables splitting.
    /// `walkable_radius * 8` is a good value.
    pub max_edge_len: u16,

    /// The maximum distance a simplified contour may deviate from the raw contour. `[Limit: >= 0] [Units: vx]`
    ///
    /// Good values lie in `[1.1, 1.5]`. Below that the edges become jagged, above it corners get cut.
    pub max_simplification_error: f32,

    /// The minimum span count of an isolated island region. `[Limit: >= 0] [Units: vx]`
    ///
    /// Connected regions with fewer spans are removed. Useful to get rid of table and box tops.
    pub min_region_area: u16,

    /// Regions with at most this many spans are merged into a neighbour if possible. `[Limit: >= 0] [Units: vx]`
    pub merge_region_area: u16,

    /// The maximum number of vertices per polygon. `[Limits: 3 <= value <= MAX_ALLOWED_VERTS_PER_POLY]`
    pub max_vertices_per_polygon: u16,

    /// The sampling distance of the detail mesh. `[Limits: 0 or >= MIN_DETAIL_SAMPLE_DIST] [Units: wu]`
    ///
    /// Zero skips height sampling; the detail mesh then only triangulates the polygons.
    pub detail_sample_dist: f32,

    /// The maximum distance the detail mesh may deviate from the heightfield. `[Limit: >= 0] [Units: wu]`
    pub detail_sample_max_error: f32,

    /// Switches for the optional build steps.
    pub build_flags: BuildFlags,
}

impl Default for NavmeshConfig {
    fn default() -> Self {
        NavmeshConfigBuilder::default().build()
    }
}

impl NavmeshConfig {
    /// Clamps every parameter into its allowed range.
    pub fn clean(&mut self) {
        self.cell_size = self.cell_size.max(MIN_CELL_SIZE);
        self.cell_height = self.cell_height.max(MIN_CELL_SIZE);
        self.walkable_height = self.walkable_height.max(MIN_WALKABLE_HEIGHT);
        self.walkable_slope_angle = self
            .walkable_slope_angle
            .clamp(0.0, MAX_ALLOWED_SLOPE.to_radians());
        self.max_vertices_per_polygon = self
            .max_vertices_per_polygon
            .clamp(3, MAX_ALLOWED_VERTS_PER_POLY);
        self.max_simplification_error = self.max_simplification_error.max(0.0);
        if !(self.detail_sample_dist >= MIN_DETAIL_SAMPLE_DIST) {
            self.detail_sample_dist = 0.0;
        }
        self.detail_sample_max_error = self.detail_sample_max_error.max(0.0);
        // `clamp` keeps NaN.
        if self.walkable_slope_angle.is_nan() {
            self.walkable_slope_angle = 0.0;
        }
    }

    /// Whether every parameter lies in its allowed range. Always true after [`Self::clean`].
    pub fn is_valid(&self) -> bool {
        self.cell_size >= MIN_CELL_SIZE
            && self.cell_height >= MIN_CELL_SIZE
            && self.walkable_height >= MIN_WALKABLE_HEIGHT
            && (0.0..=MAX_ALLOWED_SLOPE.to_radians()).contains(&self.walkable_slope_angle)
            && (3..=MAX_ALLOWED_VERTS_PER_POLY).contains(&self.max_vertices_per_polygon)
            && self.max_simplification_error >= 0.0
            && (self.detail_sample_dist == 0.0 || self.detail_sample_dist >= MIN_DETAIL_SAMPLE_DIST)
            && self.detail_sample_max_error >= 0.0
    }

    /// The contour flags implied by [`Self::build_flags`].
    pub fn contour_flags(&self) -> BuildContoursFlags {
        let mut flags = BuildContoursFlags::empty();
        flags.set(
            BuildContoursFlags::TESSELLATE_SOLID_WALL_EDGES,
            self.build_flags.contains(BuildFlags::TESSELLATE_WALL_EDGES),
        );
        flags.set(
            BuildContoursFlags::TESSELLATE_AREA_EDGES,
            self.build_flags.contains(BuildFlags::TESSELLATE_AREA_EDGES),
        );
        flags
    }
}

bitflags::bitflags! {
    /// Switches for the optional steps of an [`IncrementalBuilder`](crate::IncrementalBuilder) build.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
    pub struct BuildFlags: u16 {
        /// Run [`Heightfield::filter_low_hanging_walkable_obstacles`](crate::Heightfield::filter_low_hanging_walkable_obstacles).
        const LOW_OBSTACLES_WALKABLE = 1 << 0;
        /// Run [`Heightfield::filter_ledge_spans`](crate::Heightfield::filter_ledge_spans).
        const LEDGE_SPANS_NOT_WALKABLE = 1 << 1;
        /// Run [`Heightfield::filter_walkable_low_height_spans`](crate::Heightfield::filter_walkable_low_height_spans).
        const LOW_HEIGHT_SPANS_NOT_WALKABLE = 1 << 2;
        /// Split long contour edges along walls.
        const TESSELLATE_WALL_EDGES = 1 << 3;
        /// Split long contour edges between areas.
        const TESSELLATE_AREA_EDGES = 1 << 4;
        /// Partition regions with [`CompactHeightfield::build_regions_monotone`](crate::CompactHeightfield::build_regions_monotone)
        /// instead of the watershed.
        const USE_MONOTONE_PARTITIONING = 1 << 5;
        /// Filter low obstacles before ledges instead of after.
        const LOW_OBSTACLES_FIRST = 1 << 6;
        /// Set the flags of every polygon to [`PolygonNavmesh::DEFAULT_FLAG`](crate::PolygonNavmesh::DEFAULT_FLAG).
        const APPLY_POLY_FLAGS = 1 << 7;
    }
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self::LOW_OBSTACLES_WALKABLE
            | Self::LEDGE_SPANS_NOT_WALKABLE
            | Self::LOW_HEIGHT_SPANS_NOT_WALKABLE
            | Self::TESSELLATE_WALL_EDGES
    }
}

/// A builder for [`NavmeshConfig`] taking its parameters in world units.
/// The defaults suit an agent resembling an adult human.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfigBuilder {
    /// The xz-plane cell size. See [`NavmeshConfig::cell_size`]. `[Units: wu]`
    pub cell_size: f32,
    /// The y-axis cell size. See [`NavmeshConfig::cell_height`]. `[Units: wu]`
    pub cell_height: f32,
    /// The height of the agent. `[Limit: > 0] [Units: wu]`
    ///
    /// Add a little padding: an agent that is 1.8 units tall might use 2.0.
    pub agent_height: f32,
    /// The radius of the agent. `[Limit: >= 0] [Units: wu]`
    pub agent_radius: f32,
    /// The highest step the agent can climb. `[Limit: >= 0] [Units: wu]`
    pub agent_max_climb: f32,
    /// The steepest slope the agent can walk on. `[Units: Radians]`
    pub agent_max_slope: f32,
    /// The side length of the smallest kept island region. `[Units: vx]`
    pub region_min_size: f32,
    /// The side length below which regions get merged. `[Units: vx]`
    pub region_merge_size: f32,
    /// The maximum length of border edges. `[Units: wu]`
    pub edge_max_len: f32,
    /// See [`NavmeshConfig::max_simplification_error`]. `[Units: vx]`
    pub edge_max_error: f32,
    /// See [`NavmeshConfig::max_vertices_per_polygon`].
    pub verts_per_poly: u16,
    /// The detail sampling distance. `[Units: cells]`
    ///
    /// Values below [`MIN_DETAIL_SAMPLE_DIST`] disable height sampling.
    pub detail_sample_dist: f32,
    /// The allowed detail deviation. `[Units: cell heights]`
    pub detail_sample_max_error: f32,
    /// The width of the non-navigable border. `[Units: wu]`
    pub border_size: f32,
    /// See [`NavmeshConfig::aabb`].
    pub aabb: Option<Aabb3d>,
    /// See [`NavmeshConfig::build_flags`].
    pub build_flags: BuildFlags,
}

impl Default for NavmeshConfigBuilder {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0_f32.to_radians(),
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            border_size: 0.0,
            aabb: None,
            build_flags: BuildFlags::default(),
        }
    }
}

impl NavmeshConfigBuilder {
    /// Builds a [`NavmeshConfig`], converting world units to voxels.
    pub fn build(self) -> NavmeshConfig {
        NavmeshConfig {
            border_size: (self.border_size / self.cell_size).ceil() as u16,
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            aabb: self.aabb,
            walkable_slope_angle: self.agent_max_slope,
            walkable_height: (self.agent_height / self.cell_height).ceil() as u16,
            walkable_climb: (self.agent_max_climb / self.cell_height).floor() as u16,
            walkable_radius: (self.agent_radius / self.cell_size).ceil() as u16,
            max_edge_len: (self.edge_max_len / self.cell_size).ceil() as u16,
            max_simplification_error: self.edge_max_error,
            min_region_area: (self.region_min_size * self.region_min_size) as u16,
            merge_region_area: (self.region_merge_size * self.region_merge_size) as u16,
            max_vertices_per_polygon: self.verts_per_poly,
            detail_sample_dist: if self.detail_sample_dist < MIN_DETAIL_SAMPLE_DIST {
                0.0
            } else {
                self.cell_size * self.detail_sample_dist
            },
            detail_sample_max_error: self.cell_height * self.detail_sample_max_error,
            build_flags: self.build_flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_converts_to_voxels() {
        let config = NavmeshConfigBuilder {
            cell_size: 0.2,
            cell_height: 0.1,
            agent_height: 2.1,
            agent_radius: 0.3,
            agent_max_climb: 0.5,
            edge_max_len: 5.0,
            ..Default::default()
        }
        .build();

        assert_eq!(config.walkable_height, 21);
        assert_eq!(config.walkable_climb, 5);
        assert_eq!(config.walkable_radius, 2);
        assert_eq!(config.max_edge_len, 25);
        assert_eq!(config.min_region_area, 64);
        assert_eq!(config.merge_region_area, 400);
        assert!(config.is_valid());
    }

    #[test]
    fn small_detail_sample_distance_disables_sampling() {
        let config = NavmeshConfigBuilder {
            detail_sample_dist: 0.5,
            ..Default::default()
        }
        .build();
        assert_eq!(config.detail_sample_dist, 0.0);
    }

    #[test]
    fn clean_makes_config_valid() {
        let mut config = NavmeshConfig {
            cell_size: 0.0,
            cell_height: -1.0,
            walkable_height: 1,
            walkable_slope_angle: 2.0,
            max_vertices_per_polygon: 12,
            max_simplification_error: -1.0,
            detail_sample_dist: 0.5,
            detail_sample_max_error: f32::NAN,
            ..Default::default()
        };
        assert!(!config.is_valid());

        config.clean();

        assert!(config.is_valid());
        assert_eq!(config.cell_size, MIN_CELL_SIZE);
        assert_eq!(config.cell_height, MIN_CELL_SIZE);
        assert_eq!(config.walkable_height, MIN_WALKABLE_HEIGHT);
        assert_eq!(config.walkable_slope_angle, MAX_ALLOWED_SLOPE.to_radians());
        assert_eq!(config.max_vertices_per_polygon, MAX_ALLOWED_VERTS_PER_POLY);
        assert_eq!(config.detail_sample_dist, 0.0);
        assert_eq!(config.detail_sample_max_error, 0.0);
    }

    #[test]
    fn too_few_vertices_per_polygon_are_raised() {
        let mut config = NavmeshConfig {
            max_vertices_per_polygon: 1,
            ..Default::default()
        };
        config.clean();
        assert_eq!(config.max_vertices_per_polygon, 3);
    }

    #[test]
    fn contour_flags_follow_build_flags() {
        let mut config = NavmeshConfig::default();
        assert_eq!(config.contour_flags(), BuildContoursFlags::DEFAULT);

        config.build_flags = BuildFlags::TESSELLATE_AREA_EDGES;
        assert_eq!(
            config.contour_flags(),
            BuildContoursFlags::TESSELLATE_AREA_EDGES
        );
    }
}
