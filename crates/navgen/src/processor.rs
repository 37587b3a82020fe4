//! User-supplied steps that run between the stages of an [`IncrementalBuilder`](crate::IncrementalBuilder).

use std::fmt;

use anyhow::{Context as _, bail};

use crate::{
    BuildContext, CompactHeightfield, ContourSet, ConvexVolume, CylinderVolume, DetailNavmesh,
    Heightfield, NavmeshConfig, PolygonNavmesh,
};

/// The stage that has just finished when a [`BuildProcessor`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildStage {
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
}

/// The data a [`BuildProcessor`] may inspect and modify.
///
/// Only the intermediate results that exist at the current [`BuildStage`] are `Some`.
pub struct ProcessorContext<'a> {
    /// The config of the running build.
    pub config: &'a NavmeshConfig,
    /// The message log of the running build.
    pub log: &'a mut BuildContext,
    /// Available from [`BuildStage::HeightfieldBuild`] until the compact heightfield replaces it.
    pub heightfield: Option<&'a mut Heightfield>,
    /// Available from [`BuildStage::CompactFieldBuild`] on.
    pub compact_heightfield: Option<&'a mut CompactHeightfield>,
    /// Available from [`BuildStage::ContourBuild`] until the polygon mesh replaces it.
    pub contours: Option<&'a mut ContourSet>,
    /// Available from [`BuildStage::PolyMeshBuild`] on.
    pub poly_mesh: Option<&'a mut PolygonNavmesh>,
    /// Available at [`BuildStage::DetailMeshBuild`].
    pub detail_mesh: Option<&'a mut DetailNavmesh>,
}

/// A step that runs after every stage of a build.
///
/// Processors ignore the stages they are not interested in by returning `Ok(())`.
/// Returning an error aborts the build.
pub trait BuildProcessor: fmt::Debug {
    /// A human-readable name used in log messages.
    fn name(&self) -> &str;

    /// Processors with a higher priority run first.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether the processor can be shared between builds running on different threads.
    fn is_thread_safe(&self) -> bool {
        false
    }

    /// Runs the processor after `stage` has finished.
    fn process(&self, stage: BuildStage, context: &mut ProcessorContext) -> anyhow::Result<()>;
}

/// An ordered list of [`BuildProcessor`]s.
#[derive(Debug, Default)]
pub struct ProcessorSet {
    processors: Vec<Box<dyn BuildProcessor>>,
}

impl ProcessorSet {
    /// Creates a set running the processors by descending priority.
    /// Processors with equal priority keep their relative order.
    pub fn new(mut processors: Vec<Box<dyn BuildProcessor>>) -> Self {
        processors.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        Self { processors }
    }

    /// The number of processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the set has no processors.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// The processors in the order they run.
    pub fn iter(&self) -> impl Iterator<Item = &dyn BuildProcessor> {
        self.processors.iter().map(|p| p.as_ref())
    }

    /// Whether every processor is thread safe. True for an empty set.
    pub fn is_thread_safe(&self) -> bool {
        self.processors.iter().all(|p| p.is_thread_safe())
    }

    /// Runs every processor in order, stopping at the first failure.
    pub fn process(&self, stage: BuildStage, context: &mut ProcessorContext) -> anyhow::Result<()> {
        for processor in &self.processors {
            processor
                .process(stage, context)
                .with_context(|| format!("Processor {} failed at {stage:?}", processor.name()))?;
        }
        Ok(())
    }

    /// Writes the names of the processors to the log.
    pub fn log_processors(&self, log: &mut BuildContext) {
        for processor in &self.processors {
            log.log(format!(
                "Processor: {} (priority {})",
                processor.name(),
                processor.priority()
            ));
        }
    }
}

/// The volume painted by an [`AreaMarker`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum MarkerShape {
    /// A convex prism.
    Convex(ConvexVolume),
    /// An upright cylinder.
    Cylinder(CylinderVolume),
}

/// A [`BuildProcessor`] that paints an area type onto the compact heightfield.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AreaMarker {
    name: String,
    priority: i32,
    shape: MarkerShape,
}

impl AreaMarker {
    /// Creates a marker for a convex volume.
    /// Returns `None` if the volume has no vertices or its vertical range is inverted.
    pub fn convex(name: impl Into<String>, priority: i32, volume: ConvexVolume) -> Option<Self> {
        if volume.vertices.is_empty() || volume.min_y > volume.max_y {
            return None;
        }
        Some(Self {
            name: name.into(),
            priority,
            shape: MarkerShape::Convex(volume),
        })
    }

    /// Creates a marker for a cylinder. Negative radii and heights are clamped to zero.
    pub fn cylinder(name: impl Into<String>, priority: i32, mut volume: CylinderVolume) -> Self {
        volume.radius = volume.radius.max(0.0);
        volume.height = volume.height.max(0.0);
        Self {
            name: name.into(),
            priority,
            shape: MarkerShape::Cylinder(volume),
        }
    }

    /// The painted volume.
    pub fn shape(&self) -> &MarkerShape {
        &self.shape
    }
}

impl BuildProcessor for AreaMarker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn process(&self, stage: BuildStage, context: &mut ProcessorContext) -> anyhow::Result<()> {
        if stage != BuildStage::CompactFieldBuild {
            return Ok(());
        }
        let Some(compact) = context.compact_heightfield.as_deref_mut() else {
            bail!("{}: no compact heightfield to mark", self.name);
        };
        let (kind, area, marked) = match &self.shape {
            MarkerShape::Convex(volume) => {
                ("convex", volume.area, compact.mark_convex_poly_area(volume))
            }
            MarkerShape::Cylinder(volume) => {
                ("cylinder", volume.area, compact.mark_cylinder_area(volume))
            }
        };
        context.log.log(format!(
            "{}: Marked {kind} area ({marked} spans). Area: {}, Priority: {}",
            self.name, area.0, self.priority
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::{Vec2, Vec3};

    use crate::{AreaType, test_utils::flat_compact};

    use super::*;

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        priority: i32,
        fail: bool,
        calls: Rc<RefCell<Vec<&'static str>>>,
    }

    impl BuildProcessor for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn process(
            &self,
            _stage: BuildStage,
            _context: &mut ProcessorContext,
        ) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(self.name);
            if self.fail {
                bail!("{} refused", self.name);
            }
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        priority: i32,
        fail: bool,
        calls: &Rc<RefCell<Vec<&'static str>>>,
    ) -> Box<dyn BuildProcessor> {
        Box::new(Recorder {
            name,
            priority,
            fail,
            calls: calls.clone(),
        })
    }

    fn run(
        set: &ProcessorSet,
        compact: Option<&mut CompactHeightfield>,
    ) -> (anyhow::Result<()>, BuildContext) {
        let config = NavmeshConfig::default();
        let mut log = BuildContext::new();
        let result = set.process(
            BuildStage::CompactFieldBuild,
            &mut ProcessorContext {
                config: &config,
                log: &mut log,
                heightfield: None,
                compact_heightfield: compact,
                contours: None,
                poly_mesh: None,
                detail_mesh: None,
            },
        );
        (result, log)
    }

    #[test]
    fn processors_run_by_descending_priority() {
        let calls = Rc::default();
        let set = ProcessorSet::new(vec![
            recorder("low", 1, false, &calls),
            recorder("high", 10, false, &calls),
            recorder("also low", 1, false, &calls),
        ]);

        let (result, _) = run(&set, None);

        assert!(result.is_ok());
        assert_eq!(*calls.borrow(), ["high", "low", "also low"]);
    }

    #[test]
    fn first_failure_stops_the_set() {
        let calls = Rc::default();
        let set = ProcessorSet::new(vec![
            recorder("first", 3, false, &calls),
            recorder("broken", 2, true, &calls),
            recorder("never", 1, false, &calls),
        ]);

        let (result, _) = run(&set, None);

        assert!(result.is_err());
        assert_eq!(*calls.borrow(), ["first", "broken"]);
    }

    #[test]
    fn thread_safety_requires_every_member() {
        let calls = Rc::default();
        assert!(ProcessorSet::default().is_thread_safe());

        let marker = AreaMarker::cylinder("pond", 0, CylinderVolume::default());
        let set = ProcessorSet::new(vec![Box::new(marker.clone())]);
        assert!(set.is_thread_safe());

        let set = ProcessorSet::new(vec![Box::new(marker), recorder("plain", 0, false, &calls)]);
        assert!(!set.is_thread_safe());
    }

    #[test]
    fn convex_marker_rejects_invalid_volumes() {
        let empty = ConvexVolume {
            vertices: vec![],
            min_y: 0.0,
            max_y: 1.0,
            area: AreaType(3),
        };
        assert!(AreaMarker::convex("empty", 0, empty).is_none());

        let inverted = ConvexVolume {
            vertices: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            min_y: 2.0,
            max_y: 1.0,
            area: AreaType(3),
        };
        assert!(AreaMarker::convex("inverted", 0, inverted).is_none());
    }

    #[test]
    fn cylinder_marker_clamps_negative_sizes() {
        let marker = AreaMarker::cylinder(
            "pond",
            0,
            CylinderVolume {
                center_base: Vec3::ZERO,
                radius: -2.0,
                height: -1.0,
                area: AreaType(3),
            },
        );
        let MarkerShape::Cylinder(volume) = marker.shape() else {
            panic!("expected a cylinder");
        };
        assert_eq!(volume.radius, 0.0);
        assert_eq!(volume.height, 0.0);
    }

    #[test]
    fn area_marker_paints_compact_heightfield() {
        let mut compact = flat_compact(6);
        let marker = AreaMarker::cylinder(
            "pond",
            5,
            CylinderVolume {
                center_base: Vec3::new(3.0, 0.0, 3.0),
                radius: 10.0,
                height: 4.0,
                area: AreaType(7),
            },
        );
        let set = ProcessorSet::new(vec![Box::new(marker)]);

        let (result, log) = run(&set, Some(&mut compact));

        assert!(result.is_ok());
        assert!(compact.areas.iter().all(|area| *area == AreaType(7)));
        assert_eq!(log.message_count(), 1);
        assert!(log.messages()[0].text.starts_with("pond: Marked cylinder area"));
    }

    #[test]
    fn area_marker_without_compact_heightfield_fails() {
        let marker = AreaMarker::cylinder("pond", 0, CylinderVolume::default());
        let set = ProcessorSet::new(vec![Box::new(marker)]);
        let (result, _) = run(&set, None);
        assert!(result.is_err());
    }
}
