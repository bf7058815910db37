//! Solver configuration and progress reporting.

use crate::error::{Error, Result};
use crate::geometry::{BoundingBox, Point, Polygon};
use crate::rational::Rational;
use std::sync::mpsc::Sender;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper end of the progress scale.
pub const PROGRESS_RANGE: u32 = 100;

/// Polygon decimation precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DecimationPrecision {
    /// No decimation.
    Undefined,
    /// Fine decimation (tolerance 150000 slicer units).
    #[default]
    Low,
    /// Coarse decimation (tolerance 450000 slicer units).
    High,
}

impl DecimationPrecision {
    /// Douglas-Peucker tolerance in slicer units.
    pub fn tolerance(self) -> f64 {
        match self {
            DecimationPrecision::Undefined => 0.0,
            DecimationPrecision::Low => 150_000.0,
            DecimationPrecision::High => 450_000.0,
        }
    }
}

/// How line non-intersection constraints are guarded by the print order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LineEncoding {
    /// The order comparison is folded into the disjunction.
    #[default]
    Implicit,
    /// A boolean order variable per object pair guards the constraint.
    Explicit,
}

/// Strategy for sizing the centred box that holds a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BoxSearch {
    /// Whole plate only.
    Full,
    /// Shrink by a fixed step while feasible.
    Linear,
    /// Bisect the half-extent.
    #[default]
    Binary,
}

/// Per-invocation solver configuration.
///
/// Sizes are in solver units (slicer units divided by
/// [`SolverConfiguration::slicer_scale_factor`]).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfiguration {
    /// Plate width.
    pub x_plate_bounding_box_size: i64,
    /// Plate depth.
    pub y_plate_bounding_box_size: i64,
    /// Optional convex plate outline; replaces the box when set.
    pub plate_bounding_polygon: Option<Polygon>,
    /// Smallest box the centred search tries.
    pub minimum_bounding_box_size: i64,
    /// Step of the linear box search.
    pub bounding_box_size_optimization_step: i64,
    /// Stop bisecting when the half-extent interval is this narrow.
    pub bounding_box_resolution: i64,
    /// Box sizing strategy.
    pub box_search: BoxSearch,
    /// Maximum number of objects decided in one batch.
    pub object_group_size: usize,
    /// Minimum separation of print times.
    pub temporal_spread: i64,
    /// Footprint decimation.
    pub decimation_precision: DecimationPrecision,
    /// Time limit of one solver check.
    pub optimization_timeout_ms: u64,
    /// Refinement rounds per feasibility query.
    pub max_refinements: usize,
    /// Encoding of order-guarded line constraints.
    pub line_encoding: LineEncoding,
    /// Retry with [`LineEncoding::Explicit`] after an implicit timeout.
    pub explicit_fallback: bool,
    /// Fraction by which segments are extended at both ends in line
    /// non-intersection constraints.
    pub intersection_repulsion: Rational,
    /// Print times at or above this mark an object present.
    pub temporal_presence_threshold: i64,
    /// Print times at or below this mark an object missing.
    pub temporal_absence_threshold: i64,
    /// Print time assigned to the first decided object.
    pub ground_presence_time: i64,
    /// Slicer units per solver unit.
    pub slicer_scale_factor: i64,
}

impl Default for SolverConfiguration {
    fn default() -> Self {
        Self {
            x_plate_bounding_box_size: 2500,
            y_plate_bounding_box_size: 2100,
            plate_bounding_polygon: None,
            minimum_bounding_box_size: 10,
            bounding_box_size_optimization_step: 4,
            bounding_box_resolution: 4,
            box_search: BoxSearch::default(),
            object_group_size: 4,
            temporal_spread: 16,
            decimation_precision: DecimationPrecision::default(),
            optimization_timeout_ms: 8000,
            max_refinements: 16,
            line_encoding: LineEncoding::default(),
            explicit_fallback: true,
            intersection_repulsion: Rational::new(1, 100),
            temporal_presence_threshold: 16,
            temporal_absence_threshold: -16,
            ground_presence_time: 32,
            slicer_scale_factor: 100_000,
        }
    }
}

impl SolverConfiguration {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the plate size in solver units.
    pub fn with_plate_size(mut self, x: i64, y: i64) -> Self {
        self.x_plate_bounding_box_size = x;
        self.y_plate_bounding_box_size = y;
        self
    }

    /// Sets the plate size from slicer units.
    pub fn with_slicer_plate_size(self, x: i64, y: i64) -> Self {
        let scale = self.slicer_scale_factor.max(1);
        self.with_plate_size(x / scale, y / scale)
    }

    /// Uses a convex plate outline instead of the box.
    pub fn with_plate_polygon(mut self, polygon: Polygon) -> Self {
        self.plate_bounding_polygon = Some(polygon.counter_clockwise());
        self
    }

    /// Sets the batch size (at least 1).
    pub fn with_object_group_size(mut self, size: usize) -> Self {
        self.object_group_size = size.max(1);
        self
    }

    /// Sets the temporal spread (at least 1).
    pub fn with_temporal_spread(mut self, spread: i64) -> Self {
        self.temporal_spread = spread.max(1);
        self
    }

    /// Sets the decimation precision.
    pub fn with_decimation_precision(mut self, precision: DecimationPrecision) -> Self {
        self.decimation_precision = precision;
        self
    }

    /// Sets the per-check timeout in milliseconds.
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.optimization_timeout_ms = ms;
        self
    }

    /// Sets the refinement limit.
    pub fn with_max_refinements(mut self, rounds: usize) -> Self {
        self.max_refinements = rounds;
        self
    }

    /// Sets the line encoding.
    pub fn with_line_encoding(mut self, encoding: LineEncoding) -> Self {
        self.line_encoding = encoding;
        self
    }

    /// Enables or disables the explicit-encoding retry.
    pub fn with_explicit_fallback(mut self, enabled: bool) -> Self {
        self.explicit_fallback = enabled;
        self
    }

    /// Sets the box search strategy.
    pub fn with_box_search(mut self, search: BoxSearch) -> Self {
        self.box_search = search;
        self
    }

    /// Sets the bisection resolution (at least 1).
    pub fn with_bounding_box_resolution(mut self, resolution: i64) -> Self {
        self.bounding_box_resolution = resolution.max(1);
        self
    }

    /// Sets the smallest box size tried.
    pub fn with_minimum_bounding_box_size(mut self, size: i64) -> Self {
        self.minimum_bounding_box_size = size.max(0);
        self
    }

    /// Sets the linear search step (at least 1).
    pub fn with_optimization_step(mut self, step: i64) -> Self {
        self.bounding_box_size_optimization_step = step.max(1);
        self
    }

    /// Douglas-Peucker tolerance in slicer units.
    pub fn decimation_tolerance(&self) -> f64 {
        self.decimation_precision.tolerance()
    }

    /// Gap between consecutive decided print times.
    pub fn temporal_gap(&self) -> i64 {
        2 * self.temporal_spread * self.object_group_size as i64
    }

    /// Plate box `[0, x] × [0, y]`, or the outline's bounding box.
    pub fn plate_bounding_box(&self) -> BoundingBox {
        match &self.plate_bounding_polygon {
            Some(polygon) => polygon.bounding_box(),
            None => BoundingBox::new(
                Point::new(0, 0),
                Point::new(self.x_plate_bounding_box_size, self.y_plate_bounding_box_size),
            ),
        }
    }

    /// Plate area in square solver units.
    pub fn plate_area(&self) -> f64 {
        match &self.plate_bounding_polygon {
            Some(polygon) => polygon.area(),
            None => self.x_plate_bounding_box_size as f64 * self.y_plate_bounding_box_size as f64,
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.x_plate_bounding_box_size <= 0 || self.y_plate_bounding_box_size <= 0 {
            return Err(Error::InvalidBoundary(format!(
                "plate size {}x{} must be positive",
                self.x_plate_bounding_box_size, self.y_plate_bounding_box_size
            )));
        }
        if let Some(polygon) = &self.plate_bounding_polygon {
            polygon.validate()?;
            if !polygon.is_convex() {
                return Err(Error::InvalidBoundary("plate polygon must be convex".into()));
            }
        }
        if self.object_group_size == 0 {
            return Err(Error::InvalidConfig("object group size must be positive".into()));
        }
        if self.temporal_spread <= 0 {
            return Err(Error::InvalidConfig("temporal spread must be positive".into()));
        }
        if self.temporal_absence_threshold >= self.temporal_presence_threshold {
            return Err(Error::InvalidConfig(format!(
                "absence threshold {} must lie below presence threshold {}",
                self.temporal_absence_threshold, self.temporal_presence_threshold
            )));
        }
        if self.ground_presence_time < self.temporal_presence_threshold {
            return Err(Error::InvalidConfig(
                "ground presence time must not be below the presence threshold".into(),
            ));
        }
        if self.slicer_scale_factor <= 0 {
            return Err(Error::InvalidConfig("slicer scale factor must be positive".into()));
        }
        if self.intersection_repulsion.is_negative() {
            return Err(Error::InvalidConfig("intersection repulsion must not be negative".into()));
        }
        Ok(())
    }
}

/// Progress information during arrangement.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgressInfo {
    /// Objects decided so far.
    pub objects_done: usize,
    /// Objects in the whole job.
    pub total_objects: usize,
    /// Plate (round) being filled, starting at 0.
    pub plate: usize,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: u64,
    /// Current phase description.
    pub phase: String,
    /// Whether the arrangement is still running.
    pub running: bool,
}

impl ProgressInfo {
    /// Creates a progress record of a running job.
    pub fn new() -> Self {
        Self {
            running: true,
            ..Default::default()
        }
    }

    /// Sets the object counts.
    pub fn with_objects(mut self, done: usize, total: usize) -> Self {
        self.objects_done = done;
        self.total_objects = total;
        self
    }

    /// Sets the plate index.
    pub fn with_plate(mut self, plate: usize) -> Self {
        self.plate = plate;
        self
    }

    /// Sets the elapsed time.
    pub fn with_elapsed(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Sets the phase description.
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Marks the job as finished.
    pub fn finished(mut self) -> Self {
        self.running = false;
        self
    }

    /// Progress on the `0..=PROGRESS_RANGE` scale.
    pub fn progress_percent(&self) -> u32 {
        if self.total_objects == 0 {
            return PROGRESS_RANGE;
        }
        ((PROGRESS_RANGE as usize * self.objects_done.min(self.total_objects)) / self.total_objects)
            as u32
    }
}

/// Receiver of progress updates.
pub trait ProgressReporter {
    /// Called after every committed batch.
    fn report(&self, info: ProgressInfo);
}

impl<F: Fn(ProgressInfo)> ProgressReporter for F {
    fn report(&self, info: ProgressInfo) {
        self(info)
    }
}

/// Reporter that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _info: ProgressInfo) {}
}

/// Reporter that forwards updates into a channel the caller polls.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    sender: Sender<ProgressInfo>,
}

impl ChannelReporter {
    /// Wraps a channel sender.
    pub fn new(sender: Sender<ProgressInfo>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, info: ProgressInfo) {
        if self.sender.send(info).is_err() {
            log::debug!("progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc::channel;

    #[test]
    fn test_default_configuration() {
        let config = SolverConfiguration::default();
        assert_eq!(config.temporal_spread, 16);
        assert_eq!(config.optimization_timeout_ms, 8000);
        assert_eq!(config.object_group_size, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_clamps() {
        let config = SolverConfiguration::new()
            .with_object_group_size(0)
            .with_temporal_spread(-3)
            .with_bounding_box_resolution(0);
        assert_eq!(config.object_group_size, 1);
        assert_eq!(config.temporal_spread, 1);
        assert_eq!(config.bounding_box_resolution, 1);
    }

    #[test]
    fn test_decimation_tolerance() {
        assert_eq!(DecimationPrecision::Undefined.tolerance(), 0.0);
        assert_eq!(DecimationPrecision::Low.tolerance(), 150_000.0);
        assert_eq!(DecimationPrecision::High.tolerance(), 450_000.0);
    }

    #[test]
    fn test_slicer_plate_size() {
        let config = SolverConfiguration::new().with_slicer_plate_size(250_000_000, 210_000_000);
        assert_eq!(config.x_plate_bounding_box_size, 2500);
        assert_eq!(config.y_plate_bounding_box_size, 2100);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(SolverConfiguration::new().with_plate_size(0, 10).validate().is_err());

        let mut config = SolverConfiguration::new();
        config.temporal_absence_threshold = 20;
        assert!(config.validate().is_err());

        let concave = Polygon::from_coords(&[(0, 0), (10, 0), (10, 10), (5, 2), (0, 10)]);
        assert!(SolverConfiguration::new()
            .with_plate_polygon(concave)
            .validate()
            .is_err());
    }

    #[test]
    fn test_plate_bounding_box() {
        let config = SolverConfiguration::new().with_plate_size(100, 50);
        let bb = config.plate_bounding_box();
        assert_eq!(bb.width(), 100);
        assert_eq!(bb.height(), 50);
        assert_eq!(config.plate_area(), 5000.0);
    }

    #[test]
    fn test_progress_percent() {
        let info = ProgressInfo::new().with_objects(1, 4);
        assert_eq!(info.progress_percent(), 25);
        assert_eq!(ProgressInfo::new().progress_percent(), PROGRESS_RANGE);
        assert!(!info.finished().running);
    }

    #[test]
    fn test_closure_reporter() {
        let seen = RefCell::new(Vec::new());
        let reporter = |info: ProgressInfo| seen.borrow_mut().push(info.progress_percent());
        reporter.report(ProgressInfo::new().with_objects(1, 2));
        reporter.report(ProgressInfo::new().with_objects(2, 2));
        assert_eq!(*seen.borrow(), vec![50, 100]);
    }

    #[test]
    fn test_boxed_reporter() {
        fn notify<R: ProgressReporter + ?Sized>(reporter: &R) {
            reporter.report(ProgressInfo::new().with_objects(2, 4));
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let reporter: Box<dyn ProgressReporter> =
            Box::new(move |info: ProgressInfo| sink.borrow_mut().push(info.objects_done));
        notify(&*reporter);
        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn test_channel_reporter() {
        let (tx, rx) = channel();
        let reporter = ChannelReporter::new(tx);
        reporter.report(ProgressInfo::new().with_objects(3, 3).with_phase("done"));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.objects_done, 3);
        assert_eq!(received.phase, "done");
    }
}
