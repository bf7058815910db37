//! # seqarrange sequential
//!
//! Placement and print ordering of objects printed one after another.
//!
//! When objects are printed sequentially, the print head descends over the
//! plate once per object. Everything it sweeps while printing an object (its
//! unreachable zone) must be free of objects printed earlier. This crate
//! decides translations `X, Y` and print times `T` such that
//!
//! - footprints do not overlap and stay on the plate,
//! - the zone of every object misses the footprints of all objects printed
//!   before it.
//!
//! ## Pipeline
//!
//! 1. [`preprocess`]: convex hull, decimation and scale-down of footprints
//! 2. [`zones`]: unreachable zones per print head level
//! 3. [`constraints`], [`temporal`], [`model`]: linear formulas over the decision
//!    variables of a batch
//! 4. [`optimizer`]: feasibility queries, exact verification ([`verify`]) and
//!    refinement ([`refine`]), centred box search
//! 5. [`subglobal`]: batches of objects on one plate
//! 6. [`interface`]: multi-plate scheduling in slicer units
//!
//! Solving goes through the [`SolverSession`] abstraction, with a HiGHS
//! backend ([`MilpBackend`], feature `milp`) and an SMT-LIB2 process backend
//! ([`SmtLibBackend`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seqarrange_sequential::{
//!     ExtruderLevel, ExtruderLevelKind, ObjectToPrint, PrinterGeometry, SequentialArranger,
//! };
//! use seqarrange_core::{Polygon, SolverConfiguration};
//!
//! let mm = 1_000_000;
//! let printer = PrinterGeometry::new(250 * mm, 210 * mm).with_level(ExtruderLevel::new(
//!     ExtruderLevelKind::Extruder,
//!     2 * mm,
//!     vec![Polygon::centered_rectangle(40 * mm, 20 * mm)],
//! ));
//! let objects: Vec<ObjectToPrint> = (0..4)
//!     .map(|id| ObjectToPrint::new(id, 20 * mm, Polygon::rectangle(30 * mm, 30 * mm)))
//!     .collect();
//!
//! let arranger = SequentialArranger::new(SolverConfiguration::default());
//! let schedule = arranger.schedule(&printer, &objects).unwrap();
//! for (i, plate) in schedule.plates.iter().enumerate() {
//!     println!("plate {}: {:?}", i, plate.objects);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `milp` (default): HiGHS backend through `good_lp`
//! - `serde`: Enable serialization/deserialization support

pub mod constraints;
pub mod decoder;
pub mod interface;
pub mod milp_solver;
pub mod model;
pub mod optimizer;
pub mod preprocess;
pub mod refine;
pub mod smtlib;
pub mod subglobal;
pub mod temporal;
pub mod variables;
pub mod verify;
pub mod zones;

#[cfg(test)]
mod testing;

pub use interface::{
    check_scheduled_objects_for_sequential_printability, schedule_objects_for_sequential_print, ObjectToPrint,
    PrinterGeometry, PrinterSetup, Schedule, ScheduledObject, ScheduledPlate,
};
pub use milp_solver::{is_milp_available, MilpBackend, MilpConfig, MilpSession};
pub use model::ArrangementProblem;
pub use optimizer::{BatchOutcome, BatchVerdict, BoxSearcher};
pub use smtlib::{SmtLibBackend, SmtLibSession};
pub use subglobal::{
    optimize_subglobal_consequential_polygon_nonoverlapping, optimize_subglobal_polygon_nonoverlapping,
    optimize_subglobal_sequential_polygon_nonoverlapping,
};
pub use temporal::Sequencing;
pub use zones::{ExtruderLevel, ExtruderLevelKind, UnreachableZoneSet, ZoneExpansion};

use seqarrange_core::{
    ArrangementResult, NoProgress, Polygon, ProgressReporter, Result, SolverBackend, SolverConfiguration,
};

/// Sequential arrangement with a fixed configuration and backend.
///
/// Thin facade over the [`subglobal`] drivers and the [`interface`]
/// scheduler.
#[derive(Debug, Clone)]
pub struct SequentialArranger<B: SolverBackend = MilpBackend> {
    config: SolverConfiguration,
    backend: B,
}

impl SequentialArranger<MilpBackend> {
    /// Creates an arranger using the HiGHS backend.
    pub fn new(config: SolverConfiguration) -> Self {
        if !is_milp_available() {
            log::warn!("built without the 'milp' feature, every check will answer unknown");
        }
        Self::with_backend(config, MilpBackend::new())
    }

    /// Creates an arranger with default configuration.
    pub fn default_config() -> Self {
        Self::new(SolverConfiguration::default())
    }
}

impl<B: SolverBackend> SequentialArranger<B> {
    /// Creates an arranger with an explicit backend.
    pub fn with_backend(config: SolverConfiguration, backend: B) -> Self {
        Self { config, backend }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SolverConfiguration {
        &self.config
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Places all `polygons` (solver units) without print order.
    pub fn arrange(&self, polygons: &[Polygon]) -> Result<ArrangementResult> {
        let objects: Vec<usize> = (0..polygons.len()).collect();
        optimize_subglobal_polygon_nonoverlapping(&self.backend, &self.config, polygons, &objects, &NoProgress)
    }

    /// Places and orders all `polygons` for sequential printing.
    pub fn arrange_sequential(&self, polygons: &[Polygon], zones: &[Vec<Polygon>]) -> Result<ArrangementResult> {
        self.arrange_sequential_with_progress(polygons, zones, &NoProgress)
    }

    /// Like [`Self::arrange_sequential`], reporting after every batch.
    pub fn arrange_sequential_with_progress<R: ProgressReporter + ?Sized>(
        &self,
        polygons: &[Polygon],
        zones: &[Vec<Polygon>],
        reporter: &R,
    ) -> Result<ArrangementResult> {
        let objects: Vec<usize> = (0..polygons.len()).collect();
        optimize_subglobal_sequential_polygon_nonoverlapping(
            &self.backend,
            &self.config,
            polygons,
            zones,
            &objects,
            reporter,
        )
    }

    /// Sequential arrangement with windowed presence assumptions.
    pub fn arrange_consequential(&self, polygons: &[Polygon], zones: &[Vec<Polygon>]) -> Result<ArrangementResult> {
        let objects: Vec<usize> = (0..polygons.len()).collect();
        optimize_subglobal_consequential_polygon_nonoverlapping(
            &self.backend,
            &self.config,
            polygons,
            zones,
            &objects,
            &NoProgress,
        )
    }

    /// Schedules objects given in slicer units over as many plates as needed.
    pub fn schedule(&self, printer: &PrinterGeometry, objects: &[ObjectToPrint]) -> Result<Schedule> {
        schedule_objects_for_sequential_print(&self.backend, &self.config, printer, objects, &NoProgress)
    }

    /// Like [`Self::schedule`], reporting after every batch.
    pub fn schedule_with_progress<R: ProgressReporter + ?Sized>(
        &self,
        printer: &PrinterGeometry,
        objects: &[ObjectToPrint],
        reporter: &R,
    ) -> Result<Schedule> {
        schedule_objects_for_sequential_print(&self.backend, &self.config, printer, objects, reporter)
    }

    /// Checks a plate given in slicer units and print order.
    pub fn check_printability(
        &self,
        printer: &PrinterGeometry,
        objects: &[ObjectToPrint],
        plate: &[ScheduledObject],
    ) -> Result<bool> {
        check_scheduled_objects_for_sequential_printability(&self.config, printer, objects, plate)
    }

    /// Opens a raw session on the backend.
    pub fn open_session(&self) -> Result<B::Session> {
        self.backend.open_session(self.config.optimization_timeout_ms)
    }
}
