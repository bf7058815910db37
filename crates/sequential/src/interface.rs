//! Scheduling interface in slicer units.
//!
//! Callers describe the printer and the objects in slicer coordinates. Objects
//! are prepared (hull, decimation, scale-down), their unreachable zones are
//! swept at every print head level, and plates are filled one after another
//! until every object is scheduled or found unplaceable.

use std::collections::HashMap;

use crate::model::ArrangementProblem;
use crate::preprocess::{
    decimate_polygon_for_sequential_solver, prepare_object_polygon, scale_down_polygon_for_sequential_solver,
    scale_up_position_for_slicer,
};
use crate::subglobal::optimize_subglobal_sequential_polygon_nonoverlapping;
use crate::verify::{check_extents, collect_violations};
use crate::zones::{prepare_unreachable_zone_polygons, ExtruderLevel};
use seqarrange_core::{
    DecisionValues, Error, Point, Polygon, ProgressInfo, ProgressReporter, Rational, Result, SolverBackend,
    SolverConfiguration,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Printer description in slicer units.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrinterGeometry {
    /// Plate width.
    pub x_size: i64,
    /// Plate depth.
    pub y_size: i64,
    /// Convex plate outline, if the plate is not a box.
    pub plate_polygon: Option<Polygon>,
    /// Print head levels with their danger polygons.
    pub levels: Vec<ExtruderLevel>,
}

impl PrinterGeometry {
    /// Box plate without head levels.
    pub fn new(x_size: i64, y_size: i64) -> Self {
        Self {
            x_size,
            y_size,
            ..Default::default()
        }
    }

    /// Adds a head level.
    pub fn with_level(mut self, level: ExtruderLevel) -> Self {
        self.levels.push(level);
        self
    }

    /// Uses a convex plate outline.
    pub fn with_plate_polygon(mut self, polygon: Polygon) -> Self {
        self.plate_polygon = Some(polygon);
        self
    }
}

/// Adapts a configuration to a printer.
pub trait PrinterSetup: Sized {
    /// Plate size and outline in solver units.
    fn setup(self, printer: &PrinterGeometry) -> Result<Self>;
}

impl PrinterSetup for SolverConfiguration {
    fn setup(self, printer: &PrinterGeometry) -> Result<Self> {
        let scale = self.slicer_scale_factor.max(1);
        let mut config = self.with_slicer_plate_size(printer.x_size, printer.y_size);
        if let Some(polygon) = &printer.plate_polygon {
            config = config.with_plate_polygon(scale_down_plate_polygon(polygon, scale));
        }
        config.validate()?;
        Ok(config)
    }
}

/// Scales a plate outline down, rounding every vertex toward the inside.
fn scale_down_plate_polygon(polygon: &Polygon, scale: i64) -> Polygon {
    let center = polygon.bounding_box().center();
    let inward = |v: i64, c: i64| {
        if v > c {
            v.div_euclid(scale)
        } else {
            -(-v).div_euclid(scale)
        }
    };
    Polygon::new(
        polygon
            .points()
            .iter()
            .map(|p| Point::new(inward(p.x, center.x), inward(p.y, center.y)))
            .collect(),
    )
    .counter_clockwise()
}

/// An object to schedule.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ObjectToPrint {
    /// Caller's identifier.
    pub id: usize,
    /// Object height.
    pub total_height: i64,
    /// Footprint around the object's reference point.
    pub polygon: Polygon,
    /// Outlines at given heights, used for the head level at that height.
    pub pgns_at_height: Vec<(i64, Polygon)>,
}

impl ObjectToPrint {
    /// Object described by its footprint only.
    pub fn new(id: usize, total_height: i64, polygon: Polygon) -> Self {
        Self {
            id,
            total_height,
            polygon,
            pgns_at_height: Vec::new(),
        }
    }

    /// Adds an outline at a height.
    pub fn with_outline_at(mut self, height: i64, polygon: Polygon) -> Self {
        self.pgns_at_height.push((height, polygon));
        self
    }

    fn outline_at(&self, height: i64) -> Option<Polygon> {
        self.pgns_at_height
            .iter()
            .find(|(h, _)| *h == height)
            .map(|(_, p)| p.convex_hull())
    }
}

/// Placement of one object in slicer units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduledObject {
    /// Caller's identifier.
    pub id: usize,
    /// Translation along X.
    pub x: i64,
    /// Translation along Y.
    pub y: i64,
}

/// Objects of one plate in print order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduledPlate {
    /// Objects, first printed first.
    pub objects: Vec<ScheduledObject>,
}

/// Plates plus the objects no plate can take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Schedule {
    /// Filled plates.
    pub plates: Vec<ScheduledPlate>,
    /// Ids of objects that do not fit an empty plate.
    pub unplaceable: Vec<usize>,
}

/// Footprints and zones in solver units.
struct PreparedObjects {
    polygons: Vec<Polygon>,
    zones: Vec<Vec<Polygon>>,
}

fn prepare_objects(
    config: &SolverConfiguration,
    printer: &PrinterGeometry,
    objects: &[ObjectToPrint],
) -> Result<PreparedObjects> {
    let scale = config.slicer_scale_factor;
    let mut polygons = Vec::with_capacity(objects.len());
    let mut zones = Vec::with_capacity(objects.len());
    for object in objects {
        let footprint = prepare_object_polygon(config, &object.polygon)?;
        let outline =
            decimate_polygon_for_sequential_solver(config.decimation_tolerance(), &object.polygon.convex_hull(), false);
        let zone_set = prepare_unreachable_zone_polygons(&outline, &printer.levels, |h| object.outline_at(h));
        zones.push(
            zone_set
                .all_polygons()
                .iter()
                .map(|z| scale_down_polygon_for_sequential_solver(z, scale).convex_hull())
                .collect(),
        );
        polygons.push(footprint);
    }
    Ok(PreparedObjects { polygons, zones })
}

/// Distributes `objects` over as many plates as needed.
///
/// Each plate is filled by the sequential arrangement; objects on a plate
/// are listed in print order. An object that cannot be placed even on an
/// empty plate is reported in [`Schedule::unplaceable`].
pub fn schedule_objects_for_sequential_print<B, R>(
    backend: &B,
    config: &SolverConfiguration,
    printer: &PrinterGeometry,
    objects: &[ObjectToPrint],
    reporter: &R,
) -> Result<Schedule>
where
    B: SolverBackend,
    R: ProgressReporter + ?Sized,
{
    let config = config.clone().setup(printer)?;
    let prepared = prepare_objects(&config, printer, objects)?;
    let scale = config.slicer_scale_factor;

    let mut schedule = Schedule::default();
    let mut pending = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        if check_extents(&config, &prepared.polygons[i]) {
            pending.push(i);
        } else {
            log::warn!("object {} is larger than the plate", object.id);
            schedule.unplaceable.push(object.id);
        }
    }

    while !pending.is_empty() {
        let plate = schedule.plates.len();
        let on_plate = |info: ProgressInfo| reporter.report(info.with_plate(plate));
        let result = optimize_subglobal_sequential_polygon_nonoverlapping(
            backend,
            &config,
            &prepared.polygons,
            &prepared.zones,
            &pending,
            &on_plate,
        )?;
        if !result.success {
            let dropped = pending.remove(0);
            log::warn!("object {} cannot be placed on an empty plate", objects[dropped].id);
            schedule.unplaceable.push(objects[dropped].id);
            continue;
        }

        let scheduled = result
            .print_order()
            .into_iter()
            .map(|i| ScheduledObject {
                id: objects[i].id,
                x: scale_up_position_for_slicer(result.values.x[i], scale),
                y: scale_up_position_for_slicer(result.values.y[i], scale),
            })
            .collect();
        log::info!(
            "plate {}: {} object(s), {} left",
            plate,
            result.decided.len(),
            result.remaining.len()
        );
        schedule.plates.push(ScheduledPlate { objects: scheduled });
        pending = result.remaining;
    }
    Ok(schedule)
}

/// Checks that a plate printed in the given order is collision free.
///
/// Positions are in slicer units; the first listed object is printed first.
pub fn check_scheduled_objects_for_sequential_printability(
    config: &SolverConfiguration,
    printer: &PrinterGeometry,
    objects: &[ObjectToPrint],
    plate: &[ScheduledObject],
) -> Result<bool> {
    let config = config.clone().setup(printer)?;
    let by_id: HashMap<usize, &ObjectToPrint> = objects.iter().map(|o| (o.id, o)).collect();
    let ordered = plate
        .iter()
        .map(|s| {
            by_id
                .get(&s.id)
                .map(|o| (*o).clone())
                .ok_or_else(|| Error::InvalidGeometry(format!("unknown object id {}", s.id)))
        })
        .collect::<Result<Vec<_>>>()?;
    let prepared = prepare_objects(&config, printer, &ordered)?;

    let scale = config.slicer_scale_factor;
    let mut values = DecisionValues::new(plate.len());
    for (rank, s) in plate.iter().enumerate() {
        values.x[rank] = Rational::new(s.x, scale).normalize();
        values.y[rank] = Rational::new(s.y, scale).normalize();
        values.t[rank] = Rational::from_integer(config.ground_presence_time + rank as i64 * config.temporal_gap());
    }
    let problem = ArrangementProblem::sequential(&prepared.polygons, &prepared.zones);
    let all: Vec<usize> = (0..plate.len()).collect();
    let violations = collect_violations(&config, &problem, &values, &all);
    for v in &violations {
        log::debug!("{:?} between {:?} and {:?}", v.kind, v.first, v.second);
    }
    Ok(violations.is_empty())
}
