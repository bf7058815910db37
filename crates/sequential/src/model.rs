//! Batch formulas.
//!
//! A batch session declares the objects being decided and sees the objects
//! decided earlier as constants. It asserts:
//!
//! - bed containment of every free object,
//! - weak non-overlap of footprints,
//! - for ordered arrangements, temporal separation and weak non-overlap of
//!   each earlier footprint with the later object's zones.
//!
//! Edge crossings are left to verification and refinement.

use crate::constraints::{
    assume_bed_bounding_box, bed_bounding_box, bed_polygon, polygon_weak_nonoverlapping, Placed,
};
use crate::temporal::{
    introduce_consequential_temporal_ordering, introduce_consequential_temporal_ordering_against_fixed,
    introduce_sequential_temporal_ordering_against_fixed, introduce_temporal_ordering, ordered_guard,
    presence_guard, GuardPolicy, Sequencing,
};
use crate::variables::{DecisionVariables, ObjectRanges, Range};
use seqarrange_core::{
    BoundingBox, DecisionValues, Formula, LineEncoding, Point, Polygon, Result, SolverConfiguration,
    SolverSession,
};

/// Objects and zones of one arrangement round.
#[derive(Debug, Clone, Copy)]
pub struct ArrangementProblem<'a> {
    /// Footprints in solver units, counter-clockwise and convex.
    pub polygons: &'a [Polygon],
    /// Unreachable zones per object; empty for unordered arrangements.
    pub zones: &'a [Vec<Polygon>],
    /// Kind of arrangement.
    pub sequencing: Sequencing,
}

impl<'a> ArrangementProblem<'a> {
    /// Placement without print order.
    pub fn plain(polygons: &'a [Polygon]) -> Self {
        Self {
            polygons,
            zones: &[],
            sequencing: Sequencing::Unordered,
        }
    }

    /// Sequential printing with zones.
    pub fn sequential(polygons: &'a [Polygon], zones: &'a [Vec<Polygon>]) -> Self {
        Self {
            polygons,
            zones,
            sequencing: Sequencing::Sequential,
        }
    }

    /// Consequential printing with zones.
    pub fn consequential(polygons: &'a [Polygon], zones: &'a [Vec<Polygon>]) -> Self {
        Self {
            polygons,
            zones,
            sequencing: Sequencing::Consequential,
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Returns true if there are no objects.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Zones of an object.
    pub fn zones_of(&self, object: usize) -> &'a [Polygon] {
        self.zones.get(object).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest print time a free object may take.
    pub fn time_horizon(&self, config: &SolverConfiguration) -> i64 {
        config.ground_presence_time + (self.len() as i64 + 1) * config.temporal_gap()
    }
}

/// Objects of one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchSpec<'a> {
    /// Objects decided earlier; their values are read from `values`.
    pub fixed: &'a [usize],
    /// Objects decided by this batch.
    pub free: &'a [usize],
    /// Values of the fixed objects.
    pub values: &'a DecisionValues,
}

/// Ranges of a free object.
///
/// Translations are bounded loosely by the plate so that any placement
/// keeping the object on the plate stays admissible; containment itself is
/// asserted separately.
pub fn object_ranges(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    object: usize,
) -> ObjectRanges {
    let plate = config.plate_bounding_box();
    let bb = problem.polygons[object].bounding_box();
    let t = match problem.sequencing {
        Sequencing::Unordered => None,
        Sequencing::Sequential => Some(Range::integers(0, problem.time_horizon(config))),
        Sequencing::Consequential => Some(Range::integers(
            config.temporal_absence_threshold - config.temporal_spread,
            problem.time_horizon(config),
        )),
    };
    ObjectRanges {
        x: Range::integers(plate.min.x - bb.max.x, plate.max.x - bb.min.x),
        y: Range::integers(plate.min.y - bb.max.y, plate.max.y - bb.min.y),
        t,
    }
}

/// Bed containment of a placed polygon.
pub fn bed_containment(config: &SolverConfiguration, placed: &Placed<'_>) -> Formula {
    match &config.plate_bounding_polygon {
        Some(bed) => bed_polygon(placed, bed),
        None => bed_bounding_box(placed, &config.plate_bounding_box()),
    }
}

/// Asserts the batch formula and returns the decision registry.
pub fn build_weak_polygon_nonoverlapping<S: SolverSession>(
    session: &mut S,
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    batch: &BatchSpec<'_>,
    encoding: LineEncoding,
) -> Result<DecisionVariables> {
    let has_time = problem.sequencing.has_time();
    let mut vars = DecisionVariables::new();
    for &i in batch.fixed {
        vars.fix_object(
            i,
            batch.values.x[i],
            batch.values.y[i],
            has_time.then(|| batch.values.t[i]),
        );
    }
    for &i in batch.free {
        vars.declare_object(session, i, object_ranges(config, problem, i))?;
        let (x, y) = vars.position(i);
        session.assert(bed_containment(config, &Placed::new(&problem.polygons[i], x, y)));
    }

    let policy = GuardPolicy::new(problem.sequencing, encoding, config);
    for (k, &i) in batch.free.iter().enumerate() {
        for &j in &batch.free[k + 1..] {
            introduce_pair(session, &mut vars, problem, &policy, i, j)?;
        }
        for &j in batch.fixed {
            introduce_pair(session, &mut vars, problem, &policy, i, j)?;
        }
    }

    match problem.sequencing {
        Sequencing::Unordered => {}
        Sequencing::Sequential => {
            introduce_temporal_ordering(session, &vars, batch.free, config.temporal_spread);
            introduce_sequential_temporal_ordering_against_fixed(
                session,
                &vars,
                batch.free,
                batch.fixed,
                config.temporal_spread,
            );
        }
        Sequencing::Consequential => {
            introduce_consequential_temporal_ordering(session, &vars, batch.free, config);
            introduce_consequential_temporal_ordering_against_fixed(
                session,
                &vars,
                batch.free,
                batch.fixed,
                config,
            );
        }
    }

    log::debug!(
        "batch formula: {} free, {} fixed, {} assertions, {:?}",
        batch.free.len(),
        batch.fixed.len(),
        session.assertion_count(),
        encoding
    );
    Ok(vars)
}

/// Footprint non-overlap and zone clearance of one pair.
fn introduce_pair<S: SolverSession>(
    session: &mut S,
    vars: &mut DecisionVariables,
    problem: &ArrangementProblem<'_>,
    policy: &GuardPolicy,
    i: usize,
    j: usize,
) -> Result<()> {
    let (xi, yi) = vars.position(i);
    let (xj, yj) = vars.position(j);
    let fi = Placed::new(&problem.polygons[i], xi, yi);
    let fj = Placed::new(&problem.polygons[j], xj, yj);

    let overlap = presence_guard(vars, policy, i, j);
    session.assert(overlap.guard(polygon_weak_nonoverlapping(&fi, &fj), policy.encoding));

    if !problem.sequencing.has_time() {
        return Ok(());
    }
    for (earlier, later, footprint, lx, ly) in [(i, j, &fi, xj, yj), (j, i, &fj, xi, yi)] {
        let zones = problem.zones_of(later);
        if zones.is_empty() {
            continue;
        }
        let guard = ordered_guard(session, vars, policy, earlier, later)?;
        let clearance = Formula::all(
            zones
                .iter()
                .map(|zone| polygon_weak_nonoverlapping(footprint, &Placed::new(zone, lx, ly))),
        );
        session.assert(guard.guard(clearance, policy.encoding));
    }
    Ok(())
}

/// Centred box of half-extent `half` in x; the y half-extent follows the
/// plate aspect ratio.
pub fn centered_box(config: &SolverConfiguration, half: i64) -> BoundingBox {
    let plate = config.plate_bounding_box();
    let center = plate.center();
    let (w, h) = (plate.width().max(1), plate.height());
    let half_y = (half as i128 * h as i128 + w as i128 - 1) / w as i128;
    let half_y = half_y as i64;
    BoundingBox::new(
        Point::new(center.x - half, center.y - half_y),
        Point::new(center.x + half, center.y + half_y),
    )
}

/// Half-extent of the centred box that covers the whole plate.
pub fn full_half_extent(config: &SolverConfiguration) -> i64 {
    let plate = config.plate_bounding_box();
    (plate.width() + 1) / 2
}

/// Assumption keeping the free objects of a batch inside `bounds`.
pub fn assume_batch_box(
    vars: &DecisionVariables,
    problem: &ArrangementProblem<'_>,
    free: &[usize],
    bounds: &BoundingBox,
) -> Formula {
    Formula::all(free.iter().map(|&i| {
        let (x, y) = vars.position(i);
        assume_bed_bounding_box(&Placed::new(&problem.polygons[i], x, y), bounds)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;
    use seqarrange_core::Rational;

    fn config() -> SolverConfiguration {
        SolverConfiguration::default().with_plate_size(100, 100)
    }

    #[test]
    fn test_object_ranges() {
        let polygons = vec![Polygon::rectangle(10, 20)];
        let problem = ArrangementProblem::plain(&polygons);
        let ranges = object_ranges(&config(), &problem, 0);
        assert_eq!(ranges.x, Range::integers(-10, 100));
        assert_eq!(ranges.y, Range::integers(-20, 100));
        assert!(ranges.t.is_none());

        let zones = vec![vec![]];
        let problem = ArrangementProblem::consequential(&polygons, &zones);
        let ranges = object_ranges(&config(), &problem, 0);
        assert_eq!(ranges.t.map(|r| r.lower), Some(Rational::from_integer(-32)));
    }

    #[test]
    fn test_centered_box() {
        let config = SolverConfiguration::default().with_plate_size(200, 100);
        let bounds = centered_box(&config, 50);
        assert_eq!(bounds.min, Point::new(50, 25));
        assert_eq!(bounds.max, Point::new(150, 75));
        assert_eq!(full_half_extent(&config), 100);
        let full = centered_box(&config, full_half_extent(&config));
        assert_eq!(full.min, Point::new(0, 0));
        assert_eq!(full.max, Point::new(200, 100));
    }

    #[test]
    fn test_build_plain_batch() {
        let polygons = vec![Polygon::rectangle(10, 10), Polygon::rectangle(10, 10)];
        let problem = ArrangementProblem::plain(&polygons);
        let values = DecisionValues::new(2);
        let mut session = RecordingSession::default();
        let vars = build_weak_polygon_nonoverlapping(
            &mut session,
            &config(),
            &problem,
            &BatchSpec {
                fixed: &[],
                free: &[0, 1],
                values: &values,
            },
            LineEncoding::Implicit,
        )
        .unwrap();
        assert!(vars.is_free(0) && vars.is_free(1));
        // Two bed constraints and one overlap constraint.
        assert_eq!(session.assertion_count(), 3);

        for (name, value) in [("X_0", 0.0), ("Y_0", 0.0), ("X_1", 20.0), ("Y_1", 0.0)] {
            session.set_value(name, value);
        }
        assert!(session.model_satisfies(&[]));
        session.set_value("X_1", 5.0);
        session.set_value("Y_1", 5.0);
        assert!(!session.model_satisfies(&[]));
    }

    #[test]
    fn test_build_sequential_against_fixed() {
        let polygons = vec![Polygon::rectangle(10, 10), Polygon::rectangle(10, 10)];
        let zones = vec![
            vec![Polygon::from_coords(&[(-30, -5), (10, -5), (10, 15), (-30, 15)])],
            vec![Polygon::from_coords(&[(-30, -5), (10, -5), (10, 15), (-30, 15)])],
        ];
        let problem = ArrangementProblem::sequential(&polygons, &zones);
        let mut values = DecisionValues::new(2);
        values.x[0] = Rational::from_integer(0);
        values.y[0] = Rational::from_integer(0);
        values.t[0] = Rational::from_integer(32);

        let mut session = RecordingSession::default();
        build_weak_polygon_nonoverlapping(
            &mut session,
            &config(),
            &problem,
            &BatchSpec {
                fixed: &[0],
                free: &[1],
                values: &values,
            },
            LineEncoding::Implicit,
        )
        .unwrap();

        // Same row, later than the fixed object: inside its zone.
        for (name, value) in [("X_1", 20.0), ("Y_1", 0.0), ("T_1", 64.0)] {
            session.set_value(name, value);
        }
        assert!(!session.model_satisfies(&[]));
        // Same row, printed before: allowed.
        session.set_value("T_1", 0.0);
        assert!(session.model_satisfies(&[]));
        // Separate row, printed later: allowed.
        session.set_value("Y_1", 50.0);
        session.set_value("T_1", 64.0);
        assert!(session.model_satisfies(&[]));
    }
}
