//! Exact verification of decoded placements.
//!
//! Batch formulas only keep vertices out of other polygons, so a model can
//! still have edges crossing. Every model is therefore checked on the integer
//! lattice of the rational grid before it is accepted, and the checks report
//! which edge pairs need refinement.

use crate::model::ArrangementProblem;
use crate::temporal::Sequencing;
use seqarrange_core::robust::{
    locate_point_in_polygon, point_in_convex_polygon, segments_intersect_closed_exact, LatticePoint,
};
use seqarrange_core::{DecisionValues, PointLocation, Polygon, Rational, SolverConfiguration};

/// A footprint or one unreachable zone of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeRef {
    /// Footprint of an object.
    Footprint(usize),
    /// Zone `index` of an object.
    Zone {
        /// Owning object.
        object: usize,
        /// Index into the object's zones.
        index: usize,
    },
}

impl ShapeRef {
    /// Owning object.
    pub fn object(&self) -> usize {
        match *self {
            ShapeRef::Footprint(i) => i,
            ShapeRef::Zone { object, .. } => object,
        }
    }

    /// Polygon of the shape.
    pub fn polygon<'a>(&self, problem: &ArrangementProblem<'a>) -> &'a Polygon {
        let polygons: &'a [Polygon] = problem.polygons;
        match *self {
            ShapeRef::Footprint(i) => &polygons[i],
            ShapeRef::Zone { object, index } => &problem.zones_of(object)[index],
        }
    }
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// Two footprints overlap.
    Overlap,
    /// A footprint reaches into the zone of an object printed later.
    Clearance,
    /// A footprint leaves the plate.
    Bed,
}

/// One failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Kind of failure.
    pub kind: ViolationKind,
    /// Footprint involved (the earlier one for clearance).
    pub first: ShapeRef,
    /// Other shape (same as `first` for bed violations).
    pub second: ShapeRef,
    /// A vertex of one shape lies in the other.
    pub vertex_contained: bool,
    /// Meeting edge pairs `(edge of first, edge of second)`.
    pub crossings: Vec<(usize, usize)>,
}

#[derive(Debug, Default)]
struct PairReport {
    vertex_contained: bool,
    crossings: Vec<(usize, usize)>,
}

impl PairReport {
    fn is_clear(&self) -> bool {
        !self.vertex_contained && self.crossings.is_empty()
    }
}

fn lattice_of(polygon: &Polygon, values: &DecisionValues, object: usize) -> Vec<LatticePoint> {
    polygon.placed_lattice(values.x[object], values.y[object])
}

fn vertex_contained(a: &[LatticePoint], b: &[LatticePoint]) -> bool {
    a.iter()
        .any(|&p| !matches!(locate_point_in_polygon(p, b), PointLocation::Outside))
}

fn crossings(a: &[LatticePoint], b: &[LatticePoint]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    let mut pairs = Vec::new();
    for i in 0..n {
        for j in 0..m {
            if segments_intersect_closed_exact(a[i], a[(i + 1) % n], b[j], b[(j + 1) % m]) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

fn examine(a: &[LatticePoint], b: &[LatticePoint]) -> PairReport {
    PairReport {
        vertex_contained: vertex_contained(a, b) || vertex_contained(b, a),
        crossings: crossings(a, b),
    }
}

/// Pairs of shapes that must not meet under the decoded print order.
fn constrained_pairs(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    values: &DecisionValues,
    objects: &[usize],
) -> Vec<(ViolationKind, ShapeRef, ShapeRef)> {
    let present = |i: usize| match problem.sequencing {
        Sequencing::Consequential => {
            values.t[i] >= Rational::from_integer(config.temporal_presence_threshold)
        }
        _ => true,
    };
    let mut pairs = Vec::new();
    for (k, &i) in objects.iter().enumerate() {
        if !present(i) {
            continue;
        }
        for &j in &objects[k + 1..] {
            if !present(j) {
                continue;
            }
            pairs.push((ViolationKind::Overlap, ShapeRef::Footprint(i), ShapeRef::Footprint(j)));
            if !problem.sequencing.has_time() {
                continue;
            }
            let (ti, tj) = (values.t[i], values.t[j]);
            let mut orders = Vec::with_capacity(2);
            if ti <= tj {
                orders.push((i, j));
            }
            if tj <= ti {
                orders.push((j, i));
            }
            for (earlier, later) in orders {
                for index in 0..problem.zones_of(later).len() {
                    pairs.push((
                        ViolationKind::Clearance,
                        ShapeRef::Footprint(earlier),
                        ShapeRef::Zone {
                            object: later,
                            index,
                        },
                    ));
                }
            }
        }
    }
    pairs
}

/// Exact check of a decoded placement of `objects`.
pub fn collect_violations(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    values: &DecisionValues,
    objects: &[usize],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for &i in objects {
        if !check_bed_containment(config, problem, values, &[i]) {
            violations.push(Violation {
                kind: ViolationKind::Bed,
                first: ShapeRef::Footprint(i),
                second: ShapeRef::Footprint(i),
                vertex_contained: false,
                crossings: Vec::new(),
            });
        }
    }
    for (kind, first, second) in constrained_pairs(config, problem, values, objects) {
        let a = lattice_of(first.polygon(problem), values, first.object());
        let b = lattice_of(second.polygon(problem), values, second.object());
        let report = examine(&a, &b);
        if !report.is_clear() {
            violations.push(Violation {
                kind,
                first,
                second,
                vertex_contained: report.vertex_contained,
                crossings: report.crossings,
            });
        }
    }
    if !violations.is_empty() {
        log::debug!("verification found {} violation(s)", violations.len());
    }
    violations
}

/// No vertex of a constrained pair lies inside (or on) the other shape.
pub fn check_points_outside_polygons(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    values: &DecisionValues,
    objects: &[usize],
) -> bool {
    constrained_pairs(config, problem, values, objects)
        .into_iter()
        .all(|(_, first, second)| {
            let a = lattice_of(first.polygon(problem), values, first.object());
            let b = lattice_of(second.polygon(problem), values, second.object());
            !vertex_contained(&a, &b) && !vertex_contained(&b, &a)
        })
}

/// No edges of a constrained pair meet.
pub fn check_polygon_line_intersections(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    values: &DecisionValues,
    objects: &[usize],
) -> bool {
    constrained_pairs(config, problem, values, objects)
        .into_iter()
        .all(|(_, first, second)| {
            let a = lattice_of(first.polygon(problem), values, first.object());
            let b = lattice_of(second.polygon(problem), values, second.object());
            crossings(&a, &b).is_empty()
        })
}

/// Every footprint of `objects` lies on the plate.
pub fn check_bed_containment(
    config: &SolverConfiguration,
    problem: &ArrangementProblem<'_>,
    values: &DecisionValues,
    objects: &[usize],
) -> bool {
    let bed: Vec<LatticePoint> = match &config.plate_bounding_polygon {
        Some(polygon) => polygon.placed_lattice(Rational::ZERO, Rational::ZERO),
        None => config
            .plate_bounding_box()
            .to_polygon()
            .placed_lattice(Rational::ZERO, Rational::ZERO),
    };
    objects.iter().all(|&i| {
        lattice_of(&problem.polygons[i], values, i)
            .into_iter()
            .all(|p| point_in_convex_polygon(p, &bed))
    })
}

/// The object fits the plate on its own.
pub fn check_extents(config: &SolverConfiguration, polygon: &Polygon) -> bool {
    let plate = config.plate_bounding_box();
    let bb = polygon.bounding_box();
    bb.width() <= plate.width() && bb.height() <= plate.height()
}

/// The footprints of `objects` together are not larger than the plate.
pub fn check_area(config: &SolverConfiguration, polygons: &[Polygon], objects: &[usize]) -> bool {
    let total: f64 = objects.iter().map(|&i| polygons[i].area()).sum();
    total <= config.plate_area()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values_at(positions: &[(i64, i64, i64)]) -> DecisionValues {
        let mut values = DecisionValues::new(positions.len());
        for (i, &(x, y, t)) in positions.iter().enumerate() {
            values.x[i] = Rational::from_integer(x);
            values.y[i] = Rational::from_integer(y);
            values.t[i] = Rational::from_integer(t);
        }
        values
    }

    fn config() -> SolverConfiguration {
        SolverConfiguration::default().with_plate_size(100, 100)
    }

    #[test]
    fn test_clean_placement() {
        let polygons = vec![Polygon::rectangle(10, 10); 2];
        let problem = ArrangementProblem::plain(&polygons);
        let values = values_at(&[(0, 0, 0), (20, 0, 0)]);
        assert!(collect_violations(&config(), &problem, &values, &[0, 1]).is_empty());
        assert!(check_points_outside_polygons(&config(), &problem, &values, &[0, 1]));
        assert!(check_polygon_line_intersections(&config(), &problem, &values, &[0, 1]));
    }

    #[test]
    fn test_cross_has_crossings_without_vertices() {
        let polygons = vec![Polygon::rectangle(10, 2), Polygon::rectangle(2, 10)];
        let problem = ArrangementProblem::plain(&polygons);
        let values = values_at(&[(0, 4, 0), (4, 0, 0)]);
        let violations = collect_violations(&config(), &problem, &values, &[0, 1]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Overlap);
        assert!(!violations[0].vertex_contained);
        assert_eq!(violations[0].crossings.len(), 4);
        assert!(check_points_outside_polygons(&config(), &problem, &values, &[0, 1]));
        assert!(!check_polygon_line_intersections(&config(), &problem, &values, &[0, 1]));
    }

    #[test]
    fn test_identical_positions_detected() {
        let polygons = vec![Polygon::rectangle(10, 10); 2];
        let problem = ArrangementProblem::plain(&polygons);
        let values = values_at(&[(5, 5, 0), (5, 5, 0)]);
        assert!(!check_points_outside_polygons(&config(), &problem, &values, &[0, 1]));
    }

    #[test]
    fn test_clearance_respects_order() {
        let polygons = vec![Polygon::rectangle(10, 10); 2];
        let zone = Polygon::from_coords(&[(-30, -5), (10, -5), (10, 15), (-30, 15)]);
        let zones = vec![vec![zone.clone()], vec![zone]];
        let problem = ArrangementProblem::sequential(&polygons, &zones);

        // Object 1 sits right of object 0; its zone reaches back over 0.
        let later = values_at(&[(0, 0, 32), (20, 0, 96)]);
        let violations = collect_violations(&config(), &problem, &later, &[0, 1]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::Clearance);
        assert_eq!(violations[0].first, ShapeRef::Footprint(0));

        let earlier = values_at(&[(0, 0, 96), (20, 0, 32)]);
        assert!(collect_violations(&config(), &problem, &earlier, &[0, 1]).is_empty());
    }

    #[test]
    fn test_consequential_missing_objects_ignored() {
        let polygons = vec![Polygon::rectangle(10, 10); 2];
        let zones = vec![vec![], vec![]];
        let problem = ArrangementProblem::consequential(&polygons, &zones);
        let values = values_at(&[(0, 0, 32), (0, 0, -16)]);
        assert!(collect_violations(&config(), &problem, &values, &[0, 1]).is_empty());
    }

    #[test]
    fn test_bed_containment() {
        let polygons = vec![Polygon::rectangle(10, 10)];
        let problem = ArrangementProblem::plain(&polygons);
        assert!(check_bed_containment(&config(), &problem, &values_at(&[(90, 90, 0)]), &[0]));
        let outside = values_at(&[(95, 0, 0)]);
        assert!(!check_bed_containment(&config(), &problem, &outside, &[0]));
        let violations = collect_violations(&config(), &problem, &outside, &[0]);
        assert_eq!(violations[0].kind, ViolationKind::Bed);
    }

    #[test]
    fn test_extents_and_area() {
        let config = config();
        assert!(check_extents(&config, &Polygon::rectangle(100, 40)));
        assert!(!check_extents(&config, &Polygon::rectangle(101, 40)));
        let polygons = vec![Polygon::rectangle(60, 60); 3];
        assert!(check_area(&config, &polygons, &[0, 1]));
        assert!(!check_area(&config, &polygons, &[0, 1, 2]));
    }
}
