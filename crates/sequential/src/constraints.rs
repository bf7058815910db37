//! Geometric constraint builders.
//!
//! Polygons are counter-clockwise and placed by a translation `(X, Y)`.
//! A point lies strictly outside a convex polygon when it is strictly right
//! of at least one edge, and inside when it is left of (or on) every edge.
//! Both conditions are linear in the translations of the point and the
//! polygon, so every builder produces linear atoms only.

use crate::variables::Decision;
use seqarrange_core::{BoundingBox, Formula, LinExpr, Point, Polygon, Rational, SolverSession};

/// Affine point `(x, y)` over decision variables.
pub type PointExpr = (LinExpr, LinExpr);

/// A polygon translated by a pair of decisions.
#[derive(Debug, Clone, Copy)]
pub struct Placed<'a> {
    /// Polygon in local coordinates.
    pub polygon: &'a Polygon,
    /// X translation.
    pub x: Decision,
    /// Y translation.
    pub y: Decision,
}

impl<'a> Placed<'a> {
    /// Places a polygon.
    pub fn new(polygon: &'a Polygon, x: Decision, y: Decision) -> Self {
        Self { polygon, x, y }
    }

    /// Places a polygon at a fixed position.
    pub fn fixed(polygon: &'a Polygon, x: Rational, y: Rational) -> Self {
        Self::new(polygon, Decision::Fixed(x), Decision::Fixed(y))
    }

    /// Local rational point moved by the translation.
    pub fn point_at(&self, px: Rational, py: Rational) -> PointExpr {
        (self.x.expr().plus_const(px), self.y.expr().plus_const(py))
    }

    /// Vertex `i` moved by the translation.
    pub fn vertex(&self, i: usize) -> PointExpr {
        let p = self.polygon.points()[i];
        self.point_at(Rational::from_integer(p.x), Rational::from_integer(p.y))
    }

    /// All placed vertices.
    pub fn vertices(&self) -> Vec<PointExpr> {
        (0..self.polygon.len()).map(|i| self.vertex(i)).collect()
    }

    /// Endpoints of edge `i`, pushed apart by `repulsion` times its length.
    fn extended_edge(&self, i: usize, repulsion: Rational) -> (PointExpr, PointExpr) {
        let line = self.polygon.edge(i);
        let d = line.direction();
        let (dx, dy) = (
            Rational::from_integer(d.x) * repulsion,
            Rational::from_integer(d.y) * repulsion,
        );
        let a = Rational::from_integer(line.a.x) + (-dx);
        let b = Rational::from_integer(line.a.y) + (-dy);
        let c = Rational::from_integer(line.b.x) + dx;
        let e = Rational::from_integer(line.b.y) + dy;
        (self.point_at(a, b), self.point_at(c, e))
    }

    /// Signed side of `q` relative to the supporting line of edge `i`,
    /// positive on the left.
    pub fn side(&self, i: usize, q: &PointExpr) -> LinExpr {
        let line = self.polygon.edge(i);
        let d = line.direction();
        let (ax, ay) = self.point_at(
            Rational::from_integer(line.a.x),
            Rational::from_integer(line.a.y),
        );
        (q.1.clone() - ay) * Rational::from_integer(d.x)
            - (q.0.clone() - ax) * Rational::from_integer(d.y)
    }
}

/// Point strictly outside a convex polygon: strictly right of some edge.
pub fn point_outside_polygon(q: &PointExpr, polygon: &Placed<'_>) -> Formula {
    Formula::any(
        (0..polygon.polygon.len()).map(|i| Formula::lt(polygon.side(i, q), LinExpr::zero())),
    )
}

/// Point inside a convex polygon (boundary included).
pub fn point_inside_polygon(q: &PointExpr, polygon: &Placed<'_>) -> Formula {
    Formula::all(
        (0..polygon.polygon.len()).map(|i| Formula::ge(polygon.side(i, q), LinExpr::zero())),
    )
}

/// Every vertex of `a` strictly outside `b`.
pub fn polygon_outside_polygon(a: &Placed<'_>, b: &Placed<'_>) -> Formula {
    Formula::all(a.vertices().iter().map(|v| point_outside_polygon(v, b)))
}

/// Vertices of each polygon strictly outside the other.
///
/// Crossings without vertex containment remain possible and are caught by
/// verification.
pub fn polygon_weak_nonoverlapping(a: &Placed<'_>, b: &Placed<'_>) -> Formula {
    Formula::all([polygon_outside_polygon(a, b), polygon_outside_polygon(b, a)])
}

/// Edge `ea` of `a` and edge `eb` of `b` do not meet.
///
/// The segments are extended at both ends by `repulsion` times their length.
/// Holds when both extended endpoints of one segment lie strictly on the same
/// side of the other segment's line. Collinear segments count as meeting.
pub fn line_non_intersection(
    a: &Placed<'_>,
    ea: usize,
    b: &Placed<'_>,
    eb: usize,
    repulsion: Rational,
) -> Formula {
    let (a1, a2) = a.extended_edge(ea, repulsion);
    let (b1, b2) = b.extended_edge(eb, repulsion);
    let zero = LinExpr::zero;
    let same_side = |line: &Placed<'_>, edge: usize, p: &PointExpr, q: &PointExpr| {
        let sp = line.side(edge, p);
        let sq = line.side(edge, q);
        Formula::any([
            Formula::all([Formula::gt(sp.clone(), zero()), Formula::gt(sq.clone(), zero())]),
            Formula::all([Formula::lt(sp, zero()), Formula::lt(sq, zero())]),
        ])
    };
    Formula::any([same_side(a, ea, &b1, &b2), same_side(b, eb, &a1, &a2)])
}

/// No edge of `a` meets an edge of `b`.
pub fn polygon_line_non_intersection(a: &Placed<'_>, b: &Placed<'_>, repulsion: Rational) -> Formula {
    let mut parts = Vec::with_capacity(a.polygon.len() * b.polygon.len());
    for ea in 0..a.polygon.len() {
        for eb in 0..b.polygon.len() {
            parts.push(line_non_intersection(a, ea, b, eb, repulsion));
        }
    }
    Formula::all(parts)
}

/// Weak non-overlap plus non-intersection of every edge pair.
pub fn polygon_strong_nonoverlapping(a: &Placed<'_>, b: &Placed<'_>, repulsion: Rational) -> Formula {
    Formula::all([
        polygon_weak_nonoverlapping(a, b),
        polygon_line_non_intersection(a, b, repulsion),
    ])
}

/// Reference point `(x, y)` inside `bounds`.
pub fn decision_box(x: Decision, y: Decision, bounds: &BoundingBox) -> Formula {
    let r = Rational::from_integer;
    Formula::all([
        Formula::ge(x.expr(), r(bounds.min.x)),
        Formula::le(x.expr(), r(bounds.max.x)),
        Formula::ge(y.expr(), r(bounds.min.y)),
        Formula::le(y.expr(), r(bounds.max.y)),
    ])
}

/// Asserts [`decision_box`].
pub fn introduce_decision_box<S: SolverSession>(
    session: &mut S,
    x: Decision,
    y: Decision,
    bounds: &BoundingBox,
) {
    session.assert(decision_box(x, y, bounds));
}

/// [`decision_box`] as a check assumption.
pub fn assume_decision_box(x: Decision, y: Decision, bounds: &BoundingBox) -> Formula {
    decision_box(x, y, bounds)
}

/// Placed polygon extents inside `bounds`.
pub fn bed_bounding_box(polygon: &Placed<'_>, bounds: &BoundingBox) -> Formula {
    let bb = polygon.polygon.bounding_box();
    let r = Rational::from_integer;
    Formula::all([
        Formula::ge(polygon.x.expr().plus_const(r(bb.min.x)), r(bounds.min.x)),
        Formula::le(polygon.x.expr().plus_const(r(bb.max.x)), r(bounds.max.x)),
        Formula::ge(polygon.y.expr().plus_const(r(bb.min.y)), r(bounds.min.y)),
        Formula::le(polygon.y.expr().plus_const(r(bb.max.y)), r(bounds.max.y)),
    ])
}

/// Asserts [`bed_bounding_box`].
pub fn introduce_bed_bounding_box<S: SolverSession>(
    session: &mut S,
    polygon: &Placed<'_>,
    bounds: &BoundingBox,
) {
    session.assert(bed_bounding_box(polygon, bounds));
}

/// Asserts [`bed_bounding_box`] for the box `[0, width] × [0, height]`.
pub fn introduce_bed_bounding_box_size<S: SolverSession>(
    session: &mut S,
    polygon: &Placed<'_>,
    width: i64,
    height: i64,
) {
    let bounds = BoundingBox::new(Point::new(0, 0), Point::new(width, height));
    session.assert(bed_bounding_box(polygon, &bounds));
}

/// [`bed_bounding_box`] as a check assumption.
pub fn assume_bed_bounding_box(polygon: &Placed<'_>, bounds: &BoundingBox) -> Formula {
    bed_bounding_box(polygon, bounds)
}

/// Every vertex of the placed polygon inside a convex bed outline.
pub fn bed_polygon(polygon: &Placed<'_>, bed: &Polygon) -> Formula {
    let outline = Placed::fixed(bed, Rational::ZERO, Rational::ZERO);
    Formula::all(polygon.vertices().iter().map(|v| point_inside_polygon(v, &outline)))
}

/// Asserts [`bed_polygon`].
pub fn introduce_bed_polygon<S: SolverSession>(session: &mut S, polygon: &Placed<'_>, bed: &Polygon) {
    session.assert(bed_polygon(polygon, bed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSession;
    use crate::variables::{Axis, DecisionVariables, ObjectRanges, Range};
    use seqarrange_core::VarId;

    fn at(polygon: &Polygon, x: i64, y: i64) -> Placed<'_> {
        Placed::fixed(polygon, Rational::from_integer(x), Rational::from_integer(y))
    }

    fn truth(f: &Formula) -> Option<bool> {
        match f {
            Formula::Const(b) => Some(*b),
            _ => None,
        }
    }

    #[test]
    fn test_point_outside_and_inside() {
        let square = Polygon::rectangle(10, 10);
        let placed = at(&square, 5, 5);
        let c = Rational::from_integer;
        let inner = (LinExpr::constant(c(8)), LinExpr::constant(c(8)));
        let outer = (LinExpr::constant(c(2)), LinExpr::constant(c(8)));
        let corner = (LinExpr::constant(c(5)), LinExpr::constant(c(5)));

        assert_eq!(truth(&point_outside_polygon(&inner, &placed)), Some(false));
        assert_eq!(truth(&point_outside_polygon(&outer, &placed)), Some(true));
        assert_eq!(truth(&point_inside_polygon(&inner, &placed)), Some(true));
        // Boundary points are neither strictly outside nor excluded from inside.
        assert_eq!(truth(&point_outside_polygon(&corner, &placed)), Some(false));
        assert_eq!(truth(&point_inside_polygon(&corner, &placed)), Some(true));
    }

    #[test]
    fn test_weak_nonoverlap_fixed() {
        let square = Polygon::rectangle(4, 4);
        let a = at(&square, 0, 0);
        let far = at(&square, 10, 0);
        let near = at(&square, 2, 2);
        assert_eq!(truth(&polygon_weak_nonoverlapping(&a, &far)), Some(true));
        assert_eq!(truth(&polygon_weak_nonoverlapping(&a, &near)), Some(false));
    }

    #[test]
    fn test_weak_misses_cross_strong_catches_it() {
        let wide = Polygon::rectangle(10, 2);
        let tall = Polygon::rectangle(2, 10);
        let a = at(&wide, 0, 4);
        let b = at(&tall, 4, 0);
        let repulsion = Rational::new(1, 100);
        assert_eq!(truth(&polygon_weak_nonoverlapping(&a, &b)), Some(true));
        assert_eq!(truth(&polygon_strong_nonoverlapping(&a, &b, repulsion)), Some(false));
    }

    #[test]
    fn test_line_non_intersection_fixed() {
        let square = Polygon::rectangle(4, 4);
        let a = at(&square, 0, 0);
        let b = at(&square, 20, 20);
        let repulsion = Rational::new(1, 100);
        assert_eq!(truth(&polygon_line_non_intersection(&a, &b, repulsion)), Some(true));

        // Edge 1 of `a` is x = 4; edge 3 of `c` lies on the same line.
        let c = at(&square, 4, 0);
        assert_eq!(truth(&line_non_intersection(&a, 1, &c, 3, repulsion)), Some(false));
    }

    #[test]
    fn test_free_weak_nonoverlap_evaluates() {
        let square = Polygon::rectangle(4, 4);
        let mut session = RecordingSession::default();
        let mut vars = DecisionVariables::new();
        let ranges = ObjectRanges {
            x: Range::integers(0, 100),
            y: Range::integers(0, 100),
            t: None,
        };
        vars.declare_object(&mut session, 0, ranges).unwrap();
        vars.declare_object(&mut session, 1, ranges).unwrap();
        let (x0, y0) = vars.position(0);
        let (x1, y1) = vars.position(1);
        let formula = polygon_weak_nonoverlapping(
            &Placed::new(&square, x0, y0),
            &Placed::new(&square, x1, y1),
        );
        session.assert(formula);

        let ids = [
            vars.variable(0, Axis::X).unwrap(),
            vars.variable(0, Axis::Y).unwrap(),
            vars.variable(1, Axis::X).unwrap(),
            vars.variable(1, Axis::Y).unwrap(),
        ];
        let separated = [0.0, 0.0, 5.0, 0.0];
        let overlapping = [0.0, 0.0, 1.0, 1.0];
        for (values, expected) in [(separated, true), (overlapping, false)] {
            let lookup = |v: VarId| ids.iter().position(|id| *id == v).map(|k| values[k]);
            assert_eq!(session.assertions()[0].evaluate(&lookup), Some(expected));
        }
    }

    #[test]
    fn test_bed_bounding_box() {
        let square = Polygon::rectangle(4, 4);
        let bed = BoundingBox::new(Point::new(0, 0), Point::new(10, 10));
        assert_eq!(truth(&bed_bounding_box(&at(&square, 6, 6), &bed)), Some(true));
        assert_eq!(truth(&bed_bounding_box(&at(&square, 7, 0), &bed)), Some(false));
    }

    #[test]
    fn test_decision_box() {
        let bounds = BoundingBox::new(Point::new(-1, -1), Point::new(1, 1));
        let inside = assume_decision_box(
            Decision::Fixed(Rational::ZERO),
            Decision::Fixed(Rational::ONE),
            &bounds,
        );
        assert_eq!(truth(&inside), Some(true));
        let outside = decision_box(
            Decision::Fixed(Rational::from_integer(2)),
            Decision::Fixed(Rational::ZERO),
            &bounds,
        );
        assert_eq!(truth(&outside), Some(false));
    }

    #[test]
    fn test_bed_polygon() {
        let triangle = Polygon::from_coords(&[(0, 0), (20, 0), (0, 20)]);
        let square = Polygon::rectangle(2, 2);
        assert_eq!(truth(&bed_polygon(&at(&square, 1, 1), &triangle)), Some(true));
        assert_eq!(truth(&bed_polygon(&at(&square, 15, 15), &triangle)), Some(false));
    }
}
