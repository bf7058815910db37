//! Robust geometric predicates.
//!
//! Floating orientation uses Shewchuk's adaptive test (`robust` crate).
//! Everything else is decided exactly on the integer lattice used for
//! verification, where every coordinate is an `i128` multiple of the rational
//! grid step. The floating segment tests snap their input onto that lattice
//! first.
//!
//! Segment tests come in three flavours:
//!
//! | Predicate | Lattice form | Touching endpoints | Collinear overlap |
//! |-----------|--------------|--------------------|-------------------|
//! | [`lines_intersect`] | [`segments_intersect_exact`] | no | no |
//! | [`lines_intersect_closed`] | [`segments_intersect_closed_exact`] | yes | yes |
//! | [`lines_intersect_open`] | [`segments_intersect_open_exact`] | no | no |
//!
//! The floating forms take a start point plus a direction vector, so the first
//! segment runs from `(ax, ay)` to `(ax + ux, ay + uy)`.
//!
//! ## Example
//!
//! ```rust
//! use seqarrange_core::robust::{lines_intersect_closed, lines_intersect_open};
//!
//! // Two segments meeting at (1, 0).
//! assert!(lines_intersect_closed(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0));
//! assert!(!lines_intersect_open(0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0));
//! ```

use crate::rational::Rational;
use robust::{orient2d as robust_orient2d, Coord};

/// Point on the exact verification lattice.
pub type LatticePoint = (i128, i128);

/// Result of an orientation test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Points are arranged counter-clockwise (left turn).
    CounterClockwise,
    /// Points are arranged clockwise (right turn).
    Clockwise,
    /// Points are collinear.
    Collinear,
}

impl Orientation {
    /// Returns true if the orientation is counter-clockwise.
    #[inline]
    pub fn is_ccw(self) -> bool {
        matches!(self, Orientation::CounterClockwise)
    }

    /// Returns true if the orientation is clockwise.
    #[inline]
    pub fn is_cw(self) -> bool {
        matches!(self, Orientation::Clockwise)
    }

    /// Returns true if the points are collinear.
    #[inline]
    pub fn is_collinear(self) -> bool {
        matches!(self, Orientation::Collinear)
    }

    fn from_sign<T: PartialOrd + Default>(value: T) -> Self {
        let zero = T::default();
        if value > zero {
            Orientation::CounterClockwise
        } else if value < zero {
            Orientation::Clockwise
        } else {
            Orientation::Collinear
        }
    }
}

/// Location of a point relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLocation {
    /// Strictly inside.
    Inside,
    /// On an edge or vertex.
    Boundary,
    /// Strictly outside.
    Outside,
}

// ============================================================================
// Orientation
// ============================================================================

/// Orientation of `pc` relative to the directed line `pa -> pb`, using
/// adaptive precision arithmetic.
///
/// ```rust
/// use seqarrange_core::robust::{orient2d, Orientation};
///
/// assert_eq!(orient2d((0.0, 0.0), (1.0, 0.0), (0.5, 1.0)), Orientation::CounterClockwise);
/// ```
#[inline]
pub fn orient2d(pa: (f64, f64), pb: (f64, f64), pc: (f64, f64)) -> Orientation {
    Orientation::from_sign(robust_orient2d(
        Coord { x: pa.0, y: pa.1 },
        Coord { x: pb.0, y: pb.1 },
        Coord { x: pc.0, y: pc.1 },
    ))
}

/// Twice the signed area of the lattice triangle `a, b, c`.
#[inline]
pub fn cross_exact(a: LatticePoint, b: LatticePoint, c: LatticePoint) -> i128 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

/// Exact orientation on the lattice.
#[inline]
pub fn orient2d_exact(a: LatticePoint, b: LatticePoint, c: LatticePoint) -> Orientation {
    Orientation::from_sign(cross_exact(a, b, c))
}

// ============================================================================
// Segment Predicates
// ============================================================================

/// Snaps a floating coordinate onto the verification lattice.
#[inline]
pub fn snap_to_lattice(value: f64) -> i128 {
    Rational::from_f64(value).grid_value()
}

#[allow(clippy::too_many_arguments)]
fn snap_segments(
    ax: f64,
    ay: f64,
    ux: f64,
    uy: f64,
    bx: f64,
    by: f64,
    vx: f64,
    vy: f64,
) -> [LatticePoint; 4] {
    [
        (snap_to_lattice(ax), snap_to_lattice(ay)),
        (snap_to_lattice(ax + ux), snap_to_lattice(ay + uy)),
        (snap_to_lattice(bx), snap_to_lattice(by)),
        (snap_to_lattice(bx + vx), snap_to_lattice(by + vy)),
    ]
}

/// Parametric intersection test on snapped coordinates.
///
/// See [`segments_intersect_exact`].
#[allow(clippy::too_many_arguments)]
pub fn lines_intersect(
    ax: f64,
    ay: f64,
    ux: f64,
    uy: f64,
    bx: f64,
    by: f64,
    vx: f64,
    vy: f64,
) -> bool {
    let [p1, p2, q1, q2] = snap_segments(ax, ay, ux, uy, bx, by, vx, vy);
    segments_intersect_exact(p1, p2, q1, q2)
}

/// Closed intersection test on snapped coordinates: touching and collinear
/// overlap count.
#[allow(clippy::too_many_arguments)]
pub fn lines_intersect_closed(
    ax: f64,
    ay: f64,
    ux: f64,
    uy: f64,
    bx: f64,
    by: f64,
    vx: f64,
    vy: f64,
) -> bool {
    let [p1, p2, q1, q2] = snap_segments(ax, ay, ux, uy, bx, by, vx, vy);
    segments_intersect_closed_exact(p1, p2, q1, q2)
}

/// Open intersection test on snapped coordinates: only proper crossings of
/// the interiors count.
#[allow(clippy::too_many_arguments)]
pub fn lines_intersect_open(
    ax: f64,
    ay: f64,
    ux: f64,
    uy: f64,
    bx: f64,
    by: f64,
    vx: f64,
    vy: f64,
) -> bool {
    let [p1, p2, q1, q2] = snap_segments(ax, ay, ux, uy, bx, by, vx, vy);
    segments_intersect_open_exact(p1, p2, q1, q2)
}

#[inline]
fn straddles(o1: Orientation, o2: Orientation) -> bool {
    (o1.is_ccw() && o2.is_cw()) || (o1.is_cw() && o2.is_ccw())
}

// ============================================================================
// Exact Lattice Predicates
// ============================================================================

#[inline]
fn within_box_exact(a: LatticePoint, b: LatticePoint, p: LatticePoint) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

/// Exact parametric segment intersection on the lattice.
///
/// Solves `p1 + t (p2 - p1) = q1 + s (q2 - q1)` and requires both parameters
/// strictly inside `(0, 1)`. Parallel and collinear segments never intersect,
/// and neither do segments that only touch.
pub fn segments_intersect_exact(
    p1: LatticePoint,
    p2: LatticePoint,
    q1: LatticePoint,
    q2: LatticePoint,
) -> bool {
    let u = (p2.0 - p1.0, p2.1 - p1.1);
    let v = (q2.0 - q1.0, q2.1 - q1.1);
    let w = (q1.0 - p1.0, q1.1 - p1.1);

    let det = u.0 * v.1 - u.1 * v.0;
    if det == 0 {
        return false;
    }
    let t = w.0 * v.1 - w.1 * v.0;
    let s = w.0 * u.1 - w.1 * u.0;
    let (det, t, s) = if det < 0 { (-det, -t, -s) } else { (det, t, s) };

    0 < t && t < det && 0 < s && s < det
}

/// Exact closed segment intersection on the lattice.
pub fn segments_intersect_closed_exact(
    p1: LatticePoint,
    p2: LatticePoint,
    q1: LatticePoint,
    q2: LatticePoint,
) -> bool {
    let o1 = orient2d_exact(p1, p2, q1);
    let o2 = orient2d_exact(p1, p2, q2);
    let o3 = orient2d_exact(q1, q2, p1);
    let o4 = orient2d_exact(q1, q2, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1.is_collinear() && within_box_exact(p1, p2, q1))
        || (o2.is_collinear() && within_box_exact(p1, p2, q2))
        || (o3.is_collinear() && within_box_exact(q1, q2, p1))
        || (o4.is_collinear() && within_box_exact(q1, q2, p2))
}

/// Exact open segment intersection (proper crossing) on the lattice.
pub fn segments_intersect_open_exact(
    p1: LatticePoint,
    p2: LatticePoint,
    q1: LatticePoint,
    q2: LatticePoint,
) -> bool {
    straddles(orient2d_exact(p1, p2, q1), orient2d_exact(p1, p2, q2))
        && straddles(orient2d_exact(q1, q2, p1), orient2d_exact(q1, q2, p2))
}

/// Returns true if `p` lies in the closed half-plane left of `a -> b`.
#[inline]
pub fn point_in_half_plane(p: LatticePoint, a: LatticePoint, b: LatticePoint) -> bool {
    cross_exact(a, b, p) >= 0
}

/// Closed containment in a counter-clockwise convex polygon, as the
/// conjunction of its edge half-planes.
pub fn point_in_convex_polygon(p: LatticePoint, polygon: &[LatticePoint]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    (0..n).all(|i| point_in_half_plane(p, polygon[i], polygon[(i + 1) % n]))
}

/// Exact location of `p` relative to an arbitrary simple polygon.
pub fn locate_point_in_polygon(p: LatticePoint, polygon: &[LatticePoint]) -> PointLocation {
    let n = polygon.len();
    if n < 3 {
        return PointLocation::Outside;
    }

    let mut inside = false;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];

        if cross_exact(a, b, p) == 0 && within_box_exact(a, b, p) {
            return PointLocation::Boundary;
        }

        if (a.1 > p.1) != (b.1 > p.1) {
            let lhs = (p.0 - a.0) * (b.1 - a.1);
            let rhs = (p.1 - a.1) * (b.0 - a.0);
            let left_of_crossing = if b.1 > a.1 { lhs < rhs } else { lhs > rhs };
            if left_of_crossing {
                inside = !inside;
            }
        }
    }

    if inside {
        PointLocation::Inside
    } else {
        PointLocation::Outside
    }
}

/// Closed point-in-polygon test (boundary counts as inside).
pub fn point_in_polygon(p: LatticePoint, polygon: &[LatticePoint]) -> bool {
    !matches!(locate_point_in_polygon(p, polygon), PointLocation::Outside)
}

/// Twice the signed area of a lattice polygon (positive when counter-clockwise).
pub fn signed_area2_exact(polygon: &[LatticePoint]) -> i128 {
    let n = polygon.len();
    (0..n)
        .map(|i| {
            let a = polygon[i];
            let b = polygon[(i + 1) % n];
            a.0 * b.1 - b.0 * a.1
        })
        .sum()
}

/// Exact convexity test; collinear vertices are tolerated.
pub fn is_convex_exact(polygon: &[LatticePoint]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut expected: Option<Orientation> = None;
    for i in 0..n {
        let o = orient2d_exact(polygon[i], polygon[(i + 1) % n], polygon[(i + 2) % n]);
        if o.is_collinear() {
            continue;
        }
        match expected {
            None => expected = Some(o),
            Some(e) if e != o => return false,
            _ => {}
        }
    }

    expected.is_some()
}
