//! Polygon preprocessing.
//!
//! Footprints arrive in slicer units (1 unit = 1 nm). Before they reach the
//! solver they are:
//!
//! 1. replaced by their convex hull,
//! 2. decimated into an outer approximation with fewer vertices,
//! 3. scaled down into solver units with outward rounding.
//!
//! Every step only grows the polygon, so a placement that is collision-free
//! for the processed footprint is collision-free for the original.

use geo::Simplify;
use seqarrange_core::robust::{segments_intersect_open_exact, LatticePoint, PointLocation};
use seqarrange_core::{Point, Polygon, Rational, Result, SolverConfiguration};

/// Growth steps per tolerance when enlarging a decimated polygon.
const GROWTH_STEPS_PER_TOLERANCE: f64 = 4.0;

/// Upper bound on enlargement rounds before decimation gives up.
const MAX_GROWTH_ROUNDS: usize = 64;

/// Scales a slicer-unit polygon into solver units.
///
/// Vertices are rounded away from the bounding-box centre so the result covers
/// the scaled original.
pub fn scale_down_polygon_for_sequential_solver(polygon: &Polygon, scale_factor: i64) -> Polygon {
    let scale = scale_factor.max(1);
    let center = polygon.bounding_box();
    let (cx2, cy2) = (
        center.min.x as i128 + center.max.x as i128,
        center.min.y as i128 + center.max.y as i128,
    );

    let points = polygon
        .points()
        .iter()
        .map(|p| {
            Point::new(
                round_outward(p.x, 2 * p.x as i128 >= cx2, scale),
                round_outward(p.y, 2 * p.y as i128 >= cy2, scale),
            )
        })
        .collect::<Vec<_>>();

    let mut scaled = Polygon::new(points);
    scaled.make_counter_clockwise();
    dedup_ring(scaled)
}

fn round_outward(value: i64, upward: bool, scale: i64) -> i64 {
    if upward {
        -((-value).div_euclid(scale))
    } else {
        value.div_euclid(scale)
    }
}

fn dedup_ring(polygon: Polygon) -> Polygon {
    let mut points = polygon.points().to_vec();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::new(points)
}

/// Converts a solver-unit polygon back into slicer units.
pub fn scale_up_polygon_for_slicer(polygon: &Polygon, scale_factor: i64) -> Polygon {
    Polygon::new(
        polygon
            .points()
            .iter()
            .map(|p| Point::new(p.x * scale_factor, p.y * scale_factor))
            .collect(),
    )
}

/// Converts a solver-unit decision value into a slicer-unit coordinate.
pub fn scale_up_position_for_slicer(value: Rational, scale_factor: i64) -> i64 {
    (value * scale_factor).normalize().as_f64().round() as i64
}

/// Douglas-Peucker decimation that returns an outer approximation.
///
/// The simplified ring is pushed away from the bounding-box centre in steps of
/// a quarter tolerance until it encloses every original vertex and no original
/// edge crosses it. With `extra_safety` one more step is added. A zero
/// tolerance, a triangle, or a ring that does not converge is returned
/// unchanged (counter-clockwise).
pub fn decimate_polygon_for_sequential_solver(
    tolerance: f64,
    polygon: &Polygon,
    extra_safety: bool,
) -> Polygon {
    let original = polygon.clone().counter_clockwise();
    if tolerance <= 0.0 || original.len() <= 3 {
        return original;
    }

    let simplified = Polygon::from_geo(&original.to_geo().simplify(&tolerance)).counter_clockwise();
    if simplified.len() < 3 || simplified.doubled_signed_area() == 0 {
        return original;
    }
    if simplified.len() >= original.len() {
        return original;
    }

    let bb = original.bounding_box();
    let center = (
        (bb.min.x as f64 + bb.max.x as f64) / 2.0,
        (bb.min.y as f64 + bb.max.y as f64) / 2.0,
    );
    let step = (tolerance / GROWTH_STEPS_PER_TOLERANCE).max(1.0);

    let mut distance = 0.0;
    for _ in 0..MAX_GROWTH_ROUNDS {
        let candidate = grow_polygon(&simplified, center, distance);
        if encloses(&candidate, &original) {
            return if extra_safety {
                grow_polygon(&simplified, center, distance + step)
            } else {
                candidate
            };
        }
        distance += step;
    }

    log::warn!(
        "decimation of a {}-vertex polygon did not converge, keeping it",
        original.len()
    );
    original
}

/// Moves every vertex `distance` away from `center`, rounding outward.
fn grow_polygon(polygon: &Polygon, center: (f64, f64), distance: f64) -> Polygon {
    if distance <= 0.0 {
        return polygon.clone();
    }
    let points = polygon
        .points()
        .iter()
        .map(|p| {
            let dx = p.x as f64 - center.0;
            let dy = p.y as f64 - center.1;
            let len = (dx * dx + dy * dy).sqrt();
            if len == 0.0 {
                return *p;
            }
            let nx = p.x as f64 + dx / len * distance;
            let ny = p.y as f64 + dy / len * distance;
            Point::new(
                if dx >= 0.0 { nx.ceil() } else { nx.floor() } as i64,
                if dy >= 0.0 { ny.ceil() } else { ny.floor() } as i64,
            )
        })
        .collect();
    Polygon::new(points)
}

/// Exact containment of `inner` in `outer` (boundary contact allowed).
fn encloses(outer: &Polygon, inner: &Polygon) -> bool {
    let lattice = |p: &Polygon| -> Vec<LatticePoint> {
        p.points()
            .iter()
            .map(|q| (q.x as i128, q.y as i128))
            .collect()
    };
    let out = lattice(outer);
    let inn = lattice(inner);

    if inner.points().iter().any(|p| !outer.contains_point(*p)) {
        return false;
    }
    if outer
        .points()
        .iter()
        .any(|p| matches!(inner.locate(*p), PointLocation::Inside))
    {
        return false;
    }
    let (n, m) = (out.len(), inn.len());
    for i in 0..n {
        for j in 0..m {
            if segments_intersect_open_exact(out[i], out[(i + 1) % n], inn[j], inn[(j + 1) % m]) {
                return false;
            }
        }
    }
    true
}

/// Convex hull, decimation and scale-down of an object footprint.
pub fn prepare_object_polygon(config: &SolverConfiguration, polygon: &Polygon) -> Result<Polygon> {
    polygon.validate()?;
    let hull = polygon.convex_hull();
    let decimated = decimate_polygon_for_sequential_solver(config.decimation_tolerance(), &hull, false);
    let scaled = scale_down_polygon_for_sequential_solver(&decimated, config.slicer_scale_factor);
    // Tiny objects can collapse after scaling.
    if scaled.validate().is_err() {
        let bb = scaled.bounding_box();
        let mut fallback = bb.to_polygon();
        if bb.width() == 0 || bb.height() == 0 {
            fallback = seqarrange_core::BoundingBox::new(
                bb.min,
                Point::new(bb.max.x.max(bb.min.x + 1), bb.max.y.max(bb.min.y + 1)),
            )
            .to_polygon();
        }
        return Ok(fallback);
    }
    Ok(scaled.convex_hull())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(radius: f64, n: usize) -> Polygon {
        Polygon::new(
            (0..n)
                .map(|i| {
                    let a = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
                    Point::new((radius * a.cos()).round() as i64, (radius * a.sin()).round() as i64)
                })
                .collect(),
        )
    }

    #[test]
    fn test_scale_down_rounds_outward() {
        let p = Polygon::from_coords(&[(-150_000, -150_000), (250_000, -150_000), (250_000, 250_000), (-150_000, 250_000)]);
        let scaled = scale_down_polygon_for_sequential_solver(&p, 100_000);
        let bb = scaled.bounding_box();
        assert_eq!(bb.min, Point::new(-2, -2));
        assert_eq!(bb.max, Point::new(3, 3));
        assert!(scaled.is_counter_clockwise());
    }

    #[test]
    fn test_scale_up_position() {
        assert_eq!(scale_up_position_for_slicer(Rational::new(5, 2), 100_000), 250_000);
        let p = scale_up_polygon_for_slicer(&Polygon::rectangle(2, 3), 10);
        assert_eq!(p.bounding_box().max, Point::new(20, 30));
    }

    #[test]
    fn test_decimation_reduces_and_encloses() {
        let original = circle(10_000_000.0, 96);
        let decimated = decimate_polygon_for_sequential_solver(450_000.0, &original, false);
        assert!(decimated.len() < original.len());
        assert!(decimated.is_counter_clockwise());
        for p in original.points() {
            assert!(decimated.contains_point(*p), "vertex {:?} escaped", p);
        }
    }

    #[test]
    fn test_decimation_deterministic() {
        let original = circle(5_000_000.0, 64);
        let a = decimate_polygon_for_sequential_solver(150_000.0, &original, true);
        let b = decimate_polygon_for_sequential_solver(150_000.0, &original, true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_decimation_zero_tolerance_is_identity() {
        let original = circle(1_000_000.0, 12);
        let decimated = decimate_polygon_for_sequential_solver(0.0, &original, false);
        assert_eq!(decimated, original.counter_clockwise());
    }

    #[test]
    fn test_extra_safety_grows() {
        let original = circle(10_000_000.0, 96);
        let plain = decimate_polygon_for_sequential_solver(450_000.0, &original, false);
        let safe = decimate_polygon_for_sequential_solver(450_000.0, &original, true);
        assert!(safe.area() > plain.area());
    }

    #[test]
    fn test_prepare_object_polygon() {
        let config = SolverConfiguration::default();
        let square = Polygon::rectangle(20_000_000, 10_000_000);
        let prepared = prepare_object_polygon(&config, &square).unwrap();
        let bb = prepared.bounding_box();
        assert_eq!(bb.width(), 200);
        assert_eq!(bb.height(), 100);
        assert!(prepared.is_convex());
    }

    #[test]
    fn test_prepare_rejects_degenerate() {
        let config = SolverConfiguration::default();
        let line = Polygon::from_coords(&[(0, 0), (10, 10)]);
        assert!(prepare_object_polygon(&config, &line).is_err());
    }
}
