//! Integer polygon types.
//!
//! Footprints, clearance zones and bed outlines are polygons with integer
//! fixed-point coordinates. Downstream code expects counter-clockwise winding;
//! use [`Polygon::make_counter_clockwise`] after construction from foreign data.

use crate::error::{Error, Result};
use crate::rational::{Rational, RATIONAL_PRECISION};
use crate::robust::{
    is_convex_exact, locate_point_in_polygon, signed_area2_exact, LatticePoint, PointLocation,
};
use geo::{ConvexHull, LineString, MultiPoint, Polygon as GeoPolygon};
use std::ops::{Add, Sub};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Integer coordinate.
pub type Coord = i64;

/// A point with integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Point {
    /// X coordinate.
    pub x: Coord,
    /// Y coordinate.
    pub y: Coord,
}

impl Point {
    /// Creates a new point.
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Lattice coordinates after translation by a rational offset.
    pub fn to_lattice(self, dx: Rational, dy: Rational) -> LatticePoint {
        let scale = RATIONAL_PRECISION as i128;
        (
            self.x as i128 * scale + dx.grid_value(),
            self.y as i128 * scale + dy.grid_value(),
        )
    }

    /// Converts to a floating tuple.
    pub fn to_f64(self) -> (f64, f64) {
        (self.x as f64, self.y as f64)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(Coord, Coord)> for Point {
    fn from((x, y): (Coord, Coord)) -> Self {
        Point::new(x, y)
    }
}

/// A directed segment `a -> b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Line {
    /// Start point.
    pub a: Point,
    /// End point.
    pub b: Point,
}

impl Line {
    /// Creates a new segment.
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Direction vector `b - a`.
    pub fn direction(&self) -> Point {
        self.b - self.a
    }
}

/// Axis-aligned bounding box with inclusive corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    /// Lower-left corner.
    pub min: Point,
    /// Upper-right corner.
    pub max: Point,
}

impl BoundingBox {
    /// Creates a box from its corners.
    pub const fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Extent along X.
    pub fn width(&self) -> Coord {
        self.max.x - self.min.x
    }

    /// Extent along Y.
    pub fn height(&self) -> Coord {
        self.max.y - self.min.y
    }

    /// Centre, rounded toward negative infinity.
    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x).div_euclid(2),
            (self.min.y + self.max.y).div_euclid(2),
        )
    }

    /// Counter-clockwise rectangle polygon of this box.
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ])
    }
}

/// A simple polygon with integer vertices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// Creates a polygon from its vertices (no closing duplicate).
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Creates a polygon from coordinate pairs.
    pub fn from_coords(coords: &[(Coord, Coord)]) -> Self {
        Self::new(coords.iter().map(|&c| Point::from(c)).collect())
    }

    /// Axis-aligned rectangle with its lower-left corner at the origin.
    pub fn rectangle(width: Coord, height: Coord) -> Self {
        BoundingBox::new(Point::new(0, 0), Point::new(width, height)).to_polygon()
    }

    /// Axis-aligned rectangle centred on the origin.
    pub fn centered_rectangle(width: Coord, height: Coord) -> Self {
        let hx = width / 2;
        let hy = height / 2;
        BoundingBox::new(Point::new(-hx, -hy), Point::new(width - hx, height - hy)).to_polygon()
    }

    /// Vertices.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if the polygon has no vertices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Edge `i`, from vertex `i` to vertex `i + 1` (wrapping).
    pub fn edge(&self, i: usize) -> Line {
        let n = self.points.len();
        Line::new(self.points[i % n], self.points[(i + 1) % n])
    }

    /// Iterates over the closed ring of edges.
    pub fn edges(&self) -> impl Iterator<Item = Line> + '_ {
        (0..self.points.len()).map(move |i| self.edge(i))
    }

    fn lattice(&self) -> Vec<LatticePoint> {
        self.points
            .iter()
            .map(|p| (p.x as i128, p.y as i128))
            .collect()
    }

    /// Twice the signed area (positive when counter-clockwise).
    pub fn doubled_signed_area(&self) -> i128 {
        signed_area2_exact(&self.lattice())
    }

    /// Unsigned area.
    pub fn area(&self) -> f64 {
        self.doubled_signed_area().abs() as f64 / 2.0
    }

    /// Returns true for counter-clockwise winding.
    pub fn is_counter_clockwise(&self) -> bool {
        self.doubled_signed_area() > 0
    }

    /// Reverses the vertex order if the winding is clockwise.
    pub fn make_counter_clockwise(&mut self) {
        if self.doubled_signed_area() < 0 {
            self.points.reverse();
        }
    }

    /// Owned variant of [`Polygon::make_counter_clockwise`].
    pub fn counter_clockwise(mut self) -> Self {
        self.make_counter_clockwise();
        self
    }

    /// Exact convexity test.
    pub fn is_convex(&self) -> bool {
        is_convex_exact(&self.lattice())
    }

    /// Bounding box; the default box for an empty polygon.
    pub fn bounding_box(&self) -> BoundingBox {
        let Some(first) = self.points.first() else {
            return BoundingBox::default();
        };
        self.points.iter().fold(
            BoundingBox::new(*first, *first),
            |bb, p| {
                BoundingBox::new(
                    Point::new(bb.min.x.min(p.x), bb.min.y.min(p.y)),
                    Point::new(bb.max.x.max(p.x), bb.max.y.max(p.y)),
                )
            },
        )
    }

    /// Largest absolute coordinate.
    pub fn max_abs_coord(&self) -> Coord {
        self.points
            .iter()
            .map(|p| p.x.abs().max(p.y.abs()))
            .max()
            .unwrap_or(0)
    }

    /// Translated copy.
    pub fn translated(&self, dx: Coord, dy: Coord) -> Self {
        Self::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x + dx, p.y + dy))
                .collect(),
        )
    }

    /// Exact location of an integer point.
    pub fn locate(&self, p: Point) -> PointLocation {
        locate_point_in_polygon((p.x as i128, p.y as i128), &self.lattice())
    }

    /// Closed containment test.
    pub fn contains_point(&self, p: Point) -> bool {
        !matches!(self.locate(p), PointLocation::Outside)
    }

    /// Lattice vertices after translation by a rational offset.
    pub fn placed_lattice(&self, dx: Rational, dy: Rational) -> Vec<LatticePoint> {
        self.points.iter().map(|p| p.to_lattice(dx, dy)).collect()
    }

    /// Convex hull, counter-clockwise, without collinear vertices.
    pub fn convex_hull(&self) -> Polygon {
        convex_hull_of(&self.points)
    }

    /// Checks the preconditions of the arrangement solver.
    pub fn validate(&self) -> Result<()> {
        if self.points.len() < 3 {
            return Err(Error::InvalidGeometry(format!(
                "polygon needs at least 3 vertices, got {}",
                self.points.len()
            )));
        }
        if self.doubled_signed_area() == 0 {
            return Err(Error::InvalidGeometry("polygon has zero area".into()));
        }
        Ok(())
    }

    /// Converts to a `geo` polygon.
    pub fn to_geo(&self) -> GeoPolygon<f64> {
        GeoPolygon::new(
            LineString::from(self.points.iter().map(|p| p.to_f64()).collect::<Vec<_>>()),
            vec![],
        )
    }

    /// Converts from a `geo` polygon, rounding coordinates and dropping the
    /// closing vertex.
    pub fn from_geo(polygon: &GeoPolygon<f64>) -> Self {
        let mut points: Vec<Point> = polygon
            .exterior()
            .points()
            .map(|p| Point::new(p.x().round() as Coord, p.y().round() as Coord))
            .collect();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        points.dedup();
        Self::new(points)
    }
}

/// Convex hull of a point set, counter-clockwise.
pub fn convex_hull_of(points: &[Point]) -> Polygon {
    let cloud: MultiPoint<f64> = points.iter().map(|p| p.to_f64()).collect::<Vec<_>>().into();
    Polygon::from_geo(&cloud.convex_hull()).counter_clockwise()
}
