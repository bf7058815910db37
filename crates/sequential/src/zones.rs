//! Unreachable zones.
//!
//! While an object is printed, parts of the print head hang around the nozzle
//! at different heights: the nozzle itself, the extruder body, the filament
//! hose and finally the gantry. Each level is described by a danger polygon
//! relative to the nozzle. Sweeping the danger polygon along the object's
//! footprint gives the region the head may touch while printing the object.
//! No previously printed object may reach into that region.

use seqarrange_core::{convex_hull_of, BoundingBox, Point, Polygon};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Print head level, from the nozzle tip upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExtruderLevelKind {
    /// Nozzle tip.
    Nozzle,
    /// Extruder body.
    Extruder,
    /// Filament hose and fans.
    Hose,
    /// X gantry.
    Gantry,
}

impl ExtruderLevelKind {
    /// All levels, bottom to top.
    pub const ALL: [ExtruderLevelKind; 4] = [
        ExtruderLevelKind::Nozzle,
        ExtruderLevelKind::Extruder,
        ExtruderLevelKind::Hose,
        ExtruderLevelKind::Gantry,
    ];

    /// Default expansion for the level.
    pub fn default_expansion(self) -> ZoneExpansion {
        match self {
            ExtruderLevelKind::Nozzle | ExtruderLevelKind::Extruder => ZoneExpansion::Convex,
            ExtruderLevelKind::Hose | ExtruderLevelKind::Gantry => ZoneExpansion::Box,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// How a danger polygon is swept along a footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ZoneExpansion {
    /// Convex hull of the Minkowski sum.
    #[default]
    Convex,
    /// Bounding box grown by the danger extent.
    Box,
}

/// One print head level.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtruderLevel {
    /// Level kind.
    pub kind: ExtruderLevelKind,
    /// Height of the level above the bed, in slicer units.
    pub height: i64,
    /// Sweep method.
    pub expansion: ZoneExpansion,
    /// Danger polygons relative to the nozzle.
    pub polygons: Vec<Polygon>,
}

impl ExtruderLevel {
    /// Creates a level with the kind's default expansion.
    pub fn new(kind: ExtruderLevelKind, height: i64, polygons: Vec<Polygon>) -> Self {
        Self {
            kind,
            height,
            expansion: kind.default_expansion(),
            polygons,
        }
    }

    /// Overrides the sweep method.
    pub fn with_expansion(mut self, expansion: ZoneExpansion) -> Self {
        self.expansion = expansion;
        self
    }

    /// Sweeps every danger polygon of this level along `footprint`.
    pub fn sweep(&self, footprint: &Polygon) -> Vec<Polygon> {
        self.polygons
            .iter()
            .map(|danger| match self.expansion {
                ZoneExpansion::Convex => extend_polygon_convex_unreachable_zone(footprint, danger),
                ZoneExpansion::Box => extend_polygon_box_unreachable_zone(footprint, danger),
            })
            .collect()
    }
}

/// Convex hull of `footprint ⊕ danger`.
pub fn extend_polygon_convex_unreachable_zone(footprint: &Polygon, danger: &Polygon) -> Polygon {
    let mut cloud = Vec::with_capacity(footprint.len() * (danger.len() + 1));
    cloud.extend_from_slice(footprint.points());
    for &p in footprint.points() {
        cloud.extend(danger.points().iter().map(|&d| p + d));
    }
    convex_hull_of(&cloud)
}

/// Footprint bounding box grown by the danger polygon's bounding box.
pub fn extend_polygon_box_unreachable_zone(footprint: &Polygon, danger: &Polygon) -> Polygon {
    let fb = footprint.bounding_box();
    let db = danger.bounding_box();
    BoundingBox::new(
        Point::new(fb.min.x + db.min.x.min(0), fb.min.y + db.min.y.min(0)),
        Point::new(fb.max.x + db.max.x.max(0), fb.max.y + db.max.y.max(0)),
    )
    .to_polygon()
}

/// Unreachable zones of one object, per level.
#[derive(Debug, Clone, Default)]
pub struct UnreachableZoneSet {
    levels: [Vec<Polygon>; 4],
}

impl UnreachableZoneSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds zones at a level.
    pub fn extend(&mut self, kind: ExtruderLevelKind, zones: impl IntoIterator<Item = Polygon>) {
        self.levels[kind.index()].extend(zones);
    }

    /// Zones of exactly one level.
    pub fn level(&self, kind: ExtruderLevelKind) -> &[Polygon] {
        &self.levels[kind.index()]
    }

    /// Zones of every level up to and including `kind`.
    ///
    /// Each stored level already covers the levels below it, so this only
    /// matters for callers that want every polygon separately.
    pub fn cumulative(&self, kind: ExtruderLevelKind) -> Vec<&Polygon> {
        self.levels[..=kind.index()].iter().flatten().collect()
    }

    /// All zones, bottom level first.
    pub fn all_polygons(&self) -> Vec<Polygon> {
        self.levels.iter().flatten().cloned().collect()
    }

    /// Total number of zones.
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Returns true if no level has a zone.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the zone set of one object.
///
/// `at_height` supplies the object's outline at a level height; the footprint
/// is used where it returns `None`. Levels are swept bottom to top and every
/// zone is enclosed together with the hull of the levels below it, so a level
/// never covers less than the one underneath.
pub fn prepare_unreachable_zone_polygons<F>(
    footprint: &Polygon,
    levels: &[ExtruderLevel],
    at_height: F,
) -> UnreachableZoneSet
where
    F: Fn(i64) -> Option<Polygon>,
{
    let mut ordered: Vec<&ExtruderLevel> = levels.iter().collect();
    ordered.sort_by_key(|level| level.kind);

    let mut set = UnreachableZoneSet::new();
    let mut below: Option<Polygon> = None;
    for level in ordered {
        let outline = at_height(level.height).unwrap_or_else(|| footprint.clone());
        let zones: Vec<Polygon> = level
            .sweep(&outline)
            .into_iter()
            .map(|zone| match &below {
                Some(lower) => enclose(&zone, lower),
                None => zone,
            })
            .collect();
        log::trace!("{:?}: {} zone(s)", level.kind, zones.len());

        if !zones.is_empty() {
            let mut cloud: Vec<Point> = zones.iter().flat_map(|z| z.points().iter().copied()).collect();
            if let Some(lower) = &below {
                cloud.extend_from_slice(lower.points());
            }
            below = Some(convex_hull_of(&cloud));
        }
        set.extend(level.kind, zones);
    }
    set
}

fn enclose(zone: &Polygon, lower: &Polygon) -> Polygon {
    let mut cloud = Vec::with_capacity(zone.len() + lower.len());
    cloud.extend_from_slice(zone.points());
    cloud.extend_from_slice(lower.points());
    convex_hull_of(&cloud)
}
