//! Projection of a position onto a route polyline.
//!
//! Finds the closest point on any route segment (not just vertices), the
//! distance travelled along the route up to that point, and the
//! perpendicular deviation from the route.
//!
//! Two entry points answer the same query:
//! - [`project`] scans every segment; no setup cost, O(n) per query.
//! - [`RouteIndex`] builds an R-tree over the segments once per route and
//!   answers queries in roughly O(log n). Used by the progress tracker,
//!   which queries the same route on every accepted fix.
//!
//! ## Tie-break
//!
//! When several segments are equally close (within [`TIE_EPSILON_M`]), the
//! one with the lowest index wins. This keeps the result deterministic and
//! distance-along-route monotonic on routes that double back on themselves.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::error::{Result, TrackingError};
use crate::geo_utils::{cumulative_distances, LocalFrame};
use crate::Coordinates;

/// Distance tolerance (meters) under which two segments are considered tied.
pub const TIE_EPSILON_M: f64 = 1e-6;

/// Result of projecting a point onto a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Closest point on the route
    pub snapped: Coordinates,
    /// Index of the segment (route[i] → route[i+1]) holding the snapped point
    pub segment_index: usize,
    /// Position of the snapped point along that segment, 0.0..=1.0
    pub fraction: f64,
    /// Great-circle length from the route start to the snapped point (meters)
    pub distance_along_route: f64,
    /// Distance from the input point to the snapped point (meters)
    pub perpendicular_distance: f64,
}

/// Project `point` onto `route`.
///
/// # Errors
///
/// - [`TrackingError::InvalidRoute`] if the route has fewer than 2 points.
/// - [`TrackingError::InvalidCoordinates`] if the point or any route vertex
///   is not a valid WGS84 coordinate.
///
/// # Example
///
/// ```rust
/// use route_tracker::{Coordinates, projection::project};
///
/// let route = vec![Coordinates::new(0.0, 0.0), Coordinates::new(0.0, 0.01)];
/// let p = project(&Coordinates::new(0.0, 0.005), &route).unwrap();
///
/// assert!(p.perpendicular_distance < 1e-6);
/// assert!((p.distance_along_route - 556.0).abs() < 1.0);
/// ```
pub fn project(point: &Coordinates, route: &[Coordinates]) -> Result<Projection> {
    let geometry = SegmentGeometry::new(route)?;
    let q = geometry.query_point(point)?;

    let best_d2 = (0..geometry.segment_count())
        .map(|i| geometry.candidate(i, q).d2)
        .fold(f64::INFINITY, f64::min);

    // Lowest index within tolerance of the minimum
    let winner = (0..geometry.segment_count())
        .map(|i| geometry.candidate(i, q))
        .find(|c| within_tie(c.d2, best_d2))
        .ok_or(TrackingError::InvalidRoute { points: route.len() })?;

    Ok(geometry.finish(&winner))
}

#[inline]
fn within_tie(d2: f64, best_d2: f64) -> bool {
    d2.sqrt() <= best_d2.sqrt() + TIE_EPSILON_M
}

// =============================================================================
// Shared segment geometry
// =============================================================================

/// Closest point on one segment to a query point, in the local frame.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    fraction: f64,
    closest: [f64; 2],
    d2: f64,
}

/// Route vertices projected into a local metric frame, plus cumulative
/// great-circle distances.
#[derive(Debug, Clone)]
struct SegmentGeometry {
    frame: LocalFrame,
    local: Vec<[f64; 2]>,
    cumulative: Vec<f64>,
}

impl SegmentGeometry {
    fn new(route: &[Coordinates]) -> Result<Self> {
        if route.len() < 2 {
            return Err(TrackingError::InvalidRoute { points: route.len() });
        }
        if let Some(bad) = route.iter().find(|c| !c.is_valid()) {
            return Err(TrackingError::InvalidCoordinates {
                longitude: bad.longitude,
                latitude: bad.latitude,
            });
        }

        let frame = LocalFrame::for_polyline(route);
        let local = route.iter().map(|c| frame.to_local(c)).collect();
        let cumulative = cumulative_distances(route);

        Ok(Self { frame, local, cumulative })
    }

    fn segment_count(&self) -> usize {
        self.local.len() - 1
    }

    fn total_distance(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    fn query_point(&self, point: &Coordinates) -> Result<[f64; 2]> {
        if !point.is_valid() {
            return Err(TrackingError::InvalidCoordinates {
                longitude: point.longitude,
                latitude: point.latitude,
            });
        }
        Ok(self.frame.to_local(point))
    }

    fn candidate(&self, index: usize, q: [f64; 2]) -> Candidate {
        let (fraction, closest, d2) =
            closest_on_segment(q, self.local[index], self.local[index + 1]);
        Candidate { index, fraction, closest, d2 }
    }

    fn finish(&self, c: &Candidate) -> Projection {
        let start = self.cumulative[c.index];
        let end = self.cumulative[c.index + 1];
        let distance_along_route = if c.fraction >= 1.0 {
            end
        } else {
            start + c.fraction * (end - start)
        };

        Projection {
            snapped: self.frame.to_coordinates(c.closest),
            segment_index: c.index,
            fraction: c.fraction,
            distance_along_route,
            perpendicular_distance: c.d2.sqrt(),
        }
    }
}

/// Closest point on segment `a`→`b` to `p`: (fraction, point, squared distance).
#[inline]
fn closest_on_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> (f64, [f64; 2], f64) {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let len2 = dx * dx + dy * dy;

    let t = if len2 > 0.0 {
        (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let closest = [a[0] + t * dx, a[1] + t * dy];
    let ex = p[0] - closest[0];
    let ey = p[1] - closest[1];
    (t, closest, ex * ex + ey * ey)
}

// =============================================================================
// R-tree Indexed Segments
// =============================================================================

/// A route segment with its index for R-tree queries.
#[derive(Debug, Clone, Copy)]
struct IndexedSegment {
    idx: usize,
    a: [f64; 2],
    b: [f64; 2],
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.a, self.b)
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        closest_on_segment(*point, self.a, self.b).2
    }
}

/// Spatial index over a route's segments.
///
/// Built once per route; answers the same query as [`project`] with the
/// same tie-break.
#[derive(Clone)]
pub struct RouteIndex {
    geometry: SegmentGeometry,
    tree: RTree<IndexedSegment>,
}

impl std::fmt::Debug for RouteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteIndex")
            .field("segments", &self.segment_count())
            .field("total_distance", &self.total_distance())
            .finish()
    }
}

impl RouteIndex {
    /// Index a route.
    ///
    /// # Errors
    ///
    /// Same validation as [`project`].
    pub fn new(route: &[Coordinates]) -> Result<Self> {
        let geometry = SegmentGeometry::new(route)?;

        let segments: Vec<IndexedSegment> = geometry
            .local
            .windows(2)
            .enumerate()
            .map(|(idx, w)| IndexedSegment { idx, a: w[0], b: w[1] })
            .collect();

        let tree = RTree::bulk_load(segments);
        Ok(Self { geometry, tree })
    }

    /// Number of segments in the indexed route.
    pub fn segment_count(&self) -> usize {
        self.geometry.segment_count()
    }

    /// Great-circle length of the indexed route in meters.
    pub fn total_distance(&self) -> f64 {
        self.geometry.total_distance()
    }

    /// Project `point` onto the indexed route.
    pub fn project(&self, point: &Coordinates) -> Result<Projection> {
        let q = self.geometry.query_point(point)?;

        let nearest = self
            .tree
            .nearest_neighbor(&q)
            .ok_or(TrackingError::InvalidRoute { points: self.geometry.local.len() })?;
        let best_d2 = nearest.distance_2(&q);

        // Every segment tied with the nearest one lies inside this box
        let radius = best_d2.sqrt() + TIE_EPSILON_M;
        let search = AABB::from_corners([q[0] - radius, q[1] - radius], [q[0] + radius, q[1] + radius]);

        let winner = self
            .tree
            .locate_in_envelope_intersecting(&search)
            .map(|s| self.geometry.candidate(s.idx, q))
            .filter(|c| within_tie(c.d2, best_d2))
            .min_by_key(|c| c.index)
            .unwrap_or_else(|| self.geometry.candidate(nearest.idx, q));

        Ok(self.geometry.finish(&winner))
    }
}
