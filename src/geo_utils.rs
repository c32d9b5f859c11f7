//! # Geographic Utilities
//!
//! Core geographic computations shared by the projection, filtering and
//! progress layers.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`polyline_length`] | Total length of a polyline in meters |
//! | [`cumulative_distances`] | Running great-circle length at every vertex |
//! | [`forward_azimuth`] | Compass bearing from one coordinate to another |
//! | [`compute_bounds`] | Bounding box of a polyline |
//! | [`compute_center`] | Centroid of a polyline |
//! | [`LocalFrame`] | Equirectangular metric frame for planar projection |
//!
//! ## Example
//!
//! ```rust
//! use route_tracker::{Coordinates, geo_utils};
//!
//! let route = vec![
//!     Coordinates::new(2.3522, 48.8566),
//!     Coordinates::new(2.3530, 48.8575),
//!     Coordinates::new(2.3545, 48.8580),
//! ];
//!
//! let length = geo_utils::polyline_length(&route);
//! println!("Route length: {:.0}m", length);
//!
//! let bearing = geo_utils::forward_azimuth(&route[0], &route[1]);
//! assert!(bearing >= 0.0 && bearing < 360.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Two distance models
//!
//! Distances between fixes and route lengths use the haversine formula
//! (spherical Earth, radius 6 371 000 m). Projection onto a route uses a planar equirectangular
//! approximation around the route's centre latitude, which is accurate to
//! well under a meter for event-scale routes (tens of kilometers) but is
//! not valid near the poles or across the antimeridian.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::line_measures::Bearing;
use geo::{Distance, Haversine, Point};

use crate::{Bounds, Coordinates};

/// Earth radius in meters for every distance in the crate.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Mean radius `geo`'s [`Haversine`] measures on.
const GEO_MEAN_RADIUS_METERS: f64 = 6_371_008.8;

/// Meters per degree of latitude on the sphere of [`EARTH_RADIUS_METERS`].
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the
/// Haversine formula.
///
/// # Example
///
/// ```rust
/// use route_tracker::{Coordinates, geo_utils};
///
/// let start = Coordinates::new(0.0, 0.0);
/// let end = Coordinates::new(0.0, 0.01);
///
/// let distance = geo_utils::haversine_distance(&start, &end);
/// assert!((distance - 1_112.0).abs() < 1.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &Coordinates, p2: &Coordinates) -> f64 {
    // Haversine distance is linear in the radius
    Haversine::distance(to_point(p1), to_point(p2)) * (EARTH_RADIUS_METERS / GEO_MEAN_RADIUS_METERS)
}

/// Calculate the total length of a polyline in meters.
///
/// Empty or single-point polylines return 0.0.
pub fn polyline_length(points: &[Coordinates]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Running great-circle length at every vertex of a polyline.
///
/// The result has one entry per input point; the first entry is always 0.0
/// and the last equals [`polyline_length`] summed in the same order.
pub fn cumulative_distances(points: &[Coordinates]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;

    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(&points[i - 1], point);
        }
        cumulative.push(total);
    }

    cumulative
}

/// Compass bearing (forward azimuth) from `from` to `to`.
///
/// Returns degrees clockwise from north, normalized to `[0, 360)`.
/// Identical points yield 0.0.
#[inline]
pub fn forward_azimuth(from: &Coordinates, to: &Coordinates) -> f64 {
    let bearing = Haversine::bearing(to_point(from), to_point(to));
    let normalized = bearing.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if normalized >= 360.0 || !normalized.is_finite() {
        0.0
    } else {
        normalized
    }
}

#[inline]
fn to_point(c: &Coordinates) -> Point<f64> {
    Point::new(c.longitude, c.latitude)
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a polyline.
///
/// For empty input, returns bounds with MIN/MAX values.
pub fn compute_bounds(points: &[Coordinates]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

/// Compute the arithmetic centroid of a polyline.
///
/// Returns (0, 0) for empty input. Not meaningful for polylines crossing
/// the antimeridian.
pub fn compute_center(points: &[Coordinates]) -> Coordinates {
    if points.is_empty() {
        return Coordinates::new(0.0, 0.0);
    }

    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let n = points.len() as f64;

    Coordinates::new(sum_lng / n, sum_lat / n)
}

// =============================================================================
// Local Metric Frame
// =============================================================================

/// Equirectangular projection around a reference latitude.
///
/// Maps coordinates to `[x, y]` meters east/north of an origin. Longitude is
/// scaled by the cosine of the reference latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    origin: Coordinates,
    meters_per_deg_lng: f64,
}

impl LocalFrame {
    /// Build a frame whose scale is taken at `origin`'s latitude.
    pub fn new(origin: Coordinates) -> Self {
        let meters_per_deg_lng = METERS_PER_DEGREE * origin.latitude.to_radians().cos();
        Self { origin, meters_per_deg_lng }
    }

    /// Frame centred on the bounding box of a polyline.
    pub fn for_polyline(points: &[Coordinates]) -> Self {
        Self::new(compute_bounds(points).center())
    }

    #[inline]
    pub fn to_local(&self, c: &Coordinates) -> [f64; 2] {
        [
            (c.longitude - self.origin.longitude) * self.meters_per_deg_lng,
            (c.latitude - self.origin.latitude) * METERS_PER_DEGREE,
        ]
    }

    #[inline]
    pub fn to_coordinates(&self, p: [f64; 2]) -> Coordinates {
        let longitude = if self.meters_per_deg_lng > 0.0 {
            self.origin.longitude + p[0] / self.meters_per_deg_lng
        } else {
            self.origin.longitude
        };
        Coordinates::new(longitude, self.origin.latitude + p[1] / METERS_PER_DEGREE)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
