//! Route progress calculation.
//!
//! Given the current position and the active route, computes how far along
//! the route the traveler is, how far is left, whether they are still on
//! the route, and which way the route heads from here.
//!
//! Route-level data (segment index, total length) is computed once per route
//! in [`TrackedRoute`]; each position update is then a single indexed
//! projection.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::geo_utils::{forward_azimuth, haversine_distance};
use crate::projection::{Projection, RouteIndex};
use crate::{Coordinates, Route};

/// Deviation (meters) up to which the traveler counts as on the route.
pub const ON_ROUTE_THRESHOLD_M: f64 = 50.0;

/// Below this distance (meters) two points are treated as the same place
/// when picking a bearing target.
const SAME_PLACE_M: f64 = 0.01;

/// Configuration for progress calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Maximum deviation to be considered on route (meters).
    /// Default: 50.0
    pub on_route_threshold: f64,

    /// Number of route vertices to look ahead when computing the bearing.
    /// Default: 3
    pub look_ahead_vertices: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            on_route_threshold: ON_ROUTE_THRESHOLD_M,
            look_ahead_vertices: 3,
        }
    }
}

/// Snapshot of progress along the active route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteProgress {
    /// Meters from the route start to the snapped position
    pub distance_traveled: f64,
    /// Meters left to the route end
    pub distance_remaining: f64,
    /// Length of the whole route in meters
    pub total_distance: f64,
    /// 0-100
    pub percent_complete: f64,
    /// Nearest point on the route
    pub snapped_position: Coordinates,
    /// Direction of forward travel along the route, degrees 0-360
    pub bearing: f64,
    pub is_on_route: bool,
    /// Meters between the position and the snapped position
    pub deviation_distance: f64,
}

/// A route prepared for repeated progress queries.
///
/// Holds the route's segment index and total length for the lifetime of the
/// route. A route that cannot be projected onto (fewer than two points or
/// invalid coordinates) is still accepted; its progress queries return `None`.
#[derive(Debug, Clone)]
pub struct TrackedRoute {
    route: Route,
    index: Option<RouteIndex>,
    total_distance: f64,
}

impl TrackedRoute {
    pub fn new(route: Route) -> Self {
        let index = match RouteIndex::new(route.points()) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!("[RouteProgress] Route cannot be tracked: {}", e);
                None
            }
        };
        let total_distance = index.as_ref().map_or(0.0, RouteIndex::total_distance);

        Self { route, index, total_distance }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// True when progress can be computed against this route.
    pub fn is_trackable(&self) -> bool {
        self.index.is_some()
    }

    /// Progress for `position` on this route, or `None` if it cannot be computed.
    pub fn progress(&self, position: &Coordinates, config: &ProgressConfig) -> Option<RouteProgress> {
        let index = self.index.as_ref()?;

        let projection = match index.project(position) {
            Ok(p) => p,
            Err(e) => {
                warn!("[RouteProgress] Projection failed: {}", e);
                return None;
            }
        };

        let progress = self.summarize(&projection, config);
        if !is_finite(&progress) {
            warn!("[RouteProgress] Non-finite progress for {:?}, dropping update", position);
            return None;
        }
        Some(progress)
    }

    fn summarize(&self, projection: &Projection, config: &ProgressConfig) -> RouteProgress {
        let total_distance = self.total_distance;
        let distance_traveled = projection.distance_along_route.clamp(0.0, total_distance);
        let distance_remaining = (total_distance - distance_traveled).max(0.0);

        let percent_complete = if total_distance > 0.0 {
            (distance_traveled / total_distance * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let deviation_distance = projection.perpendicular_distance;

        RouteProgress {
            distance_traveled,
            distance_remaining,
            total_distance,
            percent_complete,
            snapped_position: projection.snapped,
            bearing: self.bearing_from(projection, config.look_ahead_vertices),
            is_on_route: deviation_distance <= config.on_route_threshold,
            deviation_distance,
        }
    }

    /// Bearing from the snapped point toward a vertex a few steps ahead.
    ///
    /// Steps are counted from the segment vertex nearest the snapped point.
    /// At the end of the route, where the look-ahead target collapses onto
    /// the snapped point, falls back to the heading of the last segment with
    /// non-zero length.
    fn bearing_from(&self, projection: &Projection, look_ahead: usize) -> f64 {
        let points = self.route.points();
        let last = points.len() - 1;
        let nearest_vertex = projection.segment_index + usize::from(projection.fraction > 0.5);
        let target_index = (nearest_vertex + look_ahead.max(1)).min(last);
        let target = &points[target_index];

        if haversine_distance(&projection.snapped, target) > SAME_PLACE_M {
            return forward_azimuth(&projection.snapped, target);
        }

        (0..=projection.segment_index.min(last - 1))
            .rev()
            .find(|&i| haversine_distance(&points[i], &points[i + 1]) > SAME_PLACE_M)
            .map_or(0.0, |i| forward_azimuth(&points[i], &points[i + 1]))
    }
}

impl From<Route> for TrackedRoute {
    fn from(route: Route) -> Self {
        Self::new(route)
    }
}

fn is_finite(p: &RouteProgress) -> bool {
    p.distance_traveled.is_finite()
        && p.distance_remaining.is_finite()
        && p.total_distance.is_finite()
        && p.percent_complete.is_finite()
        && p.bearing.is_finite()
        && p.deviation_distance.is_finite()
        && p.snapped_position.is_valid()
}

/// Progress for the current position on the active route.
///
/// Returns `None` when either input is absent or the progress cannot be
/// computed; callers keep showing the last good snapshot in that case.
///
/// # Example
///
/// ```rust
/// use route_tracker::{Coordinates, Route, progress::{calculate_progress, ProgressConfig, TrackedRoute}};
///
/// let route = TrackedRoute::new(Route::from_lng_lat(&[[0.0, 0.0], [0.0, 0.01]]));
/// let here = Coordinates::new(0.0, 0.005);
///
/// let progress = calculate_progress(Some(&here), Some(&route), &ProgressConfig::default()).unwrap();
/// assert!((progress.percent_complete - 50.0).abs() < 0.01);
/// assert!(progress.is_on_route);
/// ```
pub fn calculate_progress(
    position: Option<&Coordinates>,
    route: Option<&TrackedRoute>,
    config: &ProgressConfig,
) -> Option<RouteProgress> {
    route?.progress(position?, config)
}

/// Position to show for the traveler: snapped onto the route while on it,
/// the raw position otherwise.
pub fn display_position(progress: Option<&RouteProgress>, raw: Coordinates) -> Coordinates {
    match progress {
        Some(p) if p.is_on_route => p.snapped_position,
        _ => raw,
    }
}

/// Remaining travel time (seconds), scaling the backend's route duration by
/// the fraction of distance left.
pub fn estimated_time_remaining(progress: &RouteProgress, route_duration_s: f64) -> f64 {
    if progress.total_distance <= 0.0 || !route_duration_s.is_finite() {
        return 0.0;
    }
    (route_duration_s * progress.distance_remaining / progress.total_distance).max(0.0)
}
