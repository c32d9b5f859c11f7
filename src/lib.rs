//! # Route Tracker
//!
//! Real-time progress tracking along a navigation route, with automatic
//! re-routing when the traveler strays off it.
//!
//! This library provides:
//! - Projection of a GPS position onto a route polyline
//! - Accuracy, time and distance filtering of raw location fixes
//! - Smooth, frame-driven interpolation of the displayed position
//! - Progress snapshots (distance traveled and remaining, bearing, on-route)
//! - A cooldown-governed, single-flight re-route policy
//!
//! ## Features
//!
//! - **`http`** - Enable the HTTP client for the routing backend
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_tracker::{Coordinates, Route, TrackedRoute, ProgressConfig};
//!
//! // Routes come from the backend as [lng, lat] pairs
//! let route = TrackedRoute::new(Route::from_lng_lat(&[
//!     [2.3522, 48.8566],
//!     [2.3522, 48.8656],
//! ]));
//!
//! let here = Coordinates::new(2.3523, 48.8611);
//! if let Some(progress) = route.progress(&here, &ProgressConfig::default()) {
//!     println!(
//!         "{:.0}% done, {:.0}m to go, on route: {}",
//!         progress.percent_complete, progress.distance_remaining, progress.is_on_route
//!     );
//! }
//! ```
//!
//! ## Sessions
//!
//! [`NavigationSession`] ties a [`location::LocationSource`], the active
//! route, a [`routing::RouteProvider`] and a display
//! [`interpolation::FrameScheduler`] together. It needs a tokio runtime for
//! re-route requests.

use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod format;
pub mod geo_utils;
pub mod interpolation;
pub mod location;
pub mod progress;
pub mod projection;
pub mod recalculation;
pub mod routing;
pub mod session;

// HTTP module for the routing backend
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::RoutingClient;

pub use config::TrackerConfig;
pub use error::{Result, TrackingError};
pub use interpolation::{Easing, FrameId, FrameScheduler, InterpolationConfig, PositionInterpolator};
pub use location::{
    watch_position, EnrichedPosition, FilterConfig, LocationError, LocationEvent, LocationSource,
    PositionFilter, RawFix, Subscription,
};
pub use progress::{calculate_progress, ProgressConfig, RouteProgress, TrackedRoute};
pub use projection::{project, Projection, RouteIndex};
pub use recalculation::{RecalculationConfig, RecalculationPolicy, RecalculationState};
pub use routing::{RouteProvider, RouteRequest, RouteResponse, RoutingError, TravelProfile};
pub use session::{monotonic_clock, Clock, EventCallback, NavigationEvent, NavigationSession, NavigationTarget};

// ============================================================================
// Core Types
// ============================================================================

/// A geographic position in degrees.
///
/// Serialized as `{"lng": .., "lat": ..}`.
///
/// # Example
/// ```
/// use route_tracker::Coordinates;
/// let point = Coordinates::new(2.3522, 48.8566); // Paris
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(rename = "lat")]
    pub latitude: f64,
}

impl Coordinates {
    /// Create coordinates from longitude and latitude.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// From a GeoJSON-style `[lng, lat]` pair.
    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[0], pair[1])
    }

    pub fn to_lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// Check if the coordinates are finite and in range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinates {
        Coordinates::new(
            (self.min_lng + self.max_lng) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }
}

/// An ordered route polyline.
///
/// May hold fewer than two points or invalid coordinates; such routes are
/// accepted here and rejected where a projection is attempted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    points: Vec<Coordinates>,
}

impl Route {
    pub fn new(points: Vec<Coordinates>) -> Self {
        Self { points }
    }

    /// Build a route from GeoJSON-style `[lng, lat]` pairs.
    pub fn from_lng_lat(pairs: &[[f64; 2]]) -> Self {
        Self::new(pairs.iter().copied().map(Coordinates::from_lng_lat).collect())
    }

    pub fn points(&self) -> &[Coordinates] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<Coordinates>> for Route {
    fn from(points: Vec<Coordinates>) -> Self {
        Self::new(points)
    }
}
