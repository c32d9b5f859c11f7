//! Routing backend contract.
//!
//! The tracker does not compute routes itself; it asks a routing backend for
//! one whenever the traveler strays from the current route. This module
//! holds the request/response payloads, the error taxonomy, and the
//! [`RouteProvider`] seam the navigation session calls through.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Coordinates, Route};

/// Routing engine error code for "no path could be found".
pub const NO_PATH_ERROR_CODE: i64 = 442;
/// Routing engine error code for an exclusion zone that is too large.
pub const ZONE_TOO_LARGE_ERROR_CODE: i64 = 171;

/// Travel mode requested from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelProfile {
    #[default]
    Driving,
    Walking,
    Cycling,
}

/// Request body for `POST /route`.
///
/// Coordinates travel as `[lng, lat]` arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    #[serde(with = "lng_lat")]
    pub origin: Coordinates,
    #[serde(with = "lng_lat")]
    pub destination: Coordinates,
    pub profile: TravelProfile,
    /// Event whose closures the backend must avoid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_slug: Option<String>,
}

/// GeoJSON LineString.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStringGeometry {
    #[serde(rename = "type", default = "line_string_type")]
    pub kind: String,
    pub coordinates: Vec<[f64; 2]>,
}

fn line_string_type() -> String {
    "LineString".to_string()
}

/// One maneuver of a computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub instruction: String,
    /// Meters
    pub distance: f64,
    /// Seconds
    pub duration: f64,
    #[serde(default)]
    pub geometry: Option<LineStringGeometry>,
}

/// Successful backend response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Meters
    pub distance: f64,
    /// Seconds
    pub duration: f64,
    pub geometry: LineStringGeometry,
    #[serde(default)]
    pub steps: Vec<RouteStep>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RouteResponse {
    /// The route polyline.
    pub fn route(&self) -> Route {
        Route::from_lng_lat(&self.geometry.coordinates)
    }
}

/// Failure to obtain a route. Never fatal to a navigation session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    /// Closures block every possible path
    #[error("no route found: closures block every path")]
    NoPathFound,

    #[error("avoided zone too large, reduce the closures")]
    ZoneTooLarge,

    /// HTTP 429. Callers back off; the re-route cooldown is not shortened.
    #[error("routing backend rate limit reached")]
    RateLimited,

    #[error("routing request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("routing backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    #[error("invalid routing response: {0}")]
    InvalidResponse(String),
}

/// Error body returned by the backend on failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RoutingError {
    /// Map a failed HTTP status and its (possibly empty) body onto an error.
    pub fn from_backend(status: u16, body: &BackendErrorBody) -> Self {
        if status == 429 {
            return RoutingError::RateLimited;
        }

        let no_path_text = body
            .error
            .as_deref()
            .map_or(false, |e| e.contains("No path could be found"));

        match body.error_code {
            Some(NO_PATH_ERROR_CODE) => RoutingError::NoPathFound,
            Some(ZONE_TOO_LARGE_ERROR_CODE) => RoutingError::ZoneTooLarge,
            _ if no_path_text => RoutingError::NoPathFound,
            _ => RoutingError::Backend {
                status,
                message: body
                    .message
                    .clone()
                    .or_else(|| body.error.clone())
                    .unwrap_or_else(|| "unable to compute route".to_string()),
            },
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RoutingError::RateLimited)
    }
}

/// Something that can compute a route.
///
/// The returned future must not borrow `self` so it can be spawned onto the
/// runtime and outlive the call.
pub trait RouteProvider: Send + Sync + 'static {
    fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, Result<RouteResponse, RoutingError>>;
}

/// `[lng, lat]` array representation of [`Coordinates`].
mod lng_lat {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::Coordinates;

    pub fn serialize<S: Serializer>(c: &Coordinates, serializer: S) -> Result<S::Ok, S::Error> {
        [c.longitude, c.latitude].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Coordinates, D::Error> {
        let [lng, lat] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Coordinates::new(lng, lat))
    }
}
