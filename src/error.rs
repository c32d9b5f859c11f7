//! Error types for route tracking.

use thiserror::Error;

/// Errors raised by the geometric and session layers of the tracker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// A route needs at least two points to be projected onto.
    #[error("invalid route: {points} point(s), at least 2 required")]
    InvalidRoute { points: usize },

    /// A coordinate was non-finite or outside the WGS84 range.
    #[error("invalid coordinates: lng={longitude}, lat={latitude}")]
    InvalidCoordinates { longitude: f64, latitude: f64 },

    /// A navigation session was started outside of a tokio runtime.
    #[error("navigation session requires a tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, TrackingError>;
