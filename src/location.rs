//! Position filtering and sampling.
//!
//! Turns a raw, noisy, high-frequency location stream into a rate-limited
//! stream of accepted positions. A fix is accepted only when it is accurate
//! enough, enough time has passed since the last accepted fix, and the
//! device has moved far enough from it.
//!
//! The platform location service is abstracted as a push subscription
//! ([`LocationSource`]) so the filter can be driven by synthetic sources in
//! tests and by any platform binding in production.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo_utils::haversine_distance;
use crate::Coordinates;

/// A single sample from the platform location service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFix {
    pub coordinates: Coordinates,
    /// Horizontal accuracy radius in meters
    pub accuracy: f64,
    /// Heading in degrees (0-360), if the platform reports one
    pub heading: Option<f64>,
    /// Ground speed in m/s, if the platform reports one
    pub speed: Option<f64>,
    /// Capture time, monotonic milliseconds
    pub timestamp_ms: u64,
}

impl RawFix {
    pub fn new(coordinates: Coordinates, accuracy: f64, timestamp_ms: u64) -> Self {
        Self { coordinates, accuracy, heading: None, speed: None, timestamp_ms }
    }
}

/// An accepted fix, as delivered to watchers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPosition {
    pub coordinates: Coordinates,
    pub accuracy: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp_ms: u64,
    /// Great-circle distance from the previously accepted fix (None for the first)
    pub distance_from_previous: Option<f64>,
}

/// Non-fatal location service failures.
///
/// None of these end a watch; the platform may recover and resume
/// delivering fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("location request timed out")]
    Timeout,
}

/// Event pushed by a [`LocationSource`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationEvent {
    Fix(RawFix),
    Error(LocationError),
}

/// Configuration for the position filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Fixes with an accuracy radius above this are dropped (meters).
    /// Default: 50.0
    pub min_accuracy: f64,

    /// Minimum movement from the last accepted fix (meters).
    /// Default: 5.0
    pub min_distance: f64,

    /// Minimum time between accepted fixes (milliseconds).
    /// Default: 2000
    pub update_interval_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_accuracy: 50.0,
            min_distance: 5.0,
            update_interval_ms: 2000,
        }
    }
}

/// Why a fix was dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    InvalidCoordinates,
    LowAccuracy { accuracy: f64 },
    TooSoon { elapsed_ms: u64 },
    TooClose { distance: f64 },
}

/// Outcome of offering one fix to the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOutcome {
    Accepted(EnrichedPosition),
    Rejected(Rejection),
}

/// Stateful accuracy/time/distance filter.
#[derive(Debug, Clone)]
pub struct PositionFilter {
    config: FilterConfig,
    last_accepted: Option<RawFix>,
}

impl PositionFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config, last_accepted: None }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn last_accepted(&self) -> Option<&RawFix> {
        self.last_accepted.as_ref()
    }

    /// Forget the last accepted fix; the next valid fix is accepted as a first fix.
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }

    /// Offer a fix. Accepted fixes become the new reference point.
    pub fn offer(&mut self, fix: &RawFix) -> FilterOutcome {
        match self.evaluate(fix) {
            Ok(distance_from_previous) => {
                self.last_accepted = Some(*fix);
                debug!(
                    "[PositionFilter] Accepted fix @{}ms ({:.5}, {:.5}) acc={:.1}m",
                    fix.timestamp_ms, fix.coordinates.longitude, fix.coordinates.latitude, fix.accuracy
                );
                FilterOutcome::Accepted(EnrichedPosition {
                    coordinates: fix.coordinates,
                    accuracy: fix.accuracy,
                    heading: fix.heading,
                    speed: fix.speed,
                    timestamp_ms: fix.timestamp_ms,
                    distance_from_previous,
                })
            }
            Err(rejection) => {
                debug!("[PositionFilter] Rejected fix @{}ms: {:?}", fix.timestamp_ms, rejection);
                FilterOutcome::Rejected(rejection)
            }
        }
    }

    fn evaluate(&self, fix: &RawFix) -> Result<Option<f64>, Rejection> {
        if !fix.coordinates.is_valid() || !fix.accuracy.is_finite() {
            return Err(Rejection::InvalidCoordinates);
        }

        if fix.accuracy > self.config.min_accuracy {
            return Err(Rejection::LowAccuracy { accuracy: fix.accuracy });
        }

        let Some(last) = &self.last_accepted else {
            return Ok(None);
        };

        let elapsed_ms = fix.timestamp_ms.saturating_sub(last.timestamp_ms);
        if elapsed_ms < self.config.update_interval_ms {
            return Err(Rejection::TooSoon { elapsed_ms });
        }

        let distance = haversine_distance(&last.coordinates, &fix.coordinates);
        if distance < self.config.min_distance {
            return Err(Rejection::TooClose { distance });
        }

        Ok(Some(distance))
    }
}

// =============================================================================
// Push subscription
// =============================================================================

/// Handler receiving every event a source emits.
pub type LocationHandler = Box<dyn FnMut(LocationEvent) + Send + 'static>;

/// Stops the platform stream behind a subscription.
pub type CancelFn = Box<dyn FnOnce() + Send + 'static>;

/// A continuous location stream (platform geolocation watch, replay file,
/// simulator...).
pub trait LocationSource {
    /// Start pushing events to `handler`. The returned function stops the
    /// stream; it is called at most once.
    fn subscribe(&self, handler: LocationHandler) -> CancelFn;
}

/// Handle to a running watch.
///
/// Cancelling is idempotent. Dropping the handle cancels the watch.
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    stop: Mutex<Option<CancelFn>>,
}

impl Subscription {
    fn new(cancelled: Arc<AtomicBool>, stop: CancelFn) -> Self {
        Self { cancelled, stop: Mutex::new(Some(stop)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let stop = match self.stop.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(stop) = stop {
            debug!("[PositionFilter] Watch cancelled");
            stop();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Watch a location source through a [`PositionFilter`].
///
/// `on_position` receives accepted fixes only. `on_error` receives location
/// errors; the watch stays alive after them. Neither is invoked once the
/// returned subscription is cancelled, even for fixes already in flight.
pub fn watch_position<S, P, E>(
    source: &S,
    config: FilterConfig,
    mut on_position: P,
    mut on_error: E,
) -> Subscription
where
    S: LocationSource + ?Sized,
    P: FnMut(EnrichedPosition) + Send + 'static,
    E: FnMut(LocationError) + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let mut filter = PositionFilter::new(config);

    let handler: LocationHandler = Box::new(move |event| {
        if flag.load(Ordering::SeqCst) {
            return;
        }
        match event {
            LocationEvent::Fix(fix) => {
                if let FilterOutcome::Accepted(position) = filter.offer(&fix) {
                    if !flag.load(Ordering::SeqCst) {
                        on_position(position);
                    }
                }
            }
            LocationEvent::Error(error) => {
                warn!("[PositionFilter] Location error: {}", error);
                on_error(error);
            }
        }
    });

    let stop = source.subscribe(handler);
    Subscription::new(cancelled, stop)
}
