//! Active navigation session.
//!
//! Wires the pieces together for one navigation run:
//!
//! 1. Accepted positions (from [`NavigationSession::attach`] or pushed
//!    directly with [`NavigationSession::handle_position`]) are projected
//!    onto the active route to produce a [`RouteProgress`].
//! 2. The [`RecalculationPolicy`] decides whether the deviation warrants a
//!    new route; if so, one request is spawned on the tokio runtime with a
//!    timeout.
//! 3. The display position (snapped onto the route while on it, raw
//!    otherwise) becomes the interpolator's target; the host drives the
//!    glide with [`NavigationSession::on_frame`].
//!
//! Two time bases are involved. Cooldowns are measured on fix capture
//! timestamps. Glides are timed from the moment a position is handled, read
//! from the session [`Clock`]; frame timestamps must come from that same
//! clock.
//!
//! All mutable session state sits behind a single lock. Each update reads
//! the active route once, so a route replacement racing a position update
//! never mixes two routes in one snapshot. Stopping the session bumps a
//! generation counter and aborts the in-flight request; a response that
//! still arrives afterwards is discarded.
//!
//! Events are delivered to the host callback, and re-route requests are
//! built by the provider, after the lock is released.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackingError};
use crate::interpolation::{FrameId, FrameScheduler, PositionInterpolator};
use crate::location::{watch_position, EnrichedPosition, LocationError, LocationSource, Subscription};
use crate::progress::{display_position, RouteProgress, TrackedRoute};
use crate::recalculation::{RecalculationPolicy, RecalculationState, RecalculationTicket};
use crate::routing::{RouteProvider, RouteRequest, RouteResponse, RoutingError};
use crate::{Coordinates, Route};

/// Something the display layer should know about.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent {
    /// New progress snapshot
    Progress(RouteProgress),
    /// A re-route request was sent
    RecalculationStarted { origin: Coordinates },
    /// The active route was replaced by a recalculated one
    RouteReplaced {
        total_distance: f64,
        duration: f64,
        warnings: Vec<String>,
    },
    /// A re-route request failed; the previous route stays active
    RecalculationFailed(RoutingError),
    /// The location source reported a problem; the watch continues
    LocationError(LocationError),
    Stopped,
}

/// Host callback for [`NavigationEvent`]s.
pub type EventCallback = Arc<dyn Fn(NavigationEvent) + Send + Sync>;

/// Monotonic milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Milliseconds since the clock was created.
pub fn monotonic_clock() -> Clock {
    let origin = Instant::now();
    Arc::new(move || u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX))
}

/// Where the traveler is going.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTarget {
    pub destination: Coordinates,
    /// Event whose closures re-routes must avoid
    pub event_slug: Option<String>,
}

struct SessionState {
    active: bool,
    generation: u64,
    route: Arc<TrackedRoute>,
    route_duration_s: Option<f64>,
    policy: RecalculationPolicy,
    last_position: Option<EnrichedPosition>,
    last_progress: Option<RouteProgress>,
    in_flight: Option<AbortHandle>,
    interpolator: PositionInterpolator<Box<dyn FrameScheduler + Send>>,
    clock: Clock,
    subscription: Option<Subscription>,
}

struct Inner {
    config: TrackerConfig,
    target: NavigationTarget,
    provider: Arc<dyn RouteProvider>,
    runtime: Handle,
    on_event: EventCallback,
    state: Mutex<SessionState>,
}

/// Handle to a running navigation session. Cheap to clone.
#[derive(Clone)]
pub struct NavigationSession {
    inner: Arc<Inner>,
}

impl NavigationSession {
    /// Start navigating along `route`.
    ///
    /// Must be called from within a tokio runtime; re-route requests are
    /// spawned onto it.
    pub fn start(
        route: Route,
        target: NavigationTarget,
        provider: Arc<dyn RouteProvider>,
        scheduler: Box<dyn FrameScheduler + Send>,
        config: TrackerConfig,
        on_event: EventCallback,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| TrackingError::NoRuntime)?;

        let tracked = TrackedRoute::new(route);
        info!(
            "[NavigationSession] Started: {} points, {:.0}m to ({:.5}, {:.5})",
            tracked.route().len(),
            tracked.total_distance(),
            target.destination.longitude,
            target.destination.latitude
        );

        let state = SessionState {
            active: true,
            generation: 0,
            route: Arc::new(tracked),
            route_duration_s: None,
            policy: RecalculationPolicy::new(config.recalculation.clone()),
            last_position: None,
            last_progress: None,
            in_flight: None,
            interpolator: PositionInterpolator::new(scheduler, config.interpolation.clone()),
            clock: monotonic_clock(),
            subscription: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                target,
                provider,
                runtime,
                on_event,
                state: Mutex::new(state),
            }),
        })
    }

    /// Start navigating along a route returned by the backend.
    pub fn start_with_response(
        response: &RouteResponse,
        target: NavigationTarget,
        provider: Arc<dyn RouteProvider>,
        scheduler: Box<dyn FrameScheduler + Send>,
        config: TrackerConfig,
        on_event: EventCallback,
    ) -> Result<Self> {
        let session = Self::start(response.route(), target, provider, scheduler, config, on_event)?;
        session.inner.lock().route_duration_s = Some(response.duration);
        Ok(session)
    }

    /// Replace the clock glides are timed with. Defaults to
    /// [`monotonic_clock`] started with the session.
    pub fn set_clock(&self, clock: Clock) {
        self.inner.lock().clock = clock;
    }

    /// Current time on the session clock.
    pub fn now_ms(&self) -> u64 {
        let clock = Arc::clone(&self.inner.lock().clock);
        clock()
    }

    /// Feed positions from `source` through the position filter.
    ///
    /// Each accepted position is handled at the session clock's current
    /// time. Replaces any previously attached source.
    pub fn attach<S: LocationSource + ?Sized>(&self, source: &S) {
        let on_position = {
            let session = self.clone();
            move |position| {
                let now_ms = session.now_ms();
                session.handle_position(position, now_ms);
            }
        };
        let on_error = {
            let inner = Arc::clone(&self.inner);
            move |error| inner.emit(vec![NavigationEvent::LocationError(error)])
        };

        let subscription = watch_position(source, self.inner.config.filter.clone(), on_position, on_error);

        let previous = {
            let mut state = self.inner.lock();
            if !state.active {
                drop(state);
                subscription.cancel();
                return;
            }
            state.subscription.replace(subscription)
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Process one accepted position, handled at `now_ms` on the session
    /// clock.
    ///
    /// Returns the new progress, or `None` if it could not be computed (the
    /// previous snapshot stays available from [`Self::last_progress`]).
    pub fn handle_position(&self, position: EnrichedPosition, now_ms: u64) -> Option<RouteProgress> {
        let mut events = Vec::new();

        let (progress, recalculation) = {
            let mut state = self.inner.lock();
            if !state.active {
                return None;
            }

            // One read of the active route per update
            let route = Arc::clone(&state.route);
            let progress = route.progress(&position.coordinates, &self.inner.config.progress);

            state.last_position = Some(position);
            let shown = display_position(progress.as_ref(), position.coordinates);
            state.interpolator.set_target(Some(shown), now_ms);

            let mut recalculation = None;
            if let Some(progress) = progress {
                state.last_progress = Some(progress);
                events.push(NavigationEvent::Progress(progress));

                if let Some(ticket) = state.policy.evaluate(&progress, position.timestamp_ms) {
                    recalculation = Some((ticket, state.generation));
                }
            }

            (progress, recalculation)
        };

        if let Some((ticket, generation)) = recalculation {
            self.spawn_recalculation(ticket, generation, position.coordinates);
            events.push(NavigationEvent::RecalculationStarted { origin: position.coordinates });
        }

        self.inner.emit(events);
        progress
    }

    /// Advance the position glide for a fired display frame.
    pub fn on_frame(&self, frame: FrameId, now_ms: u64) -> Option<Coordinates> {
        self.inner.lock().interpolator.on_frame(frame, now_ms)
    }

    /// Currently displayed (interpolated) position.
    pub fn displayed_position(&self) -> Option<Coordinates> {
        self.inner.lock().interpolator.displayed()
    }

    /// Replace the active route, e.g. after the host recomputed it itself.
    pub fn replace_route(&self, route: Route) -> Option<RouteProgress> {
        let mut events = Vec::new();
        let progress = {
            let mut state = self.inner.lock();
            if !state.active {
                return None;
            }
            state.route_duration_s = None;
            install_route(&mut state, TrackedRoute::new(route), &self.inner.config, &mut events)
        };
        self.inner.emit(events);
        progress
    }

    /// The active route.
    pub fn current_route(&self) -> Arc<TrackedRoute> {
        Arc::clone(&self.inner.lock().route)
    }

    /// Backend duration estimate for the active route, in seconds.
    pub fn route_duration(&self) -> Option<f64> {
        self.inner.lock().route_duration_s
    }

    /// Last successfully computed progress.
    pub fn last_progress(&self) -> Option<RouteProgress> {
        self.inner.lock().last_progress
    }

    pub fn recalculation_state(&self) -> RecalculationState {
        *self.inner.lock().policy.state()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Stop navigating.
    ///
    /// Cancels the location watch, clears the displayed position and drops
    /// interest in any outstanding re-route. Idempotent.
    pub fn stop(&self) {
        let subscription = {
            let mut state = self.inner.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.generation += 1;
            if let Some(handle) = state.in_flight.take() {
                handle.abort();
            }
            state.interpolator.set_target(None, 0);
            state.subscription.take()
        };

        if let Some(subscription) = subscription {
            subscription.cancel();
        }

        info!("[NavigationSession] Stopped");
        self.inner.emit(vec![NavigationEvent::Stopped]);
    }

    /// Must be called without the state lock held.
    fn spawn_recalculation(&self, ticket: RecalculationTicket, generation: u64, origin: Coordinates) {
        let request = RouteRequest {
            origin,
            destination: self.inner.target.destination,
            profile: self.inner.config.profile,
            event_slug: self.inner.target.event_slug.clone(),
        };

        let timeout = Duration::from_millis(self.inner.config.recalculation.request_timeout_ms);
        let request_future = self.inner.provider.calculate_route(request);
        let inner = Arc::clone(&self.inner);

        let handle = self.inner.runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, request_future).await {
                Ok(result) => result,
                Err(_) => Err(RoutingError::Timeout),
            };
            inner.finish_recalculation(generation, ticket, result);
        });

        let mut state = self.inner.lock();
        if state.active && state.generation == generation {
            state.in_flight = Some(handle.abort_handle());
        } else {
            // Stopped while the request was being built
            handle.abort();
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, events: Vec<NavigationEvent>) {
        for event in events {
            (self.on_event)(event);
        }
    }

    fn finish_recalculation(
        &self,
        generation: u64,
        ticket: RecalculationTicket,
        result: std::result::Result<RouteResponse, RoutingError>,
    ) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if !state.active || state.generation != generation {
                debug!("[NavigationSession] Discarding re-route response for a stopped session");
                return;
            }
            if !state.policy.complete(&ticket) {
                return;
            }
            state.in_flight = None;

            match result {
                Ok(response) => {
                    let tracked = TrackedRoute::new(response.route());
                    if tracked.is_trackable() {
                        info!(
                            "[NavigationSession] Route replaced: {:.0}m, {:.0}s",
                            response.distance, response.duration
                        );
                        state.route_duration_s = Some(response.duration);
                        install_route(&mut state, tracked, &self.config, &mut events);
                        events.push(NavigationEvent::RouteReplaced {
                            total_distance: state.route.total_distance(),
                            duration: response.duration,
                            warnings: response.warnings,
                        });
                    } else {
                        let error = RoutingError::InvalidResponse("route geometry has fewer than 2 valid points".to_string());
                        warn!("[NavigationSession] Re-route failed, keeping current route: {}", error);
                        events.push(NavigationEvent::RecalculationFailed(error));
                    }
                }
                Err(error) => {
                    if error.is_rate_limited() {
                        warn!(
                            "[NavigationSession] Re-route rate limited, next attempt after {}ms cooldown",
                            self.config.recalculation.cooldown_ms
                        );
                    } else {
                        warn!("[NavigationSession] Re-route failed, keeping current route: {}", error);
                    }
                    events.push(NavigationEvent::RecalculationFailed(error));
                }
            }
        }
        self.emit(events);
    }
}

/// Swap in a new active route and recompute progress for the last known
/// position against it.
fn install_route(
    state: &mut SessionState,
    route: TrackedRoute,
    config: &TrackerConfig,
    events: &mut Vec<NavigationEvent>,
) -> Option<RouteProgress> {
    state.route = Arc::new(route);

    let position = state.last_position?;
    let progress = state.route.progress(&position.coordinates, &config.progress);
    if let Some(progress) = progress {
        state.last_progress = Some(progress);
        events.push(NavigationEvent::Progress(progress));
    }
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::tests::RecordingScheduler;
    use crate::location::tests::ManualSource;
    use crate::routing::LineStringGeometry;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Provider whose responses are held until the test releases them.
    struct GatedProvider {
        calls: AtomicUsize,
        requests: Mutex<Vec<RouteRequest>>,
        gate: Arc<Notify>,
        result: Mutex<std::result::Result<RouteResponse, RoutingError>>,
    }

    impl GatedProvider {
        fn new(result: std::result::Result<RouteResponse, RoutingError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                gate: Arc::new(Notify::new()),
                result: Mutex::new(result),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn release(&self) {
            self.gate.notify_one();
        }
    }

    impl RouteProvider for GatedProvider {
        fn calculate_route(&self, request: RouteRequest) -> BoxFuture<'static, std::result::Result<RouteResponse, RoutingError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            let gate = Arc::clone(&self.gate);
            let result = self.result.lock().unwrap().clone();
            Box::pin(async move {
                gate.notified().await;
                result
            })
        }
    }

    /// Provider that reads session state while building its request.
    #[derive(Default)]
    struct ReentrantProvider {
        session: Mutex<Option<NavigationSession>>,
        observed: Mutex<Option<RecalculationState>>,
    }

    impl RouteProvider for ReentrantProvider {
        fn calculate_route(&self, _request: RouteRequest) -> BoxFuture<'static, std::result::Result<RouteResponse, RoutingError>> {
            let session = self.session.lock().unwrap().clone();
            if let Some(session) = session {
                let _ = session.current_route();
                *self.observed.lock().unwrap() = Some(session.recalculation_state());
            }
            Box::pin(futures::future::pending())
        }
    }

    fn detour_response() -> RouteResponse {
        RouteResponse {
            distance: 1500.0,
            duration: 240.0,
            geometry: LineStringGeometry {
                kind: "LineString".to_string(),
                coordinates: vec![[0.001, 0.005], [0.001, 0.01], [0.0, 0.01]],
            },
            steps: Vec::new(),
            warnings: vec!["Closure ahead".to_string()],
        }
    }

    fn position(lng: f64, lat: f64, t: u64) -> EnrichedPosition {
        EnrichedPosition {
            coordinates: Coordinates::new(lng, lat),
            accuracy: 5.0,
            heading: None,
            speed: None,
            timestamp_ms: t,
            distance_from_previous: None,
        }
    }

    fn start(provider: Arc<dyn RouteProvider>) -> (NavigationSession, Arc<Mutex<Vec<NavigationEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let session = NavigationSession::start(
            Route::from_lng_lat(&[[0.0, 0.0], [0.0, 0.01]]),
            NavigationTarget {
                destination: Coordinates::new(0.0, 0.01),
                event_slug: Some("city-marathon".to_string()),
            },
            provider,
            Box::new(RecordingScheduler::default()),
            TrackerConfig::default(),
            Arc::new(move |event| sink.lock().unwrap().push(event)),
        )
        .unwrap();
        (session, events)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = NavigationSession::start(
            Route::from_lng_lat(&[[0.0, 0.0], [0.0, 0.01]]),
            NavigationTarget { destination: Coordinates::new(0.0, 0.01), event_slug: None },
            GatedProvider::new(Err(RoutingError::Timeout)),
            Box::new(RecordingScheduler::default()),
            TrackerConfig::default(),
            Arc::new(|_| {}),
        );
        assert!(matches!(result, Err(TrackingError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_on_route_position_reports_progress() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, events) = start(provider.clone());

        let progress = session.handle_position(position(0.0, 0.005, 0), 0).unwrap();
        assert!((progress.percent_complete - 50.0).abs() < 0.01);
        assert_eq!(provider.calls(), 0);
        assert_eq!(session.displayed_position(), Some(progress.snapped_position));
        assert!(matches!(events.lock().unwrap()[0], NavigationEvent::Progress(_)));
    }

    #[tokio::test]
    async fn test_deviation_replaces_route() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, events) = start(provider.clone());

        session.handle_position(position(0.001, 0.005, 0), 0);
        assert_eq!(provider.calls(), 1);
        assert!(session.recalculation_state().is_recalculating);

        let request = provider.requests.lock().unwrap()[0].clone();
        assert_eq!(request.origin, Coordinates::new(0.001, 0.005));
        assert_eq!(request.destination, Coordinates::new(0.0, 0.01));
        assert_eq!(request.event_slug.as_deref(), Some("city-marathon"));

        provider.release();
        settle().await;

        assert!(!session.recalculation_state().is_recalculating);
        assert_eq!(session.current_route().route().len(), 3);
        assert_eq!(session.route_duration(), Some(240.0));

        // Progress recomputed against the new route: now on it, at its start
        let progress = session.last_progress().unwrap();
        assert!(progress.is_on_route);
        assert!(progress.percent_complete < 1.0);

        let events = events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, NavigationEvent::RouteReplaced { .. })));
    }

    #[tokio::test]
    async fn test_single_flight_while_pending() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, _events) = start(provider.clone());

        session.handle_position(position(0.001, 0.005, 0), 0);
        session.handle_position(position(0.0012, 0.006, 100), 100);
        session.handle_position(position(0.0014, 0.007, 30_000), 30_000);

        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_route_and_cooldown() {
        let provider = GatedProvider::new(Err(RoutingError::RateLimited));
        let (session, events) = start(provider.clone());
        let original = session.current_route();

        session.handle_position(position(0.001, 0.005, 1_000), 1_000);
        provider.release();
        settle().await;

        assert!(!session.recalculation_state().is_recalculating);
        assert!(Arc::ptr_eq(&original, &session.current_route()));
        assert!(events
            .lock()
            .unwrap()
            .contains(&NavigationEvent::RecalculationFailed(RoutingError::RateLimited)));

        session.handle_position(position(0.001, 0.006, 5_000), 5_000);
        assert_eq!(provider.calls(), 1);
        session.handle_position(position(0.001, 0.007, 9_000), 9_000);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_clears_in_flight() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, events) = start(provider.clone());

        session.handle_position(position(0.001, 0.005, 0), 0);
        assert!(session.recalculation_state().is_recalculating);

        // Never released: the request times out
        tokio::time::sleep(Duration::from_millis(15_001)).await;
        settle().await;

        assert!(!session.recalculation_state().is_recalculating);
        assert!(events
            .lock()
            .unwrap()
            .contains(&NavigationEvent::RecalculationFailed(RoutingError::Timeout)));
    }

    #[tokio::test]
    async fn test_late_response_after_stop_is_discarded() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, events) = start(provider.clone());
        let original = session.current_route();

        session.handle_position(position(0.001, 0.005, 0), 0);
        session.stop();
        provider.release();
        settle().await;

        assert!(!session.is_active());
        assert!(Arc::ptr_eq(&original, &session.current_route()));
        assert_eq!(session.displayed_position(), None);
        assert!(session.handle_position(position(0.0, 0.005, 20_000), 20_000).is_none());

        let events = events.lock().unwrap();
        assert!(!events.iter().any(|e| matches!(e, NavigationEvent::RouteReplaced { .. })));
        assert_eq!(events.last(), Some(&NavigationEvent::Stopped));
    }

    #[tokio::test]
    async fn test_attach_and_stop_cancel_the_watch() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, events) = start(provider.clone());
        let source = ManualSource::default();

        session.attach(&source);
        source.fix(0.0, 0.002, 5.0, 0);
        source.emit(crate::location::LocationEvent::Error(LocationError::Timeout));
        assert!(session.last_progress().is_some());

        session.stop();
        session.stop();
        assert_eq!(source.stops.load(Ordering::SeqCst), 1);

        source.fix(0.0, 0.008, 5.0, 10_000);
        let progress = session.last_progress().unwrap();
        assert!(progress.percent_complete < 25.0);

        let events = events.lock().unwrap();
        assert!(events.contains(&NavigationEvent::LocationError(LocationError::Timeout)));
        assert_eq!(events.iter().filter(|e| **e == NavigationEvent::Stopped).count(), 1);
    }

    #[tokio::test]
    async fn test_replace_route_resets_baseline() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, _events) = start(provider);

        session.handle_position(position(0.0, 0.008, 0), 0);
        assert!(session.last_progress().unwrap().percent_complete > 79.0);

        let progress = session
            .replace_route(Route::from_lng_lat(&[[0.0, 0.008], [0.0, 0.02]]))
            .unwrap();
        assert!(progress.percent_complete < 0.01);
    }

    #[tokio::test]
    async fn test_on_route_fix_displays_snapped_point() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, _events) = start(provider);

        // ~20m east of the line
        let progress = session.handle_position(position(0.00018, 0.005, 0), 0).unwrap();
        assert!(progress.is_on_route);
        assert_eq!(session.displayed_position(), Some(progress.snapped_position));

        // Off route the raw position is the glide target
        let progress = session.handle_position(position(0.002, 0.006, 3000), 3000).unwrap();
        assert!(!progress.is_on_route);
        assert_eq!(session.on_frame(FrameId(1), 4000), Some(Coordinates::new(0.002, 0.006)));
    }

    #[tokio::test]
    async fn test_glide_timed_from_handling_not_capture() {
        let provider = GatedProvider::new(Ok(detour_response()));
        let (session, _events) = start(provider);
        let now = Arc::new(AtomicU64::new(0));
        let clock = Arc::clone(&now);
        session.set_clock(Arc::new(move || clock.load(Ordering::SeqCst)));
        let source = ManualSource::default();
        session.attach(&source);

        source.fix(0.0, 0.001, 5.0, 0);
        // Captured at 2000ms, delivered 900ms later
        now.store(2900, Ordering::SeqCst);
        source.fix(0.0, 0.002, 5.0, 2000);

        // The first fix was shown without a frame; this is the glide's first
        let shown = session.on_frame(FrameId(1), 2916).unwrap();
        let fraction = (shown.latitude - 0.001) / 0.001;
        assert!(fraction > 0.0 && fraction < 0.05, "fraction {}", fraction);
    }

    #[tokio::test]
    async fn test_provider_may_read_session_state() {
        let provider = Arc::new(ReentrantProvider::default());
        let (session, _events) = start(provider.clone());
        *provider.session.lock().unwrap() = Some(session.clone());

        session.handle_position(position(0.001, 0.005, 0), 0);

        let observed = provider.observed.lock().unwrap().take().unwrap();
        assert!(observed.is_recalculating);
        assert_eq!(observed.last_recalculate_ms, Some(0));
        session.stop();
    }
}
