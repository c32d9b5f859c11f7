//! End-to-end navigation scenarios through the public API.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use route_tracker::location::{CancelFn, LocationHandler};
use route_tracker::routing::LineStringGeometry;
use route_tracker::{
    calculate_progress, Coordinates, FrameId, FrameScheduler, LocationEvent, LocationSource,
    NavigationEvent, NavigationSession, NavigationTarget, ProgressConfig, RawFix, Route,
    RouteProvider, RouteRequest, RouteResponse, RoutingError, TrackedRoute, TrackerConfig,
};

type RouteResult = Result<RouteResponse, RoutingError>;

/// Provider whose requests stay pending until the test answers them.
#[derive(Default)]
struct PendingProvider {
    calls: AtomicUsize,
    pending: Mutex<Vec<oneshot::Sender<RouteResult>>>,
}

impl PendingProvider {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Answer the oldest pending request.
    fn answer(&self, result: RouteResult) {
        let sender = self.pending.lock().unwrap().remove(0);
        let _ = sender.send(result);
    }
}

impl RouteProvider for PendingProvider {
    fn calculate_route(&self, _request: RouteRequest) -> BoxFuture<'static, RouteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push(tx);
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(RoutingError::Network("request dropped".to_string())))
        })
    }
}

/// Location source driven by the test.
#[derive(Clone, Default)]
struct ScriptedSource {
    handler: Arc<Mutex<Option<LocationHandler>>>,
}

impl ScriptedSource {
    fn fix(&self, lng: f64, lat: f64, t: u64) {
        let fix = RawFix::new(Coordinates::new(lng, lat), 5.0, t);
        if let Some(handler) = self.handler.lock().unwrap().as_mut() {
            handler(LocationEvent::Fix(fix));
        }
    }
}

impl LocationSource for ScriptedSource {
    fn subscribe(&self, handler: LocationHandler) -> CancelFn {
        *self.handler.lock().unwrap() = Some(handler);
        let handler = Arc::clone(&self.handler);
        Box::new(move || {
            handler.lock().unwrap().take();
        })
    }
}

/// Scheduler that records frames for the test to fire.
#[derive(Clone, Default)]
struct SharedScheduler {
    next: u64,
    frames: Arc<Mutex<Vec<FrameId>>>,
}

impl SharedScheduler {
    fn take(&self) -> Option<FrameId> {
        self.frames.lock().unwrap().pop()
    }
}

impl FrameScheduler for SharedScheduler {
    fn request_frame(&mut self) -> FrameId {
        self.next += 1;
        let id = FrameId(self.next);
        self.frames.lock().unwrap().push(id);
        id
    }

    fn cancel_frame(&mut self, id: FrameId) {
        self.frames.lock().unwrap().retain(|f| *f != id);
    }
}

fn north_route() -> Route {
    Route::from_lng_lat(&[[0.0, 0.0], [0.0, 0.01]])
}

fn target() -> NavigationTarget {
    NavigationTarget {
        destination: Coordinates::new(0.0, 0.01),
        event_slug: None,
    }
}

fn recorder() -> (Arc<Mutex<Vec<NavigationEvent>>>, route_tracker::EventCallback) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, Arc::new(move |event| sink.lock().unwrap().push(event)))
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn scenario_halfway_along_straight_route() {
    let route = TrackedRoute::new(north_route());
    let here = Coordinates::new(0.0, 0.005);

    let progress = calculate_progress(Some(&here), Some(&route), &ProgressConfig::default()).unwrap();

    assert!((progress.percent_complete - 50.0).abs() < 0.01);
    assert!(progress.is_on_route);
    assert!(progress.deviation_distance < 1e-6);
    assert!((progress.total_distance - 1112.0).abs() < 5.0);
}

#[test]
fn scenario_east_of_route_is_off_route() {
    let route = TrackedRoute::new(north_route());
    let here = Coordinates::new(0.001, 0.005);

    let progress = calculate_progress(Some(&here), Some(&route), &ProgressConfig::default()).unwrap();

    assert!(!progress.is_on_route);
    assert!((progress.deviation_distance - 111.0).abs() < 111.0 * 0.03);
    assert!((progress.percent_complete - 50.0).abs() < 0.1);
}

#[tokio::test]
async fn scenario_single_flight_then_cooldown() {
    let provider = Arc::new(PendingProvider::default());
    let (events, on_event) = recorder();
    let config = TrackerConfig::from_json(r#"{"filter": {"update_interval_ms": 0, "min_distance": 0.0}}"#).unwrap();

    let session = NavigationSession::start(
        north_route(),
        target(),
        provider.clone(),
        Box::new(SharedScheduler::default()),
        config,
        on_event,
    )
    .unwrap();
    let source = ScriptedSource::default();
    session.attach(&source);

    // On route: no request
    source.fix(0.0, 0.001, 0);
    assert_eq!(provider.calls(), 0);

    // First deviation: request sent immediately
    source.fix(0.001, 0.002, 50);
    assert_eq!(provider.calls(), 1);

    // Still deviating while that request is pending
    source.fix(0.0011, 0.0021, 100);
    assert_eq!(provider.calls(), 1);

    provider.answer(Err(RoutingError::NoPathFound));
    settle().await;
    assert!(!session.recalculation_state().is_recalculating);

    // Inside the cooldown
    source.fix(0.0012, 0.0022, 4000);
    assert_eq!(provider.calls(), 1);

    // Cooldown elapsed, nothing pending
    source.fix(0.0013, 0.0023, 9000);
    assert_eq!(provider.calls(), 2);

    let events = events.lock().unwrap();
    let started = events
        .iter()
        .filter(|e| matches!(e, NavigationEvent::RecalculationStarted { .. }))
        .count();
    assert_eq!(started, 2);
    assert!(events.contains(&NavigationEvent::RecalculationFailed(RoutingError::NoPathFound)));
}

#[tokio::test]
async fn scenario_reroute_replaces_route_and_progress_follows() {
    let provider = Arc::new(PendingProvider::default());
    let (events, on_event) = recorder();

    let session = NavigationSession::start(
        north_route(),
        target(),
        provider.clone(),
        Box::new(SharedScheduler::default()),
        TrackerConfig::default(),
        on_event,
    )
    .unwrap();
    let source = ScriptedSource::default();
    session.attach(&source);

    source.fix(0.002, 0.005, 0);
    assert_eq!(provider.calls(), 1);

    provider.answer(Ok(RouteResponse {
        distance: 900.0,
        duration: 180.0,
        geometry: LineStringGeometry {
            kind: "LineString".to_string(),
            coordinates: vec![[0.002, 0.005], [0.002, 0.01], [0.0, 0.01]],
        },
        steps: Vec::new(),
        warnings: Vec::new(),
    }));
    settle().await;

    assert_eq!(session.current_route().route().len(), 3);
    assert!(session.last_progress().unwrap().is_on_route);

    // Later fixes are measured against the new route
    source.fix(0.002, 0.0075, 3000);
    let progress = session.last_progress().unwrap();
    assert!(progress.is_on_route);
    assert!(progress.distance_traveled > 250.0 && progress.distance_traveled < 300.0);
    assert_eq!(provider.calls(), 1);

    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, NavigationEvent::RouteReplaced { duration, .. } if *duration == 180.0)));
}

#[tokio::test]
async fn scenario_displayed_position_glides_between_fixes() {
    let provider = Arc::new(PendingProvider::default());
    let scheduler = SharedScheduler::default();
    let (_events, on_event) = recorder();

    let session = NavigationSession::start(
        north_route(),
        target(),
        provider,
        Box::new(scheduler.clone()),
        TrackerConfig::default(),
        on_event,
    )
    .unwrap();
    let now = Arc::new(AtomicU64::new(0));
    let clock = Arc::clone(&now);
    session.set_clock(Arc::new(move || clock.load(Ordering::SeqCst)));
    let source = ScriptedSource::default();
    session.attach(&source);

    // First fix is shown at once, snapped onto the route
    source.fix(0.0, 0.001, 0);
    let first = session.last_progress().unwrap().snapped_position;
    assert_eq!(session.displayed_position(), Some(first));
    assert!((first.latitude - 0.001).abs() < 1e-9);

    // Fixes inside the sampling interval are filtered out
    now.store(500, Ordering::SeqCst);
    source.fix(0.0, 0.0015, 500);
    assert!(scheduler.take().is_none());

    now.store(2000, Ordering::SeqCst);
    source.fix(0.0, 0.002, 2000);
    let second = session.last_progress().unwrap().snapped_position;
    let frame = scheduler.take().unwrap();
    let halfway = session.on_frame(frame, 2500).unwrap();
    assert!((halfway.latitude - 0.0015).abs() < 1e-6);

    let frame = scheduler.take().unwrap();
    assert_eq!(session.on_frame(frame, 3000), Some(second));
    assert!(scheduler.take().is_none());

    session.stop();
    assert_eq!(session.displayed_position(), None);
    source.fix(0.0, 0.003, 6000);
    assert!(session.last_progress().unwrap().percent_complete < 25.0);
}
