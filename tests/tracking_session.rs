pub mod test_utils;

use speedzone_core::geometry::Point;
use speedzone_core::tracking_session::{
    LocationUpdate, PermissionStatus, PositionFix, Tracker, TrackingError, TrackingSession,
    TrackingState,
};
use speedzone_core::tracking_session::{Notifier, SessionHandle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use test_utils::{fix, session_road_catalog, FakeLocationSource, RecordingNotifier};

const T0: i64 = 1_700_000_000_000;

const ENTERING_SESSION_ROAD: &str = "Now entering Session Road. Speed limit is 30 km/h.";
const OVERSPEEDING_30: &str = "Warning! You are overspeeding. Limit is 30 km/h.";

async fn wait_for_state(
    state_rx: &mut tokio::sync::watch::Receiver<TrackingState>,
    f: impl Fn(&TrackingState) -> bool,
) -> TrackingState {
    tokio::time::timeout(Duration::from_secs(5), state_rx.wait_for(|state| f(state)))
        .await
        .expect("timed out waiting for state")
        .unwrap()
        .clone()
}

// Alerts are delivered right after the state is published.
async fn wait_for_messages(notifier: &RecordingNotifier, count: usize) -> Vec<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let messages = notifier.messages();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for notifications")
}

#[test]
fn tracker_scenario() {
    let mut tracker = Tracker::new(session_road_catalog());
    let alerts = tracker
        .process_fix(&fix(120.595, 16.415, Some(50.), T0), 0)
        .unwrap();
    let messages: Vec<String> = alerts.iter().map(|x| x.message()).collect();
    assert_eq!(messages, vec![ENTERING_SESSION_ROAD, OVERSPEEDING_30]);

    let state = tracker.state();
    assert_eq!(state.current_road_name.as_deref(), Some("Session Road"));
    assert_eq!(state.current_speed_limit_kmh, 30.);
    assert_eq!(state.last_overspeed_alert_at_ms, Some(T0));
    assert!((state.last_computed_speed_kmh - 50.).abs() < 1e-9);

    let alerts = tracker
        .process_fix(&fix(120.595, 16.415, Some(50.), T0 + 2000), 0)
        .unwrap();
    assert!(alerts.is_empty());

    let alerts = tracker
        .process_fix(&fix(120.595, 16.415, Some(50.), T0 + 9000), 0)
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].message(), OVERSPEEDING_30);
}

#[test]
fn tracker_unknown_speed_and_timestamp() {
    let mut tracker = Tracker::new(session_road_catalog());
    let fix = PositionFix {
        point: Point::from_lon_lat(120.595, 16.415),
        speed_mps: None,
        timestamp_ms: None,
    };
    let alerts = tracker.process_fix(&fix, T0).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(tracker.state().last_computed_speed_kmh, 0.);
    assert_eq!(tracker.state().last_position, Some(fix.point));
}

#[test]
fn tracker_bad_fix_leaves_state() {
    let mut tracker = Tracker::new(session_road_catalog());
    tracker
        .process_fix(&fix(120.595, 16.415, Some(20.), T0), 0)
        .unwrap();
    let before = tracker.state().clone();
    assert!(tracker
        .process_fix(&fix(f64::NAN, 16.415, Some(20.), T0 + 1000), 0)
        .is_err());
    assert_eq!(tracker.state(), &before);
}

#[test]
fn start_outside_runtime() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let result = TrackingSession::start(
        &mut source,
        session_road_catalog(),
        Arc::new(RecordingNotifier::default()),
    );
    assert_eq!(result.err(), Some(TrackingError::NoRuntime));
}

#[tokio::test]
async fn permission_denied() {
    let mut source = FakeLocationSource::new(PermissionStatus::Denied);
    let result = TrackingSession::start(
        &mut source,
        session_road_catalog(),
        Arc::new(RecordingNotifier::default()),
    );
    assert_eq!(result.err(), Some(TrackingError::PermissionDenied));
    // never subscribed
    assert!(source.sender.is_none());
}

#[tokio::test]
async fn watch_failure() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    source.fail_watch = true;
    let result = TrackingSession::start(
        &mut source,
        session_road_catalog(),
        Arc::new(RecordingNotifier::default()),
    );
    assert!(matches!(result, Err(TrackingError::Stream(_))));
}

#[tokio::test]
async fn session_scenario() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let notifier = Arc::new(RecordingNotifier::default());
    let session =
        TrackingSession::start(&mut source, session_road_catalog(), notifier.clone()).unwrap();
    let mut state_rx = session.subscribe_state();
    assert_eq!(session.state(), TrackingState::default());

    assert!(source.send_fix(fix(120.595, 16.415, Some(50.), T0)));
    let state = wait_for_state(&mut state_rx, |state| state.current_road_name.is_some()).await;
    assert_eq!(state.current_speed_limit_kmh, 30.);
    assert_eq!(
        wait_for_messages(&notifier, 2).await,
        vec![ENTERING_SESSION_ROAD, OVERSPEEDING_30]
    );

    assert!(source.send_fix(fix(120.595, 16.415, Some(50.), T0 + 2000)));
    assert!(source.send_fix(fix(120.595, 16.415, Some(50.), T0 + 9000)));
    wait_for_state(&mut state_rx, |state| {
        state.last_overspeed_alert_at_ms == Some(T0 + 9000)
    })
    .await;
    assert_eq!(
        wait_for_messages(&notifier, 3).await,
        vec![ENTERING_SESSION_ROAD, OVERSPEEDING_30, OVERSPEEDING_30]
    );

    session.stop();
    assert!(!session.is_running());
    assert_eq!(session.join().await, Ok(()));
}

#[tokio::test]
async fn bad_fix_does_not_kill_the_session() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let notifier = Arc::new(RecordingNotifier::default());
    let session =
        TrackingSession::start(&mut source, session_road_catalog(), notifier.clone()).unwrap();
    let mut state_rx = session.subscribe_state();

    assert!(source.send_fix(fix(200., 16.415, Some(20.), T0)));
    assert!(source.send_fix(fix(120.595, 16.415, Some(20.), T0 + 1000)));
    let state = wait_for_state(&mut state_rx, |state| state.last_position.is_some()).await;
    assert_eq!(state.current_road_name.as_deref(), Some("Session Road"));
    assert_eq!(
        wait_for_messages(&notifier, 1).await,
        vec![ENTERING_SESSION_ROAD]
    );
    assert!(session.is_running());

    session.stop();
}

#[tokio::test]
async fn stop_before_first_fix_is_idempotent() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let notifier = Arc::new(RecordingNotifier::default());
    let session =
        TrackingSession::start(&mut source, session_road_catalog(), notifier.clone()).unwrap();

    session.stop();
    session.stop();
    assert!(!session.is_running());

    // nothing is processed after stop
    source.send_fix(fix(120.595, 16.415, Some(50.), T0));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), TrackingState::default());
    assert!(notifier.messages().is_empty());

    assert_eq!(session.join().await, Ok(()));
    // the session dropped its subscription
    assert!(source.sender.as_ref().unwrap().is_closed());
}

#[tokio::test]
async fn no_update_after_stop() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let notifier = Arc::new(RecordingNotifier::default());
    let session =
        TrackingSession::start(&mut source, session_road_catalog(), notifier.clone()).unwrap();
    let mut state_rx = session.subscribe_state();

    source.send_fix(fix(120.595, 16.415, Some(20.), T0));
    let state = wait_for_state(&mut state_rx, |state| state.last_position.is_some()).await;
    wait_for_messages(&notifier, 1).await;
    session.stop();

    source.send_fix(fix(120.595, 16.415, Some(80.), T0 + 10_000));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), state);
    assert_eq!(notifier.messages(), vec![ENTERING_SESSION_ROAD]);
}

#[tokio::test]
async fn stream_error_ends_the_session() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let notifier = Arc::new(RecordingNotifier::default());
    let session =
        TrackingSession::start(&mut source, session_road_catalog(), notifier.clone()).unwrap();

    source.send_fix(fix(120.595, 16.415, Some(20.), T0));
    source
        .sender
        .as_ref()
        .unwrap()
        .send(LocationUpdate::Error("gps lost".to_string()))
        .unwrap();
    assert_eq!(
        session.join().await,
        Err(TrackingError::Stream("gps lost".to_string()))
    );
    assert_eq!(notifier.messages(), vec![ENTERING_SESSION_ROAD]);
}

#[tokio::test]
async fn stream_end_finishes_cleanly() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let session = TrackingSession::start(
        &mut source,
        session_road_catalog(),
        Arc::new(RecordingNotifier::default()),
    )
    .unwrap();
    source.sender = None;
    assert_eq!(session.join().await, Ok(()));
}

// Stops the session on the first message it gets.
#[derive(Default)]
struct StoppingNotifier {
    session: OnceLock<Arc<SessionHandle>>,
    recorder: RecordingNotifier,
}

impl Notifier for StoppingNotifier {
    fn notify(&self, message: &str) {
        self.recorder.notify(message);
        if let Some(session) = self.session.get() {
            session.stop();
        }
    }
}

#[tokio::test]
async fn stop_from_inside_notifier() {
    let mut source = FakeLocationSource::new(PermissionStatus::Granted);
    let notifier = Arc::new(StoppingNotifier::default());
    let session = Arc::new(
        TrackingSession::start(&mut source, session_road_catalog(), notifier.clone()).unwrap(),
    );
    assert!(notifier.session.set(session.clone()).is_ok());
    let mut state_rx = session.subscribe_state();

    // entry and overspeed in the same fix, only the entry gets out
    source.send_fix(fix(120.595, 16.415, Some(50.), T0));
    let state = wait_for_state(&mut state_rx, |state| state.last_position.is_some()).await;
    assert_eq!(
        wait_for_messages(&notifier.recorder, 1).await,
        vec![ENTERING_SESSION_ROAD]
    );
    assert!(!session.is_running());

    source.send_fix(fix(120.595, 16.415, Some(80.), T0 + 10_000));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), state);
    assert_eq!(notifier.recorder.messages(), vec![ENTERING_SESSION_ROAD]);
}
