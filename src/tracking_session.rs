use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::alert_policy::{Alert, AlertPolicy};
use crate::config::EngineConfig;
use crate::geometry::{InvalidGeometry, Point};
use crate::road_catalog::RoadCatalog;
use crate::road_locator::RoadLocator;

const MPS_TO_KMH: f64 = 3.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location stream error: {0}")]
    Stream(String),
    #[error("tracking session must be started inside a tokio runtime")]
    NoRuntime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub point: Point,
    // meters per second, `None` when the device does not know
    pub speed_mps: Option<f64>,
    pub timestamp_ms: Option<i64>,
}

/// What the UI renders. Always handed out as a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TrackingState {
    pub current_road_name: Option<String>,
    pub current_speed_limit_kmh: f64,
    pub last_overspeed_alert_at_ms: Option<i64>,
    pub last_computed_speed_kmh: f64,
    pub last_position: Option<Point>,
}

/// The per-fix pipeline: speed conversion, road matching, alert policy and
/// state update. It has no notion of streams or threads, callers feed fixes
/// one at a time in arrival order.
pub struct Tracker {
    locator: RoadLocator,
    policy: AlertPolicy,
    state: TrackingState,
}

impl Tracker {
    pub fn new(catalog: Arc<RoadCatalog>) -> Self {
        Self::with_config(catalog, &EngineConfig::default())
    }

    pub fn with_config(catalog: Arc<RoadCatalog>, config: &EngineConfig) -> Self {
        Tracker {
            locator: RoadLocator::with_config(catalog, config),
            policy: AlertPolicy::with_config(config),
            state: TrackingState::default(),
        }
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// On error the fix is dropped and the state is left untouched.
    pub fn process_fix(
        &mut self,
        fix: &PositionFix,
        now_ms: i64,
    ) -> Result<Vec<Alert>, InvalidGeometry> {
        let speed_kmh = fix.speed_mps.unwrap_or(0.) * MPS_TO_KMH;
        let timestamp_ms = fix.timestamp_ms.unwrap_or(now_ms);

        let located = self.locator.locate(&fix.point)?;
        if let Some(located) = &located {
            debug!(
                "[tracking] fix matched `{}` at {:.1}m",
                located.segment.name, located.distance_m
            );
        }
        let alerts = self.policy.evaluate(
            located.as_ref().map(|located| located.segment),
            speed_kmh,
            timestamp_ms,
        );

        // road name and limit always come from the policy together
        self.state = TrackingState {
            current_road_name: self.policy.current_road_name().map(str::to_owned),
            current_speed_limit_kmh: self.policy.speed_limit_kmh(),
            last_overspeed_alert_at_ms: self.policy.last_overspeed_alert_at_ms(),
            last_computed_speed_kmh: speed_kmh,
            last_position: Some(fix.point),
        };

        for alert in &alerts {
            info!("[tracking] {:?}", alert);
        }
        Ok(alerts)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LocationUpdate {
    Fix(PositionFix),
    Error(String),
}

/// The device location service.
pub trait LocationSource {
    fn request_permission(&mut self) -> Result<PermissionStatus>;
    /// Dropping the returned receiver unsubscribes.
    fn watch_position(&mut self) -> Result<mpsc::UnboundedReceiver<LocationUpdate>>;
}

/// Delivers alert messages to the user (speech, push notification, banner).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

struct SessionShared {
    tracker: Mutex<Tracker>,
    stopped: AtomicBool,
}

pub struct TrackingSession {}

impl TrackingSession {
    pub fn start<S: LocationSource>(
        source: &mut S,
        catalog: Arc<RoadCatalog>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<SessionHandle, TrackingError> {
        Self::start_with_config(source, catalog, notifier, &EngineConfig::default())
    }

    pub fn start_with_config<S: LocationSource>(
        source: &mut S,
        catalog: Arc<RoadCatalog>,
        notifier: Arc<dyn Notifier>,
        config: &EngineConfig,
    ) -> Result<SessionHandle, TrackingError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TrackingError::NoRuntime)?;

        match source.request_permission() {
            Ok(PermissionStatus::Granted) => (),
            Ok(PermissionStatus::Denied) => {
                warn!("[tracking] location permission denied");
                return Err(TrackingError::PermissionDenied);
            }
            Err(e) => {
                error!("[tracking] failed to request location permission: {:#}", e);
                return Err(TrackingError::Stream(format!("{e:#}")));
            }
        }
        let updates = source.watch_position().map_err(|e| {
            error!("[tracking] failed to watch position: {:#}", e);
            TrackingError::Stream(format!("{e:#}"))
        })?;

        let shared = Arc::new(SessionShared {
            tracker: Mutex::new(Tracker::with_config(catalog, config)),
            stopped: AtomicBool::new(false),
        });
        let (state_tx, state_rx) = watch::channel(TrackingState::default());
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = runtime.spawn(run(updates, stop_rx, shared.clone(), state_tx, notifier));
        info!("[tracking] session started");

        Ok(SessionHandle {
            shared,
            state_rx,
            stop_tx: Mutex::new(Some(stop_tx)),
            task,
        })
    }
}

async fn run(
    mut updates: mpsc::UnboundedReceiver<LocationUpdate>,
    mut stop_rx: oneshot::Receiver<()>,
    shared: Arc<SessionShared>,
    state_tx: watch::Sender<TrackingState>,
    notifier: Arc<dyn Notifier>,
) -> Result<(), TrackingError> {
    let result = loop {
        let update = tokio::select! {
            _ = &mut stop_rx => break Ok(()),
            update = updates.recv() => update,
        };
        match update {
            None => {
                info!("[tracking] location stream ended");
                break Ok(());
            }
            Some(LocationUpdate::Error(e)) => {
                error!("[tracking] location stream error: {}", e);
                break Err(TrackingError::Stream(e));
            }
            Some(LocationUpdate::Fix(fix)) => {
                // Mutation and state publication happen under the lock that
                // `stop` waits on. Notifying happens outside of it so a
                // notifier may call `stop` itself.
                let alerts = {
                    let mut tracker = shared.tracker.lock().unwrap();
                    if shared.stopped.load(Ordering::SeqCst) {
                        break Ok(());
                    }
                    match tracker.process_fix(&fix, Utc::now().timestamp_millis()) {
                        Err(e) => {
                            warn!("[tracking] dropping fix {:?}: {}", fix, e);
                            continue;
                        }
                        Ok(alerts) => {
                            state_tx.send_replace(tracker.state().clone());
                            alerts
                        }
                    }
                };
                for alert in alerts {
                    if shared.stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    notifier.notify(&alert.message());
                }
            }
        }
    };
    // unsubscribe
    drop(updates);
    shared.stopped.store(true, Ordering::SeqCst);
    result
}

/// Dropping the handle without calling `stop` also ends the session.
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<TrackingState>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: JoinHandle<Result<(), TrackingError>>,
}

impl SessionHandle {
    /// Idempotent, and fine to call before the first fix or from inside a
    /// notifier. Once this returns, no fix is processed and no state is
    /// published anymore. An alert already being handed to the notifier on the
    /// session task may still arrive.
    pub fn stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            info!("[tracking] session stopped");
        }
        // wait for a fix that is being processed right now
        drop(self.shared.tracker.lock().unwrap());
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().take() {
            // the task may be gone already
            let _ = stop_tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TrackingState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TrackingState> {
        self.state_rx.clone()
    }

    /// Waits for the session to end and reports why: `Ok` after `stop` or
    /// when the stream ends, `Err(TrackingError::Stream)` when it failed.
    pub async fn join(self) -> Result<(), TrackingError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(TrackingError::Stream(format!("tracking task failed: {e}"))),
        }
    }
}
