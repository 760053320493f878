#![allow(dead_code)]

use speedzone_core::geometry::Point;
use speedzone_core::road_catalog::{RoadCatalog, RoadSegment};
use speedzone_core::tracking_session::{
    LocationSource, LocationUpdate, Notifier, PermissionStatus, PositionFix,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const BAGUIO_ROADS: &str = "./tests/data/baguio_roads.geojson";

// about one meter of latitude, in degrees
pub const ONE_METER_LAT: f64 = 1. / 111_195.;

pub fn road(name: &str, speed_limit_kmh: Option<f64>, coordinates: &[(f64, f64)]) -> RoadSegment {
    RoadSegment {
        name: name.to_string(),
        speed_limit_kmh,
        geometry: coordinates
            .iter()
            .map(|(lon, lat)| Point::from_lon_lat(*lon, *lat))
            .collect(),
    }
}

pub fn session_road() -> RoadSegment {
    road("Session Road", Some(30.), &[(120.59, 16.41), (120.60, 16.42)])
}

pub fn session_road_catalog() -> Arc<RoadCatalog> {
    Arc::new(RoadCatalog::from_segments(vec![session_road()]))
}

pub fn fix(lon: f64, lat: f64, speed_kmh: Option<f64>, timestamp_ms: i64) -> PositionFix {
    PositionFix {
        point: Point::from_lon_lat(lon, lat),
        speed_mps: speed_kmh.map(|x| x / 3.6),
        timestamp_ms: Some(timestamp_ms),
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// A location service driven by the test through `sender`.
pub struct FakeLocationSource {
    pub permission: PermissionStatus,
    pub fail_watch: bool,
    pub sender: Option<mpsc::UnboundedSender<LocationUpdate>>,
}

impl FakeLocationSource {
    pub fn new(permission: PermissionStatus) -> Self {
        FakeLocationSource {
            permission,
            fail_watch: false,
            sender: None,
        }
    }

    pub fn send_fix(&self, fix: PositionFix) -> bool {
        self.sender
            .as_ref()
            .map(|sender| sender.send(LocationUpdate::Fix(fix)).is_ok())
            .unwrap_or(false)
    }
}

impl LocationSource for FakeLocationSource {
    fn request_permission(&mut self) -> anyhow::Result<PermissionStatus> {
        Ok(self.permission)
    }

    fn watch_position(&mut self) -> anyhow::Result<mpsc::UnboundedReceiver<LocationUpdate>> {
        if self.fail_watch {
            anyhow::bail!("location services are off");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.sender = Some(tx);
        Ok(rx)
    }
}
