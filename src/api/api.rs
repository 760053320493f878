use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Result;

use crate::config::EngineConfig;
use crate::geometry::Point;
use crate::logs;
use crate::road_catalog::{GeoJsonFileProvider, RoadCatalog, RoadDataProvider};
use crate::route::{self, PlannedRoute, RouteProvider};
use crate::tracking_session::{Notifier, PositionFix, Tracker, TrackingState};

struct MainState {
    cache_dir: String,
    config: EngineConfig,
    catalog: Mutex<Arc<RoadCatalog>>,
    tracker: Mutex<Tracker>,
    notifier: Mutex<Option<Arc<dyn Notifier>>>,
}

static MAIN_STATE: OnceLock<MainState> = OnceLock::new();

pub fn init(cache_dir: String, engine_config_json: Option<String>) -> Result<()> {
    let config = match engine_config_json {
        None => EngineConfig::default(),
        Some(json) => EngineConfig::from_json_str(&json)?,
    };

    let mut already_initialized = true;
    MAIN_STATE.get_or_init(|| {
        already_initialized = false;

        if let Err(e) = logs::init(&cache_dir) {
            // still usable without file logs
            eprintln!("failed to initialize logging: {e:#}");
        }

        let catalog = Arc::new(RoadCatalog::default());
        info!("initialized");
        MainState {
            cache_dir,
            tracker: Mutex::new(Tracker::with_config(catalog.clone(), &config)),
            catalog: Mutex::new(catalog),
            config,
            notifier: Mutex::new(None),
        }
    });
    if already_initialized {
        warn!("`init` is called multiple times");
    }
    Ok(())
}

fn get() -> &'static MainState {
    MAIN_STATE.get().expect("main state is not initialized")
}

pub fn load_roads(source: &impl RoadDataProvider) -> Result<usize> {
    let state = get();
    let catalog = Arc::new(RoadCatalog::load(source)?);
    let num_of_roads = catalog.len();

    // a new catalog starts a new tracking context
    let mut tracker = state.tracker.lock().unwrap();
    let mut current_catalog = state.catalog.lock().unwrap();
    *tracker = Tracker::with_config(catalog.clone(), &state.config);
    *current_catalog = catalog;
    Ok(num_of_roads)
}

pub fn load_roads_from_geojson(file_path: String) -> Result<usize> {
    load_roads(&GeoJsonFileProvider::new(file_path))
}

pub fn search_roads(text: String) -> Vec<String> {
    let state = get();
    let catalog = state.catalog.lock().unwrap().clone();
    catalog.find_by_name_prefix_with_config(&text, &state.config)
}

pub fn set_notifier(notifier: Arc<dyn Notifier>) {
    *get().notifier.lock().unwrap() = Some(notifier);
}

pub fn on_location_update(mut fixes: Vec<PositionFix>, received_timestamp_ms: i64) {
    let state = get();
    // NOTE: batches can arrive out of order, so we sort them first and
    // handle the whole batch under one lock. Notifying happens after the lock
    // is released, a notifier may call back into this module.
    let alerts = {
        let mut tracker = state.tracker.lock().unwrap();
        fixes.sort_by_key(|fix| fix.timestamp_ms.unwrap_or(received_timestamp_ms));
        let mut alerts = Vec::new();
        for fix in fixes {
            match tracker.process_fix(&fix, received_timestamp_ms) {
                Err(e) => warn!("dropping fix {:?}: {}", fix, e),
                Ok(new_alerts) => alerts.extend(new_alerts),
            }
        }
        alerts
    };

    if let Some(notifier) = notifier() {
        for alert in alerts {
            notifier.notify(&alert.message());
        }
    }
}

fn notifier() -> Option<Arc<dyn Notifier>> {
    get().notifier.lock().unwrap().clone()
}

pub fn current_state() -> TrackingState {
    get().tracker.lock().unwrap().state().clone()
}

pub fn reset_tracking() {
    let state = get();
    let catalog = state.catalog.lock().unwrap().clone();
    *state.tracker.lock().unwrap() = Tracker::with_config(catalog, &state.config);
}

pub fn plan_route(provider: &impl RouteProvider, road_name: String) -> Result<PlannedRoute> {
    let state = get();
    let catalog = state.catalog.lock().unwrap().clone();
    let user_position: Option<Point> = state.tracker.lock().unwrap().state().last_position;

    let planned = route::plan_route_to_road(&catalog, provider, user_position.as_ref(), &road_name)?;
    if let Some(notifier) = notifier() {
        notifier.notify(&planned.announcement());
    }
    Ok(planned)
}

pub fn set_log_sink(sink: logs::LogSink) {
    logs::set_log_sink(sink);
}

pub fn export_logs(target_file_path: String) -> Result<()> {
    logs::export(&get().cache_dir, &target_file_path)
}
