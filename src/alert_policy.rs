use std::fmt;

use crate::config::EngineConfig;
use crate::road_catalog::RoadSegment;

#[derive(Clone, Debug, PartialEq)]
pub enum Alert {
    RoadEntered {
        name: String,
        speed_limit_kmh: f64,
    },
    Overspeed {
        speed_kmh: f64,
        speed_limit_kmh: f64,
    },
}

impl Alert {
    /// The plain-text message handed to the notifier (speech, push or banner).
    pub fn message(&self) -> String {
        match self {
            Alert::RoadEntered {
                name,
                speed_limit_kmh,
            } => format!("Now entering {name}. Speed limit is {speed_limit_kmh} km/h."),
            Alert::Overspeed {
                speed_limit_kmh, ..
            } => format!("Warning! You are overspeeding. Limit is {speed_limit_kmh} km/h."),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Decides, for every fix, whether the user just entered a new road and
/// whether they should be warned about their speed.
///
/// Losing the road (e.g. GPS dropout) keeps the last known road and limit.
#[derive(Clone, Debug)]
pub struct AlertPolicy {
    current_road_name: Option<String>,
    // 0 means unknown
    speed_limit_kmh: f64,
    last_overspeed_alert_at_ms: Option<i64>,
    overspeed_tolerance_kmh: f64,
    overspeed_debounce_ms: i64,
    default_speed_limit_kmh: f64,
}

impl AlertPolicy {
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        AlertPolicy {
            current_road_name: None,
            speed_limit_kmh: 0.,
            last_overspeed_alert_at_ms: None,
            overspeed_tolerance_kmh: config.overspeed_tolerance_kmh,
            overspeed_debounce_ms: config.overspeed_debounce_ms,
            default_speed_limit_kmh: config.default_speed_limit_kmh,
        }
    }

    pub fn current_road_name(&self) -> Option<&str> {
        self.current_road_name.as_deref()
    }

    pub fn speed_limit_kmh(&self) -> f64 {
        self.speed_limit_kmh
    }

    pub fn last_overspeed_alert_at_ms(&self) -> Option<i64> {
        self.last_overspeed_alert_at_ms
    }

    /// Alerts are returned in emission order: a road entry always comes
    /// before an overspeed warning, which is checked against the limit of the
    /// road just entered.
    pub fn evaluate(
        &mut self,
        located_road: Option<&RoadSegment>,
        speed_kmh: f64,
        now_ms: i64,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let road = match located_road {
            None => return alerts,
            Some(road) => road,
        };

        if self.current_road_name.as_deref() != Some(road.name.as_str()) {
            let speed_limit_kmh = road.effective_speed_limit_kmh(self.default_speed_limit_kmh);
            self.current_road_name = Some(road.name.clone());
            self.speed_limit_kmh = speed_limit_kmh;
            alerts.push(Alert::RoadEntered {
                name: road.name.clone(),
                speed_limit_kmh,
            });
        }

        let is_overspeeding = self.speed_limit_kmh > 0.
            && speed_kmh > self.speed_limit_kmh + self.overspeed_tolerance_kmh;
        let debounced = match self.last_overspeed_alert_at_ms {
            None => true,
            Some(last) => now_ms - last >= self.overspeed_debounce_ms,
        };
        if is_overspeeding && debounced {
            self.last_overspeed_alert_at_ms = Some(now_ms);
            alerts.push(Alert::Overspeed {
                speed_kmh,
                speed_limit_kmh: self.speed_limit_kmh,
            });
        }

        alerts
    }
}
