use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Calibrated thresholds of the matching and alerting engine.
///
/// Every field has a default, so a partial JSON document only overrides what
/// it mentions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Max distance between a fix and a road for the fix to be on that road.
    /// Street width plus GPS error.
    pub match_tolerance_m: f64,
    /// Speed above the limit that is still tolerated, absorbs GPS speed jitter.
    pub overspeed_tolerance_kmh: f64,
    /// Min time between two overspeed alerts.
    pub overspeed_debounce_ms: i64,
    /// Applied to roads without a known limit.
    pub default_speed_limit_kmh: f64,
    pub max_suggestions: usize,
    pub min_query_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            match_tolerance_m: 20.0,
            overspeed_tolerance_kmh: 3.0,
            overspeed_debounce_ms: 8000,
            default_speed_limit_kmh: 40.0,
            max_suggestions: 5,
            min_query_chars: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if config.match_tolerance_m < 0.0 || config.overspeed_debounce_ms < 0 {
            bail!("invalid engine config: {:?}", config);
        }
        Ok(config)
    }
}
