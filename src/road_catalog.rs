/* All roads the engine knows about. The catalog is built once per session from
an external road-data provider and never mutated afterwards, so it can be
shared (`Arc<RoadCatalog>`) and read from anywhere without locking.

Raw records follow the GeoJSON `Feature` shape:
    {"geometry": {"type": "LineString", "coordinates": [[lon, lat], ...]},
     "properties": {"name": "Session Road", "speed_limit": 30}}
*/

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use strum_macros::{EnumIter, IntoStaticStr};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::geometry::Point;

pub const UNKNOWN_ROAD_NAME: &str = "Unknown road";

#[derive(Error, Debug)]
pub enum CatalogLoadError {
    #[error("failed to fetch road data: {0:#}")]
    Fetch(anyhow::Error),
    #[error("invalid GeoJSON road data: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawGeometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawProperties {
    pub name: Option<String>,
    pub speed_limit: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RawRoadRecord {
    pub geometry: Option<RawGeometry>,
    pub properties: Option<RawProperties>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<serde_json::Value>,
}

// Only the collection itself has to be well formed. A feature of an
// unexpected shape (e.g. a `Point` geometry) is dropped on its own.
fn decode_features(json: &str) -> Result<Vec<RawRoadRecord>, serde_json::Error> {
    let collection: FeatureCollection = serde_json::from_str(json)?;
    let total = collection.features.len();
    let records: Vec<RawRoadRecord> = collection
        .features
        .into_iter()
        .filter_map(|feature| match serde_json::from_value(feature) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("[road_catalog] skipping malformed feature: {}", e);
                None
            }
        })
        .collect();
    if records.len() < total {
        warn!(
            "[road_catalog] skipped {} malformed features",
            total - records.len()
        );
    }
    Ok(records)
}

pub trait RoadDataProvider {
    fn fetch_roads(&self) -> Result<Vec<RawRoadRecord>>;
}

impl<F> RoadDataProvider for F
where
    F: Fn() -> Result<Vec<RawRoadRecord>>,
{
    fn fetch_roads(&self) -> Result<Vec<RawRoadRecord>> {
        self()
    }
}

/// Roads bundled with the app as a GeoJSON `FeatureCollection` file.
pub struct GeoJsonFileProvider {
    path: PathBuf,
}

impl GeoJsonFileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        GeoJsonFileProvider {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RoadDataProvider for GeoJsonFileProvider {
    fn fetch_roads(&self) -> Result<Vec<RawRoadRecord>> {
        let content = fs::read_to_string(&self.path)?;
        Ok(decode_features(&content)?)
    }
}

/// Color class of a road on the map overlay, in legend order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
pub enum SpeedBand {
    #[strum(serialize = "Unknown limit")]
    Unknown,
    #[strum(serialize = "20 km/h Roads")]
    UpTo20,
    #[strum(serialize = "30 km/h Roads")]
    UpTo30,
    #[strum(serialize = "40 km/h Roads")]
    UpTo40,
    #[strum(serialize = "50+ km/h Roads")]
    Above40,
}

impl SpeedBand {
    pub fn of(speed_limit_kmh: Option<f64>) -> Self {
        match speed_limit_kmh {
            None => SpeedBand::Unknown,
            Some(limit) if limit <= 20.0 => SpeedBand::UpTo20,
            Some(limit) if limit <= 30.0 => SpeedBand::UpTo30,
            Some(limit) if limit <= 40.0 => SpeedBand::UpTo40,
            Some(_) => SpeedBand::Above40,
        }
    }

    pub fn color_hex(&self) -> &'static str {
        match self {
            SpeedBand::Unknown => "#808080",
            SpeedBand::UpTo20 => "#FFFF00",
            SpeedBand::UpTo30 => "#FFA500",
            SpeedBand::UpTo40 => "#FF0000",
            SpeedBand::Above40 => "#008000",
        }
    }

    pub fn legend_label(&self) -> &'static str {
        self.into()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoadSegment {
    pub name: String,
    // `None` means unknown, consumers apply a default.
    pub speed_limit_kmh: Option<f64>,
    pub geometry: Vec<Point>,
}

impl RoadSegment {
    pub fn effective_speed_limit_kmh(&self, default_kmh: f64) -> f64 {
        self.speed_limit_kmh.unwrap_or(default_kmh)
    }

    pub fn speed_band(&self) -> SpeedBand {
        SpeedBand::of(self.speed_limit_kmh)
    }

    fn from_raw(raw: RawRoadRecord) -> Option<Self> {
        let (geometry, properties) = match (raw.geometry, raw.properties) {
            (Some(geometry), Some(properties)) => (geometry, properties),
            _ => return None,
        };
        Some(RoadSegment {
            name: properties
                .name
                .unwrap_or_else(|| UNKNOWN_ROAD_NAME.to_owned()),
            speed_limit_kmh: properties.speed_limit.filter(|limit| *limit > 0.0),
            geometry: geometry
                .coordinates
                .iter()
                .map(|[lon, lat]| Point::from_lon_lat(*lon, *lat))
                .collect(),
        })
    }
}

#[derive(Debug, Default)]
pub struct RoadCatalog {
    segments: Vec<RoadSegment>,
}

impl RoadCatalog {
    pub fn load(source: &impl RoadDataProvider) -> Result<Self, CatalogLoadError> {
        let records = source.fetch_roads().map_err(CatalogLoadError::Fetch)?;
        Ok(Self::from_records(records))
    }

    pub fn from_geojson_str(json: &str) -> Result<Self, CatalogLoadError> {
        Ok(Self::from_records(decode_features(json)?))
    }

    pub fn from_records(records: Vec<RawRoadRecord>) -> Self {
        let total = records.len();
        let segments: Vec<RoadSegment> = records
            .into_iter()
            .filter_map(RoadSegment::from_raw)
            .collect();
        info!(
            "[road_catalog] loaded {} roads, skipped {} incomplete records",
            segments.len(),
            total - segments.len()
        );
        RoadCatalog { segments }
    }

    pub fn from_segments(segments: Vec<RoadSegment>) -> Self {
        RoadCatalog { segments }
    }

    pub fn all(&self) -> &[RoadSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn find_by_name_prefix(&self, text: &str) -> Vec<String> {
        self.find_by_name_prefix_with_config(text, &EngineConfig::default())
    }

    /// Case-insensitive substring search over road names, in catalog order.
    /// Very short queries return nothing to avoid noisy suggestions.
    pub fn find_by_name_prefix_with_config(&self, text: &str, config: &EngineConfig) -> Vec<String> {
        if text.trim().chars().count() < config.min_query_chars {
            return Vec::new();
        }
        let needle = text.to_lowercase();
        self.segments
            .iter()
            .filter(|segment| segment.name.to_lowercase().contains(&needle))
            .take(config.max_suggestions)
            .map(|segment| segment.name.clone())
            .collect()
    }

    pub fn find_by_exact_name(&self, name: &str) -> Option<&RoadSegment> {
        self.segments.iter().find(|segment| segment.name == name)
    }
}
