use std::sync::Arc;

use crate::config::EngineConfig;
use crate::geometry::{self, InvalidGeometry, Point};
use crate::road_catalog::{RoadCatalog, RoadSegment};

// Distances closer than this are treated as ties.
const TIE_EPSILON_M: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct LocatedRoad<'a> {
    pub segment: &'a RoadSegment,
    pub distance_m: f64,
}

/// Finds the road a position is on.
///
/// This is a linear scan over the whole catalog for every call. Catalogs are
/// expected to be in the low thousands of roads, so there is no spatial
/// index.
pub struct RoadLocator {
    catalog: Arc<RoadCatalog>,
    // indices into `catalog.all()` whose geometry is valid, in catalog order
    usable: Vec<usize>,
    match_tolerance_m: f64,
}

impl RoadLocator {
    pub fn new(catalog: Arc<RoadCatalog>) -> Self {
        Self::with_config(catalog, &EngineConfig::default())
    }

    pub fn with_config(catalog: Arc<RoadCatalog>, config: &EngineConfig) -> Self {
        // A broken geometry would fail on every call, so it is excluded once
        // here instead of being retried for every fix.
        let usable = catalog
            .all()
            .iter()
            .enumerate()
            .filter_map(
                |(i, segment)| match geometry::validate_polyline(&segment.geometry) {
                    Ok(()) => Some(i),
                    Err(e) => {
                        warn!(
                            "[road_locator] excluding road `{}` from matching: {}",
                            segment.name, e
                        );
                        None
                    }
                },
            )
            .collect();
        RoadLocator {
            catalog,
            usable,
            match_tolerance_m: config.match_tolerance_m,
        }
    }

    pub fn catalog(&self) -> &Arc<RoadCatalog> {
        &self.catalog
    }

    pub fn num_of_usable_roads(&self) -> usize {
        self.usable.len()
    }

    /// Returns the nearest road if it is within the match tolerance. When
    /// several roads are at the same distance, the first one in catalog order
    /// wins.
    pub fn locate(&self, point: &Point) -> Result<Option<LocatedRoad<'_>>, InvalidGeometry> {
        point.validate()?;

        let segments = self.catalog.all();
        let mut nearest: Option<LocatedRoad> = None;
        for &i in &self.usable {
            let segment = &segments[i];
            let distance_m = geometry::distance_to_polyline(point, &segment.geometry)?;
            let is_closer = match &nearest {
                None => true,
                Some(best) => distance_m + TIE_EPSILON_M < best.distance_m,
            };
            if is_closer {
                nearest = Some(LocatedRoad {
                    segment,
                    distance_m,
                });
            }
        }

        Ok(nearest.filter(|located| located.distance_m <= self.match_tolerance_m))
    }
}
