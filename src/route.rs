use anyhow::Result;
use thiserror::Error;

use crate::geometry::Point;
use crate::road_catalog::RoadCatalog;

pub const OSRM_PUBLIC_BASE_URL: &str = "https://router.project-osrm.org";

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("unknown road: {0}")]
    UnknownRoad(String),
    #[error("user location not found")]
    NoUserLocation,
    #[error("failed to calculate route: {0:#}")]
    Provider(anyhow::Error),
}

/// Turn-by-turn routing is an external service, this only describes what we
/// need from it: a driving path between two points.
pub trait RouteProvider {
    fn fetch_route(&self, from: &Point, to: &Point) -> Result<Vec<Point>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlannedRoute {
    pub road_name: String,
    pub destination: Point,
    pub path: Vec<Point>,
}

impl PlannedRoute {
    pub fn announcement(&self) -> String {
        format!(
            "Navigating to {}. Follow the highlighted route.",
            self.road_name
        )
    }
}

// The destination is the first point of the road's polyline.
pub fn plan_route_to_road(
    catalog: &RoadCatalog,
    provider: &impl RouteProvider,
    user_position: Option<&Point>,
    road_name: &str,
) -> Result<PlannedRoute, RouteError> {
    let from = user_position.ok_or(RouteError::NoUserLocation)?;
    let destination = catalog
        .find_by_exact_name(road_name)
        .and_then(|segment| segment.geometry.first())
        .copied()
        .ok_or_else(|| RouteError::UnknownRoad(road_name.to_owned()))?;

    let path = provider
        .fetch_route(from, &destination)
        .map_err(RouteError::Provider)?;
    info!(
        "[route] planned route to `{}` with {} points",
        road_name,
        path.len()
    );
    Ok(PlannedRoute {
        road_name: road_name.to_owned(),
        destination,
        path,
    })
}

pub fn osrm_route_url(base_url: &str, from: &Point, to: &Point) -> String {
    format!(
        "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
        base_url.trim_end_matches('/'),
        from.longitude,
        from.latitude,
        to.longitude,
        to.latitude
    )
}
