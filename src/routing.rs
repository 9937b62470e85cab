use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::location::LocationReader;
use crate::markers::MapState;
use crate::{Position, ProviderError, RescuemapError, Result, RouteCandidate};

/// Public OSRM demo server
pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

/// OSRM `route` service response
#[derive(Debug, Clone, Deserialize)]
pub struct OsrmResponse {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<OsrmRoute>,
}

/// One route from an OSRM response
#[derive(Debug, Clone, Deserialize)]
pub struct OsrmRoute {
    pub geometry: geojson::Geometry,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// External driving-route provider
#[async_trait]
pub trait RoutingService: Send + Sync {
    async fn routes(
        &self,
        origin: Position,
        destination: Position,
    ) -> Result<OsrmResponse, ProviderError>;
}

/// [`RoutingService`] backed by an OSRM HTTP endpoint
#[derive(Clone)]
pub struct OsrmClient {
    client: reqwest::Client,
    base_url: String,
}

impl OsrmClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Driving route URL, coordinates in lon,lat order
    pub fn route_url(&self, origin: Position, destination: Position) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.base_url.trim_end_matches('/'),
            origin.longitude(),
            origin.latitude(),
            destination.longitude(),
            destination.latitude()
        )
    }
}

#[async_trait]
impl RoutingService for OsrmClient {
    async fn routes(
        &self,
        origin: Position,
        destination: Position,
    ) -> Result<OsrmResponse, ProviderError> {
        let url = self.route_url(origin, destination);
        debug!("OSRM request: {}", url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("alternatives", "true"),
                ("overview", "full"),
                ("geometries", "geojson"),
            ])
            .send()
            .await?;

        // OSRM reports NoRoute with HTTP 400 and a JSON body
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<OsrmResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) if status.is_success() => Err(ProviderError::Decode(e.to_string())),
            Err(_) => Err(ProviderError::Status(status.as_u16())),
        }
    }
}

/// Convert an OSRM response into candidates, keeping provider order
pub fn candidates_from(response: OsrmResponse) -> Result<Vec<RouteCandidate>> {
    match response.code.as_str() {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(RescuemapError::NoRoute),
        code => {
            return Err(RescuemapError::Network(format!(
                "routing service rejected the request: {} {}",
                code,
                response.message.unwrap_or_default()
            )))
        }
    }

    if response.routes.is_empty() {
        return Err(RescuemapError::NoRoute);
    }

    let candidates = response
        .routes
        .into_iter()
        .enumerate()
        .map(|(rank, route)| candidate(rank, route))
        .collect::<Result<Vec<_>, ProviderError>>()?;
    Ok(candidates)
}

fn candidate(rank: usize, route: OsrmRoute) -> Result<RouteCandidate, ProviderError> {
    let coordinates = match route.geometry.value {
        geojson::Value::LineString(coordinates) => coordinates,
        _ => {
            return Err(ProviderError::Decode(format!(
                "route {} geometry is not a LineString",
                rank
            )))
        }
    };

    let geometry = coordinates
        .iter()
        .map(|c| match c.as_slice() {
            [lon, lat, ..] => {
                Position::new(*lat, *lon).map_err(|e| ProviderError::Decode(e.to_string()))
            }
            _ => Err(ProviderError::Decode(format!(
                "route {} has a short coordinate",
                rank
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RouteCandidate {
        rank,
        geometry,
        distance_m: route.distance,
        duration_s: route.duration,
    })
}

/// Requests routes and renders them onto the map
#[derive(Clone)]
pub struct RouteCalculator {
    service: Arc<dyn RoutingService>,
    map: MapState,
    timeout: Duration,
}

impl RouteCalculator {
    pub fn new(service: Arc<dyn RoutingService>, map: MapState, timeout: Duration) -> Self {
        Self {
            service,
            map,
            timeout,
        }
    }

    /// Route from the tracked position; fails fast without a fix
    pub async fn route_from(
        &self,
        location: &LocationReader,
        destination: Position,
    ) -> Result<Vec<RouteCandidate>> {
        let origin = location.current_position()?;
        self.route(origin, destination).await
    }

    /// Fetch candidates and replace the displayed routes.
    ///
    /// On success every candidate is drawn and the view frames the first
    /// one. On failure the overlays are cleared. A response that lost the
    /// race to a newer request is reported as `Superseded` and not drawn.
    pub async fn route(
        &self,
        origin: Position,
        destination: Position,
    ) -> Result<Vec<RouteCandidate>> {
        let ticket = self.map.begin_route_request().await;

        match self.fetch(origin, destination).await {
            Ok(candidates) => {
                self.map.apply_routes(ticket, &candidates).await?;
                info!("Displaying {} route candidates", candidates.len());
                Ok(candidates)
            }
            Err(e) => {
                self.map.abandon_routes(ticket).await?;
                warn!("Routing failed: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch(&self, origin: Position, destination: Position) -> Result<Vec<RouteCandidate>> {
        let response =
            match tokio::time::timeout(self.timeout, self.service.routes(origin, destination))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(ProviderError::Timeout(self.timeout).into()),
            };
        candidates_from(response)
    }
}
