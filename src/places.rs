use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    FacilityCategory, FacilityQuery, FacilityRecord, Position, ProviderError, RescuemapError,
    Result,
};

/// Public Overpass interpreter
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Search radius used when none is configured
pub const DEFAULT_RADIUS_METERS: u32 = 25_000;

/// Overpass JSON result set
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<OverpassElement>,
    /// Set by Overpass when the query failed server-side
    #[serde(default)]
    pub remark: Option<String>,
}

/// One OSM element from an Overpass result
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// External point-of-interest index
#[async_trait]
pub trait PlaceIndex: Send + Sync {
    async fn query(&self, query: &FacilityQuery) -> Result<OverpassResponse, ProviderError>;
}

/// Render the Overpass QL for a facility query
pub fn overpass_ql(query: &FacilityQuery) -> String {
    format!(
        "[out:json][timeout:25];\nnode[\"amenity\"=\"{}\"](around:{},{},{});\nout;",
        query.category.amenity_tag(),
        query.radius_meters,
        query.origin.latitude(),
        query.origin.longitude()
    )
}

/// [`PlaceIndex`] backed by an Overpass HTTP endpoint
#[derive(Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl PlaceIndex for OverpassClient {
    async fn query(&self, query: &FacilityQuery) -> Result<OverpassResponse, ProviderError> {
        let ql = overpass_ql(query);
        debug!("Overpass query: {}", ql);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("data", ql.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        response
            .json::<OverpassResponse>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Finds facilities of one category around a position
#[derive(Clone)]
pub struct PlaceFinder {
    index: Arc<dyn PlaceIndex>,
    radius_meters: u32,
    timeout: Duration,
}

impl PlaceFinder {
    pub fn new(index: Arc<dyn PlaceIndex>, radius_meters: u32, timeout: Duration) -> Self {
        Self {
            index,
            radius_meters,
            timeout,
        }
    }

    /// Query the index and normalize the result set.
    ///
    /// A valid response with nothing usable is `EmptyResult`; transport,
    /// decode and timeout failures are `Network`.
    pub async fn find_nearby(
        &self,
        origin: Position,
        category: FacilityCategory,
    ) -> Result<Vec<FacilityRecord>> {
        let query = FacilityQuery::new(origin, category, self.radius_meters);
        info!(
            "Searching {} within {} m of {:.5}, {:.5}",
            category,
            query.radius_meters,
            origin.latitude(),
            origin.longitude()
        );

        let response = match tokio::time::timeout(self.timeout, self.index.query(&query)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Place query failed: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("Place query timed out after {:?}", self.timeout);
                return Err(ProviderError::Timeout(self.timeout).into());
            }
        };

        let records = normalize(&query, response)?;
        info!("Found {} {} facilities", records.len(), category);
        Ok(records)
    }
}

/// Turn raw elements into facility records, in provider order
pub fn normalize(query: &FacilityQuery, response: OverpassResponse) -> Result<Vec<FacilityRecord>> {
    let empty = || RescuemapError::EmptyResult {
        category: query.category,
        radius_meters: query.radius_meters,
    };

    if response.elements.is_empty() {
        if let Some(remark) = response.remark {
            warn!("Overpass remark: {}", remark);
            return Err(RescuemapError::Network(remark));
        }
        return Err(empty());
    }

    let mut seen_ids = HashSet::new();
    let mut seen_spots = HashSet::new();
    let mut records = Vec::with_capacity(response.elements.len());

    for element in response.elements {
        let (Some(lat), Some(lon)) = (element.lat, element.lon) else {
            warn!("Skipping element {:?} without coordinates", element.id);
            continue;
        };
        let position = match Position::new(lat, lon) {
            Ok(position) => position,
            Err(e) => {
                warn!("Skipping element {:?}: {}", element.id, e);
                continue;
            }
        };

        if let Some(id) = element.id {
            if !seen_ids.insert((element.kind.clone(), id)) {
                continue;
            }
        }

        let display_name =
            tag_value(&element.tags, "name").unwrap_or_else(|| query.category.fallback_name());
        if !seen_spots.insert((lat.to_bits(), lon.to_bits(), display_name.clone())) {
            continue;
        }

        records.push(FacilityRecord {
            osm_id: element.id,
            position,
            category: query.category,
            display_name,
            phone: tag_value(&element.tags, "phone"),
            distance_m: query.origin.distance_to(&position),
        });
    }

    if records.is_empty() {
        return Err(empty());
    }
    Ok(records)
}

fn tag_value(tags: &HashMap<String, String>, key: &str) -> Option<String> {
    tags.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
