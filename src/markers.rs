use geojson::{feature::Id, Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;
use uuid::Uuid;

use crate::generation::{Generation, GenerationCounter};
use crate::{BoundingBox, FacilityRecord, Position, RescuemapError, Result, RouteCandidate};

/// Zoom used when the view follows a fresh fix
pub const FIX_ZOOM: u8 = 14;

/// Zoom of the view before the first fix
pub const INITIAL_ZOOM: u8 = 13;

/// Center of the view before the first fix
pub const INITIAL_CENTER: (f64, f64) = (51.505, -0.09);

/// Identifier of one displayed annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerId(Uuid);

impl MarkerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the rendering surface should frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Viewport {
    Centered { center: Position, zoom: u8 },
    Bounds { bounds: BoundingBox },
}

impl Default for Viewport {
    fn default() -> Self {
        let (lat, lon) = INITIAL_CENTER;
        Viewport::Centered {
            center: Position::new_unchecked(lat, lon),
            zoom: INITIAL_ZOOM,
        }
    }
}

/// Annotations currently on the map.
///
/// Facility pins and route overlays are replaced wholesale; the user marker
/// is only ever moved.
#[derive(Debug, Default)]
pub struct MarkerSet {
    user: Option<(MarkerId, Position)>,
    facilities: Vec<(MarkerId, FacilityRecord)>,
    routes: Vec<(MarkerId, RouteCandidate)>,
    viewport: Viewport,
    facility_generation: GenerationCounter,
    route_generation: GenerationCounter,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every facility pin, then pin `records` in order
    pub fn replace_facility_markers(&mut self, records: &[FacilityRecord]) {
        self.facilities.clear();
        self.facilities
            .extend(records.iter().cloned().map(|r| (MarkerId::new(), r)));
    }

    /// Drop every route overlay, then draw `candidates` in order
    pub fn replace_routes(&mut self, candidates: &[RouteCandidate]) {
        self.routes.clear();
        self.routes
            .extend(candidates.iter().cloned().map(|c| (MarkerId::new(), c)));
    }

    pub fn clear_routes(&mut self) {
        self.routes.clear();
    }

    /// Remove facility pins and route overlays; the user marker stays
    pub fn clear_all(&mut self) {
        self.facilities.clear();
        self.routes.clear();
    }

    /// Move (or create) the user marker
    pub fn set_user_position(&mut self, position: Position) {
        let id = self.user.map(|(id, _)| id).unwrap_or_else(MarkerId::new);
        self.user = Some((id, position));
    }

    pub fn recenter(&mut self, center: Position, zoom: u8) {
        self.viewport = Viewport::Centered { center, zoom };
    }

    pub fn fit_bounds(&mut self, bounds: BoundingBox) {
        self.viewport = Viewport::Bounds { bounds };
    }

    pub fn user_position(&self) -> Option<Position> {
        self.user.map(|(_, p)| p)
    }

    pub fn facilities(&self) -> impl Iterator<Item = &FacilityRecord> {
        self.facilities.iter().map(|(_, r)| r)
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteCandidate> {
        self.routes.iter().map(|(_, c)| c)
    }

    pub fn facility_count(&self) -> usize {
        self.facilities.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Export the display for the rendering collaborator
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let mut features = Vec::with_capacity(1 + self.facilities.len() + self.routes.len());

        if let Some((id, position)) = &self.user {
            features.push(feature(
                id,
                point(position),
                json!({ "kind": "user", "popup": "📍 You are here" }),
            ));
        }

        for (id, record) in &self.facilities {
            features.push(feature(
                id,
                point(&record.position),
                json!({
                    "kind": "facility",
                    "category": record.category,
                    "name": record.display_name,
                    "phone": record.phone,
                    "popup": record.popup_text(),
                }),
            ));
        }

        for (id, candidate) in &self.routes {
            let line = candidate
                .geometry
                .iter()
                .map(|p| vec![p.longitude(), p.latitude()])
                .collect();
            features.push(feature(
                id,
                Value::LineString(line),
                json!({
                    "kind": "route",
                    "rank": candidate.rank,
                    "primary": candidate.rank == 0,
                    "distance_m": candidate.distance_m,
                    "duration_s": candidate.duration_s,
                }),
            ));
        }

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

fn point(position: &Position) -> Value {
    Value::Point(vec![position.longitude(), position.latitude()])
}

fn feature(id: &MarkerId, value: Value, properties: serde_json::Value) -> Feature {
    let properties: Option<JsonObject> = match properties {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    };
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: Some(Id::String(id.to_string())),
        properties,
        foreign_members: None,
    }
}

/// Map snapshot served to the rendering collaborator
#[derive(Debug, Serialize)]
pub struct MapSnapshot {
    pub viewport: Viewport,
    pub features: FeatureCollection,
}

/// Shared handle to the displayed [`MarkerSet`].
///
/// Generation checks and replacements run under one write lock, so a
/// superseded response can never interleave with a newer one.
#[derive(Clone, Default)]
pub struct MapState {
    inner: Arc<RwLock<MarkerSet>>,
}

impl MapState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, MarkerSet> {
        self.inner.read().await
    }

    pub async fn snapshot(&self) -> MapSnapshot {
        let markers = self.inner.read().await;
        MapSnapshot {
            viewport: markers.viewport(),
            features: markers.to_feature_collection(),
        }
    }

    /// Start a facility query; earlier queries become stale
    pub async fn begin_facility_query(&self) -> Generation {
        self.inner.write().await.facility_generation.advance()
    }

    pub async fn is_facility_query_current(&self, ticket: Generation) -> bool {
        self.inner.read().await.facility_generation.is_current(ticket)
    }

    /// Render a facility result if `ticket` is still the latest query.
    ///
    /// Routes belong to the previous selection, so they are cleared and any
    /// in-flight route request is superseded.
    pub async fn apply_facilities(
        &self,
        ticket: Generation,
        records: &[FacilityRecord],
    ) -> Result<()> {
        let mut markers = self.inner.write().await;
        if !markers.facility_generation.is_current(ticket) {
            debug!("Discarding stale facility result {:?}", ticket);
            return Err(RescuemapError::Superseded);
        }
        markers.replace_facility_markers(records);
        markers.clear_routes();
        markers.route_generation.advance();
        Ok(())
    }

    /// Start a route request; earlier route requests become stale
    pub async fn begin_route_request(&self) -> Generation {
        self.inner.write().await.route_generation.advance()
    }

    /// Draw every candidate and frame the primary one
    pub async fn apply_routes(
        &self,
        ticket: Generation,
        candidates: &[RouteCandidate],
    ) -> Result<()> {
        let mut markers = self.inner.write().await;
        if !markers.route_generation.is_current(ticket) {
            debug!("Discarding stale route result {:?}", ticket);
            return Err(RescuemapError::Superseded);
        }
        markers.replace_routes(candidates);
        if let Some(bounds) = candidates.first().and_then(RouteCandidate::bounding_box) {
            markers.fit_bounds(bounds);
        }
        Ok(())
    }

    /// Clear overlays after a failed route request, unless it was superseded
    pub async fn abandon_routes(&self, ticket: Generation) -> Result<()> {
        let mut markers = self.inner.write().await;
        if !markers.route_generation.is_current(ticket) {
            return Err(RescuemapError::Superseded);
        }
        markers.clear_routes();
        Ok(())
    }

    /// Move the user marker and follow it
    pub async fn show_user(&self, position: Position) {
        let mut markers = self.inner.write().await;
        markers.set_user_position(position);
        markers.recenter(position, FIX_ZOOM);
    }

    pub async fn clear_all(&self) {
        self.inner.write().await.clear_all();
    }
}
