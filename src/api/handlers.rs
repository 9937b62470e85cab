use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::AppState;
use crate::location::GeolocationError;
use crate::selection::{Selection, SelectionOutcome};
use crate::{FacilityCategory, Position, RescuemapError};

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Fix reported by the browser's geolocation callback
#[derive(Debug, Deserialize)]
pub struct FixReport {
    pub latitude: f64,
    pub longitude: f64,
}

/// Failed geolocation attempt reported by the browser
#[derive(Debug, Deserialize)]
pub struct FailureReport {
    pub reason: GeolocationError,
}

/// Current tracker state
pub async fn get_location(State(state): State<AppState>) -> impl IntoResponse {
    let location = state.controller.location().state();
    let notice = location.failure.map(|f| f.notice());
    Json(json!({
        "fix": location.fix,
        "failure": location.failure,
        "notice": notice,
    }))
}

/// Record a successful fix
pub async fn report_fix(
    State(state): State<AppState>,
    Json(report): Json<FixReport>,
) -> impl IntoResponse {
    match Position::new(report.latitude, report.longitude) {
        Ok(position) => {
            state.tracker.record_fix(position).await;
            Json(json!({ "position": position })).into_response()
        }
        Err(e) => {
            warn!("Rejected fix report {:?}: {}", report, e);
            e.into_response()
        }
    }
}

/// Record a failed fix
pub async fn report_failure(
    State(state): State<AppState>,
    Json(report): Json<FailureReport>,
) -> impl IntoResponse {
    state.tracker.record_failure(report.reason);
    Json(json!({
        "failure": report.reason,
        "notice": report.reason.notice(),
    }))
}

/// Search facilities around the current position
pub async fn search_places(
    Path(category): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let category: FacilityCategory = match category.parse() {
        Ok(category) => category,
        Err(e) => {
            warn!("Rejected search: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e }))).into_response();
        }
    };

    match state.controller.search(category).await {
        Ok(choices) => Json(choices).into_response(),
        Err(e @ RescuemapError::Network(_)) => {
            error!("Failed to search {}: {}", category, e);
            e.into_response()
        }
        Err(e) => {
            warn!("Search for {} ended without results: {}", category, e);
            e.into_response()
        }
    }
}

/// Act on the user's choice
pub async fn submit_selection(
    State(state): State<AppState>,
    Json(selection): Json<Selection>,
) -> impl IntoResponse {
    match state.controller.choose(selection).await {
        Ok(outcome) => {
            let notice = match &outcome {
                SelectionOutcome::RouteDisplayed { .. } => {
                    Some("🚗 Routes displayed! Follow the blue line to reach your destination.")
                }
                _ => None,
            };
            Json(json!({
                "outcome": outcome,
                "notice": notice,
            }))
            .into_response()
        }
        Err(e) => {
            warn!("Selection failed: {}", e);
            e.into_response()
        }
    }
}

/// Broadcast the emergency alert
pub async fn send_sos(State(state): State<AppState>) -> impl IntoResponse {
    match state.controller.sos() {
        Ok(receipt) => Json(json!({
            "alert": receipt.alert,
            "links": receipt.links,
            "notice": "🚨 SOS Activated! Live location sent.",
        }))
        .into_response(),
        Err(e) => {
            error!("Failed to send SOS: {}", e);
            e.into_response()
        }
    }
}

/// Displayed annotations as GeoJSON
pub async fn get_map(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.map.snapshot().await)
}

/// Remove facility pins and routes
pub async fn clear_map(State(state): State<AppState>) -> impl IntoResponse {
    state.controller.clear_display().await;
    StatusCode::NO_CONTENT
}
