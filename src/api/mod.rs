pub mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::location::LocationTracker;
use crate::markers::MapState;
use crate::selection::SelectionController;
use crate::RescuemapError;

/// Session state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<SelectionController>,
    pub tracker: Arc<LocationTracker>,
    pub map: MapState,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Geolocation fixes reported by the browser
        .route(
            "/location",
            get(handlers::get_location).post(handlers::report_fix),
        )
        .route("/location/failure", post(handlers::report_failure))
        // Facility search and selection
        .route("/places/:category", get(handlers::search_places))
        .route("/selection", post(handlers::submit_selection))
        // Emergency alert
        .route("/sos", post(handlers::send_sos))
        // Displayed annotations
        .route("/map", get(handlers::get_map).delete(handlers::clear_map));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl RescuemapError {
    fn status(&self) -> StatusCode {
        match self {
            Self::PositionUnavailable => StatusCode::PRECONDITION_FAILED,
            Self::InvalidPosition { .. } | Self::NoPhone => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EmptyResult { .. } | Self::NoRoute => StatusCode::NOT_FOUND,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Superseded | Self::NoSelection | Self::StaleSelection { .. } => {
                StatusCode::CONFLICT
            }
            Self::UnknownChoice(_) => StatusCode::BAD_REQUEST,
            Self::NoContacts => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RescuemapError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "notice": self.notice(),
        });
        (self.status(), Json(body)).into_response()
    }
}
