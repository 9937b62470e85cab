use anyhow::Context;
use rescuemap_backend::{
    alert::{AlertDispatcher, DeepLinkBuilder},
    api::{create_router, AppState},
    config::Config,
    location::{Geolocator, LocationTracker, PushOnlyGeolocator, StaticGeolocator},
    markers::MapState,
    places::{OverpassClient, PlaceFinder},
    routing::{OsrmClient, RouteCalculator},
    selection::SelectionController,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Rescuemap backend server");

    // Load configuration
    let config = Config::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    info!("Configuration loaded: {:?}", config);
    if config.session.contacts.is_empty() {
        warn!("No emergency contacts configured; SOS will be rejected");
    }

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.providers.user_agent.clone())
        .build()
        .context("failed to build HTTP client")?;

    // Session components
    let map = MapState::new();
    let links = Arc::new(DeepLinkBuilder);

    let geolocator: Arc<dyn Geolocator> = match config.session.device_position {
        Some(position) => Arc::new(StaticGeolocator::new(position)),
        None => Arc::new(PushOnlyGeolocator),
    };
    let tracker = Arc::new(LocationTracker::new(geolocator, map.clone()));

    let finder = PlaceFinder::new(
        Arc::new(OverpassClient::new(
            http.clone(),
            config.providers.overpass_url.clone(),
        )),
        config.session.radius_meters,
        config.request_timeout(),
    );
    let router = RouteCalculator::new(
        Arc::new(OsrmClient::new(http, config.providers.osrm_url.clone())),
        map.clone(),
        config.request_timeout(),
    );
    let alerts = AlertDispatcher::new(links.clone(), links.clone());
    let controller = Arc::new(SelectionController::new(
        tracker.reader(),
        finder,
        router,
        map.clone(),
        alerts,
        links,
        config.session.contacts.clone(),
    ));

    let shutdown = CancellationToken::new();
    let refresh = config
        .session
        .device_position
        .map(|_| tracker.clone().spawn(config.refresh_interval(), shutdown.clone()));

    // Create router
    let app = create_router(AppState {
        controller,
        tracker,
        map,
    });

    // Create listener
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await?;

    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Health check: http://{}:{}/api/health",
        config.server.host, config.server.port
    );

    // Start server
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = refresh {
        handle.await?;
    }

    info!("Server stopped");
    Ok(())
}
