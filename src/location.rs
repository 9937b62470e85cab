use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::markers::MapState;
use crate::{Position, RescuemapError, Result};

/// Why the device could not produce a fix
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("geolocation unsupported")]
    Unsupported,
}

impl GeolocationError {
    /// User-facing text for this failure
    pub fn notice(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "❌ Location access denied! Enable location to see nearby places."
            }
            Self::Unsupported => "❌ Geolocation is not supported by this device.",
        }
    }
}

/// Device geolocation capability
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Result<Position, GeolocationError>;
}

/// Geolocator for devices installed at a known place
pub struct StaticGeolocator {
    position: Position,
}

impl StaticGeolocator {
    pub fn new(position: Position) -> Self {
        Self { position }
    }
}

#[async_trait]
impl Geolocator for StaticGeolocator {
    async fn current_position(&self) -> Result<Position, GeolocationError> {
        Ok(self.position)
    }
}

/// Geolocator for hosts that push fixes through [`LocationTracker::record_fix`]
pub struct PushOnlyGeolocator;

#[async_trait]
impl Geolocator for PushOnlyGeolocator {
    async fn current_position(&self) -> Result<Position, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}

/// A single resolved reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fix {
    pub position: Position,
    pub obtained_at: DateTime<Utc>,
}

/// Contents of the location cell
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationState {
    /// Latest fix; never cleared once set
    pub fix: Option<Fix>,
    /// Failure from the most recent attempt, if it failed
    pub failure: Option<GeolocationError>,
}

/// Read-only view of the tracked position
#[derive(Clone)]
pub struct LocationReader {
    rx: watch::Receiver<LocationState>,
}

impl LocationReader {
    /// Latest position, or `PositionUnavailable` before the first fix
    pub fn current_position(&self) -> Result<Position> {
        self.rx
            .borrow()
            .fix
            .map(|fix| fix.position)
            .ok_or(RescuemapError::PositionUnavailable)
    }

    pub fn state(&self) -> LocationState {
        self.rx.borrow().clone()
    }
}

/// Sole owner and writer of the user position
pub struct LocationTracker {
    tx: watch::Sender<LocationState>,
    geolocator: Arc<dyn Geolocator>,
    map: MapState,
}

impl LocationTracker {
    pub fn new(geolocator: Arc<dyn Geolocator>, map: MapState) -> Self {
        let (tx, _rx) = watch::channel(LocationState::default());
        Self {
            tx,
            geolocator,
            map,
        }
    }

    pub fn reader(&self) -> LocationReader {
        LocationReader {
            rx: self.tx.subscribe(),
        }
    }

    /// Ask the geolocator for one fix and record the outcome
    pub async fn refresh(&self) -> Result<Position, GeolocationError> {
        match self.geolocator.current_position().await {
            Ok(position) => {
                self.record_fix(position).await;
                Ok(position)
            }
            Err(e) => {
                self.record_failure(e);
                Err(e)
            }
        }
    }

    /// Overwrite the position and follow it on the map
    pub async fn record_fix(&self, position: Position) {
        info!(
            "Location fix: {:.5}, {:.5}",
            position.latitude(),
            position.longitude()
        );
        self.tx.send_modify(|state| {
            state.fix = Some(Fix {
                position,
                obtained_at: Utc::now(),
            });
            state.failure = None;
        });
        self.map.show_user(position).await;
    }

    /// Note a failed attempt; an earlier fix stays readable
    pub fn record_failure(&self, error: GeolocationError) {
        warn!("Location unavailable: {}", error);
        self.tx.send_modify(|state| state.failure = Some(error));
    }

    /// Refresh now and then every `period` until `cancel` fires
    pub fn spawn(self: Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Location refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.refresh().await {
                            debug!("Refresh tick without fix: {}", e);
                        }
                    }
                }
            }
        })
    }
}
