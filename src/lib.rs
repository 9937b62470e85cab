pub mod alert;
pub mod api;
pub mod config;
pub mod generation;
pub mod location;
pub mod markers;
pub mod models;
pub mod places;
pub mod routing;
pub mod selection;

pub use models::*;

/// Common result type used throughout the library
pub type Result<T, E = RescuemapError> = std::result::Result<T, E>;

/// Application-wide error types
///
/// Every variant is recoverable: callers surface [`RescuemapError::notice`]
/// to the user and leave the session running.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RescuemapError {
    #[error("position unavailable: no location fix yet")]
    PositionUnavailable,

    #[error("invalid position: latitude {latitude}, longitude {longitude}")]
    InvalidPosition { latitude: f64, longitude: f64 },

    #[error("no {category} found within {radius_meters} m")]
    EmptyResult {
        category: FacilityCategory,
        radius_meters: u32,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("no route found")]
    NoRoute,

    #[error("response superseded by a newer request")]
    Superseded,

    #[error("selected facility has no phone number")]
    NoPhone,

    #[error("no emergency contacts configured")]
    NoContacts,

    #[error("no active selection")]
    NoSelection,

    #[error("selection refers to generation {requested}, current is {current}")]
    StaleSelection {
        requested: u64,
        current: u64,
    },

    #[error("unknown choice index {0}")]
    UnknownChoice(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure talking to an external provider
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("malformed provider response: {0}")]
    Decode(String),

    #[error("provider did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl From<ProviderError> for RescuemapError {
    fn from(e: ProviderError) -> Self {
        RescuemapError::Network(e.to_string())
    }
}

impl RescuemapError {
    /// Stable machine-readable name of the error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::PositionUnavailable => "position_unavailable",
            Self::InvalidPosition { .. } => "invalid_position",
            Self::EmptyResult { .. } => "empty_result",
            Self::Network(_) => "network_error",
            Self::NoRoute => "no_route",
            Self::Superseded => "superseded",
            Self::NoPhone => "no_phone",
            Self::NoContacts => "no_contacts",
            Self::NoSelection => "no_selection",
            Self::StaleSelection { .. } => "stale_selection",
            Self::UnknownChoice(_) => "unknown_choice",
            Self::Config(_) => "config",
        }
    }

    /// User-facing text for this condition
    pub fn notice(&self) -> String {
        match self {
            Self::PositionUnavailable => {
                "❌ Location not available! Please enable location services.".to_string()
            }
            Self::InvalidPosition { .. } => "❌ Invalid location reported.".to_string(),
            Self::EmptyResult {
                category,
                radius_meters,
            } => format!(
                "❌ No nearby {}s found within {}.",
                category.amenity_tag(),
                radius_text(*radius_meters)
            ),
            Self::Network(_) => {
                "❌ Error contacting the map service. Try again later.".to_string()
            }
            Self::NoRoute => "❌ No route could be found to this destination.".to_string(),
            Self::Superseded => "A newer request replaced this one.".to_string(),
            Self::NoPhone => "❌ No phone number available.".to_string(),
            Self::NoContacts => "❌ No emergency contacts configured.".to_string(),
            Self::NoSelection | Self::StaleSelection { .. } | Self::UnknownChoice(_) => {
                "❌ That selection is no longer available. Search again.".to_string()
            }
            Self::Config(msg) => format!("❌ Configuration problem: {}", msg),
        }
    }
}

/// Radius as shown to the user: whole kilometres, tenths, or plain metres
fn radius_text(radius_meters: u32) -> String {
    match radius_meters {
        m if m < 1000 => format!("{} m", m),
        m if m % 1000 == 0 => format!("{} km", m / 1000),
        m => format!("{:.1} km", f64::from(m) / 1000.0),
    }
}
