use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::places::{DEFAULT_OVERPASS_URL, DEFAULT_RADIUS_METERS};
use crate::routing::DEFAULT_OSRM_URL;
use crate::{Position, RescuemapError, Result};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub providers: ProviderConfig,
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// External provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub overpass_url: String,
    pub osrm_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

/// Emergency session settings
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub contacts: Vec<String>,
    pub radius_meters: u32,
    pub refresh_interval_ms: u64,
    /// Fixed device position; enables the timer-driven tracker
    pub device_position: Option<Position>,
}

impl fmt::Debug for SessionConfig {
    // contact numbers stay out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("contacts", &self.contacts.len())
            .field("radius_meters", &self.radius_meters)
            .field("refresh_interval_ms", &self.refresh_interval_ms)
            .field("device_position", &self.device_position)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3001,
            },
            providers: ProviderConfig {
                overpass_url: DEFAULT_OVERPASS_URL.to_string(),
                osrm_url: DEFAULT_OSRM_URL.to_string(),
                request_timeout_secs: 12,
                user_agent: concat!("rescuemap/", env!("CARGO_PKG_VERSION")).to_string(),
            },
            session: SessionConfig {
                contacts: Vec::new(),
                radius_meters: DEFAULT_RADIUS_METERS,
                refresh_interval_ms: 300_000, // 5 minutes
                device_position: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("RESCUEMAP_HOST") {
            config.server.host = host;
        }

        if let Some(port) = lookup("RESCUEMAP_PORT") {
            config.server.port = parse_var("RESCUEMAP_PORT", &port)?;
        }

        if let Some(url) = lookup("RESCUEMAP_OVERPASS_URL") {
            config.providers.overpass_url = url;
        }

        if let Some(url) = lookup("RESCUEMAP_OSRM_URL") {
            config.providers.osrm_url = url;
        }

        if let Some(secs) = lookup("RESCUEMAP_TIMEOUT_SECS") {
            config.providers.request_timeout_secs = parse_var("RESCUEMAP_TIMEOUT_SECS", &secs)?;
        }

        if let Some(contacts) = lookup("RESCUEMAP_CONTACTS") {
            config.session.contacts = contacts
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(radius) = lookup("RESCUEMAP_RADIUS_METERS") {
            config.session.radius_meters = parse_var("RESCUEMAP_RADIUS_METERS", &radius)?;
        }

        if let Some(interval) = lookup("RESCUEMAP_REFRESH_INTERVAL_MS") {
            config.session.refresh_interval_ms =
                parse_var("RESCUEMAP_REFRESH_INTERVAL_MS", &interval)?;
        }

        if let Some(position) = lookup("RESCUEMAP_DEVICE_POSITION") {
            config.session.device_position = Some(Position::parse_pair(&position)?);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RescuemapError::Config("Invalid port number".to_string()));
        }

        if self.session.radius_meters == 0 {
            return Err(RescuemapError::Config(
                "Search radius must be greater than 0".to_string(),
            ));
        }

        if self.session.refresh_interval_ms == 0 {
            return Err(RescuemapError::Config(
                "Refresh interval must be greater than 0".to_string(),
            ));
        }

        if !(1..=60).contains(&self.providers.request_timeout_secs) {
            return Err(RescuemapError::Config(
                "Request timeout must be between 1 and 60 seconds".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.session.refresh_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RescuemapError::Config(format!("{} has invalid value '{}'", key, value)))
}
