use geo::{BoundingRect, HaversineDistance, LineString, Point};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RescuemapError;

/// A validated WGS84 coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawPosition {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawPosition> for Position {
    type Error = RescuemapError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        Position::new(raw.latitude, raw.longitude)
    }
}

impl Position {
    /// Create a position, rejecting NaN and out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RescuemapError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(RescuemapError::InvalidPosition {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// For compile-time constants already known to be in range
    pub(crate) const fn new_unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &Position) -> f64 {
        Point::from(*self).haversine_distance(&Point::from(*other))
    }

    /// Parse the `lat,lon` form used in configuration
    pub fn parse_pair(text: &str) -> Result<Self, RescuemapError> {
        let invalid = || RescuemapError::Config(format!("invalid position '{}'", text));
        let (lat, lon) = text.split_once(',').ok_or_else(invalid)?;
        let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
        let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;
        Position::new(lat, lon)
    }
}

impl From<Position> for Point<f64> {
    fn from(position: Position) -> Self {
        Point::new(position.longitude, position.latitude)
    }
}

/// Facility categories that can be searched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityCategory {
    Hospital,
    Police,
}

impl FacilityCategory {
    /// OSM `amenity` tag value
    pub fn amenity_tag(&self) -> &'static str {
        match self {
            Self::Hospital => "hospital",
            Self::Police => "police",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Hospital => "🏥",
            Self::Police => "🚔",
        }
    }

    /// Name used when the provider supplies none, e.g. "🏥 Hospital"
    pub fn fallback_name(&self) -> String {
        let tag = self.amenity_tag();
        let mut chars = tag.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{} {}", self.emoji(), capitalized)
    }
}

impl fmt::Display for FacilityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.amenity_tag())
    }
}

impl FromStr for FacilityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hospital" | "medical" => Ok(Self::Hospital),
            "police" => Ok(Self::Police),
            other => Err(format!("unknown facility category '{}'", other)),
        }
    }
}

/// A facility returned by one place query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub osm_id: Option<i64>,
    pub position: Position,
    pub category: FacilityCategory,
    pub display_name: String,
    pub phone: Option<String>,
    pub distance_m: f64,
}

impl FacilityRecord {
    /// Popup text shown on the facility pin
    pub fn popup_text(&self) -> String {
        format!("{} {}", self.category.emoji(), self.display_name)
    }
}

/// A transient request for facilities around an origin
#[derive(Debug, Clone, PartialEq)]
pub struct FacilityQuery {
    pub origin: Position,
    pub category: FacilityCategory,
    pub radius_meters: u32,
}

impl FacilityQuery {
    pub fn new(origin: Position, category: FacilityCategory, radius_meters: u32) -> Self {
        Self {
            origin,
            category,
            radius_meters,
        }
    }
}

/// One candidate route, in provider order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub rank: usize,
    pub geometry: Vec<Position>,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
}

impl RouteCandidate {
    /// Bounding box of the path, `None` for an empty geometry
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_positions(&self.geometry)
    }
}

/// Geographic bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Smallest box containing every position
    pub fn from_positions(positions: &[Position]) -> Option<Self> {
        let line: LineString<f64> = positions
            .iter()
            .map(|p| (p.longitude(), p.latitude()))
            .collect();
        line.bounding_rect().map(|rect| {
            Self::new(rect.min().y, rect.min().x, rect.max().y, rect.max().x)
        })
    }
}

/// An SOS message built fresh for each activation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyAlert {
    pub position: Position,
    pub contacts: Vec<String>,
    pub message: String,
}

impl EmergencyAlert {
    pub fn new(position: Position, contacts: &[String]) -> Self {
        let message = format!(
            "🚨 EMERGENCY ALERT! 🚨\nI need immediate assistance. My live location:\n{}",
            Self::map_link(&position)
        );
        Self {
            position,
            contacts: contacts.to_vec(),
            message,
        }
    }

    /// Link that opens the position in a web map
    pub fn map_link(position: &Position) -> String {
        format!(
            "https://maps.google.com/?q={},{}",
            position.latitude(),
            position.longitude()
        )
    }
}
