use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::convert::{to_fahrenheit, to_kelvin};

/// Inbound body of both `POST /validate` and `POST /cep`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalQuery {
    #[serde(default)]
    pub cep: String,
}

impl PostalQuery {
    pub fn new(cep: impl Into<String>) -> Self {
        Self { cep: cep.into() }
    }
}

/// Address record returned by the postal directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalRecord {
    #[serde(default)]
    pub cep: String,
    #[serde(default, rename = "logradouro")]
    pub street: String,
    #[serde(default, rename = "complemento")]
    pub complement: String,
    #[serde(default, rename = "localidade")]
    pub locality: String,
    #[serde(default, rename = "uf")]
    pub state_code: String,
    #[serde(default)]
    pub ibge: String,
    #[serde(default)]
    pub gia: String,
    #[serde(default)]
    pub ddd: String,
    #[serde(default)]
    pub siafi: String,
}

impl PostalRecord {
    /// True when every field is empty, which the directory uses for unknown codes.
    pub fn is_blank(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a postal code lookup that reached the directory and decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostalLookup {
    Found(PostalRecord),
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub tz_id: String,
    #[serde(default)]
    pub localtime_epoch: Option<i64>,
    #[serde(default)]
    pub localtime: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub code: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(default)]
    pub last_updated_epoch: Option<i64>,
    #[serde(default)]
    pub last_updated: String,
    pub temp_c: f64,
    #[serde(default)]
    pub temp_f: f64,
    #[serde(default)]
    pub is_day: i64,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub wind_mph: f64,
    #[serde(default)]
    pub wind_kph: f64,
    #[serde(default)]
    pub wind_degree: i64,
    #[serde(default)]
    pub wind_dir: String,
    #[serde(default)]
    pub pressure_mb: f64,
    #[serde(default)]
    pub pressure_in: f64,
    #[serde(default)]
    pub precip_mm: f64,
    #[serde(default)]
    pub precip_in: f64,
    #[serde(default)]
    pub humidity: i64,
    #[serde(default)]
    pub cloud: i64,
    #[serde(default)]
    pub feelslike_c: f64,
    #[serde(default)]
    pub feelslike_f: f64,
    #[serde(default)]
    pub vis_km: f64,
    #[serde(default)]
    pub vis_miles: f64,
    #[serde(default)]
    pub uv: f64,
    #[serde(default)]
    pub gust_mph: f64,
    #[serde(default)]
    pub gust_kph: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Current conditions for a locality, in the weather service's own schema.
///
/// Fields the service sends that are not modelled here are kept in `extra`
/// so that a decoded snapshot re-encodes to the same document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: WeatherLocation,
    pub current: CurrentConditions,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WeatherSnapshot {
    pub fn locality(&self) -> &str {
        &self.location.name
    }

    pub fn temperature_c(&self) -> f64 {
        self.current.temp_c
    }

    pub fn condition_text(&self) -> &str {
        &self.current.condition.text
    }

    pub fn condition_code(&self) -> i64 {
        self.current.condition.code
    }

    /// Observation time, falling back to the location's local clock and then to now.
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.current
            .last_updated_epoch
            .or(self.location.localtime_epoch)
            .and_then(unix_to_utc)
            .unwrap_or_else(Utc::now)
    }
}

/// Externally visible result of an enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub city: String,
    pub temp_c: f64,
    pub temp_f: f64,
    pub temp_k: f64,
}

impl EnrichedResult {
    pub fn from_celsius(city: impl Into<String>, temp_c: f64) -> Self {
        Self {
            city: city.into(),
            temp_c,
            temp_f: to_fahrenheit(temp_c),
            temp_k: to_kelvin(temp_c),
        }
    }
}

/// JSON error envelope: `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}
