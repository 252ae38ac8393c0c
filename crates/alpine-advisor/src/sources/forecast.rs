//! Hourly weather forecast adapter (Open-Meteo).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::http::{build_client, endpoint, get_json};
use crate::error::FetchError;
use crate::geo::Coordinate;

const SERVICE: &str = "forecast";
pub const DEFAULT_FORECAST_BASE: &str = "https://api.open-meteo.com/v1";

/// Hourly variables requested from the provider.
const HOURLY_FIELDS: &str = "temperature_2m,apparent_temperature,precipitation,snowfall,\
freezing_level_height,cloud_cover,weather_code,wind_speed_10m,wind_gusts_10m,wind_direction_10m";

/// One forecast hour as delivered: UTC unix time plus measured fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawForecastPoint {
    pub timestamp: i64,
    pub fields: BTreeMap<String, Value>,
}

/// An hourly series with the location's UTC offset, not yet localized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawForecast {
    pub timezone: String,
    pub utc_offset_seconds: i32,
    /// Units per field, e.g. `temperature_2m -> °C`.
    pub units: BTreeMap<String, String>,
    pub points: Vec<RawForecastPoint>,
}

/// Access to point forecasts.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn forecast(&self, at: Coordinate) -> Result<RawForecast, FetchError>;
}

/// HTTP client for the Open-Meteo forecast API.
pub struct OpenMeteoClient {
    client: Client,
    base_url: String,
    forecast_days: u8,
}

impl OpenMeteoClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(SERVICE, timeout)?,
            base_url: DEFAULT_FORECAST_BASE.to_string(),
            forecast_days: 3,
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn forecast(&self, at: Coordinate) -> Result<RawForecast, FetchError> {
        tracing::debug!(%at, "Fetching forecast");
        let request = self.client.get(endpoint(&self.base_url, "forecast")).query(&[
            ("latitude", at.lat().to_string()),
            ("longitude", at.lon().to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
            ("timeformat", "unixtime".to_string()),
            ("wind_speed_unit", "kmh".to_string()),
            ("forecast_days", self.forecast_days.to_string()),
        ]);
        let response: OpenMeteoResponse = get_json(SERVICE, request).await?;
        response.into_forecast()
    }
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    utc_offset_seconds: i32,
    hourly: Map<String, Value>,
    #[serde(default)]
    hourly_units: BTreeMap<String, String>,
}

impl OpenMeteoResponse {
    /// Pivot the column-per-field layout into one record per hour.
    fn into_forecast(mut self) -> Result<RawForecast, FetchError> {
        let times = match self.hourly.remove("time") {
            Some(Value::Array(times)) => times,
            _ => return Err(FetchError::decode(SERVICE, "hourly.time missing")),
        };

        let mut points = Vec::with_capacity(times.len());
        for (i, time) in times.iter().enumerate() {
            let timestamp = time
                .as_i64()
                .ok_or_else(|| FetchError::decode(SERVICE, format!("bad timestamp {time}")))?;
            let fields = self
                .hourly
                .iter()
                .map(|(name, column)| {
                    let value = column.get(i).cloned().unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect();
            points.push(RawForecastPoint { timestamp, fields });
        }

        self.hourly_units.remove("time");
        Ok(RawForecast {
            timezone: self.timezone,
            utc_offset_seconds: self.utc_offset_seconds,
            units: self.hourly_units,
            points,
        })
    }
}
