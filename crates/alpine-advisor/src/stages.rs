//! Typed stages of the describe pipeline: truncate, localize, render.
//!
//! Fetching lives in the adapters and summarizing in [`Summarizer`]; the
//! stages here are pure so each step can be checked on its own.
//!
//! [`Summarizer`]: crate::summarizer::Summarizer

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::sources::RawForecast;

/// Forecast points kept for summarization.
pub const FORECAST_HORIZON: usize = 24;

/// One forecast hour in the location's local time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub time: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// A localized, bounded forecast series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSeries {
    pub timezone: String,
    pub units: BTreeMap<String, String>,
    pub points: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// JSON text handed to the summarizer.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"))
    }
}

/// Keep the first `horizon` points.
pub fn truncate_forecast(mut raw: RawForecast, horizon: usize) -> RawForecast {
    raw.points.truncate(horizon);
    raw
}

/// Convert UTC unix timestamps to the forecast location's offset.
///
/// An offset the provider should never send falls back to UTC; points with
/// unrepresentable timestamps are dropped.
pub fn localize_forecast(raw: RawForecast) -> ForecastSeries {
    let offset = FixedOffset::east_opt(raw.utc_offset_seconds).unwrap_or_else(|| {
        tracing::warn!(offset = raw.utc_offset_seconds, "Invalid UTC offset, using UTC");
        Utc.fix()
    });

    let points = raw
        .points
        .into_iter()
        .filter_map(|point| {
            let time = DateTime::from_timestamp(point.timestamp, 0)?.with_timezone(&offset);
            Some(ForecastPoint {
                time,
                fields: point.fields,
            })
        })
        .collect();

    ForecastSeries {
        timezone: raw.timezone,
        units: raw.units,
        points,
    }
}
