//! Per-route advisory: topo, avalanche bulletin and forecast in one fragment.

use std::sync::Arc;

use serde::Serialize;

use crate::crossref::RangeCrossReference;
use crate::error::{AdvisorError, Result};
use crate::geo::Coordinate;
use crate::sources::{AvalancheSource, ForecastSource, RouteCatalog, RouteTopo};
use crate::stages::{FORECAST_HORIZON, localize_forecast, truncate_forecast};
use crate::summarizer::Summarizer;

/// A summarized conditions field, or why it could not be produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Conditions {
    Available { summary: String, summarized: bool },
    Unavailable { reason: String },
}

impl Conditions {
    pub fn is_available(&self) -> bool {
        matches!(self, Conditions::Available { .. })
    }
}

/// Everything known about one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteFragment {
    /// The topo as the catalog returned it, never summarized.
    pub route_info: RouteTopo,
    pub avalanche_conditions: Conditions,
    pub daily_weather_forecast: Conditions,
    pub route_link: String,
}

/// Conditions around a location, without a specific route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaConditions {
    pub forecast: Conditions,
    pub avalanche_conditions: Conditions,
}

/// A payload ready for the summarizer, or the reason there is none.
type StageOutput = std::result::Result<String, String>;

/// Combines the catalog, bulletin and forecast sources with the summarizer.
#[derive(Clone)]
pub struct RouteAdvisor {
    catalog: Arc<dyn RouteCatalog>,
    avalanche: Arc<dyn AvalancheSource>,
    forecast: Arc<dyn ForecastSource>,
    crossref: Arc<RangeCrossReference>,
    summarizer: Summarizer,
    horizon: usize,
}

impl RouteAdvisor {
    pub fn new(
        catalog: Arc<dyn RouteCatalog>,
        avalanche: Arc<dyn AvalancheSource>,
        forecast: Arc<dyn ForecastSource>,
        crossref: Arc<RangeCrossReference>,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            catalog,
            avalanche,
            forecast,
            crossref,
            summarizer,
            horizon: FORECAST_HORIZON,
        }
    }

    /// Number of forecast points kept before summarizing.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn RouteCatalog> {
        &self.catalog
    }

    pub fn crossref(&self) -> &RangeCrossReference {
        &self.crossref
    }

    /// Describe one route.
    ///
    /// Only a failed topo fetch is an error. Bulletin and forecast failures
    /// come back as [`Conditions::Unavailable`].
    pub async fn describe(&self, route_id: &str, range_id: &str) -> Result<RouteFragment> {
        let route_id = route_id.trim();
        tracing::info!(route_id, range_id, "Describing route");

        let topo = self
            .catalog
            .topo(route_id)
            .await
            .map_err(|source| AdvisorError::TopoUnavailable {
                route_id: route_id.to_string(),
                source,
            })?;

        let (bulletin, forecast) = tokio::join!(
            self.bulletin_payload(range_id),
            self.forecast_payload(topo.start),
        );
        let (avalanche_conditions, daily_weather_forecast) =
            tokio::join!(self.summarize(bulletin), self.summarize(forecast));

        Ok(RouteFragment {
            route_link: topo.detail_link.clone(),
            route_info: topo,
            avalanche_conditions,
            daily_weather_forecast,
        })
    }

    /// Forecast at `at` and the bulletin for the catalog massif `range_id`.
    pub async fn area_conditions(&self, at: Coordinate, range_id: &str) -> AreaConditions {
        let (bulletin, forecast) = tokio::join!(
            self.bulletin_payload(range_id),
            self.forecast_payload(Some(at)),
        );
        let (avalanche_conditions, forecast) =
            tokio::join!(self.summarize(bulletin), self.summarize(forecast));

        AreaConditions {
            forecast,
            avalanche_conditions,
        }
    }

    async fn bulletin_payload(&self, range_id: &str) -> StageOutput {
        let weather_id = self.crossref.to_weather_space(range_id).map_err(|e| {
            tracing::warn!(range_id, error = %e, "No bulletin mapping");
            format!("No avalanche bulletin is mapped to this mountain range ({e}).")
        })?;

        match self.avalanche.bulletin(weather_id).await {
            Ok(bulletin) => Ok(bulletin.raw_text),
            Err(e) => {
                tracing::warn!(range_id, weather_id, error = %e, "Bulletin unavailable");
                Err(format!("The avalanche bulletin could not be retrieved: {e}."))
            }
        }
    }

    async fn forecast_payload(&self, at: Option<Coordinate>) -> StageOutput {
        let Some(at) = at else {
            return Err("The route has no start coordinate to forecast for.".to_string());
        };

        match self.forecast.forecast(at).await {
            Ok(raw) => Ok(localize_forecast(truncate_forecast(raw, self.horizon)).to_payload()),
            Err(e) => {
                tracing::warn!(%at, error = %e, "Forecast unavailable");
                Err(format!("The weather forecast could not be retrieved: {e}."))
            }
        }
    }

    async fn summarize(&self, payload: StageOutput) -> Conditions {
        match payload {
            Ok(payload) => {
                let summary = self.summarizer.summarize_or_raw(&payload).await;
                Conditions::Available {
                    summary: summary.text,
                    summarized: summary.summarized,
                }
            }
            Err(reason) => Conditions::Unavailable { reason },
        }
    }
}
