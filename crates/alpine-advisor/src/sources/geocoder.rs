//! Free-text location resolution via Google Places text search.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::http::{build_client, endpoint, get_json};
use crate::error::FetchError;
use crate::geo::Coordinate;

const SERVICE: &str = "geocoder";
pub const DEFAULT_GEOCODER_BASE: &str = "https://maps.googleapis.com/maps/api";

/// Resolves a place description to a coordinate.
///
/// Every failure mode collapses to `None`: callers treat an unresolvable
/// location the same way regardless of cause.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Option<Coordinate>;
}

/// Google Places text-search geocoder. One request per call, no retry.
pub struct PlacesGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PlacesGeocoder {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(SERVICE, timeout)?,
            base_url: DEFAULT_GEOCODER_BASE.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn lookup(&self, query: &str) -> Result<Option<Coordinate>, FetchError> {
        let request = self
            .client
            .get(endpoint(&self.base_url, "place/textsearch/json"))
            .query(&[("query", query), ("key", self.api_key.as_str())]);
        let response: PlacesResponse = get_json(SERVICE, request).await?;

        if response.status != "OK" && response.status != "ZERO_RESULTS" {
            tracing::warn!(status = %response.status, "Places search returned an error status");
        }

        let Some(first) = response.results.into_iter().next() else {
            return Ok(None);
        };
        let location = first.geometry.location;
        Ok(Coordinate::new(location.lat, location.lng).ok())
    }
}

#[async_trait]
impl GeoResolver for PlacesGeocoder {
    async fn resolve(&self, query: &str) -> Option<Coordinate> {
        match self.lookup(query).await {
            Ok(Some(coord)) => {
                tracing::debug!(query, %coord, "Resolved location");
                Some(coord)
            }
            Ok(None) => {
                tracing::warn!(query, "Location could not be resolved");
                None
            }
            Err(e) => {
                tracing::warn!(query, error = %e, "Geocoding failed");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    #[serde(default)]
    results: Vec<PlaceResult>,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}
