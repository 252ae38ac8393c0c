//! Route catalog adapter (skitour.fr JSON API).
//!
//! The API is loosely typed: ids and numbers arrive as either strings or
//! numbers, and coordinates as string pairs. Wire shapes are decoded
//! leniently into the types below.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::http::{build_client, endpoint, get_json, get_text};
use crate::error::FetchError;
use crate::geo::Coordinate;
use crate::ranges::Summit;

const SERVICE: &str = "catalog";
pub const DEFAULT_CATALOG_BASE: &str = "https://skitour.fr/api/";
pub const DEFAULT_TOPO_LINK_BASE: &str = "https://skitour.fr/topos/";

/// Days of trip reports requested by [`RouteCatalog::recent_outings`].
const OUTING_WINDOW_DAYS: u32 = 30;
/// Concurrent `sortie/{id}` requests while expanding outings.
const OUTING_FETCH_CONCURRENCY: usize = 4;

/// A massif as numbered by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMassif {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename(deserialize = "nom"))]
    pub name: String,
}

/// A ski-touring route. The recognised fields are normalized; everything
/// else the catalog sent is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteTopo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_id: Option<String>,
    pub detail_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ski_grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ascent_grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A mountain hut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refuge {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, rename(deserialize = "nom"))]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A recent trip report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outing {
    pub id: String,
    /// `YYYY-MM-DD`, UTC.
    pub date: Option<String>,
    pub description: String,
}

/// Read access to the route catalog.
#[async_trait]
pub trait RouteCatalog: Send + Sync {
    async fn massifs(&self) -> Result<Vec<CatalogMassif>, FetchError>;

    /// Routes in the given comma-joined massif ids.
    async fn routes(&self, massif_ids: &str) -> Result<Vec<RouteTopo>, FetchError>;

    async fn topo(&self, route_id: &str) -> Result<RouteTopo, FetchError>;

    async fn refuges(&self, massif_ids: &str) -> Result<Vec<Refuge>, FetchError>;

    /// Trip reports from the last month, each with its description.
    async fn recent_outings(&self, massif_id: &str) -> Result<Vec<Outing>, FetchError>;

    async fn summits(&self, massif_ids: &str) -> Result<Vec<Summit>, FetchError>;
}

/// HTTP client for the skitour.fr API.
pub struct SkitourClient {
    client: Client,
    base_url: String,
    link_base: String,
    api_key: String,
}

impl SkitourClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(SERVICE, timeout)?,
            base_url: DEFAULT_CATALOG_BASE.to_string(),
            link_base: DEFAULT_TOPO_LINK_BASE.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Base of the public topo pages used for `detail_link`.
    pub fn with_link_base(mut self, url: impl Into<String>) -> Self {
        self.link_base = url.into();
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        tracing::debug!(path, "Catalog request");
        self.client
            .get(endpoint(&self.base_url, path))
            .header("cle", &self.api_key)
    }

    fn topo_from_value(&self, value: Value) -> Result<RouteTopo, FetchError> {
        let wire: WireTopo =
            serde_json::from_value(value).map_err(|e| FetchError::decode(SERVICE, e))?;
        Ok(wire.into_topo(&self.link_base))
    }

    async fn outing_description(&self, outing_id: &str) -> String {
        let request = self.get(&format!("sortie/{outing_id}"));
        match get_json::<Value>(SERVICE, request).await {
            Ok(detail) => describe_outing(&detail),
            Err(e) => {
                tracing::warn!(outing_id, error = %e, "Outing detail unavailable");
                format!("Description unavailable: {e}")
            }
        }
    }
}

#[async_trait]
impl RouteCatalog for SkitourClient {
    async fn massifs(&self) -> Result<Vec<CatalogMassif>, FetchError> {
        get_json(SERVICE, self.get("massifs")).await
    }

    async fn routes(&self, massif_ids: &str) -> Result<Vec<RouteTopo>, FetchError> {
        let request = self.get("topos").query(&[("m", normalize_ids(massif_ids))]);
        let body = get_text(SERVICE, request).await?;
        let items: Vec<Value> = serde_json::from_str(&repair_backslashes(&body))
            .map_err(|e| FetchError::decode(SERVICE, e))?;

        let mut routes = Vec::with_capacity(items.len());
        for item in items {
            match self.topo_from_value(item) {
                Ok(topo) => routes.push(topo),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed topo"),
            }
        }
        Ok(routes)
    }

    async fn topo(&self, route_id: &str) -> Result<RouteTopo, FetchError> {
        let request = self.get(&format!("topo/{}", route_id.trim()));
        let value: Value = get_json(SERVICE, request).await?;
        self.topo_from_value(value)
    }

    async fn refuges(&self, massif_ids: &str) -> Result<Vec<Refuge>, FetchError> {
        let request = self.get("refuges").query(&[("m", normalize_ids(massif_ids))]);
        get_json(SERVICE, request).await
    }

    async fn recent_outings(&self, massif_id: &str) -> Result<Vec<Outing>, FetchError> {
        let request = self.get("sorties").query(&[
            ("m", massif_id.trim().to_string()),
            ("j", OUTING_WINDOW_DAYS.to_string()),
        ]);
        // An empty window comes back as `null` or `[]`.
        let listed: Option<Vec<WireOuting>> = get_json(SERVICE, request).await?;
        let listed = listed.unwrap_or_default();

        let outings: Vec<Outing> = futures::stream::iter(listed)
            .map(|wire| async move {
                let description = self.outing_description(&wire.id).await;
                Outing {
                    date: wire.date.as_ref().and_then(format_unix_date),
                    id: wire.id,
                    description,
                }
            })
            .buffered(OUTING_FETCH_CONCURRENCY)
            .collect()
            .await;
        Ok(outings)
    }

    async fn summits(&self, massif_ids: &str) -> Result<Vec<Summit>, FetchError> {
        let request = self.get("sommets").query(&[("m", normalize_ids(massif_ids))]);
        let items: Vec<WireSummit> = get_json(SERVICE, request).await?;
        Ok(items.into_iter().filter_map(WireSummit::into_summit).collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire decoding
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireTopo {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default, deserialize_with = "de_opt_text")]
    nom: Option<String>,
    #[serde(default)]
    massif: Option<Value>,
    #[serde(default)]
    depart: Option<Value>,
    #[serde(default, deserialize_with = "de_opt_text")]
    dif_ski: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    dif_montee: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    expo: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl WireTopo {
    fn into_topo(self, link_base: &str) -> RouteTopo {
        let range_id = self.massif.as_ref().and_then(|m| match m {
            Value::Object(fields) => fields.get("id").and_then(value_text),
            other => value_text(other),
        });
        let start = self
            .depart
            .as_ref()
            .and_then(|d| d.get("latlon"))
            .and_then(parse_latlon);

        // Keep the raw nested objects for the caller.
        let mut extra = self.extra;
        if let Some(massif) = self.massif {
            extra.insert("massif".to_string(), massif);
        }
        if let Some(depart) = self.depart {
            extra.insert("depart".to_string(), depart);
        }

        RouteTopo {
            detail_link: format!("{}/{}", link_base.trim_end_matches('/'), self.id),
            name: self.nom.unwrap_or_default(),
            id: self.id,
            start,
            range_id,
            ski_grade: self.dif_ski,
            ascent_grade: self.dif_montee,
            exposure: self.expo,
            extra,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireOuting {
    #[serde(deserialize_with = "de_id")]
    id: String,
    #[serde(default)]
    date: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireSummit {
    #[serde(deserialize_with = "de_id")]
    sommet: String,
    latlon: Value,
    #[serde(default)]
    massif: Option<Value>,
}

impl WireSummit {
    fn into_summit(self) -> Option<Summit> {
        let coordinate = parse_latlon(&self.latlon);
        let range = self
            .massif
            .as_ref()
            .and_then(|m| m.get("nom"))
            .and_then(value_text);
        match (coordinate, range) {
            (Some(coordinate), Some(range)) => Some(Summit {
                name: self.sommet,
                coordinate,
                range,
            }),
            _ => {
                tracing::warn!(summit = %self.sommet, "Skipping summit without position or range");
                None
            }
        }
    }
}

/// The topos endpoint doubles its backslashes, which breaks JSON escapes.
pub fn repair_backslashes(body: &str) -> String {
    body.replace("\\\\", "\\")
}

/// `"12, 13 "` -> `"12,13"`.
fn normalize_ids(ids: &str) -> String {
    ids.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Format a unix timestamp (string or number) as `YYYY-MM-DD`.
fn format_unix_date(value: &Value) -> Option<String> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    chrono::DateTime::from_timestamp(seconds as i64, 0).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Free text of an outing detail: its narrative fields when present,
/// otherwise the whole record.
fn describe_outing(detail: &Value) -> String {
    const TEXT_FIELDS: [&str; 4] = ["titre", "conditions", "recit", "description"];

    let parts: Vec<String> = TEXT_FIELDS
        .iter()
        .filter_map(|key| detail.get(key).and_then(value_text))
        .filter(|s| !s.trim().is_empty())
        .collect();
    if parts.is_empty() {
        detail.to_string()
    } else {
        parts.join("\n")
    }
}

fn parse_latlon(value: &Value) -> Option<Coordinate> {
    let pair = value.as_array()?;
    let number = |v: &Value| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    let (lat, lon) = (number(pair.first()?)?, number(pair.get(1)?)?);
    Coordinate::new(lat, lon).ok()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_text(&value).ok_or_else(|| serde::de::Error::custom(format!("invalid id: {value}")))
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(value_text))
}
