//! In-memory sources for tests of the pipeline and the tools built on it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, json};

use crate::error::FetchError;
use crate::geo::Coordinate;
use crate::ranges::Summit;
use crate::sources::catalog::DEFAULT_TOPO_LINK_BASE;
use crate::sources::{
    AvalancheBulletin, AvalancheSource, CatalogMassif, ForecastSource, GeoResolver, Outing,
    RawForecast, RawForecastPoint, Refuge, RouteCatalog, RouteTopo, WeatherMassif,
};

/// Build a topo the way the catalog adapter would.
pub fn topo(id: &str, name: &str, range_id: &str, start: (f64, f64)) -> RouteTopo {
    RouteTopo {
        id: id.to_string(),
        name: name.to_string(),
        start: Coordinate::new(start.0, start.1).ok(),
        range_id: Some(range_id.to_string()),
        detail_link: format!("{DEFAULT_TOPO_LINK_BASE}{id}"),
        ski_grade: Some("3.1".to_string()),
        ascent_grade: Some("PD".to_string()),
        exposure: Some("E2".to_string()),
        extra: Map::new(),
    }
}

/// An hourly series of `hours` points starting 2024-01-01T00:00Z.
pub fn hourly_forecast(utc_offset_seconds: i32, hours: usize) -> RawForecast {
    RawForecast {
        timezone: "Europe/Paris".to_string(),
        utc_offset_seconds,
        units: BTreeMap::from([("temperature_2m".to_string(), "°C".to_string())]),
        points: (0..hours)
            .map(|h| RawForecastPoint {
                timestamp: 1_704_067_200 + 3600 * h as i64,
                fields: BTreeMap::from([("temperature_2m".to_string(), json!(-5.0))]),
            })
            .collect(),
    }
}

/// Geocoder answering from a fixed, case-insensitive table.
#[derive(Debug, Default)]
pub struct FixedGeocoder {
    places: HashMap<String, Coordinate>,
}

impl FixedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, name: &str, lat: f64, lon: f64) -> Self {
        if let Ok(coord) = Coordinate::new(lat, lon) {
            self.places.insert(name.to_lowercase(), coord);
        }
        self
    }
}

#[async_trait]
impl GeoResolver for FixedGeocoder {
    async fn resolve(&self, query: &str) -> Option<Coordinate> {
        self.places.get(&query.trim().to_lowercase()).copied()
    }
}

/// Catalog backed by in-memory tables. Counts topo requests.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    massifs: Vec<CatalogMassif>,
    routes: Vec<RouteTopo>,
    refuges: HashMap<String, Vec<Refuge>>,
    outings: HashMap<String, Vec<Outing>>,
    summits: Vec<(String, Summit)>,
    topo_requests: AtomicUsize,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_massif(mut self, id: &str, name: &str) -> Self {
        self.massifs.push(CatalogMassif {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_route(mut self, route: RouteTopo) -> Self {
        self.routes.push(route);
        self
    }

    pub fn with_refuge(mut self, massif_id: &str, id: &str, name: &str) -> Self {
        self.refuges
            .entry(massif_id.to_string())
            .or_default()
            .push(Refuge {
                id: id.to_string(),
                name: Some(name.to_string()),
                extra: Map::new(),
            });
        self
    }

    pub fn with_outing(mut self, massif_id: &str, id: &str, date: &str, text: &str) -> Self {
        self.outings
            .entry(massif_id.to_string())
            .or_default()
            .push(Outing {
                id: id.to_string(),
                date: Some(date.to_string()),
                description: text.to_string(),
            });
        self
    }

    pub fn with_summit(mut self, massif_id: &str, summit: Summit) -> Self {
        self.summits.push((massif_id.to_string(), summit));
        self
    }

    pub fn topo_requests(&self) -> usize {
        self.topo_requests.load(Ordering::SeqCst)
    }
}

fn split_ids(ids: &str) -> Vec<&str> {
    ids.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

#[async_trait]
impl RouteCatalog for StaticCatalog {
    async fn massifs(&self) -> Result<Vec<CatalogMassif>, FetchError> {
        Ok(self.massifs.clone())
    }

    async fn routes(&self, massif_ids: &str) -> Result<Vec<RouteTopo>, FetchError> {
        let ids = split_ids(massif_ids);
        Ok(self
            .routes
            .iter()
            .filter(|r| r.range_id.as_deref().is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn topo(&self, route_id: &str) -> Result<RouteTopo, FetchError> {
        self.topo_requests.fetch_add(1, Ordering::SeqCst);
        self.routes
            .iter()
            .find(|r| r.id == route_id)
            .cloned()
            .ok_or(FetchError::Status {
                service: "catalog",
                status: 404,
                body: format!("unknown topo {route_id}"),
            })
    }

    async fn refuges(&self, massif_ids: &str) -> Result<Vec<Refuge>, FetchError> {
        Ok(split_ids(massif_ids)
            .into_iter()
            .flat_map(|id| self.refuges.get(id).cloned().unwrap_or_default())
            .collect())
    }

    async fn recent_outings(&self, massif_id: &str) -> Result<Vec<Outing>, FetchError> {
        Ok(self.outings.get(massif_id.trim()).cloned().unwrap_or_default())
    }

    async fn summits(&self, massif_ids: &str) -> Result<Vec<Summit>, FetchError> {
        let ids = split_ids(massif_ids);
        Ok(self
            .summits
            .iter()
            .filter(|(id, _)| ids.contains(&id.as_str()))
            .map(|(_, s)| s.clone())
            .collect())
    }
}

/// Bulletins from a table; optionally every request times out.
#[derive(Debug, Default)]
pub struct StaticAvalanche {
    bulletins: HashMap<String, String>,
    massifs: Vec<WeatherMassif>,
    timing_out: bool,
}

impl StaticAvalanche {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bulletin(mut self, weather_id: &str, text: &str) -> Self {
        self.bulletins.insert(weather_id.to_string(), text.to_string());
        self
    }

    pub fn with_massif(mut self, code: &str, title: &str) -> Self {
        self.massifs.push(WeatherMassif {
            code: code.to_string(),
            title: title.to_string(),
            group: None,
        });
        self
    }

    pub fn timing_out() -> Self {
        Self {
            timing_out: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl AvalancheSource for StaticAvalanche {
    async fn bulletin(&self, weather_id: &str) -> Result<AvalancheBulletin, FetchError> {
        if self.timing_out {
            return Err(FetchError::Timeout {
                service: "avalanche",
            });
        }
        self.bulletins
            .get(weather_id)
            .map(|text| AvalancheBulletin {
                range_id: weather_id.to_string(),
                raw_text: text.clone(),
            })
            .ok_or(FetchError::Status {
                service: "avalanche",
                status: 404,
                body: format!("no bulletin for massif {weather_id}"),
            })
    }

    async fn massifs(&self) -> Result<Vec<WeatherMassif>, FetchError> {
        Ok(self.massifs.clone())
    }
}

/// The same forecast for every coordinate, or none at all.
#[derive(Debug, Default)]
pub struct StaticForecast {
    forecast: Option<RawForecast>,
}

impl StaticForecast {
    pub fn new(forecast: RawForecast) -> Self {
        Self {
            forecast: Some(forecast),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForecastSource for StaticForecast {
    async fn forecast(&self, _at: Coordinate) -> Result<RawForecast, FetchError> {
        self.forecast.clone().ok_or(FetchError::Status {
            service: "forecast",
            status: 503,
            body: "forecast service unavailable".to_string(),
        })
    }
}
