//! Ski-touring itinerary advisory pipeline.
//!
//! This crate turns a location and a route into safety-annotated data:
//!
//! - [`RangeIndex`] and [`RangeLocator`]: free-text location to nearby massifs
//! - [`RangeCrossReference`]: catalog massif ids to bulletin massif ids
//! - [`sources`]: the route catalog, avalanche, forecast and geocoding adapters
//! - [`RouteAdvisor`]: one route's topo, bulletin and forecast, summarized
//!
//! Reference tables are loaded once and shared behind `Arc`.

pub mod advisor;
pub mod crossref;
pub mod error;
pub mod geo;
pub mod locator;
pub mod ranges;
pub mod sources;
pub mod stages;
pub mod summarizer;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use advisor::{AreaConditions, Conditions, RouteAdvisor, RouteFragment};
pub use crossref::RangeCrossReference;
pub use error::{AdvisorError, FetchError, IdSpace, Result};
pub use geo::{Coordinate, EARTH_RADIUS_KM, NEAR_RANGE_THRESHOLD_KM, haversine_km};
pub use locator::{Located, LocatedRange, RangeLocator};
pub use ranges::{MountainRange, RangeIndex, RangeMatch, Summit};
pub use sources::{
    AvalancheBulletin, AvalancheSource, CatalogMassif, ForecastSource, GeoResolver,
    MeteoFranceClient, OpenMeteoClient, Outing, PlacesGeocoder, RawForecast, Refuge, RouteCatalog,
    RouteTopo, SkitourClient, WeatherMassif,
};
pub use stages::{FORECAST_HORIZON, ForecastPoint, ForecastSeries};
pub use summarizer::{Summarizer, Summary};
