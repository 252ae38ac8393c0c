//! Upstream service adapters.
//!
//! Each adapter is a trait with one HTTP implementation, so the advisory
//! pipeline can run against in-memory sources in tests.

pub mod avalanche;
pub mod catalog;
pub mod forecast;
pub mod geocoder;
pub mod http;

pub use avalanche::{AvalancheBulletin, AvalancheSource, MeteoFranceClient, WeatherMassif};
pub use catalog::{CatalogMassif, Outing, Refuge, RouteCatalog, RouteTopo, SkitourClient};
pub use forecast::{ForecastSource, OpenMeteoClient, RawForecast, RawForecastPoint};
pub use geocoder::{GeoResolver, PlacesGeocoder};
