//! Location to nearby catalog massifs.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::geo::Coordinate;
use crate::ranges::RangeIndex;
use crate::sources::{GeoResolver, RouteCatalog};

/// A nearby range with its catalog id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedRange {
    pub name: String,
    pub catalog_id: String,
    pub distance_km: f64,
}

/// Outcome of [`RangeLocator::locate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    /// Geocoding found nothing.
    Unresolved,
    /// Ranges within the threshold, nearest first. May be empty.
    Resolved {
        coordinate: Coordinate,
        ranges: Vec<LocatedRange>,
        /// Ranges within the threshold that the catalog does not list.
        /// Non-empty means the reference data is out of date.
        unlisted: Vec<String>,
    },
}

impl Located {
    pub fn ranges(&self) -> &[LocatedRange] {
        match self {
            Located::Unresolved => &[],
            Located::Resolved { ranges, .. } => ranges,
        }
    }

    pub fn unlisted(&self) -> &[String] {
        match self {
            Located::Unresolved => &[],
            Located::Resolved { unlisted, .. } => unlisted,
        }
    }
}

/// Resolves a free-text location to the catalog massifs around it.
#[derive(Clone)]
pub struct RangeLocator {
    geocoder: Arc<dyn GeoResolver>,
    index: Arc<RangeIndex>,
    catalog: Arc<dyn RouteCatalog>,
}

impl RangeLocator {
    pub fn new(
        geocoder: Arc<dyn GeoResolver>,
        index: Arc<RangeIndex>,
        catalog: Arc<dyn RouteCatalog>,
    ) -> Self {
        Self {
            geocoder,
            index,
            catalog,
        }
    }

    pub fn index(&self) -> &RangeIndex {
        &self.index
    }

    pub async fn resolve(&self, location: &str) -> Option<Coordinate> {
        self.geocoder.resolve(location).await
    }

    /// Up to `k` ranges within the near-range threshold of `location`.
    ///
    /// Ranges whose name the catalog does not list are reported in
    /// `unlisted` instead of `ranges`.
    pub async fn locate(&self, location: &str, k: usize) -> Result<Located> {
        let Some(coordinate) = self.geocoder.resolve(location).await else {
            return Ok(Located::Unresolved);
        };

        let nearby = self.index.nearby(&coordinate, k);
        if nearby.is_empty() {
            tracing::info!(location, %coordinate, "No range within threshold");
            return Ok(Located::Resolved {
                coordinate,
                ranges: Vec::new(),
                unlisted: Vec::new(),
            });
        }

        let massifs = self.catalog.massifs().await?;
        let mut ranges = Vec::new();
        let mut unlisted = Vec::new();
        for m in nearby {
            match massifs.iter().find(|massif| massif.name == m.name) {
                Some(massif) => ranges.push(LocatedRange {
                    name: m.name,
                    catalog_id: massif.id.clone(),
                    distance_km: m.distance_km,
                }),
                None => {
                    tracing::warn!(range = %m.name, "Range not listed by the catalog");
                    unlisted.push(m.name);
                }
            }
        }

        Ok(Located::Resolved {
            coordinate,
            ranges,
            unlisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedGeocoder, StaticCatalog};

    const RANGES: &str = r#"{
        "Mont-Blanc": [[45.8326, 6.8652], [45.9786, 7.0003]],
        "Aravis": [[45.8667, 6.4333]],
        "Pyrénées": [[42.6, 0.65]]
    }"#;

    fn locator(catalog: StaticCatalog) -> RangeLocator {
        RangeLocator::new(
            Arc::new(FixedGeocoder::new().with_place("Chamonix", 45.9237, 6.8694)),
            Arc::new(RangeIndex::from_json(RANGES).unwrap()),
            Arc::new(catalog),
        )
    }

    #[tokio::test]
    async fn test_locate_chamonix() {
        let catalog = StaticCatalog::new()
            .with_massif("13", "Aravis")
            .with_massif("12", "Mont-Blanc");
        let located = locator(catalog).locate("Chamonix", 3).await.unwrap();

        let ids: Vec<_> = located.ranges().iter().map(|r| r.catalog_id.as_str()).collect();
        // nearest first, Pyrénées beyond the threshold
        assert_eq!(ids, ["12", "13"]);
        assert!(located.ranges()[0].distance_km < 20.0);
    }

    #[tokio::test]
    async fn test_unknown_place_is_unresolved() {
        let located = locator(StaticCatalog::new())
            .locate("xqzzv blorp", 3)
            .await
            .unwrap();
        assert_eq!(located, Located::Unresolved);
        assert!(located.ranges().is_empty());
    }

    #[tokio::test]
    async fn test_ranges_missing_from_catalog_are_reported() {
        let catalog = StaticCatalog::new().with_massif("12", "Mont-Blanc");
        let located = locator(catalog).locate("chamonix", 3).await.unwrap();
        assert_eq!(located.ranges().len(), 1);
        assert_eq!(located.ranges()[0].name, "Mont-Blanc");
        assert_eq!(located.unlisted(), ["Aravis"]);
    }

    #[tokio::test]
    async fn test_nothing_nearby_has_no_unlisted_ranges() {
        let geocoder = FixedGeocoder::new().with_place("Lyon", 45.764, 4.8357);
        let locator = RangeLocator::new(
            Arc::new(geocoder),
            Arc::new(RangeIndex::from_json(RANGES).unwrap()),
            Arc::new(StaticCatalog::new()),
        );
        let located = locator.locate("Lyon", 3).await.unwrap();
        assert!(matches!(located, Located::Resolved { .. }));
        assert!(located.ranges().is_empty());
        assert!(located.unlisted().is_empty());
    }
}
