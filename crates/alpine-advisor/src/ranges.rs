//! Mountain range reference data and nearest-range lookup.
//!
//! The on-disk format is a JSON object mapping each range name to its summit
//! points as `[lat, lon]` pairs. Object order is kept: it is the tie-break
//! order for [`RangeIndex::nearest`].

use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AdvisorError, Result};
use crate::geo::{Coordinate, NEAR_RANGE_THRESHOLD_KM};

/// A named range and the summits that define its footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct MountainRange {
    pub name: String,
    pub summit_points: Vec<Coordinate>,
}

impl MountainRange {
    /// Minimum distance from `coord` to any summit, `None` without summits.
    pub fn distance_km(&self, coord: &Coordinate) -> Option<f64> {
        self.summit_points
            .iter()
            .map(|p| coord.distance_km(p))
            .min_by(f64::total_cmp)
    }
}

/// A named summit as reported by the route catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summit {
    pub name: String,
    pub coordinate: Coordinate,
    /// Range label the summit belongs to.
    pub range: String,
}

/// A range matched by [`RangeIndex::nearest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeMatch {
    pub name: String,
    pub distance_km: f64,
}

impl RangeMatch {
    pub fn is_near(&self) -> bool {
        self.distance_km < NEAR_RANGE_THRESHOLD_KM
    }
}

/// Immutable set of ranges, in load order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeIndex {
    ranges: Vec<MountainRange>,
}

impl RangeIndex {
    pub fn new(ranges: Vec<MountainRange>) -> Self {
        Self { ranges }
    }

    /// Load the index from a ranges JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AdvisorError::reference_data(path.display().to_string(), e))?;
        Self::from_json(&contents)
            .map_err(|e| AdvisorError::reference_data(path.display().to_string(), e))
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Group summits by range label, ranges in first-seen order.
    pub fn from_summits(summits: impl IntoIterator<Item = Summit>) -> Self {
        let mut ranges: Vec<MountainRange> = Vec::new();
        for summit in summits {
            match ranges.iter_mut().find(|r| r.name == summit.range) {
                Some(range) => range.summit_points.push(summit.coordinate),
                None => ranges.push(MountainRange {
                    name: summit.range,
                    summit_points: vec![summit.coordinate],
                }),
            }
        }
        Self { ranges }
    }

    pub fn ranges(&self) -> &[MountainRange] {
        &self.ranges
    }

    pub fn get(&self, name: &str) -> Option<&MountainRange> {
        self.ranges.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The `k` ranges closest to `coord`, nearest first.
    ///
    /// Distance is the minimum over a range's summit points. Equal distances
    /// keep load order; ranges without summits never match.
    pub fn nearest(&self, coord: &Coordinate, k: usize) -> Vec<RangeMatch> {
        let mut matches: Vec<RangeMatch> = self
            .ranges
            .iter()
            .filter_map(|range| {
                range.distance_km(coord).map(|distance_km| RangeMatch {
                    name: range.name.clone(),
                    distance_km,
                })
            })
            .collect();

        // sort_by is stable, so ties stay in load order
        matches.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        matches.truncate(k);
        matches
    }

    /// [`nearest`](Self::nearest) restricted to ranges within the threshold.
    pub fn nearby(&self, coord: &Coordinate, k: usize) -> Vec<RangeMatch> {
        self.nearest(coord, k)
            .into_iter()
            .filter(RangeMatch::is_near)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serialization (ordered JSON object)
// ─────────────────────────────────────────────────────────────────────────────

impl Serialize for RangeIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.ranges.len()))?;
        for range in &self.ranges {
            let points: Vec<[f64; 2]> = range
                .summit_points
                .iter()
                .map(|p| [p.lat(), p.lon()])
                .collect();
            map.serialize_entry(&range.name, &points)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RangeIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(RangeIndexVisitor)
    }
}

struct RangeIndexVisitor;

impl<'de> Visitor<'de> for RangeIndexVisitor {
    type Value = RangeIndex;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping range names to [lat, lon] summit points")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<RangeIndex, A::Error> {
        let mut ranges = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, points)) = access.next_entry::<String, Vec<(f64, f64)>>()? {
            let summit_points = points
                .into_iter()
                .map(|(lat, lon)| Coordinate::new(lat, lon))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| serde::de::Error::custom(format!("range {name}: {e}")))?;
            ranges.push(MountainRange {
                name,
                summit_points,
            });
        }
        Ok(RangeIndex { ranges })
    }
}
