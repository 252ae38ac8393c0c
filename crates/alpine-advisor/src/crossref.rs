//! Mapping between route-catalog massif ids and avalanche-bulletin massif ids.
//!
//! The two providers number their massifs independently. The table is a JSON
//! object keyed by catalog id; each value is either the weather id itself or
//! an object carrying it under `meteofrance_id`. Ids may be strings or numbers.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{AdvisorError, IdSpace, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s.trim().to_string(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Id(RawId),
    Detailed { meteofrance_id: RawId },
}

/// Bidirectional massif id lookup.
#[derive(Debug, Clone, Default)]
pub struct RangeCrossReference {
    to_weather: HashMap<String, String>,
    to_catalog: HashMap<String, String>,
}

impl RangeCrossReference {
    /// Build from `(catalog_id, weather_id)` pairs.
    ///
    /// Fails if two catalog ids share a weather id, since the reverse lookup
    /// would be ambiguous.
    pub fn from_pairs<I, C, W>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, W)>,
        C: Into<String>,
        W: Into<String>,
    {
        let mut table = Self::default();
        for (catalog, weather) in pairs {
            let (catalog, weather) = (catalog.into(), weather.into());
            if let Some(previous) = table.to_catalog.get(&weather)
                && previous != &catalog
            {
                return Err(AdvisorError::DuplicateMapping {
                    weather_id: weather,
                    first: previous.clone(),
                    second: catalog,
                });
            }
            table.to_catalog.insert(weather.clone(), catalog.clone());
            table.to_weather.insert(catalog, weather);
        }
        Ok(table)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: HashMap<String, RawEntry> =
            serde_json::from_str(json).map_err(AdvisorError::MalformedCrossReference)?;
        // Sort for a deterministic duplicate report.
        let mut pairs: Vec<(String, String)> = raw
            .into_iter()
            .map(|(catalog, entry)| {
                let weather = match entry {
                    RawEntry::Id(id) | RawEntry::Detailed { meteofrance_id: id } => {
                        id.into_string()
                    }
                };
                (catalog.trim().to_string(), weather)
            })
            .collect();
        pairs.sort();
        Self::from_pairs(pairs)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AdvisorError::reference_data(path.display().to_string(), e))?;
        Self::from_json(&contents)
            .map_err(|e| AdvisorError::reference_data(path.display().to_string(), e))
    }

    pub fn to_weather_space(&self, catalog_id: &str) -> Result<&str> {
        self.to_weather
            .get(catalog_id.trim())
            .map(String::as_str)
            .ok_or_else(|| AdvisorError::CrossReferenceGap {
                id: catalog_id.to_string(),
                space: IdSpace::Weather,
            })
    }

    pub fn to_catalog_space(&self, weather_id: &str) -> Result<&str> {
        self.to_catalog
            .get(weather_id.trim())
            .map(String::as_str)
            .ok_or_else(|| AdvisorError::CrossReferenceGap {
                id: weather_id.to_string(),
                space: IdSpace::Catalog,
            })
    }

    /// Catalog ids from `ids` that have no weather mapping, in input order.
    pub fn unmapped<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        ids.into_iter()
            .filter(|id| !self.to_weather.contains_key(id.trim()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.to_weather.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_weather.is_empty()
    }
}
