//! The final answer of a turn and its reconciliation with the tool results.
//!
//! The model is asked to answer with a JSON object of two fields, `message`
//! and `itineraries`. What comes back is parsed leniently: fenced code
//! blocks, surrounding prose and the legacy `topo_*` field names are all
//! accepted, and an answer that is not JSON at all becomes the message.
//!
//! Itineraries are then repaired against the routes the turn actually
//! fetched: entries whose id the tools never returned are dropped, and name,
//! start point and link are taken from the catalog rather than the model.
//! A turn that ends before the model answers keeps every route it described,
//! together with that route's safety summaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use alpine_advisor::Coordinate;

use crate::types::ToolCallRecord;

/// A recommended route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(rename = "id")]
    pub route_id: String,
    pub name: String,
    pub start: Coordinate,
    #[serde(rename = "link")]
    pub detail_link: String,
}

/// The answer to one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub message: String,
    /// `None` when the answer recommends no route.
    pub itineraries: Option<Vec<Itinerary>>,
}

impl Advisory {
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            itineraries: None,
        }
    }

    /// Parse the model's final text. Never fails.
    ///
    /// Itineraries without a usable start point are left out; use
    /// [`Advisory::from_answer`] to complete them from the tool results.
    pub fn parse(text: &str) -> Self {
        let (message, drafts) = parse_answer(text);
        let itineraries: Vec<Itinerary> = drafts.into_iter().filter_map(Draft::placed).collect();
        Self {
            message,
            itineraries: (!itineraries.is_empty()).then_some(itineraries),
        }
    }

    /// Parse the model's final text and reconcile it with the turn's tool
    /// results in one pass, so an itinerary the model named without a start
    /// point can still take it from the catalog.
    pub fn from_answer(text: &str, records: &[ToolCallRecord]) -> Self {
        let (message, drafts) = parse_answer(text);
        Self::message_only(message).reconciled(drafts, records)
    }

    /// Keep only itineraries backed by routes the turn fetched, with their
    /// details taken from the catalog.
    pub fn repair(mut self, records: &[ToolCallRecord]) -> Self {
        let drafts = self
            .itineraries
            .take()
            .unwrap_or_default()
            .into_iter()
            .map(Draft::from)
            .collect();
        self.reconciled(drafts, records)
    }

    fn reconciled(mut self, drafts: Vec<Draft>, records: &[ToolCallRecord]) -> Self {
        let known = KnownRoutes::from_records(records);
        let mut seen = Vec::new();

        let repaired: Vec<Itinerary> = drafts
            .into_iter()
            .filter_map(|draft| {
                if seen.contains(&draft.route_id) {
                    return None;
                }
                let Some(route) = known.get(&draft.route_id) else {
                    tracing::warn!(route_id = %draft.route_id, "Dropping itinerary no tool returned");
                    return None;
                };
                let Some(start) = route.start.or(draft.start) else {
                    tracing::warn!(route_id = %draft.route_id, "Dropping itinerary without a start point");
                    return None;
                };
                seen.push(draft.route_id.clone());
                Some(Itinerary {
                    name: route.name.clone().unwrap_or(draft.name),
                    start,
                    detail_link: route.link.clone().unwrap_or(draft.detail_link),
                    route_id: draft.route_id,
                })
            })
            .collect();

        self.itineraries = (!repaired.is_empty()).then_some(repaired);
        self
    }

    /// Best-effort completion for a turn that ended before the model
    /// answered. Every route the turn described is added as an itinerary,
    /// and its avalanche and forecast summaries, or the reason they are
    /// missing, are appended to the message.
    pub fn with_described_routes(mut self, records: &[ToolCallRecord]) -> Self {
        let known = KnownRoutes::from_records(records);
        let mut itineraries = self.itineraries.take().unwrap_or_default();
        let mut described: Vec<String> = Vec::new();
        let mut lines = Vec::new();

        for content in records
            .iter()
            .filter(|r| r.tool_name == "describe_route")
            .filter_map(|r| r.outcome.as_json())
        {
            let Some(id) = content.get("route_info").and_then(|t| text_field(t, &["id"])) else {
                continue;
            };
            if described.contains(&id) {
                continue;
            }
            let route = known.get(&id).cloned().unwrap_or_default();
            let name = route.name.clone().unwrap_or_else(|| id.clone());
            lines.push(format!(
                "- {name} ({id}): avalanche: {}; forecast: {}",
                conditions_text(content.get("avalanche_conditions")),
                conditions_text(content.get("daily_weather_forecast")),
            ));

            if let Some(start) = route.start
                && !itineraries.iter().any(|it| it.route_id == id)
            {
                itineraries.push(Itinerary {
                    route_id: id.clone(),
                    name,
                    start,
                    detail_link: route.link.unwrap_or_default(),
                });
            }
            described.push(id);
        }

        if !lines.is_empty() {
            let section = format!("Conditions for the routes consulted:\n{}", lines.join("\n"));
            self.message = if self.message.trim().is_empty() {
                section
            } else {
                format!("{}\n\n{}", self.message.trim_end(), section)
            };
        }
        self.itineraries = (!itineraries.is_empty()).then_some(itineraries);
        self
    }

    /// The itineraries, or an empty slice.
    pub fn itineraries(&self) -> &[Itinerary] {
        self.itineraries.as_deref().unwrap_or_default()
    }

    /// Compact JSON in the response contract shape.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            serde_json::json!({ "message": self.message, "itineraries": null }).to_string()
        })
    }
}

/// Find the answer object in free text.
fn extract_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);

    if let Ok(Value::Object(map)) = serde_json::from_str(unfenced.trim()) {
        return Some(map);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&unfenced[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn text_field(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number_field(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match item.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_start(item: &Value) -> Option<Coordinate> {
    let (lat, lon) = match item.get("start") {
        Some(start) => (
            number_field(start, &["lat", "latitude"])?,
            number_field(start, &["lon", "lng", "longitude"])?,
        ),
        None => (
            number_field(item, &["topo_start_lat", "lat"])?,
            number_field(item, &["topo_start_lon", "lon"])?,
        ),
    };
    Coordinate::new(lat, lon).ok()
}

/// An itinerary as the model wrote it, possibly without a start point.
struct Draft {
    route_id: String,
    name: String,
    start: Option<Coordinate>,
    detail_link: String,
}

impl Draft {
    fn placed(self) -> Option<Itinerary> {
        Some(Itinerary {
            start: self.start?,
            route_id: self.route_id,
            name: self.name,
            detail_link: self.detail_link,
        })
    }
}

impl From<Itinerary> for Draft {
    fn from(it: Itinerary) -> Self {
        Self {
            route_id: it.route_id,
            name: it.name,
            start: Some(it.start),
            detail_link: it.detail_link,
        }
    }
}

fn parse_itinerary(item: &Value) -> Option<Draft> {
    Some(Draft {
        route_id: text_field(item, &["id", "route_id", "topo_id"])?,
        name: text_field(item, &["name", "topo_name"]).unwrap_or_default(),
        start: parse_start(item),
        detail_link: text_field(item, &["link", "topo_link", "detail_link"]).unwrap_or_default(),
    })
}

/// The message and itinerary drafts of a final answer.
fn parse_answer(text: &str) -> (String, Vec<Draft>) {
    let Some(raw) = extract_object(text) else {
        return (text.trim().to_string(), Vec::new());
    };

    let message = match raw.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => text.trim().to_string(),
    };
    let drafts = raw
        .get("itineraries")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_itinerary).collect())
        .unwrap_or_default();
    (message, drafts)
}

/// One line of a conditions field from a `describe_route` result.
fn conditions_text(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return "unavailable".to_string();
    };
    match value.get("status").and_then(Value::as_str) {
        Some("available") => {
            text_field(value, &["summary"]).unwrap_or_else(|| "no summary".to_string())
        }
        _ => match text_field(value, &["reason"]) {
            Some(reason) => format!("unavailable ({reason})"),
            None => "unavailable".to_string(),
        },
    }
}

/// What the turn's tool results say about a route.
#[derive(Debug, Default, Clone)]
struct KnownRoute {
    name: Option<String>,
    start: Option<Coordinate>,
    link: Option<String>,
}

struct KnownRoutes(HashMap<String, KnownRoute>);

impl KnownRoutes {
    /// Routes from successful `list_routes` and `describe_route` results.
    /// Later results refine earlier ones.
    fn from_records(records: &[ToolCallRecord]) -> Self {
        let mut routes: HashMap<String, KnownRoute> = HashMap::new();
        let mut learn = |topo: &Value, link: Option<&Value>| {
            let Some(id) = text_field(topo, &["id"]) else {
                return;
            };
            let entry = routes.entry(id).or_default();
            if let Some(name) = text_field(topo, &["name"]) {
                entry.name = Some(name);
            }
            if let Some(start) = topo.get("start").and_then(|s| {
                Coordinate::new(number_field(s, &["lat"])?, number_field(s, &["lon"])?).ok()
            }) {
                entry.start = Some(start);
            }
            if let Some(link) = link
                .and_then(Value::as_str)
                .or_else(|| topo.get("detail_link").and_then(Value::as_str))
            {
                entry.link = Some(link.to_string());
            }
        };

        for record in records {
            let Some(content) = record.outcome.as_json() else {
                continue;
            };
            match record.tool_name.as_str() {
                "list_routes" => {
                    for topo in content.as_array().into_iter().flatten() {
                        learn(topo, None);
                    }
                }
                "describe_route" => {
                    if let Some(topo) = content.get("route_info") {
                        learn(topo, content.get("route_link"));
                    }
                }
                _ => {}
            }
        }

        Self(routes)
    }

    fn get(&self, id: &str) -> Option<&KnownRoute> {
        self.0.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolResult;
    use serde_json::json;

    fn record(ordinal: usize, tool_name: &str, outcome: ToolResult) -> ToolCallRecord {
        ToolCallRecord {
            ordinal,
            tool_name: tool_name.to_string(),
            arguments: json!({}),
            outcome,
        }
    }

    fn described(id: &str, name: &str) -> ToolCallRecord {
        record(
            2,
            "describe_route",
            ToolResult::json(json!({
                "route_info": {
                    "id": id,
                    "name": name,
                    "start": {"lat": 45.9906, "lon": 6.9844},
                    "detail_link": format!("https://skitour.fr/topos/{id}")
                },
                "avalanche_conditions": {"status": "unavailable", "reason": "timeout"},
                "daily_weather_forecast": {"status": "available", "summary": "Sunny", "summarized": true},
                "route_link": format!("https://skitour.fr/topos/{id}")
            })),
        )
    }

    #[test]
    fn test_parse_contract_shape() {
        let advisory = Advisory::parse(
            r#"{"message": "Go early.", "itineraries": [
                {"id": "104", "name": "Col du Passon", "start": {"lat": 45.99, "lon": 6.98},
                 "link": "https://skitour.fr/topos/104"}
            ]}"#,
        );
        assert_eq!(advisory.message, "Go early.");
        assert_eq!(advisory.itineraries().len(), 1);
        assert_eq!(advisory.itineraries()[0].route_id, "104");
    }

    #[test]
    fn test_parse_fenced_legacy_fields() {
        let advisory = Advisory::parse(
            "```json\n{\"message\": \"Voici\", \"itineraries\": [{\"topo_id\": 104, \
             \"name\": \"Col\", \"topo_start_lat\": \"45.0181\", \"topo_start_lon\": 6.4663, \
             \"topo_link\": \"https://skitour.fr/topos/104\"}]}\n```",
        );
        let it = &advisory.itineraries()[0];
        assert_eq!(it.route_id, "104");
        assert_eq!(it.start.lat(), 45.0181);
        assert_eq!(it.detail_link, "https://skitour.fr/topos/104");
    }

    #[test]
    fn test_parse_prose_around_object_and_plain_text() {
        let advisory =
            Advisory::parse("Here you go: {\"message\": \"Bonjour\", \"itineraries\": null} Enjoy");
        assert_eq!(advisory, Advisory::message_only("Bonjour"));

        let advisory = Advisory::parse("  I'm doing great, how can I help?  ");
        assert_eq!(advisory.message, "I'm doing great, how can I help?");
        assert!(advisory.itineraries.is_none());
    }

    #[test]
    fn test_empty_itinerary_list_becomes_none() {
        let advisory = Advisory::parse(r#"{"message": "Nothing safe today.", "itineraries": []}"#);
        assert!(advisory.itineraries.is_none());
    }

    #[test]
    fn test_repair_drops_unfetched_routes_and_fills_details() {
        let advisory = Advisory::parse(
            r#"{"message": "Two ideas.", "itineraries": [
                {"id": "104", "name": "wrong name", "start": {"lat": 1.0, "lon": 1.0}, "link": ""},
                {"id": "999", "name": "Invented", "start": {"lat": 45.0, "lon": 6.0}, "link": "x"},
                {"id": "104", "name": "dup", "start": {"lat": 1.0, "lon": 1.0}, "link": ""}
            ]}"#,
        )
        .repair(&[described("104", "Col du Passon")]);

        let itineraries = advisory.itineraries();
        assert_eq!(itineraries.len(), 1);
        assert_eq!(itineraries[0].name, "Col du Passon");
        assert_eq!(itineraries[0].start, Coordinate::new(45.9906, 6.9844).unwrap());
        assert_eq!(itineraries[0].detail_link, "https://skitour.fr/topos/104");
    }

    #[test]
    fn test_repair_uses_route_listing_and_ignores_errors() {
        let records = [
            record(
                1,
                "list_routes",
                ToolResult::json(json!([
                    {"id": "220", "name": "Pointe de Chésery", "detail_link": "https://skitour.fr/topos/220"}
                ])),
            ),
            record(2, "describe_route", ToolResult::error("topo 104 unavailable")),
        ];
        let advisory = Advisory::parse(
            r#"{"message": "m", "itineraries": [
                {"id": "220", "name": "", "start": {"lat": 46.2, "lon": 6.8}, "link": ""},
                {"id": "104", "name": "Col", "start": {"lat": 45.9, "lon": 6.9}, "link": ""}
            ]}"#,
        )
        .repair(&records);

        let itineraries = advisory.itineraries();
        assert_eq!(itineraries.len(), 1);
        assert_eq!(itineraries[0].name, "Pointe de Chésery");
        // no start in the listing: the model's coordinate is kept
        assert_eq!(itineraries[0].start.lat(), 46.2);
    }

    #[test]
    fn test_answer_without_start_takes_catalog_start() {
        let records = [record(
            1,
            "list_routes",
            ToolResult::json(json!([
                {"id": "104", "name": "Col du Passon", "start": {"lat": 45.9906, "lon": 6.9844},
                 "detail_link": "https://skitour.fr/topos/104"},
                {"id": "220", "name": "Pointe de Chésery", "detail_link": "https://skitour.fr/topos/220"}
            ])),
        )];
        let text = r#"{"message": "m", "itineraries": [
            {"id": "104", "name": "Passon", "link": ""},
            {"id": "220", "name": "Chésery", "start": {"lat": "n/a", "lon": 6.8}, "link": ""}
        ]}"#;

        // neither the answer nor the listing places 220
        let advisory = Advisory::from_answer(text, &records);
        let itineraries = advisory.itineraries();
        assert_eq!(itineraries.len(), 1);
        assert_eq!(itineraries[0].route_id, "104");
        assert_eq!(itineraries[0].start, Coordinate::new(45.9906, 6.9844).unwrap());
        assert_eq!(itineraries[0].detail_link, "https://skitour.fr/topos/104");

        assert!(Advisory::parse(text).itineraries.is_none());
    }

    #[test]
    fn test_described_routes_fill_an_unfinished_answer() {
        let advisory = Advisory::message_only("Je regarde encore.")
            .with_described_routes(&[described("104", "Col du Passon"), described("104", "Col du Passon")]);

        assert!(advisory.message.starts_with("Je regarde encore.\n\n"));
        assert!(
            advisory
                .message
                .contains("- Col du Passon (104): avalanche: unavailable (timeout); forecast: Sunny")
        );
        assert_eq!(advisory.message.matches("(104)").count(), 1);
        let itineraries = advisory.itineraries();
        assert_eq!(itineraries.len(), 1);
        assert_eq!(itineraries[0].name, "Col du Passon");
    }

    #[test]
    fn test_described_routes_keep_model_itineraries_first() {
        let records = [
            record(
                1,
                "list_routes",
                ToolResult::json(json!([
                    {"id": "220", "name": "Pointe de Chésery", "start": {"lat": 46.2, "lon": 6.8},
                     "detail_link": "https://skitour.fr/topos/220"}
                ])),
            ),
            described("104", "Col du Passon"),
            record(3, "describe_route", ToolResult::error("topo 118 unavailable")),
        ];
        let advisory = Advisory::from_answer(
            r#"{"message": "", "itineraries": [{"id": "220", "name": "x", "link": ""}]}"#,
            &records,
        )
        .with_described_routes(&records);

        let ids: Vec<_> = advisory.itineraries().iter().map(|it| it.route_id.as_str()).collect();
        assert_eq!(ids, ["220", "104"]);
        assert!(advisory.message.starts_with("Conditions for the routes consulted:"));
        assert!(!advisory.message.contains("118"));
    }

    #[test]
    fn test_described_routes_without_descriptions_is_unchanged() {
        let advisory = Advisory::message_only("m").with_described_routes(&[]);
        assert_eq!(advisory, Advisory::message_only("m"));
    }

    #[test]
    fn test_repair_with_no_survivors_is_none() {
        let advisory = Advisory::parse(
            r#"{"message": "m", "itineraries": [{"id": "1", "name": "a", "start": {"lat": 1, "lon": 1}, "link": ""}]}"#,
        )
        .repair(&[]);
        assert!(advisory.itineraries.is_none());
    }

    #[test]
    fn test_wire_shape() {
        let advisory = Advisory::parse(
            r#"{"message": "m", "itineraries": [{"id": "104", "name": "Col", "start": {"lat": 45.5, "lon": 6.5}, "link": "l"}]}"#,
        );
        let value: Value = serde_json::from_str(&advisory.to_json()).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "m",
                "itineraries": [{"id": "104", "name": "Col", "start": {"lat": 45.5, "lon": 6.5}, "link": "l"}]
            })
        );
        let value: Value = serde_json::from_str(&Advisory::message_only("m").to_json()).unwrap();
        assert_eq!(value, json!({"message": "m", "itineraries": null}));
    }
}
