//! `list_mountain_ranges`: location to nearby catalog massif ids.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use alpine_advisor::{Located, RangeLocator};

use super::unlisted_range_message;
use crate::error::{AgentError, Result};
use crate::tool::{DEFAULT_NUM_RANGES, ListRangesParams, Tool, ToolContext, ToolResult};

/// Finds the catalog ids of the mountain ranges around a place.
#[derive(Clone)]
pub struct ListMountainRangesTool {
    locator: Arc<RangeLocator>,
}

impl ListMountainRangesTool {
    pub fn new(locator: Arc<RangeLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl Tool for ListMountainRangesTool {
    fn name(&self) -> &str {
        "list_mountain_ranges"
    }

    fn description(&self) -> &str {
        "Find the ids of the mountain ranges closest to a location. Returns the ids separated \
         by commas, nearest first, or an empty string when the location is unknown or more than \
         100 km from every known range."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "Place to search around, e.g. a town or a summit"
                },
                "num_ranges": {
                    "type": "integer",
                    "minimum": 1,
                    "description": format!(
                        "[Optional, default: {DEFAULT_NUM_RANGES}] Number of closest mountain ranges to return"
                    )
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match ListRangesParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let located = match self.locator.locate(&params.location, params.num_ranges).await {
            Ok(located) => located,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Could not list the mountain ranges: {e}"
                )));
            }
        };

        if let Located::Unresolved = located {
            tracing::info!(location = %params.location, "Location not found");
        }
        if located.ranges().is_empty()
            && let Some(name) = located.unlisted().first()
        {
            return Ok(ToolResult::error(unlisted_range_message(name, &params.location)));
        }
        let ids: Vec<&str> = located
            .ranges()
            .iter()
            .map(|r| r.catalog_id.as_str())
            .collect();
        tracing::debug!(location = %params.location, ranges = ?ids, "Ranges located");

        Ok(ToolResult::text(ids.join(", ")))
    }
}
