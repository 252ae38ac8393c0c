//! `forecast`: conditions around a place, without a specific route.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use alpine_advisor::{Located, NEAR_RANGE_THRESHOLD_KM, RangeLocator, RouteAdvisor};

use crate::error::{AgentError, Result};
use super::unlisted_range_message;
use crate::tool::{ForecastParams, Tool, ToolContext, ToolResult};

/// Weather forecast at a place plus the bulletin of the nearest range.
#[derive(Clone)]
pub struct ForecastTool {
    locator: Arc<RangeLocator>,
    advisor: Arc<RouteAdvisor>,
}

impl ForecastTool {
    pub fn new(locator: Arc<RangeLocator>, advisor: Arc<RouteAdvisor>) -> Self {
        Self { locator, advisor }
    }
}

#[async_trait]
impl Tool for ForecastTool {
    fn name(&self) -> &str {
        "forecast"
    }

    fn description(&self) -> &str {
        "Get a summary of the weather forecast at a location and of the avalanche bulletin of \
         the nearest mountain range."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "Place to get the conditions for"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match ForecastParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let located = match self.locator.locate(&params.location, 1).await {
            Ok(located) => located,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Could not locate '{}': {e}",
                    params.location
                )));
            }
        };

        let (coordinate, ranges, unlisted) = match located {
            Located::Unresolved => {
                return Ok(ToolResult::text(format!(
                    "The location '{}' could not be found.",
                    params.location
                )));
            }
            Located::Resolved {
                coordinate,
                ranges,
                unlisted,
            } => (coordinate, ranges, unlisted),
        };

        if ranges.is_empty()
            && let Some(name) = unlisted.first()
        {
            return Ok(ToolResult::error(unlisted_range_message(name, &params.location)));
        }
        let Some(nearest) = ranges.first() else {
            return Ok(ToolResult::text(format!(
                "No mountain range within {NEAR_RANGE_THRESHOLD_KM} km of '{}'.",
                params.location
            )));
        };

        let conditions = self
            .advisor
            .area_conditions(coordinate, &nearest.catalog_id)
            .await;
        Ok(ToolResult::json(json!({
            "location": coordinate,
            "range": nearest,
            "forecast": conditions.forecast,
            "avalanche_conditions": conditions.avalanche_conditions,
        })))
    }
}
