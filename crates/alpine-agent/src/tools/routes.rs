//! `list_routes` and `describe_route`.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use alpine_advisor::{RouteAdvisor, RouteCatalog};

use crate::error::{AgentError, Result};
use crate::tool::{DescribeRouteParams, ListRoutesParams, Tool, ToolContext, ToolResult};

// ─────────────────────────────────────────────────────────────────────────────
// list_routes
// ─────────────────────────────────────────────────────────────────────────────

/// Lists the catalog's routes for a set of massifs.
#[derive(Clone)]
pub struct ListRoutesTool {
    catalog: Arc<dyn RouteCatalog>,
}

impl ListRoutesTool {
    pub fn new(catalog: Arc<dyn RouteCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for ListRoutesTool {
    fn name(&self) -> &str {
        "list_routes"
    }

    fn description(&self) -> &str {
        "List the ski touring routes of the given mountain ranges, with their grades. Use \
         `describe_route` next on the routes that match the user's request."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mountain_range_ids": {
                    "type": ["string", "array"],
                    "description": "Mountain range ids separated by commas, as returned by list_mountain_ranges"
                }
            },
            "required": ["mountain_range_ids"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match ListRoutesParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        match self.catalog.routes(&params.mountain_range_ids).await {
            Ok(routes) => {
                tracing::debug!(
                    ranges = %params.mountain_range_ids,
                    count = routes.len(),
                    "Routes listed"
                );
                ToolResult::from_serialize(&routes)
            }
            Err(e) => Ok(ToolResult::error(format!(
                "The route catalog could not be reached: {e}"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// describe_route
// ─────────────────────────────────────────────────────────────────────────────

/// Topo, avalanche bulletin and forecast for one route.
#[derive(Clone)]
pub struct DescribeRouteTool {
    advisor: Arc<RouteAdvisor>,
}

impl DescribeRouteTool {
    pub fn new(advisor: Arc<RouteAdvisor>) -> Self {
        Self { advisor }
    }
}

#[async_trait]
impl Tool for DescribeRouteTool {
    fn name(&self) -> &str {
        "describe_route"
    }

    fn description(&self) -> &str {
        "Get everything needed to judge a route: its topo, a summary of the avalanche bulletin \
         of its mountain range and a summary of the weather forecast at its start. Always use \
         this after `list_routes` before recommending a route. A field that could not be \
         fetched is marked unavailable with the reason."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id_route": {
                    "type": ["string", "integer"],
                    "description": "Route id from list_routes"
                },
                "id_range": {
                    "type": ["string", "integer"],
                    "description": "Id of the mountain range the route belongs to"
                }
            },
            "required": ["id_route", "id_range"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match DescribeRouteParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        match self.advisor.describe(&params.id_route, &params.id_range).await {
            Ok(fragment) => ToolResult::from_serialize(&fragment),
            Err(e) => Ok(ToolResult::error(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fixtures;
    use alpine_advisor::testing::StaticAvalanche;

    #[tokio::test]
    async fn test_list_routes_filters_by_massif() {
        let tool = ListRoutesTool::new(Arc::new(fixtures::catalog()));
        let result = tool
            .execute(json!({"mountain_range_ids": "12"}), &ToolContext::default())
            .await
            .unwrap();

        let routes = result.as_json().unwrap().as_array().unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0]["id"], "104");
        assert_eq!(routes[0]["detail_link"], "https://skitour.fr/topos/104");
        assert_eq!(routes[0]["ski_grade"], "3.1");
    }

    #[tokio::test]
    async fn test_list_routes_accepts_id_list() {
        let tool = ListRoutesTool::new(Arc::new(fixtures::catalog()));
        let result = tool
            .execute(json!({"mountain_range_ids": [12, 13]}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(result.as_json().unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_describe_route_fragment() {
        let catalog = Arc::new(fixtures::catalog());
        let tool = DescribeRouteTool::new(fixtures::advisor(
            catalog,
            StaticAvalanche::new().with_bulletin("3", "Risque 3"),
        ));

        let result = tool
            .execute(json!({"id_route": "104", "id_range": "12"}), &ToolContext::default())
            .await
            .unwrap();
        let fragment = result.as_json().unwrap();
        assert_eq!(fragment["route_info"]["name"], "Col du Passon");
        assert_eq!(fragment["route_link"], "https://skitour.fr/topos/104");
        assert_eq!(fragment["avalanche_conditions"]["status"], "available");
        assert_eq!(fragment["daily_weather_forecast"]["status"], "available");
    }

    #[tokio::test]
    async fn test_describe_unknown_route_is_tool_error() {
        let catalog = Arc::new(fixtures::catalog());
        let tool = DescribeRouteTool::new(fixtures::advisor(catalog, StaticAvalanche::new()));

        let result = tool
            .execute(json!({"id_route": "999", "id_range": "12"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.to_llm_content().contains("999"));
    }
}
