//! `recent_outings`: trip reports from the last days in a massif.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use alpine_advisor::RouteCatalog;

use crate::error::{AgentError, Result};
use crate::tool::{MassifParams, Tool, ToolContext, ToolResult};

#[derive(Clone)]
pub struct RecentOutingsTool {
    catalog: Arc<dyn RouteCatalog>,
}

impl RecentOutingsTool {
    pub fn new(catalog: Arc<dyn RouteCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for RecentOutingsTool {
    fn name(&self) -> &str {
        "recent_outings"
    }

    fn description(&self) -> &str {
        "Get the most recent trip reports published for a mountain range. Useful to know the \
         actual snow conditions on the ground."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id_range": {
                    "type": ["string", "integer"],
                    "description": "Mountain range id, as returned by list_mountain_ranges"
                }
            },
            "required": ["id_range"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match MassifParams::from_field(&params, "id_range") {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        match self.catalog.recent_outings(&params.massif_id).await {
            Ok(outings) => ToolResult::from_serialize(&outings),
            Err(e) => Ok(ToolResult::error(format!(
                "Recent outings could not be retrieved: {e}"
            ))),
        }
    }
}
