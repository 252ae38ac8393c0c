//! `refuge_recherche`: huts of a massif.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use alpine_advisor::RouteCatalog;

use crate::error::{AgentError, Result};
use crate::tool::{MassifParams, Tool, ToolContext, ToolResult};

#[derive(Clone)]
pub struct RefugeSearchTool {
    catalog: Arc<dyn RouteCatalog>,
}

impl RefugeSearchTool {
    pub fn new(catalog: Arc<dyn RouteCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for RefugeSearchTool {
    fn name(&self) -> &str {
        "refuge_recherche"
    }

    fn description(&self) -> &str {
        "List the mountain huts (refuges) of a mountain range."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "massif_id": {
                    "type": ["string", "integer"],
                    "description": "Mountain range id, as returned by list_mountain_ranges"
                }
            },
            "required": ["massif_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let params = match MassifParams::from_field(&params, "massif_id") {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        match self.catalog.refuges(&params.massif_id).await {
            Ok(refuges) => {
                tracing::debug!(massif = %params.massif_id, count = refuges.len(), "Refuges listed");
                ToolResult::from_serialize(&refuges)
            }
            Err(e) => Ok(ToolResult::error(format!(
                "Refuges could not be retrieved: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fixtures;

    #[tokio::test]
    async fn test_refuges_of_massif() {
        let tool = RefugeSearchTool::new(Arc::new(fixtures::catalog()));
        let result = tool
            .execute(json!({"massif_id": "12"}), &ToolContext::default())
            .await
            .unwrap();

        let refuges = result.as_json().unwrap().as_array().unwrap();
        assert_eq!(refuges.len(), 1);
        assert_eq!(refuges[0]["name"], "Refuge Albert 1er");
    }
}
