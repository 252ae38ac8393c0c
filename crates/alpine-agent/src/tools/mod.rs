//! The advisor's tools.
//!
//! Each tool wraps one pipeline capability from `alpine-advisor`. Upstream
//! failures are returned as recoverable tool errors so the model can explain
//! them or try something else.

mod forecast;
mod outings;
mod ranges;
mod refuges;
mod routes;

use std::sync::Arc;

use alpine_advisor::{RangeLocator, RouteAdvisor};

use crate::tool::ToolRegistry;

pub use forecast::ForecastTool;
pub use outings::RecentOutingsTool;
pub use ranges::ListMountainRangesTool;
pub use refuges::RefugeSearchTool;
pub use routes::{DescribeRouteTool, ListRoutesTool};

/// A registry holding the six advisor tools.
pub fn advisor_tools(locator: Arc<RangeLocator>, advisor: Arc<RouteAdvisor>) -> ToolRegistry {
    let catalog = advisor.catalog().clone();
    let mut registry = ToolRegistry::new();
    registry.register(ListMountainRangesTool::new(locator.clone()));
    registry.register(ListRoutesTool::new(catalog.clone()));
    registry.register(DescribeRouteTool::new(advisor.clone()));
    registry.register(RecentOutingsTool::new(catalog.clone()));
    registry.register(ForecastTool::new(locator, advisor));
    registry.register(RefugeSearchTool::new(catalog));
    registry
}

/// A range exists near the place but the catalog has no id for it.
fn unlisted_range_message(range: &str, location: &str) -> String {
    format!(
        "The mountain range '{range}' near '{location}' has no catalog id, so its routes and \
         conditions cannot be looked up. The range reference data needs updating."
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisor_tools_registers_all_six() {
        let registry = fixtures::registry();
        assert_eq!(
            registry.names(),
            [
                "describe_route",
                "forecast",
                "list_mountain_ranges",
                "list_routes",
                "recent_outings",
                "refuge_recherche"
            ]
        );
        for definition in registry.to_llm_definitions() {
            assert_eq!(definition.input_schema["type"], "object");
            assert!(!definition.description.is_empty());
        }
    }
}
