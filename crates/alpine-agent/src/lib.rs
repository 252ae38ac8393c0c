//! Tool dispatch for Alpine.
//!
//! This crate lets a language model drive the advisory pipeline of
//! `alpine-advisor` through named tools, one step at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ToolDispatchLoop                                           │
//! │  - Asks the model for its next step                         │
//! │  - Runs the selected tool, feeds the result back            │
//! │  - Streams TurnEvents, ends with an Advisory                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌────────────┐  ┌────────────┐  ┌────────────┐
//!       │ LlmBackend │  │ToolRegistry│  │  Advisory  │
//!       │(alpine-llm)│  │ six tools  │  │parse+repair│
//!       └────────────┘  └────────────┘  └────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`ToolDispatchLoop`]: runs a turn as a stream of [`TurnEvent`]s
//! - [`ToolRegistry`]: named tools with schema validation
//! - [`Advisory`]: the final answer, checked against what the tools returned
//! - [`SystemPromptBuilder`]: instructions for the model

pub mod advisory;
pub mod dispatch;
pub mod error;
pub mod prompt;
pub mod tool;
pub mod tools;
pub mod types;

pub use error::{AgentError, Result};
pub use types::{
    Conversation, DEFAULT_MAX_STEPS, DispatchConfig, Exchange, ToolCallRecord, TurnId,
};

pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};

// Parameter validation
pub use tool::{
    DEFAULT_NUM_RANGES, DescribeRouteParams, ForecastParams, ListRangesParams, ListRoutesParams,
    MassifParams, ParamExt, ParamResult, ParameterValidationError, validate_params,
};

pub use advisory::{Advisory, Itinerary};
pub use dispatch::{ToolDispatchLoop, TurnEnd, TurnEvent, TurnOutcome, TurnStream};
pub use prompt::SystemPromptBuilder;
pub use tools::{
    DescribeRouteTool, ForecastTool, ListMountainRangesTool, ListRoutesTool, RecentOutingsTool,
    RefugeSearchTool, advisor_tools,
};

pub use tokio_util::sync::CancellationToken;
