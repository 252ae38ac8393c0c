//! Tool framework for the dispatch loop.
//!
//! This module defines the [`Tool`] trait every advisor capability implements,
//! and the [`ToolRegistry`] the loop dispatches through. The registry checks
//! arguments against each tool's JSON Schema before the tool runs, so a tool
//! only ever sees arguments of the declared shape.
//!
//! # Example
//!
//! ```rust,ignore
//! use alpine_agent::{Tool, ToolContext, ToolResult, ToolRegistry};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Tool for Echo {
//!     fn name(&self) -> &str { "echo" }
//!     fn description(&self) -> &str { "Repeats its input" }
//!     fn parameters(&self) -> Value { json!({"type": "object"}) }
//!
//!     async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
//!         Ok(ToolResult::json(params))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(Echo);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::types::TurnId;

// ─────────────────────────────────────────────────────────────────────────────
// Parameter Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Error type for tool parameter validation failures.
///
/// Messages are written for the model: they name the parameter and say how
/// to fix the call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterValidationError {
    /// A required parameter is missing.
    #[error("missing required parameter '{name}': {hint}")]
    MissingRequired { name: String, hint: String },

    /// A parameter has an invalid type.
    #[error("invalid type for '{name}': expected {expected}, got {actual}")]
    InvalidType {
        name: String,
        expected: String,
        actual: String,
    },

    /// A parameter value is out of range.
    #[error("'{name}' value {value} is out of range: {constraint}")]
    OutOfRange {
        name: String,
        value: String,
        constraint: String,
    },

    /// A parameter value is unusable.
    #[error("'{name}' has invalid value '{value}': {message}")]
    InvalidValue {
        name: String,
        value: String,
        message: String,
    },

    /// Multiple validation errors.
    #[error("parameter validation failed: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ParameterValidationError>),
}

impl ParameterValidationError {
    pub fn missing(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            name: name.into(),
            hint: hint.into(),
        }
    }

    pub fn invalid_type(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidType {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn out_of_range(
        name: impl Into<String>,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::OutOfRange {
            name: name.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    pub fn invalid_value(
        name: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            name: name.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// The parameter this error is about, if it is a single error.
    pub fn parameter_name(&self) -> Option<&str> {
        match self {
            Self::MissingRequired { name, .. }
            | Self::InvalidType { name, .. }
            | Self::OutOfRange { name, .. }
            | Self::InvalidValue { name, .. } => Some(name),
            Self::Multiple(_) => None,
        }
    }
}

impl From<ParameterValidationError> for AgentError {
    fn from(err: ParameterValidationError) -> Self {
        AgentError::InvalidToolParams(err.to_string())
    }
}

/// Result type for parameter validation.
pub type ParamResult<T> = std::result::Result<T, ParameterValidationError>;

/// Helper trait for extracting parameters from JSON arguments.
pub trait ParamExt {
    /// Get a required, non-blank string parameter.
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str>;

    /// Get an optional string parameter.
    fn optional_str(&self, name: &str) -> Option<&str>;

    /// Get an identifier given either as a string or as a number.
    fn required_id(&self, name: &'static str, hint: &'static str) -> ParamResult<String>;

    /// Get an optional whole number given as an integer or an integral float.
    fn optional_count(&self, name: &'static str) -> ParamResult<Option<u64>>;
}

impl ParamExt for Value {
    fn required_str(&self, name: &'static str, hint: &'static str) -> ParamResult<&str> {
        let value = self
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParameterValidationError::missing(name, hint))?;
        if value.trim().is_empty() {
            return Err(ParameterValidationError::invalid_value(
                name,
                value,
                "cannot be empty",
            ));
        }
        Ok(value.trim())
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    fn required_id(&self, name: &'static str, hint: &'static str) -> ParamResult<String> {
        match self.get(name) {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(_)) => self.required_str(name, hint).map(str::to_string),
            Some(other) => Err(ParameterValidationError::invalid_type(
                name,
                "string",
                json_type(other),
            )),
            None => Err(ParameterValidationError::missing(name, hint)),
        }
    }

    fn optional_count(&self, name: &'static str) -> ParamResult<Option<u64>> {
        let Some(value) = self.get(name).filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        if let Some(n) = value.as_u64() {
            return Ok(Some(n));
        }
        match value.as_f64() {
            Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as u64)),
            Some(f) => Err(ParameterValidationError::out_of_range(
                name,
                f,
                "must be a non-negative whole number",
            )),
            None => Err(ParameterValidationError::invalid_type(
                name,
                "integer",
                json_type(value),
            )),
        }
    }
}

/// JSON Schema type name of a value.
fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// `type` of a property schema: a single name or a list of names.
fn declared_types(spec: &Value) -> Vec<&str> {
    match spec.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Check `params` against the subset of JSON Schema the tools declare:
/// an object with `required` names, per-property `type` and `minimum`.
///
/// Unknown properties are ignored; `null` counts as absent.
pub fn validate_params(schema: &Value, params: &Value) -> ParamResult<()> {
    let Some(args) = params.as_object() else {
        return Err(ParameterValidationError::invalid_type(
            "arguments",
            "object",
            json_type(params),
        ));
    };

    let mut errors = Vec::new();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if args.get(name).is_none_or(Value::is_null) {
                let hint = schema["properties"][name]["description"]
                    .as_str()
                    .unwrap_or("required by the tool schema");
                errors.push(ParameterValidationError::missing(name, hint));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, value) in args {
            let Some(spec) = properties.get(name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let expected = declared_types(spec);
            if !expected.is_empty() && !expected.iter().any(|t| matches_type(value, t)) {
                errors.push(ParameterValidationError::invalid_type(
                    name,
                    expected.join(" or "),
                    json_type(value),
                ));
                continue;
            }
            let minimum = spec.get("minimum").and_then(Value::as_f64);
            if let (Some(min), Some(n)) = (minimum, value.as_f64())
                && n < min
            {
                errors.push(ParameterValidationError::out_of_range(
                    name,
                    value,
                    format!("must be at least {min}"),
                ));
            }
        }
    }

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ParameterValidationError::Multiple(errors)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed Parameter Structs
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of ranges `list_mountain_ranges` returns.
pub const DEFAULT_NUM_RANGES: usize = 3;

/// Validated parameters for `list_mountain_ranges`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRangesParams {
    pub location: String,
    pub num_ranges: usize,
}

impl TryFrom<Value> for ListRangesParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> std::result::Result<Self, Self::Error> {
        let location = params.required_str("location", "provide a place name to search around")?;
        let num_ranges = params
            .optional_count("num_ranges")?
            .map_or(DEFAULT_NUM_RANGES, |n| n as usize);
        if num_ranges == 0 {
            return Err(ParameterValidationError::out_of_range(
                "num_ranges",
                num_ranges,
                "must be at least 1",
            ));
        }

        Ok(Self {
            location: location.to_string(),
            num_ranges,
        })
    }
}

/// Validated parameters for `list_routes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRoutesParams {
    /// Comma-joined catalog massif ids.
    pub mountain_range_ids: String,
}

impl TryFrom<Value> for ListRoutesParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> std::result::Result<Self, Self::Error> {
        const HINT: &str = "pass the ids returned by list_mountain_ranges, comma separated";

        // Models sometimes send the ids as a list.
        let mountain_range_ids = match params.get("mountain_range_ids") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(","),
            _ => params.required_id("mountain_range_ids", HINT)?,
        };
        if mountain_range_ids.is_empty() {
            return Err(ParameterValidationError::invalid_value(
                "mountain_range_ids",
                "",
                HINT,
            ));
        }

        Ok(Self { mountain_range_ids })
    }
}

/// Validated parameters for `describe_route`.
#[derive(Debug, Clone, PartialEq)]
pub struct DescribeRouteParams {
    pub id_route: String,
    pub id_range: String,
}

impl TryFrom<Value> for DescribeRouteParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id_route: params.required_id("id_route", "use an id returned by list_routes")?,
            id_range: params
                .required_id("id_range", "use the mountain range id the route belongs to")?,
        })
    }
}

/// Validated parameters for tools taking a single massif id.
#[derive(Debug, Clone, PartialEq)]
pub struct MassifParams {
    pub massif_id: String,
}

impl MassifParams {
    /// Read the id from `field`, which differs between tools.
    pub fn from_field(params: &Value, field: &'static str) -> ParamResult<Self> {
        Ok(Self {
            massif_id: params.required_id(field, "use an id returned by list_mountain_ranges")?,
        })
    }
}

/// Validated parameters for `forecast`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastParams {
    pub location: String,
}

impl TryFrom<Value> for ForecastParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> std::result::Result<Self, Self::Error> {
        let location = params.required_str("location", "provide a place name")?;
        Ok(Self {
            location: location.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A capability the model can invoke by name.
///
/// Each tool defines its parameters as a JSON Schema and implements async
/// execution. Expected failures (an upstream service down, nothing found)
/// are returned as [`ToolResult::Error`] so the model can react; `Err` is
/// for failures of the tool itself.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the unique name of this tool.
    fn name(&self) -> &str;

    /// Get a description of what this tool does, written for the model.
    fn description(&self) -> &str;

    /// Get the JSON Schema for this tool's parameters.
    fn parameters(&self) -> Value;

    /// Execute the tool with arguments that passed schema validation.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// ID of the turn this tool is running in.
    pub turn_id: TurnId,
    /// Turn-scoped cancellation.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    pub fn new(turn_id: TurnId) -> Self {
        Self::with_cancellation(turn_id, CancellationToken::new())
    }

    pub fn with_cancellation(turn_id: TurnId, cancellation: CancellationToken) -> Self {
        Self {
            turn_id,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(TurnId::new())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Result
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    /// Successful text output.
    Text { content: String },
    /// Successful JSON output.
    Json { content: Value },
    /// Tool execution failed.
    Error {
        message: String,
        /// Whether the model can sensibly retry with other arguments.
        recoverable: bool,
    },
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn json(content: Value) -> Self {
        Self::Json { content }
    }

    /// Serialize `value` into a JSON result.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::json(serde_json::to_value(value)?))
    }

    /// Create a recoverable error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            recoverable: true,
        }
    }

    /// Create a non-recoverable error result.
    pub fn fatal_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            recoverable: false,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// The JSON payload, if this is a JSON result.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json { content } => Some(content),
            _ => None,
        }
    }

    /// Get the content as a string for the model.
    pub fn to_llm_content(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Json { content } => content.to_string(),
            Self::Error { message, .. } => format!("Error: {}", message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry for the tools offered to the model.
///
/// Tools are kept sorted by name so the definitions sent to the model are
/// stable from one request to the next.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a tool from an Arc.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Convert all tools to LLM tool definitions.
    pub fn to_llm_definitions(&self) -> Vec<alpine_llm::ToolDefinition> {
        self.tools
            .values()
            .map(|tool| {
                alpine_llm::ToolDefinition::new(tool.name(), tool.description(), tool.parameters())
            })
            .collect()
    }

    /// Validate `params` against the tool's schema, then execute it.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        validate_params(&tool.parameters(), &params)?;
        tool.execute(params, ctx).await
    }

    /// Execute a tool call from the model. Never fails: every problem,
    /// including an unknown tool name, becomes a recoverable error result
    /// the model can correct.
    pub async fn dispatch(&self, name: &str, params: Value, ctx: &ToolContext) -> ToolResult {
        match self.execute(name, params, ctx).await {
            Ok(result) => result,
            Err(AgentError::ToolNotFound(name)) => ToolResult::error(format!(
                "The tool '{}' does not exist. Available tools are: {}.",
                name,
                self.names().join(", ")
            )),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool execution failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

/// A tool returning a fixed result and recording the arguments it received.
#[cfg(test)]
#[derive(Debug)]
pub struct MockTool {
    name: String,
    schema: Value,
    response: ToolResult,
    calls: std::sync::Mutex<Vec<Value>>,
}

#[cfg(test)]
impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: serde_json::json!({"type": "object", "properties": {}}),
            response: ToolResult::text("ok"),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_response(mut self, response: ToolResult) -> Self {
        self.response = response;
        self
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A mock tool for testing"
    }

    fn parameters(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
        self.calls.lock().unwrap().push(params);
        Ok(self.response.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
