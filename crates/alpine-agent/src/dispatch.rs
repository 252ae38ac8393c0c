//! The tool dispatch loop.
//!
//! One turn alternates between asking the model for its next move and
//! running the tool it selected, until the model answers without a tool
//! call or the step ceiling is reached. Progress is reported as a stream of
//! [`TurnEvent`]s whose last item always carries the [`Advisory`].

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use alpine_llm::{CompletionRequest, ContentBlock, Message, SharedBackend};

use crate::advisory::Advisory;
use crate::tool::{ToolContext, ToolRegistry};
use crate::types::{Conversation, DispatchConfig, ToolCallRecord, TurnId};

// ─────────────────────────────────────────────────────────────────────────────
// Turn Events
// ─────────────────────────────────────────────────────────────────────────────

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEnd {
    /// The model gave a final answer.
    Answered,
    /// The step ceiling was reached first.
    StepBudgetExceeded,
    /// The model backend failed.
    LlmFailure,
    /// The caller cancelled the turn.
    Cancelled,
}

/// Final state of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub advisory: Advisory,
    pub records: Vec<ToolCallRecord>,
    /// Number of tool executions.
    pub steps: usize,
    pub end: TurnEnd,
}

impl TurnOutcome {
    fn new(advisory: Advisory, records: Vec<ToolCallRecord>, end: TurnEnd) -> Self {
        Self {
            steps: records.len(),
            advisory,
            records,
            end,
        }
    }
}

/// Progress of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Text the model produced alongside its tool calls.
    Text { content: String },
    /// A tool is about to run.
    ToolStart {
        ordinal: usize,
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// A tool step completed.
    ToolEnd { record: ToolCallRecord },
    /// The turn is over.
    Done { outcome: TurnOutcome },
    /// The turn was cancelled; the outcome holds the steps completed before.
    Cancelled { outcome: TurnOutcome },
}

impl TurnEvent {
    /// The outcome carried by a terminal event.
    pub fn outcome(&self) -> Option<&TurnOutcome> {
        match self {
            TurnEvent::Done { outcome } | TurnEvent::Cancelled { outcome } => Some(outcome),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }
}

/// A boxed stream of turn events.
pub type TurnStream = Pin<Box<dyn Stream<Item = TurnEvent> + Send + 'static>>;

const CANCELLED_MESSAGE: &str = "The request was cancelled before an answer was produced.";

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Runs turns against a model backend and a tool registry.
#[derive(Clone)]
pub struct ToolDispatchLoop {
    backend: SharedBackend,
    tools: Arc<ToolRegistry>,
    config: DispatchConfig,
    system_prompt: Option<String>,
}

impl ToolDispatchLoop {
    pub fn new(backend: SharedBackend, tools: ToolRegistry, config: DispatchConfig) -> Self {
        Self {
            backend,
            tools: Arc::new(tools),
            config,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn and collect its outcome.
    pub async fn turn(
        &self,
        history: &Conversation,
        user_message: &str,
        cancellation: CancellationToken,
    ) -> TurnOutcome {
        let mut stream = self.run_turn(history, user_message, cancellation);
        while let Some(event) = stream.next().await {
            if let TurnEvent::Done { outcome } | TurnEvent::Cancelled { outcome } = event {
                return outcome;
            }
        }
        // The stream always ends with a terminal event.
        TurnOutcome::new(
            Advisory::message_only(CANCELLED_MESSAGE),
            Vec::new(),
            TurnEnd::Cancelled,
        )
    }

    /// Run one turn as a stream of events.
    pub fn run_turn(
        &self,
        history: &Conversation,
        user_message: &str,
        cancellation: CancellationToken,
    ) -> TurnStream {
        let this = self.clone();
        let mut messages = history.to_messages();
        messages.push(Message::user(user_message));
        let turn_id = TurnId::new();

        tracing::info!(
            turn_id = %turn_id,
            history = history.len(),
            max_steps = this.config.max_steps,
            "Starting turn"
        );

        Box::pin(async_stream::stream! {
            let ctx = ToolContext::with_cancellation(turn_id, cancellation.clone());
            let mut messages = messages;
            let mut records: Vec<ToolCallRecord> = Vec::new();
            let mut last_text = String::new();

            loop {
                if cancellation.is_cancelled() {
                    tracing::info!(turn_id = %turn_id, steps = records.len(), "Turn cancelled");
                    let outcome = TurnOutcome::new(
                        Advisory::message_only(CANCELLED_MESSAGE),
                        records,
                        TurnEnd::Cancelled,
                    );
                    yield TurnEvent::Cancelled { outcome };
                    return;
                }

                let request = this.build_request(messages.clone());
                let response = tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => None,
                    response = this.backend.complete(request) => Some(response),
                };
                let Some(response) = response else {
                    continue;
                };

                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!(turn_id = %turn_id, error = %e, "Model request failed");
                        let advisory = Advisory::message_only(format!(
                            "The advisor could not complete this request because the language \
                             model failed: {e}"
                        ))
                        .with_described_routes(&records);
                        let outcome = TurnOutcome::new(advisory, records, TurnEnd::LlmFailure);
                        yield TurnEvent::Done { outcome };
                        return;
                    }
                };

                let text = response.text();
                let tool_uses = response.tool_uses();

                if tool_uses.is_empty() {
                    let advisory = Advisory::from_answer(&text, &records);
                    tracing::info!(
                        turn_id = %turn_id,
                        steps = records.len(),
                        itineraries = advisory.itineraries().len(),
                        "Turn answered"
                    );
                    let outcome = TurnOutcome::new(advisory, records, TurnEnd::Answered);
                    yield TurnEvent::Done { outcome };
                    return;
                }

                if !text.trim().is_empty() {
                    last_text = text.clone();
                    yield TurnEvent::Text { content: text };
                }

                messages.push(Message::assistant_blocks(response.content.clone()));
                let mut results = Vec::new();

                for tool_use in tool_uses {
                    if records.len() >= this.config.max_steps {
                        break;
                    }
                    let ordinal = records.len() + 1;
                    tracing::debug!(
                        turn_id = %turn_id,
                        ordinal,
                        tool = %tool_use.name,
                        "Executing tool"
                    );
                    yield TurnEvent::ToolStart {
                        ordinal,
                        id: tool_use.id.clone(),
                        name: tool_use.name.clone(),
                        arguments: tool_use.input.clone(),
                    };

                    let outcome = tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => None,
                        outcome = this.tools.dispatch(&tool_use.name, tool_use.input.clone(), &ctx) => Some(outcome),
                    };
                    // In-flight results of a cancelled turn are discarded.
                    let Some(outcome) = outcome else {
                        break;
                    };

                    results.push(ContentBlock::tool_result(
                        &tool_use.id,
                        outcome.to_llm_content(),
                        outcome.is_error(),
                    ));
                    let record = ToolCallRecord {
                        ordinal,
                        tool_name: tool_use.name,
                        arguments: tool_use.input,
                        outcome,
                    };
                    records.push(record.clone());
                    yield TurnEvent::ToolEnd { record };
                }

                if cancellation.is_cancelled() {
                    continue;
                }

                if records.len() >= this.config.max_steps {
                    tracing::warn!(
                        turn_id = %turn_id,
                        max_steps = this.config.max_steps,
                        "Step ceiling reached"
                    );
                    let advisory = budget_exceeded(&last_text, this.config.max_steps, &records);
                    let outcome = TurnOutcome::new(advisory, records, TurnEnd::StepBudgetExceeded);
                    yield TurnEvent::Done { outcome };
                    return;
                }

                messages.push(Message::tool_results(results));
            }
        })
    }

    fn build_request(&self, messages: Vec<Message>) -> CompletionRequest {
        let mut request =
            CompletionRequest::new(&self.config.model, messages, self.config.max_tokens);

        if let Some(ref prompt) = self.system_prompt {
            request = request.with_system(prompt);
        }

        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }

        let tool_defs = self.tools.to_llm_definitions();
        if !tool_defs.is_empty() {
            request = request.with_tools(tool_defs);
        }

        request
    }
}

impl std::fmt::Debug for ToolDispatchLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatchLoop")
            .field("tools", &self.tools)
            .field("config", &self.config)
            .finish()
    }
}

/// Best-effort answer when the ceiling stops a turn: whatever the model
/// said so far plus every route the turn described.
fn budget_exceeded(last_text: &str, max_steps: usize, records: &[ToolCallRecord]) -> Advisory {
    let note = format!("[Response truncated: step limit of {max_steps} tool calls reached]");
    let mut advisory = Advisory::from_answer(last_text, records).with_described_routes(records);
    advisory.message = if advisory.message.trim().is_empty() {
        note
    } else {
        format!("{}\n\n{}", advisory.message.trim_end(), note)
    };
    advisory
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{MockTool, Tool, ToolResult};
    use alpine_llm::{
        CompletionResponse, LlmError, MockBackend, MockResponse, Role, StopReason, Usage,
    };
    use async_trait::async_trait;
    use serde_json::{Value, json};

    fn dispatch_loop(backend: Arc<MockBackend>, tools: ToolRegistry) -> ToolDispatchLoop {
        ToolDispatchLoop::new(backend, tools, DispatchConfig::new("test-model"))
            .with_system_prompt("You advise ski tourers.")
    }

    fn registry_with(tool: Arc<MockTool>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_arc(tool);
        registry
    }

    async fn collect(stream: TurnStream) -> Vec<TurnEvent> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_plain_answer_without_tools() {
        let backend = Arc::new(MockBackend::with_text(
            r#"{"message": "Bonjour !", "itineraries": null}"#,
        ));
        let agent = dispatch_loop(backend.clone(), ToolRegistry::new());

        let outcome = agent
            .turn(&Conversation::new(), "Salut", CancellationToken::new())
            .await;

        assert_eq!(outcome.end, TurnEnd::Answered);
        assert_eq!(outcome.advisory.message, "Bonjour !");
        assert!(outcome.advisory.itineraries.is_none());
        assert_eq!(outcome.steps, 0);

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some("You advise ski tourers."));
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let tool = Arc::new(MockTool::new("list_routes").with_response(ToolResult::json(json!([
            {"id": "104", "name": "Col du Passon", "start": {"lat": 45.99, "lon": 6.98},
             "detail_link": "https://skitour.fr/topos/104"}
        ]))));
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("call_1", "list_routes", json!({})),
            MockResponse::text(
                r#"{"message": "Le Col du Passon", "itineraries": [
                    {"id": "104", "name": "col", "start": {"lat": 1.0, "lon": 1.0}, "link": "x"},
                    {"id": "999", "name": "invented", "start": {"lat": 1.0, "lon": 1.0}, "link": "y"}
                ]}"#,
            ),
        ]));
        let agent = dispatch_loop(backend.clone(), registry_with(tool.clone()));

        let events = collect(agent.run_turn(
            &Conversation::new(),
            "Une course près de Chamonix ?",
            CancellationToken::new(),
        ))
        .await;

        assert!(matches!(events[0], TurnEvent::ToolStart { ordinal: 1, .. }));
        assert!(matches!(events[1], TurnEvent::ToolEnd { .. }));
        assert_eq!(events.len(), 3);
        let outcome = events[2].outcome().unwrap();
        assert_eq!(outcome.end, TurnEnd::Answered);

        let itineraries = outcome.advisory.itineraries();
        assert_eq!(itineraries.len(), 1);
        assert_eq!(itineraries[0].name, "Col du Passon");
        assert_eq!(itineraries[0].detail_link, "https://skitour.fr/topos/104");
        assert_eq!(tool.call_count(), 1);

        // second request carries the tool use and its result
        let second = &backend.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[1].role, Role::Assistant);
        let blocks = second.messages[2].content.blocks();
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolResult { tool_use_id, is_error: false, .. } if tool_use_id == "call_1"
        ));
    }

    #[tokio::test]
    async fn test_step_ceiling_forces_done_after_tenth_execution() {
        let tool = Arc::new(MockTool::new("forecast"));
        let backend = Arc::new(MockBackend::repeating(CompletionResponse::new(
            "msg",
            "test-model",
            vec![
                ContentBlock::text("Je vérifie encore."),
                ContentBlock::tool_use("call", "forecast", json!({})),
            ],
            StopReason::ToolUse,
            Usage::new(1, 1),
        )));
        let agent = dispatch_loop(backend.clone(), registry_with(tool.clone()));

        let outcome = agent
            .turn(&Conversation::new(), "Encore", CancellationToken::new())
            .await;

        assert_eq!(outcome.end, TurnEnd::StepBudgetExceeded);
        assert_eq!(outcome.steps, 10);
        assert_eq!(tool.call_count(), 10);
        assert_eq!(backend.request_count(), 10);
        let ordinals: Vec<_> = outcome.records.iter().map(|r| r.ordinal).collect();
        assert_eq!(ordinals, (1..=10).collect::<Vec<_>>());
        assert!(outcome.advisory.message.starts_with("Je vérifie encore."));
        assert!(outcome.advisory.message.contains("step limit of 10"));
        assert!(outcome.advisory.itineraries.is_none());
    }

    #[tokio::test]
    async fn test_ceiling_applies_within_one_response() {
        let tool = Arc::new(MockTool::new("forecast"));
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Success(
            CompletionResponse::new(
                "msg",
                "test-model",
                vec![
                    ContentBlock::tool_use("a", "forecast", json!({})),
                    ContentBlock::tool_use("b", "forecast", json!({})),
                    ContentBlock::tool_use("c", "forecast", json!({})),
                ],
                StopReason::ToolUse,
                Usage::new(1, 1),
            ),
        )]));
        let agent = ToolDispatchLoop::new(
            backend.clone(),
            registry_with(tool.clone()),
            DispatchConfig::new("test-model").with_max_steps(2),
        );

        let outcome = agent
            .turn(&Conversation::new(), "Trois appels", CancellationToken::new())
            .await;

        assert_eq!(outcome.end, TurnEnd::StepBudgetExceeded);
        assert_eq!(tool.call_count(), 2);
        assert_eq!(backend.request_count(), 1);
    }

    fn described_route() -> Arc<MockTool> {
        Arc::new(MockTool::new("describe_route").with_response(ToolResult::json(json!({
            "route_info": {
                "id": "104",
                "name": "Col du Passon",
                "start": {"lat": 45.9906, "lon": 6.9844},
                "detail_link": "https://skitour.fr/topos/104"
            },
            "avalanche_conditions": {"status": "available", "summary": "Risque 4 fort, vent violent.", "summarized": true},
            "daily_weather_forecast": {"status": "unavailable", "reason": "forecast service timed out"},
            "route_link": "https://skitour.fr/topos/104"
        }))))
    }

    #[tokio::test]
    async fn test_ceiling_answer_keeps_described_routes() {
        let backend = Arc::new(MockBackend::repeating(CompletionResponse::new(
            "msg",
            "test-model",
            vec![ContentBlock::tool_use(
                "call",
                "describe_route",
                json!({"id_route": "104", "id_range": "12"}),
            )],
            StopReason::ToolUse,
            Usage::new(1, 1),
        )));
        let agent = ToolDispatchLoop::new(
            backend,
            registry_with(described_route()),
            DispatchConfig::new("test-model").with_max_steps(2),
        );

        let outcome = agent
            .turn(&Conversation::new(), "Le Col du Passon ?", CancellationToken::new())
            .await;

        assert_eq!(outcome.end, TurnEnd::StepBudgetExceeded);
        assert_eq!(outcome.steps, 2);
        let message = &outcome.advisory.message;
        assert!(message.contains("Col du Passon (104)"));
        assert!(message.contains("Risque 4 fort, vent violent."));
        assert!(message.contains("unavailable (forecast service timed out)"));
        assert!(message.ends_with("[Response truncated: step limit of 2 tool calls reached]"));
        // described twice, listed once
        assert_eq!(message.matches("Col du Passon (104)").count(), 1);

        let itineraries = outcome.advisory.itineraries();
        assert_eq!(itineraries.len(), 1);
        assert_eq!(itineraries[0].route_id, "104");
        assert_eq!(itineraries[0].start.lat(), 45.9906);
        assert_eq!(itineraries[0].detail_link, "https://skitour.fr/topos/104");
    }

    #[tokio::test]
    async fn test_llm_failure_keeps_described_routes() {
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("call_1", "describe_route", json!({"id_route": "104", "id_range": "12"})),
            MockResponse::Error(LlmError::Network("connection reset".to_string())),
        ]));
        let agent = dispatch_loop(backend, registry_with(described_route()));

        let outcome = agent
            .turn(&Conversation::new(), "Le Col du Passon ?", CancellationToken::new())
            .await;

        assert_eq!(outcome.end, TurnEnd::LlmFailure);
        assert!(outcome.advisory.message.contains("connection reset"));
        assert!(outcome.advisory.message.contains("Risque 4 fort"));
        assert_eq!(outcome.advisory.itineraries()[0].name, "Col du Passon");
    }

    #[tokio::test]
    async fn test_multiple_calls_run_in_order() {
        let first = Arc::new(MockTool::new("list_mountain_ranges"));
        let second = Arc::new(MockTool::new("list_routes"));
        let mut registry = ToolRegistry::new();
        registry.register_arc(first.clone());
        registry.register_arc(second.clone());

        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::Success(CompletionResponse::new(
                "msg",
                "test-model",
                vec![
                    ContentBlock::tool_use("a", "list_routes", json!({})),
                    ContentBlock::tool_use("b", "list_mountain_ranges", json!({})),
                ],
                StopReason::ToolUse,
                Usage::new(1, 1),
            )),
            MockResponse::text("Voilà."),
        ]));
        let agent = dispatch_loop(backend.clone(), registry);

        let outcome = agent
            .turn(&Conversation::new(), "Deux appels", CancellationToken::new())
            .await;

        let names: Vec<_> = outcome.records.iter().map(|r| r.tool_name.as_str()).collect();
        assert_eq!(names, ["list_routes", "list_mountain_ranges"]);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.advisory.message, "Voilà.");

        let blocks = backend.requests()[1].messages[2].content.blocks();
        assert_eq!(blocks.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back_and_counted() {
        let tool = Arc::new(MockTool::new("forecast"));
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("call_1", "weather_now", json!({"location": "Chamonix"})),
            MockResponse::text(r#"{"message": "Désolé.", "itineraries": null}"#),
        ]));
        let agent = dispatch_loop(backend.clone(), registry_with(tool.clone()));

        let outcome = agent
            .turn(&Conversation::new(), "Météo ?", CancellationToken::new())
            .await;

        assert_eq!(outcome.steps, 1);
        assert!(!outcome.records[0].succeeded());
        assert_eq!(tool.call_count(), 0);

        let blocks = backend.requests()[1].messages[2].content.blocks();
        match &blocks[0] {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content.contains("The tool 'weather_now' does not exist"));
                assert!(content.contains("forecast"));
            }
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_schema_error_is_fed_back() {
        let tool = Arc::new(MockTool::new("list_mountain_ranges").with_schema(json!({
            "type": "object",
            "properties": {"location": {"type": "string"}},
            "required": ["location"]
        })));
        let backend = Arc::new(MockBackend::new(vec![
            MockResponse::tool_call("call_1", "list_mountain_ranges", json!({"num_ranges": 2})),
            MockResponse::tool_call("call_2", "list_mountain_ranges", json!({"location": "Briançon"})),
            MockResponse::text("Fini."),
        ]));
        let agent = dispatch_loop(backend.clone(), registry_with(tool.clone()));

        let outcome = agent
            .turn(&Conversation::new(), "Près de Briançon", CancellationToken::new())
            .await;

        assert_eq!(outcome.steps, 2);
        assert!(!outcome.records[0].succeeded());
        assert!(outcome.records[0].outcome.to_llm_content().contains("location"));
        assert!(outcome.records[1].succeeded());
        assert_eq!(tool.calls(), vec![json!({"location": "Briançon"})]);
    }

    #[tokio::test]
    async fn test_llm_failure_still_yields_advisory() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Error(
            LlmError::Network("connection reset".to_string()),
        )]));
        let agent = dispatch_loop(backend, ToolRegistry::new());

        let events = collect(agent.run_turn(
            &Conversation::new(),
            "Salut",
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(events.len(), 1);
        let outcome = events[0].outcome().unwrap();
        assert_eq!(outcome.end, TurnEnd::LlmFailure);
        assert!(outcome.advisory.message.contains("connection reset"));
        assert!(outcome.advisory.itineraries.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let backend = Arc::new(MockBackend::with_text("jamais"));
        let agent = dispatch_loop(backend.clone(), ToolRegistry::new());
        let token = CancellationToken::new();
        token.cancel();

        let events = collect(agent.run_turn(&Conversation::new(), "Salut", token)).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TurnEvent::Cancelled { .. }));
        assert_eq!(backend.request_count(), 0);
    }

    /// Cancels the turn while running.
    struct CancellingTool {
        token: CancellationToken,
    }

    #[async_trait]
    impl Tool for CancellingTool {
        fn name(&self) -> &str {
            "forecast"
        }

        fn description(&self) -> &str {
            "Cancels the turn"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> crate::Result<ToolResult> {
            self.token.cancel();
            Ok(ToolResult::text("done"))
        }
    }

    #[tokio::test]
    async fn test_no_step_starts_after_cancellation() {
        let token = CancellationToken::new();
        let mut registry = ToolRegistry::new();
        registry.register(CancellingTool {
            token: token.clone(),
        });
        let backend = Arc::new(MockBackend::repeating(CompletionResponse::new(
            "msg",
            "test-model",
            vec![ContentBlock::tool_use("call", "forecast", json!({}))],
            StopReason::ToolUse,
            Usage::new(1, 1),
        )));
        let agent = dispatch_loop(backend.clone(), registry);

        let events = collect(agent.run_turn(&Conversation::new(), "Salut", token)).await;

        let last = events.last().unwrap();
        assert!(matches!(last, TurnEvent::Cancelled { .. }));
        assert_eq!(last.outcome().unwrap().end, TurnEnd::Cancelled);
        assert_eq!(backend.request_count(), 1);
        let starts = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::ToolStart { .. }))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn test_history_is_replayed() {
        let backend = Arc::new(MockBackend::with_text("Oui."));
        let agent = dispatch_loop(backend.clone(), ToolRegistry::new());
        let mut history = Conversation::new();
        history.push("Une course facile ?", Advisory::message_only("Le Col du Passon."));

        agent
            .turn(&history, "Et demain ?", CancellationToken::new())
            .await;

        let messages = &backend.requests()[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content.to_text(), "Une course facile ?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages[1].content.to_text().contains("Le Col du Passon."));
        assert_eq!(messages[2].content.to_text(), "Et demain ?");
    }

    #[test]
    fn test_turn_event_serialization() {
        let event = TurnEvent::ToolStart {
            ordinal: 1,
            id: "call_1".to_string(),
            name: "forecast".to_string(),
            arguments: json!({"location": "Chamonix"}),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_start");
        assert_eq!(value["arguments"]["location"], "Chamonix");

        let done = TurnEvent::Done {
            outcome: TurnOutcome::new(Advisory::message_only("ok"), Vec::new(), TurnEnd::Answered),
        };
        let value = serde_json::to_value(&done).unwrap();
        assert_eq!(value["type"], "done");
        assert_eq!(value["outcome"]["end"], "answered");
        assert!(value["outcome"]["advisory"]["itineraries"].is_null());
    }
}
