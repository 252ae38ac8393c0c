//! Core types for the dispatch loop.
//!
//! - [`TurnId`]: identifies one user turn in logs and tool contexts
//! - [`ToolCallRecord`]: one executed step of a turn
//! - [`Conversation`]: prior turns replayed to the model
//! - [`DispatchConfig`]: runtime settings for the loop

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use alpine_llm::Message;

use crate::advisory::Advisory;
use crate::tool::ToolResult;

// ─────────────────────────────────────────────────────────────────────────────
// ID Types
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    /// Create a new random turn ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Call Record
// ─────────────────────────────────────────────────────────────────────────────

/// One executed tool step. Records of a turn are append-only and numbered
/// from 1 in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub ordinal: usize,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// What the model saw: the tool output or the error fed back to it.
    pub outcome: ToolResult,
}

impl ToolCallRecord {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// A completed exchange kept as history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub user_message: String,
    pub advisory: Advisory,
}

/// Prior turns of a chat session.
///
/// Only the user message and the final advisory of each turn are kept; tool
/// traffic from earlier turns is not replayed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    exchanges: Vec<Exchange>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, user_message: impl Into<String>, advisory: Advisory) {
        self.exchanges.push(Exchange {
            user_message: user_message.into(),
            advisory,
        });
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Alternating user/assistant messages, oldest first. Assistant turns are
    /// replayed in the answer format the model is asked to produce.
    pub fn to_messages(&self) -> Vec<Message> {
        self.exchanges
            .iter()
            .flat_map(|e| {
                [
                    Message::user(&e.user_message),
                    Message::assistant(e.advisory.to_json()),
                ]
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default ceiling on tool executions per turn.
pub const DEFAULT_MAX_STEPS: usize = 10;

/// Configuration for the dispatch loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Model identifier to use.
    pub model: String,
    /// Maximum tokens for each model response.
    pub max_tokens: u32,
    /// Temperature for sampling (0.0 - 1.0).
    pub temperature: Option<f32>,
    /// Ceiling on tool executions per turn, unknown tools and rejected
    /// arguments included.
    pub max_steps: usize,
}

impl DispatchConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 4096,
            temperature: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new("claude-sonnet-4-20250514")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use alpine_llm::Role;

    #[test]
    fn test_turn_ids_are_unique() {
        assert_ne!(TurnId::new(), TurnId::new());
    }

    #[test]
    fn test_conversation_replays_in_order() {
        let mut conversation = Conversation::new();
        conversation.push("Routes near Briançon?", Advisory::message_only("Try the Cerces."));
        conversation.push("And the weather?", Advisory::message_only("Snow tonight."));

        let messages = conversation.to_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content.to_text(), "Routes near Briançon?");
        assert_eq!(messages[1].role, Role::Assistant);

        let replayed: serde_json::Value =
            serde_json::from_str(&messages[3].content.to_text()).unwrap();
        assert_eq!(replayed["message"], "Snow tonight.");
        assert!(replayed["itineraries"].is_null());

        conversation.clear();
        assert!(conversation.is_empty());
    }

    #[test]
    fn test_dispatch_config_defaults() {
        let config = DispatchConfig::new("m").with_max_steps(4).with_temperature(0.2);
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(DispatchConfig::default().max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_record_success_follows_outcome() {
        let record = ToolCallRecord {
            ordinal: 1,
            tool_name: "forecast".into(),
            arguments: serde_json::json!({"location": "Chamonix"}),
            outcome: ToolResult::error("geocoder down"),
        };
        assert!(!record.succeeded());
    }
}
