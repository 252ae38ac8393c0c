//! LLM client abstraction for Alpine.
//!
//! The reasoning process behind the advisor and the summarizer is a single
//! injected capability: the [`LlmBackend`] trait. Concrete providers are
//! interchangeable implementations of it.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  LlmBackend trait                       │
//! │  - complete(request) -> response        │
//! └─────────────────────────────────────────┘
//!                    │
//!          ┌─────────┴─────────┐
//!          ▼                   ▼
//!     ┌──────────┐       ┌──────────┐
//!     │Anthropic │       │  OpenAI  │
//!     └──────────┘       └──────────┘
//! ```

pub mod backend;
pub mod error;
pub mod types;

pub mod anthropic;
pub mod openai;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

pub use backend::{LlmBackend, SharedBackend, with_retry};
pub use error::{LlmError, Result};
pub use types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, Message, Role, StopReason,
    ToolDefinition, ToolUseBlock, Usage,
};

pub use anthropic::{AnthropicBackend, AnthropicConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockResponse};
