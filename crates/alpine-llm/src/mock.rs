//! A scripted backend for deterministic tests of the dispatch loop and the
//! summarizer.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::backend::LlmBackend;
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, ContentBlock, StopReason, Usage};

/// One scripted reply.
#[derive(Debug)]
pub enum MockResponse {
    Success(CompletionResponse),
    Error(LlmError),
}

impl MockResponse {
    /// A plain text answer.
    pub fn text(text: impl Into<String>) -> Self {
        MockResponse::Success(CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::text(text)],
            StopReason::EndTurn,
            Usage::new(10, 20),
        ))
    }

    /// A single tool invocation.
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        MockResponse::Success(CompletionResponse::new(
            "mock_msg",
            "mock-model",
            vec![ContentBlock::tool_use(id, name, input)],
            StopReason::ToolUse,
            Usage::new(10, 20),
        ))
    }
}

/// Returns pre-configured responses in order and records every request.
///
/// Once the script is exhausted, the backend either repeats its last entry
/// (see [`MockBackend::repeating`]) or fails with a backend error.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    responses: Mutex<VecDeque<MockResponse>>,
    repeat_last: Option<CompletionResponse>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses.into()),
            repeat_last: None,
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// A backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::text(text)])
    }

    /// A backend that returns the same response forever.
    pub fn repeating(response: CompletionResponse) -> Self {
        Self {
            repeat_last: Some(response),
            ..Self::new(Vec::new())
        }
    }

    /// All requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.request_log).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.request_log).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        lock(&self.request_log).push(request);

        match lock(&self.responses).pop_front() {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            None => self.repeat_last.clone().ok_or_else(|| {
                LlmError::Backend("MockBackend: no more responses available".to_string())
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::new("test-model", vec![Message::user("Hi")], 100)
    }

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let backend = MockBackend::new(vec![
            MockResponse::tool_call("t1", "forecast", json!({"location": "Chamonix"})),
            MockResponse::Error(LlmError::Network("down".into())),
            MockResponse::text("done"),
        ]);

        assert!(backend.complete(request()).await.unwrap().has_tool_use());
        assert!(backend.complete(request()).await.is_err());
        assert_eq!(backend.complete(request()).await.unwrap().text(), "done");
        assert!(backend.complete(request()).await.is_err());
        assert_eq!(backend.request_count(), 4);
    }

    #[tokio::test]
    async fn test_repeating_never_runs_out() {
        let MockResponse::Success(reply) = MockResponse::text("again") else {
            unreachable!()
        };
        let backend = MockBackend::repeating(reply);
        for _ in 0..5 {
            assert_eq!(backend.complete(request()).await.unwrap().text(), "again");
        }
        assert_eq!(backend.requests().len(), 5);
    }
}
