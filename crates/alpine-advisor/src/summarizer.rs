//! LLM summaries of forecast series and avalanche bulletins.

use alpine_llm::{CompletionRequest, Message, SharedBackend};
use serde::Serialize;

use crate::error::{AdvisorError, Result};
use crate::sources::http::truncate_chars;

/// System instruction for every summary request.
pub const SUMMARY_PROMPT: &str = "You're an expert at summarizing data on weather forecast \
and avalanche conditions. Summarize the data that's been provided to you below";

/// Default cap on raw payloads returned when summarization fails.
pub const DEFAULT_RAW_MAX_CHARS: usize = 4000;

const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 1024;

/// Marker prefixed to raw payloads that could not be summarized.
const UNSUMMARIZED_NOTE: &str = "[Summary unavailable; raw data follows, possibly truncated]";

/// A summary, or the raw payload it fell back to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub text: String,
    pub summarized: bool,
}

/// Reduces large payloads to prose with one LLM call each.
#[derive(Clone)]
pub struct Summarizer {
    backend: SharedBackend,
    model: String,
    max_tokens: u32,
    raw_max_chars: usize,
}

impl Summarizer {
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens: DEFAULT_MAX_SUMMARY_TOKENS,
            raw_max_chars: DEFAULT_RAW_MAX_CHARS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Cap on the raw payload used by [`summarize_or_raw`](Self::summarize_or_raw).
    pub fn with_raw_max_chars(mut self, max_chars: usize) -> Self {
        self.raw_max_chars = max_chars;
        self
    }

    pub async fn summarize(&self, payload: &str) -> Result<String> {
        let request = CompletionRequest::new(
            &self.model,
            vec![Message::user(payload)],
            self.max_tokens,
        )
        .with_system(SUMMARY_PROMPT);

        let response = self
            .backend
            .complete(request)
            .await
            .map_err(|e| AdvisorError::Summarization(e.to_string()))?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(AdvisorError::Summarization(
                "model returned an empty summary".to_string(),
            ));
        }
        Ok(text)
    }

    /// Summarize, falling back to the truncated raw payload on failure.
    pub async fn summarize_or_raw(&self, payload: &str) -> Summary {
        match self.summarize(payload).await {
            Ok(text) => Summary {
                text,
                summarized: true,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to raw payload");
                Summary {
                    text: format!(
                        "{}\n{}",
                        UNSUMMARIZED_NOTE,
                        truncate_chars(payload, self.raw_max_chars)
                    ),
                    summarized: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alpine_llm::{LlmError, MockBackend, MockResponse};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summarize_sends_fixed_instruction() {
        let backend = Arc::new(MockBackend::with_text("Ciel clair, vent faible."));
        let summarizer = Summarizer::new(backend.clone(), "summary-model");

        let text = summarizer.summarize("{\"temperature_2m\": -4}").await.unwrap();
        assert_eq!(text, "Ciel clair, vent faible.");

        let requests = backend.requests();
        assert_eq!(requests[0].system.as_deref(), Some(SUMMARY_PROMPT));
        assert_eq!(requests[0].model, "summary-model");
        assert_eq!(requests[0].messages[0].content.to_text(), "{\"temperature_2m\": -4}");
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_raw() {
        let backend = Arc::new(MockBackend::new(vec![MockResponse::Error(LlmError::Network(
            "connection reset".to_string(),
        ))]));
        let summarizer = Summarizer::new(backend, "m").with_raw_max_chars(5);

        let summary = summarizer.summarize_or_raw("Éboulements fréquents").await;
        assert!(!summary.summarized);
        assert!(summary.text.starts_with(UNSUMMARIZED_NOTE));
        assert!(summary.text.ends_with("\nÉboul"));
    }

    #[tokio::test]
    async fn test_empty_summary_is_failure() {
        let summarizer = Summarizer::new(Arc::new(MockBackend::with_text("  ")), "m");
        assert!(matches!(
            summarizer.summarize("data").await,
            Err(AdvisorError::Summarization(_))
        ));
    }

    #[tokio::test]
    async fn test_short_payload_kept_whole() {
        let summarizer = Summarizer::new(Arc::new(MockBackend::new(vec![])), "m");
        let summary = summarizer.summarize_or_raw("short").await;
        assert_eq!(summary.text, format!("{UNSUMMARIZED_NOTE}\nshort"));
    }
}
