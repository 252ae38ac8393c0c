//! The backend trait every provider implements, plus shared retry logic.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Only retryable errors (network failures, rate limits) are retried. A rate
/// limit that names its own delay waits that long instead of the backoff.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

/// Doubles the backoff, saturating at `Duration::MAX`.
fn next_backoff(backoff: Duration) -> Duration {
    backoff.saturating_mul(2)
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A language-model provider.
///
/// Given a prompt and a declared tool set, a backend returns either tool
/// invocations or a final answer. Everything above this trait treats the
/// model as an opaque capability.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is reachable and properly configured.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

/// Map a non-success provider status and message to an error.
pub(crate) fn status_error(
    status: reqwest::StatusCode,
    message: String,
    retry_after: Option<&str>,
) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Auth(format!("Authentication failed: {}", message)),
        429 => LlmError::rate_limit(message, retry_after),
        500..=599 => LlmError::Backend(format!("Server error ({}): {}", status, message)),
        _ => LlmError::Backend(message),
    }
}
