//! Shared HTTP plumbing for the upstream adapters.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// User agent sent with every upstream request.
pub const USER_AGENT: &str = concat!("alpine/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout for upstream services.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in a [`FetchError::Status`].
const MAX_ERROR_BODY: usize = 300;

/// Build a client with the alpine user agent and a bounded timeout.
pub fn build_client(service: &'static str, timeout: Duration) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Transport {
            service,
            reason: format!("failed to create HTTP client: {e}"),
        })
}

/// Join `base` and `path` with exactly one slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Send a request and return the body text of a successful response.
pub async fn get_text(service: &'static str, request: RequestBuilder) -> Result<String, FetchError> {
    let response = send(service, request).await?;
    response
        .text()
        .await
        .map_err(|e| FetchError::from_reqwest(service, e))
}

/// Send a request and decode a successful JSON response.
pub async fn get_json<T: DeserializeOwned>(
    service: &'static str,
    request: RequestBuilder,
) -> Result<T, FetchError> {
    let body = get_text(service, request).await?;
    serde_json::from_str(&body).map_err(|e| FetchError::decode(service, e))
}

async fn send(service: &'static str, request: RequestBuilder) -> Result<Response, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(service, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(service, status = status.as_u16(), "Upstream request failed");
        return Err(FetchError::Status {
            service,
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY).to_string(),
        });
    }
    Ok(response)
}

/// The longest prefix of `s` holding at most `max` chars.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(endpoint("https://x.fr/api/", "/topos"), "https://x.fr/api/topos");
        assert_eq!(endpoint("https://x.fr/api", "topos"), "https://x.fr/api/topos");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("Écrins", 2), "Éc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[tokio::test]
    async fn test_status_error_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such topo"))
            .mount(&server)
            .await;

        let client = build_client("catalog", DEFAULT_TIMEOUT).unwrap();
        let err = get_json::<serde_json::Value>(
            "catalog",
            client.get(endpoint(&server.uri(), "missing")),
        )
        .await
        .unwrap_err();

        match err {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such topo");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = build_client("forecast", Duration::from_millis(50)).unwrap();
        let err = get_text("forecast", client.get(server.uri())).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = build_client("catalog", DEFAULT_TIMEOUT).unwrap();
        let err = get_json::<Vec<u32>>("catalog", client.get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
