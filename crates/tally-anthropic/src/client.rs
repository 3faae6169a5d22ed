// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! The client makes exactly one HTTP request per call. Retries and fallback
//! belong to the caller, so every failure is classified as transient or
//! permanent here and returned immediately.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use tally_core::{TallyError, TransientKind};
use tracing::debug;

use crate::sse::{self, EventStream};
use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

pub(crate) const PROVIDER: &str = "anthropic";

/// HTTP client for Anthropic API communication.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a client that authenticates with `api_key` and posts to `base_url`.
    pub fn new(api_key: &str, api_version: &str, base_url: &str) -> Result<Self, TallyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| TallyError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(api_version).map_err(|e| {
                TallyError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| TallyError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Sends a streaming request and returns the parsed SSE events.
    pub async fn stream_message(&self, request: &MessageRequest) -> Result<EventStream, TallyError> {
        let mut req = request.clone();
        req.stream = true;
        let response = self.send(&req).await?;
        Ok(sse::parse_sse_stream(response))
    }

    /// Sends a non-streaming request and returns the full response.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, TallyError> {
        let mut req = request.clone();
        req.stream = false;
        let response = self.send(&req).await?;
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| TallyError::ProviderPermanent {
            provider: PROVIDER.into(),
            message: format!("failed to parse API response: {e}"),
        })
    }

    async fn send(&self, request: &MessageRequest) -> Result<reqwest::Response, TallyError> {
        let response = self
            .client
            .post(&self.base_url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, model = %request.model, stream = request.stream, "anthropic response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api_err) => format!("{}: {}", api_err.error.type_, api_err.error.message),
            Err(_) => body,
        };
        Err(TallyError::from_status(PROVIDER, status.as_u16(), message))
    }
}

/// Classifies a reqwest failure that happened before a status was received.
pub(crate) fn transport_error(e: reqwest::Error) -> TallyError {
    let kind = if e.is_timeout() {
        TransientKind::Timeout
    } else {
        TransientKind::Network
    };
    TallyError::ProviderTransient {
        provider: PROVIDER.into(),
        kind,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiContent, ApiMessage};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> AnthropicClient {
        AnthropicClient::new(
            "test-api-key",
            "2023-06-01",
            &format!("{}/v1/messages", server.uri()),
        )
        .unwrap()
    }

    fn test_request() -> MessageRequest {
        MessageRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages: vec![ApiMessage {
                role: "user",
                content: ApiContent::Text("Hello".into()),
            }],
            system: None,
            max_tokens: 1024,
            stream: false,
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn complete_message_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_test",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "text", "text": "Hi there!"}],
                "model": "claude-sonnet-4-20250514",
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 5}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = test_client(&server).complete_message(&test_request()).await.unwrap();
        assert_eq!(result.id, "msg_test");
        assert_eq!(result.usage.input_tokens, 10);
    }

    #[tokio::test]
    async fn rate_limit_is_transient_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"type": "rate_limit_error", "message": "Rate limited"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server)
            .complete_message(&test_request())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("rate_limit_error"), "got: {err}");
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "invalid_request_error", "message": "Bad model"}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server)
            .complete_message(&test_request())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "provider_permanent");
        assert!(err.to_string().contains("invalid_request_error"), "got: {err}");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_blip() {
        let client = AnthropicClient::new("k", "2023-06-01", "http://127.0.0.1:9/v1/messages").unwrap();
        let err = client.complete_message(&test_request()).await.unwrap_err();
        assert!(err.is_network_blip() || err.is_transient(), "got: {err}");
    }
}
