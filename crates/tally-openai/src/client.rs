// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI Chat Completions API.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tally_core::{TallyError, TransientKind};
use tracing::debug;

use crate::types::{ApiErrorResponse, ChatRequest, ChatResponse};

pub(crate) const PROVIDER: &str = "openai";

/// One HTTP request per call; the fallback controller owns retries.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, TallyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| TallyError::Config(format!("invalid API key header value: {e}")))?,
        );

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

    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, TallyError> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(transport_error)?;
        serde_json::from_str(&body).map_err(|e| TallyError::ProviderPermanent {
            provider: PROVIDER.into(),
            message: format!("failed to parse API response: {e}"),
        })
    }

    /// Posts a streaming request and returns the raw SSE response.
    pub async fn stream(&self, request: &ChatRequest) -> Result<reqwest::Response, TallyError> {
        self.send(request).await
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, TallyError> {
        let response = self
            .client
            .post(&self.base_url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, model = %request.model, stream = request.stream, "openai response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(TallyError::from_status(PROVIDER, status.as_u16(), message))
    }
}

pub(crate) fn transport_error(e: reqwest::Error) -> TallyError {
    TallyError::ProviderTransient {
        provider: PROVIDER.into(),
        kind: if e.is_timeout() {
            TransientKind::Timeout
        } else {
            TransientKind::Network
        },
        message: e.to_string(),
    }
}
