// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for a local Ollama server.

use std::time::Duration;

use tally_core::{TallyError, TransientKind};
use tracing::debug;

use crate::types::{ChatRequest, TagsResponse};

pub(crate) const PROVIDER: &str = "ollama";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
}

impl OllamaClient {
    /// `host` is the server base URL, e.g. `http://localhost:11434`.
    pub fn new(host: &str) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| TallyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Posts to `/api/chat` and returns the successful response.
    pub async fn chat(&self, request: &ChatRequest) -> Result<reqwest::Response, TallyError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        debug!(status = %status, model = %request.model, stream = request.stream, "ollama response received");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        Err(TallyError::from_status(PROVIDER, status.as_u16(), message))
    }

    /// Lists locally available models via `/api/tags`.
    pub async fn tags(&self) -> Result<Vec<String>, TallyError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TallyError::from_status(PROVIDER, status.as_u16(), "tag listing failed"));
        }
        let tags: TagsResponse = response.json().await.map_err(transport_error)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
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
