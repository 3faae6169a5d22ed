// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for LLM backends (cloud APIs, CLI bridge, local server).

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderReply, ProviderRequest, ProviderResponse, ProviderStream};

/// Capability interface over a single LLM backend.
///
/// Implementations map [`TallyError::ProviderTransient`] and
/// [`TallyError::ProviderPermanent`] faithfully so the fallback controller
/// can decide whether another candidate is worth trying.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Whether the backend can return structured tool calls.
    fn supports_tools(&self) -> bool;

    /// Sends a request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TallyError>;

    /// Sends a request and returns a stream of response chunks.
    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TallyError>;

    /// Sends a request, streaming or not according to `request.stream`.
    async fn chat(&self, request: ProviderRequest) -> Result<ProviderReply, TallyError> {
        if request.stream {
            self.stream(request).await.map(ProviderReply::Stream)
        } else {
            self.complete(request).await.map(ProviderReply::Complete)
        }
    }
}
