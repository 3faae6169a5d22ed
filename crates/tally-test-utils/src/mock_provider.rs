// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with a scripted queue of
//! replies: plain text, tool calls, transient or permanent failures,
//! mid-stream failures, and delays. Every request it receives is recorded.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Mutex;

use tally_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderRequest, ProviderResponse,
    ProviderStream, ProviderStreamChunk, TallyError, TokenUsage, ToolCall, TransientKind,
};

/// Token usage reported for every scripted reply.
pub const MOCK_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
};

/// One scripted provider reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A final answer.
    Text(String),
    /// Optional preamble text plus tool calls.
    ToolCalls { text: String, calls: Vec<ToolCall> },
    /// Fail before any output with a transient error.
    Transient(TransientKind),
    /// Fail before any output with a permanent error.
    Permanent(String),
    /// Stream the given text, then drop the connection.
    FailAfter(String),
    /// Wait, then behave like the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A reply requesting a single tool call.
    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        Self::ToolCalls {
            text: String::new(),
            calls: vec![mock_call(name, arguments)],
        }
    }

    /// A reply requesting several tool calls in order.
    pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        Self::ToolCalls {
            text: String::new(),
            calls: calls
                .into_iter()
                .map(|(name, arguments)| mock_call(name, arguments))
                .collect(),
        }
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

fn mock_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: format!("toolu_{}", uuid::Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments,
    }
}

/// A mock LLM provider that returns scripted replies.
///
/// Replies are popped from a FIFO queue. When the queue is empty the
/// repeat reply is used if set, otherwise the text "mock response".
pub struct MockProvider {
    name: String,
    supports_tools: bool,
    script: Mutex<VecDeque<MockReply>>,
    repeat: Option<MockReply>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockProvider {
    /// Create a tool-capable mock registered under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supports_tools: true,
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tools(mut self, supports_tools: bool) -> Self {
        self.supports_tools = supports_tools;
        self
    }

    /// Queue a reply.
    pub fn then(mut self, reply: MockReply) -> Self {
        self.script.get_mut().push_back(reply);
        self
    }

    /// Reply used whenever the queue is empty.
    pub fn repeat(mut self, reply: MockReply) -> Self {
        self.repeat = Some(reply);
        self
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }

    /// Number of requests received so far.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next_reply(&self, request: &ProviderRequest) -> MockReply {
        self.requests.lock().await.push(request.clone());
        let mut reply = self
            .script
            .lock()
            .await
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| MockReply::text("mock response"));
        while let MockReply::Delayed(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }
        reply
    }

    fn transient(&self, kind: TransientKind, message: &str) -> TallyError {
        TallyError::ProviderTransient {
            provider: self.name.clone(),
            kind,
            message: message.to_string(),
        }
    }

    fn permanent(&self, message: String) -> TallyError {
        TallyError::ProviderPermanent {
            provider: self.name.clone(),
            message,
        }
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TallyError> {
        let base = ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            model: request.model.clone(),
            usage: MOCK_USAGE,
            ..Default::default()
        };
        match self.next_reply(&request).await {
            MockReply::Text(text) => Ok(ProviderResponse {
                content: text,
                stop_reason: Some("end_turn".into()),
                ..base
            }),
            MockReply::ToolCalls { text, calls } => Ok(ProviderResponse {
                content: text,
                tool_calls: calls,
                stop_reason: Some("tool_use".into()),
                ..base
            }),
            MockReply::Transient(kind) => Err(self.transient(kind, "scripted failure")),
            MockReply::Permanent(message) => Err(self.permanent(message)),
            MockReply::FailAfter(_) => Err(self.transient(TransientKind::Network, "connection reset")),
            MockReply::Delayed(..) => Err(TallyError::Internal("unresolved mock delay".into())),
        }
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TallyError> {
        let mut chunks: Vec<Result<ProviderStreamChunk, TallyError>> = vec![Ok(
            ProviderStreamChunk::start(Some(TokenUsage {
                input_tokens: MOCK_USAGE.input_tokens,
                output_tokens: 0,
            })),
        )];

        let stop_reason = match self.next_reply(&request).await {
            MockReply::Text(text) => {
                chunks.extend(text.split_inclusive(' ').map(|w| Ok(ProviderStreamChunk::text(w))));
                "end_turn"
            }
            MockReply::ToolCalls { text, calls } => {
                if !text.is_empty() {
                    chunks.push(Ok(ProviderStreamChunk::text(text)));
                }
                chunks.extend(calls.into_iter().map(|c| Ok(ProviderStreamChunk::tool_call(c))));
                "tool_use"
            }
            MockReply::Transient(kind) => return Err(self.transient(kind, "scripted failure")),
            MockReply::Permanent(message) => return Err(self.permanent(message)),
            MockReply::FailAfter(partial) => {
                chunks.push(Ok(ProviderStreamChunk::text(partial)));
                chunks.push(Err(self.transient(TransientKind::Network, "connection reset")));
                return Ok(Box::pin(stream::iter(chunks)));
            }
            MockReply::Delayed(..) => {
                return Err(TallyError::Internal("unresolved mock delay".into()));
            }
        };

        chunks.push(Ok(ProviderStreamChunk::delta(
            Some(stop_reason.to_string()),
            Some(MOCK_USAGE),
        )));
        chunks.push(Ok(ProviderStreamChunk::stop()));
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tally_core::{Message, StreamEventType};

    fn request(stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: "test-model".into(),
            system_prompt: None,
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 100,
            stream,
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new("mock");
        let resp = provider.complete(request(false)).await.unwrap();
        assert_eq!(resp.content, "mock response");
        assert_eq!(resp.usage, MOCK_USAGE);
    }

    #[tokio::test]
    async fn queued_replies_then_repeat() {
        let provider = MockProvider::new("mock")
            .then(MockReply::text("first"))
            .repeat(MockReply::Permanent("nope".into()));
        assert_eq!(provider.complete(request(false)).await.unwrap().content, "first");
        let err = provider.complete(request(false)).await.unwrap_err();
        assert_eq!(err.code(), "provider_permanent");
        assert!(provider.complete(request(false)).await.is_err());
        assert_eq!(provider.call_count().await, 3);
    }

    #[tokio::test]
    async fn stream_emits_realistic_sequence() {
        let provider = MockProvider::new("mock").then(MockReply::text("hello there"));
        let chunks: Vec<_> = provider
            .stream(request(true))
            .await
            .unwrap()
            .map(|c| c.unwrap().event_type)
            .collect()
            .await;
        assert_eq!(
            chunks,
            [
                StreamEventType::MessageStart,
                StreamEventType::TextDelta,
                StreamEventType::TextDelta,
                StreamEventType::MessageDelta,
                StreamEventType::MessageStop,
            ]
        );
    }

    #[tokio::test]
    async fn fail_after_streams_then_errors() {
        let provider = MockProvider::new("mock").then(MockReply::FailAfter("partial".into()));
        let items: Vec<_> = provider.stream(request(true)).await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[2].as_ref().is_err_and(|e| e.is_network_blip()));
    }

    #[tokio::test]
    async fn tool_call_reply_carries_calls() {
        let provider = MockProvider::new("mock")
            .then(MockReply::tool_call("get_bank_balances", serde_json::json!({})));
        let resp = provider.complete(request(false)).await.unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "get_bank_balances");
        assert_eq!(resp.stop_reason.as_deref(), Some("tool_use"));
    }
}
