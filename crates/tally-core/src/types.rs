// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by providers, tools, the router, and the orchestrator.

use std::fmt;
use std::ops::AddAssign;
use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::TallyError;

/// Opaque identifier of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`crate::PluginAdapter`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
}

/// Author of a message in a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the matching result.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: serde_json::Value,
}

/// The outcome of one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this result answers.
    pub call_id: String,
    /// Name of the tool that was called.
    pub name: String,
    /// Structured output, or `{"error": ..., "code": ...}` on failure.
    pub output: serde_json::Value,
    /// Whether `output` describes a failure.
    pub is_error: bool,
}

impl ToolResult {
    /// Builds a successful result for `call`.
    pub fn success(call: &ToolCall, output: serde_json::Value) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output,
            is_error: false,
        }
    }

    /// Builds an error result the model can read and correct itself from.
    pub fn failure(call: &ToolCall, error: &TallyError) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: serde_json::json!({
                "error": error.to_string(),
                "code": error.code(),
            }),
            is_error: true,
        }
    }

    /// The output rendered as a compact JSON string for provider payloads.
    pub fn content_text(&self) -> String {
        match &self.output {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Token counts for one provider call or a whole turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
    }
}

/// One entry in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Text content. Empty for assistant messages that only request tools.
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Result carried by a tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
    /// Model that produced an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token accounting for an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_result: None,
            model: None,
            usage: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// An assistant message that requests tool invocations.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// A tool message carrying `result`.
    pub fn tool(result: ToolResult) -> Self {
        Self {
            content: result.content_text(),
            tool_result: Some(result),
            ..Self::with_role(Role::Tool, String::new())
        }
    }

    /// Attaches the producing model and its token usage.
    pub fn with_model(mut self, model: impl Into<String>, usage: TokenUsage) -> Self {
        self.model = Some(model.into());
        self.usage = Some(usage);
        self
    }
}

/// Estimated complexity of a user query, also used as the model tier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// The next tier up, saturating at [`Complexity::Complex`].
    pub fn escalate(self) -> Self {
        match self {
            Self::Simple => Self::Moderate,
            Self::Moderate | Self::Complex => Self::Complex,
        }
    }
}

/// Result of classifying a user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub complexity: Complexity,
    pub needs_tools: bool,
    /// Model tier the router should aim for before applying the cost policy.
    pub suggested_tier: Complexity,
    /// Confidence in the complexity estimate (0.0 - 1.0).
    pub confidence: f32,
    /// Short human-readable explanation.
    pub reason: &'static str,
}

/// A (provider, model) pair eligible for a turn, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCandidate {
    /// Registry name of the provider.
    pub provider: String,
    /// Model id to request from that provider.
    pub model: String,
    /// Model tier the policy mapped the query to.
    pub tier: Complexity,
    /// 0-based priority; lower is tried first.
    pub rank: usize,
    pub supports_tools: bool,
}

/// Tool description sent to providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Backend-specific model identifier.
    pub model: String,
    pub system_prompt: Option<String>,
    /// Full ordered conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Tools the model may call. Empty disables tool use.
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub stream: bool,
}

/// A complete response from an LLM provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Kind of a streaming chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventType {
    /// Stream opened; may carry input token usage.
    MessageStart,
    /// Incremental assistant text.
    TextDelta,
    /// A fully assembled tool call.
    ToolCall,
    /// Stop reason and final usage.
    MessageDelta,
    /// The response is complete.
    MessageStop,
    /// The backend reported an error mid-stream.
    Error,
}

/// A single chunk from a streaming provider response.
#[derive(Debug, Clone)]
pub struct ProviderStreamChunk {
    pub event_type: StreamEventType,
    pub text: Option<String>,
    pub tool_call: Option<ToolCall>,
    pub usage: Option<TokenUsage>,
    pub stop_reason: Option<String>,
    pub error: Option<String>,
}

impl ProviderStreamChunk {
    fn empty(event_type: StreamEventType) -> Self {
        Self {
            event_type,
            text: None,
            tool_call: None,
            usage: None,
            stop_reason: None,
            error: None,
        }
    }

    pub fn start(usage: Option<TokenUsage>) -> Self {
        Self {
            usage,
            ..Self::empty(StreamEventType::MessageStart)
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(StreamEventType::TextDelta)
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Self::empty(StreamEventType::ToolCall)
        }
    }

    pub fn delta(stop_reason: Option<String>, usage: Option<TokenUsage>) -> Self {
        Self {
            stop_reason,
            usage,
            ..Self::empty(StreamEventType::MessageDelta)
        }
    }

    pub fn stop() -> Self {
        Self::empty(StreamEventType::MessageStop)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(StreamEventType::Error)
        }
    }
}

/// Boxed stream of provider chunks.
pub type ProviderStream =
    Pin<Box<dyn Stream<Item = Result<ProviderStreamChunk, TallyError>> + Send>>;

/// What [`crate::ProviderAdapter::chat`] hands back, depending on the stream flag.
pub enum ProviderReply {
    Complete(ProviderResponse),
    Stream(ProviderStream),
}

impl fmt::Debug for ProviderReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Listing entry for a stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: Option<String>,
    pub message_count: u32,
    pub created_at: String,
    pub updated_at: String,
}
