// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API provider adapter.
//!
//! Implements [`ProviderAdapter`] with single-shot completion and SSE
//! streaming, including structured `tool_use` blocks.

pub mod client;
pub mod sse;
pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::StreamExt;
use tally_config::model::AnthropicConfig;
use tally_core::{
    AdapterType, HealthStatus, Message, PluginAdapter, ProviderAdapter, ProviderRequest,
    ProviderResponse, ProviderStream, ProviderStreamChunk, Role, TallyError, TokenUsage, ToolCall,
};
use tracing::{debug, info, warn};

use crate::client::AnthropicClient;
use crate::sse::StreamEvent;
use crate::types::{
    ApiContent, ApiContentBlock, ApiMessage, ApiTool, ApiUsage, MessageRequest,
    ResponseContentBlock, SseDelta,
};

/// Anthropic provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config, then `ANTHROPIC_API_KEY`, else error.
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    pub fn new(config: &AnthropicConfig) -> Result<Self, TallyError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = AnthropicClient::new(&api_key, &config.api_version, &config.base_url)?;
        info!(base_url = %config.base_url, "Anthropic provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: AnthropicClient) -> Self {
        Self { client }
    }
}

/// Converts a [`ProviderRequest`] to an Anthropic [`MessageRequest`].
///
/// System-role history entries are folded into the `system` field, and
/// consecutive tool results are grouped into a single user turn.
fn to_message_request(request: &ProviderRequest) -> MessageRequest {
    let mut system: Vec<&str> = request.system_prompt.as_deref().into_iter().collect();
    let mut messages: Vec<ApiMessage> = Vec::new();

    for message in &request.messages {
        match message.role {
            Role::System => system.push(&message.content),
            Role::User => messages.push(ApiMessage {
                role: "user",
                content: ApiContent::Text(message.content.clone()),
            }),
            Role::Assistant => messages.push(assistant_message(message)),
            Role::Tool => {
                let Some(result) = &message.tool_result else {
                    warn!("tool message without a result, skipping");
                    continue;
                };
                let block = ApiContentBlock::ToolResult {
                    tool_use_id: result.call_id.clone(),
                    content: result.content_text(),
                    is_error: result.is_error,
                };
                match messages.last_mut() {
                    Some(ApiMessage {
                        role: "user",
                        content: ApiContent::Blocks(blocks),
                    }) => blocks.push(block),
                    _ => messages.push(ApiMessage {
                        role: "user",
                        content: ApiContent::Blocks(vec![block]),
                    }),
                }
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    let tools = request
        .tools
        .iter()
        .map(|t| ApiTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        })
        .collect();

    MessageRequest {
        model: request.model.clone(),
        messages,
        system,
        max_tokens: request.max_tokens,
        stream: request.stream,
        tools,
    }
}

fn assistant_message(message: &Message) -> ApiMessage {
    if message.tool_calls.is_empty() {
        return ApiMessage {
            role: "assistant",
            content: ApiContent::Text(message.content.clone()),
        };
    }
    let mut blocks = Vec::with_capacity(message.tool_calls.len() + 1);
    if !message.content.is_empty() {
        blocks.push(ApiContentBlock::Text {
            text: message.content.clone(),
        });
    }
    blocks.extend(message.tool_calls.iter().map(|c| ApiContentBlock::ToolUse {
        id: c.id.clone(),
        name: c.name.clone(),
        input: c.arguments.clone(),
    }));
    ApiMessage {
        role: "assistant",
        content: ApiContent::Blocks(blocks),
    }
}

fn usage(u: ApiUsage) -> TokenUsage {
    TokenUsage {
        input_tokens: u.input_tokens,
        output_tokens: u.output_tokens,
    }
}

/// Tool input defaults to an empty object when the model sends none.
fn tool_input(input: serde_json::Value) -> serde_json::Value {
    if input.is_null() {
        serde_json::json!({})
    } else {
        input
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        client::PROVIDER
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        // Health checks never send a request; that would spend tokens.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        debug!("Anthropic provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TallyError> {
        let api_request = to_message_request(&request);
        let response = self.client.complete_message(&api_request).await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseContentBlock::Text { text } => content.push_str(&text),
                ResponseContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: tool_input(input),
                }),
                ResponseContentBlock::Other => {}
            }
        }

        Ok(ProviderResponse {
            id: response.id,
            content,
            tool_calls,
            model: response.model,
            stop_reason: response.stop_reason,
            usage: usage(response.usage),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TallyError> {
        let api_request = to_message_request(&request);
        let events = self.client.stream_message(&api_request).await?;

        let mut state = ToolUseState::default();
        let chunks = events.filter_map(move |result| {
            let chunk = match result {
                Ok(event) => state.map(event),
                Err(e) => Some(Err(e)),
            };
            async move { chunk }
        });
        Ok(Box::pin(chunks))
    }
}

/// Accumulates `tool_use` input JSON across deltas, keyed by block index.
#[derive(Default)]
struct ToolUseState {
    blocks: HashMap<usize, (String, String, String)>,
}

impl ToolUseState {
    fn map(&mut self, event: StreamEvent) -> Option<Result<ProviderStreamChunk, TallyError>> {
        match event {
            StreamEvent::MessageStart(ms) => {
                Some(Ok(ProviderStreamChunk::start(Some(usage(ms.message.usage)))))
            }
            StreamEvent::ContentBlockStart(start) => {
                if let ResponseContentBlock::ToolUse { id, name, .. } = start.content_block {
                    self.blocks.insert(start.index, (id, name, String::new()));
                }
                None
            }
            StreamEvent::ContentBlockDelta(delta) => match delta.delta {
                SseDelta::TextDelta { text } => Some(Ok(ProviderStreamChunk::text(text))),
                SseDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, _, json)) = self.blocks.get_mut(&delta.index) {
                        json.push_str(&partial_json);
                    }
                    None
                }
                SseDelta::Other => None,
            },
            StreamEvent::ContentBlockStop(stop) => {
                let (id, name, json) = self.blocks.remove(&stop.index)?;
                let arguments = if json.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&json).unwrap_or_else(|e| {
                        warn!(error = %e, json = %json, "failed to parse tool_use input JSON");
                        serde_json::json!({ "_raw": json })
                    })
                };
                Some(Ok(ProviderStreamChunk::tool_call(ToolCall {
                    id,
                    name,
                    arguments,
                })))
            }
            StreamEvent::MessageDelta(md) => Some(Ok(ProviderStreamChunk::delta(
                md.delta.stop_reason,
                md.usage.map(usage),
            ))),
            StreamEvent::MessageStop => Some(Ok(ProviderStreamChunk::stop())),
            StreamEvent::Error(err) => Some(Ok(ProviderStreamChunk::error(format!(
                "{}: {}",
                err.error.type_, err.error.message
            )))),
            StreamEvent::Ping => None,
        }
    }
}

/// Resolves the API key from config or environment.
fn resolve_api_key(config_key: Option<&str>) -> Result<String, TallyError> {
    match config_key.filter(|k| !k.is_empty()) {
        Some(key) => Ok(key.to_string()),
        None => std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            TallyError::Config(
                "Anthropic API key not found. Set anthropic.api_key in config or the \
                 ANTHROPIC_API_KEY environment variable."
                    .into(),
            )
        }),
    }
}
