// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI Chat Completions provider adapter.
//!
//! Streams with `stream_options.include_usage` so the final chunk carries
//! token counts. Tool call fragments are assembled by index and emitted once
//! the choice finishes.

pub mod client;
pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, StreamExt};
use tally_config::model::OpenAiConfig;
use tally_core::{
    AdapterType, HealthStatus, Message, PluginAdapter, ProviderAdapter, ProviderRequest,
    ProviderResponse, ProviderStream, ProviderStreamChunk, Role, TallyError, TokenUsage, ToolCall,
    TransientKind,
};
use tracing::{debug, info, warn};

use crate::client::{OpenAiClient, PROVIDER};
use crate::types::{
    ChatMessage, ChatRequest, ChatTool, ChatToolCall, FunctionCall, FunctionDef, StreamChunk,
    StreamOptions, Usage,
};

pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    /// API key resolution order: config, then `OPENAI_API_KEY`.
    pub fn new(config: &OpenAiConfig) -> Result<Self, TallyError> {
        let api_key = match config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => std::env::var("OPENAI_API_KEY").map_err(|_| {
                TallyError::Config(
                    "OpenAI API key not found. Set openai.api_key in config or the \
                     OPENAI_API_KEY environment variable."
                        .into(),
                )
            })?,
        };
        let client = OpenAiClient::new(&api_key, &config.base_url)?;
        info!(base_url = %config.base_url, "OpenAI provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }
}

fn chat_message(role: &'static str, content: Option<String>) -> ChatMessage {
    ChatMessage {
        role,
        content,
        tool_calls: Vec::new(),
        tool_call_id: None,
    }
}

fn to_chat_request(request: &ProviderRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system_prompt {
        messages.push(chat_message("system", Some(system.clone())));
    }
    for message in &request.messages {
        messages.push(match message.role {
            Role::System => chat_message("system", Some(message.content.clone())),
            Role::User => chat_message("user", Some(message.content.clone())),
            Role::Assistant => to_assistant(message),
            Role::Tool => ChatMessage {
                tool_call_id: message.tool_result.as_ref().map(|r| r.call_id.clone()),
                ..chat_message("tool", Some(message.content.clone()))
            },
        });
    }

    let tools = request
        .tools
        .iter()
        .map(|t| ChatTool {
            kind: "function",
            function: FunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            },
        })
        .collect();

    ChatRequest {
        model: request.model.clone(),
        messages,
        max_tokens: request.max_tokens,
        stream: request.stream,
        stream_options: request.stream.then_some(StreamOptions {
            include_usage: true,
        }),
        tools,
    }
}

fn to_assistant(message: &Message) -> ChatMessage {
    let content = (!message.content.is_empty()).then(|| message.content.clone());
    ChatMessage {
        tool_calls: message
            .tool_calls
            .iter()
            .map(|c| ChatToolCall {
                id: c.id.clone(),
                kind: "function".into(),
                function: FunctionCall {
                    name: c.name.clone(),
                    arguments: c.arguments.to_string(),
                },
            })
            .collect(),
        ..chat_message("assistant", content)
    }
}

fn usage(u: Usage) -> TokenUsage {
    TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    }
}

fn parse_arguments(name: &str, raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(tool = name, error = %e, "failed to parse tool call arguments");
        serde_json::json!({ "_raw": raw })
    })
}

/// Streaming state: tool call fragments by index.
#[derive(Default)]
struct StreamState {
    started: bool,
    finished: bool,
    calls: BTreeMap<usize, (String, String, String)>,
}

type ChunkResult = Result<ProviderStreamChunk, TallyError>;

impl StreamState {
    fn flush_calls(&mut self, out: &mut Vec<ChunkResult>) {
        for (_, (id, name, args)) in std::mem::take(&mut self.calls) {
            let arguments = parse_arguments(&name, &args);
            out.push(Ok(ProviderStreamChunk::tool_call(ToolCall {
                id,
                name,
                arguments,
            })));
        }
    }

    fn handle(&mut self, data: &str) -> Vec<ChunkResult> {
        let mut out = Vec::new();
        if !self.started {
            self.started = true;
            out.push(Ok(ProviderStreamChunk::start(None)));
        }
        if data.trim() == "[DONE]" {
            self.flush_calls(&mut out);
            if !self.finished {
                self.finished = true;
                out.push(Ok(ProviderStreamChunk::stop()));
            }
            return out;
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                out.push(Err(TallyError::ProviderPermanent {
                    provider: PROVIDER.into(),
                    message: format!("failed to parse stream chunk: {e}"),
                }));
                return out;
            }
        };

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(Ok(ProviderStreamChunk::text(text)));
            }
            for fragment in choice.delta.tool_calls {
                let entry = self.calls.entry(fragment.index).or_default();
                if let Some(id) = fragment.id {
                    entry.0 = id;
                }
                if let Some(function) = fragment.function {
                    if let Some(name) = function.name {
                        entry.1.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        entry.2.push_str(&args);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.flush_calls(&mut out);
                out.push(Ok(ProviderStreamChunk::delta(Some(reason), None)));
            }
        }
        if let Some(u) = chunk.usage {
            out.push(Ok(ProviderStreamChunk::delta(None, Some(usage(u)))));
        }
        out
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER
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
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TallyError> {
        let mut chat = to_chat_request(&request);
        chat.stream = false;
        chat.stream_options = None;
        let response = self.client.complete(&chat).await?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(TallyError::ProviderTransient {
                provider: PROVIDER.into(),
                kind: TransientKind::ServerError,
                message: "response contained no choices".into(),
            });
        };
        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                arguments: parse_arguments(&c.function.name, &c.function.arguments),
                id: c.id,
                name: c.function.name,
            })
            .collect();

        Ok(ProviderResponse {
            id: response.id,
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: response.model,
            stop_reason: choice.finish_reason,
            usage: response.usage.map(usage).unwrap_or_default(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TallyError> {
        let mut chat = to_chat_request(&request);
        chat.stream = true;
        chat.stream_options = Some(StreamOptions {
            include_usage: true,
        });
        let response = self.client.stream(&chat).await?;

        let mut state = StreamState::default();
        let chunks = response
            .bytes_stream()
            .eventsource()
            .map(move |event| {
                let items = match event {
                    Ok(event) => state.handle(&event.data),
                    Err(e) => vec![Err(TallyError::ProviderTransient {
                        provider: PROVIDER.into(),
                        kind: TransientKind::Network,
                        message: format!("SSE stream error: {e}"),
                    })],
                };
                stream::iter(items)
            })
            .flatten();
        Ok(Box::pin(chunks))
    }
}
