// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama native provider adapter.
//!
//! Talks to `/api/chat` directly. Streaming responses are NDJSON; tool calls
//! arrive whole (Ollama assigns no ids, so one is generated per call). Tool
//! support depends on the model family and can be overridden in config.

pub mod client;
pub mod ndjson;
pub mod types;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tally_config::model::OllamaConfig;
use tally_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderRequest, ProviderResponse,
    ProviderStream, ProviderStreamChunk, Role, TallyError, TokenUsage, ToolCall, TransientKind,
};
use tracing::{debug, info};

use crate::client::{OllamaClient, PROVIDER};
use crate::types::{
    ChatOptions, ChatRequest, ChatResponse, OllamaFunctionCall, OllamaFunctionDef, OllamaMessage,
    OllamaTool, OllamaToolCall,
};

pub struct OllamaProvider {
    client: OllamaClient,
    supports_tools: bool,
    models: Vec<String>,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, TallyError> {
        let client = OllamaClient::new(&config.host)?;
        let supports_tools = config.tools_enabled();
        info!(host = %config.host, supports_tools, "Ollama provider initialized");
        Ok(Self {
            client,
            supports_tools,
            models: config.models.all().iter().map(|m| m.to_string()).collect(),
        })
    }

    pub fn with_client(client: OllamaClient, supports_tools: bool, models: Vec<String>) -> Self {
        Self {
            client,
            supports_tools,
            models,
        }
    }
}

fn to_chat_request(request: &ProviderRequest, stream: bool) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system_prompt {
        messages.push(OllamaMessage {
            role: "system".into(),
            content: system.clone(),
            tool_calls: vec![],
        });
    }
    for message in &request.messages {
        messages.push(OllamaMessage {
            role: message.role.to_string(),
            content: message.content.clone(),
            tool_calls: if message.role == Role::Assistant {
                message
                    .tool_calls
                    .iter()
                    .map(|c| OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: c.name.clone(),
                            arguments: c.arguments.clone(),
                        },
                    })
                    .collect()
            } else {
                vec![]
            },
        });
    }

    ChatRequest {
        model: request.model.clone(),
        messages,
        stream,
        tools: request
            .tools
            .iter()
            .map(|t| OllamaTool {
                kind: "function",
                function: OllamaFunctionDef {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect(),
        options: ChatOptions {
            num_predict: request.max_tokens,
        },
    }
}

fn to_tool_calls(message: Option<&OllamaMessage>) -> Vec<ToolCall> {
    message
        .map(|m| {
            m.tool_calls
                .iter()
                .map(|c| ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: c.function.name.clone(),
                    arguments: if c.function.arguments.is_null() {
                        serde_json::json!({})
                    } else {
                        c.function.arguments.clone()
                    },
                })
                .collect()
        })
        .unwrap_or_default()
}

fn usage(response: &ChatResponse) -> TokenUsage {
    TokenUsage {
        input_tokens: response.prompt_eval_count.unwrap_or(0),
        output_tokens: response.eval_count.unwrap_or(0),
    }
}

fn stream_error(message: String) -> TallyError {
    TallyError::ProviderTransient {
        provider: PROVIDER.into(),
        kind: TransientKind::ServerError,
        message,
    }
}

/// Maps one NDJSON line to zero or more chunks.
fn line_to_chunks(line: &str) -> Vec<Result<ProviderStreamChunk, TallyError>> {
    let response: ChatResponse = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return vec![Err(TallyError::ProviderPermanent {
                provider: PROVIDER.into(),
                message: format!("failed to parse stream line: {e}"),
            })];
        }
    };
    if let Some(error) = response.error {
        return vec![Err(stream_error(error))];
    }

    let mut out = Vec::new();
    if let Some(text) = response.message.as_ref().map(|m| m.content.as_str()) {
        if !text.is_empty() {
            out.push(Ok(ProviderStreamChunk::text(text)));
        }
    }
    out.extend(
        to_tool_calls(response.message.as_ref())
            .into_iter()
            .map(|c| Ok(ProviderStreamChunk::tool_call(c))),
    );
    if response.done {
        out.push(Ok(ProviderStreamChunk::delta(
            response.done_reason.clone(),
            Some(usage(&response)),
        )));
        out.push(Ok(ProviderStreamChunk::stop()));
    }
    out
}

#[async_trait]
impl PluginAdapter for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    /// Unhealthy when the server is unreachable; degraded when a configured
    /// model has not been pulled.
    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let available = match self.client.tags().await {
            Ok(tags) => tags,
            Err(e) => return Ok(HealthStatus::Unhealthy(e.to_string())),
        };
        let missing: Vec<&str> = self
            .models
            .iter()
            .filter(|m| !available.iter().any(|a| a == *m))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(format!(
                "models not pulled on {}: {}",
                self.client.host(),
                missing.join(", ")
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        debug!("Ollama provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TallyError> {
        let chat = to_chat_request(&request, false);
        let response = self.client.chat(&chat).await?;
        let body: ChatResponse = response.json().await.map_err(client::transport_error)?;
        if let Some(error) = body.error.clone() {
            return Err(stream_error(error));
        }
        Ok(ProviderResponse {
            id: format!("ollama-{}", uuid::Uuid::new_v4().simple()),
            content: body
                .message
                .as_ref()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            tool_calls: to_tool_calls(body.message.as_ref()),
            model: body.model.clone(),
            stop_reason: body.done_reason.clone(),
            usage: usage(&body),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TallyError> {
        let chat = to_chat_request(&request, true);
        let response = self.client.chat(&chat).await?;
        let chunks = stream::once(async { Ok(ProviderStreamChunk::start(None)) }).chain(
            ndjson::lines(response)
                .map(|line| match line {
                    Ok(line) => stream::iter(line_to_chunks(&line)),
                    Err(e) => stream::iter(vec![Err(e)]),
                })
                .flatten(),
        );
        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Message, StreamEventType, ToolDefinition};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OllamaProvider {
        OllamaProvider::with_client(
            OllamaClient::new(&server.uri()).unwrap(),
            true,
            vec!["qwen2.5:14b".into()],
        )
    }

    fn request(stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: "qwen2.5:14b".into(),
            system_prompt: Some("Be brief.".into()),
            messages: vec![Message::user("balances?")],
            tools: vec![ToolDefinition {
                name: "get_bank_balances".into(),
                description: "Balances".into(),
                input_schema: serde_json::json!({"type": "object"}),
            }],
            max_tokens: 128,
            stream,
        }
    }

    #[tokio::test]
    async fn complete_generates_ids_for_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen2.5:14b",
                "stream": false,
                "options": {"num_predict": 128}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "qwen2.5:14b",
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{"function": {"name": "get_bank_balances", "arguments": {}}}]
                },
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 61,
                "eval_count": 18
            })))
            .mount(&server)
            .await;

        let resp = provider(&server).complete(request(false)).await.unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert!(resp.tool_calls[0].id.starts_with("call_"));
        assert_eq!(resp.usage, TokenUsage { input_tokens: 61, output_tokens: 18 });
    }

    #[tokio::test]
    async fn stream_parses_ndjson_lines() {
        let body = concat!(
            "{\"model\":\"qwen2.5:14b\",\"message\":{\"role\":\"assistant\",\"content\":\"You have \"},\"done\":false}\n",
            "{\"model\":\"qwen2.5:14b\",\"message\":{\"role\":\"assistant\",\"content\":\"$2,450.75\"},\"done\":false}\n",
            "{\"model\":\"qwen2.5:14b\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":40,\"eval_count\":7}",
        );
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let chunks: Vec<ProviderStreamChunk> = provider(&server)
            .stream(request(true))
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await;
        let text: String = chunks.iter().filter_map(|c| c.text.clone()).collect();
        assert_eq!(text, "You have $2,450.75");
        assert_eq!(chunks[0].event_type, StreamEventType::MessageStart);
        assert_eq!(chunks.last().unwrap().event_type, StreamEventType::MessageStop);
        let delta = &chunks[chunks.len() - 2];
        assert_eq!(delta.usage.unwrap().output_tokens, 7);
    }

    #[tokio::test]
    async fn missing_model_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model 'qwen2.5:14b' not found"})),
            )
            .mount(&server)
            .await;
        let err = provider(&server).complete(request(false)).await.unwrap_err();
        assert_eq!(err.code(), "provider_permanent");
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn health_reports_missing_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3.2:3b"}]
            })))
            .mount(&server)
            .await;
        match provider(&server).health_check().await.unwrap() {
            HealthStatus::Degraded(msg) => assert!(msg.contains("qwen2.5:14b")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_unhealthy() {
        let p = OllamaProvider::with_client(OllamaClient::new("http://127.0.0.1:9").unwrap(), true, vec![]);
        assert!(matches!(p.health_check().await.unwrap(), HealthStatus::Unhealthy(_)));
    }

    #[test]
    fn assistant_tool_calls_are_forwarded_as_objects() {
        let call = ToolCall {
            id: "call_x".into(),
            name: "get_budget_status".into(),
            arguments: serde_json::json!({"month": "2026-02"}),
        };
        let mut req = request(false);
        req.messages.push(Message::assistant_with_tools("", vec![call]));
        let chat = to_chat_request(&req, false);
        assert_eq!(chat.messages[0].role, "system");
        assert_eq!(chat.messages[2].tool_calls[0].function.arguments["month"], "2026-02");
    }
}
