// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter that shells out to the `claude` command-line client.
//!
//! The CLI is authenticated by the user's subscription, so calls are free.
//! It has no multi-turn input: the whole history is flattened into one
//! prompt. It reports no token counts, so usage is estimated at four
//! characters per token.

use std::process::Stdio;

use async_trait::async_trait;
use futures::SinkExt;
use futures::channel::mpsc;
use serde::Deserialize;
use tally_config::model::ClaudeCliConfig;
use tally_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderRequest, ProviderResponse,
    ProviderStream, ProviderStreamChunk, Role, TallyError, TokenUsage, TransientKind,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const PROVIDER: &str = "claude_cli";

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;

pub struct ClaudeCliProvider {
    binary: String,
    supports_tools: bool,
}

/// `--output-format json` result envelope.
#[derive(Debug, Deserialize)]
struct CliResult {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
}

impl ClaudeCliProvider {
    pub fn new(config: &ClaudeCliConfig) -> Self {
        info!(binary = %config.binary, "Claude CLI provider initialized");
        Self {
            binary: config.binary.clone(),
            supports_tools: config.supports_tools,
        }
    }

    fn command(&self, model: &str, format: &str, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["--print", "--model", model, "--output-format", format, "-p", prompt])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Flattens system prompt and history into a single labelled transcript.
pub fn flatten_prompt(request: &ProviderRequest) -> String {
    let mut parts = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system_prompt {
        parts.push(format!("System: {system}\n"));
    }
    for message in &request.messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool Result",
        };
        parts.push(format!("{label}: {}", message.content));
    }
    parts.join("\n\n")
}

fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count() / CHARS_PER_TOKEN).unwrap_or(u32::MAX)
}

fn spawn_error(binary: &str, e: std::io::Error) -> TallyError {
    if e.kind() == std::io::ErrorKind::NotFound {
        TallyError::ProviderPermanent {
            provider: PROVIDER.into(),
            message: format!("`{binary}` not found on PATH"),
        }
    } else {
        TallyError::ProviderTransient {
            provider: PROVIDER.into(),
            kind: TransientKind::Network,
            message: format!("failed to run `{binary}`: {e}"),
        }
    }
}

/// Non-zero exits are transient unless the CLI reports an auth problem.
fn exit_error(code: Option<i32>, stderr: &str) -> TallyError {
    let lower = stderr.to_lowercase();
    let message = format!("exit status {code:?}: {}", stderr.trim());
    if lower.contains("login") || lower.contains("auth") {
        TallyError::ProviderPermanent {
            provider: PROVIDER.into(),
            message,
        }
    } else if lower.contains("rate limit") || lower.contains("usage limit") {
        TallyError::ProviderTransient {
            provider: PROVIDER.into(),
            kind: TransientKind::RateLimited,
            message,
        }
    } else {
        TallyError::ProviderTransient {
            provider: PROVIDER.into(),
            kind: TransientKind::ServerError,
            message,
        }
    }
}

#[async_trait]
impl PluginAdapter for ClaudeCliProvider {
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
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await;
        Ok(match output {
            Ok(out) if out.status.success() => HealthStatus::Healthy,
            Ok(out) => HealthStatus::Unhealthy(format!("`{} --version` exited with {}", self.binary, out.status)),
            Err(e) => HealthStatus::Unhealthy(spawn_error(&self.binary, e).to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for ClaudeCliProvider {
    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, TallyError> {
        let prompt = flatten_prompt(&request);
        debug!(model = %request.model, prompt_chars = prompt.len(), "invoking claude CLI");
        let output = self
            .command(&request.model, "json", &prompt)
            .output()
            .await
            .map_err(|e| spawn_error(&self.binary, e))?;

        if !output.status.success() {
            return Err(exit_error(
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let content = match serde_json::from_str::<CliResult>(&stdout) {
            Ok(CliResult { is_error: true, result }) => {
                return Err(TallyError::ProviderTransient {
                    provider: PROVIDER.into(),
                    kind: TransientKind::ServerError,
                    message: result.unwrap_or_else(|| "CLI reported an error".into()),
                });
            }
            Ok(CliResult { result, .. }) => result.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "CLI output was not JSON, using raw text");
                stdout.trim().to_string()
            }
        };

        Ok(ProviderResponse {
            id: format!("cli-{}", uuid::Uuid::new_v4().simple()),
            usage: TokenUsage {
                input_tokens: estimate_tokens(&prompt),
                output_tokens: estimate_tokens(&content),
            },
            content,
            tool_calls: Vec::new(),
            model: request.model,
            stop_reason: Some("end_turn".into()),
        })
    }

    /// Streams stdout line by line from a text-format run.
    async fn stream(&self, request: ProviderRequest) -> Result<ProviderStream, TallyError> {
        let prompt = flatten_prompt(&request);
        let mut child = self
            .command(&request.model, "text", &prompt)
            .spawn()
            .map_err(|e| spawn_error(&self.binary, e))?;
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => return Err(TallyError::Internal("CLI pipes were not captured".into())),
        };

        // Drained concurrently so a chatty stderr cannot block the child.
        let stderr_task = tokio::spawn(async move {
            let mut stderr = stderr;
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let (mut tx, rx) = mpsc::channel::<Result<ProviderStreamChunk, TallyError>>(32);
        let input_tokens = estimate_tokens(&prompt);
        tokio::spawn(async move {
            let _ = tx
                .send(Ok(ProviderStreamChunk::start(Some(TokenUsage {
                    input_tokens,
                    output_tokens: 0,
                }))))
                .await;

            let mut lines = BufReader::new(stdout).lines();
            let mut emitted = String::new();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let text = format!("{line}\n");
                        emitted.push_str(&text);
                        if tx.send(Ok(ProviderStreamChunk::text(text))).await.is_err() {
                            // Receiver dropped: the child is killed when dropped.
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx
                            .send(Err(TallyError::ProviderTransient {
                                provider: PROVIDER.into(),
                                kind: TransientKind::Network,
                                message: format!("reading CLI output failed: {e}"),
                            }))
                            .await;
                        return;
                    }
                }
            }

            let err_text = stderr_task.await.unwrap_or_default();
            let final_chunks = match child.wait().await {
                Ok(status) if status.success() => vec![
                    Ok(ProviderStreamChunk::delta(
                        Some("end_turn".into()),
                        Some(TokenUsage {
                            input_tokens,
                            output_tokens: estimate_tokens(&emitted),
                        }),
                    )),
                    Ok(ProviderStreamChunk::stop()),
                ],
                Ok(status) => vec![Err(exit_error(status.code(), &err_text))],
                Err(e) => vec![Err(TallyError::ProviderTransient {
                    provider: PROVIDER.into(),
                    kind: TransientKind::Network,
                    message: format!("waiting for CLI failed: {e}"),
                })],
            };
            for chunk in final_chunks {
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(rx))
    }
}
