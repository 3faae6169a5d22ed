// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Registry name of the Anthropic Messages API provider.
pub const ANTHROPIC: &str = "anthropic";
/// Registry name of the OpenAI Chat Completions provider.
pub const OPENAI: &str = "openai";
/// Registry name of the local Ollama server provider.
pub const OLLAMA: &str = "ollama";
/// Registry name of the subscription CLI bridge provider.
pub const CLAUDE_CLI: &str = "claude_cli";

/// Every provider name the router knows about.
pub const PROVIDER_NAMES: [&str; 4] = [ANTHROPIC, OPENAI, OLLAMA, CLAUDE_CLI];

/// Ollama model families known to support tool calling.
const OLLAMA_TOOL_FAMILIES: &[&str] = &[
    "qwen2.5",
    "qwen2",
    "qwen3",
    "llama3.1",
    "llama3.2",
    "llama3.3",
    "mistral",
    "mixtral",
    "command-r",
];

/// Whether an Ollama model tag belongs to a tool-capable family.
pub fn ollama_model_supports_tools(model: &str) -> bool {
    let family = model.split(':').next().unwrap_or(model).to_lowercase();
    OLLAMA_TOOL_FAMILIES.iter().any(|f| family.starts_with(f))
}

/// Top-level Tally configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. Constructed once at startup and shared by reference.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Assistant identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// SQLite datastore settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Classification, selection, and turn-loop settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Anthropic Messages API.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// OpenAI Chat Completions API.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Local Ollama server.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Claude subscription CLI bridge.
    #[serde(default)]
    pub claude_cli: ClaudeCliConfig,

    /// HTTP gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Assistant identity and behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Inline system prompt. Overridden by `system_prompt_file` if both set.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Path to a markdown file containing the system prompt.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            system_prompt: None,
            system_prompt_file: None,
        }
    }
}

fn default_agent_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// SQLite datastore configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable write-ahead logging.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("tally").join("tally.db").display().to_string())
        .unwrap_or_else(|| "tally.db".to_string())
}

fn default_true() -> bool {
    true
}

/// Cost/quality policy used by the provider selector.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    /// Prefer free backends and lighter model tiers.
    CostConscious,
    /// Match the model tier to the query complexity.
    #[default]
    Balanced,
    /// Prefer the strongest metered backends and heavier tiers.
    Quality,
}

/// Routing and turn-loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Cost/quality policy.
    #[serde(default)]
    pub cost_mode: CostMode,

    /// Maximum provider invocations per turn before failing the turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// Timeout applied to each individual provider call.
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Explicit provider fallback order. Empty uses the policy's order.
    #[serde(default)]
    pub fallback_order: Vec<String>,

    /// Number of recent user messages the classifier sees.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Max output tokens for simple-tier requests.
    #[serde(default = "default_simple_max_tokens")]
    pub simple_max_tokens: u32,

    /// Max output tokens for moderate-tier requests.
    #[serde(default = "default_moderate_max_tokens")]
    pub moderate_max_tokens: u32,

    /// Max output tokens for complex-tier requests.
    #[serde(default = "default_complex_max_tokens")]
    pub complex_max_tokens: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cost_mode: CostMode::default(),
            max_tool_iterations: default_max_tool_iterations(),
            provider_timeout_secs: default_provider_timeout_secs(),
            fallback_order: Vec::new(),
            history_window: default_history_window(),
            simple_max_tokens: default_simple_max_tokens(),
            moderate_max_tokens: default_moderate_max_tokens(),
            complex_max_tokens: default_complex_max_tokens(),
        }
    }
}

fn default_max_tool_iterations() -> u32 {
    8
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_history_window() -> usize {
    3
}

fn default_simple_max_tokens() -> u32 {
    1024
}

fn default_moderate_max_tokens() -> u32 {
    4096
}

fn default_complex_max_tokens() -> u32 {
    8192
}

/// Model identifiers per complexity tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TierModels {
    pub simple: String,
    pub moderate: String,
    pub complex: String,
}

impl TierModels {
    fn new(simple: &str, moderate: &str, complex: &str) -> Self {
        Self {
            simple: simple.to_string(),
            moderate: moderate.to_string(),
            complex: complex.to_string(),
        }
    }

    /// All three model ids in tier order.
    pub fn all(&self) -> [&str; 3] {
        [&self.simple, &self.moderate, &self.complex]
    }
}

/// Anthropic Messages API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Whether the provider is registered.
    #[serde(default)]
    pub enabled: bool,

    /// API key. `None` falls back to `ANTHROPIC_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API version header value.
    #[serde(default = "default_anthropic_api_version")]
    pub api_version: String,

    /// Messages endpoint.
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model per tier.
    #[serde(default = "default_anthropic_models")]
    pub models: TierModels,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            api_version: default_anthropic_api_version(),
            base_url: default_anthropic_base_url(),
            models: default_anthropic_models(),
        }
    }
}

fn default_anthropic_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_anthropic_models() -> TierModels {
    TierModels::new(
        "claude-3-5-haiku-20241022",
        "claude-sonnet-4-20250514",
        "claude-sonnet-4-20250514",
    )
}

/// OpenAI Chat Completions configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// Whether the provider is registered.
    #[serde(default)]
    pub enabled: bool,

    /// API key. `None` falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat completions endpoint.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model per tier.
    #[serde(default = "default_openai_models")]
    pub models: TierModels,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: default_openai_base_url(),
            models: default_openai_models(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_openai_models() -> TierModels {
    TierModels::new("gpt-4o-mini", "gpt-4o", "gpt-4o")
}

/// Local Ollama server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    /// Whether the provider is registered.
    #[serde(default)]
    pub enabled: bool,

    /// Server base URL.
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model per tier.
    #[serde(default = "default_ollama_models")]
    pub models: TierModels,

    /// Override tool support detection (by model family when unset).
    #[serde(default)]
    pub supports_tools: Option<bool>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_ollama_host(),
            models: default_ollama_models(),
            supports_tools: None,
        }
    }
}

impl OllamaConfig {
    /// Tool support: the explicit override, else every tier model is tool-capable.
    pub fn tools_enabled(&self) -> bool {
        self.supports_tools.unwrap_or_else(|| {
            self.models
                .all()
                .iter()
                .all(|m| ollama_model_supports_tools(m))
        })
    }
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_models() -> TierModels {
    TierModels::new("llama3.2:3b", "qwen2.5:14b", "qwen2.5:14b")
}

/// Claude CLI bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClaudeCliConfig {
    /// Whether the provider is registered.
    #[serde(default)]
    pub enabled: bool,

    /// Executable name or path.
    #[serde(default = "default_claude_binary")]
    pub binary: String,

    /// Model alias per tier.
    #[serde(default = "default_claude_cli_models")]
    pub models: TierModels,

    /// The CLI runs its own tools; it returns no structured calls by default.
    #[serde(default)]
    pub supports_tools: bool,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: default_claude_binary(),
            models: default_claude_cli_models(),
            supports_tools: false,
        }
    }
}

fn default_claude_binary() -> String {
    "claude".to_string()
}

fn default_claude_cli_models() -> TierModels {
    TierModels::new("haiku", "sonnet", "opus")
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Bind address.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    5001
}

/// What the selector needs to know about one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub enabled: bool,
    pub supports_tools: bool,
    pub models: TierModels,
}

impl TallyConfig {
    /// Static profile of every known provider, enabled or not.
    pub fn provider_profiles(&self) -> Vec<ProviderProfile> {
        vec![
            ProviderProfile {
                name: ANTHROPIC,
                enabled: self.anthropic.enabled,
                supports_tools: true,
                models: self.anthropic.models.clone(),
            },
            ProviderProfile {
                name: OPENAI,
                enabled: self.openai.enabled,
                supports_tools: true,
                models: self.openai.models.clone(),
            },
            ProviderProfile {
                name: OLLAMA,
                enabled: self.ollama.enabled,
                supports_tools: self.ollama.tools_enabled(),
                models: self.ollama.models.clone(),
            },
            ProviderProfile {
                name: CLAUDE_CLI,
                enabled: self.claude_cli.enabled,
                supports_tools: self.claude_cli.supports_tools,
                models: self.claude_cli.models.clone(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_tool_families() {
        assert!(ollama_model_supports_tools("qwen2.5:14b"));
        assert!(ollama_model_supports_tools("llama3.2:3b"));
        assert!(!ollama_model_supports_tools("phi3:mini"));
        assert!(!ollama_model_supports_tools("gemma:7b"));
    }

    #[test]
    fn ollama_override_wins() {
        let mut cfg = OllamaConfig::default();
        assert!(cfg.tools_enabled());
        cfg.models.simple = "phi3:mini".into();
        assert!(!cfg.tools_enabled());
        cfg.supports_tools = Some(true);
        assert!(cfg.tools_enabled());
    }

    #[test]
    fn profiles_cover_every_provider() {
        let names: Vec<_> = TallyConfig::default()
            .provider_profiles()
            .iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, PROVIDER_NAMES.to_vec());
    }

    #[test]
    fn cost_mode_names() {
        assert_eq!(CostMode::CostConscious.to_string(), "cost_conscious");
        assert_eq!(CostMode::default(), CostMode::Balanced);
    }
}
