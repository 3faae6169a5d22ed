// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Tally configuration system.

use tally_config::diagnostic::ConfigError;
use tally_config::{CostMode, load_and_validate_str, load_config_from_str};

/// A full configuration deserializes into the expected values.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "ledger"
log_level = "debug"
system_prompt = "You are a careful financial assistant."

[storage]
database_path = "/tmp/tally-test.db"
wal_mode = false

[routing]
cost_mode = "cost_conscious"
max_tool_iterations = 5
provider_timeout_secs = 30
fallback_order = ["ollama", "anthropic"]

[anthropic]
enabled = true
api_key = "sk-ant-test"

[anthropic.models]
simple = "claude-3-5-haiku-20241022"
moderate = "claude-sonnet-4-20250514"
complex = "claude-opus-4-20250514"

[ollama]
enabled = true
host = "http://10.0.0.5:11434"

[gateway]
host = "0.0.0.0"
port = 8080
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "ledger");
    assert_eq!(config.storage.database_path, "/tmp/tally-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.routing.cost_mode, CostMode::CostConscious);
    assert_eq!(config.routing.max_tool_iterations, 5);
    assert_eq!(config.routing.fallback_order, vec!["ollama", "anthropic"]);
    assert!(config.anthropic.enabled);
    assert_eq!(config.anthropic.models.complex, "claude-opus-4-20250514");
    assert_eq!(config.ollama.host, "http://10.0.0.5:11434");
    assert!(!config.openai.enabled);
    assert_eq!(config.gateway.port, 8080);
}

/// Empty input yields the compiled defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.routing.cost_mode, CostMode::Balanced);
    assert_eq!(config.routing.max_tool_iterations, 8);
    assert_eq!(config.ollama.models.simple, "llama3.2:3b");
    assert_eq!(config.claude_cli.binary, "claude");
    assert!(!config.claude_cli.supports_tools);
}

/// A typo in a section key becomes an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_key_produces_suggestion() {
    let toml = r#"
[routing]
max_tool_iteratons = 3
"#;
    let errors = load_and_validate_str(toml).expect_err("typo should be rejected");
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "max_tool_iteratons");
            assert_eq!(suggestion.as_deref(), Some("max_tool_iterations"));
            assert!(span.is_some(), "inline source should carry a span");
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// An unknown cost mode is reported as an invalid value.
#[test]
fn unknown_cost_mode_is_rejected() {
    let toml = r#"
[routing]
cost_mode = "cheapest"
"#;
    let errors = load_and_validate_str(toml).expect_err("bad variant should be rejected");
    assert!(format!("{errors:?}").contains("cheapest"), "got {errors:?}");
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_runs_after_parse() {
    let toml = r#"
[routing]
max_tool_iterations = 0
fallback_order = ["openia"]
"#;
    let errors = load_and_validate_str(toml).expect_err("invalid values should be rejected");
    assert_eq!(errors.len(), 2);
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownProvider { suggestion: Some(s), .. } if s == "openai"))
    );
}

/// Wrong value types are reported with the key path.
#[test]
fn wrong_type_reports_key() {
    let toml = r#"
[gateway]
port = "eighty"
"#;
    let errors = load_and_validate_str(toml).expect_err("wrong type should be rejected");
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "gateway.port"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}
