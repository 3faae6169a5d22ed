// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes.
//! All errors are collected; validation does not fail fast.

use std::collections::HashSet;

use crate::diagnostic::{ConfigError, suggest_key};
use crate::model::{PROVIDER_NAMES, TallyConfig};

/// Upper bound on `routing.max_tool_iterations`.
const MAX_TOOL_ITERATIONS_CEILING: u32 = 64;

/// Validate a deserialized configuration for semantic correctness.
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(validation("storage.database_path must not be empty"));
    }

    let routing = &config.routing;
    if routing.max_tool_iterations == 0 || routing.max_tool_iterations > MAX_TOOL_ITERATIONS_CEILING
    {
        errors.push(validation(format!(
            "routing.max_tool_iterations must be between 1 and {MAX_TOOL_ITERATIONS_CEILING}, got {}",
            routing.max_tool_iterations
        )));
    }

    if routing.provider_timeout_secs == 0 {
        errors.push(validation("routing.provider_timeout_secs must be at least 1"));
    }

    for (key, value) in [
        ("simple_max_tokens", routing.simple_max_tokens),
        ("moderate_max_tokens", routing.moderate_max_tokens),
        ("complex_max_tokens", routing.complex_max_tokens),
    ] {
        if value == 0 {
            errors.push(validation(format!("routing.{key} must be at least 1")));
        }
    }

    let mut seen = HashSet::new();
    for name in &routing.fallback_order {
        if !PROVIDER_NAMES.contains(&name.as_str()) {
            errors.push(ConfigError::UnknownProvider {
                name: name.clone(),
                suggestion: suggest_key(name, &PROVIDER_NAMES),
                valid: PROVIDER_NAMES.join(", "),
            });
        } else if !seen.insert(name.as_str()) {
            errors.push(validation(format!(
                "routing.fallback_order lists `{name}` more than once"
            )));
        }
    }

    for profile in config.provider_profiles() {
        if !profile.enabled {
            continue;
        }
        for (tier, model) in ["simple", "moderate", "complex"]
            .iter()
            .zip(profile.models.all())
        {
            if model.trim().is_empty() {
                errors.push(validation(format!(
                    "{}.models.{tier} must not be empty",
                    profile.name
                )));
            }
        }
    }

    if config.ollama.enabled
        && !(config.ollama.host.starts_with("http://") || config.ollama.host.starts_with("https://"))
    {
        errors.push(validation(format!(
            "ollama.host `{}` must start with http:// or https://",
            config.ollama.host
        )));
    }

    if config.claude_cli.enabled && config.claude_cli.binary.trim().is_empty() {
        errors.push(validation("claude_cli.binary must not be empty"));
    }

    let host = config.gateway.host.trim();
    let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
    let is_valid_hostname = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
    if !is_valid_ip && !is_valid_hostname {
        errors.push(validation(format!(
            "gateway.host `{host}` is not a valid IP address or hostname"
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
