// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tally.toml` > `~/.config/tally/tally.toml` > `/etc/tally/tally.toml`
//! with environment variable overrides via the `TALLY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TallyConfig;

/// Top-level sections that env vars may target, longest first so that
/// `claude_cli_binary` maps to `claude_cli.binary`.
const ENV_SECTIONS: &[&str] = &[
    "claude_cli",
    "anthropic",
    "gateway",
    "routing",
    "storage",
    "openai",
    "ollama",
    "agent",
];

/// Config file locations in merge order (later overrides earlier).
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/tally/tally.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tally").join("tally.toml"));
    }
    paths.push(PathBuf::from("tally.toml"));
    paths
}

/// Build the Figment used for standard config loading.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tally/tally.toml`
/// 3. `~/.config/tally/tally.toml`
/// 4. `./tally.toml`
/// 5. `TALLY_*` environment variables
pub fn build_figment() -> Figment {
    config_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(TallyConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
pub fn load_config() -> Result<TallyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Maps `TALLY_<SECTION>_<KEY>` to `<section>.<key>`.
///
/// Uses an explicit section table instead of `Env::split("_")` because many
/// keys contain underscores (`TALLY_ROUTING_MAX_TOOL_ITERATIONS` must become
/// `routing.max_tool_iterations`).
fn env_provider() -> Env {
    Env::prefixed("TALLY_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(
            map_env_key("routing_max_tool_iterations"),
            "routing.max_tool_iterations"
        );
        assert_eq!(map_env_key("claude_cli_binary"), "claude_cli.binary");
        assert_eq!(map_env_key("anthropic_api_key"), "anthropic.api_key");
        assert_eq!(map_env_key("unknown_key"), "unknown_key");
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
[routing]
cost_mode = "balanced"
max_tool_iterations = 4
"#,
            )?;
            jail.set_env("TALLY_ROUTING_COST_MODE", "quality");
            jail.set_env("TALLY_OLLAMA_ENABLED", "true");

            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.routing.cost_mode, crate::model::CostMode::Quality);
            assert_eq!(config.routing.max_tool_iterations, 4);
            assert!(config.ollama.enabled);
            Ok(())
        });
    }
}
