// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! System prompt resolution.

use tally_config::model::AgentConfig;
use tracing::{info, warn};

/// Resolve the system prompt: file first, then the inline string, then a default.
///
/// An unreadable or empty prompt file falls through to the next source.
pub async fn load_system_prompt(config: &AgentConfig) -> String {
    if let Some(ref path) = config.system_prompt_file {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    info!(path = path.as_str(), "loaded system prompt from file");
                    return trimmed.to_string();
                }
            }
            Err(e) => {
                warn!(
                    path = path.as_str(),
                    error = %e,
                    "failed to read system prompt file, falling back"
                );
            }
        }
    }

    if let Some(ref prompt) = config.system_prompt {
        if !prompt.trim().is_empty() {
            return prompt.clone();
        }
    }

    default_prompt(&config.name)
}

fn default_prompt(name: &str) -> String {
    format!(
        "You are {name}, a personal finance assistant with read and write access to the \
         user's local financial datastore. Call the available tools to look up balances, \
         transactions, budgets and holdings instead of guessing, and state amounts in dollars \
         with two decimals. If the data needed to answer is missing, say so plainly."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn default_prompt_uses_agent_name() {
        let config = AgentConfig {
            name: "penny".into(),
            ..Default::default()
        };
        let prompt = load_system_prompt(&config).await;
        assert!(prompt.starts_with("You are penny, a personal finance assistant"));
    }

    #[tokio::test]
    async fn inline_prompt_wins_over_default() {
        let config = AgentConfig {
            system_prompt: Some("Answer in haiku.".into()),
            ..Default::default()
        };
        assert_eq!(load_system_prompt(&config).await, "Answer in haiku.");
    }

    #[tokio::test]
    async fn file_wins_over_inline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "\n  From the file.  \n").unwrap();
        let config = AgentConfig {
            system_prompt: Some("Inline.".into()),
            system_prompt_file: Some(file.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert_eq!(load_system_prompt(&config).await, "From the file.");
    }

    #[tokio::test]
    async fn missing_file_falls_back_to_inline() {
        let config = AgentConfig {
            system_prompt: Some("Inline.".into()),
            system_prompt_file: Some("/nonexistent/tally/prompt.md".into()),
            ..Default::default()
        };
        assert_eq!(load_system_prompt(&config).await, "Inline.");
    }
}
