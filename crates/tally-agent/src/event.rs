// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events emitted while a turn runs.

use serde::Serialize;
use tally_core::{Complexity, TokenUsage};

/// Final accounting for a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnSummary {
    pub conversation_id: String,
    /// The final assistant answer.
    pub content: String,
    pub provider: String,
    pub model: String,
    /// Token usage summed over every provider call in the turn.
    pub usage: TokenUsage,
    pub cost_usd: f64,
    /// Names of the tools invoked, in order.
    pub tool_calls: Vec<String>,
    pub complexity: Complexity,
    pub needs_tools: bool,
    pub latency_ms: u64,
}

/// One step of a running turn, in the order the client should render it.
///
/// A turn ends with exactly one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Assistant text as it arrives from the provider.
    Token { text: String },
    ToolCallStarted {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolCallFinished {
        id: String,
        name: String,
        is_error: bool,
        output: serde_json::Value,
    },
    Done(TurnSummary),
    Error { code: String, message: String },
}

impl TurnEvent {
    /// Event name used on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::Done(_) => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_tag_matches_wire_name() {
        let events = [
            TurnEvent::Token { text: "Hi".into() },
            TurnEvent::ToolCallStarted {
                id: "t1".into(),
                name: "get_bank_balances".into(),
                arguments: serde_json::json!({}),
            },
            TurnEvent::Error {
                code: "cancelled".into(),
                message: "The request was cancelled.".into(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[test]
    fn done_flattens_summary_fields() {
        let event = TurnEvent::Done(TurnSummary {
            conversation_id: "c1".into(),
            content: "You have $2,450.75.".into(),
            provider: "ollama".into(),
            model: "llama3.2".into(),
            usage: TokenUsage {
                input_tokens: 12,
                output_tokens: 8,
            },
            cost_usd: 0.0,
            tool_calls: vec!["get_bank_balances".into()],
            complexity: Complexity::Simple,
            needs_tools: true,
            latency_ms: 42,
        });
        assert!(event.is_terminal());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["provider"], "ollama");
        assert_eq!(json["usage"]["input_tokens"], 12);
        assert_eq!(json["complexity"], "simple");
    }
}
