// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by every Tally crate.
//!
//! Each variant maps to a stable code string via [`TallyError::code`]. The
//! orchestrator uses these codes in turn events and usage records, and the
//! fallback controller uses [`TallyError::is_transient`] to decide whether the
//! next provider candidate should be tried.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Why a provider call failed in a way that another attempt might fix.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    /// The call did not finish within the per-call timeout.
    Timeout,
    /// The backend answered 429 or reported an overloaded model.
    RateLimited,
    /// The backend answered with a 5xx-class status.
    ServerError,
    /// The connection could not be established or was reset.
    Network,
}

/// The primary error type used across all Tally traits and core operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Invalid or missing configuration, including "no provider enabled".
    #[error("configuration error: {0}")]
    Config(String),

    /// Datastore errors (connection, query, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A provider failure that another attempt or candidate may not hit.
    #[error("provider `{provider}` failed ({kind}): {message}")]
    ProviderTransient {
        provider: String,
        kind: TransientKind,
        message: String,
    },

    /// A provider rejected the request outright (auth, malformed request).
    #[error("provider `{provider}` rejected the request: {message}")]
    ProviderPermanent { provider: String, message: String },

    /// Every provider candidate failed.
    #[error("all {attempts} provider attempts failed; last error: {last}")]
    ProvidersExhausted {
        attempts: usize,
        last: Box<TallyError>,
    },

    /// Tool arguments did not match the declared schema, or the tool is unknown.
    #[error("invalid call to tool `{tool}`: {message}")]
    ToolValidation { tool: String, message: String },

    /// The tool ran and its data source failed.
    #[error("tool `{tool}` failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The provider kept requesting tools past the configured iteration cap.
    #[error("tool-call loop did not converge within {limit} provider calls")]
    LoopLimitExceeded { limit: u32 },

    /// The client stopped reading turn events.
    #[error("client disconnected from the turn stream")]
    StreamingInterrupted,

    /// The turn was cancelled by its caller.
    #[error("turn cancelled")]
    Cancelled,

    /// A referenced record (such as a conversation) does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Wraps any error as a storage failure.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Classifies an HTTP error status returned by a provider backend.
    ///
    /// 408, 429, 529 and 5xx are transient; everything else is permanent.
    pub fn from_status(provider: &str, status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status {
            408 => Some(TransientKind::Timeout),
            429 | 529 => Some(TransientKind::RateLimited),
            500..=599 => Some(TransientKind::ServerError),
            _ => None,
        };
        match kind {
            Some(kind) => Self::ProviderTransient {
                provider: provider.to_string(),
                kind,
                message: format!("HTTP {status}: {message}"),
            },
            None => Self::ProviderPermanent {
                provider: provider.to_string(),
                message: format!("HTTP {status}: {message}"),
            },
        }
    }

    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration_error",
            Self::Storage { .. } => "storage_error",
            Self::ProviderTransient { .. } => "provider_transient",
            Self::ProviderPermanent { .. } => "provider_permanent",
            Self::ProvidersExhausted { .. } => "providers_exhausted",
            Self::ToolValidation { .. } => "tool_validation",
            Self::ToolExecution { .. } => "tool_execution",
            Self::LoopLimitExceeded { .. } => "loop_limit_exceeded",
            Self::StreamingInterrupted => "streaming_interrupted",
            Self::Cancelled => "cancelled",
            Self::NotFound(_) => "not_found",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    /// True when a different candidate might succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderTransient { .. } | Self::Timeout { .. })
    }

    /// True for momentary network blips worth one retry on the same candidate.
    pub fn is_network_blip(&self) -> bool {
        matches!(
            self,
            Self::ProviderTransient {
                kind: TransientKind::Network,
                ..
            }
        )
    }

    /// Message shown to the end user when a turn fails with this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => {
                "No language model provider is configured. Enable one in tally.toml.".to_string()
            }
            Self::LoopLimitExceeded { .. } => {
                "I couldn't finish that request: the model kept asking for more data without \
                 reaching an answer. Try narrowing the question."
                    .to_string()
            }
            Self::ProvidersExhausted { .. } | Self::ProviderTransient { .. } => {
                "All language model providers are unavailable right now. Please try again shortly."
                    .to_string()
            }
            Self::ProviderPermanent { message, .. } => {
                format!("The language model provider rejected the request: {message}")
            }
            Self::Cancelled => "The request was cancelled.".to_string(),
            other => format!("Something went wrong: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(TallyError::from_status("anthropic", 429, "slow down").is_transient());
        assert!(TallyError::from_status("anthropic", 503, "overloaded").is_transient());
        assert!(TallyError::from_status("anthropic", 529, "overloaded").is_transient());
        assert!(!TallyError::from_status("anthropic", 401, "bad key").is_transient());
        assert!(!TallyError::from_status("anthropic", 400, "bad request").is_transient());
    }

    #[test]
    fn only_network_errors_are_blips() {
        let network = TallyError::ProviderTransient {
            provider: "openai".into(),
            kind: TransientKind::Network,
            message: "connection reset".into(),
        };
        let rate = TallyError::from_status("openai", 429, "");
        assert!(network.is_network_blip());
        assert!(!rate.is_network_blip());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(TallyError::Config("x".into()).code(), "configuration_error");
        assert_eq!(
            TallyError::LoopLimitExceeded { limit: 3 }.code(),
            "loop_limit_exceeded"
        );
        assert_eq!(TallyError::StreamingInterrupted.code(), "streaming_interrupted");
        assert_eq!(
            TallyError::ProvidersExhausted {
                attempts: 2,
                last: Box::new(TallyError::Internal("x".into())),
            }
            .code(),
            "providers_exhausted"
        );
    }

    #[test]
    fn transient_kind_display() {
        assert_eq!(TransientKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(TransientKind::ServerError.to_string(), "server_error");
    }
}
