// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally finance assistant.
//!
//! Holds the error taxonomy, the message and tool types that flow through a
//! conversation turn, and the adapter traits implemented by providers and
//! storage backends.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{TallyError, TransientKind};
pub use types::{
    AdapterType, Classification, Complexity, ConversationId, ConversationSummary, HealthStatus,
    Message, ProviderCandidate, ProviderReply, ProviderRequest, ProviderResponse, ProviderStream,
    ProviderStreamChunk, Role, StreamEventType, TokenUsage, ToolCall, ToolDefinition, ToolResult,
};

pub use traits::{ConversationStore, PluginAdapter, ProviderAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;
        for variant in [AdapterType::Provider, AdapterType::Storage] {
            let parsed = AdapterType::from_str(&variant.to_string()).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn role_uses_lowercase_names() {
        assert_eq!(Role::Assistant.to_string(), "assistant");
        let json = serde_json::to_string(&Role::Tool).unwrap();
        assert_eq!(json, "\"tool\"");
    }

    #[test]
    fn traits_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_provider_adapter<T: ProviderAdapter>() {}
        fn _assert_storage_adapter<T: StorageAdapter>() {}
        fn _assert_conversation_store<T: ConversationStore>() {}
    }

    #[tokio::test]
    async fn chat_dispatches_on_stream_flag() {
        use async_trait::async_trait;
        use futures::StreamExt;

        struct Fixed;

        #[async_trait]
        impl PluginAdapter for Fixed {
            fn name(&self) -> &str {
                "fixed"
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
                Ok(())
            }
        }

        #[async_trait]
        impl ProviderAdapter for Fixed {
            fn supports_tools(&self) -> bool {
                false
            }
            async fn complete(
                &self,
                request: ProviderRequest,
            ) -> Result<ProviderResponse, TallyError> {
                Ok(ProviderResponse {
                    content: "done".into(),
                    model: request.model,
                    ..Default::default()
                })
            }
            async fn stream(&self, _request: ProviderRequest) -> Result<ProviderStream, TallyError> {
                Ok(Box::pin(futures::stream::iter(vec![
                    Ok(ProviderStreamChunk::text("do")),
                    Ok(ProviderStreamChunk::stop()),
                ])))
            }
        }

        let request = |stream| ProviderRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 16,
            stream,
        };

        match Fixed.chat(request(false)).await.unwrap() {
            ProviderReply::Complete(resp) => assert_eq!(resp.content, "done"),
            other => panic!("expected complete reply, got {other:?}"),
        }
        match Fixed.chat(request(true)).await.unwrap() {
            ProviderReply::Stream(stream) => assert_eq!(stream.count().await, 2),
            other => panic!("expected stream reply, got {other:?}"),
        }
    }
}
