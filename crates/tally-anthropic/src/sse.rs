// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for Anthropic Messages API streaming responses.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`] variants
//! using the `eventsource-stream` crate for SSE protocol compliance.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tally_core::{TallyError, TransientKind};

use crate::client::PROVIDER;
use crate::types::{
    ApiErrorResponse, SseContentBlockDelta, SseContentBlockStart, SseContentBlockStop,
    SseMessageDelta, SseMessageStart,
};

/// Typed SSE events from the Anthropic streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    MessageStart(SseMessageStart),
    ContentBlockStart(SseContentBlockStart),
    ContentBlockDelta(SseContentBlockDelta),
    ContentBlockStop(SseContentBlockStop),
    MessageDelta(SseMessageDelta),
    MessageStop,
    Ping,
    /// API error reported mid-stream (for example `overloaded_error`).
    Error(ApiErrorResponse),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, TallyError>> + Send>>;

fn parse<T: DeserializeOwned>(event: &str, data: &str) -> Result<T, TallyError> {
    serde_json::from_str(data).map_err(|e| TallyError::ProviderPermanent {
        provider: PROVIDER.into(),
        message: format!("failed to parse {event}: {e}"),
    })
}

/// Parses a streaming response into typed events.
///
/// Unknown event types are skipped, so newer API versions that add events
/// keep working.
pub fn parse_sse_stream(response: reqwest::Response) -> EventStream {
    let events = response.bytes_stream().eventsource();

    let mapped = events.filter_map(|result| async move {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                return Some(Err(TallyError::ProviderTransient {
                    provider: PROVIDER.into(),
                    kind: TransientKind::Network,
                    message: format!("SSE stream error: {e}"),
                }));
            }
        };
        let data = event.data.as_str();
        let parsed = match event.event.as_str() {
            "message_start" => parse(&event.event, data).map(StreamEvent::MessageStart),
            "content_block_start" => parse(&event.event, data).map(StreamEvent::ContentBlockStart),
            "content_block_delta" => parse(&event.event, data).map(StreamEvent::ContentBlockDelta),
            "content_block_stop" => parse(&event.event, data).map(StreamEvent::ContentBlockStop),
            "message_delta" => parse(&event.event, data).map(StreamEvent::MessageDelta),
            "message_stop" => Ok(StreamEvent::MessageStop),
            "ping" => Ok(StreamEvent::Ping),
            "error" => parse(&event.event, data).map(StreamEvent::Error),
            _ => return None,
        };
        Some(parsed)
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn sse_response(body: &str) -> reqwest::Response {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body.to_string()),
            )
            .mount(&server)
            .await;
        reqwest::get(server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn text_delta_is_parsed() {
        let sse = "event: content_block_delta\ndata: {\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n";
        let mut stream = parse_sse_stream(sse_response(sse).await);
        match stream.next().await.unwrap().unwrap() {
            StreamEvent::ContentBlockDelta(delta) => {
                assert_eq!(delta.index, 0);
                assert!(
                    matches!(delta.delta, crate::types::SseDelta::TextDelta { ref text } if text == "Hello")
                );
            }
            other => panic!("expected ContentBlockDelta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_events_are_skipped() {
        let sse = "event: future_event\ndata: {\"foo\":\"bar\"}\n\nevent: ping\ndata: {}\n\nevent: message_stop\ndata: {}\n\n";
        let events: Vec<_> = parse_sse_stream(sse_response(sse).await).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(StreamEvent::Ping)));
        assert!(matches!(events[1], Ok(StreamEvent::MessageStop)));
    }

    #[tokio::test]
    async fn error_event_is_parsed() {
        let sse = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let mut stream = parse_sse_stream(sse_response(sse).await);
        match stream.next().await.unwrap().unwrap() {
            StreamEvent::Error(err) => assert_eq!(err.error.type_, "overloaded_error"),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
