// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events streaming for `POST /api/chat/stream`.
//!
//! Each turn event becomes one SSE event named after it:
//! ```text
//! event: token
//! data: {"type":"token","text":"Your checking "}
//!
//! event: done
//! data: {"type":"done","conversation_id":"...","content":"...",...}
//! ```
//! The conversation id is also returned in the `x-conversation-id` header so
//! clients starting a new conversation learn it before the first token.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use tally_agent::TurnEvent;
use tally_core::TallyError;

use crate::error::ApiError;
use crate::handlers::{ChatRequest, begin_turn};
use crate::server::GatewayState;

pub const CONVERSATION_HEADER: &str = "x-conversation-id";

/// POST /api/chat/stream
pub async fn post_chat_stream(
    State(state): State<GatewayState>,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let (conversation_id, events) = begin_turn(&state, body).await?;

    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&conversation_id.0)
        .map_err(|e| TallyError::Internal(format!("conversation id is not a valid header: {e}")))?;
    headers.insert(CONVERSATION_HEADER, value);

    let stream = events.map(|event| to_sse(&event));
    Ok((headers, Sse::new(stream).keep_alive(KeepAlive::default())).into_response())
}

fn to_sse(event: &TurnEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_serializes() {
        for event in [
            TurnEvent::Token { text: "Hi".into() },
            TurnEvent::ToolCallFinished {
                id: "t1".into(),
                name: "list_budgets".into(),
                is_error: false,
                output: serde_json::json!({ "budgets": [] }),
            },
            TurnEvent::Error {
                code: "cancelled".into(),
                message: "The request was cancelled.".into(),
            },
        ] {
            assert!(to_sse(&event).is_ok());
        }
    }
}
