// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use futures::channel::mpsc::UnboundedReceiver;
use serde::{Deserialize, Serialize};
use tally_agent::{TurnEvent, TurnHandle, TurnRequest, TurnSummary, wait_for_outcome};
use tally_config::CostMode;
use tally_core::{Classification, ConversationId, ConversationSummary, Message, ProviderCandidate, TallyError};
use tally_cost::ProviderUsage;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Request body for `POST /api/chat` and `POST /api/chat/stream`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Continue this conversation; a new one is created when absent.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Provider to try first.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub cost_mode: Option<CostMode>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// Registered provider names.
    pub providers: Vec<String>,
    pub tools: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NewConversation {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: ConversationSummary,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// Day to report, `YYYY-MM-DD`; today (UTC) when absent.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsageStats {
    pub date: String,
    pub day_cost_usd: f64,
    pub month: String,
    pub month_cost_usd: f64,
    pub providers: Vec<ProviderUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub message: String,
    /// Earlier user messages, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub cost_mode: Option<CostMode>,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub classification: Classification,
    pub candidates: Vec<ProviderCandidate>,
}

/// GET /health
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        providers: state
            .orchestrator
            .providers()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
        tools: state.orchestrator.tools().len(),
    })
}

/// POST /api/chat
///
/// Runs a whole turn and returns its summary.
pub async fn post_chat(
    State(state): State<GatewayState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<TurnSummary>, ApiError> {
    let (conversation_id, events) = begin_turn(&state, body).await?;
    wait_for_outcome(events)
        .await
        .map(Json)
        .map_err(|failed| ApiError::from_turn(failed, conversation_id.0))
}

/// Reserve the conversation and start a turn on it.
///
/// At most one turn runs per conversation; the reservation is released when
/// the turn task ends, whether or not anyone is still reading its events.
pub(crate) async fn begin_turn(
    state: &GatewayState,
    body: ChatRequest,
) -> Result<(ConversationId, UnboundedReceiver<TurnEvent>), ApiError> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let cancel = state.shutdown.child_token();
    let reserved = body.conversation_id.map(ConversationId);
    if let Some(ref id) = reserved {
        match state.active.entry(id.0.clone()) {
            Entry::Occupied(_) => {
                return Err(ApiError::conflict(format!(
                    "conversation {id} already has a turn in progress"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }
    }

    let request = TurnRequest {
        conversation_id: reserved.clone(),
        message: message.to_string(),
        preferred_provider: body.provider,
        cost_mode: body.cost_mode,
    };
    let TurnHandle {
        conversation_id,
        events,
        task,
    } = match state.orchestrator.start_turn(request, cancel.clone()).await {
        Ok(handle) => handle,
        Err(e) => {
            if let Some(id) = reserved {
                state.active.remove(&id.0);
            }
            return Err(e.into());
        }
    };

    state.active.insert(conversation_id.0.clone(), cancel);
    let active = Arc::clone(&state.active);
    let key = conversation_id.0.clone();
    tokio::spawn(async move {
        if let Err(e) = task.await {
            warn!(conversation_id = %key, error = %e, "turn task ended abnormally");
        }
        active.remove(&key);
        debug!(conversation_id = %key, "turn released");
    });

    Ok((conversation_id, events))
}

/// GET /api/conversations
pub async fn list_conversations(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationList>, ApiError> {
    let conversations = state
        .orchestrator
        .store()
        .list_conversations(query.limit.clamp(1, 500))
        .await?;
    Ok(Json(ConversationList { conversations }))
}

/// POST /api/conversations
pub async fn create_conversation(
    State(state): State<GatewayState>,
    Json(body): Json<NewConversation>,
) -> Result<(StatusCode, Json<ConversationSummary>), ApiError> {
    let store = state.orchestrator.store();
    let id = store.create_conversation(body.title.as_deref()).await?;
    let summary = store
        .get_conversation(&id)
        .await?
        .ok_or_else(|| TallyError::Internal(format!("conversation {id} vanished after insert")))?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// GET /api/conversations/{id}
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let store = state.orchestrator.store();
    let id = ConversationId(id);
    let conversation = store
        .get_conversation(&id)
        .await?
        .ok_or_else(|| TallyError::NotFound(format!("conversation {id}")))?;
    let messages = store.load_messages(&id).await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

/// GET /api/usage/stats
pub async fn usage_stats(
    State(state): State<GatewayState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageStats>, ApiError> {
    let day = match query.date {
        Some(ref date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| ApiError::bad_request(format!("invalid date `{date}`, expected YYYY-MM-DD")))?,
        None => chrono::Utc::now().date_naive(),
    };
    let date = day.format("%Y-%m-%d").to_string();
    let month = day.format("%Y-%m").to_string();

    let ledger = &state.ledger;
    Ok(Json(UsageStats {
        day_cost_usd: ledger.daily_total(&date).await?,
        month_cost_usd: ledger.monthly_total(&month).await?,
        providers: ledger.provider_breakdown(&date).await?,
        date,
        month,
    }))
}

/// POST /api/classify
///
/// Shows how a message would be classified and routed without running it.
pub async fn classify(
    State(state): State<GatewayState>,
    Json(body): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    let history: Vec<&str> = body.history.iter().map(String::as_str).collect();
    let classification = state.orchestrator.classify(&body.message, &history);
    let candidates =
        state
            .orchestrator
            .route(&classification, body.cost_mode, body.provider.as_deref());
    Ok(Json(ClassifyResponse {
        classification,
        candidates,
    }))
}
