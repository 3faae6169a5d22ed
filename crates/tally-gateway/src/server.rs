// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use dashmap::DashMap;
use tally_agent::Orchestrator;
use tally_config::model::GatewayConfig;
use tally_core::TallyError;
use tally_cost::SqliteUsageLedger;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::sse;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Orchestrator,
    pub ledger: Arc<SqliteUsageLedger>,
    /// Conversation id -> cancel token of the turn running on it.
    pub active: Arc<DashMap<String, CancellationToken>>,
    /// Parent of every turn's cancel token; cancelled on shutdown.
    pub shutdown: CancellationToken,
    pub started: std::time::Instant,
}

impl GatewayState {
    pub fn new(orchestrator: Orchestrator, ledger: SqliteUsageLedger) -> Self {
        Self {
            orchestrator,
            ledger: Arc::new(ledger),
            active: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
            started: std::time::Instant::now(),
        }
    }

    /// Use `token` as the shutdown signal.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

/// Every gateway route.
///
/// - `GET /health`
/// - `POST /api/chat`, `POST /api/chat/stream`
/// - `GET|POST /api/conversations`, `GET /api/conversations/{id}`
/// - `GET /api/usage/stats`
/// - `POST /api/classify`
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/chat", post(handlers::post_chat))
        .route("/api/chat/stream", post(sse::post_chat_stream))
        .route(
            "/api/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route("/api/conversations/{id}", get(handlers::get_conversation))
        .route("/api/usage/stats", get(handlers::usage_stats))
        .route("/api/classify", post(handlers::classify))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the gateway until the state's shutdown token is cancelled.
///
/// Cancelling the token also cancels every turn in flight.
pub async fn start_server(config: &GatewayConfig, state: GatewayState) -> Result<(), TallyError> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TallyError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| TallyError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
