// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for Tally.
//!
//! Exposes the turn orchestrator over a small JSON API with an SSE variant of
//! the chat endpoint, plus conversation history, usage statistics, and a
//! classification preview.

pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;

pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, router, start_server};
