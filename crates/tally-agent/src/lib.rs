// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn orchestration for Tally.
//!
//! The [`Orchestrator`] answers one user message per turn: it classifies the
//! message, selects candidate providers, drives the provider/tool loop under a
//! bounded iteration cap, commits the resulting messages, and records exactly
//! one usage record. Progress is reported as a stream of [`TurnEvent`]s.

pub mod event;
pub mod prompt;
pub mod turn;

pub use event::{TurnEvent, TurnSummary};
pub use prompt::load_system_prompt;
pub use turn::{Orchestrator, TurnFailed, TurnHandle, TurnRequest, TurnState, wait_for_outcome};
