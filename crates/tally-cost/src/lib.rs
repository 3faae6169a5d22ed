// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage tracking and pricing for Tally.
//!
//! This crate provides:
//! - **Usage ledger**: one persisted record per finished turn, with daily,
//!   monthly, per-provider, and per-conversation totals
//! - **Usage recorder**: a sink wrapper that never fails the turn
//! - **Pricing**: per-provider cost calculation

pub mod ledger;
pub mod pricing;
pub mod recorder;

pub use ledger::{ProviderUsage, SqliteUsageLedger, TurnOutcome, UsageRecord};
pub use pricing::{ModelPricing, calculate_cost, get_pricing};
pub use recorder::{UsageRecorder, UsageSink};
