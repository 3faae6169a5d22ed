// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query routing for Tally.
//!
//! Classifies each user message by complexity and tool need, then maps the
//! classification and the configured cost policy to an ordered list of
//! provider candidates. Neither step performs I/O.

pub mod classifier;
pub mod selector;

pub use classifier::QueryClassifier;
pub use selector::{ProviderSelector, model_tier, provider_order};
