// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider registry and the fallback controller that walks ranked
//! candidates, retrying network blips and timing out slow backends.

pub mod fallback;
pub mod registry;

pub use fallback::{FallbackController, FallbackFailure, FallbackOutcome};
pub use registry::ProviderRegistry;
