// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally application wiring shared by the `tally` binary and its tests.

pub mod app;
pub mod commands;
#[cfg(feature = "gateway")]
pub mod serve;
pub mod shutdown;

pub use app::{App, build_providers};
