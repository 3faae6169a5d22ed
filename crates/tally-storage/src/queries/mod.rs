// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table group.

pub mod accounts;
pub mod budgets;
pub mod conversations;
pub mod documents;
pub mod memory;
pub mod portfolio;
pub mod spending;
