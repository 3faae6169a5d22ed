// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait, registry, and built-in financial tools for Tally.
//!
//! Every [`Tool`] declares a JSON Schema for its arguments. The
//! [`ToolRegistry`] compiles those schemas when tools are registered and
//! checks each call against them before running it.
//!
//! The built-in tools read and write the local datastore:
//! - accounts: [`builtin::GetBankBalances`], [`builtin::ListLinkedAccounts`]
//! - spending: [`builtin::GetSpendingByCategory`], [`builtin::SearchTransactions`],
//!   [`builtin::GetMonthlyCashFlow`], [`builtin::DetectRecurringExpenses`],
//!   [`builtin::GetDeposits`]
//! - budgets: [`builtin::GetBudgetStatus`], [`builtin::SetBudget`],
//!   [`builtin::ListBudgets`], [`builtin::DeleteBudget`],
//!   [`builtin::GetSpendingVsBudgetTrend`]
//! - portfolio and crypto: [`builtin::GetPortfolioSummary`],
//!   [`builtin::GetHoldingsByAccount`], [`builtin::GetAssetAllocation`],
//!   [`builtin::GetTopHoldings`], [`builtin::GetAccountSummary`],
//!   [`builtin::GetCryptoHoldings`], [`builtin::GetDefiPositions`],
//!   [`builtin::GetBitcoinHoldings`]
//! - memory graph: [`builtin::CreateEntity`], [`builtin::AddObservation`],
//!   [`builtin::CreateRelation`], [`builtin::GetEntity`], [`builtin::SearchMemories`],
//!   [`builtin::GetAllMemories`], [`builtin::DeleteEntity`], [`builtin::DeleteObservation`]
//! - document vault: [`builtin::SearchDocuments`], [`builtin::ListDocuments`],
//!   [`builtin::GetDocument`], [`builtin::GetExpiringDocuments`],
//!   [`builtin::UpdateDocument`], [`builtin::GetDocumentTypes`]

pub mod builtin;
pub mod tool;

pub use builtin::register_financial_tools;
pub use tool::{Tool, ToolRegistry};

/// JSON Schema pattern for a `YYYY-MM` month.
pub(crate) const MONTH_PATTERN: &str = "^[0-9]{4}-(0[1-9]|1[0-2])$";

/// Today's UTC date.
pub(crate) fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

/// The UTC date `days` days ago as `YYYY-MM-DD`.
pub(crate) fn days_ago(days: u32) -> String {
    let date = today() - chrono::Duration::days(i64::from(days));
    date.format("%Y-%m-%d").to_string()
}

/// The current UTC month as `YYYY-MM`.
pub(crate) fn current_month() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}
