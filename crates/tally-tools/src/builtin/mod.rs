// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in financial tools backed by the local datastore.

pub mod accounts;
pub mod budget;
pub mod documents;
pub mod memory;
pub mod portfolio;
pub mod spending;

pub use accounts::{GetBankBalances, ListLinkedAccounts};
pub use budget::{DeleteBudget, GetBudgetStatus, GetSpendingVsBudgetTrend, ListBudgets, SetBudget};
pub use documents::{
    GetDocument, GetDocumentTypes, GetExpiringDocuments, ListDocuments, SearchDocuments,
    UpdateDocument,
};
pub use memory::{
    AddObservation, CreateEntity, CreateRelation, DeleteEntity, DeleteObservation, GetAllMemories,
    GetEntity, SearchMemories,
};
pub use portfolio::{
    GetAccountSummary, GetAssetAllocation, GetBitcoinHoldings, GetCryptoHoldings,
    GetDefiPositions, GetHoldingsByAccount, GetPortfolioSummary, GetTopHoldings,
};
pub use spending::{
    DetectRecurringExpenses, GetDeposits, GetMonthlyCashFlow, GetSpendingByCategory,
    SearchTransactions,
};

use std::sync::Arc;

use tally_core::TallyError;
use tally_storage::Database;

use crate::{Tool, ToolRegistry};

/// Registers every financial tool against `db`.
pub fn register_financial_tools(registry: &mut ToolRegistry, db: &Database) -> Result<(), TallyError> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(GetBankBalances::new(db.clone())),
        Arc::new(ListLinkedAccounts::new(db.clone())),
        Arc::new(GetSpendingByCategory::new(db.clone())),
        Arc::new(SearchTransactions::new(db.clone())),
        Arc::new(GetMonthlyCashFlow::new(db.clone())),
        Arc::new(DetectRecurringExpenses::new(db.clone())),
        Arc::new(GetDeposits::new(db.clone())),
        Arc::new(GetBudgetStatus::new(db.clone())),
        Arc::new(SetBudget::new(db.clone())),
        Arc::new(ListBudgets::new(db.clone())),
        Arc::new(DeleteBudget::new(db.clone())),
        Arc::new(GetSpendingVsBudgetTrend::new(db.clone())),
        Arc::new(GetPortfolioSummary::new(db.clone())),
        Arc::new(GetHoldingsByAccount::new(db.clone())),
        Arc::new(GetAssetAllocation::new(db.clone())),
        Arc::new(GetTopHoldings::new(db.clone())),
        Arc::new(GetAccountSummary::new(db.clone())),
        Arc::new(GetCryptoHoldings::new(db.clone())),
        Arc::new(GetDefiPositions::new(db.clone())),
        Arc::new(GetBitcoinHoldings::new(db.clone())),
        Arc::new(CreateEntity::new(db.clone())),
        Arc::new(AddObservation::new(db.clone())),
        Arc::new(CreateRelation::new(db.clone())),
        Arc::new(GetEntity::new(db.clone())),
        Arc::new(SearchMemories::new(db.clone())),
        Arc::new(GetAllMemories::new(db.clone())),
        Arc::new(DeleteEntity::new(db.clone())),
        Arc::new(DeleteObservation::new(db.clone())),
        Arc::new(SearchDocuments::new(db.clone())),
        Arc::new(ListDocuments::new(db.clone())),
        Arc::new(GetDocument::new(db.clone())),
        Arc::new(GetExpiringDocuments::new(db.clone())),
        Arc::new(UpdateDocument::new(db.clone())),
        Arc::new(GetDocumentTypes::new(db.clone())),
    ];
    for tool in tools {
        registry.register(tool)?;
    }
    Ok(())
}
