// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types returned by the financial query modules.

use serde::{Deserialize, Serialize};

/// An active bank or card account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub name: String,
    /// `checking`, `savings`, `credit`, ...
    pub account_type: String,
    pub institution: Option<String>,
    pub current_balance: f64,
    pub available_balance: Option<f64>,
    pub credit_limit: Option<f64>,
    pub updated_at: Option<String>,
}

/// An account linked through the bank aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub account_id: String,
    pub name: String,
    pub account_type: String,
    pub institution: Option<String>,
    pub current_balance: f64,
    /// Last digits of the account number.
    pub mask: Option<String>,
}

/// A transaction to insert. Negative amounts are outflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction_id: String,
    pub account_id: Option<String>,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub amount: f64,
    pub description: Option<String>,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub source: String,
    pub is_duplicate: bool,
    pub is_transfer: bool,
    pub transfer_pair_id: Option<String>,
}

impl NewTransaction {
    /// A manual, non-duplicate, non-transfer transaction.
    pub fn manual(
        transaction_id: impl Into<String>,
        date: impl Into<String>,
        amount: f64,
        merchant: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            account_id: None,
            date: date.into(),
            amount,
            description: None,
            merchant_name: Some(merchant.into()),
            category: Some(category.into()),
            source: "manual".to_string(),
            is_duplicate: false,
            is_transfer: false,
            transfer_pair_id: None,
        }
    }
}

/// Total outflow for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpend {
    pub category: Option<String>,
    pub amount: f64,
    pub transaction_count: i64,
}

/// A transaction as returned by searches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub date: String,
    pub merchant: Option<String>,
    pub amount: f64,
    pub category: Option<String>,
}

/// Income and expenses for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyFlow {
    /// `YYYY-MM`.
    pub month: String,
    pub income: f64,
    pub expenses: f64,
}

/// Outflows of a similar size seen repeatedly at one merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringExpense {
    pub merchant: String,
    pub average_amount: f64,
    pub occurrences: i64,
    /// Distinct `YYYY-MM` months the charge appeared in, oldest first.
    pub months: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub category: String,
    pub monthly_limit: f64,
    pub is_active: bool,
    pub updated_at: String,
}

/// Holdings aggregated per investment account type and institution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingGroup {
    pub account_type: String,
    pub institution: Option<String>,
    pub value: f64,
    pub cost_basis: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentAccount {
    pub account_id: String,
    pub account_name: String,
    pub account_type: String,
    pub institution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHolding {
    pub account_id: String,
    pub symbol: String,
    pub name: Option<String>,
    pub quantity: f64,
    pub price: Option<f64>,
    pub current_value: f64,
    pub cost_basis: Option<f64>,
    pub asset_type: Option<String>,
}

/// One active holding with the name of the account holding it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingRow {
    pub account: String,
    pub symbol: String,
    pub name: Option<String>,
    pub quantity: f64,
    pub price: Option<f64>,
    pub current_value: f64,
    pub cost_basis: Option<f64>,
    pub asset_type: Option<String>,
}

/// A symbol summed across every account that holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopHolding {
    pub symbol: String,
    pub name: Option<String>,
    pub total_value: f64,
    pub total_quantity: f64,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTypeTotal {
    pub account_type: String,
    pub account_count: i64,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoWallet {
    pub wallet_id: String,
    pub address: String,
    pub label: Option<String>,
    pub chain: Option<String>,
}

/// A token balance held in a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoBalance {
    pub wallet_id: String,
    pub wallet: Option<String>,
    pub chain: String,
    pub symbol: String,
    pub name: Option<String>,
    pub balance: f64,
    pub value_usd: f64,
    pub last_updated: Option<String>,
}

/// A lending, liquidity, or staking position held by a wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefiPosition {
    pub position_id: String,
    pub wallet_id: String,
    /// Wallet label, filled in by reads.
    pub wallet: Option<String>,
    pub protocol: String,
    pub chain: String,
    pub position_type: Option<String>,
    pub balance_usd: f64,
    pub last_updated: Option<String>,
    pub details: Vec<DefiDetail>,
}

/// A token inside a DeFi position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefiDetail {
    /// `supplied`, `borrowed`, `claimable`, ...
    pub detail_type: String,
    pub symbol: String,
    pub name: Option<String>,
    pub balance: f64,
    pub value_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitcoinWallet {
    pub wallet_id: String,
    pub label: Option<String>,
    pub address: String,
    pub balance_btc: f64,
    pub balance_usd: f64,
    pub last_updated: Option<String>,
}

/// A stored document and the metadata extracted from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub filename: String,
    pub original_filename: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub document_type: Option<String>,
    pub provider: Option<String>,
    pub policy_number: Option<String>,
    pub extracted_text: Option<String>,
    pub summary: Option<String>,
    /// `YYYY-MM-DD`.
    pub effective_date: Option<String>,
    /// `YYYY-MM-DD`.
    pub expiration_date: Option<String>,
    /// Comma-separated.
    pub tags: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Metadata fields a document update may change. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub document_type: Option<String>,
    pub provider: Option<String>,
    pub policy_number: Option<String>,
    pub summary: Option<String>,
    pub effective_date: Option<String>,
    pub expiration_date: Option<String>,
    pub tags: Option<String>,
}

impl DocumentUpdate {
    /// `(column, value)` for every field that is set, in a fixed order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("document_type", &self.document_type),
            ("provider", &self.provider),
            ("policy_number", &self.policy_number),
            ("summary", &self.summary),
            ("effective_date", &self.effective_date),
            ("expiration_date", &self.expiration_date),
            ("tags", &self.tags),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
        .collect()
    }
}

/// A node in the memory graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: i64,
    pub name: String,
    pub entity_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub content: String,
    pub source: Option<String>,
    pub created_at: String,
}

/// An edge seen from one entity: the other end, the label, and its direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub entity: String,
    pub relation: String,
    /// `outgoing` or `incoming`.
    pub direction: String,
}

/// An entity with everything attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    #[serde(flatten)]
    pub entity: Entity,
    pub observations: Vec<Observation>,
    pub relations: Vec<Relation>,
}

/// An entity and the text of its observations, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMemories {
    pub name: String,
    pub entity_type: String,
    pub observations: Vec<String>,
}

/// Entity and observation hits for a memory search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMatches {
    /// `(name, entity_type)` pairs.
    pub entities: Vec<(String, String)>,
    /// `(entity name, observation)` pairs.
    pub observations: Vec<(String, String)>,
}
