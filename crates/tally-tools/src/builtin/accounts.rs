// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bank account balances and the accounts linked through the aggregator.

use async_trait::async_trait;
use serde_json::{Value, json};
use tally_core::TallyError;
use tally_storage::Database;
use tally_storage::queries::accounts;

use crate::tool::{Tool, round2};

/// Current balances of every active linked account, with checking,
/// savings, and credit totals.
pub struct GetBankBalances {
    db: Database,
}

impl GetBankBalances {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for GetBankBalances {
    fn name(&self) -> &str {
        "get_bank_balances"
    }

    fn description(&self) -> &str {
        "Get current balances from all linked bank and credit accounts, with checking, savings, and credit totals."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let rows = accounts::list_active_accounts(&self.db).await?;

        let mut checking = 0.0;
        let mut savings = 0.0;
        let mut credit = 0.0;
        let mut available = 0.0;
        let mut listed = Vec::with_capacity(rows.len());

        for account in &rows {
            let kind = account.account_type.to_lowercase();
            if kind.contains("checking") {
                checking += account.current_balance;
                available += account.available_balance.unwrap_or(account.current_balance);
            } else if kind.contains("saving") {
                savings += account.current_balance;
            } else if kind.contains("credit") {
                credit += account.current_balance;
            }

            listed.push(json!({
                "name": account.name,
                "type": account.account_type,
                "institution": account.institution,
                "balance": account.current_balance,
                "available": account.available_balance,
                "credit_limit": account.credit_limit,
                "last_updated": account.updated_at,
            }));
        }

        Ok(json!({
            "accounts": listed,
            "summary": {
                "checking": round2(checking),
                "savings": round2(savings),
                "credit_used": round2(credit.abs()),
                "total_available": round2(available),
            }
        }))
    }
}

pub struct ListLinkedAccounts {
    db: Database,
}

impl ListLinkedAccounts {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Tool for ListLinkedAccounts {
    fn name(&self) -> &str {
        "list_linked_accounts"
    }

    fn description(&self) -> &str {
        "List bank and card accounts linked through the bank aggregator, with balances and account masks."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, TallyError> {
        let rows = accounts::list_linked_accounts(&self.db).await?;
        let listed: Vec<Value> = rows
            .iter()
            .map(|a| {
                json!({
                    "account_id": a.account_id,
                    "name": a.name,
                    "type": a.account_type,
                    "institution": a.institution,
                    "balance": a.current_balance,
                    "mask": a.mask,
                })
            })
            .collect();
        Ok(json!({
            "accounts": listed,
            "count": listed.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_storage::Account;

    fn account(id: &str, kind: &str, balance: f64, available: Option<f64>) -> Account {
        Account {
            account_id: id.into(),
            name: format!("{kind} {id}"),
            account_type: kind.into(),
            institution: Some("First Bank".into()),
            current_balance: balance,
            available_balance: available,
            credit_limit: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn summary_totals_by_account_kind() {
        let db = Database::open_in_memory().await.unwrap();
        for a in [
            account("a1", "checking", 1200.50, Some(1100.0)),
            account("a2", "checking", 300.0, None),
            account("a3", "savings", 5000.0, None),
            account("a4", "credit", -450.25, None),
        ] {
            accounts::upsert_account(&db, &a).await.unwrap();
        }

        let out = GetBankBalances::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["accounts"].as_array().unwrap().len(), 4);
        assert_eq!(out["summary"]["checking"], 1500.5);
        assert_eq!(out["summary"]["savings"], 5000.0);
        assert_eq!(out["summary"]["credit_used"], 450.25);
        assert_eq!(out["summary"]["total_available"], 1400.0);
    }

    #[tokio::test]
    async fn empty_store_reports_zero() {
        let db = Database::open_in_memory().await.unwrap();
        let out = GetBankBalances::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["accounts"], json!([]));
        assert_eq!(out["summary"]["checking"], 0.0);
    }

    #[tokio::test]
    async fn linked_accounts_carry_their_mask() {
        let db = Database::open_in_memory().await.unwrap();
        accounts::upsert_account(&db, &account("a1", "checking", 50.0, None)).await.unwrap();
        accounts::upsert_account(&db, &account("a2", "savings", 75.0, None)).await.unwrap();
        accounts::link_account(&db, "a2", "item-9", Some("0042")).await.unwrap();

        let out = ListLinkedAccounts::new(db).invoke(json!({})).await.unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(out["accounts"][0]["mask"], "0042");
        assert_eq!(out["accounts"][0]["type"], "savings");
    }
}
