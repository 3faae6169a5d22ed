// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temporary on-disk datastore with migrations applied and optional seed data.

use tempfile::TempDir;

use tally_core::TallyError;
use tally_storage::queries::{accounts, budgets, portfolio};
use tally_storage::{Account, Database, InvestmentAccount, NewHolding, NewTransaction};

/// A migrated SQLite database in a temporary directory.
///
/// The directory is removed when the value is dropped.
pub struct TestDatastore {
    db: Database,
    path: String,
    _dir: TempDir,
}

impl TestDatastore {
    /// An empty, migrated datastore.
    pub async fn new() -> Result<Self, TallyError> {
        let dir = tempfile::tempdir().map_err(TallyError::storage)?;
        let path = dir.path().join("tally.db").to_string_lossy().into_owned();
        let db = Database::open(&path, true).await?;
        Ok(Self {
            db,
            path,
            _dir: dir,
        })
    }

    /// A datastore with one checking, savings, and credit account, two months
    /// of transactions, a `Food` budget, and a small brokerage holding.
    pub async fn seeded() -> Result<Self, TallyError> {
        let store = Self::new().await?;
        store.seed().await?;
        Ok(store)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn seed(&self) -> Result<(), TallyError> {
        let account = |id: &str, name: &str, kind: &str, balance: f64| Account {
            account_id: id.into(),
            name: name.into(),
            account_type: kind.into(),
            institution: Some("First Local Bank".into()),
            current_balance: balance,
            available_balance: None,
            credit_limit: (kind == "credit").then_some(5000.0),
            updated_at: Some("2026-03-01T08:00:00.000Z".into()),
        };
        for a in [
            account("chk", "Everyday Checking", "checking", 2450.75),
            account("sav", "High Yield Savings", "savings", 12000.0),
            account("cc", "Rewards Card", "credit", -612.40),
        ] {
            accounts::upsert_account(&self.db, &a).await?;
        }

        let mut transfer =
            NewTransaction::manual("tx-07", "2026-02-20", -500.0, "To Savings", "Transfer");
        transfer.is_transfer = true;
        accounts::insert_transactions(
            &self.db,
            &[
                NewTransaction::manual("tx-01", "2026-01-02", 4200.0, "Acme Payroll", "Income:Salary"),
                NewTransaction::manual("tx-02", "2026-01-05", -1650.0, "Parkside Apartments", "Housing:Rent"),
                NewTransaction::manual("tx-03", "2026-01-12", -182.33, "Green Grocer", "Food:Groceries"),
                NewTransaction::manual("tx-04", "2026-02-02", 4200.0, "Acme Payroll", "Income:Salary"),
                NewTransaction::manual("tx-05", "2026-02-05", -1650.0, "Parkside Apartments", "Housing:Rent"),
                NewTransaction::manual("tx-06", "2026-02-14", -96.20, "Bistro Nine", "Food:Restaurants"),
                transfer,
            ],
        )
        .await?;

        budgets::set_budget(&self.db, "Food", 400.0).await?;

        portfolio::upsert_investment_account(
            &self.db,
            &InvestmentAccount {
                account_id: "brk".into(),
                account_name: "Brokerage".into(),
                account_type: "brokerage".into(),
                institution: Some("Index Brokers".into()),
            },
        )
        .await?;
        portfolio::insert_holding(
            &self.db,
            &NewHolding {
                account_id: "brk".into(),
                symbol: "VTI".into(),
                name: Some("Total Stock Market ETF".into()),
                quantity: 20.0,
                price: Some(250.0),
                current_value: 5000.0,
                cost_basis: Some(4200.0),
                asset_type: Some("etf".into()),
            },
        )
        .await?;
        Ok(())
    }
}
