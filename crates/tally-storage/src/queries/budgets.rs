// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Monthly budget limits, one per category.

use rusqlite::params;
use tally_core::TallyError;

use crate::database::{Database, map_tr_err, now_timestamp};
use crate::models::Budget;

/// Create or replace the active limit for `category`.
pub async fn set_budget(db: &Database, category: &str, monthly_limit: f64) -> Result<(), TallyError> {
    let category = category.to_string();
    let now = now_timestamp();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO budgets (category, monthly_limit, is_active, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?3)
                 ON CONFLICT(category) DO UPDATE SET
                    monthly_limit = excluded.monthly_limit,
                    is_active = 1,
                    updated_at = excluded.updated_at",
                params![category, monthly_limit, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All budgets ordered by category; inactive ones only when `include_inactive`.
pub async fn list_budgets(db: &Database, include_inactive: bool) -> Result<Vec<Budget>, TallyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT category, monthly_limit, is_active, updated_at
                 FROM budgets
                 WHERE is_active = 1 OR ?1
                 ORDER BY category",
            )?;
            let rows = stmt.query_map(params![include_inactive], |row| {
                Ok(Budget {
                    category: row.get(0)?,
                    monthly_limit: row.get(1)?,
                    is_active: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a budget. Returns whether a row was removed.
pub async fn delete_budget(db: &Database, category: &str) -> Result<bool, TallyError> {
    let category = category.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute("DELETE FROM budgets WHERE category = ?1", params![category])?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_is_an_upsert() {
        let db = Database::open_in_memory().await.unwrap();
        set_budget(&db, "Food", 400.0).await.unwrap();
        set_budget(&db, "Food", 450.0).await.unwrap();
        set_budget(&db, "Travel", 200.0).await.unwrap();
        let budgets = list_budgets(&db, false).await.unwrap();
        assert_eq!(budgets.len(), 2);
        assert_eq!(budgets[0].category, "Food");
        assert_eq!(budgets[0].monthly_limit, 450.0);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let db = Database::open_in_memory().await.unwrap();
        set_budget(&db, "Food", 400.0).await.unwrap();
        assert!(delete_budget(&db, "Food").await.unwrap());
        assert!(!delete_budget(&db, "Food").await.unwrap());
        assert!(list_budgets(&db, true).await.unwrap().is_empty());
    }
}
