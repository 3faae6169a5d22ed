// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spending aggregation over the `transactions` table.
//!
//! Duplicates and transfers never count as spending or income.

use rusqlite::params;
use tally_core::TallyError;

use crate::database::{Database, map_tr_err};
use crate::models::{CategorySpend, MonthlyFlow, RecurringExpense, TransactionRow};

/// A calendar filter on transaction dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    All,
    /// `YYYY`.
    Year(String),
    /// `YYYY-MM`.
    Month(String),
}

impl Period {
    fn clause(&self) -> (&'static str, Option<String>) {
        match self {
            Self::All => ("", None),
            Self::Year(y) => ("AND strftime('%Y', date) = ?1", Some(y.clone())),
            Self::Month(m) => ("AND strftime('%Y-%m', date) = ?1", Some(m.clone())),
        }
    }

    /// Label used in tool output.
    pub fn label(&self) -> String {
        match self {
            Self::All => "all time".to_string(),
            Self::Year(y) => y.clone(),
            Self::Month(m) => m.clone(),
        }
    }
}

const TOP_LEVEL_CATEGORY: &str = "CASE WHEN INSTR(category_normalized, ':') > 0 \
     THEN SUBSTR(category_normalized, 1, INSTR(category_normalized, ':') - 1) \
     ELSE category_normalized END";

/// Outflows grouped by category, largest first.
///
/// Transfer, investment, and crypto categories are excluded. With
/// `top_level_only`, `Food:Groceries` rolls up into `Food`.
pub async fn spending_by_category(
    db: &Database,
    period: &Period,
    top_level_only: bool,
    limit: u32,
) -> Result<Vec<CategorySpend>, TallyError> {
    let (date_filter, date_param) = period.clause();
    let category_expr = if top_level_only {
        TOP_LEVEL_CATEGORY
    } else {
        "category_normalized"
    };
    let sql = format!(
        "SELECT {category_expr} AS category, SUM(ABS(amount)) AS total, COUNT(*)
         FROM transactions
         WHERE amount < 0
           AND is_duplicate = 0
           AND is_transfer = 0
           AND COALESCE(category_normalized, '') NOT LIKE '%Transfer%'
           AND COALESCE(category_normalized, '') NOT LIKE '%Investment%'
           AND COALESCE(category_normalized, '') NOT LIKE '%Cryptocurrency%'
           {date_filter}
         GROUP BY {category_expr}
         ORDER BY total DESC, category ASC
         LIMIT {limit}"
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let map = |row: &rusqlite::Row<'_>| {
                Ok(CategorySpend {
                    category: row.get(0)?,
                    amount: row.get(1)?,
                    transaction_count: row.get(2)?,
                })
            };
            match date_param {
                Some(p) => stmt.query_map(params![p], map)?.collect::<Result<Vec<_>, _>>(),
                None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>(),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Raw outflow per category for one month, used for budget tracking.
pub async fn month_outflows(db: &Database, month: &str) -> Result<Vec<CategorySpend>, TallyError> {
    let month = month.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT category_normalized, SUM(ABS(amount)), COUNT(*)
                 FROM transactions
                 WHERE strftime('%Y-%m', date) = ?1
                   AND amount < 0
                   AND is_duplicate = 0
                   AND is_transfer = 0
                 GROUP BY category_normalized
                 ORDER BY category_normalized",
            )?;
            let rows = stmt.query_map(params![month], |row| {
                Ok(CategorySpend {
                    category: row.get(0)?,
                    amount: row.get(1)?,
                    transaction_count: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Transactions whose merchant or description contains `term`, newest first.
pub async fn search_transactions(
    db: &Database,
    term: &str,
    limit: u32,
) -> Result<Vec<TransactionRow>, TallyError> {
    let pattern = format!("%{term}%");
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, COALESCE(merchant_name, description), amount, category_normalized
                 FROM transactions
                 WHERE (merchant_name LIKE ?1 OR description LIKE ?1)
                   AND is_duplicate = 0
                 ORDER BY date DESC, transaction_id
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![pattern, limit], |row| {
                Ok(TransactionRow {
                    date: row.get(0)?,
                    merchant: row.get(1)?,
                    amount: row.get(2)?,
                    category: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Income and expenses per month in `[from_month, through_month]`, newest first.
pub async fn monthly_cash_flow(
    db: &Database,
    from_month: &str,
    through_month: &str,
) -> Result<Vec<MonthlyFlow>, TallyError> {
    let from = from_month.to_string();
    let through = through_month.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT strftime('%Y-%m', date) AS month,
                        SUM(CASE WHEN amount > 0 THEN amount ELSE 0 END),
                        SUM(CASE WHEN amount < 0 THEN ABS(amount) ELSE 0 END)
                 FROM transactions
                 WHERE strftime('%Y-%m', date) BETWEEN ?1 AND ?2
                   AND is_duplicate = 0
                   AND is_transfer = 0
                 GROUP BY month
                 ORDER BY month DESC",
            )?;
            let rows = stmt.query_map(params![from, through], |row| {
                Ok(MonthlyFlow {
                    month: row.get(0)?,
                    income: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    expenses: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Spending per month in `[from_month, through_month]`, newest first.
///
/// Same exclusions as [`spending_by_category`] minus the crypto rule, so
/// totals line up with budget limits.
pub async fn monthly_outflow_totals(
    db: &Database,
    from_month: &str,
    through_month: &str,
) -> Result<Vec<(String, f64)>, TallyError> {
    let from = from_month.to_string();
    let through = through_month.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT strftime('%Y-%m', date) AS month, SUM(ABS(amount))
                 FROM transactions
                 WHERE strftime('%Y-%m', date) BETWEEN ?1 AND ?2
                   AND amount < 0
                   AND is_duplicate = 0
                   AND is_transfer = 0
                   AND COALESCE(category_normalized, '') NOT LIKE '%Transfer%'
                   AND COALESCE(category_normalized, '') NOT LIKE '%Investment%'
                 GROUP BY month
                 ORDER BY month DESC",
            )?;
            let rows = stmt.query_map(params![from, through], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Charges that repeat at the same merchant for roughly the same amount
/// (rounded to the dollar) on or after `since` (`YYYY-MM-DD`).
///
/// Groups seen fewer than `min_occurrences` times are dropped. Largest
/// average charge first.
pub async fn recurring_expenses(
    db: &Database,
    since: &str,
    min_occurrences: u32,
) -> Result<Vec<RecurringExpense>, TallyError> {
    let since = since.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT COALESCE(merchant_name, description) AS merchant,
                        AVG(ABS(amount)) AS average,
                        COUNT(*),
                        GROUP_CONCAT(DISTINCT strftime('%Y-%m', date))
                 FROM transactions
                 WHERE date >= ?1
                   AND amount < 0
                   AND is_duplicate = 0
                   AND is_transfer = 0
                   AND COALESCE(merchant_name, description) IS NOT NULL
                 GROUP BY merchant, ROUND(ABS(amount), 0)
                 HAVING COUNT(*) >= ?2
                 ORDER BY average DESC, merchant",
            )?;
            let rows = stmt.query_map(params![since, min_occurrences], |row| {
                let months: Option<String> = row.get(3)?;
                let mut months: Vec<String> = months
                    .unwrap_or_default()
                    .split(',')
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect();
                months.sort_unstable();
                Ok(RecurringExpense {
                    merchant: row.get(0)?,
                    average_amount: row.get(1)?,
                    occurrences: row.get(2)?,
                    months,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Inflows on or after `since` (`YYYY-MM-DD`), newest first.
pub async fn deposits(db: &Database, since: &str, limit: u32) -> Result<Vec<TransactionRow>, TallyError> {
    let since = since.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, COALESCE(merchant_name, description), amount, category_normalized
                 FROM transactions
                 WHERE date >= ?1
                   AND amount > 0
                   AND is_duplicate = 0
                   AND is_transfer = 0
                 ORDER BY date DESC, transaction_id
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![since, limit], |row| {
                Ok(TransactionRow {
                    date: row.get(0)?,
                    merchant: row.get(1)?,
                    amount: row.get(2)?,
                    category: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransaction;
    use crate::queries::accounts::insert_transactions;

    async fn seeded() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let mut transfer = NewTransaction::manual("t4", "2026-02-03", -500.0, "Savings", "Transfer");
        transfer.is_transfer = true;
        let mut dup = NewTransaction::manual("t5", "2026-02-04", -80.0, "Grocer", "Food:Groceries");
        dup.is_duplicate = true;
        insert_transactions(
            &db,
            &[
                NewTransaction::manual("t1", "2026-02-01", -80.0, "Grocer", "Food:Groceries"),
                NewTransaction::manual("t2", "2026-02-02", -20.0, "Cafe", "Food:Coffee"),
                NewTransaction::manual("t3", "2026-01-15", -60.0, "Gas Co", "Utilities"),
                transfer,
                dup,
                NewTransaction::manual("t6", "2026-02-01", 3000.0, "Employer", "Income"),
            ],
        )
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn category_totals_skip_transfers_and_duplicates() {
        let db = seeded().await;
        let rows = spending_by_category(&db, &Period::Month("2026-02".into()), false, 15)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].category.as_deref(), Some("Food:Groceries"));
        assert_eq!(rows[0].amount, 80.0);
    }

    #[tokio::test]
    async fn top_level_rollup() {
        let db = seeded().await;
        let rows = spending_by_category(&db, &Period::All, true, 15).await.unwrap();
        assert_eq!(rows[0].category.as_deref(), Some("Food"));
        assert_eq!(rows[0].amount, 100.0);
        assert_eq!(rows[0].transaction_count, 2);
    }

    #[tokio::test]
    async fn search_matches_merchant_substring() {
        let db = seeded().await;
        let rows = search_transactions(&db, "groc", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merchant.as_deref(), Some("Grocer"));
    }

    #[tokio::test]
    async fn cash_flow_by_month() {
        let db = seeded().await;
        let flows = monthly_cash_flow(&db, "2026-01", "2026-02").await.unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].month, "2026-02");
        assert_eq!(flows[0].income, 3000.0);
        assert_eq!(flows[0].expenses, 100.0);
        assert_eq!(flows[1].expenses, 60.0);
    }

    #[tokio::test]
    async fn outflow_totals_skip_transfer_categories() {
        let db = seeded().await;
        let totals = monthly_outflow_totals(&db, "2026-01", "2026-02").await.unwrap();
        assert_eq!(totals, vec![("2026-02".to_string(), 100.0), ("2026-01".to_string(), 60.0)]);
    }

    #[tokio::test]
    async fn recurring_charges_group_by_rounded_amount() {
        let db = Database::open_in_memory().await.unwrap();
        insert_transactions(
            &db,
            &[
                NewTransaction::manual("s1", "2026-01-03", -15.49, "StreamFlix", "Entertainment"),
                NewTransaction::manual("s2", "2026-02-03", -15.49, "StreamFlix", "Entertainment"),
                NewTransaction::manual("s3", "2026-03-03", -15.29, "StreamFlix", "Entertainment"),
                NewTransaction::manual("g1", "2026-02-10", -15.49, "Grocer", "Food"),
                NewTransaction::manual("g2", "2026-03-10", -92.10, "Grocer", "Food"),
                NewTransaction::manual("old", "2025-06-03", -15.49, "StreamFlix", "Entertainment"),
            ],
        )
        .await
        .unwrap();
        let rows = recurring_expenses(&db, "2026-01-01", 3).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merchant, "StreamFlix");
        assert_eq!(rows[0].occurrences, 3);
        assert_eq!(rows[0].months, vec!["2026-01", "2026-02", "2026-03"]);
    }

    #[tokio::test]
    async fn deposits_are_inflows_only() {
        let db = seeded().await;
        let rows = deposits(&db, "2026-01-01", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merchant.as_deref(), Some("Employer"));
        assert!(deposits(&db, "2026-03-01", 10).await.unwrap().is_empty());
    }
}
