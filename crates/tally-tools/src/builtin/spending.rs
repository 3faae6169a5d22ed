// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spending breakdowns, transaction search, monthly cash flow, recurring
//! charges, and deposits.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::TallyError;
use tally_storage::Database;
use tally_storage::queries::spending::{self, Period};

use crate::tool::{Tool, parse_args, round2};

/// Outflows grouped by category, optionally filtered to a year or month.
pub struct GetSpendingByCategory {
    db: Database,
}

impl GetSpendingByCategory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct SpendingArgs {
    year: Option<i32>,
    month: Option<u32>,
    #[serde(default)]
    top_level_only: bool,
    #[serde(default = "default_category_limit")]
    limit: u32,
}

fn default_category_limit() -> u32 {
    15
}

#[async_trait]
impl Tool for GetSpendingByCategory {
    fn name(&self) -> &str {
        "get_spending_by_category"
    }

    fn description(&self) -> &str {
        "Get spending breakdown by category. Can filter by year and/or month. Returns categories sorted by amount spent."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "year": {
                    "type": "integer",
                    "minimum": 1900,
                    "maximum": 2200,
                    "description": "Filter to specific year (e.g., 2024)"
                },
                "month": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 12,
                    "description": "Filter to specific month 1-12 (requires year)"
                },
                "top_level_only": {
                    "type": "boolean",
                    "default": false,
                    "description": "If true, roll subcategories up into their top-level category"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 100,
                    "default": 15,
                    "description": "Maximum categories to return"
                }
            },
            "dependentRequired": { "month": ["year"] },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: SpendingArgs = parse_args(self.name(), arguments)?;
        let period = match (args.year, args.month) {
            (Some(year), Some(month)) => Period::Month(format!("{year:04}-{month:02}")),
            (Some(year), None) => Period::Year(format!("{year:04}")),
            (None, None) => Period::All,
            (None, Some(_)) => {
                return Err(TallyError::ToolValidation {
                    tool: self.name().to_string(),
                    message: "month requires year".into(),
                });
            }
        };

        let rows =
            spending::spending_by_category(&self.db, &period, args.top_level_only, args.limit)
                .await?;
        let total: f64 = rows.iter().map(|r| r.amount).sum();
        let categories: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "category": r.category.as_deref().unwrap_or("Uncategorized"),
                    "amount": round2(r.amount),
                    "transaction_count": r.transaction_count,
                })
            })
            .collect();

        Ok(json!({
            "categories": categories,
            "total_spending": round2(total),
            "period": period.label(),
        }))
    }
}

/// Transactions matching a merchant or description substring.
pub struct SearchTransactions {
    db: Database,
}

impl SearchTransactions {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    merchant: String,
    #[serde(default = "default_search_limit")]
    limit: u32,
}

fn default_search_limit() -> u32 {
    20
}

#[async_trait]
impl Tool for SearchTransactions {
    fn name(&self) -> &str {
        "search_transactions"
    }

    fn description(&self) -> &str {
        "Search transactions by merchant name or description."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "merchant": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Search term to match against merchant/description"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 200,
                    "default": 20,
                    "description": "Maximum results to return"
                }
            },
            "required": ["merchant"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: SearchArgs = parse_args(self.name(), arguments)?;
        let rows = spending::search_transactions(&self.db, &args.merchant, args.limit).await?;
        Ok(json!({
            "search_term": args.merchant,
            "count": rows.len(),
            "transactions": rows,
        }))
    }
}

/// Income, expenses, net, and savings rate per month.
pub struct GetMonthlyCashFlow {
    db: Database,
}

impl GetMonthlyCashFlow {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct CashFlowArgs {
    #[serde(default = "default_months")]
    months: u32,
    through: Option<String>,
}

fn default_months() -> u32 {
    6
}

#[async_trait]
impl Tool for GetMonthlyCashFlow {
    fn name(&self) -> &str {
        "get_monthly_cash_flow"
    }

    fn description(&self) -> &str {
        "Get monthly income, expenses, net, and savings rate for recent months."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "months": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 36,
                    "default": 6,
                    "description": "Number of months to analyze"
                },
                "through": {
                    "type": "string",
                    "pattern": crate::MONTH_PATTERN,
                    "description": "Last month to include, YYYY-MM (default: current month)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: CashFlowArgs = parse_args(self.name(), arguments)?;
        let through = args.through.unwrap_or_else(crate::current_month);
        let from = months_before(&through, args.months.saturating_sub(1)).ok_or_else(|| {
            TallyError::ToolValidation {
                tool: self.name().to_string(),
                message: format!("`{through}` is not a YYYY-MM month"),
            }
        })?;

        let rows = spending::monthly_cash_flow(&self.db, &from, &through).await?;
        let data: Vec<Value> = rows
            .iter()
            .map(|r| {
                let net = r.income - r.expenses;
                let savings_rate = if r.income > 0.0 {
                    net / r.income * 100.0
                } else {
                    0.0
                };
                json!({
                    "month": r.month,
                    "income": round2(r.income),
                    "expenses": round2(r.expenses),
                    "net": round2(net),
                    "savings_rate": (savings_rate * 10.0).round() / 10.0,
                })
            })
            .collect();

        Ok(json!({
            "months_analyzed": args.months,
            "from": from,
            "through": through,
            "data": data,
        }))
    }
}

/// Subscriptions and bills: the same merchant charging about the same
/// amount again and again.
pub struct DetectRecurringExpenses {
    db: Database,
}

impl DetectRecurringExpenses {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct RecurringArgs {
    #[serde(default = "default_months")]
    months: u32,
    #[serde(default = "default_min_occurrences")]
    min_occurrences: u32,
}

fn default_min_occurrences() -> u32 {
    3
}

#[async_trait]
impl Tool for DetectRecurringExpenses {
    fn name(&self) -> &str {
        "detect_recurring_expenses"
    }

    fn description(&self) -> &str {
        "Detect recurring charges such as subscriptions and bills, with an estimated monthly total."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "months": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 36,
                    "default": 6,
                    "description": "How many months of history to scan"
                },
                "min_occurrences": {
                    "type": "integer",
                    "minimum": 2,
                    "maximum": 36,
                    "default": 3,
                    "description": "Minimum number of charges to count as recurring"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: RecurringArgs = parse_args(self.name(), arguments)?;
        let since = crate::days_ago(args.months * 30);
        let rows = spending::recurring_expenses(&self.db, &since, args.min_occurrences).await?;

        // One charge per month is the working assumption for the estimate.
        let estimated: f64 = rows.iter().map(|r| r.average_amount).sum();
        let expenses: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "merchant": r.merchant,
                    "amount": round2(r.average_amount),
                    "frequency": r.occurrences,
                    "months": r.months,
                })
            })
            .collect();

        Ok(json!({
            "recurring_expenses": expenses,
            "estimated_monthly_total": round2(estimated),
            "months_analyzed": args.months,
        }))
    }
}

/// Recent income deposits.
pub struct GetDeposits {
    db: Database,
}

impl GetDeposits {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct DepositArgs {
    #[serde(default = "default_deposit_months")]
    months: u32,
    #[serde(default = "default_deposit_limit")]
    limit: u32,
}

fn default_deposit_months() -> u32 {
    4
}

fn default_deposit_limit() -> u32 {
    30
}

#[async_trait]
impl Tool for GetDeposits {
    fn name(&self) -> &str {
        "get_deposits"
    }

    fn description(&self) -> &str {
        "Get recent deposits and other incoming money, newest first. Transfers between own accounts are excluded."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "months": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 36,
                    "default": 4,
                    "description": "How many months back to look"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 200,
                    "default": 30,
                    "description": "Maximum deposits to return"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: DepositArgs = parse_args(self.name(), arguments)?;
        let since = crate::days_ago(args.months * 30);
        let rows = spending::deposits(&self.db, &since, args.limit).await?;
        let deposits: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "date": r.date,
                    "source": r.merchant,
                    "amount": round2(r.amount),
                    "category": r.category,
                })
            })
            .collect();
        Ok(json!({
            "deposits": deposits,
            "count": deposits.len(),
        }))
    }
}

/// The month `n` months before `month` (both `YYYY-MM`).
pub(crate) fn months_before(month: &str, n: u32) -> Option<String> {
    let (year, mon) = month.split_once('-')?;
    let year: i64 = year.parse().ok()?;
    let mon: i64 = mon.parse().ok()?;
    if !(1..=12).contains(&mon) {
        return None;
    }
    let index = year * 12 + (mon - 1) - i64::from(n);
    Some(format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1))
}
