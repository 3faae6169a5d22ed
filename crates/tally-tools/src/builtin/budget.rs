// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget tools: status against actual spending, limit management, and the
//! month-by-month trend.
//!
//! A budget on `Food` covers spending in `Food` and every `Food:...`
//! subcategory. Status is `warning` from 80% of the limit and `exceeded`
//! from 100%.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::TallyError;
use tally_storage::queries::{budgets, spending};
use tally_storage::{CategorySpend, Database};

use crate::builtin::spending::months_before;
use crate::tool::{Tool, parse_args, round2};

const WARNING_PCT: f64 = 80.0;
const EXCEEDED_PCT: f64 = 100.0;

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn covers(budget_category: &str, spend_category: &str) -> bool {
    spend_category == budget_category
        || spend_category
            .strip_prefix(budget_category)
            .is_some_and(|rest| rest.starts_with(':') || rest.starts_with(' '))
}

fn spent_on(budget_category: &str, outflows: &[CategorySpend]) -> f64 {
    outflows
        .iter()
        .filter(|o| {
            o.category
                .as_deref()
                .is_some_and(|c| covers(budget_category, c))
        })
        .map(|o| o.amount)
        .sum()
}

/// Budget vs. actual for one month.
pub struct GetBudgetStatus {
    db: Database,
}

impl GetBudgetStatus {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct StatusArgs {
    month: Option<String>,
}

#[async_trait]
impl Tool for GetBudgetStatus {
    fn name(&self) -> &str {
        "get_budget_status"
    }

    fn description(&self) -> &str {
        "Get budget vs actual spending for a month, with per-category status and alerts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "month": {
                    "type": "string",
                    "pattern": crate::MONTH_PATTERN,
                    "description": "Month in YYYY-MM format (default: current month)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: StatusArgs = parse_args(self.name(), arguments)?;
        let month = args.month.unwrap_or_else(crate::current_month);

        let limits = budgets::list_budgets(&self.db, false).await?;
        let outflows = spending::month_outflows(&self.db, &month).await?;

        let mut categories = Vec::with_capacity(limits.len());
        let mut alerts = Vec::new();
        let mut total_budget = 0.0;
        let mut total_spent = 0.0;

        for budget in &limits {
            let limit = budget.monthly_limit;
            let spent = spent_on(&budget.category, &outflows);
            let pct = if limit > 0.0 { spent / limit * 100.0 } else { 0.0 };
            let remaining = limit - spent;

            let status = if pct >= EXCEEDED_PCT {
                alerts.push(format!(
                    "{}: Exceeded by ${:.2}",
                    budget.category,
                    spent - limit
                ));
                "exceeded"
            } else if pct >= WARNING_PCT {
                alerts.push(format!(
                    "{}: {:.0}% used, ${:.2} remaining",
                    budget.category, pct, remaining
                ));
                "warning"
            } else {
                "on_track"
            };

            categories.push(json!({
                "category": budget.category,
                "budget": round2(limit),
                "spent": round2(spent),
                "remaining": round2(remaining),
                "percentage": round1(pct),
                "status": status,
            }));
            total_budget += limit;
            total_spent += spent;
        }

        let total_pct = if total_budget > 0.0 {
            total_spent / total_budget * 100.0
        } else {
            0.0
        };

        Ok(json!({
            "month": month,
            "categories": categories,
            "totals": {
                "budget": round2(total_budget),
                "spent": round2(total_spent),
                "remaining": round2(total_budget - total_spent),
                "percentage": round1(total_pct),
            },
            "alerts": alerts,
        }))
    }
}

/// Create or update a monthly limit.
pub struct SetBudget {
    db: Database,
}

impl SetBudget {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct SetArgs {
    category: String,
    monthly_limit: f64,
}

#[async_trait]
impl Tool for SetBudget {
    fn name(&self) -> &str {
        "set_budget"
    }

    fn description(&self) -> &str {
        "Set or update the monthly budget limit for a spending category."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Category name (should match transaction categories, e.g. Food or Food:Groceries)"
                },
                "monthly_limit": {
                    "type": "number",
                    "exclusiveMinimum": 0,
                    "description": "Monthly budget amount in dollars"
                }
            },
            "required": ["category", "monthly_limit"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: SetArgs = parse_args(self.name(), arguments)?;
        budgets::set_budget(&self.db, &args.category, args.monthly_limit).await?;
        Ok(json!({
            "success": true,
            "category": args.category,
            "monthly_limit": round2(args.monthly_limit),
        }))
    }
}

/// Every configured budget.
pub struct ListBudgets {
    db: Database,
}

impl ListBudgets {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default)]
    include_inactive: bool,
}

#[async_trait]
impl Tool for ListBudgets {
    fn name(&self) -> &str {
        "list_budgets"
    }

    fn description(&self) -> &str {
        "List all configured budgets and the total monthly budget."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_inactive": {
                    "type": "boolean",
                    "default": false,
                    "description": "Also list budgets that have been deactivated"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: ListArgs = parse_args(self.name(), arguments)?;
        let rows = budgets::list_budgets(&self.db, args.include_inactive).await?;
        let total: f64 = rows
            .iter()
            .filter(|b| b.is_active)
            .map(|b| b.monthly_limit)
            .sum();
        let listed: Vec<Value> = rows
            .iter()
            .map(|b| {
                json!({
                    "category": b.category,
                    "monthly_limit": round2(b.monthly_limit),
                    "is_active": b.is_active,
                    "last_updated": b.updated_at,
                })
            })
            .collect();

        Ok(json!({
            "budgets": listed,
            "total_monthly_budget": round2(total),
            "count": rows.len(),
        }))
    }
}

/// Remove a budget.
pub struct DeleteBudget {
    db: Database,
}

impl DeleteBudget {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct DeleteArgs {
    category: String,
}

#[async_trait]
impl Tool for DeleteBudget {
    fn name(&self) -> &str {
        "delete_budget"
    }

    fn description(&self) -> &str {
        "Delete the budget for a category."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "minLength": 1, "description": "Category to delete" }
            },
            "required": ["category"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<Value, TallyError> {
        let args: DeleteArgs = parse_args(self.name(), arguments)?;
        let deleted = budgets::delete_budget(&self.db, &args.category).await?;
        Ok(json!({
            "success": deleted,
            "deleted": if deleted { Some(args.category) } else { None },
        }))
    }
}

/// Total spending against the combined monthly budget, month by month.
pub struct GetSpendingVsBudgetTrend {
    db: Database,
}

impl GetSpendingVsBudgetTrend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[derive(Deserialize)]
struct TrendArgs {
    #[serde(default = "default_trend_months")]
    months: u32,
    through: Option<String>,
}

fn default_trend_months() -> u32 {
    6
}

#[async_trait]
impl Tool for GetSpendingVsBudgetTrend {
    fn name(&self) -> &str {
        "get_spending_vs_budget_trend"
    }

    fn description(&self) -> &str {
        "Compare total monthly spending against the total of all active budgets over recent months."
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
        let args: TrendArgs = parse_args(self.name(), arguments)?;
        let through = args.through.unwrap_or_else(crate::current_month);
        let from = months_before(&through, args.months.saturating_sub(1)).ok_or_else(|| {
            TallyError::ToolValidation {
                tool: self.name().to_string(),
                message: format!("`{through}` is not a YYYY-MM month"),
            }
        })?;

        let monthly_budget: f64 = budgets::list_budgets(&self.db, false)
            .await?
            .iter()
            .map(|b| b.monthly_limit)
            .sum();
        let totals = spending::monthly_outflow_totals(&self.db, &from, &through).await?;

        let trend: Vec<Value> = totals
            .iter()
            .map(|(month, spent)| {
                let pct = if monthly_budget > 0.0 {
                    spent / monthly_budget * 100.0
                } else {
                    0.0
                };
                json!({
                    "month": month,
                    "budget": round2(monthly_budget),
                    "spent": round2(*spent),
                    "percentage": round1(pct),
                    "under_budget": *spent <= monthly_budget,
                })
            })
            .collect();

        Ok(json!({
            "monthly_budget": round2(monthly_budget),
            "trend": trend,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_storage::NewTransaction;
    use tally_storage::queries::accounts::insert_transactions;

    #[test]
    fn prefix_matching_respects_separators() {
        assert!(covers("Food", "Food"));
        assert!(covers("Food", "Food:Groceries"));
        assert!(covers("Food", "Food & Drink"));
        assert!(!covers("Food", "Foodie Club"));
        assert!(!covers("Food:Groceries", "Food"));
    }

    async fn seeded() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        insert_transactions(
            &db,
            &[
                NewTransaction::manual("t1", "2026-03-02", -300.0, "Grocer", "Food:Groceries"),
                NewTransaction::manual("t2", "2026-03-03", -150.0, "Diner", "Food:Restaurants"),
                NewTransaction::manual("t3", "2026-03-04", -85.0, "Cinema", "Entertainment"),
                NewTransaction::manual("t4", "2026-03-05", -40.0, "Bus", "Transport"),
                NewTransaction::manual("t5", "2026-02-05", -999.0, "Grocer", "Food:Groceries"),
            ],
        )
        .await
        .unwrap();
        budgets::set_budget(&db, "Food", 400.0).await.unwrap();
        budgets::set_budget(&db, "Entertainment", 100.0).await.unwrap();
        budgets::set_budget(&db, "Transport", 200.0).await.unwrap();
        db
    }

    #[tokio::test]
    async fn status_classifies_each_budget() {
        let tool = GetBudgetStatus::new(seeded().await);
        let out = tool.invoke(json!({"month": "2026-03"})).await.unwrap();
        let cats = out["categories"].as_array().unwrap();
        assert_eq!(cats.len(), 3);

        assert_eq!(cats[0]["category"], "Entertainment");
        assert_eq!(cats[0]["status"], "warning");
        assert_eq!(cats[0]["percentage"], 85.0);
        assert_eq!(cats[1]["category"], "Food");
        assert_eq!(cats[1]["spent"], 450.0);
        assert_eq!(cats[1]["status"], "exceeded");
        assert_eq!(cats[2]["status"], "on_track");

        assert_eq!(out["totals"]["budget"], 700.0);
        assert_eq!(out["totals"]["spent"], 575.0);
        let alerts = out["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[1], "Food: Exceeded by $50.00");
    }

    #[tokio::test]
    async fn set_list_delete_cycle() {
        let db = Database::open_in_memory().await.unwrap();
        SetBudget::new(db.clone())
            .invoke(json!({"category": "Travel", "monthly_limit": 250.0}))
            .await
            .unwrap();
        let listed = ListBudgets::new(db.clone()).invoke(json!({})).await.unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["total_monthly_budget"], 250.0);

        let deleted = DeleteBudget::new(db.clone())
            .invoke(json!({"category": "Travel"}))
            .await
            .unwrap();
        assert_eq!(deleted["success"], true);
        let again = DeleteBudget::new(db)
            .invoke(json!({"category": "Travel"}))
            .await
            .unwrap();
        assert_eq!(again["success"], false);
        assert_eq!(again["deleted"], Value::Null);
    }

    #[tokio::test]
    async fn trend_compares_each_month_to_the_total_budget() {
        let tool = GetSpendingVsBudgetTrend::new(seeded().await);
        let out = tool
            .invoke(json!({"months": 2, "through": "2026-03"}))
            .await
            .unwrap();
        assert_eq!(out["monthly_budget"], 700.0);
        let trend = out["trend"].as_array().unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0]["month"], "2026-03");
        assert_eq!(trend[0]["spent"], 575.0);
        assert_eq!(trend[0]["under_budget"], true);
        assert_eq!(trend[1]["percentage"], 142.7);
        assert_eq!(trend[1]["under_budget"], false);
    }
}
