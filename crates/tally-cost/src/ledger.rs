// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage ledger persisting one record per conversation turn to SQLite.
//!
//! Records are append-only. The ledger answers daily, monthly, per-provider,
//! and per-conversation totals for the usage report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tally_core::{Complexity, ConversationId, TallyError, TokenUsage};
use tally_storage::Database;
use tracing::info;

use crate::recorder::UsageSink;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    Failed,
}

/// A single usage record describing one finished turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    pub conversation_id: String,
    /// Provider that produced the final answer, or the last one attempted.
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    /// Names of the tools invoked, in order.
    pub tool_calls: Vec<String>,
    pub outcome: TurnOutcome,
    /// Error code for failed turns.
    pub error_code: Option<String>,
    pub latency_ms: u64,
    pub complexity: Complexity,
    pub needs_tools: bool,
    /// ISO 8601 timestamp.
    pub created_at: String,
}

impl UsageRecord {
    /// Start a record for a turn; timestamps and id are assigned now.
    pub fn new(
        conversation_id: &ConversationId,
        provider: impl Into<String>,
        model: impl Into<String>,
        usage: TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            provider: provider.into(),
            model: model.into(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            tool_calls: Vec::new(),
            outcome: TurnOutcome::Completed,
            error_code: None,
            latency_ms: 0,
            complexity: Complexity::Moderate,
            needs_tools: false,
            created_at: tally_storage::now_timestamp(),
        }
    }
}

/// Spend attributed to one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub provider: String,
    pub turns: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TallyError {
    TallyError::storage(e)
}

/// Persistent usage ledger backed by the `usage_records` table.
#[derive(Debug, Clone)]
pub struct SqliteUsageLedger {
    db: Database,
}

impl SqliteUsageLedger {
    /// Create a ledger on an open database (the table comes from storage migrations).
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert one record.
    pub async fn insert(&self, record: &UsageRecord) -> Result<(), TallyError> {
        let r = record.clone();
        let tool_calls = serde_json::to_string(&r.tool_calls).map_err(TallyError::storage)?;
        let latency_ms = i64::try_from(r.latency_ms).unwrap_or(i64::MAX);

        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO usage_records (id, conversation_id, provider, model, \
                     input_tokens, output_tokens, cost_usd, tool_calls, outcome, error_code, \
                     latency_ms, complexity, needs_tools, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    rusqlite::params![
                        r.id,
                        r.conversation_id,
                        r.provider,
                        r.model,
                        r.input_tokens,
                        r.output_tokens,
                        r.cost_usd,
                        tool_calls,
                        r.outcome.to_string(),
                        r.error_code,
                        latency_ms,
                        r.complexity.to_string(),
                        r.needs_tools,
                        r.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        info!(
            conversation_id = %record.conversation_id,
            provider = %record.provider,
            model = %record.model,
            input_tokens = record.input_tokens,
            output_tokens = record.output_tokens,
            cost_usd = record.cost_usd,
            outcome = %record.outcome,
            "usage recorded"
        );
        Ok(())
    }

    /// Sum of costs for a date (e.g. "2026-03-01").
    pub async fn daily_total(&self, date: &str) -> Result<f64, TallyError> {
        let date = date.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_records \
                     WHERE created_at >= ?1 AND created_at < date(?1, '+1 day')",
                    rusqlite::params![date],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sum of costs for a year-month (e.g. "2026-03").
    pub async fn monthly_total(&self, year_month: &str) -> Result<f64, TallyError> {
        let prefix = format!("{year_month}%");
        self.db
            .connection()
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_records \
                     WHERE created_at LIKE ?1",
                    rusqlite::params![prefix],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Per-provider turns, tokens, and cost for a date, most expensive first.
    pub async fn provider_breakdown(&self, date: &str) -> Result<Vec<ProviderUsage>, TallyError> {
        let date = date.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT provider, COUNT(*), COALESCE(SUM(input_tokens), 0), \
                     COALESCE(SUM(output_tokens), 0), COALESCE(SUM(cost_usd), 0.0) \
                     FROM usage_records \
                     WHERE created_at >= ?1 AND created_at < date(?1, '+1 day') \
                     GROUP BY provider \
                     ORDER BY SUM(cost_usd) DESC, provider ASC",
                )?;
                let rows = stmt.query_map(rusqlite::params![date], |row| {
                    Ok(ProviderUsage {
                        provider: row.get(0)?,
                        turns: row.get(1)?,
                        input_tokens: row.get(2)?,
                        output_tokens: row.get(3)?,
                        cost_usd: row.get(4)?,
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Sum of costs for a conversation.
    pub async fn conversation_total(&self, conversation_id: &str) -> Result<f64, TallyError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_records \
                     WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Number of records for a conversation.
    pub async fn conversation_turns(&self, conversation_id: &str) -> Result<u64, TallyError> {
        let conversation_id = conversation_id.to_string();
        self.db
            .connection()
            .call(move |conn| {
                let count: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM usage_records WHERE conversation_id = ?1",
                    rusqlite::params![conversation_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl UsageSink for SqliteUsageLedger {
    async fn write(&self, record: &UsageRecord) -> Result<(), TallyError> {
        self.insert(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(conversation: &str, provider: &str, cost_usd: f64, created_at: &str) -> UsageRecord {
        let mut record = UsageRecord::new(
            &ConversationId::from(conversation),
            provider,
            "model-x",
            TokenUsage {
                input_tokens: 1000,
                output_tokens: 500,
            },
            cost_usd,
        );
        record.created_at = created_at.to_string();
        record
    }

    async fn ledger() -> SqliteUsageLedger {
        SqliteUsageLedger::new(Database::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn daily_total_sums_one_day() {
        let ledger = ledger().await;
        ledger.insert(&sample("c1", "anthropic", 1.50, "2026-03-01T10:00:00.000Z")).await.unwrap();
        ledger.insert(&sample("c1", "anthropic", 0.75, "2026-03-01T23:59:00.000Z")).await.unwrap();
        ledger.insert(&sample("c1", "anthropic", 9.00, "2026-03-02T00:00:01.000Z")).await.unwrap();

        let total = ledger.daily_total("2026-03-01").await.unwrap();
        assert!((total - 2.25).abs() < 1e-10, "expected 2.25, got {total}");
    }

    #[tokio::test]
    async fn monthly_total_sums_month() {
        let ledger = ledger().await;
        ledger.insert(&sample("c1", "openai", 2.0, "2026-03-01T10:00:00.000Z")).await.unwrap();
        ledger.insert(&sample("c2", "openai", 3.0, "2026-03-15T10:00:00.000Z")).await.unwrap();
        ledger.insert(&sample("c2", "openai", 7.0, "2026-04-01T10:00:00.000Z")).await.unwrap();

        let total = ledger.monthly_total("2026-03").await.unwrap();
        assert!((total - 5.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn breakdown_groups_by_provider() {
        let ledger = ledger().await;
        let day = "2026-03-01T10:00:00.000Z";
        ledger.insert(&sample("c1", "anthropic", 0.5, day)).await.unwrap();
        ledger.insert(&sample("c1", "anthropic", 0.5, day)).await.unwrap();
        ledger.insert(&sample("c1", "ollama", 0.0, day)).await.unwrap();

        let rows = ledger.provider_breakdown("2026-03-01").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].provider, "anthropic");
        assert_eq!(rows[0].turns, 2);
        assert_eq!(rows[0].input_tokens, 2000);
        assert_eq!(rows[1].provider, "ollama");
    }

    #[tokio::test]
    async fn conversation_totals() {
        let ledger = ledger().await;
        let mut failed = sample("c9", "openai", 0.25, "2026-03-01T10:00:00.000Z");
        failed.outcome = TurnOutcome::Failed;
        failed.error_code = Some("loop_limit_exceeded".into());
        failed.tool_calls = vec!["get_bank_balances".into()];
        ledger.insert(&failed).await.unwrap();
        ledger.insert(&sample("c9", "openai", 0.25, "2026-03-01T11:00:00.000Z")).await.unwrap();

        assert!((ledger.conversation_total("c9").await.unwrap() - 0.5).abs() < 1e-10);
        assert_eq!(ledger.conversation_turns("c9").await.unwrap(), 2);
        assert_eq!(ledger.conversation_turns("other").await.unwrap(), 0);
    }
}
