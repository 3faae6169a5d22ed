// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot CLI commands: `ask`, `classify`, `usage`, and `check-config`.
//!
//! Each command writes its primary output to `out`; `ask` writes tool
//! progress and the closing summary line to `status` so piping stdout keeps
//! only the answer.

use std::io::Write;

use futures::StreamExt;
use tally_agent::{TurnEvent, TurnFailed, TurnRequest, TurnSummary};
use tally_config::{CostMode, TallyConfig};
use tally_core::TallyError;
use tally_cost::SqliteUsageLedger;
use tally_router::{ProviderSelector, QueryClassifier};
use tokio_util::sync::CancellationToken;

use crate::app::App;

fn io_err(e: std::io::Error) -> TallyError {
    TallyError::Internal(format!("failed to write output: {e}"))
}

/// Stream one turn to `out` as it runs.
pub async fn run_ask<W: Write, S: Write>(
    app: &App,
    request: TurnRequest,
    cancel: CancellationToken,
    out: &mut W,
    status: &mut S,
) -> Result<TurnSummary, TurnFailed> {
    let handle = app
        .orchestrator
        .start_turn(request, cancel)
        .await
        .map_err(|e| TurnFailed {
            code: e.code().to_string(),
            message: e.to_string(),
        })?;

    let mut events = handle.events;
    while let Some(event) = events.next().await {
        // Output errors are not worth failing a turn that is still committing.
        let _ = render(&event, out, status);
        match event {
            TurnEvent::Done(summary) => return Ok(summary),
            TurnEvent::Error { code, message } => return Err(TurnFailed { code, message }),
            _ => {}
        }
    }
    Err(TurnFailed {
        code: "internal_error".into(),
        message: "turn ended without a result".into(),
    })
}

fn render<W: Write, S: Write>(event: &TurnEvent, out: &mut W, status: &mut S) -> std::io::Result<()> {
    match event {
        TurnEvent::Token { text } => {
            write!(out, "{text}")?;
            out.flush()
        }
        TurnEvent::ToolCallStarted { name, .. } => writeln!(status, "[tool] {name}"),
        TurnEvent::ToolCallFinished {
            name,
            is_error: true,
            output,
            ..
        } => writeln!(status, "[tool] {name} failed: {}", output["error"]),
        TurnEvent::ToolCallFinished { .. } => Ok(()),
        TurnEvent::Done(summary) => {
            writeln!(out)?;
            writeln!(
                status,
                "-- {}/{} | {} in / {} out tokens | ${:.4} | conversation {}",
                summary.provider,
                summary.model,
                summary.usage.input_tokens,
                summary.usage.output_tokens,
                summary.cost_usd,
                summary.conversation_id
            )
        }
        TurnEvent::Error { .. } => writeln!(out),
    }
}

/// Print how a message would be classified and routed.
pub fn run_classify<W: Write>(
    config: &TallyConfig,
    message: &str,
    cost_mode: Option<CostMode>,
    out: &mut W,
) -> Result<(), TallyError> {
    let classifier = QueryClassifier::with_history_window(config.routing.history_window);
    let classification = classifier.classify(message, &[]);
    let policy = cost_mode.unwrap_or(config.routing.cost_mode);
    let candidates = ProviderSelector::new(config).select(&classification, policy);

    writeln!(out, "complexity:  {}", classification.complexity).map_err(io_err)?;
    writeln!(
        out,
        "needs tools: {}",
        if classification.needs_tools { "yes" } else { "no" }
    )
    .map_err(io_err)?;
    writeln!(out, "tier:        {}", classification.suggested_tier).map_err(io_err)?;
    writeln!(out, "confidence:  {:.2}", classification.confidence).map_err(io_err)?;
    writeln!(out, "reason:      {}", classification.reason).map_err(io_err)?;
    writeln!(out, "policy:      {policy}").map_err(io_err)?;

    if candidates.is_empty() {
        writeln!(out, "candidates:  none (enable a provider in tally.toml)").map_err(io_err)?;
        return Ok(());
    }
    writeln!(out, "candidates:").map_err(io_err)?;
    for c in &candidates {
        writeln!(
            out,
            "  {}. {} {}{}",
            c.rank + 1,
            c.provider,
            c.model,
            if c.supports_tools { " (tools)" } else { "" }
        )
        .map_err(io_err)?;
    }
    Ok(())
}

/// Print spend for `date` (today when `None`) and its month.
pub async fn run_usage<W: Write>(
    ledger: &SqliteUsageLedger,
    date: Option<&str>,
    out: &mut W,
) -> Result<(), TallyError> {
    let day = match date {
        Some(d) => chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| TallyError::Config(format!("invalid date `{d}`, expected YYYY-MM-DD")))?,
        None => chrono::Utc::now().date_naive(),
    };
    let date = day.format("%Y-%m-%d").to_string();
    let month = day.format("%Y-%m").to_string();

    let day_total = ledger.daily_total(&date).await?;
    let month_total = ledger.monthly_total(&month).await?;
    let breakdown = ledger.provider_breakdown(&date).await?;

    writeln!(out, "{date}: ${day_total:.4}").map_err(io_err)?;
    writeln!(out, "{month}: ${month_total:.4}").map_err(io_err)?;
    for row in &breakdown {
        writeln!(
            out,
            "  {:<12} {:>4} turns {:>8} in {:>8} out  ${:.4}",
            row.provider, row.turns, row.input_tokens, row.output_tokens, row.cost_usd
        )
        .map_err(io_err)?;
    }
    Ok(())
}

/// Print a summary of a configuration that already passed validation.
pub fn run_check_config<W: Write>(config: &TallyConfig, out: &mut W) -> Result<(), TallyError> {
    let enabled: Vec<&str> = config
        .provider_profiles()
        .into_iter()
        .filter(|p| p.enabled)
        .map(|p| p.name)
        .collect();

    writeln!(out, "configuration OK").map_err(io_err)?;
    writeln!(out, "  database:  {}", config.storage.database_path).map_err(io_err)?;
    writeln!(out, "  policy:    {}", config.routing.cost_mode).map_err(io_err)?;
    writeln!(
        out,
        "  providers: {}",
        if enabled.is_empty() {
            "none enabled".to_string()
        } else {
            enabled.join(", ")
        }
    )
    .map_err(io_err)?;
    writeln!(
        out,
        "  gateway:   {}:{}",
        config.gateway.host, config.gateway.port
    )
    .map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prints_candidates() {
        let mut config = TallyConfig::default();
        config.ollama.enabled = true;
        let mut out = Vec::new();
        run_classify(&config, "What's my checking balance?", None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("complexity:  simple"));
        assert!(text.contains("needs tools: yes"));
        assert!(text.contains("1. ollama"));
    }

    #[test]
    fn classify_without_providers_says_so() {
        let mut out = Vec::new();
        run_classify(&TallyConfig::default(), "hi", None, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("candidates:  none"));
    }

    #[test]
    fn check_config_lists_enabled_providers() {
        let mut config = TallyConfig::default();
        config.anthropic.enabled = true;
        config.ollama.enabled = true;
        let mut out = Vec::new();
        run_check_config(&config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("providers: anthropic, ollama"));
        assert!(text.contains("gateway:   127.0.0.1:5001"));
    }
}
