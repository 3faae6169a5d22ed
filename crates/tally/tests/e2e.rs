// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-application tests: a real on-disk database, mock providers, and the
//! same wiring `tally ask` uses.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tally::App;
use tally::commands::{run_ask, run_classify, run_usage};
use tally_agent::{TurnFailed, TurnRequest, TurnSummary};
use tally_config::{CostMode, TallyConfig};
use tally_core::{ConversationId, ConversationStore, Role};
use tally_resilience::ProviderRegistry;
use tally_test_utils::{MockProvider, MockReply, TestDatastore};
use tokio_util::sync::CancellationToken;

struct Fixture {
    _data: TestDatastore,
    app: App,
}

fn config_for(data: &TestDatastore) -> TallyConfig {
    let mut config = TallyConfig::default();
    config.storage.database_path = data.path().to_string();
    config.anthropic.enabled = true;
    config.ollama.enabled = true;
    config
}

async fn fixture(
    config_edit: impl FnOnce(&mut TallyConfig),
    providers: &[Arc<MockProvider>],
) -> Fixture {
    let data = TestDatastore::seeded().await.unwrap();
    let mut config = config_for(&data);
    config_edit(&mut config);

    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider.clone()).unwrap();
    }
    let app = App::with_providers(config, registry).await.unwrap();
    Fixture { _data: data, app }
}

type Asked = (Result<TurnSummary, TurnFailed>, String, String);

async fn ask(app: &App, request: TurnRequest) -> Asked {
    let mut out = Vec::new();
    let mut status = Vec::new();
    let result = run_ask(app, request, CancellationToken::new(), &mut out, &mut status).await;
    (
        result,
        String::from_utf8(out).unwrap(),
        String::from_utf8(status).unwrap(),
    )
}

#[tokio::test]
async fn balance_question_runs_the_tool_loop_end_to_end() {
    let anthropic = Arc::new(
        MockProvider::new("anthropic")
            .then(MockReply::tool_call("get_bank_balances", json!({})))
            .then(MockReply::text("Your checking balance is $2,450.75.")),
    );
    let f = fixture(|_| {}, &[anthropic.clone()]).await;

    let (result, out, status) = ask(&f.app, TurnRequest::new("What's my checking balance?")).await;
    let summary = result.unwrap();

    assert_eq!(out.trim(), "Your checking balance is $2,450.75.");
    assert!(status.contains("[tool] get_bank_balances"));
    assert!(status.contains("anthropic/"));
    assert_eq!(summary.tool_calls, vec!["get_bank_balances".to_string()]);

    let roles: Vec<Role> = f
        .app
        .storage
        .load_messages(&summary.conversation_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);

    assert_eq!(
        f.app
            .ledger
            .conversation_turns(&summary.conversation_id.0)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn classification_scenarios_route_as_expected() {
    let data = TestDatastore::new().await.unwrap();
    let config = config_for(&data);

    let mut out = Vec::new();
    run_classify(&config, "What's my checking balance?", Some(CostMode::Balanced), &mut out).unwrap();
    let simple = String::from_utf8(out).unwrap();
    assert!(simple.contains("complexity:  simple"));
    assert!(simple.contains("needs tools: yes"));
    assert!(simple.contains("1. anthropic"));

    let mut out = Vec::new();
    run_classify(
        &config,
        "Compare my spending trend across the last 3 years and recommend tax optimizations",
        None,
        &mut out,
    )
    .unwrap();
    assert!(String::from_utf8(out).unwrap().contains("complexity:  complex"));
}

#[tokio::test(start_paused = true)]
async fn timed_out_provider_is_replaced_and_usage_goes_to_the_fallback() {
    let anthropic = Arc::new(
        MockProvider::new("anthropic")
            .then(MockReply::text("too late").delayed(Duration::from_secs(120))),
    );
    let ollama = Arc::new(MockProvider::new("ollama").then(MockReply::text("Hello from ollama.")));
    let f = fixture(
        |c| c.routing.provider_timeout_secs = 5,
        &[anthropic.clone(), ollama.clone()],
    )
    .await;

    let (result, out, _) = ask(&f.app, TurnRequest::new("hello")).await;
    let summary = result.unwrap();

    assert_eq!(summary.provider, "ollama");
    assert_eq!(out.trim(), "Hello from ollama.");
    assert_eq!(ollama.call_count().await, 1);

    let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let breakdown = f.app.ledger.provider_breakdown(&date).await.unwrap();
    assert_eq!(breakdown.len(), 1);
    assert_eq!(breakdown[0].provider, "ollama");
}

#[tokio::test]
async fn invalid_tool_arguments_are_fed_back_not_fatal() {
    let anthropic = Arc::new(
        MockProvider::new("anthropic")
            .then(MockReply::tool_call("set_budget", json!({ "category": "Travel" })))
            .then(MockReply::text("How much should the Travel budget be?")),
    );
    let f = fixture(|_| {}, &[anthropic.clone()]).await;

    let (result, out, status) = ask(&f.app, TurnRequest::new("Set a budget for travel")).await;
    assert!(result.is_ok());
    assert_eq!(out.trim(), "How much should the Travel budget be?");
    assert!(status.contains("[tool] set_budget failed"));

    let requests = anthropic.requests().await;
    let fed_back = requests[1]
        .messages
        .last()
        .and_then(|m| m.tool_result.as_ref())
        .unwrap();
    assert!(fed_back.is_error);
}

#[tokio::test]
async fn runaway_tool_loop_fails_and_still_records_usage() {
    let anthropic = Arc::new(
        MockProvider::new("anthropic").repeat(MockReply::tool_call("list_budgets", json!({}))),
    );
    let f = fixture(|c| c.routing.max_tool_iterations = 2, &[anthropic.clone()]).await;

    let (result, _, _) = ask(&f.app, TurnRequest::new("List my budgets")).await;
    let failed = result.unwrap_err();
    assert_eq!(failed.code, "loop_limit_exceeded");
    assert_eq!(anthropic.call_count().await, 2);

    let conversations = f.app.storage.list_conversations(10).await.unwrap();
    let id = &conversations[0].id;
    assert_eq!(f.app.ledger.conversation_turns(&id.0).await.unwrap(), 1);
}

#[tokio::test]
async fn follow_up_turns_share_a_conversation_and_a_ledger() {
    let anthropic = Arc::new(
        MockProvider::new("anthropic")
            .then(MockReply::text("Hi there."))
            .then(MockReply::text("Still here.")),
    );
    let f = fixture(|_| {}, &[anthropic.clone()]).await;

    let (first, _, _) = ask(&f.app, TurnRequest::new("hi")).await;
    let id: ConversationId = first.unwrap().conversation_id;
    let (second, _, _) = ask(&f.app, TurnRequest::new("you there?").in_conversation(id.clone())).await;
    assert_eq!(second.unwrap().conversation_id, id);

    assert_eq!(f.app.ledger.conversation_turns(&id.0).await.unwrap(), 2);

    let mut out = Vec::new();
    run_usage(&f.app.ledger, None, &mut out).await.unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("anthropic"));
    assert!(report.contains("2 turns"));

    f.app.shutdown().await;
}
