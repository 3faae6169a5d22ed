// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-turn state machine.
//!
//! A turn moves through classifying -> selecting -> invoking, alternating
//! between invoking and awaiting tool calls until the model answers, then
//! ends completed or failed.
//! The user message is committed before any provider call; everything the
//! turn produces after it is committed in a single append once the turn ends.

use std::sync::Arc;
use std::time::Instant;

use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use tally_config::model::RoutingConfig;
use tally_config::{CostMode, TallyConfig};
use tally_core::{
    Classification, Complexity, ConversationId, ConversationStore, Message, ProviderCandidate,
    ProviderRequest, Role, TallyError, TokenUsage,
};
use tally_cost::{TurnOutcome, UsageRecord, UsageRecorder, calculate_cost, get_pricing};
use tally_resilience::{FallbackController, FallbackFailure, ProviderRegistry};
use tally_router::{ProviderSelector, QueryClassifier};
use tally_tools::ToolRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{TurnEvent, TurnSummary};

/// States a turn passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Classifying,
    Selecting,
    /// Waiting on a provider.
    Invoking,
    /// Running the tool calls of the last response.
    AwaitingToolCalls,
    /// Final answer received; committing it.
    Streaming,
    Completed,
    Failed,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Classifying => write!(f, "classifying"),
            TurnState::Selecting => write!(f, "selecting"),
            TurnState::Invoking => write!(f, "invoking"),
            TurnState::AwaitingToolCalls => write!(f, "awaiting_tool_calls"),
            TurnState::Streaming => write!(f, "streaming"),
            TurnState::Completed => write!(f, "completed"),
            TurnState::Failed => write!(f, "failed"),
        }
    }
}

/// A user message to answer.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Existing conversation to continue; a new one is created when absent.
    pub conversation_id: Option<ConversationId>,
    pub message: String,
    /// Provider to try first, if enabled.
    pub preferred_provider: Option<String>,
    /// Overrides the configured cost policy for this turn.
    pub cost_mode: Option<CostMode>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn in_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn prefer(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    pub fn with_cost_mode(mut self, mode: CostMode) -> Self {
        self.cost_mode = Some(mode);
        self
    }
}

/// Error payload of a failed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnFailed {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for TurnFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// A running turn.
///
/// `events` yields every [`TurnEvent`] in order and closes after the terminal
/// `Done` or `Error`. Dropping it does not stop the turn.
pub struct TurnHandle {
    pub conversation_id: ConversationId,
    pub events: mpsc::UnboundedReceiver<TurnEvent>,
    pub task: JoinHandle<()>,
}

impl TurnHandle {
    /// Drain the event stream and return the terminal outcome.
    pub async fn finish(self) -> Result<TurnSummary, TurnFailed> {
        wait_for_outcome(self.events).await
    }
}

/// Drain turn events up to the terminal one.
pub async fn wait_for_outcome<S>(mut events: S) -> Result<TurnSummary, TurnFailed>
where
    S: Stream<Item = TurnEvent> + Unpin,
{
    while let Some(event) = events.next().await {
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

/// Answers user messages by routing them through providers and tools.
///
/// Cheap to clone; every clone shares the same registries and store.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    routing: RoutingConfig,
    classifier: QueryClassifier,
    selector: ProviderSelector,
    fallback: FallbackController,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    recorder: UsageRecorder,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(
        config: &TallyConfig,
        providers: ProviderRegistry,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        recorder: UsageRecorder,
        system_prompt: String,
    ) -> Self {
        let timeout = std::time::Duration::from_secs(config.routing.provider_timeout_secs);
        Self {
            inner: Arc::new(Inner {
                routing: config.routing.clone(),
                classifier: QueryClassifier::with_history_window(config.routing.history_window),
                selector: ProviderSelector::new(config),
                fallback: FallbackController::new(providers, timeout),
                tools,
                store,
                recorder,
                system_prompt,
            }),
        }
    }

    /// Classify a message without running a turn.
    pub fn classify(&self, message: &str, recent_history: &[&str]) -> Classification {
        self.inner.classifier.classify(message, recent_history)
    }

    /// Candidates a turn would try for `classification`, in order.
    pub fn route(
        &self,
        classification: &Classification,
        cost_mode: Option<CostMode>,
        preferred: Option<&str>,
    ) -> Vec<ProviderCandidate> {
        let policy = cost_mode.unwrap_or(self.inner.routing.cost_mode);
        self.inner
            .selector
            .select_with_preference(classification, policy, preferred)
    }

    pub fn providers(&self) -> &ProviderRegistry {
        self.inner.fallback.registry()
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.inner.tools
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.inner.store
    }

    /// Commit the user message and start answering it in a background task.
    ///
    /// Fails only when the conversation cannot be resolved or the user
    /// message cannot be stored; every later failure arrives as a
    /// [`TurnEvent::Error`].
    pub async fn start_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnHandle, TallyError> {
        let store = &self.inner.store;
        let conversation_id = match request.conversation_id {
            Some(id) => {
                if !store.conversation_exists(&id).await? {
                    return Err(TallyError::NotFound(format!("conversation {id}")));
                }
                id
            }
            None => store.create_conversation(Some(&request.message)).await?,
        };

        let history = store.load_messages(&conversation_id).await?;
        store
            .append_messages(&conversation_id, &[Message::user(request.message.clone())])
            .await?;

        let (tx, rx) = mpsc::unbounded();
        let turn = Turn {
            conversation_id: conversation_id.clone(),
            message: request.message,
            history,
            policy: request.cost_mode.unwrap_or(self.inner.routing.cost_mode),
            preferred: request.preferred_provider,
            cancel,
            events: EventSink {
                tx,
                detached: false,
            },
            started: Instant::now(),
        };

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run(turn).await });
        Ok(TurnHandle {
            conversation_id,
            events: rx,
            task,
        })
    }

    /// Run a turn to completion.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnSummary, TurnFailed> {
        match self.start_turn(request, cancel).await {
            Ok(handle) => handle.finish().await,
            Err(e) => Err(TurnFailed {
                code: e.code().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

struct Turn {
    conversation_id: ConversationId,
    message: String,
    /// Messages committed before this turn.
    history: Vec<Message>,
    policy: CostMode,
    preferred: Option<String>,
    cancel: CancellationToken,
    events: EventSink,
    started: Instant,
}

/// Forwards events to the client until it stops listening.
struct EventSink {
    tx: mpsc::UnboundedSender<TurnEvent>,
    detached: bool,
}

impl EventSink {
    fn emit(&mut self, event: TurnEvent) {
        if self.detached {
            return;
        }
        if self.tx.unbounded_send(event).is_err() {
            self.detached = true;
            warn!(
                error = %TallyError::StreamingInterrupted,
                "finishing turn without streaming"
            );
        }
    }
}

/// What the turn has produced so far.
#[derive(Default)]
struct Progress {
    state: TurnState,
    /// Messages after the user message, committed together at the end.
    messages: Vec<Message>,
    usage: TokenUsage,
    cost_usd: f64,
    tools_used: Vec<String>,
    /// Tools that returned without error, in call order.
    tools_succeeded: Vec<String>,
    /// Candidate that served the last call, or the last one attempted.
    candidate: Option<ProviderCandidate>,
    invocations: u32,
}

impl Progress {
    fn provider_and_model(&self) -> (String, String) {
        match &self.candidate {
            Some(c) => (c.provider.clone(), c.model.clone()),
            None => ("none".into(), "none".into()),
        }
    }
}

impl Inner {
    async fn run(&self, mut turn: Turn) {
        let mut progress = Progress::default();

        let prior: Vec<&str> = turn
            .history
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        let classification = self.classifier.classify(&turn.message, &prior);
        debug!(
            conversation_id = %turn.conversation_id,
            complexity = %classification.complexity,
            needs_tools = classification.needs_tools,
            reason = classification.reason,
            "classified message"
        );

        progress.state = TurnState::Selecting;
        let candidates = self.selector.select_with_preference(
            &classification,
            turn.policy,
            turn.preferred.as_deref(),
        );
        debug!(
            conversation_id = %turn.conversation_id,
            candidates = ?candidates.iter().map(|c| c.provider.as_str()).collect::<Vec<_>>(),
            "routing turn"
        );

        match self
            .drive(&mut turn, &classification, &candidates, &mut progress)
            .await
        {
            Ok(answer) => self.complete(turn, &classification, progress, answer).await,
            Err(error) => self.fail(turn, &classification, progress, error).await,
        }
    }

    /// Call providers and run tools until the model answers.
    async fn drive(
        &self,
        turn: &mut Turn,
        classification: &Classification,
        candidates: &[ProviderCandidate],
        progress: &mut Progress,
    ) -> Result<String, TallyError> {
        let tools = if classification.needs_tools {
            self.tools.definitions()
        } else {
            Vec::new()
        };
        let tier = candidates
            .first()
            .map_or(classification.suggested_tier, |c| c.tier);
        let max_tokens = max_tokens_for(&self.routing, tier);
        let limit = self.routing.max_tool_iterations;

        loop {
            if turn.cancel.is_cancelled() {
                return Err(TallyError::Cancelled);
            }

            progress.state = TurnState::Invoking;
            progress.invocations += 1;
            let request = ProviderRequest {
                model: String::new(),
                system_prompt: Some(self.system_prompt.clone()),
                messages: turn
                    .history
                    .iter()
                    .cloned()
                    .chain(std::iter::once(Message::user(turn.message.clone())))
                    .chain(progress.messages.iter().cloned())
                    .collect(),
                tools: tools.clone(),
                max_tokens,
                stream: true,
            };

            let events = &mut turn.events;
            let outcome = match self
                .fallback
                .call(candidates, &request, |text| {
                    events.emit(TurnEvent::Token {
                        text: text.to_string(),
                    })
                })
                .await
            {
                Ok(outcome) => outcome,
                Err(FallbackFailure {
                    error,
                    last_candidate,
                    ..
                }) => {
                    if last_candidate.is_some() {
                        progress.candidate = last_candidate;
                    }
                    return Err(error);
                }
            };

            let response = outcome.response;
            progress.usage += response.usage;
            progress.cost_usd += calculate_cost(
                &response.usage,
                &get_pricing(&outcome.candidate.provider, &outcome.candidate.model),
            );
            progress.candidate = Some(outcome.candidate);

            if response.tool_calls.is_empty() {
                progress.messages.push(
                    Message::assistant(response.content.clone())
                        .with_model(response.model, response.usage),
                );
                return Ok(response.content);
            }

            if progress.invocations >= limit {
                return Err(TallyError::LoopLimitExceeded { limit });
            }

            let calls = response.tool_calls;
            progress.messages.push(
                Message::assistant_with_tools(response.content, calls.clone())
                    .with_model(response.model, response.usage),
            );

            progress.state = TurnState::AwaitingToolCalls;
            for call in &calls {
                if turn.cancel.is_cancelled() {
                    return Err(TallyError::Cancelled);
                }
                turn.events.emit(TurnEvent::ToolCallStarted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });
                let result = self.tools.invoke(call).await;
                debug!(tool = %call.name, is_error = result.is_error, "tool call finished");
                turn.events.emit(TurnEvent::ToolCallFinished {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    is_error: result.is_error,
                    output: result.output.clone(),
                });
                progress.tools_used.push(call.name.clone());
                if !result.is_error {
                    progress.tools_succeeded.push(call.name.clone());
                }
                progress.messages.push(Message::tool(result));
            }
        }
    }

    async fn complete(
        &self,
        mut turn: Turn,
        classification: &Classification,
        mut progress: Progress,
        content: String,
    ) {
        progress.state = TurnState::Streaming;
        if let Err(e) = self
            .store
            .append_messages(&turn.conversation_id, &progress.messages)
            .await
        {
            return self.fail(turn, classification, progress, e).await;
        }

        progress.state = TurnState::Completed;
        let (provider, model) = progress.provider_and_model();
        let latency_ms = elapsed_ms(turn.started);
        let mut record = UsageRecord::new(
            &turn.conversation_id,
            &provider,
            &model,
            progress.usage,
            progress.cost_usd,
        );
        record.tool_calls = progress.tools_used.clone();
        record.complexity = classification.complexity;
        record.needs_tools = classification.needs_tools;
        record.latency_ms = latency_ms;
        self.recorder.record(&record).await;

        info!(
            conversation_id = %turn.conversation_id,
            provider = %provider,
            model = %model,
            input_tokens = progress.usage.input_tokens,
            output_tokens = progress.usage.output_tokens,
            tool_calls = progress.tools_used.len(),
            latency_ms,
            "turn completed"
        );

        turn.events.emit(TurnEvent::Done(TurnSummary {
            conversation_id: turn.conversation_id.to_string(),
            content,
            provider,
            model,
            usage: progress.usage,
            cost_usd: progress.cost_usd,
            tool_calls: progress.tools_used,
            complexity: classification.complexity,
            needs_tools: classification.needs_tools,
            latency_ms,
        }));
    }

    /// Commit a failure notice in place of everything the turn produced.
    async fn fail(
        &self,
        mut turn: Turn,
        classification: &Classification,
        progress: Progress,
        error: TallyError,
    ) {
        let notice = error.user_message();
        warn!(
            conversation_id = %turn.conversation_id,
            state = %progress.state,
            code = error.code(),
            error = %error,
            "turn failed"
        );

        let committed = failure_notice(&notice, &progress.tools_succeeded);
        if let Err(e) = self
            .store
            .append_messages(&turn.conversation_id, &[Message::assistant(committed)])
            .await
        {
            warn!(
                conversation_id = %turn.conversation_id,
                error = %e,
                "failed to commit failure notice"
            );
        }

        let (provider, model) = progress.provider_and_model();
        let mut record = UsageRecord::new(
            &turn.conversation_id,
            provider,
            model,
            progress.usage,
            progress.cost_usd,
        );
        record.tool_calls = progress.tools_used;
        record.outcome = TurnOutcome::Failed;
        record.error_code = Some(error.code().to_string());
        record.complexity = classification.complexity;
        record.needs_tools = classification.needs_tools;
        record.latency_ms = elapsed_ms(turn.started);
        self.recorder.record(&record).await;

        turn.events.emit(TurnEvent::Error {
            code: error.code().to_string(),
            message: notice,
        });
    }
}

/// The tool exchange of a failed turn is not committed, so the notice names
/// the tools that did run; some of them write to the datastore.
fn failure_notice(notice: &str, tools_succeeded: &[String]) -> String {
    let mut ran: Vec<&str> = Vec::new();
    for name in tools_succeeded {
        if !ran.contains(&name.as_str()) {
            ran.push(name);
        }
    }
    if ran.is_empty() {
        notice.to_string()
    } else {
        format!("{notice}\n\n(Tools that ran before the failure: {}.)", ran.join(", "))
    }
}

fn max_tokens_for(routing: &RoutingConfig, tier: Complexity) -> u32 {
    match tier {
        Complexity::Simple => routing.simple_max_tokens,
        Complexity::Moderate => routing.moderate_max_tokens,
        Complexity::Complex => routing.complex_max_tokens,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
