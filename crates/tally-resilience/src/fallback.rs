// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered provider fallback with per-call timeouts.
//!
//! Candidates are tried in rank order. A transient failure moves on to the
//! next candidate immediately; a network blip gets one retry on the same
//! candidate first. A permanent failure stops the iteration. Once any text
//! has been forwarded to the caller, a failure is returned as-is: retrying
//! elsewhere would repeat visible output.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tally_core::{
    PluginAdapter, ProviderAdapter, ProviderCandidate, ProviderReply, ProviderRequest,
    ProviderResponse, StreamEventType, TallyError, TokenUsage, TransientKind,
};
use tracing::{debug, info, warn};

use crate::registry::ProviderRegistry;

/// A successful call and the candidate that served it.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub response: ProviderResponse,
    pub candidate: ProviderCandidate,
    /// Provider invocations made, including retries and failed candidates.
    pub attempts: usize,
    pub latency: Duration,
}

/// A failed call: the error to report and the last candidate attempted.
#[derive(Debug)]
pub struct FallbackFailure {
    pub error: TallyError,
    pub last_candidate: Option<ProviderCandidate>,
    pub attempts: usize,
}

struct AttemptError {
    error: TallyError,
    forwarded: bool,
}

/// Runs one request against a ranked candidate list.
#[derive(Debug, Clone)]
pub struct FallbackController {
    registry: ProviderRegistry,
    timeout: Duration,
}

impl FallbackController {
    pub fn new(registry: ProviderRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Call candidates in order until one succeeds.
    ///
    /// `request.model` is replaced by each candidate's model, and tools are
    /// dropped for candidates without tool support. Text deltas are passed to
    /// `on_text` as they arrive.
    pub async fn call<F>(
        &self,
        candidates: &[ProviderCandidate],
        request: &ProviderRequest,
        mut on_text: F,
    ) -> Result<FallbackOutcome, FallbackFailure>
    where
        F: FnMut(&str) + Send,
    {
        if candidates.is_empty() {
            return Err(FallbackFailure {
                error: TallyError::Config("no enabled provider can serve this request".into()),
                last_candidate: None,
                attempts: 0,
            });
        }

        let started = Instant::now();
        let mut attempts = 0;
        let mut last: Option<(TallyError, ProviderCandidate)> = None;

        for candidate in candidates {
            let Some(provider) = self.registry.get(&candidate.provider) else {
                warn!(provider = %candidate.provider, "candidate has no registered adapter, skipping");
                last = Some((
                    TallyError::Config(format!("provider `{}` is not registered", candidate.provider)),
                    candidate.clone(),
                ));
                continue;
            };

            let mut per_candidate = request.clone();
            per_candidate.model = candidate.model.clone();
            if !candidate.supports_tools {
                per_candidate.tools.clear();
            }

            let mut retried = false;
            loop {
                attempts += 1;
                debug!(
                    provider = %candidate.provider,
                    model = %candidate.model,
                    attempt = attempts,
                    "invoking provider"
                );
                let result = self
                    .attempt(provider.as_ref(), per_candidate.clone(), &mut on_text)
                    .await;

                match result {
                    Ok(response) => {
                        if attempts > 1 {
                            info!(
                                provider = %candidate.provider,
                                model = %candidate.model,
                                attempts,
                                "provider call succeeded after fallback"
                            );
                        }
                        return Ok(FallbackOutcome {
                            response,
                            candidate: candidate.clone(),
                            attempts,
                            latency: started.elapsed(),
                        });
                    }
                    Err(AttemptError { error, forwarded }) => {
                        warn!(
                            provider = %candidate.provider,
                            model = %candidate.model,
                            error = %error,
                            forwarded,
                            "provider call failed"
                        );
                        if forwarded || !error.is_transient() {
                            return Err(FallbackFailure {
                                error,
                                last_candidate: Some(candidate.clone()),
                                attempts,
                            });
                        }
                        if error.is_network_blip() && !retried {
                            retried = true;
                            debug!(provider = %candidate.provider, "retrying after network blip");
                            continue;
                        }
                        last = Some((error, candidate.clone()));
                        break;
                    }
                }
            }
        }

        let (error, candidate) = match last {
            Some((error, candidate)) => (error, Some(candidate)),
            None => (TallyError::Internal("no provider attempt was made".into()), None),
        };
        if attempts == 0 {
            // Nothing was invoked: every candidate lacked an adapter.
            return Err(FallbackFailure {
                error: TallyError::Config("no candidate provider has a registered adapter".into()),
                last_candidate: candidate,
                attempts,
            });
        }
        warn!(attempts, "all provider candidates failed");
        Err(FallbackFailure {
            error: TallyError::ProvidersExhausted {
                attempts,
                last: Box::new(error),
            },
            last_candidate: candidate,
            attempts,
        })
    }

    async fn attempt<F>(
        &self,
        provider: &dyn ProviderAdapter,
        request: ProviderRequest,
        on_text: &mut F,
    ) -> Result<ProviderResponse, AttemptError>
    where
        F: FnMut(&str) + Send,
    {
        let name = provider.name().to_string();
        let mut forwarded = false;
        let outcome = tokio::time::timeout(
            self.timeout,
            consume(provider, request, on_text, &mut forwarded),
        )
        .await;

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(AttemptError {
                error: normalize(&name, error),
                forwarded,
            }),
            Err(_elapsed) => Err(AttemptError {
                error: TallyError::ProviderTransient {
                    provider: name,
                    kind: TransientKind::Timeout,
                    message: format!("no complete response within {:?}", self.timeout),
                },
                forwarded,
            }),
        }
    }
}

/// Timeouts from adapters become transient provider errors.
fn normalize(provider: &str, error: TallyError) -> TallyError {
    match error {
        TallyError::Timeout { duration } => TallyError::ProviderTransient {
            provider: provider.to_string(),
            kind: TransientKind::Timeout,
            message: format!("timed out after {duration:?}"),
        },
        other => other,
    }
}

fn merge_usage(total: &mut TokenUsage, chunk: TokenUsage) {
    if chunk.input_tokens > 0 {
        total.input_tokens = chunk.input_tokens;
    }
    if chunk.output_tokens > 0 {
        total.output_tokens = chunk.output_tokens;
    }
}

/// Drive one provider call to completion, forwarding text as it arrives.
async fn consume<F>(
    provider: &dyn ProviderAdapter,
    request: ProviderRequest,
    on_text: &mut F,
    forwarded: &mut bool,
) -> Result<ProviderResponse, TallyError>
where
    F: FnMut(&str) + Send,
{
    let model = request.model.clone();
    let mut stream = match provider.chat(request).await? {
        ProviderReply::Complete(response) => {
            if !response.content.is_empty() {
                on_text(&response.content);
                *forwarded = true;
            }
            return Ok(response);
        }
        ProviderReply::Stream(stream) => stream,
    };

    let mut response = ProviderResponse {
        model,
        ..Default::default()
    };
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        match chunk.event_type {
            StreamEventType::MessageStart | StreamEventType::MessageDelta => {
                if let Some(usage) = chunk.usage {
                    merge_usage(&mut response.usage, usage);
                }
                if chunk.stop_reason.is_some() {
                    response.stop_reason = chunk.stop_reason;
                }
            }
            StreamEventType::TextDelta => {
                if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                    on_text(&text);
                    *forwarded = true;
                    response.content.push_str(&text);
                }
            }
            StreamEventType::ToolCall => {
                if let Some(call) = chunk.tool_call {
                    response.tool_calls.push(call);
                }
            }
            StreamEventType::MessageStop => break,
            StreamEventType::Error => {
                return Err(TallyError::ProviderTransient {
                    provider: provider.name().to_string(),
                    kind: TransientKind::ServerError,
                    message: chunk.error.unwrap_or_else(|| "stream error".into()),
                });
            }
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tally_core::{Complexity, Message};
    use tally_test_utils::{MOCK_USAGE, MockProvider, MockReply};
    use tracing_test::traced_test;

    fn candidate(provider: &str, rank: usize) -> ProviderCandidate {
        ProviderCandidate {
            provider: provider.into(),
            model: format!("{provider}-model"),
            tier: Complexity::Moderate,
            rank,
            supports_tools: true,
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: String::new(),
            system_prompt: Some("You are a finance assistant.".into()),
            messages: vec![Message::user("What's my balance?")],
            tools: vec![],
            max_tokens: 512,
            stream: true,
        }
    }

    fn controller(providers: Vec<Arc<MockProvider>>) -> FallbackController {
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry.register(p).unwrap();
        }
        FallbackController::new(registry, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn first_candidate_success_streams_text() {
        let a = Arc::new(MockProvider::new("a").then(MockReply::text("all good")));
        let ctl = controller(vec![a.clone()]);
        let mut seen = String::new();
        let out = ctl
            .call(&[candidate("a", 0)], &request(), |t| seen.push_str(t))
            .await
            .unwrap();
        assert_eq!(out.response.content, "all good");
        assert_eq!(seen, "all good");
        assert_eq!(out.response.usage, MOCK_USAGE);
        assert_eq!(out.attempts, 1);
        assert_eq!(a.requests().await[0].model, "a-model");
    }

    #[tokio::test]
    async fn transient_failures_fall_through_in_order() {
        let a = Arc::new(MockProvider::new("a").then(MockReply::Transient(TransientKind::RateLimited)));
        let b = Arc::new(MockProvider::new("b").then(MockReply::Transient(TransientKind::ServerError)));
        let c = Arc::new(MockProvider::new("c").then(MockReply::text("from c")));
        let ctl = controller(vec![a.clone(), b.clone(), c.clone()]);

        let out = ctl
            .call(
                &[candidate("a", 0), candidate("b", 1), candidate("c", 2)],
                &request(),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(out.candidate.provider, "c");
        assert_eq!(out.attempts, 3);
        assert_eq!(a.call_count().await, 1);
        assert_eq!(b.call_count().await, 1);
    }

    #[tokio::test]
    async fn permanent_failure_aborts() {
        let a = Arc::new(MockProvider::new("a").then(MockReply::Permanent("invalid api key".into())));
        let b = Arc::new(MockProvider::new("b"));
        let ctl = controller(vec![a, b.clone()]);

        let failure = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(failure.error.code(), "provider_permanent");
        assert_eq!(failure.last_candidate.unwrap().provider, "a");
        assert_eq!(b.call_count().await, 0);
    }

    #[tokio::test]
    async fn network_blip_retries_same_candidate_once() {
        let a = Arc::new(
            MockProvider::new("a")
                .then(MockReply::Transient(TransientKind::Network))
                .then(MockReply::text("second try")),
        );
        let ctl = controller(vec![a.clone()]);
        let out = ctl.call(&[candidate("a", 0)], &request(), |_| {}).await.unwrap();
        assert_eq!(out.response.content, "second try");
        assert_eq!(a.call_count().await, 2);
    }

    #[tokio::test]
    async fn repeated_blips_move_on() {
        let a = Arc::new(MockProvider::new("a").repeat(MockReply::Transient(TransientKind::Network)));
        let b = Arc::new(MockProvider::new("b").then(MockReply::text("ok")));
        let ctl = controller(vec![a.clone(), b]);
        let out = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |_| {})
            .await
            .unwrap();
        assert_eq!(out.candidate.provider, "b");
        assert_eq!(a.call_count().await, 2);
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn failure_after_visible_text_is_not_retried() {
        let a = Arc::new(MockProvider::new("a").then(MockReply::FailAfter("Your bal".into())));
        let b = Arc::new(MockProvider::new("b"));
        let ctl = controller(vec![a, b.clone()]);
        let mut seen = String::new();
        let failure = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |t| seen.push_str(t))
            .await
            .unwrap_err();
        assert_eq!(seen, "Your bal");
        assert_eq!(failure.error.code(), "provider_transient");
        assert_eq!(b.call_count().await, 0);
    }

    #[tokio::test]
    async fn all_failing_reports_exhausted_with_last_error() {
        let a = Arc::new(MockProvider::new("a").then(MockReply::Transient(TransientKind::RateLimited)));
        let b = Arc::new(MockProvider::new("b").then(MockReply::Transient(TransientKind::ServerError)));
        let ctl = controller(vec![a, b]);
        let failure = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |_| {})
            .await
            .unwrap_err();
        match failure.error {
            TallyError::ProvidersExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.to_string().contains("server_error"), "{last}");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(failure.last_candidate.unwrap().provider, "b");
    }

    #[tokio::test]
    async fn empty_candidates_is_configuration_error() {
        let ctl = controller(vec![]);
        let failure = ctl.call(&[], &request(), |_| {}).await.unwrap_err();
        assert_eq!(failure.error.code(), "configuration_error");
        assert_eq!(failure.attempts, 0);
    }

    #[tokio::test]
    async fn unregistered_candidates_are_a_configuration_error() {
        let ctl = controller(vec![]);
        let failure = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |_| {})
            .await
            .unwrap_err();
        assert_eq!(failure.error.code(), "configuration_error");
        assert_eq!(failure.attempts, 0);
        assert_eq!(failure.last_candidate.unwrap().provider, "b");
    }

    #[tokio::test]
    async fn unregistered_candidate_is_skipped_for_a_registered_one() {
        let b = Arc::new(MockProvider::new("b").then(MockReply::text("from b")));
        let ctl = controller(vec![b]);
        let out = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |_| {})
            .await
            .unwrap();
        assert_eq!(out.candidate.provider, "b");
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn slow_candidate_times_out_and_falls_back() {
        let a = Arc::new(
            MockProvider::new("a").then(MockReply::text("late").delayed(Duration::from_secs(60))),
        );
        let b = Arc::new(MockProvider::new("b").then(MockReply::text("fast")));
        let ctl = controller(vec![a, b]);
        let out = ctl
            .call(&[candidate("a", 0), candidate("b", 1)], &request(), |_| {})
            .await
            .unwrap();
        assert_eq!(out.response.content, "fast");
        assert!(logs_contain("provider call failed"));
    }

    #[tokio::test]
    async fn tools_are_dropped_for_candidates_without_support() {
        let a = Arc::new(MockProvider::new("a").with_tools(false));
        let ctl = controller(vec![a.clone()]);
        let mut req = request();
        req.tools.push(tally_core::ToolDefinition {
            name: "get_bank_balances".into(),
            description: "balances".into(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let mut no_tools = candidate("a", 0);
        no_tools.supports_tools = false;
        ctl.call(&[no_tools], &req, |_| {}).await.unwrap();
        assert!(a.requests().await[0].tools.is_empty());
    }
}
