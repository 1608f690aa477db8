// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Round orchestrator: the per-turn FSM.
//!
//! A turn walks `Invoking -> Parsing -> Dispatching -> Persisting` and then
//! either loops back through `Reinvoking` or ends in `Finalizing` /
//! `Aborted`. One explicit loop per turn drives the machine -- no recursion,
//! so the budget check is a plain counter comparison in one place.
//!
//! Guard order for every model call: rate limiter first (identity = calling
//! user), then circuit breaker (service = model provider). A rejection from
//! either aborts the turn with a typed outcome; retries, if any, belong to
//! the guard's own policy, not this layer.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use quill_broadcast::{BroadcastHub, StreamEvent};
use quill_core::types::{
    AbortReason, ChatMessage, ModelRequest, ToolCallRequest, ToolInvocation, ToolResult,
    ToolSchema, TurnOutcome, TurnStatus,
};
use quill_core::{FragmentStream, HistoryStore, ModelProvider, QuillError, ToolExecutor};
use quill_resilience::{CircuitBreakerRegistry, RateLimitDecision, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dedup::{fingerprint, DedupCache};
use crate::dispatch::{dispatch_wave, skipped_result};
use crate::parser::{ParseResult, StreamParser};

use futures::StreamExt;

/// Logical service name the model provider's circuit breaker is keyed by.
pub const MODEL_SERVICE: &str = "model-provider";

/// Directive injected when the model goes silent after seeing tool results.
const RECOVERY_DIRECTIVE: &str = "You returned an empty reply after receiving tool results. \
Either answer the user now based on the results above, or issue exactly one more relevant \
tool call. Do not return an empty reply.";

/// Degraded answer used when even the recovery attempt yields nothing.
const FALLBACK_ANSWER: &str = "I completed the requested actions but couldn't compose a \
summary. Ask me again if you'd like details about what was done.";

/// User-facing text for an upstream-unavailable abort.
const UNAVAILABLE_ANSWER: &str = "The assistant is temporarily unavailable. Please try \
again in a moment.";

/// States in the turn FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Model call in flight.
    Invoking,
    /// Stream being consumed.
    Parsing,
    /// Tool calls being executed.
    Dispatching,
    /// Round outcome being written to history.
    Persisting,
    /// Looping back to the model with augmented history.
    Reinvoking,
    /// Terminal: the turn produced an answer.
    Finalizing,
    /// Terminal: an upstream guard rejected the turn.
    Aborted,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Invoking => write!(f, "invoking"),
            TurnState::Parsing => write!(f, "parsing"),
            TurnState::Dispatching => write!(f, "dispatching"),
            TurnState::Persisting => write!(f, "persisting"),
            TurnState::Reinvoking => write!(f, "reinvoking"),
            TurnState::Finalizing => write!(f, "finalizing"),
            TurnState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Budgets and tuning constants for the orchestrator.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_rounds: u32,
    pub max_total_tool_calls: u32,
    pub per_round_concurrency: usize,
    pub dedup_window: Duration,
    pub recovery_temperature: f64,
}

impl From<&quill_config::model::EngineConfig> for EngineSettings {
    fn from(config: &quill_config::model::EngineConfig) -> Self {
        Self {
            max_rounds: config.max_rounds,
            max_total_tool_calls: config.max_total_tool_calls,
            per_round_concurrency: config.per_round_concurrency,
            dedup_window: Duration::from_millis(config.dedup_window_ms),
            recovery_temperature: config.recovery_temperature,
        }
    }
}

/// One user-initiated exchange entering the orchestrator.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Conversation the turn belongs to; history is appended under this id.
    pub conversation_id: String,
    /// Calling user; used for rate limiting and passed to the tool executor.
    pub identity: String,
    /// History snapshot including the new user message, oldest first.
    pub history: Vec<ChatMessage>,
    /// Tools offered to the model for this turn.
    pub tools: Vec<ToolSchema>,
    /// Optional live-mirror target: content chunks are broadcast to this
    /// document's listeners as they stream in.
    pub document_id: Option<String>,
}

/// The top-level driver that owns conversation turns.
///
/// All collaborators are injected at construction; the engine holds no
/// global state and can be instantiated multiple times (e.g. in tests).
pub struct TurnEngine {
    provider: Arc<dyn ModelProvider>,
    executor: Arc<dyn ToolExecutor>,
    history: Arc<dyn HistoryStore>,
    limiter: Arc<RateLimiter>,
    breakers: Arc<CircuitBreakerRegistry>,
    broadcast: Option<Arc<BroadcastHub>>,
    settings: EngineSettings,
}

impl TurnEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        executor: Arc<dyn ToolExecutor>,
        history: Arc<dyn HistoryStore>,
        limiter: Arc<RateLimiter>,
        breakers: Arc<CircuitBreakerRegistry>,
        broadcast: Option<Arc<BroadcastHub>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            executor,
            history,
            limiter,
            breakers,
            broadcast,
            settings,
        }
    }

    /// Runs one conversation turn to its terminal state.
    ///
    /// Always returns exactly one outcome. Cancellation is honored at
    /// suspension points: tool executions that already started complete and
    /// persist, but no further model invocation is issued.
    pub async fn run_turn(&self, request: TurnRequest, cancel: CancellationToken) -> TurnOutcome {
        let TurnRequest {
            conversation_id,
            identity,
            history,
            tools,
            document_id,
        } = request;

        let mut state;
        let mut messages = history;
        let mut dedup = DedupCache::new(self.settings.dedup_window);
        let mut pending: VecDeque<ToolInvocation> = VecDeque::new();
        let mut all_results: Vec<ToolResult> = Vec::new();
        let mut last_content = String::new();
        let mut round_count: u32 = 0;
        let mut model_calls: u32 = 0;
        let mut total_tool_calls: u32 = 0;
        let mut recovery_used = false;
        let mut recovery_pending = false;
        let mut temperature: Option<f64> = None;
        let breaker = self.breakers.breaker(MODEL_SERVICE);

        info!(
            conversation_id = conversation_id.as_str(),
            identity = identity.as_str(),
            "turn started"
        );
        self.emit(&document_id, StreamEvent::Start);

        loop {
            // Drain deferred overflow invocations as synthetic rounds before
            // anything else: they were already promised to the model in a
            // persisted assistant message.
            while !pending.is_empty() {
                state = TurnState::Dispatching;
                let wave_len = pending.len().min(self.settings.per_round_concurrency);
                let wave: Vec<ToolInvocation> = pending.drain(..wave_len).collect();
                let skip_fresh = cancel.is_cancelled();
                if skip_fresh {
                    warn!(
                        remaining = wave.len(),
                        "cancelled before deferred wave, recording skipped results"
                    );
                }
                debug!(
                    state = %state,
                    wave = wave.len(),
                    "synthetic round for deferred invocations"
                );

                let results = self
                    .execute_wave(&wave, &identity, &mut dedup, skip_fresh)
                    .await;
                total_tool_calls += wave.len() as u32;
                round_count += 1;

                state = TurnState::Persisting;
                debug!(state = %state, results = results.len(), "persisting deferred results");
                let batch: Vec<ChatMessage> = results.iter().map(result_message).collect();
                all_results.extend(results);
                if !self.persist(&conversation_id, &batch).await {
                    let (text, persist_text) = available_text(&last_content, &all_results);
                    return self
                        .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                        .await;
                }
                messages.extend(batch);
            }

            // Cancellation suppresses the next re-invocation.
            if cancel.is_cancelled() {
                info!(
                    conversation_id = conversation_id.as_str(),
                    "turn cancelled, suppressing re-invocation"
                );
                let (text, persist_text) = available_text(&last_content, &all_results);
                return self
                    .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                    .await;
            }

            // Budget exhaustion prefers a partial answer over no answer.
            // The single recovery re-invocation is exempt: it exists to turn
            // an already-finished round into a usable answer.
            if !recovery_pending {
                if model_calls >= self.settings.max_rounds {
                    warn!(
                        conversation_id = conversation_id.as_str(),
                        rounds = model_calls,
                        "round budget exhausted, finalizing with available content"
                    );
                    let (text, persist_text) = available_text(&last_content, &all_results);
                    return self
                        .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                        .await;
                }
                if total_tool_calls >= self.settings.max_total_tool_calls {
                    warn!(
                        conversation_id = conversation_id.as_str(),
                        tool_calls = total_tool_calls,
                        "tool budget exhausted, finalizing with available content"
                    );
                    let (text, persist_text) = available_text(&last_content, &all_results);
                    return self
                        .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                        .await;
                }
            }

            // --- model round ---
            state = TurnState::Invoking;
            debug!(state = %state, round = model_calls, "model call");

            let decision = self.limiter.check(&identity).await;
            if !decision.allowed {
                state = TurnState::Aborted;
                warn!(
                    state = %state,
                    conversation_id = conversation_id.as_str(),
                    limit = decision.limit,
                    "rate limited"
                );
                return self.abort(
                    &conversation_id,
                    &document_id,
                    AbortReason::RateLimited,
                    rate_limited_answer(&decision),
                    round_count,
                    total_tool_calls,
                );
            }

            let model_request = ModelRequest {
                messages: messages.clone(),
                tools: tools.clone(),
                temperature,
            };
            let stream = match breaker
                .execute(|| self.provider.invoke(model_request))
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    state = TurnState::Aborted;
                    warn!(
                        state = %state,
                        conversation_id = conversation_id.as_str(),
                        error = %e,
                        "model invocation rejected"
                    );
                    return self.abort(
                        &conversation_id,
                        &document_id,
                        AbortReason::UpstreamUnavailable,
                        UNAVAILABLE_ANSWER.to_string(),
                        round_count,
                        total_tool_calls,
                    );
                }
            };
            model_calls += 1;
            round_count += 1;
            recovery_pending = false;
            temperature = None;

            state = TurnState::Parsing;
            debug!(state = %state, "consuming stream");
            let (parsed, cancelled_mid_stream) =
                self.consume_stream(stream, &document_id, &cancel).await;
            if parsed.failed_invocations > 0 {
                info!(
                    dropped = parsed.failed_invocations,
                    "invocations dropped during argument conversion"
                );
            }

            if cancelled_mid_stream {
                // Nothing new was dispatched; finalize with what exists.
                let (text, persist_text) = if parsed.content.is_empty() {
                    available_text(&last_content, &all_results)
                } else {
                    (parsed.content.clone(), true)
                };
                return self
                    .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                    .await;
            }

            if parsed.tool_calls.is_empty() {
                if !parsed.content.is_empty() {
                    // The produced content is the turn's answer.
                    return self
                        .finalize(&conversation_id, &document_id, parsed.content, true, round_count, total_tool_calls)
                        .await;
                }

                // Model silence. After tool results this is a known upstream
                // failure mode: nudge once, at a lower temperature.
                if model_calls > 1 && !recovery_used {
                    recovery_used = true;
                    recovery_pending = true;
                    warn!(
                        conversation_id = conversation_id.as_str(),
                        "model went silent after tool results, forcing recovery re-invocation"
                    );
                    messages.push(ChatMessage::system(RECOVERY_DIRECTIVE));
                    temperature = Some(self.settings.recovery_temperature);
                    state = TurnState::Reinvoking;
                    debug!(state = %state, "anti-silence recovery");
                    continue;
                }

                warn!(
                    conversation_id = conversation_id.as_str(),
                    "no output after recovery, finalizing with fallback answer"
                );
                let (text, persist_text) = if all_results.is_empty() {
                    (FALLBACK_ANSWER.to_string(), true)
                } else {
                    (summarize_results(&all_results), true)
                };
                return self
                    .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                    .await;
            }

            // --- tools requested ---
            let mut invocations = parsed.tool_calls;
            let remaining = self
                .settings
                .max_total_tool_calls
                .saturating_sub(total_tool_calls) as usize;
            if invocations.len() > remaining {
                warn!(
                    requested = invocations.len(),
                    remaining = remaining,
                    "requested invocations exceed the tool budget, trimming"
                );
                invocations.truncate(remaining);
            }

            state = TurnState::Dispatching;
            let wave_len = invocations.len().min(self.settings.per_round_concurrency);
            debug!(
                state = %state,
                requested = invocations.len(),
                wave = wave_len,
                "dispatching tool calls"
            );
            if invocations.len() > wave_len {
                info!(
                    deferred = invocations.len() - wave_len,
                    "deferring excess invocations to a synthetic round"
                );
                for invocation in &invocations[wave_len..] {
                    pending.push_back(invocation.clone());
                }
            }
            let wave: Vec<ToolInvocation> = invocations[..wave_len].to_vec();
            let results = self.execute_wave(&wave, &identity, &mut dedup, false).await;
            total_tool_calls += wave.len() as u32;

            state = TurnState::Persisting;
            debug!(state = %state, results = results.len(), "persisting round outcome");

            // Exact order: the assistant message (content + all tool calls of
            // this model output), then results in invocation order. Deferred
            // invocations get their results appended by the synthetic rounds.
            let calls: Vec<ToolCallRequest> = invocations
                .iter()
                .map(|invocation| ToolCallRequest {
                    id: invocation.id.clone(),
                    name: invocation.name.clone(),
                    arguments: invocation.arguments_or_empty(),
                })
                .collect();
            let mut batch = vec![ChatMessage::assistant_with_tools(parsed.content.clone(), calls)];
            batch.extend(results.iter().map(result_message));
            all_results.extend(results);
            if !parsed.content.is_empty() {
                last_content = parsed.content;
            }

            if !self.persist(&conversation_id, &batch).await {
                let (text, persist_text) = available_text(&last_content, &all_results);
                return self
                    .finalize(&conversation_id, &document_id, text, persist_text, round_count, total_tool_calls)
                    .await;
            }
            messages.extend(batch);

            state = TurnState::Reinvoking;
            debug!(state = %state, round = model_calls, "round complete");
        }
    }

    /// Consumes the fragment stream into a parse result.
    ///
    /// A mid-stream error keeps the partial response: what already arrived
    /// is still useful to the user. Returns whether cancellation interrupted
    /// the stream.
    async fn consume_stream(
        &self,
        mut stream: FragmentStream,
        document_id: &Option<String>,
        cancel: &CancellationToken,
    ) -> (ParseResult, bool) {
        let mut parser = StreamParser::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("cancelled mid-stream, keeping accumulated output");
                    cancelled = true;
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(fragment)) => {
                        if let Some(text) = &fragment.content
                            && !text.is_empty()
                        {
                            self.emit(
                                document_id,
                                StreamEvent::Chunk { text: text.clone() },
                            );
                        }
                        parser.feed(&fragment);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stream error, keeping partial response");
                        break;
                    }
                    None => break,
                }
            }
        }

        (parser.finish(), cancelled)
    }

    /// Executes one wave of invocations with anti-loop dedup applied.
    ///
    /// Every invocation in `wave` yields exactly one result, in order:
    /// cache hits are answered without execution, same-wave duplicates share
    /// the first occurrence's result, and (when `skip_fresh` is set after a
    /// cancellation) never-started invocations get synthetic failed results.
    async fn execute_wave(
        &self,
        wave: &[ToolInvocation],
        identity: &str,
        dedup: &mut DedupCache,
        skip_fresh: bool,
    ) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = vec![None; wave.len()];
        let mut fresh: Vec<(usize, ToolInvocation, String)> = Vec::new();
        let mut first_by_fingerprint: HashMap<String, usize> = HashMap::new();
        let mut duplicates: Vec<(usize, String)> = Vec::new();

        for (position, invocation) in wave.iter().enumerate() {
            let fp = fingerprint(&invocation.name, &invocation.arguments_or_empty());

            if let Some(mut cached) = dedup.lookup(&fp) {
                info!(
                    tool = invocation.name.as_str(),
                    invocation_id = invocation.id.as_str(),
                    "identical action within dedup window, serving cached result"
                );
                cached.invocation_id = invocation.id.clone();
                slots[position] = Some(cached);
            } else if first_by_fingerprint.contains_key(&fp) {
                info!(
                    tool = invocation.name.as_str(),
                    invocation_id = invocation.id.as_str(),
                    "duplicate action within one round, sharing result"
                );
                duplicates.push((position, fp));
            } else {
                first_by_fingerprint.insert(fp.clone(), position);
                fresh.push((position, invocation.clone(), fp));
            }
        }

        let mut by_fingerprint: HashMap<String, ToolResult> = HashMap::new();
        if skip_fresh {
            for (position, invocation, fp) in &fresh {
                let result = skipped_result(invocation, "cancelled before execution");
                by_fingerprint.insert(fp.clone(), result.clone());
                slots[*position] = Some(result);
            }
        } else {
            let invocations: Vec<ToolInvocation> =
                fresh.iter().map(|(_, invocation, _)| invocation.clone()).collect();
            let results = dispatch_wave(
                &self.executor,
                &invocations,
                identity,
                self.settings.per_round_concurrency,
            )
            .await;

            for ((position, _, fp), result) in fresh.iter().zip(results) {
                dedup.record(fp.clone(), result.clone());
                by_fingerprint.insert(fp.clone(), result.clone());
                slots[*position] = Some(result);
            }
        }

        for (position, fp) in duplicates {
            let result = by_fingerprint.get(&fp).map(|shared| {
                let mut copy = shared.clone();
                copy.invocation_id = wave[position].id.clone();
                copy
            });
            slots[position] = result;
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.unwrap_or_else(|| {
                    // Unreachable by construction; kept as a failed result so
                    // the 1:1 invocation/result contract survives any bug here.
                    skipped_result(&wave[position], "internal dispatch error")
                })
            })
            .collect()
    }

    async fn persist(&self, conversation_id: &str, batch: &[ChatMessage]) -> bool {
        match self.history.append_messages(conversation_id, batch).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    conversation_id = conversation_id,
                    error = %e,
                    "history append failed, turn will finalize early"
                );
                false
            }
        }
    }

    async fn finalize(
        &self,
        conversation_id: &str,
        document_id: &Option<String>,
        text: String,
        persist_text: bool,
        round_count: u32,
        tool_call_count: u32,
    ) -> TurnOutcome {
        let state = TurnState::Finalizing;
        if persist_text && !text.is_empty() {
            // Best effort: the outcome is already decided.
            let _ = self
                .persist(conversation_id, &[ChatMessage::assistant(text.clone())])
                .await;
        }
        self.emit(document_id, StreamEvent::End);
        info!(
            state = %state,
            conversation_id = conversation_id,
            rounds = round_count,
            tool_calls = tool_call_count,
            answer_len = text.len(),
            "turn finalized"
        );
        TurnOutcome {
            conversation_id: conversation_id.to_string(),
            final_text: text,
            round_count,
            tool_call_count,
            status: TurnStatus::Finalized,
        }
    }

    fn abort(
        &self,
        conversation_id: &str,
        document_id: &Option<String>,
        reason: AbortReason,
        text: String,
        round_count: u32,
        tool_call_count: u32,
    ) -> TurnOutcome {
        self.emit(
            document_id,
            StreamEvent::Error {
                reason: text.clone(),
            },
        );
        info!(
            conversation_id = conversation_id,
            reason = ?reason,
            rounds = round_count,
            "turn aborted"
        );
        TurnOutcome {
            conversation_id: conversation_id.to_string(),
            final_text: text,
            round_count,
            tool_call_count,
            status: TurnStatus::Aborted(reason),
        }
    }

    fn emit(&self, document_id: &Option<String>, event: StreamEvent) {
        if let (Some(hub), Some(document_id)) = (&self.broadcast, document_id) {
            hub.broadcast(document_id, &event);
        }
    }
}

fn result_message(result: &ToolResult) -> ChatMessage {
    ChatMessage::tool(result.invocation_id.clone(), result.payload_text())
}

/// The best non-empty text available when the turn must end without a fresh
/// model answer. The bool says whether the text still needs persisting.
fn available_text(last_content: &str, results: &[ToolResult]) -> (String, bool) {
    if !last_content.is_empty() {
        (last_content.to_string(), false)
    } else if !results.is_empty() {
        (summarize_results(results), true)
    } else {
        (FALLBACK_ANSWER.to_string(), true)
    }
}

/// Factual per-tool summary used when the model never produced usable text.
fn summarize_results(results: &[ToolResult]) -> String {
    let mut lines = vec!["Here is what was done:".to_string()];
    for result in results {
        lines.push(format!(
            "- {}: {}",
            result.tool_name,
            if result.success { "succeeded" } else { "failed" }
        ));
    }
    lines.join("\n")
}

fn rate_limited_answer(decision: &RateLimitDecision) -> String {
    format!(
        "You have reached the limit of {} requests for now. Please retry in about {} seconds.",
        decision.limit,
        decision.retry_after().as_secs().max(1)
    )
}

/// Convenience check used by callers that surface errors to HTTP layers.
pub fn is_guard_rejection(error: &QuillError) -> bool {
    matches!(
        error,
        QuillError::CircuitOpen { .. } | QuillError::RateLimited { .. }
    )
}
