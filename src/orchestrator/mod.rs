// src/orchestrator/mod.rs
//
// The research state machine. One orchestrator drives one session at a
// time through INIT → (SEARCHING → EXTRACTING → ANALYZING → PLANNING)* →
// SYNTHESIZING → DONE, consulting the budget at every iteration start,
// checking cancellation at state boundaries, and emitting the ordered
// event stream as a side effect of each transition.
//
// Provider errors never escape the session: they resolve to error
// activity items and the loop keeps going while budget remains. Once INIT
// has succeeded the session always reaches DONE and emits exactly one
// finish event.

mod types;

pub use types::{OrchestratorOptions, ResearchState};

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::activity::{ActivityHandle, ActivityKind, ActivityLog, ActivityOutcome};
use crate::budget::BudgetController;
use crate::error::ProviderError;
use crate::events::{event_channel, EventSink, ResearchEvent};
use crate::planner::{PlanDecision, Planner};
use crate::providers::{ExtractProvider, ReasoningEngine, SearchProvider};
use crate::session::{ResearchRequest, ResearchSession, SessionStatus};
use crate::sources::{SourceCandidate, SourceRegistry};
use crate::synthesizer::Synthesizer;

/// Steps per loop iteration (search, extract, analyze, plan), used for the
/// progress-init estimate together with init and synthesis.
const STEPS_PER_ITERATION: u32 = 4;

pub struct ResearchOrchestrator {
    search: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ExtractProvider>,
    engine: Arc<dyn ReasoningEngine>,
    planner: Planner,
    synthesizer: Synthesizer,
    opts: OrchestratorOptions,
}

impl ResearchOrchestrator {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ExtractProvider>,
        engine: Arc<dyn ReasoningEngine>,
    ) -> Self {
        Self::with_options(search, extractor, engine, OrchestratorOptions::default())
    }

    pub fn with_options(
        search: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ExtractProvider>,
        engine: Arc<dyn ReasoningEngine>,
        opts: OrchestratorOptions,
    ) -> Self {
        let planner = Planner::new(engine.clone(), opts.planner_max_retries, opts.reasoning_timeout);
        let synthesizer = Synthesizer::new(engine.clone(), opts.reasoning_timeout);
        Self {
            search,
            extractor,
            engine,
            planner,
            synthesizer,
            opts,
        }
    }

    /// Spawn a session and hand back its event stream. The stream ends
    /// after the terminal finish event.
    pub fn stream(
        self: Arc<Self>,
        request: ResearchRequest,
        cancel: CancellationToken,
    ) -> ReceiverStream<ResearchEvent> {
        let (sink, stream) = event_channel(self.opts.event_queue_capacity);
        tokio::spawn(async move {
            self.run(request, sink, cancel).await;
        });
        stream
    }

    /// Drive one session from INIT to DONE. Always emits exactly one
    /// finish event and returns the terminal status.
    pub async fn run(
        &self,
        request: ResearchRequest,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> SessionStatus {
        // INIT: validate and clamp. A bad request goes straight to DONE
        // with a failed status and an explanatory report.
        let session = match ResearchSession::new(&request) {
            Ok(session) => session,
            Err(e) => {
                warn!("session rejected at INIT: {}", e);
                sink.emit(ResearchEvent::Finish {
                    report: format!("Research could not start: {}.", e),
                    status: SessionStatus::Failed,
                    elapsed_ms: 0,
                    iterations: 0,
                    source_count: 0,
                })
                .await;
                return SessionStatus::Failed;
            }
        };

        self.run_session(session, sink, cancel).await
    }

    /// Drive an already validated session through the state machine.
    pub async fn run_session(
        &self,
        mut session: ResearchSession,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> SessionStatus {
        info!(
            session_id = %session.id,
            query = %session.query,
            max_depth = session.max_depth,
            time_limit_secs = session.time_limit.as_secs(),
            "research session started"
        );
        sink.emit(ResearchEvent::ProgressInit {
            estimated_total_steps: session.max_depth * STEPS_PER_ITERATION + 2,
        })
        .await;

        let mut activity = ActivityLog::new();
        let mut sources = SourceRegistry::new();
        // First iteration searches the original query; later iterations
        // run the planner's queries sequentially in returned order.
        let mut queries = vec![session.query.clone()];
        let mut cancelled = false;
        let mut new_this_iteration: Vec<String> = Vec::new();

        let mut state = ResearchState::Init;
        loop {
            if state != ResearchState::Done && cancel.is_cancelled() && !cancelled {
                // Short-circuit to synthesis with whatever has accumulated
                cancelled = true;
                if state != ResearchState::Synthesizing {
                    debug!(session_id = %session.id, from = %state, "cancellation observed");
                    state = ResearchState::Synthesizing;
                }
            }

            debug!(session_id = %session.id, state = %state, depth = session.current_depth, "entering state");
            state = match state {
                ResearchState::Init => ResearchState::Searching,

                ResearchState::Searching => {
                    if !BudgetController::should_start_iteration(&session) {
                        ResearchState::Synthesizing
                    } else {
                        new_this_iteration = self
                            .searching(&session, &queries, &mut activity, &mut sources, &sink)
                            .await;
                        ResearchState::Extracting
                    }
                }

                ResearchState::Extracting => {
                    self.extracting(&session, &new_this_iteration, &mut activity, &mut sources, &sink)
                        .await;
                    ResearchState::Analyzing
                }

                ResearchState::Analyzing => {
                    self.analyzing(&mut session, &mut activity, &sources, &sink).await;
                    ResearchState::Planning
                }

                ResearchState::Planning => {
                    let next = self.planning(&mut session, &mut activity, &sources, &sink).await;
                    match next {
                        Some(next_queries) if BudgetController::should_start_iteration(&session) => {
                            queries = next_queries;
                            ResearchState::Searching
                        }
                        _ => ResearchState::Synthesizing,
                    }
                }

                ResearchState::Synthesizing => {
                    // The budget check here only picks full vs partial
                    // wording; synthesis always runs exactly once.
                    let partial = cancelled || !BudgetController::should_start_iteration(&session);
                    let (handle, item) = activity.record(
                        ActivityKind::Synthesize,
                        "writing final report".to_string(),
                        session.current_depth,
                    );
                    sink.emit(item.into()).await;

                    let report = self
                        .synthesizer
                        .synthesize(&session, &activity, &sources, partial, &sink)
                        .await;

                    let resolved = activity.resolve(
                        handle,
                        ActivityOutcome::Complete(format!("report ready ({} chars)", report.len())),
                    );
                    sink.emit(resolved.into()).await;

                    session.status = if BudgetController::time_exhausted(&session) {
                        SessionStatus::TimedOut
                    } else {
                        SessionStatus::Completed
                    };

                    sink.emit(ResearchEvent::Finish {
                        report,
                        status: session.status,
                        elapsed_ms: session.elapsed().as_millis() as u64,
                        iterations: session.current_depth,
                        source_count: sources.extracted_count(),
                    })
                    .await;
                    ResearchState::Done
                }

                ResearchState::Done => break,
            };
        }

        info!(
            session_id = %session.id,
            status = ?session.status,
            iterations = session.current_depth,
            sources = sources.extracted_count(),
            elapsed_ms = session.elapsed().as_millis() as u64,
            "research session finished"
        );
        session.status
    }

    /// SEARCHING: run the iteration's queries sequentially, register every
    /// hit as a candidate, and return the canonical URLs that were new this
    /// iteration in discovery order. Candidates only become shared sources
    /// once EXTRACTING secures their content.
    async fn searching(
        &self,
        session: &ResearchSession,
        queries: &[String],
        activity: &mut ActivityLog,
        sources: &mut SourceRegistry,
        sink: &EventSink,
    ) -> Vec<String> {
        let mut newly_registered = Vec::new();

        for query in queries {
            let (handle, item) = activity.record(
                ActivityKind::Search,
                format!("searching: {}", query),
                session.current_depth,
            );
            sink.emit(item.into()).await;

            let outcome = match timeout(
                self.opts.search_timeout,
                self.search.search(query, self.opts.search_max_results),
            )
            .await
            {
                Ok(Ok(hits)) => {
                    let total = hits.len();
                    let mut new_count = 0;
                    for hit in hits {
                        let registration = sources.register(SourceCandidate {
                            url: hit.url,
                            title: hit.title,
                            snippet: hit.snippet,
                        });
                        if registration.is_new {
                            new_count += 1;
                            newly_registered.push(registration.item.canonical_url.clone());
                        }
                    }
                    ActivityOutcome::Complete(format!(
                        "\"{}\": {} result(s), {} new",
                        query, total, new_count
                    ))
                }
                Ok(Err(e)) => {
                    warn!(query = %query, "search failed: {}", e);
                    ActivityOutcome::Error(format!("search failed: {}", e))
                }
                Err(_) => {
                    warn!(query = %query, "search timed out");
                    ActivityOutcome::Error(format!(
                        "search timed out after {:?}",
                        self.opts.search_timeout
                    ))
                }
            };

            let resolved = activity.resolve(handle, outcome);
            sink.emit(resolved.into()).await;
        }

        newly_registered
    }

    /// EXTRACTING: pull content from the top-K sources newly registered
    /// this iteration. The K calls run concurrently, each bounded by its
    /// own timeout; one failure never aborts its siblings. Each successful
    /// extraction emits the source-delta that shares the source with the
    /// observer.
    async fn extracting(
        &self,
        session: &ResearchSession,
        new_canonicals: &[String],
        activity: &mut ActivityLog,
        sources: &mut SourceRegistry,
        sink: &EventSink,
    ) {
        let targets: Vec<(String, String, String)> = new_canonicals
            .iter()
            .take(self.opts.extract_top_k)
            .filter_map(|canonical| {
                sources
                    .all_sources()
                    .iter()
                    .find(|s| &s.canonical_url == canonical)
                    .map(|s| (canonical.clone(), s.url.clone(), s.title.clone()))
            })
            .collect();

        if targets.is_empty() {
            debug!(session_id = %session.id, "nothing new to extract");
            return;
        }

        // Record all pending items up front so the log carries one entry
        // per URL before any result lands.
        let mut pending: Vec<(ActivityHandle, String)> = Vec::new();
        for (canonical, url, _) in &targets {
            let (handle, item) = activity.record(
                ActivityKind::Extract,
                format!("extracting: {}", url),
                session.current_depth,
            );
            sink.emit(item.into()).await;
            pending.push((handle, canonical.clone()));
        }

        let prompt = format!("Extract content relevant to: {}", session.query);
        let calls = targets.iter().map(|(_, url, _)| {
            let url = url.clone();
            let prompt = prompt.clone();
            async move {
                match timeout(self.opts.extract_timeout, self.extractor.extract(&url, &prompt)).await
                {
                    Ok(result) => result,
                    // A timed-out call is a failed call, not a fatal one
                    Err(_) => Err(ProviderError::Timeout(self.opts.extract_timeout)),
                }
            }
        });
        let results = join_all(calls).await;

        for (((handle, canonical), (_, url, title)), result) in
            pending.into_iter().zip(targets).zip(results)
        {
            let outcome = match result {
                Ok(extraction) => {
                    let chars = extraction.content.len();
                    sources.attach_content(&canonical, extraction.content);
                    sink.emit(ResearchEvent::SourceDelta { url, title }).await;
                    ActivityOutcome::Complete(format!("extracted {} chars", chars))
                }
                Err(e) => {
                    warn!("extraction failed: {}", e);
                    ActivityOutcome::Error(format!("extraction failed: {}", e))
                }
            };
            let resolved = activity.resolve(handle, outcome);
            sink.emit(resolved.into()).await;
        }
    }

    /// ANALYZING: fold the iteration's extracted content and the prior
    /// summary into an updated running summary. On failure the summary is
    /// left unchanged.
    async fn analyzing(
        &self,
        session: &mut ResearchSession,
        activity: &mut ActivityLog,
        sources: &SourceRegistry,
        sink: &EventSink,
    ) {
        let (handle, item) = activity.record(
            ActivityKind::Analyze,
            "updating running summary".to_string(),
            session.current_depth,
        );
        sink.emit(item.into()).await;

        let prompt = format!(
            r#"You are analyzing web research findings.

RESEARCH QUESTION: "{query}"

PRIOR SUMMARY:
{summary}

SOURCES (with extracted content where available):
{sources}

Fold the new findings into the prior summary. Keep concrete facts, numbers
and attributions; drop anything the sources do not support. Respond with
only the updated summary."#,
            query = session.query,
            summary = if session.summary.is_empty() { "(none yet)" } else { &session.summary },
            sources = sources.digest(),
        );

        let outcome = match timeout(self.opts.reasoning_timeout, self.engine.complete(&prompt, None))
            .await
        {
            Ok(Ok(updated)) if !updated.trim().is_empty() => {
                session.summary = updated.trim().to_string();
                ActivityOutcome::Complete(format!("summary updated ({} chars)", session.summary.len()))
            }
            Ok(Ok(_)) => ActivityOutcome::Error("analysis returned empty summary".to_string()),
            Ok(Err(e)) => {
                warn!("analysis failed: {}", e);
                ActivityOutcome::Error(format!("analysis failed: {}", e))
            }
            Err(_) => ActivityOutcome::Error(format!(
                "analysis timed out after {:?}",
                self.opts.reasoning_timeout
            )),
        };

        let resolved = activity.resolve(handle, outcome);
        sink.emit(resolved.into()).await;
    }

    /// PLANNING: ask the planner whether to continue, then advance the
    /// depth counter. Returns the next query set when the loop should go
    /// around again.
    async fn planning(
        &self,
        session: &mut ResearchSession,
        activity: &mut ActivityLog,
        sources: &SourceRegistry,
        sink: &EventSink,
    ) -> Option<Vec<String>> {
        let (handle, item) = activity.record(
            ActivityKind::Plan,
            "deciding next step".to_string(),
            session.current_depth,
        );
        sink.emit(item.into()).await;

        let result = self.planner.plan(session, activity, sources).await;

        let outcome = if result.degraded {
            // Planner fell back to the safe default; recorded as an error
            // activity, never a session failure.
            ActivityOutcome::Error(result.plan.rationale.clone())
        } else {
            ActivityOutcome::Complete(match result.plan.decision {
                PlanDecision::Continue => format!(
                    "continue with {} quer(ies): {}",
                    result.plan.next_queries.len(),
                    result.plan.rationale
                ),
                PlanDecision::Finish => format!("finish: {}", result.plan.rationale),
            })
        };
        let resolved = activity.resolve(handle, outcome);
        sink.emit(resolved.into()).await;

        session.increment_depth();
        sink.emit(ResearchEvent::DepthDelta {
            depth: session.current_depth,
        })
        .await;

        match result.plan.decision {
            PlanDecision::Continue => Some(result.plan.next_queries),
            PlanDecision::Finish => None,
        }
    }
}
