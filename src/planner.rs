// src/planner.rs
//
// One reasoning-engine call per iteration with a strict response contract.
// The engine's answer is forced through a three-way outcome so every path
// is handled explicitly: well-formed plans are used, malformed output is
// retried with a clarifying follow-up, and exhausted retries (or transport
// failure) collapse to a safe default finish plan. The loop can never hang
// or crash because the reasoning engine misbehaves.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::activity::ActivityLog;
use crate::providers::ReasoningEngine;
use crate::session::ResearchSession;
use crate::sources::SourceRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanDecision {
    Continue,
    Finish,
}

/// Ephemeral plan, produced once per iteration and consumed immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub decision: PlanDecision,
    #[serde(default)]
    pub next_queries: Vec<String>,
    pub rationale: String,
}

impl ResearchPlan {
    /// The plan used when the reasoning engine cannot produce one.
    pub fn safe_default(reason: &str) -> Self {
        Self {
            decision: PlanDecision::Finish,
            next_queries: Vec::new(),
            rationale: format!("planning failed: {}", reason),
        }
    }
}

/// Result of one planning attempt, before retries are applied.
#[derive(Debug)]
enum PlanOutcome {
    WellFormed(ResearchPlan),
    Malformed(String),
    Failed(String),
}

/// What the orchestrator receives: the plan plus whether planning degraded
/// to the safe default (recorded as an error activity, not a failure).
#[derive(Debug)]
pub struct PlanResult {
    pub plan: ResearchPlan,
    pub degraded: bool,
}

pub struct Planner {
    engine: Arc<dyn ReasoningEngine>,
    max_retries: u32,
    // Per-attempt bound; an elapsed attempt degrades to the safe default
    timeout: Duration,
}

impl Planner {
    pub fn new(engine: Arc<dyn ReasoningEngine>, max_retries: u32, timeout: Duration) -> Self {
        Self {
            engine,
            max_retries,
            timeout,
        }
    }

    /// Decide whether to continue researching and with which queries.
    pub async fn plan(
        &self,
        session: &ResearchSession,
        activity: &ActivityLog,
        sources: &SourceRegistry,
    ) -> PlanResult {
        let mut prompt = self.build_prompt(session, activity, sources);

        for attempt in 0..=self.max_retries {
            match self.attempt(&prompt).await {
                PlanOutcome::WellFormed(plan) => {
                    debug!(attempt, decision = ?plan.decision, "planner produced a plan");
                    return PlanResult { plan, degraded: false };
                }
                PlanOutcome::Malformed(raw) => {
                    warn!(attempt, "planner returned malformed output, retrying");
                    prompt = self.clarifying_prompt(session, &raw);
                }
                PlanOutcome::Failed(reason) => {
                    warn!(attempt, %reason, "planner call failed");
                    return PlanResult {
                        plan: ResearchPlan::safe_default(&reason),
                        degraded: true,
                    };
                }
            }
        }

        PlanResult {
            plan: ResearchPlan::safe_default("retries exhausted on malformed output"),
            degraded: true,
        }
    }

    async fn attempt(&self, prompt: &str) -> PlanOutcome {
        match timeout(self.timeout, self.engine.complete(prompt, Some(plan_schema()))).await {
            Ok(Ok(raw)) => match parse_plan(&raw) {
                Some(plan) => PlanOutcome::WellFormed(plan),
                None => PlanOutcome::Malformed(raw),
            },
            Ok(Err(e)) => PlanOutcome::Failed(e.to_string()),
            Err(_) => PlanOutcome::Failed(format!("planner call timed out after {:?}", self.timeout)),
        }
    }

    fn build_prompt(
        &self,
        session: &ResearchSession,
        activity: &ActivityLog,
        sources: &SourceRegistry,
    ) -> String {
        let iterations_left = session.max_depth.saturating_sub(session.current_depth);
        format!(
            r#"You are directing an iterative web research session.

ORIGINAL QUESTION: "{query}"

RUNNING SUMMARY:
{summary}

RESEARCH LOG:
{log}

SOURCES GATHERED ({source_count}):
{sources}

BUDGET: {iterations_left} iteration(s) and {seconds_left}s of wall-clock time remain.

Decide whether more searching would materially improve the answer.
Respond with JSON only:
{{"decision": "continue" or "finish", "next_queries": ["..."], "rationale": "..."}}

Rules:
1. "next_queries" must be non-empty if and only if decision is "continue".
2. Propose at most 3 queries, each covering an angle not yet searched.
3. Prefer "finish" when the summary already answers the question or the budget is nearly spent."#,
            query = session.query,
            summary = if session.summary.is_empty() { "(none yet)" } else { &session.summary },
            log = activity.transcript(),
            source_count = sources.len(),
            sources = sources.digest(),
            iterations_left = iterations_left,
            seconds_left = session.remaining().as_secs(),
        )
    }

    fn clarifying_prompt(&self, session: &ResearchSession, raw: &str) -> String {
        format!(
            r#"Your previous reply could not be parsed as a research plan.

Previous reply:
{raw}

For the research question "{query}", respond again with ONLY this JSON shape and nothing else:
{{"decision": "continue" or "finish", "next_queries": ["..."], "rationale": "..."}}
"next_queries" must be non-empty exactly when decision is "continue"."#,
            raw = raw,
            query = session.query,
        )
    }
}

/// JSON schema sent with the structured completion request.
fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decision": {
                "type": "string",
                "enum": ["continue", "finish"]
            },
            "next_queries": {
                "type": "array",
                "items": {"type": "string"},
                "maxItems": 3
            },
            "rationale": {"type": "string"}
        },
        "required": ["decision", "next_queries", "rationale"],
        "additionalProperties": false
    })
}

/// Parse a plan out of raw engine output, tolerating markdown fences.
/// Returns None for anything that violates the response contract.
pub fn parse_plan(raw: &str) -> Option<ResearchPlan> {
    let json_str = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let plan: ResearchPlan = serde_json::from_str(json_str).ok()?;

    // Contract: continue requires at least one non-blank query
    match plan.decision {
        PlanDecision::Continue if plan.next_queries.iter().all(|q| q.trim().is_empty()) => None,
        _ => Some(plan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_plan() {
        let raw = r#"{"decision":"continue","next_queries":["quic handshake latency"],"rationale":"need latency data"}"#;
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.decision, PlanDecision::Continue);
        assert_eq!(plan.next_queries.len(), 1);
    }

    #[test]
    fn test_parse_tolerates_markdown_fences() {
        let raw = "```json\n{\"decision\":\"finish\",\"next_queries\":[],\"rationale\":\"done\"}\n```";
        let plan = parse_plan(raw).unwrap();
        assert_eq!(plan.decision, PlanDecision::Finish);
    }

    #[test]
    fn test_parse_rejects_continue_without_queries() {
        let raw = r#"{"decision":"continue","next_queries":[],"rationale":"hmm"}"#;
        assert!(parse_plan(raw).is_none());

        let raw = r#"{"decision":"continue","next_queries":["  "],"rationale":"hmm"}"#;
        assert!(parse_plan(raw).is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_plan("I think we should keep searching!").is_none());
        assert!(parse_plan("{\"decision\":\"maybe\"}").is_none());
    }

    #[test]
    fn test_safe_default_is_finish() {
        let plan = ResearchPlan::safe_default("engine unreachable");
        assert_eq!(plan.decision, PlanDecision::Finish);
        assert!(plan.next_queries.is_empty());
        assert!(plan.rationale.contains("engine unreachable"));
    }
}
