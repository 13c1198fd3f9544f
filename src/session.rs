// src/session.rs
//
// One ResearchSession per invocation, owned exclusively by the orchestrator
// for its lifetime. Caller input is validated and clamped here so the rest
// of the engine can trust the session's bounds.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{CONFIG, MAX_DEPTH_CAP, MAX_QUERY_CHARS, TIME_LIMIT_CAP, TIME_LIMIT_FLOOR};
use crate::error::RequestError;

/// Caller-facing request. Depth and time limit are optional overrides,
/// clamped to the hard caps at session creation.
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    pub max_depth: Option<u32>,
    pub time_limit: Option<Duration>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_depth: None,
            time_limit: None,
        }
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

/// Terminal disposition of a session. Exactly one is ever assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    TimedOut,
    Failed,
}

/// Per-invocation research state. `current_depth` is monotonically
/// non-decreasing and never exceeds `max_depth`; `start_time` is set once
/// and never touched again.
#[derive(Debug)]
pub struct ResearchSession {
    pub id: Uuid,
    pub query: String,
    pub max_depth: u32,
    pub time_limit: Duration,
    pub current_depth: u32,
    pub status: SessionStatus,
    pub start_time: Instant,
    /// Running summary folded in by the ANALYZING state each iteration.
    pub summary: String,
}

impl ResearchSession {
    /// Validate the request and build a session with clamped bounds.
    pub fn new(request: &ResearchRequest) -> Result<Self, RequestError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RequestError::EmptyQuery);
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(RequestError::QueryTooLong {
                got: query.chars().count(),
                max: MAX_QUERY_CHARS,
            });
        }

        let max_depth = request
            .max_depth
            .unwrap_or_else(|| CONFIG.default_max_depth())
            .clamp(1, MAX_DEPTH_CAP);
        let time_limit = request
            .time_limit
            .unwrap_or_else(|| CONFIG.default_time_limit())
            .clamp(TIME_LIMIT_FLOOR, TIME_LIMIT_CAP);

        Ok(Self {
            id: Uuid::new_v4(),
            query: query.to_string(),
            max_depth,
            time_limit,
            current_depth: 0,
            status: SessionStatus::Active,
            start_time: Instant::now(),
            summary: String::new(),
        })
    }

    /// Wall-clock time spent so far.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time remaining before the wall-clock cap, zero if exhausted.
    pub fn remaining(&self) -> Duration {
        self.time_limit.saturating_sub(self.elapsed())
    }

    /// Advance the depth counter after a PLANNING cycle.
    pub fn increment_depth(&mut self) {
        debug_assert!(self.current_depth < self.max_depth);
        self.current_depth += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_rejected() {
        let err = ResearchSession::new(&ResearchRequest::new("   ")).unwrap_err();
        assert_eq!(err, RequestError::EmptyQuery);
    }

    #[test]
    fn test_overlong_query_rejected() {
        let query = "q".repeat(MAX_QUERY_CHARS + 1);
        let err = ResearchSession::new(&ResearchRequest::new(query)).unwrap_err();
        assert!(matches!(err, RequestError::QueryTooLong { .. }));
    }

    #[test]
    fn test_depth_clamped_to_hard_cap() {
        let request = ResearchRequest::new("rust async runtimes").with_max_depth(50);
        let session = ResearchSession::new(&request).unwrap();
        assert_eq!(session.max_depth, MAX_DEPTH_CAP);
    }

    #[test]
    fn test_time_limit_clamped_to_hard_cap() {
        let request =
            ResearchRequest::new("rust async runtimes").with_time_limit(Duration::from_secs(3600));
        let session = ResearchSession::new(&request).unwrap();
        assert_eq!(session.time_limit, TIME_LIMIT_CAP);

        let request =
            ResearchRequest::new("rust async runtimes").with_time_limit(Duration::from_millis(1));
        let session = ResearchSession::new(&request).unwrap();
        assert_eq!(session.time_limit, TIME_LIMIT_FLOOR);
    }

    #[test]
    fn test_new_session_starts_at_depth_zero() {
        let session = ResearchSession::new(&ResearchRequest::new("quic vs tcp")).unwrap();
        assert_eq!(session.current_depth, 0);
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.summary.is_empty());
    }
}
