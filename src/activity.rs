// src/activity.rs
//
// Append-only log of research steps. Each entry starts pending and is
// resolved exactly once to complete or error. The log is the single source
// of truth fed into the ANALYZING and SYNTHESIZING prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Search,
    Extract,
    Analyze,
    Plan,
    Synthesize,
}

impl ActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActivityKind::Search => "search",
            ActivityKind::Extract => "extract",
            ActivityKind::Analyze => "analyze",
            ActivityKind::Plan => "plan",
            ActivityKind::Synthesize => "synthesize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    Complete,
    Error,
}

/// One logged research step. Never mutated after creation except for the
/// pending → complete/error transition (and its message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub status: ActivityStatus,
    pub message: String,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
}

/// Opaque handle to a pending entry, consumed by `resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityHandle(usize);

/// Outcome used to resolve a pending entry.
#[derive(Debug, Clone)]
pub enum ActivityOutcome {
    Complete(String),
    Error(String),
}

#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: Vec<ActivityItem>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pending entry, returning a handle plus a snapshot for the
    /// caller to emit as an activity-delta event.
    pub fn record(&mut self, kind: ActivityKind, message: String, depth: u32) -> (ActivityHandle, ActivityItem) {
        let item = ActivityItem {
            kind,
            status: ActivityStatus::Pending,
            message,
            depth,
            timestamp: Utc::now(),
        };
        self.entries.push(item.clone());
        (ActivityHandle(self.entries.len() - 1), item)
    }

    /// Resolve a pending entry to complete or error, returning the updated
    /// snapshot for the second activity-delta event.
    pub fn resolve(&mut self, handle: ActivityHandle, outcome: ActivityOutcome) -> ActivityItem {
        let entry = &mut self.entries[handle.0];
        debug_assert_eq!(entry.status, ActivityStatus::Pending);
        match outcome {
            ActivityOutcome::Complete(message) => {
                entry.status = ActivityStatus::Complete;
                entry.message = message;
            }
            ActivityOutcome::Error(message) => {
                entry.status = ActivityStatus::Error;
                entry.message = message;
            }
        }
        entry.clone()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[ActivityItem] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact text rendering used in ANALYZING and SYNTHESIZING prompts.
    pub fn transcript(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "[depth {}] {} ({}): {}",
                    e.depth,
                    e.kind.label(),
                    match e.status {
                        ActivityStatus::Pending => "pending",
                        ActivityStatus::Complete => "ok",
                        ActivityStatus::Error => "error",
                    },
                    e.message
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_resolve() {
        let mut log = ActivityLog::new();
        let (handle, item) = log.record(ActivityKind::Search, "searching: quic".into(), 0);
        assert_eq!(item.status, ActivityStatus::Pending);

        let resolved = log.resolve(handle, ActivityOutcome::Complete("found 4 results".into()));
        assert_eq!(resolved.status, ActivityStatus::Complete);
        assert_eq!(resolved.message, "found 4 results");
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn test_error_outcome() {
        let mut log = ActivityLog::new();
        let (handle, _) = log.record(ActivityKind::Extract, "extracting".into(), 1);
        let resolved = log.resolve(handle, ActivityOutcome::Error("timeout".into()));
        assert_eq!(resolved.status, ActivityStatus::Error);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut log = ActivityLog::new();
        log.record(ActivityKind::Search, "a".into(), 0);
        log.record(ActivityKind::Extract, "b".into(), 0);
        log.record(ActivityKind::Analyze, "c".into(), 0);

        let kinds: Vec<_> = log.entries().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ActivityKind::Search, ActivityKind::Extract, ActivityKind::Analyze]
        );
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let mut log = ActivityLog::new();
        for i in 0..5 {
            log.record(ActivityKind::Plan, format!("step {}", i), 0);
        }
        let stamps: Vec<_> = log.entries().iter().map(|e| e.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_transcript_rendering() {
        let mut log = ActivityLog::new();
        let (h, _) = log.record(ActivityKind::Search, "searching: quic".into(), 0);
        log.resolve(h, ActivityOutcome::Complete("found 2 results".into()));

        let transcript = log.transcript();
        assert!(transcript.contains("[depth 0] search (ok): found 2 results"));
    }
}
