// src/orchestrator/types.rs

use std::fmt;
use std::time::Duration;

use crate::config::CONFIG;

/// States of the research loop. INIT is the sole entry, DONE the sole exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchState {
    Init,
    Searching,
    Extracting,
    Analyzing,
    Planning,
    Synthesizing,
    Done,
}

impl fmt::Display for ResearchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResearchState::Init => "INIT",
            ResearchState::Searching => "SEARCHING",
            ResearchState::Extracting => "EXTRACTING",
            ResearchState::Analyzing => "ANALYZING",
            ResearchState::Planning => "PLANNING",
            ResearchState::Synthesizing => "SYNTHESIZING",
            ResearchState::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Tunables for one orchestrator instance. Defaults come from config;
/// tests override them directly.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// How many newly registered sources to extract per iteration.
    pub extract_top_k: usize,
    /// Results requested per search call.
    pub search_max_results: usize,
    /// Bounded retries for malformed planner output.
    pub planner_max_retries: u32,
    pub search_timeout: Duration,
    pub extract_timeout: Duration,
    pub reasoning_timeout: Duration,
    /// Bounded event queue capacity for spawned sessions.
    pub event_queue_capacity: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            extract_top_k: CONFIG.extract_top_k,
            search_max_results: CONFIG.search_max_results,
            planner_max_retries: CONFIG.planner_max_retries,
            search_timeout: CONFIG.search_timeout(),
            extract_timeout: CONFIG.extract_timeout(),
            reasoning_timeout: CONFIG.reasoning_timeout(),
            event_queue_capacity: CONFIG.event_queue_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ResearchState::Searching.to_string(), "SEARCHING");
        assert_eq!(ResearchState::Done.to_string(), "DONE");
    }

    #[test]
    fn test_default_options_sane() {
        let opts = OrchestratorOptions::default();
        assert!(opts.extract_top_k > 0);
        assert!(opts.event_queue_capacity > 0);
    }
}
