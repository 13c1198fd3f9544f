// src/budget.rs

use crate::session::ResearchSession;

/// Pure predicate over the session's depth and wall-clock budget.
///
/// Checked at the top of every loop iteration and once before synthesis
/// (the latter only to choose full vs partial wording - synthesis itself
/// always runs exactly once). No side effects, no mutation.
pub struct BudgetController;

impl BudgetController {
    /// True while another SEARCHING→…→PLANNING cycle may start.
    pub fn should_start_iteration(session: &ResearchSession) -> bool {
        session.current_depth < session.max_depth && session.elapsed() < session.time_limit
    }

    /// True once the wall-clock cap has been reached. Used by DONE to pick
    /// the timed_out status.
    pub fn time_exhausted(session: &ResearchSession) -> bool {
        session.elapsed() >= session.time_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ResearchRequest;
    use std::time::Duration;

    #[test]
    fn test_fresh_session_may_iterate() {
        let session = ResearchSession::new(&ResearchRequest::new("test query")).unwrap();
        assert!(BudgetController::should_start_iteration(&session));
        assert!(!BudgetController::time_exhausted(&session));
    }

    #[test]
    fn test_depth_cap_blocks_iteration() {
        let request = ResearchRequest::new("test query").with_max_depth(1);
        let mut session = ResearchSession::new(&request).unwrap();
        session.increment_depth();
        assert!(!BudgetController::should_start_iteration(&session));
    }

    #[test]
    fn test_time_cap_blocks_iteration() {
        let request =
            ResearchRequest::new("test query").with_time_limit(Duration::from_millis(1));
        let session = ResearchSession::new(&request).unwrap();
        std::thread::sleep(Duration::from_millis(1200));
        assert!(!BudgetController::should_start_iteration(&session));
        assert!(BudgetController::time_exhausted(&session));
    }
}
