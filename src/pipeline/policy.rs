//! Transition policy: pure decisions over the accumulated state.

use super::state::{FailureReason, PipelineState, Stage};
use crate::config::PipelineConfig;

/// Retry caps for the two re-entrant loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_search_attempts: u32,
    pub max_validation_attempts: u32,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_search_attempts: 3,
            max_validation_attempts: 3,
        }
    }
}

impl From<&PipelineConfig> for LoopLimits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_search_attempts: config.max_search_attempts,
            max_validation_attempts: config.max_validation_attempts,
        }
    }
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Proceed(Stage),
    /// Nothing found and nothing planned; search again.
    RetrySearch,
    /// Verification failed; gather context again before re-planning.
    RetryValidation,
    Succeed,
    Fail(FailureReason),
}

fn recorded_failure(state: &PipelineState) -> Option<Transition> {
    state.failure().map(|f| {
        Transition::Fail(FailureReason::Stage {
            stage: f.stage,
            message: f.message.clone(),
        })
    })
}

/// Decide the edge taken after `Plan`.
///
/// Found candidates are authoritative: when any discovery run found files
/// the pipeline always proceeds to `Apply`.
pub fn after_plan(state: &PipelineState, limits: &LoopLimits) -> Transition {
    if let Some(fail) = recorded_failure(state) {
        return fail;
    }
    if state.candidates_ever_found() || !state.change_plan().is_empty() {
        return Transition::Proceed(Stage::Apply);
    }
    if state.search_attempts() < limits.max_search_attempts {
        Transition::RetrySearch
    } else {
        Transition::Fail(FailureReason::SearchExhausted {
            attempts: state.search_attempts(),
        })
    }
}

/// Decide the edge taken after `Validate`.
pub fn after_validate(state: &PipelineState, limits: &LoopLimits) -> Transition {
    if let Some(fail) = recorded_failure(state) {
        return fail;
    }
    if state.applied_changes().is_empty() {
        return Transition::Succeed;
    }
    match state.validation_passed() {
        Some(false) if state.validation_attempts() < limits.max_validation_attempts => {
            Transition::RetryValidation
        }
        Some(false) => Transition::Fail(FailureReason::ValidationExhausted {
            attempts: state.validation_attempts(),
        }),
        _ => Transition::Succeed,
    }
}

/// Whether discovery may run again. A validation retry can re-enter
/// discovery after the search budget is spent; discovery is then skipped.
pub fn may_search(state: &PipelineState, limits: &LoopLimits) -> bool {
    state.search_attempts() < limits.max_search_attempts
}
