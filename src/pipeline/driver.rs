use std::sync::Arc;

use tracing::{Instrument, debug, info, info_span, warn};

use super::policy::{self, LoopLimits, Transition};
use super::state::{PipelineOutcome, PipelineState, Stage};
use super::{StageContext, applier, discovery, selector, synthesizer, validator};
use crate::config::PipelineConfig;
use crate::planner::PlannerClient;
use crate::sandbox::Executor;

/// Runs one pipeline to a terminal state against a prepared checkout.
pub struct PipelineDriver {
    planner: Arc<dyn PlannerClient>,
    executor: Arc<dyn Executor>,
    config: PipelineConfig,
    limits: LoopLimits,
}

impl PipelineDriver {
    pub fn new(planner: Arc<dyn PlannerClient>, executor: Arc<dyn Executor>, config: PipelineConfig) -> Self {
        let limits = LoopLimits::from(&config);
        Self {
            planner,
            executor,
            config,
            limits,
        }
    }

    /// Drive `state` until success or failure.
    ///
    /// The state is borrowed rather than owned so a caller that abandons the
    /// future (e.g. on a wall-clock timeout) still sees what was applied.
    pub async fn run(&self, job_id: &str, state: &mut PipelineState) -> PipelineOutcome {
        let span = info_span!("pipeline", job_id = %job_id);
        self.drive(state).instrument(span).await
    }

    async fn drive(&self, state: &mut PipelineState) -> PipelineOutcome {
        let ctx = StageContext {
            planner: self.planner.as_ref(),
            executor: self.executor.as_ref(),
            config: &self.config,
        };

        let mut stage = Stage::SelectMode;
        loop {
            state.enter(stage);
            debug!(stage = %stage, "entering stage");
            let next = match stage {
                Stage::SelectMode => {
                    selector::run(ctx, state).await;
                    Transition::Proceed(Stage::Discover)
                }
                Stage::Discover => {
                    if policy::may_search(state, &self.limits) {
                        discovery::discover(ctx, state).await;
                    } else {
                        info!(
                            attempts = state.search_attempts(),
                            "search budget spent; re-planning with previous candidates"
                        );
                    }
                    Transition::Proceed(Stage::Load)
                }
                Stage::Load => {
                    discovery::load(ctx, state).await;
                    Transition::Proceed(Stage::Plan)
                }
                Stage::Plan => {
                    synthesizer::run(ctx, state).await;
                    policy::after_plan(state, &self.limits)
                }
                Stage::Apply => {
                    applier::run(ctx, state).await;
                    Transition::Proceed(Stage::Validate)
                }
                Stage::Validate => {
                    validator::run(ctx, state).await;
                    policy::after_validate(state, &self.limits)
                }
            };

            stage = match next {
                Transition::Proceed(next_stage) => next_stage,
                Transition::RetrySearch => {
                    info!(attempt = state.search_attempts(), "no files found or planned; searching again");
                    Stage::Discover
                }
                Transition::RetryValidation => {
                    warn!(attempt = state.validation_attempts(), "validation failed; gathering context again");
                    Stage::Discover
                }
                Transition::Succeed => {
                    info!(
                        applied = state.applied_changes().len(),
                        search_attempts = state.search_attempts(),
                        validation_attempts = state.validation_attempts(),
                        "pipeline succeeded"
                    );
                    return PipelineOutcome::Success;
                }
                Transition::Fail(reason) => {
                    warn!(reason = %reason, "pipeline failed");
                    return PipelineOutcome::Failed { reason };
                }
            };
        }
    }
}
