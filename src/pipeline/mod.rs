//! Edit-orchestration pipeline.
//!
//! A run walks `SelectMode → Discover → Load → Plan → Apply → Validate`
//! with two bounded loops back to `Discover`: one after `Plan` when nothing
//! was found, one after `Validate` when the verification command fails.
//! Every stage reads and writes one [`PipelineState`]; [`policy`] decides
//! the edges and [`PipelineDriver`] runs the loop.

pub mod applier;
pub mod context;
pub mod discovery;
pub mod driver;
pub mod policy;
pub mod prompts;
pub mod selector;
pub mod state;
pub mod synthesizer;
pub mod validator;

pub use context::RepoContext;
pub use driver::PipelineDriver;
pub use policy::{LoopLimits, Transition};
pub use state::{
    AppliedChange, Failure, FailureReason, PipelineOutcome, PipelineState, PlanAction, PlanEntry, SearchMode, Stage,
};

use crate::config::PipelineConfig;
use crate::planner::PlannerClient;
use crate::sandbox::Executor;

/// Collaborators shared by every stage of one run.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub planner: &'a dyn PlannerClient,
    pub executor: &'a dyn Executor,
    pub config: &'a PipelineConfig,
}
