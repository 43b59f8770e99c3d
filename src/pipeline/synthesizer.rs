//! Change-plan synthesis.

use std::cmp::Ordering;

use tracing::{info, warn};

use super::StageContext;
use super::context::RepoContext;
use super::prompts;
use super::state::{PipelineState, PlanAction, PlanEntry, Stage};
use crate::planner::response::{RawPlanEntry, parse_plan_entries};
use crate::sandbox::normalize_relative;

const MAX_NEW_FILES: usize = 3;

/// Produce a fresh change plan, replacing any earlier one.
///
/// With nothing loaded the planner proposes new files only, falling back to
/// a single placeholder file when its answer can't be parsed. Otherwise it
/// proposes edits against the loaded files.
pub async fn run(ctx: StageContext<'_>, state: &mut PipelineState) {
    let repo = RepoContext::detect(ctx.executor).await;
    if state.loaded_contents().is_empty() {
        plan_new_files(ctx, state, &repo).await;
    } else {
        plan_changes(ctx, state, &repo).await;
    }
    info!(entries = state.change_plan().len(), "change plan ready");
}

async fn plan_new_files(ctx: StageContext<'_>, state: &mut PipelineState, repo: &RepoContext) {
    let prompt = prompts::plan_new_files(state.instruction(), repo);
    let parsed = match ctx.planner.invoke(&prompt).await {
        Ok(answer) => parse_plan_entries(&answer).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let plan = match parsed {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|raw| to_entry(raw, Some(PlanAction::Create), state))
            .take(MAX_NEW_FILES)
            .collect(),
        Err(message) => {
            warn!(error = %message, "new-file planning failed; using fallback file");
            state.note_error(format!("new-file planning failed: {}", message));
            vec![PlanEntry::new(
                PlanAction::Create,
                &repo.fallback_path(),
                &format!("Create new file based on the request: {}", state.instruction()),
            )]
        }
    };
    state.set_plan(plan);
}

async fn plan_changes(ctx: StageContext<'_>, state: &mut PipelineState, repo: &RepoContext) {
    let prompt = prompts::plan_changes(
        state.instruction(),
        repo,
        state.loaded_contents(),
        ctx.config.context_chars,
        ctx.config.max_plan_entries,
        state.validation_feedback(),
    );
    let parsed = match ctx.planner.invoke(&prompt).await {
        Ok(answer) => parse_plan_entries(&answer).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let mut entries = match parsed {
        Ok(entries) => entries,
        Err(message) => {
            warn!(error = %message, "change planning failed");
            state.set_plan(Vec::new());
            state.fail(Stage::Plan, format!("Failed to analyze files: {}", message));
            return;
        }
    };

    // Stable: equal relevance keeps the planner's order.
    entries.sort_by(|a, b| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal));

    let plan: Vec<PlanEntry> = entries
        .into_iter()
        .filter_map(|raw| to_entry(raw, None, state))
        .take(ctx.config.max_plan_entries)
        .collect();
    state.set_plan(plan);
}

/// Validate one raw entry. `forced` overrides whatever action the planner gave.
fn to_entry(raw: RawPlanEntry, forced: Option<PlanAction>, state: &PipelineState) -> Option<PlanEntry> {
    let path = match normalize_relative(&raw.file) {
        Ok(path) => path,
        Err(e) => {
            warn!(path = %raw.file, error = %e, "dropping plan entry with unusable path");
            return None;
        }
    };

    let action = match (forced, raw.action.as_deref()) {
        (Some(action), _) => action,
        (None, Some(word)) => match word.parse::<PlanAction>() {
            Ok(action) => action,
            Err(e) => {
                warn!(path = %path, error = %e, "dropping plan entry");
                return None;
            }
        },
        (None, None) if state.loaded_contents().contains_key(&path) => PlanAction::Edit,
        (None, None) => PlanAction::Create,
    };

    let goal = if raw.goal.trim().is_empty() {
        raw.reason.unwrap_or_else(|| state.instruction().to_string())
    } else {
        raw.goal
    };

    Some(PlanEntry { action, path, goal })
}
