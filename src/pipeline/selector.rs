use tracing::{info, warn};

use super::StageContext;
use super::prompts;
use super::state::{PipelineState, SearchMode};
use crate::planner::response::single_token;

/// Ask the planner to classify the instruction into a search mode.
///
/// Runs once per pipeline; a re-entry keeps the earlier choice. Anything
/// the planner says that isn't a known mode falls back to `Literal`.
pub async fn run(ctx: StageContext<'_>, state: &mut PipelineState) {
    if state.search_mode_selected() {
        return;
    }

    let mode = match ctx.planner.invoke(&prompts::select_mode(state.instruction())).await {
        Ok(answer) => single_token(&answer)
            .and_then(|word| SearchMode::from_classification(&word))
            .unwrap_or_else(|| {
                warn!(answer = %answer.trim(), "unrecognised search mode; using literal");
                SearchMode::Literal
            }),
        Err(e) => {
            warn!(error = %e, "search mode selection failed; using literal");
            state.note_error(format!("search mode selection failed: {}", e));
            SearchMode::Literal
        }
    };

    info!(mode = %mode, "search mode selected");
    state.select_search_mode(mode);
}
