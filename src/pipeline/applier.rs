//! Applies a change plan to the checkout.

use std::path::Path;

use tracing::{debug, info, warn};

use super::StageContext;
use super::prompts;
use super::state::{PipelineState, PlanAction, PlanEntry, Stage};
use crate::errors::ExecutorError;
use crate::planner::response::unwrap_file_content;
use crate::sandbox::{DEFAULT_COMMAND_TIMEOUT, shell_escape};

/// Counts for one pass over the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub written: usize,
    pub deleted: usize,
    pub skipped: usize,
}

enum EntryResult {
    Written(String),
    Deleted,
    Skipped,
}

/// Execute every plan entry in order.
///
/// Per-entry problems (unreadable file, planner error, unchanged content)
/// skip that entry. Executor write failures are collected and turned into a
/// stage failure once the whole plan has been processed, so earlier writes
/// stay recorded.
pub async fn run(ctx: StageContext<'_>, state: &mut PipelineState) -> ApplySummary {
    let plan: Vec<PlanEntry> = state.change_plan().to_vec();
    let mut summary = ApplySummary::default();
    let mut first_error: Option<String> = None;

    for entry in &plan {
        let result = match entry.action {
            PlanAction::Create => create(ctx, state, entry).await,
            PlanAction::Edit => edit(ctx, state, entry).await,
            PlanAction::Delete => delete(ctx, entry).await,
        };
        match result {
            Ok(EntryResult::Written(content)) => {
                summary.written += 1;
                state.record_applied(&entry.path, &content);
            }
            Ok(EntryResult::Deleted) => summary.deleted += 1,
            Ok(EntryResult::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!(path = %entry.path, action = entry.action.as_str(), error = %e, "plan entry failed");
                summary.skipped += 1;
                first_error.get_or_insert_with(|| format!("{} {}: {}", entry.action.as_str(), entry.path, e));
            }
        }
    }

    if let Some(message) = first_error {
        state.fail(Stage::Apply, message);
    }
    info!(
        written = summary.written,
        deleted = summary.deleted,
        skipped = summary.skipped,
        "plan applied"
    );
    summary
}

async fn create(
    ctx: StageContext<'_>,
    state: &PipelineState,
    entry: &PlanEntry,
) -> Result<EntryResult, ExecutorError> {
    if let Some(parent) = Path::new(&entry.path).parent().and_then(Path::to_str)
        && !parent.is_empty()
    {
        let cmd = format!(
            "cd {} && mkdir -p {}",
            shell_escape(&ctx.executor.checkout_dir()),
            shell_escape(parent)
        );
        let output = ctx.executor.run_command(&cmd, DEFAULT_COMMAND_TIMEOUT).await?;
        if !output.success() {
            return Err(ExecutorError::CommandFailed {
                command: cmd,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
    }

    let prompt = prompts::generate_file(&entry.path, &entry.goal, state.instruction());
    let content = match ctx.planner.invoke(&prompt).await {
        Ok(answer) => unwrap_file_content(&answer),
        Err(e) => {
            warn!(path = %entry.path, error = %e, "file generation failed; skipping");
            return Ok(EntryResult::Skipped);
        }
    };

    ctx.executor.write_file(&entry.path, &content).await?;
    debug!(path = %entry.path, bytes = content.len(), "created file");
    Ok(EntryResult::Written(content))
}

async fn edit(ctx: StageContext<'_>, state: &PipelineState, entry: &PlanEntry) -> Result<EntryResult, ExecutorError> {
    let existing = match state.loaded_contents().get(&entry.path) {
        Some(content) => content.clone(),
        None => match ctx.executor.read_file(&entry.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %entry.path, error = %e, "cannot read file to edit; skipping");
                return Ok(EntryResult::Skipped);
            }
        },
    };

    let prompt = prompts::edit_file(&entry.path, &existing, &entry.goal, state.instruction());
    let generated = match ctx.planner.invoke(&prompt).await {
        Ok(answer) => unwrap_file_content(&answer),
        Err(e) => {
            warn!(path = %entry.path, error = %e, "edit generation failed; skipping");
            return Ok(EntryResult::Skipped);
        }
    };

    if generated.len() <= ctx.config.min_edit_len {
        warn!(path = %entry.path, len = generated.len(), "generated edit too short; skipping");
        return Ok(EntryResult::Skipped);
    }

    let content = keep_trailing_newline(&existing, generated);
    if content == existing {
        debug!(path = %entry.path, "edit produced no change");
        return Ok(EntryResult::Skipped);
    }

    ctx.executor.write_file(&entry.path, &content).await?;
    debug!(path = %entry.path, bytes = content.len(), "edited file");
    Ok(EntryResult::Written(content))
}

async fn delete(ctx: StageContext<'_>, entry: &PlanEntry) -> Result<EntryResult, ExecutorError> {
    match ctx.executor.remove_file(&entry.path).await {
        Ok(()) => {
            debug!(path = %entry.path, "deleted file");
            Ok(EntryResult::Deleted)
        }
        Err(e) => {
            warn!(path = %entry.path, error = %e, "delete failed; skipping");
            Ok(EntryResult::Skipped)
        }
    }
}

/// Fence stripping trims the planner's output; restore the file's final
/// newline so an unchanged echo compares equal.
fn keep_trailing_newline(existing: &str, mut generated: String) -> String {
    if existing.ends_with('\n') && !generated.ends_with('\n') {
        generated.push('\n');
    }
    generated
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::planner::ScriptedPlanner;
    use crate::sandbox::MemoryExecutor;

    const GENERATE: &str = "Generate a complete, production-ready file for:";
    const EDIT: &str = "You are editing this file:";

    async fn apply(planner: &ScriptedPlanner, exec: &MemoryExecutor, state: &mut PipelineState) -> ApplySummary {
        let config = PipelineConfig::default();
        let ctx = StageContext {
            planner,
            executor: exec,
            config: &config,
        };
        run(ctx, state).await
    }

    fn planned(entries: Vec<PlanEntry>) -> PipelineState {
        let mut state = PipelineState::new("add a divide function");
        state.set_plan(entries);
        state
    }

    #[tokio::test]
    async fn test_create_strips_fences_and_makes_parent_dir() {
        let planner = ScriptedPlanner::new().on(
            GENERATE,
            "```typescript\nexport const divide = (a: number, b: number) => a / b;\n```",
        );
        let exec = MemoryExecutor::new();
        let mut state = planned(vec![PlanEntry::new(PlanAction::Create, "src/math/divide.ts", "divide")]);

        let summary = apply(&planner, &exec, &mut state).await;

        assert_eq!(summary.written, 1);
        assert_eq!(
            exec.file("src/math/divide.ts").unwrap(),
            "export const divide = (a: number, b: number) => a / b;"
        );
        assert_eq!(exec.commands_matching("mkdir -p src/math"), 1);
        assert_eq!(state.applied_changes()[0].path, "src/math/divide.ts");
    }

    #[tokio::test]
    async fn test_markdown_with_code_block_is_written_whole() {
        let readme = "# Calc\n\nInstall:\n\n```bash\nnpm install calc\n```\n\nThen call divide(a, b).";
        let planner = ScriptedPlanner::new()
            .on("this file: README.md", readme)
            .on("file for: docs/usage.md", readme);
        let exec = MemoryExecutor::new().with_file("README.md", "# Calc\n");
        let mut state = planned(vec![
            PlanEntry::new(PlanAction::Edit, "README.md", "document install"),
            PlanEntry::new(PlanAction::Create, "docs/usage.md", "usage guide"),
        ]);

        let summary = apply(&planner, &exec, &mut state).await;

        assert_eq!(summary.written, 2);
        assert_eq!(exec.file("README.md").unwrap(), format!("{}\n", readme));
        assert_eq!(exec.file("docs/usage.md").unwrap(), readme);
    }

    #[tokio::test]
    async fn test_edit_reads_unloaded_file_and_writes_change() {
        let planner = ScriptedPlanner::new().on(EDIT, "export const add = 1;\nexport const divide = 2;");
        let exec = MemoryExecutor::new().with_file("src/calc.ts", "export const add = 1;\n");
        let mut state = planned(vec![PlanEntry::new(PlanAction::Edit, "src/calc.ts", "add divide")]);

        apply(&planner, &exec, &mut state).await;

        assert_eq!(
            exec.file("src/calc.ts").unwrap(),
            "export const add = 1;\nexport const divide = 2;\n"
        );
        assert_eq!(state.applied_changes().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_guards_short_and_unchanged_output() {
        let planner = ScriptedPlanner::new()
            .on("this file: short.ts", "ok")
            .on("this file: same.ts", "export const same = true;");
        let exec = MemoryExecutor::new()
            .with_file("short.ts", "export const short = true;\n")
            .with_file("same.ts", "export const same = true;\n");
        let mut state = planned(vec![
            PlanEntry::new(PlanAction::Edit, "short.ts", "g"),
            PlanEntry::new(PlanAction::Edit, "same.ts", "g"),
        ]);

        let summary = apply(&planner, &exec, &mut state).await;

        assert_eq!(summary.skipped, 2);
        assert!(exec.writes().is_empty());
        assert!(state.applied_changes().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_edit_and_failed_delete_do_not_stop_the_pass() {
        let planner = ScriptedPlanner::new().on(GENERATE, "export const fresh = 1;");
        let exec = MemoryExecutor::new()
            .with_file("locked.ts", "x")
            .unreadable("locked.ts");
        let mut state = planned(vec![
            PlanEntry::new(PlanAction::Edit, "locked.ts", "g"),
            PlanEntry::new(PlanAction::Delete, "gone.ts", "g"),
            PlanEntry::new(PlanAction::Create, "fresh.ts", "g"),
        ]);

        let summary = apply(&planner, &exec, &mut state).await;

        assert_eq!(summary, ApplySummary { written: 1, deleted: 0, skipped: 2 });
        assert!(state.failure().is_none());
        assert_eq!(exec.file("fresh.ts").as_deref(), Some("export const fresh = 1;"));
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let planner = ScriptedPlanner::new();
        let exec = MemoryExecutor::new().with_file("old.ts", "x");
        let mut state = planned(vec![PlanEntry::new(PlanAction::Delete, "old.ts", "remove")]);

        let summary = apply(&planner, &exec, &mut state).await;

        assert_eq!(summary.deleted, 1);
        assert!(exec.file("old.ts").is_none());
        assert!(state.applied_changes().is_empty());
    }

    #[tokio::test]
    async fn test_mkdir_failure_sets_failure_but_keeps_earlier_writes() {
        let planner = ScriptedPlanner::new().on(GENERATE, "export const one = 1;");
        let exec = MemoryExecutor::new().fail_command("mkdir -p deep", "read-only filesystem");
        let mut state = planned(vec![
            PlanEntry::new(PlanAction::Create, "one.ts", "g"),
            PlanEntry::new(PlanAction::Create, "deep/two.ts", "g"),
            PlanEntry::new(PlanAction::Create, "three.ts", "g"),
        ]);

        apply(&planner, &exec, &mut state).await;

        let paths: Vec<&str> = state.applied_changes().iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["one.ts", "three.ts"]);
        let failure = state.failure().unwrap();
        assert_eq!(failure.stage, Stage::Apply);
        assert!(failure.message.contains("deep/two.ts"));
    }

    #[tokio::test]
    async fn test_second_pass_with_echoing_planner_writes_nothing() {
        let planner = ScriptedPlanner::new().on(EDIT, "export const add = 1;\nexport const divide = 2;");
        let exec = MemoryExecutor::new().with_file("calc.ts", "export const add = 1;\n");
        let mut state = planned(vec![PlanEntry::new(PlanAction::Edit, "calc.ts", "add divide")]);
        state.replace_loaded_contents(BTreeMap::new());

        let first = apply(&planner, &exec, &mut state).await;
        let second = apply(&planner, &exec, &mut state).await;

        assert_eq!(first.written, 1);
        assert_eq!(second.written, 0);
        assert_eq!(exec.writes().len(), 1);
    }
}
