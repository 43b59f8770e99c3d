use std::time::Duration;

use tracing::{info, warn};

use super::StageContext;
use super::state::PipelineState;
use crate::sandbox::{Executor, shell_escape};

/// Output excerpt kept for the next planning round.
const FEEDBACK_CHARS: usize = 2000;

/// Shell exit status for a command that could not be found.
const COMMAND_NOT_FOUND: i32 = 127;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// A repository's own lint or check command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationCommand {
    NpmLint,
    CargoClippy,
    MakeLint,
}

impl VerificationCommand {
    pub fn command_line(&self) -> &'static str {
        match self {
            Self::NpmLint => "npm run lint",
            Self::CargoClippy => "cargo clippy --quiet",
            Self::MakeLint => "make lint",
        }
    }

    /// Program the command line starts with.
    pub fn tool(&self) -> &'static str {
        match self {
            Self::NpmLint => "npm",
            Self::CargoClippy => "cargo",
            Self::MakeLint => "make",
        }
    }

    /// Probe the checkout's manifests, in order: package.json with a `lint`
    /// script, Cargo.toml, Makefile with a `lint` target. A manifest only
    /// counts when the sandbox has the tool to run it.
    pub async fn detect(executor: &dyn Executor) -> Option<Self> {
        if let Ok(manifest) = executor.read_file("package.json").await
            && has_lint_script(&manifest)
            && tool_available(executor, Self::NpmLint).await
        {
            return Some(Self::NpmLint);
        }
        if executor.read_file("Cargo.toml").await.is_ok() && tool_available(executor, Self::CargoClippy).await {
            return Some(Self::CargoClippy);
        }
        if let Ok(makefile) = executor.read_file("Makefile").await
            && makefile.lines().any(|l| l.starts_with("lint:"))
            && tool_available(executor, Self::MakeLint).await
        {
            return Some(Self::MakeLint);
        }
        None
    }
}

async fn tool_available(executor: &dyn Executor, verification: VerificationCommand) -> bool {
    let cmd = format!("command -v {}", verification.tool());
    match executor.run_command(&cmd, PROBE_TIMEOUT).await {
        Ok(output) if output.success() => true,
        Ok(_) => {
            info!(tool = verification.tool(), "manifest found but tool is not installed");
            false
        }
        Err(e) => {
            warn!(tool = verification.tool(), error = %e, "tool probe failed");
            false
        }
    }
}

fn has_lint_script(manifest: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(manifest) {
        Ok(value) => value.get("scripts").and_then(|s| s.get("lint")).is_some(),
        Err(_) => manifest.contains("\"lint\""),
    }
}

fn tail(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(chars)).collect()
}

/// Run the repository's verification command against the applied changes.
///
/// Counts a validation attempt on every call. Nothing applied, no
/// verification command found, or a command the sandbox cannot run (exit
/// 127, e.g. a linter that was never installed) passes. A timeout or
/// executor error fails.
pub async fn run(ctx: StageContext<'_>, state: &mut PipelineState) {
    if state.applied_changes().is_empty() {
        state.record_validation(true, None);
        return;
    }

    let Some(verification) = VerificationCommand::detect(ctx.executor).await else {
        info!("no verification command found; accepting changes");
        state.record_validation(true, None);
        return;
    };

    let cmd = format!(
        "cd {} && {}",
        shell_escape(&ctx.executor.checkout_dir()),
        verification.command_line()
    );
    let timeout = Duration::from_secs(ctx.config.validation_timeout_secs);
    match ctx.executor.run_command(&cmd, timeout).await {
        Ok(output) if output.success() => {
            info!(command = verification.command_line(), attempt = state.validation_attempts() + 1, "validation passed");
            state.record_validation(true, None);
        }
        Ok(output) if output.exit_code == COMMAND_NOT_FOUND => {
            warn!(
                command = verification.command_line(),
                stderr = %output.stderr.trim(),
                "verification command unavailable in sandbox; accepting changes"
            );
            state.record_validation(true, None);
        }
        Ok(output) => {
            warn!(
                command = verification.command_line(),
                exit_code = output.exit_code,
                attempt = state.validation_attempts() + 1,
                "validation failed"
            );
            let combined = format!("{}\n{}", output.stdout.trim(), output.stderr.trim());
            state.record_validation(false, Some(tail(combined.trim(), FEEDBACK_CHARS)));
        }
        Err(e) => {
            warn!(command = verification.command_line(), error = %e, "validation could not run");
            state.note_error(format!("validation failed to run: {}", e));
            state.record_validation(false, Some(e.to_string()));
        }
    }
}
