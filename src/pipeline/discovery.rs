//! File discovery and loading.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::StageContext;
use super::prompts;
use super::state::{PipelineState, SearchMode};
use crate::planner::response::single_token;
use crate::sandbox::{DEFAULT_COMMAND_TIMEOUT, normalize_relative, shell_escape};

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid regex"));

/// Characters allowed in a file-name pattern handed to `find -name`.
static PATTERN_SAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.*?\-\[\]]+$").expect("valid regex"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from", "up", "about",
    "into", "through", "during", "add", "create", "make", "update", "change", "modify", "fix", "implement", "new",
    "file", "function", "please", "should", "that", "this", "it", "is",
];

/// Salient words of an instruction, longest first.
pub fn extract_keywords(instruction: &str) -> Vec<String> {
    let lowered = instruction.to_lowercase();
    let mut words: Vec<String> = Vec::new();
    for word in WORD.find_iter(&lowered).map(|m| m.as_str()) {
        if word.len() > 2 && !STOP_WORDS.contains(&word) && !words.iter().any(|w| w == word) {
            words.push(word.to_string());
        }
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()));
    words.truncate(5);
    words
}

/// Reduce a planner-extracted keyword to something safe and useful to grep for.
pub fn sanitize_keyword(raw: &str) -> Option<String> {
    let word = raw.split_whitespace().next()?;
    let cleaned: String = word
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

pub fn sanitize_pattern(raw: &str) -> Option<String> {
    let word = raw.split_whitespace().next()?;
    let base = word.rsplit('/').next().unwrap_or(word);
    PATTERN_SAFE.is_match(base).then(|| base.to_string())
}

fn exclusions() -> &'static str {
    "-not -path './.git/*' -not -path '*/node_modules/*'"
}

fn literal_command(checkout: &str, keyword: &str, extensions: &[String]) -> String {
    let includes = extensions
        .iter()
        .map(|ext| format!("--include={}", shell_escape(&format!("*.{}", ext))))
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "cd {} && grep -rlF --exclude-dir=.git --exclude-dir=node_modules {} -e {} . || true",
        shell_escape(checkout),
        includes,
        shell_escape(keyword)
    )
}

fn pattern_command(checkout: &str, pattern: &str) -> String {
    format!(
        "cd {} && find . -type f -name {} {} || true",
        shell_escape(checkout),
        shell_escape(pattern),
        exclusions()
    )
}

fn wildcard_command(checkout: &str, extensions: &[String], limit: usize) -> String {
    let names = extensions
        .iter()
        .map(|ext| format!("-name {}", shell_escape(&format!("*.{}", ext))))
        .collect::<Vec<_>>()
        .join(" -o ");
    format!(
        "cd {} && find . -type f \\( {} \\) {} | head -{}",
        shell_escape(checkout),
        names,
        exclusions(),
        limit
    )
}

async fn keyword(ctx: StageContext<'_>, state: &mut PipelineState) -> Option<String> {
    match ctx.planner.invoke(&prompts::extract_keyword(state.instruction())).await {
        Ok(answer) => {
            if let Some(kw) = single_token(&answer).as_deref().and_then(sanitize_keyword) {
                return Some(kw);
            }
            warn!(answer = %answer.trim(), "unusable keyword; falling back to instruction words");
        }
        Err(e) => {
            warn!(error = %e, "keyword extraction failed; falling back to instruction words");
            state.note_error(format!("keyword extraction failed: {}", e));
        }
    }
    extract_keywords(state.instruction()).into_iter().next()
}

async fn pattern(ctx: StageContext<'_>, state: &mut PipelineState) -> Option<String> {
    match ctx.planner.invoke(&prompts::extract_pattern(state.instruction())).await {
        Ok(answer) => {
            if let Some(p) = single_token(&answer).as_deref().and_then(sanitize_pattern) {
                return Some(p);
            }
            warn!(answer = %answer.trim(), "unusable file pattern; falling back to instruction words");
        }
        Err(e) => {
            warn!(error = %e, "pattern extraction failed; falling back to instruction words");
            state.note_error(format!("pattern extraction failed: {}", e));
        }
    }
    extract_keywords(state.instruction())
        .into_iter()
        .next()
        .map(|kw| format!("*{}*", kw))
}

fn dedupe_paths(lines: Vec<String>, limit: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for line in lines {
        match normalize_relative(&line) {
            Ok(path) if !seen.contains(&path) => seen.push(path),
            Ok(_) => {}
            Err(_) => debug!(path = %line, "ignoring unusable search result"),
        }
        if seen.len() == limit {
            break;
        }
    }
    seen
}

/// Run one search with the selected mode and replace the candidate list.
///
/// Always counts as a search attempt. Executor failures leave an empty
/// candidate list and a note in `last_error`.
pub async fn discover(ctx: StageContext<'_>, state: &mut PipelineState) {
    state.record_search_attempt();
    let checkout = ctx.executor.checkout_dir();
    let mode = state.search_mode();

    let command = match mode {
        SearchMode::Literal => keyword(ctx, state)
            .await
            .map(|kw| literal_command(&checkout, &kw, &ctx.config.extensions)),
        SearchMode::Pattern => pattern(ctx, state)
            .await
            .map(|p| pattern_command(&checkout, &p)),
        SearchMode::Wildcard => Some(wildcard_command(
            &checkout,
            &ctx.config.extensions,
            ctx.config.wildcard_limit,
        )),
    };

    let Some(command) = command else {
        warn!(mode = %mode, "nothing to search for");
        state.note_error("no search term could be derived from the instruction");
        state.replace_candidates(Vec::new());
        return;
    };

    let files = match ctx.executor.run_command(&command, DEFAULT_COMMAND_TIMEOUT).await {
        Ok(output) => {
            if !output.success() && !output.stderr.trim().is_empty() {
                state.note_error(format!("search command failed: {}", output.stderr.trim()));
            }
            dedupe_paths(output.lines(), ctx.config.max_candidates)
        }
        Err(e) => {
            warn!(error = %e, "search command failed");
            state.note_error(format!("search failed: {}", e));
            Vec::new()
        }
    };

    info!(
        mode = %mode,
        attempt = state.search_attempts(),
        found = files.len(),
        "discovery finished"
    );
    state.replace_candidates(files);
}

/// Read every candidate into the loaded-contents map. Unreadable files are skipped.
pub async fn load(ctx: StageContext<'_>, state: &mut PipelineState) {
    let mut contents = BTreeMap::new();
    for path in state.candidate_files().iter().take(ctx.config.max_candidates) {
        match ctx.executor.read_file(path).await {
            Ok(content) => {
                contents.insert(path.clone(), content);
            }
            Err(e) => warn!(path = %path, error = %e, "skipping unreadable candidate"),
        }
    }
    debug!(loaded = contents.len(), "candidates loaded");
    state.replace_loaded_contents(contents);
}
