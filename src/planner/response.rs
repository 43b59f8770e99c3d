//! Parsing of untrusted planner output.
//!
//! Models routinely wrap JSON in markdown fences or surround it with prose.
//! Everything here is fallible and returns [`PlannerParseError`]; callers
//! choose the fallback.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::errors::PlannerParseError;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("valid fence regex")
});

static FENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+.-]*\r?\n?").expect("valid fence marker regex"));

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+.-]*[ \t]*\r?\n").expect("valid opening fence regex"));

/// Strip markdown code fences from a planner response.
///
/// If the response contains a complete fenced block, the body of the first
/// block is returned. Otherwise stray fence markers are removed. Only
/// suitable for structured answers; file bodies go through
/// [`unwrap_file_content`].
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(caps) = FENCED_BLOCK.captures(trimmed)
        && let Some(body) = caps.get(1)
    {
        return body.as_str().trim().to_string();
    }
    FENCE_MARKER.replace_all(trimmed, "").trim().to_string()
}

/// Remove a fence that wraps an entire generated file.
///
/// The response is unwrapped only when its first line opens a fence and its
/// last line closes it, with any fences in between properly paired, or when
/// it opens with a fence that is never closed. Fences inside the content
/// (Markdown examples, doc comments) are left alone.
pub fn unwrap_file_content(text: &str) -> String {
    let trimmed = text.trim();
    let Some(opening) = OPENING_FENCE.find(trimmed) else {
        return trimmed.to_string();
    };
    let rest = &trimmed[opening.end()..];

    if let Some(body) = rest.strip_suffix("```")
        && (body.is_empty() || body.ends_with('\n'))
        && fences_paired(body)
    {
        return body.trim().to_string();
    }
    if !rest.contains("```") {
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

/// Every fence line that opens a block is followed by a bare closing one.
fn fences_paired(body: &str) -> bool {
    let mut open = false;
    for line in body.lines().map(str::trim) {
        if !line.starts_with("```") {
            continue;
        }
        if !open {
            open = true;
        } else if line == "```" {
            open = false;
        }
    }
    !open
}

/// Parse a JSON array out of a planner response.
pub fn extract_json_array(text: &str) -> Result<Vec<serde_json::Value>, PlannerParseError> {
    let cleaned = strip_fences(text);
    if cleaned.is_empty() {
        return Err(PlannerParseError::Empty);
    }

    let value = match serde_json::from_str::<serde_json::Value>(&cleaned) {
        Ok(v) => v,
        Err(first_err) => {
            // Fall back to the outermost bracketed span inside surrounding prose.
            let span = match (cleaned.find('['), cleaned.rfind(']')) {
                (Some(start), Some(end)) if end > start => &cleaned[start..=end],
                _ => return Err(not_json(&cleaned, &first_err)),
            };
            serde_json::from_str(span).map_err(|e| not_json(&cleaned, &e))?
        }
    };

    match value {
        serde_json::Value::Array(items) => Ok(items),
        _ => Err(PlannerParseError::NotAnArray),
    }
}

fn not_json(text: &str, err: &serde_json::Error) -> PlannerParseError {
    PlannerParseError::NotJson {
        snippet: text.chars().take(200).collect(),
        message: err.to_string(),
    }
}

/// One entry of a planner-proposed change plan, before validation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawPlanEntry {
    #[serde(alias = "path")]
    pub file: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub relevance: f64,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub goal: String,
}

/// Parse plan entries, skipping individual entries that don't deserialize.
///
/// Returns an error only when the response as a whole isn't a JSON array.
pub fn parse_plan_entries(text: &str) -> Result<Vec<RawPlanEntry>, PlannerParseError> {
    let items = extract_json_array(text)?;
    let entries = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawPlanEntry>(item) {
            Ok(entry) if !entry.file.trim().is_empty() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed plan entry");
                None
            }
        })
        .collect();
    Ok(entries)
}

/// First non-empty line of a single-word planner answer, stripped of
/// fences, quotes and trailing punctuation.
pub fn single_token(text: &str) -> Option<String> {
    let cleaned = strip_fences(text);
    let line = cleaned.lines().map(str::trim).find(|l| !l.is_empty())?;
    let token = line
        .trim_end_matches(['.', ',', ';', ':'])
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
