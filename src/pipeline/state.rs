use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PlannerParseError;

/// File-discovery strategy, chosen once per pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Search file contents for a keyword
    #[default]
    Literal,
    /// Match file names against a glob-like pattern
    Pattern,
    /// List source files by extension
    Wildcard,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Pattern => "pattern",
            Self::Wildcard => "wildcard",
        }
    }

    /// Interpret a planner classification. Accepts the tool-style names
    /// (grep/glob/regex) as well as our own.
    pub fn from_classification(word: &str) -> Option<Self> {
        match word.trim().to_lowercase().as_str() {
            "literal" | "grep" => Some(Self::Literal),
            "pattern" | "glob" => Some(Self::Pattern),
            "wildcard" | "regex" => Some(Self::Wildcard),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Edit,
    Delete,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for PlanAction {
    type Err = PlannerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "edit" | "modify" | "update" => Ok(Self::Edit),
            "delete" | "remove" => Ok(Self::Delete),
            _ => Err(PlannerParseError::UnknownAction {
                action: s.trim().to_string(),
            }),
        }
    }
}

/// One instruction to create, edit or delete a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub action: PlanAction,
    pub path: String,
    pub goal: String,
}

impl PlanEntry {
    pub fn new(action: PlanAction, path: &str, goal: &str) -> Self {
        Self {
            action,
            path: path.to_string(),
            goal: goal.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub path: String,
    pub new_content: String,
}

/// Pipeline stages. `Success` and `Failed` are reported through [`PipelineOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SelectMode,
    Discover,
    Load,
    Plan,
    Apply,
    Validate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectMode => "select_mode",
            Self::Discover => "discover",
            Self::Load => "load",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Validate => "validate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal stage error. Once recorded, the pipeline is headed for `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
}

/// Why a pipeline run ended in the failed terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Stage { stage: Stage, message: String },
    SearchExhausted { attempts: u32 },
    ValidationExhausted { attempts: u32 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage { stage, message } => write!(f, "{} failed: {}", stage, message),
            Self::SearchExhausted { attempts } => write!(
                f,
                "search retry budget exhausted after {} attempts: no files found and no plan proposed",
                attempts
            ),
            Self::ValidationExhausted { attempts } => write!(
                f,
                "validation retry budget exhausted after {} attempts: verification command kept failing",
                attempts
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Success,
    Failed { reason: FailureReason },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// The single mutable record threaded through every stage of one run.
///
/// Counters only move forward, and once a failure is recorded the plan and
/// the applied-change list are frozen.
#[derive(Debug, Clone)]
pub struct PipelineState {
    instruction: String,
    search_mode: Option<SearchMode>,
    search_attempts: u32,
    candidate_files: Vec<String>,
    ever_found_candidates: bool,
    loaded_contents: BTreeMap<String, String>,
    change_plan: Vec<PlanEntry>,
    applied_changes: Vec<AppliedChange>,
    validation_attempts: u32,
    validation_passed: Option<bool>,
    validation_feedback: Option<String>,
    last_error: Option<String>,
    failure: Option<Failure>,
    visited: Vec<Stage>,
}

impl PipelineState {
    pub fn new(instruction: &str) -> Self {
        Self {
            instruction: instruction.to_string(),
            search_mode: None,
            search_attempts: 0,
            candidate_files: Vec::new(),
            ever_found_candidates: false,
            loaded_contents: BTreeMap::new(),
            change_plan: Vec::new(),
            applied_changes: Vec::new(),
            validation_attempts: 0,
            validation_passed: None,
            validation_feedback: None,
            last_error: None,
            failure: None,
            visited: Vec::new(),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// The chosen mode, `Literal` until the selector has run.
    pub fn search_mode(&self) -> SearchMode {
        self.search_mode.unwrap_or_default()
    }

    pub fn search_mode_selected(&self) -> bool {
        self.search_mode.is_some()
    }

    /// Set the search mode. Only the first call has an effect.
    pub fn select_search_mode(&mut self, mode: SearchMode) {
        if self.search_mode.is_none() {
            self.search_mode = Some(mode);
        }
    }

    pub fn search_attempts(&self) -> u32 {
        self.search_attempts
    }

    pub fn record_search_attempt(&mut self) {
        self.search_attempts += 1;
    }

    pub fn candidate_files(&self) -> &[String] {
        &self.candidate_files
    }

    /// True if any discovery run produced at least one candidate.
    pub fn candidates_ever_found(&self) -> bool {
        self.ever_found_candidates
    }

    pub fn replace_candidates(&mut self, files: Vec<String>) {
        if !files.is_empty() {
            self.ever_found_candidates = true;
        }
        self.candidate_files = files;
    }

    pub fn loaded_contents(&self) -> &BTreeMap<String, String> {
        &self.loaded_contents
    }

    pub fn replace_loaded_contents(&mut self, contents: BTreeMap<String, String>) {
        self.loaded_contents = contents;
    }

    pub fn change_plan(&self) -> &[PlanEntry] {
        &self.change_plan
    }

    /// Replace the plan. Ignored once a failure is recorded.
    pub fn set_plan(&mut self, plan: Vec<PlanEntry>) {
        if self.failure.is_none() {
            self.change_plan = plan;
        }
    }

    pub fn applied_changes(&self) -> &[AppliedChange] {
        &self.applied_changes
    }

    /// Record a write. Entries stay unique by path; the last write wins.
    /// Ignored once a failure is recorded.
    pub fn record_applied(&mut self, path: &str, new_content: &str) {
        if self.failure.is_some() {
            return;
        }
        match self.applied_changes.iter_mut().find(|c| c.path == path) {
            Some(existing) => existing.new_content = new_content.to_string(),
            None => self.applied_changes.push(AppliedChange {
                path: path.to_string(),
                new_content: new_content.to_string(),
            }),
        }
    }

    pub fn validation_attempts(&self) -> u32 {
        self.validation_attempts
    }

    pub fn validation_passed(&self) -> Option<bool> {
        self.validation_passed
    }

    pub fn record_validation(&mut self, passed: bool, feedback: Option<String>) {
        self.validation_attempts += 1;
        self.validation_passed = Some(passed);
        self.validation_feedback = feedback;
    }

    /// Output of the last failed verification run, for re-planning.
    pub fn validation_feedback(&self) -> Option<&str> {
        self.validation_feedback.as_deref()
    }

    /// Most recent recoverable error (does not stop the pipeline).
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn note_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Record a fatal failure. The first failure is kept.
    pub fn fail(&mut self, stage: Stage, message: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(Failure {
                stage,
                message: message.into(),
            });
        }
    }

    /// Stages entered so far, in order.
    pub fn visited(&self) -> &[Stage] {
        &self.visited
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        self.visited.push(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_classification_vocabulary() {
        assert_eq!(SearchMode::from_classification("grep"), Some(SearchMode::Literal));
        assert_eq!(SearchMode::from_classification(" Glob "), Some(SearchMode::Pattern));
        assert_eq!(SearchMode::from_classification("regex"), Some(SearchMode::Wildcard));
        assert_eq!(SearchMode::from_classification("wildcard"), Some(SearchMode::Wildcard));
        assert_eq!(SearchMode::from_classification("semantic"), None);
    }

    #[test]
    fn test_search_mode_is_set_once() {
        let mut state = PipelineState::new("add a divide function");
        assert!(!state.search_mode_selected());
        state.select_search_mode(SearchMode::Pattern);
        state.select_search_mode(SearchMode::Wildcard);
        assert_eq!(state.search_mode(), SearchMode::Pattern);
    }

    #[test]
    fn test_plan_action_from_str() {
        assert_eq!("Edit".parse::<PlanAction>().unwrap(), PlanAction::Edit);
        assert_eq!("remove".parse::<PlanAction>().unwrap(), PlanAction::Delete);
        assert_eq!(
            " Rename ".parse::<PlanAction>(),
            Err(PlannerParseError::UnknownAction {
                action: "Rename".to_string()
            })
        );
    }

    #[test]
    fn test_candidates_replaced_not_appended() {
        let mut state = PipelineState::new("x");
        state.replace_candidates(vec!["a.ts".into(), "b.ts".into()]);
        state.replace_candidates(vec![]);
        assert!(state.candidate_files().is_empty());
        assert!(state.candidates_ever_found());
    }

    #[test]
    fn test_applied_changes_unique_by_path_last_write_wins() {
        let mut state = PipelineState::new("x");
        state.record_applied("a.ts", "v1");
        state.record_applied("b.ts", "b");
        state.record_applied("a.ts", "v2");
        assert_eq!(state.applied_changes().len(), 2);
        assert_eq!(state.applied_changes()[0].path, "a.ts");
        assert_eq!(state.applied_changes()[0].new_content, "v2");
    }

    #[test]
    fn test_failure_freezes_plan_and_applied_changes() {
        let mut state = PipelineState::new("x");
        state.record_applied("a.ts", "v1");
        state.fail(Stage::Apply, "disk full");
        state.fail(Stage::Validate, "second failure ignored");
        state.record_applied("b.ts", "b");
        state.set_plan(vec![PlanEntry::new(PlanAction::Create, "c.ts", "c")]);
        assert_eq!(state.applied_changes().len(), 1);
        assert!(state.change_plan().is_empty());
        assert_eq!(state.failure().unwrap().stage, Stage::Apply);
    }

    #[test]
    fn test_counters_only_increase() {
        let mut state = PipelineState::new("x");
        state.record_search_attempt();
        state.record_validation(false, Some("lint error".into()));
        state.record_validation(true, None);
        assert_eq!(state.search_attempts(), 1);
        assert_eq!(state.validation_attempts(), 2);
        assert_eq!(state.validation_passed(), Some(true));
        assert!(state.validation_feedback().is_none());
    }

    #[test]
    fn test_failure_reason_messages_are_distinct() {
        let search = FailureReason::SearchExhausted { attempts: 3 }.to_string();
        let validation = FailureReason::ValidationExhausted { attempts: 3 }.to_string();
        assert!(search.contains("search retry budget exhausted"));
        assert!(validation.contains("validation retry budget exhausted"));
        assert_ne!(search, validation);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::Failed {
            reason: FailureReason::SearchExhausted { attempts: 3 },
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"kind\":\"search_exhausted\""));
    }
}
