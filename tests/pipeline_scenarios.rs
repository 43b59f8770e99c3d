//! End-to-end runs of the edit pipeline against scripted planner and
//! in-memory sandbox doubles.

use std::sync::Arc;

use patchsmith::config::PipelineConfig;
use patchsmith::pipeline::{FailureReason, PipelineDriver, PipelineOutcome, PipelineState, PlanAction};
use patchsmith::planner::ScriptedPlanner;
use patchsmith::sandbox::{CommandOutput, MemoryExecutor};

const PACKAGE_WITH_LINT: &str = r#"{"name": "calc", "scripts": {"lint": "eslint ."}}"#;

async fn run(planner: ScriptedPlanner, exec: Arc<MemoryExecutor>, instruction: &str) -> (PipelineOutcome, PipelineState) {
    let driver = PipelineDriver::new(Arc::new(planner), exec, PipelineConfig::default());
    let mut state = PipelineState::new(instruction);
    let outcome = driver.run("scenario", &mut state).await;
    (outcome, state)
}

fn create_planner(plan: &str) -> ScriptedPlanner {
    ScriptedPlanner::new()
        .on("Choose ONE search mode", "grep")
        .on("Extract the main keyword", "divide")
        .on("decide what new files need to be created", plan)
        .on(
            "Generate a complete, production-ready file for:",
            "export function divide(a: number, b: number): number {\n  return a / b;\n}\n",
        )
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_no_matches_creates_new_file() {
        let planner = create_planner(r#"[{"file": "divide.ts", "action": "create", "goal": "divide helper"}]"#);
        let exec = Arc::new(MemoryExecutor::new());

        let (outcome, state) = run(planner, exec.clone(), "add a divide function").await;

        assert_eq!(outcome, PipelineOutcome::Success);
        assert_eq!(state.change_plan().len(), 1);
        assert_eq!(state.change_plan()[0].action, PlanAction::Create);
        assert_eq!(exec.writes(), vec!["divide.ts"]);
        assert!(exec.file("divide.ts").unwrap().contains("export function divide"));
        assert_eq!(state.validation_passed(), Some(true));
    }

    #[tokio::test]
    async fn test_unparseable_new_file_plan_falls_back_to_placeholder() {
        let planner = create_planner("I would create a file for that.");
        let exec = Arc::new(MemoryExecutor::new());

        let (outcome, _state) = run(planner, exec.clone(), "add a divide function").await;

        assert!(outcome.is_success());
        assert_eq!(exec.writes(), vec!["new_feature.ts"]);
    }

    #[tokio::test]
    async fn test_repeated_empty_search_exhausts_search_budget() {
        let planner = create_planner("[]");
        let exec = Arc::new(MemoryExecutor::new());

        let (outcome, state) = run(planner, exec.clone(), "add a divide function").await;

        assert_eq!(
            outcome,
            PipelineOutcome::Failed {
                reason: FailureReason::SearchExhausted { attempts: 3 }
            }
        );
        assert_eq!(state.search_attempts(), 3);
        assert!(exec.writes().is_empty());
        assert!(outcome.to_string_reason().contains("search retry budget exhausted"));
    }

    #[tokio::test]
    async fn test_persistent_lint_failure_exhausts_validation_budget() {
        let planner = create_planner(r#"[{"file": "src/divide.ts", "action": "create", "goal": "divide"}]"#);
        let exec = Arc::new(
            MemoryExecutor::new()
                .with_file("package.json", PACKAGE_WITH_LINT)
                .on_command("npm run lint", CommandOutput::failed(1, "src/divide.ts: missing return type")),
        );

        let (outcome, state) = run(planner, exec.clone(), "add a divide function").await;

        assert_eq!(
            outcome,
            PipelineOutcome::Failed {
                reason: FailureReason::ValidationExhausted { attempts: 3 }
            }
        );
        assert_eq!(state.validation_attempts(), 3);
        assert!(state.search_attempts() <= 3);
        assert_eq!(exec.commands_matching("npm run lint"), 3);
        assert!(!outcome.to_string_reason().contains("search"));
    }

    #[tokio::test]
    async fn test_uninstalled_linter_does_not_exhaust_validation() {
        let planner = create_planner(r#"[{"file": "src/divide.ts", "action": "create", "goal": "divide"}]"#);
        let exec = Arc::new(
            MemoryExecutor::new()
                .with_file("package.json", PACKAGE_WITH_LINT)
                .on_command("npm run lint", CommandOutput::failed(127, "sh: 1: eslint: not found")),
        );

        let (outcome, state) = run(planner, exec.clone(), "add a divide function").await;

        assert_eq!(outcome, PipelineOutcome::Success);
        assert_eq!(state.validation_attempts(), 1);
        assert_eq!(exec.commands_matching("npm run lint"), 1);
        assert_eq!(exec.writes(), vec!["src/divide.ts"]);
    }

    #[tokio::test]
    async fn test_fenced_plan_keeps_relevance_order() {
        let plan = "Here is the plan:\n```json\n[\n  {\"file\": \"src/calc.ts\", \"action\": \"edit\", \"relevance\": 90, \"goal\": \"add divide\"},\n  {\"file\": \"src/index.ts\", \"action\": \"edit\", \"relevance\": 60, \"goal\": \"export divide\"}\n]\n```";
        let planner = ScriptedPlanner::new()
            .on("Choose ONE search mode", "grep")
            .on("Extract the main keyword", "calc")
            .on("Return a JSON array with the complete plan", plan)
            .on(
                "You are editing this file: src/calc.ts",
                "export const add = (a: number, b: number) => a + b;\nexport const divide = (a: number, b: number) => a / b;",
            )
            .on(
                "You are editing this file: src/index.ts",
                "export { add, divide } from './calc';",
            );
        let exec = Arc::new(
            MemoryExecutor::new()
                .with_file("src/calc.ts", "export const add = (a: number, b: number) => a + b;\n")
                .with_file("src/index.ts", "export { add } from './calc';\n")
                .on_command("grep -rlF", CommandOutput::ok("./src/calc.ts\n./src/index.ts\n")),
        );

        let (outcome, state) = run(planner, exec.clone(), "add a divide function to calc").await;

        assert!(outcome.is_success());
        let planned: Vec<&str> = state.change_plan().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(planned, vec!["src/calc.ts", "src/index.ts"]);
        assert_eq!(exec.writes(), vec!["src/calc.ts", "src/index.ts"]);
        assert!(exec.file("src/index.ts").unwrap().ends_with('\n'));
    }
}

mod properties {
    use super::*;

    #[tokio::test]
    async fn test_loop_counters_never_exceed_cap() {
        let lint_outcomes = [
            vec![CommandOutput::failed(1, "lint")],
            vec![CommandOutput::failed(1, "lint"), CommandOutput::ok("")],
            vec![CommandOutput::ok("")],
        ];
        for outcomes in lint_outcomes {
            let planner = create_planner(r#"[{"file": "src/divide.ts", "action": "create", "goal": "divide"}]"#);
            let exec = Arc::new(
                MemoryExecutor::new()
                    .with_file("package.json", PACKAGE_WITH_LINT)
                    .on_command_sequence("npm run lint", outcomes),
            );

            let (_outcome, state) = run(planner, exec, "add a divide function").await;

            assert!(state.search_attempts() <= 3);
            assert!(state.validation_attempts() <= 3);
        }
    }

    #[tokio::test]
    async fn test_planner_echo_applies_nothing_and_succeeds() {
        let original = "export const add = (a: number, b: number) => a + b;\n";
        let planner = ScriptedPlanner::new()
            .on("Choose ONE search mode", "grep")
            .on("Extract the main keyword", "add")
            .on(
                "Return a JSON array with the complete plan",
                r#"[{"file": "src/calc.ts", "action": "edit", "relevance": 80, "goal": "tidy"}]"#,
            )
            .on("You are editing this file:", original.trim_end());
        let exec = Arc::new(
            MemoryExecutor::new()
                .with_file("package.json", PACKAGE_WITH_LINT)
                .with_file("src/calc.ts", original)
                .on_command("grep -rlF", CommandOutput::ok("./src/calc.ts\n"))
                .on_command("npm run lint", CommandOutput::failed(1, "should never run")),
        );

        let (outcome, state) = run(planner, exec.clone(), "tidy the add function").await;

        assert!(outcome.is_success());
        assert!(state.applied_changes().is_empty());
        assert!(exec.writes().is_empty());
        assert_eq!(exec.commands_matching("npm run lint"), 0);
    }
}

trait ReasonText {
    fn to_string_reason(&self) -> String;
}

impl ReasonText for PipelineOutcome {
    fn to_string_reason(&self) -> String {
        match self {
            PipelineOutcome::Success => String::new(),
            PipelineOutcome::Failed { reason } => reason.to_string(),
        }
    }
}
