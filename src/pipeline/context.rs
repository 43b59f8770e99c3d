use tracing::warn;

use crate::sandbox::{DEFAULT_COMMAND_TIMEOUT, Executor, shell_escape};

const SAMPLE_LIMIT: usize = 30;
const SHOWN_PATHS: usize = 20;
const MANIFESTS: &[&str] = &["package.json", "Cargo.toml", "pyproject.toml", "go.mod"];

/// Shallow summary of the checkout shown to the planner when it proposes
/// new files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepoContext {
    pub files: Vec<String>,
    pub has_react: bool,
    pub has_vue: bool,
    pub has_manifest: bool,
    pub has_src: bool,
    pub has_tests: bool,
}

impl RepoContext {
    pub fn from_paths(paths: Vec<String>) -> Self {
        let any = |pred: fn(&str) -> bool| paths.iter().any(|p| pred(p.as_str()));
        Self {
            has_react: any(|p| p.ends_with(".tsx") || p.ends_with(".jsx")),
            has_vue: any(|p| p.ends_with(".vue")),
            has_manifest: any(|p| MANIFESTS.contains(&p)),
            has_src: any(|p| p.starts_with("src/")),
            has_tests: any(|p| p.contains("test") || p.contains("spec")),
            files: paths,
        }
    }

    /// Sample up to thirty checkout paths. A failed listing yields an empty
    /// context rather than an error.
    pub async fn detect(executor: &dyn Executor) -> Self {
        let cmd = format!(
            "cd {} && find . -type f -not -path './.git/*' -not -path '*/node_modules/*' | head -{}",
            shell_escape(&executor.checkout_dir()),
            SAMPLE_LIMIT
        );
        match executor.run_command(&cmd, DEFAULT_COMMAND_TIMEOUT).await {
            Ok(output) => Self::from_paths(
                output
                    .lines()
                    .into_iter()
                    .map(|l| l.trim_start_matches("./").to_string())
                    .take(SAMPLE_LIMIT)
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "could not list repository files");
                Self::default()
            }
        }
    }

    /// Path used when the planner's new-file plan can't be parsed.
    pub fn fallback_path(&self) -> String {
        let ext = if self.has_react { "tsx" } else { "ts" };
        if self.has_src {
            format!("src/new_feature.{}", ext)
        } else {
            format!("new_feature.{}", ext)
        }
    }

    pub fn render(&self) -> String {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        let shown = self
            .files
            .iter()
            .take(SHOWN_PATHS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "- Has React: {}\n- Has Vue: {}\n- Has manifest: {}\n- Has src/ directory: {}\n- Has tests: {}\n\
             - Existing files:\n{}\n- Total files: {}",
            yes_no(self.has_react),
            yes_no(self.has_vue),
            yes_no(self.has_manifest),
            yes_no(self.has_src),
            yes_no(self.has_tests),
            shown,
            self.files.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{CommandOutput, MemoryExecutor};

    #[test]
    fn test_flags_from_paths() {
        let ctx = RepoContext::from_paths(vec![
            "package.json".into(),
            "src/App.tsx".into(),
            "src/App.test.tsx".into(),
        ]);
        assert!(ctx.has_react && ctx.has_manifest && ctx.has_src && ctx.has_tests);
        assert!(!ctx.has_vue);
        assert_eq!(ctx.fallback_path(), "src/new_feature.tsx");
    }

    #[test]
    fn test_repo_without_src_falls_back_to_root() {
        let ctx = RepoContext::from_paths(vec!["lib/math.js".into(), "Cargo.toml".into()]);
        assert!(ctx.has_manifest);
        assert_eq!(ctx.fallback_path(), "new_feature.ts");
    }

    #[test]
    fn test_render_limits_listed_paths() {
        let ctx = RepoContext::from_paths((0..25).map(|i| format!("f{}.ts", i)).collect());
        let text = ctx.render();
        assert!(text.contains("f19.ts"));
        assert!(!text.contains("f20.ts"));
        assert!(text.contains("Total files: 25"));
    }

    #[tokio::test]
    async fn test_detect_strips_dot_prefix() {
        let exec = MemoryExecutor::new().on_command("find . -type f", CommandOutput::ok("./src/a.ts\n./package.json\n"));
        let ctx = RepoContext::detect(&exec).await;
        assert_eq!(ctx.files, vec!["src/a.ts", "package.json"]);
        assert!(ctx.has_manifest);
    }

    #[tokio::test]
    async fn test_detect_failure_is_empty_context() {
        let exec = MemoryExecutor::new().fail_command("find", "sandbox gone");
        assert_eq!(RepoContext::detect(&exec).await, RepoContext::default());
    }
}
