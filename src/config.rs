//! Service configuration for patchsmith.
//!
//! Configuration is layered: built-in defaults → `.patchsmith/config.toml`
//! (or the file passed with `--config`) → environment → CLI flags.
//! Secrets are only ever read from the environment.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//!
//! [queue]
//! concurrency = 1
//! max_attempts = 3
//! backoff_base_ms = 1000
//! retention_secs = 86400
//!
//! [pipeline]
//! max_search_attempts = 3
//! max_validation_attempts = 3
//! extensions = ["ts", "js"]
//!
//! [planner]
//! backend = "openai"
//! model = "gpt-5-mini"
//!
//! [sandbox]
//! backend = "docker"
//! image = "node:22-slim"
//! session_timeout_secs = 1800
//!
//! [github]
//! upstream_default_branch = "main"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".patchsmith/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Worker-pool and queue-level retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of jobs processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Whole-job attempts before the job is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff between job attempts.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// How long finished jobs stay queryable. 0 keeps them forever.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60
}

/// Limits applied by the edit-orchestration pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_loop_cap")]
    pub max_search_attempts: u32,
    #[serde(default = "default_loop_cap")]
    pub max_validation_attempts: u32,
    /// Discovery output is truncated to this many paths.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Files listed by the wildcard strategy.
    #[serde(default = "default_wildcard_limit")]
    pub wildcard_limit: usize,
    #[serde(default = "default_max_plan_entries")]
    pub max_plan_entries: usize,
    /// Characters of each loaded file shown to the planner.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    /// Planner edits at or below this length are discarded.
    #[serde(default = "default_min_edit_len")]
    pub min_edit_len: usize,
    #[serde(default = "default_validation_timeout_secs")]
    pub validation_timeout_secs: u64,
    /// Source extensions searched by the literal and wildcard strategies.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_search_attempts: default_loop_cap(),
            max_validation_attempts: default_loop_cap(),
            max_candidates: default_max_candidates(),
            wildcard_limit: default_wildcard_limit(),
            max_plan_entries: default_max_plan_entries(),
            context_chars: default_context_chars(),
            min_edit_len: default_min_edit_len(),
            validation_timeout_secs: default_validation_timeout_secs(),
            extensions: default_extensions(),
        }
    }
}

fn default_loop_cap() -> u32 {
    3
}

fn default_max_candidates() -> usize {
    10
}

fn default_wildcard_limit() -> usize {
    20
}

fn default_max_plan_entries() -> usize {
    5
}

fn default_context_chars() -> usize {
    1500
}

fn default_min_edit_len() -> usize {
    10
}

fn default_validation_timeout_secs() -> u64 {
    60
}

fn default_extensions() -> Vec<String> {
    vec!["ts".to_string(), "js".to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerBackend {
    /// Shell out to an LLM CLI
    #[default]
    Cli,
    /// OpenAI-compatible Chat Completions endpoint
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub backend: PlannerBackend,
    /// CLI command (falls back to `PLANNER_CMD`, then "claude")
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_planner_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            backend: PlannerBackend::default(),
            command: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_planner_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-5-mini".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_planner_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    /// A private directory on the host per job attempt
    #[default]
    Local,
    /// A throwaway container per job attempt
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub backend: SandboxBackend,
    /// Parent directory for local checkouts (defaults to the user cache dir)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Wall-clock limit for one job attempt.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_cpus")]
    pub cpus: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::default(),
            workspace_root: None,
            session_timeout_secs: default_session_timeout_secs(),
            clone_timeout_secs: default_clone_timeout_secs(),
            image: default_image(),
            memory: default_memory(),
            cpus: default_cpus(),
        }
    }
}

impl SandboxConfig {
    /// Resolved parent directory for local checkouts.
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("patchsmith")
                .join("workspaces")
        })
    }
}

fn default_session_timeout_secs() -> u64 {
    30 * 60
}

fn default_clone_timeout_secs() -> u64 {
    300
}

fn default_image() -> String {
    "node:22-slim".to_string()
}

fn default_memory() -> String {
    "4g".to_string()
}

fn default_cpus() -> f64 {
    2.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_branch")]
    pub upstream_default_branch: String,
    /// Seconds to wait after forking before cloning the fork.
    #[serde(default = "default_fork_settle_secs")]
    pub fork_settle_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            upstream_default_branch: default_branch(),
            fork_settle_secs: default_fork_settle_secs(),
            api_base: default_api_base(),
        }
    }
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_fork_settle_secs() -> u64 {
    5
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

/// Secrets and identity, read from the environment only.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub github_token: Option<String>,
    pub github_username: Option<String>,
    pub github_email: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            github_token: non_empty_env("GITHUB_TOKEN"),
            github_username: non_empty_env("GITHUB_USERNAME"),
            github_email: non_empty_env("GITHUB_EMAIL"),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }
        f.debug_struct("Credentials")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("github_token", &redact(&self.github_token))
            .field("github_username", &self.github_username)
            .field("github_email", &self.github_email)
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// The complete config.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Load from `path`, returning defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply environment overrides for non-secret settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = non_empty_env("PATCHSMITH_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if self.planner.command.is_none() {
            self.planner.command = non_empty_env("PLANNER_CMD");
        }
        if let Some(base_url) = non_empty_env("OPENAI_BASE_URL") {
            self.planner.base_url = base_url;
        }
        self
    }

    /// The planner CLI command, with fallback to "claude".
    pub fn planner_command(&self) -> String {
        self.planner
            .command
            .clone()
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.queue.concurrency == 0 {
            warnings.push("queue.concurrency is 0: no jobs will ever run".to_string());
        }
        if self.queue.max_attempts == 0 {
            warnings.push("queue.max_attempts is 0: jobs fail without running".to_string());
        }
        if self.pipeline.max_search_attempts == 0 {
            warnings.push("pipeline.max_search_attempts is 0: discovery never runs".to_string());
        }
        if self.pipeline.max_validation_attempts == 0 {
            warnings.push("pipeline.max_validation_attempts is 0".to_string());
        }
        if self.pipeline.extensions.is_empty() {
            warnings.push("pipeline.extensions is empty: literal and wildcard search find nothing".to_string());
        }
        if let Some(bad) = self
            .pipeline
            .extensions
            .iter()
            .find(|e| !e.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            warnings.push(format!("Invalid extension '{}': use bare extensions like \"ts\"", bad));
        }
        if self.sandbox.session_timeout_secs == 0 {
            warnings.push("sandbox.session_timeout_secs is 0: every job will time out".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_match_pipeline_limits() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.queue.concurrency, 1);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.pipeline.max_search_attempts, 3);
        assert_eq!(config.pipeline.max_validation_attempts, 3);
        assert_eq!(config.pipeline.max_candidates, 10);
        assert_eq!(config.pipeline.wildcard_limit, 20);
        assert_eq!(config.pipeline.max_plan_entries, 5);
        assert_eq!(config.pipeline.context_chars, 1500);
        assert_eq!(config.pipeline.min_edit_len, 10);
        assert_eq!(config.pipeline.validation_timeout_secs, 60);
        assert_eq!(config.sandbox.session_timeout_secs, 1800);
        assert_eq!(config.github.upstream_default_branch, "main");
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_or_default(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.planner.backend, PlannerBackend::Cli);
        assert_eq!(config.sandbox.backend, SandboxBackend::Local);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[queue]
concurrency = 4

[sandbox]
backend = "docker"
image = "python:3.12-slim"

[planner]
backend = "openai"
"#,
        )
        .unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.queue.concurrency, 4);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.retention_secs, 86400);
        assert_eq!(config.sandbox.backend, SandboxBackend::Docker);
        assert_eq!(config.sandbox.image, "python:3.12-slim");
        assert_eq!(config.sandbox.memory, "4g");
        assert_eq!(config.planner.backend, PlannerBackend::Openai);
        assert_eq!(config.planner.model, "gpt-5-mini");
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(ServiceConfig::parse("not valid toml {{{{").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        assert!(ServiceConfig::parse("[sandbox]\nbackend = \"vm\"\n").is_err());
    }

    #[test]
    fn test_validate_flags_zero_concurrency() {
        let mut config = ServiceConfig::default();
        config.queue.concurrency = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("concurrency"));
    }

    #[test]
    fn test_validate_flags_dotted_extension() {
        let mut config = ServiceConfig::default();
        config.pipeline.extensions = vec![".ts".to_string()];
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains(".ts")));
    }

    #[test]
    fn test_validate_default_is_clean() {
        assert!(ServiceConfig::default().validate().is_empty());
    }

    #[test]
    fn test_planner_command_fallback() {
        let config = ServiceConfig::default();
        assert_eq!(config.planner_command(), "claude");

        let mut config = ServiceConfig::default();
        config.planner.command = Some("my-llm".to_string());
        assert_eq!(config.planner_command(), "my-llm");
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials {
            openai_api_key: Some("sk-secret".into()),
            github_token: Some("ghp_secret".into()),
            github_username: Some("octo".into()),
            github_email: None,
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("ghp_secret"));
        assert!(rendered.contains("octo"));
    }

    #[test]
    fn test_workspace_root_override() {
        let mut config = SandboxConfig::default();
        config.workspace_root = Some(PathBuf::from("/srv/checkouts"));
        assert_eq!(config.workspace_root(), PathBuf::from("/srv/checkouts"));
    }
}
