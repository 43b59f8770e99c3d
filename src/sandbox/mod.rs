//! Sandboxed executor: isolated checkout with file and shell access.
//!
//! Every job attempt gets its own executor session, provisioned by a
//! [`SandboxProvider`]. Shell commands run in the session root; file
//! operations take paths relative to the checkout at [`Executor::checkout_dir`].

pub mod docker;
pub mod local;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{SandboxBackend, SandboxConfig};
use crate::errors::ExecutorError;

pub use docker::DockerExecutor;
pub use local::LocalExecutor;
pub use memory::MemoryExecutor;

/// Default timeout for housekeeping commands (git status, find, ...).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of a finished shell command. A non-zero exit is not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Abstraction over the isolated environment for testability.
/// Real implementations: `LocalExecutor`, `DockerExecutor`. Test double: `MemoryExecutor`.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Absolute path of the repository checkout inside the sandbox.
    fn checkout_dir(&self) -> String;

    async fn run_command(&self, cmd: &str, timeout: Duration) -> Result<CommandOutput, ExecutorError>;

    async fn read_file(&self, path: &str) -> Result<String, ExecutorError>;

    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutorError>;

    async fn remove_file(&self, path: &str) -> Result<(), ExecutorError>;

    /// Tear the session down. Called once per job attempt.
    async fn shutdown(&self) -> Result<(), ExecutorError> {
        Ok(())
    }
}

/// Creates one fresh executor session per job attempt.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn provision(&self, session: &str) -> Result<Arc<dyn Executor>, ExecutorError>;
}

/// Provider selected by `[sandbox] backend`.
pub struct ConfiguredProvider {
    config: SandboxConfig,
}

impl ConfiguredProvider {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SandboxProvider for ConfiguredProvider {
    async fn provision(&self, session: &str) -> Result<Arc<dyn Executor>, ExecutorError> {
        let executor: Arc<dyn Executor> = match self.config.backend {
            SandboxBackend::Local => {
                Arc::new(LocalExecutor::create(&self.config.workspace_root(), session).await?)
            }
            SandboxBackend::Docker => Arc::new(DockerExecutor::create(&self.config, session).await?),
        };
        Ok(executor)
    }
}

/// Quote a string for safe inclusion in a POSIX shell command.
pub fn shell_escape(input: &str) -> String {
    if !input.is_empty()
        && input
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':'))
    {
        return input.to_string();
    }
    let mut escaped = String::from("'");
    for ch in input.chars() {
        if ch == '\'' {
            escaped.push_str("'\"'\"'");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

/// Normalize a checkout-relative path, rejecting anything that could escape it.
pub fn normalize_relative(path: &str) -> Result<String, ExecutorError> {
    let trimmed = path.trim();
    let stripped = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let escape = || ExecutorError::PathEscape {
        path: path.to_string(),
    };
    if stripped.is_empty() || stripped.starts_with('/') {
        return Err(escape());
    }
    let mut parts = Vec::new();
    for part in stripped.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(escape()),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(escape());
    }
    Ok(parts.join("/"))
}
