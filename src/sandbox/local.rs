use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, Executor, normalize_relative};
use crate::errors::ExecutorError;

/// Executor backed by a private directory on the host.
///
/// Layout: `<workspace_root>/<session>/` is the session root where commands
/// run; the checkout lives at `<session>/repo`.
pub struct LocalExecutor {
    root: PathBuf,
}

impl LocalExecutor {
    pub async fn create(workspace_root: &Path, session: &str) -> Result<Self, ExecutorError> {
        let root = workspace_root.join(session);
        if tokio::fs::try_exists(&root).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&root)
                .await
                .map_err(|source| ExecutorError::Io {
                    path: root.clone(),
                    source,
                })?;
        }
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| ExecutorError::Io {
                path: root.clone(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn checkout_path(&self) -> PathBuf {
        self.root.join("repo")
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ExecutorError> {
        Ok(self.checkout_path().join(normalize_relative(path)?))
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn checkout_dir(&self) -> String {
        self.checkout_path().to_string_lossy().to_string()
    }

    async fn run_command(&self, cmd: &str, timeout: Duration) -> Result<CommandOutput, ExecutorError> {
        debug!(cmd, "local exec");
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| ExecutorError::Timeout {
                command: cmd.to_string(),
                seconds: timeout.as_secs(),
            })?
            .map_err(|source| ExecutorError::Io {
                path: self.root.clone(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn read_file(&self, path: &str) -> Result<String, ExecutorError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::NotFound {
                    path: path.to_string(),
                }
            } else {
                ExecutorError::Io { path: full, source }
            }
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutorError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ExecutorError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|source| ExecutorError::Io { path: full, source })
    }

    async fn remove_file(&self, path: &str) -> Result<(), ExecutorError> {
        let full = self.resolve(path)?;
        tokio::fs::remove_file(&full).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::NotFound {
                    path: path.to_string(),
                }
            } else {
                ExecutorError::Io { path: full, source }
            }
        })
    }

    async fn shutdown(&self) -> Result<(), ExecutorError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ExecutorError::Io {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn executor() -> (tempfile::TempDir, LocalExecutor) {
        let dir = tempfile::tempdir().unwrap();
        let exec = LocalExecutor::create(dir.path(), "job-1").await.unwrap();
        (dir, exec)
    }

    #[tokio::test]
    async fn test_write_then_read_creates_parents() {
        let (_dir, exec) = executor().await;
        exec.write_file("src/deep/a.ts", "export {}").await.unwrap();
        assert_eq!(exec.read_file("./src/deep/a.ts").await.unwrap(), "export {}");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (_dir, exec) = executor().await;
        assert!(matches!(
            exec.read_file("missing.ts").await,
            Err(ExecutorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let (_dir, exec) = executor().await;
        assert!(matches!(
            exec.write_file("../outside.txt", "x").await,
            Err(ExecutorError::PathEscape { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_command_reports_exit_code() {
        let (_dir, exec) = executor().await;
        let out = exec
            .run_command("echo hi && exit 4", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 4);
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let (_dir, exec) = executor().await;
        let result = exec.run_command("sleep 5", Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ExecutorError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_remove_and_shutdown() {
        let (_dir, exec) = executor().await;
        exec.write_file("a.txt", "x").await.unwrap();
        exec.remove_file("a.txt").await.unwrap();
        assert!(matches!(
            exec.remove_file("a.txt").await,
            Err(ExecutorError::NotFound { .. })
        ));
        let root = exec.root().to_path_buf();
        exec.shutdown().await.unwrap();
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_create_replaces_stale_session() {
        let dir = tempfile::tempdir().unwrap();
        let first = LocalExecutor::create(dir.path(), "job-2").await.unwrap();
        first.write_file("stale.txt", "old").await.unwrap();
        let second = LocalExecutor::create(dir.path(), "job-2").await.unwrap();
        assert!(second.read_file("stale.txt").await.is_err());
    }
}
