use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CommandOutput, Executor, normalize_relative, shell_escape};
use crate::config::SandboxConfig;
use crate::errors::ExecutorError;

const WORKDIR: &str = "/workspace";

/// Executor backed by a throwaway container driven through the docker CLI.
///
/// The container idles on `sleep infinity`; every operation is a
/// `docker exec`. The checkout lives at `/workspace/repo`.
pub struct DockerExecutor {
    container_id: String,
}

impl DockerExecutor {
    pub async fn create(config: &SandboxConfig, session: &str) -> Result<Self, ExecutorError> {
        let name = format!("patchsmith-{}", session);
        let cpus = config.cpus.to_string();
        let args = [
            "run",
            "-d",
            "--rm",
            "--name",
            name.as_str(),
            "--memory",
            config.memory.as_str(),
            "--cpus",
            cpus.as_str(),
            "-w",
            WORKDIR,
            config.image.as_str(),
            "sh",
            "-c",
            "mkdir -p /workspace && sleep infinity",
        ];
        let output = docker(&args, None, Duration::from_secs(120)).await?;
        if !output.success() {
            return Err(ExecutorError::CommandFailed {
                command: format!("docker run {}", config.image),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        let container_id = output.stdout.trim().to_string();
        debug!(%container_id, image = %config.image, "sandbox container started");
        Ok(Self { container_id })
    }

    fn checkout_path(&self, path: &str) -> Result<String, ExecutorError> {
        Ok(format!("{}/{}", self.checkout_dir(), normalize_relative(path)?))
    }

    async fn exec(&self, script: &str, stdin: Option<&str>, timeout: Duration) -> Result<CommandOutput, ExecutorError> {
        let mut args = vec!["exec"];
        if stdin.is_some() {
            args.push("-i");
        }
        args.extend(["-w", WORKDIR, self.container_id.as_str(), "sh", "-c", script]);
        docker(&args, stdin, timeout).await
    }
}

/// Run the docker CLI, optionally feeding `stdin`.
async fn docker(args: &[&str], stdin: Option<&str>, timeout: Duration) -> Result<CommandOutput, ExecutorError> {
    let run = async {
        let mut child = Command::new("docker")
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Other(anyhow::anyhow!("Failed to spawn docker: {}", e)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| ExecutorError::Other(anyhow::anyhow!("Failed to write to docker stdin: {}", e)))?;
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutorError::Other(anyhow::anyhow!("docker did not exit cleanly: {}", e)))?;
        Ok::<_, ExecutorError>(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    };

    tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| ExecutorError::Timeout {
            command: format!("docker {}", args.first().copied().unwrap_or_default()),
            seconds: timeout.as_secs(),
        })?
}

#[async_trait]
impl Executor for DockerExecutor {
    fn checkout_dir(&self) -> String {
        format!("{}/repo", WORKDIR)
    }

    async fn run_command(&self, cmd: &str, timeout: Duration) -> Result<CommandOutput, ExecutorError> {
        debug!(container = %self.container_id, cmd, "docker exec");
        self.exec(cmd, None, timeout).await
    }

    async fn read_file(&self, path: &str) -> Result<String, ExecutorError> {
        let full = self.checkout_path(path)?;
        let script = format!("test -f {0} && cat {0}", shell_escape(&full));
        let output = self.exec(&script, None, super::DEFAULT_COMMAND_TIMEOUT).await?;
        if output.exit_code == 1 && output.stderr.is_empty() {
            return Err(ExecutorError::NotFound {
                path: path.to_string(),
            });
        }
        if !output.success() {
            return Err(ExecutorError::CommandFailed {
                command: format!("cat {}", full),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutorError> {
        let full = self.checkout_path(path)?;
        let script = format!(
            "mkdir -p \"$(dirname {0})\" && cat > {0}",
            shell_escape(&full)
        );
        let output = self
            .exec(&script, Some(content), super::DEFAULT_COMMAND_TIMEOUT)
            .await?;
        if !output.success() {
            return Err(ExecutorError::CommandFailed {
                command: format!("write {}", full),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), ExecutorError> {
        let full = self.checkout_path(path)?;
        let script = format!("test -f {0} && rm {0}", shell_escape(&full));
        let output = self.exec(&script, None, super::DEFAULT_COMMAND_TIMEOUT).await?;
        if output.exit_code == 1 && output.stderr.is_empty() {
            return Err(ExecutorError::NotFound {
                path: path.to_string(),
            });
        }
        if !output.success() {
            return Err(ExecutorError::CommandFailed {
                command: format!("rm {}", full),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExecutorError> {
        let output = docker(
            &["rm", "-f", self.container_id.as_str()],
            None,
            Duration::from_secs(60),
        )
        .await?;
        if !output.success() {
            warn!(container = %self.container_id, stderr = %output.stderr.trim(), "failed to remove sandbox container");
        }
        Ok(())
    }
}
