use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::PlannerClient;
use crate::errors::PlannerError;

/// Planner backed by an LLM command-line tool invoked once per prompt.
pub struct CliPlanner {
    command: String,
    timeout: Duration,
}

impl CliPlanner {
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PlannerClient for CliPlanner {
    async fn invoke(&self, prompt: &str) -> Result<String, PlannerError> {
        debug!(command = %self.command, prompt_len = prompt.len(), "invoking planner CLI");

        let child = Command::new(&self.command)
            .args(["--print", "--output-format", "text", "-p", prompt])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                PlannerError::Invocation(format!(
                    "{} timed out after {}s",
                    self.command,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PlannerError::Invocation(format!("Failed to run {}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlannerError::Invocation(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
