use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use super::models::{JobId, JobRequest, JobResult};
use crate::config::ServiceConfig;
use crate::errors::{ExecutorError, JobError};
use crate::pipeline::{FailureReason, PipelineDriver, PipelineOutcome, PipelineState};
use crate::planner::PlannerClient;
use crate::remote::{ForkInfo, PublishOutcome, Publisher, Remote, RepoRef};
use crate::sandbox::{Executor, SandboxProvider, shell_escape};

const GIT_CHECK_TIMEOUT: Duration = Duration::from_secs(15);
const GIT_INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

/// One attempt at a job, from a fresh checkout.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_attempt(&self, job_id: JobId, request: &JobRequest, attempt: u32) -> Result<JobResult, JobError>;
}

/// Forks the repository, runs the pipeline in a fresh sandbox checkout and
/// publishes the result as a pull request.
pub struct SandboxJobRunner {
    planner: Arc<dyn PlannerClient>,
    provider: Arc<dyn SandboxProvider>,
    remote: Arc<dyn Remote>,
    publisher: Publisher,
    config: ServiceConfig,
}

impl SandboxJobRunner {
    pub fn new(
        planner: Arc<dyn PlannerClient>,
        provider: Arc<dyn SandboxProvider>,
        remote: Arc<dyn Remote>,
        config: ServiceConfig,
        author_name: &str,
        author_email: &str,
    ) -> Self {
        let publisher = Publisher::new(
            remote.clone(),
            author_name,
            author_email,
            &config.github.upstream_default_branch,
        );
        Self {
            planner,
            provider,
            remote,
            publisher,
            config,
        }
    }

    async fn ensure_git(&self, executor: &dyn Executor) -> Result<(), JobError> {
        let check = executor
            .run_command("git --version", GIT_CHECK_TIMEOUT)
            .await
            .map_err(JobError::Checkout)?;
        if check.success() {
            return Ok(());
        }
        warn!("git missing in sandbox; installing");
        let install = executor
            .run_command("apt-get update -y && apt-get install -y git", GIT_INSTALL_TIMEOUT)
            .await
            .map_err(JobError::Checkout)?;
        if !install.success() {
            return Err(JobError::Checkout(ExecutorError::CommandFailed {
                command: "apt-get install -y git".to_string(),
                exit_code: install.exit_code,
                stderr: install.stderr,
            }));
        }
        Ok(())
    }

    async fn clone_fork(&self, executor: &dyn Executor, fork: &ForkInfo) -> Result<(), JobError> {
        let checkout = shell_escape(&executor.checkout_dir());
        let cmd = format!(
            "rm -rf {0} && mkdir -p \"$(dirname {0})\" && git clone {1} {0}",
            checkout,
            shell_escape(&fork.clone_url)
        );
        let timeout = Duration::from_secs(self.config.sandbox.clone_timeout_secs);
        let output = executor.run_command(&cmd, timeout).await.map_err(JobError::Checkout)?;
        if !output.success() {
            return Err(JobError::Checkout(ExecutorError::CommandFailed {
                command: format!("git clone {}", fork.clone_url),
                exit_code: output.exit_code,
                stderr: output.stderr,
            }));
        }
        info!(fork = %fork.repo.full_name(), "fork cloned");
        Ok(())
    }

    async fn attempt_in(
        &self,
        executor: Arc<dyn Executor>,
        job_id: JobId,
        request: &JobRequest,
        upstream: &RepoRef,
        fork: &ForkInfo,
    ) -> Result<JobResult, JobError> {
        self.ensure_git(executor.as_ref()).await?;
        self.clone_fork(executor.as_ref(), fork).await?;

        let driver = PipelineDriver::new(self.planner.clone(), executor.clone(), self.config.pipeline.clone());
        let mut state = PipelineState::new(&request.instruction);
        let session_secs = self.config.sandbox.session_timeout_secs;
        let job_label = job_id.to_string();

        let timed = tokio::time::timeout(Duration::from_secs(session_secs), driver.run(&job_label, &mut state)).await;

        match timed {
            Ok(PipelineOutcome::Success) => {
                let published = self
                    .publisher
                    .publish(
                        executor.as_ref(),
                        upstream,
                        fork,
                        &request.instruction,
                        state.applied_changes().len(),
                    )
                    .await?;
                Ok(job_result(&state, published))
            }
            Ok(PipelineOutcome::Failed { reason }) => Err(failure_to_error(reason)),
            Err(_) => {
                warn!(seconds = session_secs, applied = state.applied_changes().len(), "sandbox session timed out");
                let pr_url = if state.applied_changes().is_empty() {
                    None
                } else {
                    self.publish_partial(executor.as_ref(), upstream, fork, request, &state)
                        .await
                };
                Err(JobError::SessionTimeout {
                    seconds: session_secs,
                    pr_url,
                })
            }
        }
    }

    /// Best-effort publish after a timeout. Errors are logged, not returned.
    async fn publish_partial(
        &self,
        executor: &dyn Executor,
        upstream: &RepoRef,
        fork: &ForkInfo,
        request: &JobRequest,
        state: &PipelineState,
    ) -> Option<String> {
        match self
            .publisher
            .publish(executor, upstream, fork, &request.instruction, state.applied_changes().len())
            .await
        {
            Ok(outcome) => {
                let url = outcome.pr_url().map(str::to_string);
                if let Some(url) = &url {
                    info!(%url, "published partial changes after timeout");
                }
                url
            }
            Err(e) => {
                warn!(error = %e, "could not publish partial changes after timeout");
                None
            }
        }
    }
}

fn job_result(state: &PipelineState, published: PublishOutcome) -> JobResult {
    let (pr_url, branch) = match published {
        PublishOutcome::NoChanges => (None, None),
        PublishOutcome::Opened { url, branch } => (Some(url), Some(branch)),
    };
    JobResult {
        pr_url,
        branch,
        applied_files: state.applied_changes().iter().map(|c| c.path.clone()).collect(),
        search_attempts: state.search_attempts(),
        validation_attempts: state.validation_attempts(),
    }
}

pub fn failure_to_error(reason: FailureReason) -> JobError {
    match reason {
        FailureReason::SearchExhausted { attempts } => JobError::RetryBudgetExhausted {
            loop_name: "search".to_string(),
            attempts,
        },
        FailureReason::ValidationExhausted { attempts } => JobError::RetryBudgetExhausted {
            loop_name: "validation".to_string(),
            attempts,
        },
        other => JobError::Pipeline(other.to_string()),
    }
}

#[async_trait]
impl JobRunner for SandboxJobRunner {
    async fn run_attempt(&self, job_id: JobId, request: &JobRequest, attempt: u32) -> Result<JobResult, JobError> {
        let upstream = RepoRef::parse_url(&request.repository_url)?;
        info!(job_id = %job_id, attempt, repo = %upstream.full_name(), "starting job attempt");

        let fork = self.remote.fork(&upstream).await?;
        let settle = self.config.github.fork_settle_secs;
        if settle > 0 {
            tokio::time::sleep(Duration::from_secs(settle)).await;
        }

        let session = format!("{}-{}", job_id, attempt);
        let executor = self.provider.provision(&session).await.map_err(JobError::Checkout)?;
        let result = self
            .attempt_in(executor.clone(), job_id, request, &upstream, &fork)
            .await;
        if let Err(e) = executor.shutdown().await {
            warn!(job_id = %job_id, error = %e, "sandbox shutdown failed");
        }
        result
    }
}
