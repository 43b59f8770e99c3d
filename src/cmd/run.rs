//! `patchsmith run`: one job in the foreground.

use anyhow::{Result, bail};

use patchsmith::config::ServiceConfig;
use patchsmith::jobs::{JobQueue, JobRequest, JobStatus, JobStore};

pub async fn cmd_run(config: ServiceConfig, repo: &str, instruction: &str) -> Result<()> {
    let runner = super::build_runner(&config)?;
    let mut queue_config = config.queue.clone();
    queue_config.concurrency = 1;
    let (queue, _workers) = JobQueue::start(JobStore::default(), runner, queue_config);

    let id = match queue.submit(JobRequest::new(repo, instruction)).await {
        Ok(id) => id,
        Err(errors) => {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            bail!("Invalid request: {}", messages.join("; "));
        }
    };

    match queue.store().wait_for_terminal(&id).await {
        Some(JobStatus::Completed { result }) => {
            match &result.pr_url {
                Some(url) => println!("{}", url),
                None => println!("No changes were needed; no pull request opened."),
            }
            Ok(())
        }
        Some(JobStatus::Failed { reason }) => bail!("Job failed: {}", reason),
        other => bail!("Job ended in unexpected state: {:?}", other),
    }
}
