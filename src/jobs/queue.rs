use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use super::models::{JobId, JobRequest, JobStatus};
use super::runner::JobRunner;
use super::store::JobStore;
use crate::config::QueueConfig;
use crate::errors::JobError;

const QUEUE_CAPACITY: usize = 1024;

/// Accepts validated jobs and runs them on a bounded worker pool.
#[derive(Clone)]
pub struct JobQueue {
    store: JobStore,
    tx: mpsc::Sender<JobId>,
    retention: Option<chrono::Duration>,
}

impl JobQueue {
    /// Spawn the dispatcher. The returned handle finishes once every
    /// `JobQueue` clone is dropped and in-flight jobs are done.
    pub fn start(store: JobStore, runner: Arc<dyn JobRunner>, config: QueueConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let retention = i64::try_from(config.retention_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(chrono::Duration::try_seconds);
        let handle = tokio::spawn(dispatch(rx, store.clone(), runner, config));
        (Self { store, tx, retention }, handle)
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Validate and enqueue a request. Finished jobs past the retention
    /// window are pruned first.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, Vec<JobError>> {
        request.validate()?;
        if let Some(retention) = self.retention
            && let Some(cutoff) = Utc::now().checked_sub_signed(retention)
        {
            self.store.prune_finished(cutoff);
        }
        let id = self.store.insert(request);
        if self.tx.send(id).await.is_err() {
            let reason = "job queue is not running".to_string();
            self.store.set_status(&id, JobStatus::Failed { reason: reason.clone() });
            return Err(vec![JobError::Pipeline(reason)]);
        }
        info!(job_id = %id, "job queued");
        Ok(id)
    }
}

async fn dispatch(mut rx: mpsc::Receiver<JobId>, store: JobStore, runner: Arc<dyn JobRunner>, config: QueueConfig) {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut workers = Vec::new();
    while let Some(id) = rx.recv().await {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(error = %e, "worker pool closed");
                break;
            }
        };
        let store = store.clone();
        let runner = runner.clone();
        let config = config.clone();
        workers.push(tokio::spawn(
            async move {
                run_job(&store, runner.as_ref(), id, &config).await;
                drop(permit);
            }
            .instrument(info_span!("job", job_id = %id)),
        ));
        workers.retain(|w| !w.is_finished());
    }
    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "job worker panicked");
        }
    }
}

/// Drive one job through its attempts until it completes or fails.
pub async fn run_job(store: &JobStore, runner: &dyn JobRunner, id: JobId, config: &QueueConfig) {
    let Some(record) = store.get(&id) else {
        warn!(job_id = %id, "queued job vanished from the store");
        return;
    };
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        store.set_status(&id, JobStatus::Running { attempt });
        match runner.run_attempt(id, &record.request, attempt).await {
            Ok(result) => {
                info!(attempt, pr_url = ?result.pr_url, "job completed");
                store.set_status(&id, JobStatus::Completed { result });
                return;
            }
            Err(e) if !e.is_retryable() || attempt == max_attempts => {
                error!(attempt, error = %e, "job failed");
                store.set_status(&id, JobStatus::Failed { reason: e.to_string() });
                return;
            }
            Err(e) => {
                let delay = backoff_delay(config.backoff_base_ms, attempt);
                warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "job attempt failed; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// `base * 2^(attempt - 1)`, saturating.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}
