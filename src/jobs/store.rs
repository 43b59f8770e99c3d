use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::models::{JobEvent, JobId, JobRecord, JobRequest, JobStatus};

/// In-process job registry with a broadcast channel of status changes.
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
    events: broadcast::Sender<JobEvent>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl JobStore {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Register a new pending job.
    pub fn insert(&self, request: JobRequest) -> JobId {
        let record = JobRecord::new(request);
        let id = record.id;
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(id, record);
        }
        self.broadcast(id, JobStatus::Pending);
        id
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.lock().ok()?.get(id).cloned()
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.get(id).map(|r| r.status)
    }

    /// Move a job to `status` and notify subscribers.
    ///
    /// Terminal statuses are final: returns false, and changes nothing, for
    /// an unknown or already finished job.
    pub fn set_status(&self, id: &JobId, status: JobStatus) -> bool {
        let updated = match self.jobs.lock() {
            Ok(mut jobs) => match jobs.get_mut(id) {
                Some(record) if record.status.is_terminal() => {
                    warn!(job_id = %id, current = record.status.as_str(), "ignoring update to finished job");
                    false
                }
                Some(record) => {
                    record.status = status.clone();
                    record.updated_at = Utc::now();
                    true
                }
                None => false,
            },
            Err(_) => false,
        };
        if updated {
            debug!(job_id = %id, status = status.as_str(), "job status changed");
            self.broadcast(*id, status);
        }
        updated
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Wait until the job reaches a terminal status.
    ///
    /// Returns `None` for an unknown job.
    pub async fn wait_for_terminal(&self, id: &JobId) -> Option<JobStatus> {
        let mut rx = self.subscribe();
        loop {
            let current = self.status(id)?;
            if current.is_terminal() {
                return Some(current);
            }
            match rx.recv().await {
                Ok(event) if event.job_id == *id && event.status.is_terminal() => return Some(event.status),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.status(id),
            }
        }
    }

    /// Drop finished jobs last updated before `cutoff`. Returns how many
    /// were removed.
    pub fn prune_finished(&self, cutoff: DateTime<Utc>) -> usize {
        let Ok(mut jobs) = self.jobs.lock() else {
            return 0;
        };
        let before = jobs.len();
        jobs.retain(|_, record| !(record.status.is_terminal() && record.updated_at < cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            debug!(removed, remaining = jobs.len(), "pruned finished jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn broadcast(&self, job_id: JobId, status: JobStatus) {
        // No receivers is fine.
        let _ = self.events.send(JobEvent { job_id, status });
    }
}
