//! Remote double that records calls instead of talking to a host.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{ForkInfo, PullRequestSpec, Remote, RepoRef};
use crate::errors::RemoteError;

const FAKE_TOKEN: &str = "fake-token";

#[derive(Default)]
struct Calls {
    forks: Vec<RepoRef>,
    pull_requests: Vec<PullRequestSpec>,
}

/// Forks into a fixed `bot` account and numbers pull requests from 1.
#[derive(Default)]
pub struct RecordingRemote {
    calls: Mutex<Calls>,
    fail_fork: Option<(u16, String)>,
    fail_pull_request: Option<(u16, String)>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer fork requests with an HTTP error.
    pub fn failing_fork(mut self, status: u16, body: &str) -> Self {
        self.fail_fork = Some((status, body.to_string()));
        self
    }

    pub fn failing_pull_request(mut self, status: u16, body: &str) -> Self {
        self.fail_pull_request = Some((status, body.to_string()));
        self
    }

    pub fn forks(&self) -> Vec<RepoRef> {
        self.calls.lock().map(|c| c.forks.clone()).unwrap_or_default()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestSpec> {
        self.calls.lock().map(|c| c.pull_requests.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Calls>, RemoteError> {
        self.calls
            .lock()
            .map_err(|_| RemoteError::Other(anyhow::anyhow!("recording remote lock poisoned")))
    }
}

#[async_trait]
impl Remote for RecordingRemote {
    async fn fork(&self, upstream: &RepoRef) -> Result<ForkInfo, RemoteError> {
        self.lock()?.forks.push(upstream.clone());
        if let Some((status, body)) = &self.fail_fork {
            return Err(RemoteError::Http {
                status: *status,
                body: body.clone(),
            });
        }
        let repo = RepoRef::new("bot", &upstream.name);
        Ok(ForkInfo {
            clone_url: format!("https://github.com/{}.git", repo.full_name()),
            repo,
        })
    }

    async fn open_pull_request(&self, pr: &PullRequestSpec) -> Result<String, RemoteError> {
        if let Some((status, body)) = &self.fail_pull_request {
            return Err(RemoteError::Http {
                status: *status,
                body: body.clone(),
            });
        }
        let mut calls = self.lock()?;
        calls.pull_requests.push(pr.clone());
        Ok(format!(
            "https://github.com/{}/pull/{}",
            pr.upstream.full_name(),
            calls.pull_requests.len()
        ))
    }

    fn push_url(&self, fork: &ForkInfo) -> Result<String, RemoteError> {
        Ok(fork
            .clone_url
            .replacen("https://", &format!("https://x-access-token:{}@", FAKE_TOKEN), 1))
    }

    fn redact(&self, text: &str) -> String {
        text.replace(FAKE_TOKEN, "***")
    }
}
