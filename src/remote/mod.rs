//! Version-control remote: forks, pushes and pull requests.

pub mod github;
pub mod publish;
pub mod recording;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::RemoteError;

pub use github::GitHubRemote;
pub use publish::{PublishOutcome, Publisher};
pub use recording::RecordingRemote;

/// An `owner/name` repository on the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: &str, name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse the `owner/repo` slug from a repository URL.
    ///
    /// Accepts `https://host/owner/repo`, a trailing `.git` or `/`, and a
    /// token-embedded user-info section.
    pub fn parse_url(raw: &str) -> Result<Self, RemoteError> {
        let invalid = || RemoteError::InvalidRepositoryUrl { url: raw.to_string() };
        let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        match segments.as_slice() {
            [owner, name] => {
                let name = name.strip_suffix(".git").unwrap_or(name);
                if name.is_empty() {
                    return Err(invalid());
                }
                Ok(Self::new(owner, name))
            }
            _ => Err(invalid()),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Parse an `owner/name` string as returned by the API.
    pub fn from_full_name(full_name: &str) -> Option<Self> {
        let (owner, name) = full_name.split_once('/')?;
        (!owner.is_empty() && !name.is_empty() && !name.contains('/')).then(|| Self::new(owner, name))
    }
}

/// A fork created (or reused) for the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkInfo {
    pub repo: RepoRef,
    pub clone_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSpec {
    pub upstream: RepoRef,
    /// `<forkOwner>:<branch>`
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

/// Abstraction over the remote host for testability.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn fork(&self, upstream: &RepoRef) -> Result<ForkInfo, RemoteError>;

    /// Open a pull request and return its web URL.
    async fn open_pull_request(&self, pr: &PullRequestSpec) -> Result<String, RemoteError>;

    /// Authenticated URL that `git push` can use for the fork.
    fn push_url(&self, fork: &ForkInfo) -> Result<String, RemoteError>;

    /// Strip credentials from text that may echo the push URL.
    fn redact(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Convert a title to a branch-safe slug, limited to `max_len` characters.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        slug[..max_len].trim_end_matches('-').to_string()
    } else {
        slug
    }
}
