//! Typed error hierarchy for patchsmith.
//!
//! Four top-level enums cover the subsystems that cross a typed boundary:
//! - `ExecutorError` - sandbox command and file failures
//! - `PlannerError` / `PlannerParseError` - planner transport and output parsing
//! - `RemoteError` - fork, push and pull-request failures
//! - `JobError` - job-level failures reported to the progress stream

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the sandboxed executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Command `{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Path {path} escapes the checkout")]
    PathEscape { path: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Malformed planner output.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlannerParseError {
    #[error("Planner output is not valid JSON ({message}): {snippet}")]
    NotJson { snippet: String, message: String },

    #[error("Planner output is not a JSON array")]
    NotAnArray,

    #[error("Planner output is empty")]
    Empty,

    #[error("Unknown plan action '{action}'")]
    UnknownAction { action: String },
}

/// Errors from a planner invocation.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Planner invocation failed: {0}")]
    Invocation(String),

    #[error(transparent)]
    Parse(#[from] PlannerParseError),
}

/// Errors from the version-control remote.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("GitHub API returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to push: {stderr}")]
    Push { stderr: String },

    #[error("Invalid repository URL: {url}")]
    InvalidRepositoryUrl { url: String },

    #[error("GITHUB_TOKEN is not set")]
    MissingCredentials,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced for a job as a whole.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Failed to prepare checkout: {0}")]
    Checkout(#[source] ExecutorError),

    #[error("{loop_name} retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted { loop_name: String, attempts: u32 },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Sandbox session timed out after {seconds}s{}", pr_note(.pr_url))]
    SessionTimeout { seconds: u64, pr_url: Option<String> },

    #[error("Pipeline failed: {0}")]
    Pipeline(String),
}

fn pr_note(pr_url: &Option<String>) -> String {
    match pr_url {
        Some(url) => format!(" (partial changes published: {})", url),
        None => String::new(),
    }
}

impl JobError {
    /// Whether another attempt from a fresh checkout could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            JobError::InvalidInput { .. }
                | JobError::Remote(RemoteError::InvalidRepositoryUrl { .. })
                | JobError::Remote(RemoteError::MissingCredentials)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_error_command_failed_carries_exit_code() {
        let err = ExecutorError::CommandFailed {
            command: "npm run lint".into(),
            exit_code: 2,
            stderr: "boom".into(),
        };
        match &err {
            ExecutorError::CommandFailed { exit_code, .. } => assert_eq!(*exit_code, 2),
            _ => panic!("Expected CommandFailed"),
        }
        assert!(err.to_string().contains("npm run lint"));
    }

    #[test]
    fn executor_error_io_carries_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ExecutorError::Io {
            path: PathBuf::from("/work/src/a.ts"),
            source: io_err,
        };
        match &err {
            ExecutorError::Io { path, source } => {
                assert_eq!(path, &PathBuf::from("/work/src/a.ts"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io"),
        }
    }

    #[test]
    fn planner_error_converts_from_parse_error() {
        let err: PlannerError = PlannerParseError::NotAnArray.into();
        assert!(matches!(err, PlannerError::Parse(PlannerParseError::NotAnArray)));
    }

    #[test]
    fn job_error_retry_budget_names_loop() {
        let err = JobError::RetryBudgetExhausted {
            loop_name: "search".into(),
            attempts: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("search"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn job_error_converts_from_remote_error() {
        let err: JobError = RemoteError::Http {
            status: 422,
            body: "{\"message\":\"A pull request already exists\"}".into(),
        }
        .into();
        match &err {
            JobError::Remote(RemoteError::Http { status, body }) => {
                assert_eq!(*status, 422);
                assert!(body.contains("already exists"));
            }
            _ => panic!("Expected JobError::Remote(Http)"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ExecutorError::NotFound { path: "x".into() });
        assert_std_error(&PlannerError::Invocation("x".into()));
        assert_std_error(&RemoteError::MissingCredentials);
        assert_std_error(&JobError::SessionTimeout {
            seconds: 1,
            pr_url: None,
        });
    }

    #[test]
    fn job_error_session_timeout_mentions_partial_pr() {
        let err = JobError::SessionTimeout {
            seconds: 1800,
            pr_url: Some("https://github.com/acme/calc/pull/7".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("1800s"));
        assert!(msg.contains("pull/7"));
        let bare = JobError::SessionTimeout {
            seconds: 5,
            pr_url: None,
        };
        assert_eq!(bare.to_string(), "Sandbox session timed out after 5s");
    }

    #[test]
    fn job_error_retryability() {
        assert!(!JobError::Remote(RemoteError::MissingCredentials).is_retryable());
        assert!(
            !JobError::InvalidInput {
                field: "instruction".into(),
                message: "too short".into()
            }
            .is_retryable()
        );
        assert!(JobError::Pipeline("Plan failed".into()).is_retryable());
        assert!(
            JobError::Remote(RemoteError::Http {
                status: 502,
                body: String::new()
            })
            .is_retryable()
        );
    }
}
