//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `serve`  | `Serve`          |
//! | `run`    | `Run`            |
//! | `config` | `Config`         |

pub mod config;
pub mod run;
pub mod serve;

pub use config::cmd_config;
pub use run::cmd_run;
pub use serve::cmd_serve;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use patchsmith::config::{Credentials, DEFAULT_CONFIG_PATH, ServiceConfig};
use patchsmith::errors::RemoteError;
use patchsmith::jobs::SandboxJobRunner;
use patchsmith::planner;
use patchsmith::remote::GitHubRemote;
use patchsmith::sandbox::ConfiguredProvider;

const DEFAULT_AUTHOR_NAME: &str = "patchsmith";
const DEFAULT_AUTHOR_EMAIL: &str = "patchsmith@users.noreply.github.com";

/// Resolve configuration: an explicit `--config` must exist, the default
/// location is optional.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let config = match path {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };
    Ok(config.with_env_overrides())
}

/// Wire planner, sandbox provider and GitHub remote into a job runner.
pub fn build_runner(config: &ServiceConfig) -> Result<Arc<SandboxJobRunner>> {
    let credentials = Credentials::from_env();
    let planner = planner::from_config(config, &credentials)?;
    let token = credentials
        .github_token
        .as_deref()
        .ok_or(RemoteError::MissingCredentials)?;
    let remote = GitHubRemote::new(&config.github.api_base, token).context("Failed to set up GitHub client")?;
    let provider = ConfiguredProvider::new(config.sandbox.clone());

    Ok(Arc::new(SandboxJobRunner::new(
        planner,
        Arc::new(provider),
        Arc::new(remote),
        config.clone(),
        credentials.github_username.as_deref().unwrap_or(DEFAULT_AUTHOR_NAME),
        credentials.github_email.as_deref().unwrap_or(DEFAULT_AUTHOR_EMAIL),
    )))
}
