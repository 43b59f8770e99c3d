//! Planner client: the opaque text-in/text-out model capability.
//!
//! Responses are untrusted. Callers strip formatting fences and parse into
//! typed structures via [`response`], degrading to defaults on failure.

pub mod cli;
pub mod openai;
pub mod response;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Credentials, PlannerBackend, ServiceConfig};
use crate::errors::PlannerError;

pub use cli::CliPlanner;
pub use openai::OpenAiPlanner;
pub use scripted::ScriptedPlanner;

/// Abstraction over the language-model planner for testability.
/// Real implementations: `CliPlanner`, `OpenAiPlanner`. Test double: `ScriptedPlanner`.
#[async_trait]
pub trait PlannerClient: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, PlannerError>;
}

/// Build the configured planner backend.
pub fn from_config(config: &ServiceConfig, credentials: &Credentials) -> anyhow::Result<Arc<dyn PlannerClient>> {
    let timeout = std::time::Duration::from_secs(config.planner.timeout_secs);
    let planner: Arc<dyn PlannerClient> = match config.planner.backend {
        PlannerBackend::Cli => Arc::new(CliPlanner::new(&config.planner_command(), timeout)),
        PlannerBackend::Openai => {
            let api_key = credentials
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is required for the openai planner backend"))?;
            Arc::new(OpenAiPlanner::new(
                &config.planner.base_url,
                &config.planner.model,
                &api_key,
                timeout,
            )?)
        }
    };
    Ok(planner)
}
