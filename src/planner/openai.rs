//! OpenAI-compatible Chat Completions planner.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::PlannerClient;
use crate::errors::PlannerError;

pub struct OpenAiPlanner {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiPlanner {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for planner")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        })
    }
}

/// Pull the first choice's text out of a Chat Completions response body.
fn extract_content(body: &str) -> Result<String, PlannerError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| PlannerError::Invocation(format!("Malformed completion response: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| PlannerError::Invocation("Completion response had no content".to_string()))
}

#[async_trait]
impl PlannerClient for OpenAiPlanner {
    async fn invoke(&self, prompt: &str) -> Result<String, PlannerError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "invoking chat completions");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| PlannerError::Invocation(format!("Request failed: {}", e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PlannerError::Invocation(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(PlannerError::Invocation(format!(
                "Completion endpoint returned {}: {}",
                status.as_u16(),
                body.chars().take(500).collect::<String>()
            )));
        }

        extract_content(&body)
    }
}
