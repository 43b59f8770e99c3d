//! Deterministic planner double for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::PlannerClient;
use crate::errors::PlannerError;

struct Rule {
    needle: String,
    responses: VecDeque<Result<String, String>>,
}

/// Planner that answers from scripted rules.
///
/// The first rule whose needle occurs in the prompt answers. A rule with
/// several responses yields them in order and then keeps repeating the last.
/// Prompts with no matching rule fail with an invocation error.
#[derive(Default)]
pub struct ScriptedPlanner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts containing `needle` with `response`.
    pub fn on(self, needle: &str, response: &str) -> Self {
        self.push_rule(needle, vec![Ok(response.to_string())])
    }

    /// Answer prompts containing `needle` with each response in turn.
    pub fn on_sequence(self, needle: &str, responses: &[&str]) -> Self {
        self.push_rule(needle, responses.iter().map(|r| Ok(r.to_string())).collect())
    }

    /// Fail prompts containing `needle`.
    pub fn fail_on(self, needle: &str, message: &str) -> Self {
        self.push_rule(needle, vec![Err(message.to_string())])
    }

    fn push_rule(self, needle: &str, responses: Vec<Result<String, String>>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                needle: needle.to_string(),
                responses: responses.into(),
            });
        }
        self
    }

    /// Every prompt received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of prompts received that contain `needle`.
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl PlannerClient for ScriptedPlanner {
    async fn invoke(&self, prompt: &str) -> Result<String, PlannerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }

        let mut rules = self
            .rules
            .lock()
            .map_err(|_| PlannerError::Invocation("scripted planner lock poisoned".to_string()))?;
        let rule = rules
            .iter_mut()
            .find(|r| prompt.contains(&r.needle))
            .ok_or_else(|| PlannerError::Invocation("no scripted response for prompt".to_string()))?;

        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };

        match response {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(PlannerError::Invocation(msg)),
            None => Err(PlannerError::Invocation("scripted rule has no responses".to_string())),
        }
    }
}
