use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::Result;
use serde_json::{Value, json};
use tracing::debug;

use crate::model::StepDefinition;

use super::{StepOutcome, StepRequest};

/// Execute a single step.
///
/// Implementations call tools, models, HTTP services or anything else that
/// produces a JSON output for a step. Returning `Err` marks the step `failed`
/// with the error chain as its message; it never aborts the run.
pub trait StepExecutor: Send + Sync {
    fn execute(&self, request: &StepRequest<'_>) -> Result<StepOutcome>;
}

impl<F> StepExecutor for F
where
    F: Fn(&StepRequest<'_>) -> Result<StepOutcome> + Send + Sync,
{
    fn execute(&self, request: &StepRequest<'_>) -> Result<StepOutcome> {
        self(request)
    }
}

/// A runner that reports success and echoes its request back as output.
/// This allows tests and previews without external side effects.
pub struct EchoExecutor;

impl StepExecutor for EchoExecutor {
    fn execute(&self, request: &StepRequest<'_>) -> Result<StepOutcome> {
        Ok(StepOutcome::succeeded(json!({
            "step": request.step_id,
            "action": request.action.map_or(Value::Null, |action| Value::String(action.to_string())),
            "inputs": request.inputs,
        })))
    }
}

/// Executors available to a driver.
///
/// Lookup prefers an executor registered for the step identifier, then one
/// registered for the step's `run` action, then the fallback. An empty
/// registry means no executor is wired at all.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    by_step: HashMap<String, Arc<dyn StepExecutor>>,
    by_action: HashMap<String, Arc<dyn StepExecutor>>,
    fallback: Option<Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_step(&mut self, step_id: impl Into<String>, executor: Arc<dyn StepExecutor>) -> &mut Self {
        self.by_step.insert(step_id.into(), executor);
        self
    }

    pub fn register_action(&mut self, action: impl Into<String>, executor: Arc<dyn StepExecutor>) -> &mut Self {
        self.by_action.insert(action.into(), executor);
        self
    }

    pub fn set_fallback(&mut self, executor: Arc<dyn StepExecutor>) -> &mut Self {
        self.fallback = Some(executor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.by_step.is_empty() && self.by_action.is_empty() && self.fallback.is_none()
    }

    /// Finds the executor responsible for `step`, if any.
    pub fn lookup(&self, step: &StepDefinition) -> Option<&dyn StepExecutor> {
        if let Some(executor) = self.by_step.get(&step.id) {
            debug!(step = %step.id, "executor matched by step id");
            return Some(executor.as_ref());
        }
        if let Some(action) = step.run.as_deref()
            && let Some(executor) = self.by_action.get(action)
        {
            debug!(step = %step.id, action = %action, "executor matched by action");
            return Some(executor.as_ref());
        }
        self.fallback.as_deref()
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps: Vec<&String> = self.by_step.keys().collect();
        steps.sort();
        let mut actions: Vec<&String> = self.by_action.keys().collect();
        actions.sort();
        f.debug_struct("ExecutorRegistry")
            .field("steps", &steps)
            .field("actions", &actions)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
