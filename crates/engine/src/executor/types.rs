//! Core executor data types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome status of a step, or of the validation phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Executor ran the step and reported success.
    Succeeded,
    /// Validation rejected the payload, or the executor reported or raised a failure.
    Failed,
    /// Step was not executed (dry run, or halted after an earlier fault).
    Skipped,
    /// No executor is wired for the step.
    Pending,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything an executor is given to run one step.
#[derive(Debug, Clone, Copy)]
pub struct StepRequest<'a> {
    pub workflow_id: &'a str,
    pub step_id: &'a str,
    /// The step's `run` action, when declared.
    pub action: Option<&'a str>,
    /// Resolved input bindings.
    pub inputs: &'a Map<String, Value>,
}

/// What an executor reports back for a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    /// Arbitrary JSON stored in the context under the step identifier.
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn succeeded(output: Value) -> Self {
        Self {
            status: StepStatus::Succeeded,
            output,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            output: Value::Object(Map::new()),
            error: Some(error.into()),
        }
    }
}
