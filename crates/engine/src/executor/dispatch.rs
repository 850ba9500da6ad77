//! Single-step dispatch.
//!
//! Decides what happens to a step once its inputs are resolved: skipped in a
//! dry run, handed to an executor in a live run, or left `pending` when no
//! executor is wired for it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::model::StepDefinition;

use super::{ExecutorRegistry, StepOutcome, StepRequest, StepStatus};

/// Reason recorded in the output of steps skipped by a dry run.
pub const DRY_RUN_REASON: &str = "dry_run";
/// Reason recorded in the output of steps skipped after a halting fault.
pub const HALTED_REASON: &str = "halted";
/// Error recorded for live steps that have no executor.
pub const NO_EXECUTOR_MESSAGE: &str = "No executor provided; implement tool/agent execution to run live.";

/// Whether steps are executed or only validated and traced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Validate, schedule and resolve, but never dispatch.
    #[default]
    DryRun,
    Live,
}

/// Output stored for a step that was skipped for `reason`.
pub fn skipped_output(reason: &str) -> Value {
    json!({"skipped": true, "reason": reason})
}

/// Dispatch a resolved step according to `mode`.
///
/// Never fails: executor errors become a `failed` outcome carrying the error
/// chain, and an unwired step becomes `pending`.
pub fn dispatch_step(
    workflow_id: &str,
    step: &StepDefinition,
    inputs: &Map<String, Value>,
    mode: RunMode,
    executors: &ExecutorRegistry,
) -> StepOutcome {
    if mode == RunMode::DryRun {
        return StepOutcome {
            status: StepStatus::Skipped,
            output: skipped_output(DRY_RUN_REASON),
            error: None,
        };
    }

    let Some(executor) = executors.lookup(step) else {
        debug!(step = %step.id, "no executor wired; step left pending");
        return StepOutcome {
            status: StepStatus::Pending,
            output: Value::Object(Map::new()),
            error: Some(NO_EXECUTOR_MESSAGE.to_string()),
        };
    };

    let request = StepRequest {
        workflow_id,
        step_id: &step.id,
        action: step.run.as_deref(),
        inputs,
    };
    match executor.execute(&request) {
        Ok(outcome) => {
            debug!(step = %step.id, status = %outcome.status, "executor returned");
            outcome
        }
        Err(error) => {
            warn!(step = %step.id, error = %format!("{error:#}"), "executor failed");
            StepOutcome::failed(format!("{error:#}"))
        }
    }
}
