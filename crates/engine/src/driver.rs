//! # Pipeline Driver
//!
//! Composes validation, scheduling, binding resolution, dispatch and tracing
//! into a single run:
//!
//! 1. look up the workflow and validate the payload against its contract
//! 2. order the steps by their dependencies
//! 3. for each step, resolve its bindings against the context so far,
//!    dispatch it, record the outcome and merge its output into the context
//! 4. flush the trace and report the result
//!
//! A rejected payload, or a contract that cannot be compiled, still produces a
//! trace with a single `validation` event.
//! A malformed dependency graph is a configuration defect and surfaces as a
//! [`RunError`] without any trace being written.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::{
    error::RunError,
    executor::{ExecutorRegistry, HALTED_REASON, RunMode, StepOutcome, StepStatus, dispatch_step, order_steps_for_execution, skipped_output},
    model::{StepDefinition, WorkflowCatalog, WorkflowDefinition},
    resolve::{ContextDelta, ExecutionContext, ResolvedInputs, resolve_bindings},
    trace::{TraceEntry, TraceRecorder},
    validate::validation_messages,
};

/// Step identifier used for the event that records a rejected payload.
pub const VALIDATION_STEP_ID: &str = "validation";

/// Default directory trace documents are written to.
pub const DEFAULT_TRACE_DIR: &str = "traces";

/// What happens to the remaining steps after a step ends `failed` or `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// Record the fault and keep dispatching.
    #[default]
    Continue,
    /// Stop dispatching; remaining steps are recorded as `skipped`.
    HaltOnFault,
}

/// Driver settings shared by every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub trace_dir: PathBuf,
    #[serde(default)]
    pub dispatch_policy: DispatchPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            trace_dir: PathBuf::from(DEFAULT_TRACE_DIR),
            dispatch_policy: DispatchPolicy::default(),
        }
    }
}

/// Terminal outcome of a run.
///
/// Serializes as `{"status": "ok", ...}` or `{"status": "failed", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunResult {
    /// Every scheduled step was recorded. Individual steps may still be
    /// `pending` or `failed`; the trace says which.
    Ok { run_id: String, trace_path: PathBuf },
    /// The payload violated the workflow's input contract.
    Failed {
        run_id: String,
        trace_path: PathBuf,
        errors: Vec<String>,
    },
}

impl RunResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, RunResult::Ok { .. })
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunResult::Ok { run_id, .. } | RunResult::Failed { run_id, .. } => run_id,
        }
    }

    pub fn trace_path(&self) -> &PathBuf {
        match self {
            RunResult::Ok { trace_path, .. } | RunResult::Failed { trace_path, .. } => trace_path,
        }
    }

    /// Validation messages; empty for a successful run.
    pub fn errors(&self) -> &[String] {
        match self {
            RunResult::Ok { .. } => &[],
            RunResult::Failed { errors, .. } => errors,
        }
    }
}

/// Runs workflows from a catalog.
///
/// The driver borrows the catalog; every run gets its own context and trace
/// recorder, so one driver can serve any number of sequential runs.
#[derive(Debug)]
pub struct PipelineDriver<'a> {
    catalog: &'a WorkflowCatalog,
    executors: ExecutorRegistry,
    config: DriverConfig,
}

impl<'a> PipelineDriver<'a> {
    /// Creates a driver with no executors wired and the default configuration.
    pub fn new(catalog: &'a WorkflowCatalog) -> Self {
        Self {
            catalog,
            executors: ExecutorRegistry::default(),
            config: DriverConfig::default(),
        }
    }

    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        self.catalog
    }

    /// Runs `workflow_id` against `payload`.
    ///
    /// # Errors
    ///
    /// Returns an error when the workflow is unknown, its input contract cannot
    /// be compiled, its steps do not form a valid dependency graph, or the
    /// trace cannot be written. Payload violations are not errors; they are
    /// reported through [`RunResult::Failed`].
    pub fn run(&self, workflow_id: &str, payload: &Value, mode: RunMode) -> Result<RunResult, RunError> {
        let workflow = self
            .catalog
            .get(workflow_id)
            .ok_or_else(|| RunError::UnknownWorkflow(workflow_id.to_string()))?;
        let mut recorder = TraceRecorder::new(&workflow.id, &self.config.trace_dir);
        info!(
            workflow = %workflow.id,
            workflow_name = %workflow.display_name(),
            run_id = %recorder.run_id(),
            mode = ?mode,
            step_count = workflow.steps.len(),
            "pipeline run started"
        );

        let started_at = Utc::now();
        let violations = match validation_messages(payload, &workflow.inputs) {
            Ok(violations) => violations,
            Err(source) => {
                warn!(workflow = %workflow.id, run_id = %recorder.run_id(), error = %source, "input contract cannot be compiled");
                recorder.record_aborted(validation_failure(started_at, payload, source.to_string()));
                let trace_path = recorder.flush()?;
                return Err(RunError::InvalidContract {
                    workflow: workflow.id.clone(),
                    trace_path,
                    source,
                });
            }
        };
        if !violations.is_empty() {
            warn!(
                workflow = %workflow.id,
                run_id = %recorder.run_id(),
                violations = violations.len(),
                "payload rejected by input contract"
            );
            recorder.record_aborted(validation_failure(started_at, payload, violations.join("; ")));
            let trace_path = recorder.flush()?;
            return Ok(RunResult::Failed {
                run_id: recorder.run_id().to_string(),
                trace_path,
                errors: violations,
            });
        }

        let ordered_steps = order_steps_for_execution(&workflow.steps).map_err(|source| RunError::Schedule {
            workflow: workflow.id.clone(),
            source,
        })?;

        let mut context = ExecutionContext::seed(payload);
        let mut halted_by: Option<(&str, StepStatus)> = None;
        let mut summary = StatusSummary::default();

        for step in ordered_steps {
            let started_at = Utc::now();
            let (inputs, outcome, notes) = match halted_by {
                Some((faulting_step, status)) => halted_step(faulting_step, status),
                None => self.run_step(workflow, step, &context, mode),
            };

            if halted_by.is_none()
                && self.config.dispatch_policy == DispatchPolicy::HaltOnFault
                && matches!(outcome.status, StepStatus::Failed | StepStatus::Pending)
            {
                warn!(workflow = %workflow.id, step = %step.id, status = %outcome.status, "halting dispatch after fault");
                halted_by = Some((step.id.as_str(), outcome.status));
            }

            summary.count(outcome.status);
            recorder.record(TraceEntry {
                step_id: step.id.clone(),
                status: outcome.status,
                started_at,
                inputs: Value::Object(inputs),
                outputs: outcome.output.clone(),
                error: outcome.error,
                notes,
            });
            context.apply(ContextDelta::new(step.id.clone(), outcome.output));
        }

        let trace_path = recorder.flush()?;
        info!(
            workflow = %workflow.id,
            run_id = %recorder.run_id(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            pending = summary.pending,
            trace = %trace_path.display(),
            "pipeline run finished"
        );
        Ok(RunResult::Ok {
            run_id: recorder.run_id().to_string(),
            trace_path,
        })
    }

    fn run_step(
        &self,
        workflow: &WorkflowDefinition,
        step: &StepDefinition,
        context: &ExecutionContext,
        mode: RunMode,
    ) -> (Map<String, Value>, StepOutcome, Vec<String>) {
        let ResolvedInputs { values, notes } = resolve_bindings(&step.with, context);
        for note in &notes {
            warn!(workflow = %workflow.id, step = %step.id, note = %note, "binding unresolved");
        }
        debug!(workflow = %workflow.id, step = %step.id, bindings = values.len(), "step inputs resolved");

        let outcome = dispatch_step(&workflow.id, step, &values, mode, &self.executors);
        debug!(workflow = %workflow.id, step = %step.id, status = %outcome.status, "step dispatched");
        (values, outcome, notes)
    }
}

/// The single event of a run that stopped at validation. It never completes,
/// so the recorder stores it without an end time.
fn validation_failure(started_at: DateTime<Utc>, payload: &Value, error: String) -> TraceEntry {
    TraceEntry {
        step_id: VALIDATION_STEP_ID.to_string(),
        status: StepStatus::Failed,
        started_at,
        inputs: payload.clone(),
        outputs: Value::Object(Map::new()),
        error: Some(error),
        notes: Vec::new(),
    }
}

fn halted_step(faulting_step: &str, status: StepStatus) -> (Map<String, Value>, StepOutcome, Vec<String>) {
    let outcome = StepOutcome {
        status: StepStatus::Skipped,
        output: skipped_output(HALTED_REASON),
        error: None,
    };
    let note = format!("not dispatched: step '{faulting_step}' ended {status}");
    (Map::new(), outcome, vec![note])
}

#[derive(Debug, Default)]
struct StatusSummary {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    pending: usize,
}

impl StatusSummary {
    fn count(&mut self, status: StepStatus) {
        match status {
            StepStatus::Succeeded => self.succeeded += 1,
            StepStatus::Failed => self.failed += 1,
            StepStatus::Skipped => self.skipped += 1,
            StepStatus::Pending => self.pending += 1,
        }
    }
}
