//! Error taxonomy for pipeline runs.
//!
//! Only malformed configuration and storage failures are errors. Payload
//! violations are returned as data inside [`RunResult`](crate::driver::RunResult),
//! and unresolved bindings or executor faults are recorded in the trace.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Failures while turning a workflow's steps into an execution order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Two steps share an identifier.
    #[error("duplicate step identifier detected: '{step}'")]
    DuplicateStep { step: String },
    /// A step depends on an identifier no step in the workflow declares.
    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UndefinedDependency { step: String, dependency: String },
    /// The dependency graph is not acyclic. `steps` lists every step that
    /// could not be ordered, sorted by identifier.
    #[error("cycle detected in workflow steps involving: {}", .steps.join(", "))]
    Cycle { steps: Vec<String> },
}

/// The declared input contract could not be compiled into a validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid input contract: {message}")]
pub struct ContractError {
    pub message: String,
}

/// Errors surfaced while writing or reading trace documents.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("trace serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("malformed trace record on line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl TraceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Fatal errors that prevent a run from producing a [`RunResult`](crate::driver::RunResult).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("workflow '{0}' not found in catalog")]
    UnknownWorkflow(String),
    /// The input contract cannot be compiled. A trace holding the failed
    /// `validation` event is still written to `trace_path`.
    #[error("workflow '{workflow}': {source}")]
    InvalidContract {
        workflow: String,
        trace_path: PathBuf,
        #[source]
        source: ContractError,
    },
    #[error("workflow '{workflow}': {source}")]
    Schedule {
        workflow: String,
        #[source]
        source: ScheduleError,
    },
    #[error(transparent)]
    Trace(#[from] TraceError),
}
