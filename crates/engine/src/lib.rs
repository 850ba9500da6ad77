//! # Conduit Engine
//!
//! The Conduit Engine runs declarative data pipelines: a workflow is an input
//! contract plus a set of steps with dependencies and input bindings. A run
//! validates the payload, orders the steps, resolves each step's bindings
//! against the payload and earlier outputs, dispatches the step, and writes a
//! line-delimited JSON trace of everything that happened.
//!
//! ## Usage
//!
//! ```rust
//! use conduit_engine::{DriverConfig, PipelineDriver, RunMode, parse_workflow_document};
//! use serde_json::json;
//!
//! let catalog = parse_workflow_document(r#"
//! workflows:
//!   search:
//!     inputs:
//!       type: object
//!       required: [query]
//!     steps:
//!       - id: lookup
//!         with:
//!           q: "$.query"
//! "#)?;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let driver = PipelineDriver::new(&catalog).with_config(DriverConfig {
//!     trace_dir: temp_dir.path().to_path_buf(),
//!     ..DriverConfig::default()
//! });
//! let result = driver.run("search", &json!({"query": "kittens"}), RunMode::DryRun)?;
//! assert!(result.is_ok());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`model`**: workflow and step definitions
//! - **`validate`**: payload validation against JSON Schema input contracts
//! - **`executor`**: step ordering, the executor capability and dispatch
//! - **`path_query`** / **`resolve`**: path expressions and binding resolution
//! - **`trace`**: trace events, the recorder and the trace reader
//! - **`driver`**: the run loop tying everything together

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde_yaml::Value as YamlValue;

pub mod driver;
pub mod error;
pub mod executor;
pub mod model;
pub mod path_query;
pub mod resolve;
pub mod trace;
pub mod validate;

pub use driver::{DispatchPolicy, DriverConfig, PipelineDriver, RunResult};
pub use error::{ContractError, RunError, ScheduleError, TraceError};
pub use executor::{EchoExecutor, ExecutorRegistry, RunMode, StepExecutor, StepOutcome, StepRequest, StepStatus};
pub use model::{StepDefinition, WorkflowCatalog, WorkflowDefinition};
pub use resolve::{ContextDelta, ExecutionContext, ResolvedInputs, resolve_bindings};
pub use trace::{RunId, TraceEvent, TraceRecorder, read_trace_file};
pub use validate::{SchemaViolation, validate_payload, validation_messages};

/// Loads a workflow definition document from the filesystem.
///
/// YAML and JSON are both accepted; see [`parse_workflow_document`] for the
/// supported shapes.
pub fn load_workflow_file(file_path: impl AsRef<Path>) -> Result<WorkflowCatalog> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("failed to read workflow file: {}", file_path.display()))?;
    parse_workflow_document(&content).with_context(|| format!("failed to load workflows from {}", file_path.display()))
}

/// Parses a workflow definition document.
///
/// Three shapes are accepted:
///
/// - a `workflows` mapping keyed by workflow identifier (`id` may be omitted)
/// - a `pipelines` list of definitions, each with an `id`
/// - a single definition with an `id`
///
/// # Errors
///
/// Fails when the document is not valid YAML/JSON, when a definition does not
/// match the expected structure, or when workflow identifiers are missing,
/// duplicated or disagree with their mapping key.
pub fn parse_workflow_document(content: &str) -> Result<WorkflowCatalog> {
    let document: YamlValue = serde_yaml::from_str(content).context("workflow document is not valid YAML or JSON")?;

    if let Some(workflows) = document.get("workflows") {
        let keyed: IndexMap<String, model::WorkflowDefinition> =
            serde_yaml::from_value(workflows.clone()).context("invalid 'workflows' mapping")?;
        let mut definitions = Vec::with_capacity(keyed.len());
        for (key, mut definition) in keyed {
            if definition.id.is_empty() {
                definition.id = key;
            } else if definition.id != key {
                bail!("workflow '{key}' declares a different id '{}'", definition.id);
            }
            definitions.push(definition);
        }
        return Ok(WorkflowCatalog::from_definitions(definitions));
    }

    if let Some(pipelines) = document.get("pipelines") {
        let listed: Vec<model::WorkflowDefinition> =
            serde_yaml::from_value(pipelines.clone()).context("invalid 'pipelines' list")?;
        let mut catalog = WorkflowCatalog::default();
        for (position, definition) in listed.into_iter().enumerate() {
            if definition.id.is_empty() {
                bail!("pipeline at position {position} is missing an 'id'");
            }
            if catalog.workflows.contains_key(&definition.id) {
                bail!("duplicate workflow identifier '{}'", definition.id);
            }
            catalog.workflows.insert(definition.id.clone(), definition);
        }
        return Ok(catalog);
    }

    let definition: model::WorkflowDefinition = serde_yaml::from_value(document).context(
        "unsupported workflow document format; expected a 'workflows' mapping, a 'pipelines' list, or a single definition with an 'id'",
    )?;
    if definition.id.is_empty() {
        bail!("single workflow definition is missing an 'id'");
    }
    Ok(WorkflowCatalog::from_definitions([definition]))
}
