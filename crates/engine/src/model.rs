//! # Workflow Model Definitions
//!
//! This module contains the data structures that describe a pipeline: the
//! catalog of workflows, each workflow's input contract, and the steps it is
//! made of. These structures are deserialized from YAML or JSON documents and
//! are treated as immutable once loaded; the driver only borrows them for the
//! duration of a run.
//!
//! ## Core Concepts
//!
//! - **WorkflowCatalog**: Every workflow known to a driver, keyed by identifier
//! - **WorkflowDefinition**: Input contract plus an ordered list of steps
//! - **StepDefinition**: One unit of work with dependencies and input bindings
//!
//! ## Usage
//!
//! ```rust
//! use conduit_engine::model::{StepDefinition, WorkflowCatalog, WorkflowDefinition};
//! use serde_json::json;
//!
//! let definition = WorkflowDefinition {
//!     id: "ingest".to_string(),
//!     inputs: json!({"type": "object", "required": ["url"]}),
//!     steps: vec![
//!         StepDefinition::new("fetch").with_binding("url", json!("$.url")),
//!         StepDefinition::new("index").depends_on(["fetch"]),
//!     ],
//!     ..Default::default()
//! };
//!
//! let catalog = WorkflowCatalog::from_definitions([definition]);
//! assert!(catalog.get("ingest").is_some());
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A collection of workflow definitions keyed by workflow identifier.
///
/// Declaration order is preserved so listings and error messages are stable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowCatalog {
    /// Mapping of workflow identifiers to their definitions
    pub workflows: IndexMap<String, WorkflowDefinition>,
}

impl WorkflowCatalog {
    /// Builds a catalog from definitions, keyed by each definition's `id`.
    ///
    /// Later definitions replace earlier ones that share an identifier.
    pub fn from_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let workflows = definitions
            .into_iter()
            .map(|definition| (definition.id.clone(), definition))
            .collect();
        Self { workflows }
    }

    /// Looks up a workflow by identifier.
    pub fn get(&self, workflow_id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.get(workflow_id)
    }

    /// Iterates workflow identifiers in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

/// Complete definition of a single workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    /// Unique workflow identifier.
    ///
    /// Documents keyed by identifier may omit this field; the loader fills it
    /// in from the key.
    #[serde(default)]
    pub id: String,

    /// Optional human-friendly display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema (Draft 7) the run payload must satisfy.
    ///
    /// An empty object accepts every payload.
    #[serde(default = "empty_contract")]
    pub inputs: Value,

    /// Payload used when a run is invoked without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_payload: Option<Value>,

    /// Steps in declaration order.
    ///
    /// Declaration order is the execution order whenever dependencies do not
    /// force a different one.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: None,
            description: None,
            inputs: empty_contract(),
            sample_payload: None,
            steps: Vec::new(),
        }
    }
}

impl WorkflowDefinition {
    /// Finds a step by identifier.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// Returns the display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Definition of one step within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StepDefinition {
    /// Identifier, unique within the workflow.
    ///
    /// Later steps reach this step's output through the execution context
    /// under this key, e.g. `$.fetch.body`.
    pub id: String,

    /// Action name used to pick an executor when none is registered for the
    /// step identifier itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Steps that must complete before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Input bindings: literal values, or `$.`-prefixed path expressions
    /// evaluated against the execution context.
    #[serde(default)]
    pub with: Map<String, Value>,
}

impl StepDefinition {
    /// Creates a step with no dependencies and no bindings.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_run(mut self, run: impl Into<String>) -> Self {
        self.run = Some(run.into());
        self
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_binding(mut self, name: impl Into<String>, spec: Value) -> Self {
        self.with.insert(name.into(), spec);
        self
    }
}

fn empty_contract() -> Value {
    Value::Object(Map::new())
}
