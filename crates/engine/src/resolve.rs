//! # Execution Context and Binding Resolution
//!
//! Each step declares its inputs as a map of bindings under `with`. A binding
//! is either a literal JSON value, copied as-is, or a path expression starting
//! with `$.` that is evaluated against the run's [`ExecutionContext`].
//!
//! ## Context Layout
//!
//! The context is a single JSON object. It starts as a copy of the run
//! payload's top-level members and gains one member per completed step, keyed
//! by step identifier:
//!
//! ```text
//! {
//!   "query": "person at whiteboard",        <- payload
//!   "namespace": "videos",                  <- payload
//!   "search": {"hits": [...]}               <- output of step `search`
//! }
//! ```
//!
//! ## Degrade, Don't Fail
//!
//! Resolution never aborts a step. A path that matches nothing, or that does
//! not parse, binds `null` and leaves a note explaining why; the executor (or
//! whoever reads the trace) decides whether that matters.
//!
//! ```rust
//! use conduit_engine::resolve::{ExecutionContext, resolve_bindings};
//! use serde_json::json;
//!
//! let context = ExecutionContext::seed(&json!({"query": "kittens"}));
//! let bindings = json!({"q": "$.query", "limit": 5, "caption": "$.video.title"});
//!
//! let resolved = resolve_bindings(bindings.as_object().unwrap(), &context);
//! assert_eq!(resolved.values["q"], "kittens");
//! assert_eq!(resolved.values["limit"], 5);
//! assert!(resolved.values["caption"].is_null());
//! assert_eq!(resolved.notes, vec!["caption: jsonpath '$.video.title' returned no results"]);
//! ```

use serde_json::{Map, Value};
use tracing::warn;

use crate::path_query::{QueryOutcome, evaluate};

/// Prefix that marks a binding string as a path expression.
pub const PATH_EXPRESSION_PREFIX: &str = "$.";

/// The data visible to a step while its bindings are resolved.
///
/// Steps only ever see a shared reference. The driver extends the context
/// between steps by applying a [`ContextDelta`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    document: Value,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            document: Value::Object(Map::new()),
        }
    }
}

/// The contribution of one completed step to the execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextDelta {
    pub step_id: String,
    pub output: Value,
}

impl ContextDelta {
    pub fn new(step_id: impl Into<String>, output: Value) -> Self {
        Self {
            step_id: step_id.into(),
            output,
        }
    }
}

impl ExecutionContext {
    /// Seeds a context with the top-level members of `payload`.
    ///
    /// A payload that is not an object contributes nothing addressable by
    /// name, so the context starts empty.
    pub fn seed(payload: &Value) -> Self {
        match payload {
            Value::Object(members) => Self {
                document: Value::Object(members.clone()),
            },
            other => {
                if !other.is_null() {
                    warn!(payload_type = json_type_name(other), "payload is not an object; context starts empty");
                }
                Self::default()
            }
        }
    }

    /// The whole context as a JSON object, the document path expressions run against.
    pub fn as_value(&self) -> &Value {
        &self.document
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.document.as_object().map_or(0, Map::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a step's output under its identifier.
    ///
    /// Returns the value previously stored under that key, which can only be a
    /// payload member sharing the step's name.
    pub fn apply(&mut self, delta: ContextDelta) -> Option<Value> {
        let previous = match &mut self.document {
            Value::Object(members) => members.insert(delta.step_id.clone(), delta.output),
            _ => None,
        };
        if previous.is_some() {
            warn!(step = %delta.step_id, "step output replaces an existing context member");
        }
        previous
    }
}

/// How a single binding spec is interpreted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Binding<'a> {
    Literal(&'a Value),
    Path(&'a str),
}

impl<'a> Binding<'a> {
    pub fn classify(spec: &'a Value) -> Self {
        match spec {
            Value::String(text) if text.starts_with(PATH_EXPRESSION_PREFIX) => Binding::Path(text.as_str()),
            other => Binding::Literal(other),
        }
    }
}

/// Concrete inputs for one step plus any notes produced while resolving them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    /// Binding name to resolved value, in binding declaration order.
    pub values: Map<String, Value>,
    pub notes: Vec<String>,
}

/// Resolves every binding against `context`.
///
/// - literal: copied verbatim
/// - path, one match: that value
/// - path, several matches: an array of them in document order
/// - path, no match or malformed: `null` plus a note
///
/// Resolution reads the context and never changes it, so repeated calls with
/// the same inputs give identical results.
pub fn resolve_bindings(bindings: &Map<String, Value>, context: &ExecutionContext) -> ResolvedInputs {
    let mut resolved = ResolvedInputs::default();
    for (name, spec) in bindings {
        let value = match Binding::classify(spec) {
            Binding::Literal(literal) => literal.clone(),
            Binding::Path(expression) => match evaluate(expression, context.as_value()) {
                QueryOutcome::One(matched) => matched.clone(),
                QueryOutcome::Many(matches) => Value::Array(matches.into_iter().cloned().collect()),
                QueryOutcome::Empty => {
                    resolved
                        .notes
                        .push(format!("{name}: jsonpath '{expression}' returned no results"));
                    Value::Null
                }
                QueryOutcome::Invalid(error) => {
                    resolved.notes.push(format!("{name}: failed to resolve '{expression}' ({error})"));
                    Value::Null
                }
            },
        };
        resolved.values.insert(name.clone(), value);
    }
    resolved
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bindings(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("bindings object")
    }

    fn context_after_fetch() -> ExecutionContext {
        let mut context = ExecutionContext::seed(&json!({
            "dst_path": "videos/sample.mp4",
            "segmentation": {"strategy": "shot_detect", "interval_sec": 2.0}
        }));
        context.apply(ContextDelta::new(
            "segment",
            json!({"segments": [{"id": "s1", "start": 0}, {"id": "s2", "start": 2}]}),
        ));
        context
    }

    #[test]
    fn literals_are_copied_verbatim() {
        let context = ExecutionContext::default();
        let spec = bindings(json!({
            "limit": 3,
            "flags": {"verbose": true},
            "price": "$5.00",
            "label": "plain text"
        }));

        let resolved = resolve_bindings(&spec, &context);
        assert_eq!(Value::Object(resolved.values), Value::Object(spec));
        assert!(resolved.notes.is_empty());
    }

    #[test]
    fn single_match_binds_the_value() {
        let resolved = resolve_bindings(
            &bindings(json!({"path": "$.dst_path", "strategy": "$.segmentation.strategy"})),
            &context_after_fetch(),
        );
        assert_eq!(resolved.values["path"], json!("videos/sample.mp4"));
        assert_eq!(resolved.values["strategy"], json!("shot_detect"));
        assert!(resolved.notes.is_empty());
    }

    #[test]
    fn multiple_matches_bind_an_ordered_array() {
        let resolved = resolve_bindings(&bindings(json!({"ids": "$.segment.segments[*].id"})), &context_after_fetch());
        assert_eq!(resolved.values["ids"], json!(["s1", "s2"]));
    }

    #[test]
    fn missing_path_binds_null_with_one_note() {
        let resolved = resolve_bindings(&bindings(json!({"caption": "$.video.title"})), &context_after_fetch());

        assert_eq!(Value::Object(resolved.values), json!({"caption": null}));
        assert_eq!(resolved.notes, vec!["caption: jsonpath '$.video.title' returned no results".to_string()]);
    }

    #[test]
    fn malformed_path_binds_null_with_fault_note() {
        let resolved = resolve_bindings(&bindings(json!({"broken": "$.segment[", "ok": 1})), &context_after_fetch());

        assert!(resolved.values["broken"].is_null());
        assert_eq!(resolved.values["ok"], json!(1));
        assert_eq!(resolved.notes.len(), 1);
        assert!(
            resolved.notes[0].starts_with("broken: failed to resolve '$.segment[' ("),
            "unexpected note: {}",
            resolved.notes[0]
        );
    }

    #[test]
    fn huge_slice_step_binds_the_first_element() {
        let resolved = resolve_bindings(
            &bindings(json!({"first": "$.segment.segments[1::9223372036854775807]"})),
            &context_after_fetch(),
        );
        assert_eq!(resolved.values["first"], json!({"id": "s2", "start": 2}));
        assert!(resolved.notes.is_empty());
    }

    #[test]
    fn resolution_is_repeatable_and_leaves_context_untouched() {
        let context = context_after_fetch();
        let before = context.clone();
        let spec = bindings(json!({"ids": "$..id", "missing": "$.nope", "literal": [1, 2]}));

        let first = resolve_bindings(&spec, &context);
        let second = resolve_bindings(&spec, &context);

        assert_eq!(first, second);
        assert_eq!(context, before);
    }

    #[test]
    fn resolved_values_keep_binding_order() {
        let resolved = resolve_bindings(&bindings(json!({"z": 1, "a": "$.dst_path", "m": null})), &context_after_fetch());
        let keys: Vec<&str> = resolved.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn context_seed_ignores_non_object_payloads() {
        assert!(ExecutionContext::seed(&json!([1, 2, 3])).is_empty());
        assert!(ExecutionContext::seed(&Value::Null).is_empty());
        assert_eq!(ExecutionContext::seed(&json!({"a": 1})).len(), 1);
    }

    #[test]
    fn apply_reports_replaced_payload_member() {
        let mut context = ExecutionContext::seed(&json!({"index": "payload"}));
        let previous = context.apply(ContextDelta::new("index", json!({})));

        assert_eq!(previous, Some(json!("payload")));
        assert_eq!(context.get("index"), Some(&json!({})));
        assert!(context.apply(ContextDelta::new("fresh", json!(1))).is_none());
        assert!(context.contains("fresh"));
    }

    #[test]
    fn classify_only_treats_prefixed_strings_as_paths() {
        assert_eq!(Binding::classify(&json!("$.a")), Binding::Path("$.a"));
        assert!(matches!(Binding::classify(&json!("$a")), Binding::Literal(_)));
        assert!(matches!(Binding::classify(&json!(["$.a"])), Binding::Literal(_)));
    }
}
