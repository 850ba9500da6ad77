//! Input contract validation.
//!
//! Payloads are checked against the workflow's declared JSON Schema (Draft 7)
//! before anything is scheduled. Every broken rule is reported, not just the
//! first, and the report is sorted by instance path so the same payload always
//! yields the same list.
//!
//! Every violation reads `<path>: <message>`. The path and the wording of a
//! missing `required` property (`'<name>' is a required property`) are stable.
//! Messages for every other keyword are the `jsonschema` crate's own text and
//! may change between releases of that crate; match on the path, not the text.

use std::{cmp::Ordering, fmt};

use jsonschema::{Draft, ValidationError, error::ValidationErrorKind};
use serde_json::Value;

use crate::error::ContractError;

/// One segment of the instance path a violation points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn parse(raw: &str) -> Self {
        match raw.parse::<usize>() {
            Ok(index) if !raw.starts_with('+') => Self::Index(index),
            _ => Self::Key(raw.to_string()),
        }
    }
}

impl Ord for PathSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Index(left), Self::Index(right)) => left.cmp(right),
            (Self::Key(left), Self::Key(right)) => left.cmp(right),
            (Self::Key(_), Self::Index(_)) => Ordering::Less,
            (Self::Index(_), Self::Key(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for PathSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A single broken contract rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Path to the offending field; empty for the payload root.
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl SchemaViolation {
    /// The path joined with `/`, or `<root>` when the violation is at the root.
    pub fn display_path(&self) -> String {
        if self.path.is_empty() {
            return "<root>".to_string();
        }
        self.path.iter().map(ToString::to_string).collect::<Vec<_>>().join("/")
    }

    fn from_error(error: &ValidationError<'_>) -> Self {
        let mut path = pointer_segments(&error.instance_path.to_string());
        let message = match &error.kind {
            ValidationErrorKind::Required { property } => {
                let name = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
                path.push(PathSegment::Key(name.clone()));
                format!("'{name}' is a required property")
            }
            _ => error.to_string(),
        };
        Self { path, message }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.display_path(), self.message)
    }
}

/// Validates `payload` against `contract`, returning every violation sorted by path.
///
/// An empty list means the payload satisfies the contract. A `null` contract
/// accepts everything. Fails only when the contract itself is not a usable
/// schema.
pub fn validate_payload(payload: &Value, contract: &Value) -> Result<Vec<SchemaViolation>, ContractError> {
    if contract.is_null() {
        return Ok(Vec::new());
    }

    let validator = jsonschema::options()
        .with_draft(Draft::Draft7)
        .build(contract)
        .map_err(|error| ContractError {
            message: error.to_string(),
        })?;

    let mut violations: Vec<SchemaViolation> = validator
        .iter_errors(payload)
        .map(|error| SchemaViolation::from_error(&error))
        .collect();
    violations.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(violations)
}

/// Convenience wrapper returning violations as `"<path>: <message>"` strings.
pub fn validation_messages(payload: &Value, contract: &Value) -> Result<Vec<String>, ContractError> {
    Ok(validate_payload(payload, contract)?
        .iter()
        .map(ToString::to_string)
        .collect())
}

/// Splits a JSON pointer (`/a/0/b~1c`) into unescaped segments.
fn pointer_segments(pointer: &str) -> Vec<PathSegment> {
    pointer
        .split('/')
        .skip(1)
        .map(|raw| PathSegment::parse(&raw.replace("~1", "/").replace("~0", "~")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{PathSegment, validate_payload, validation_messages};
    use serde_json::json;

    fn search_contract() -> serde_json::Value {
        json!({
            "type": "object",
            "required": ["query", "namespace"],
            "properties": {
                "query": {"type": "string"},
                "namespace": {"type": "string"},
                "top_k": {"type": "integer", "minimum": 1}
            }
        })
    }

    #[test]
    fn valid_payload_has_no_violations() {
        let payload = json!({"query": "person at whiteboard", "namespace": "videos", "top_k": 3});
        assert!(validate_payload(&payload, &search_contract()).expect("contract compiles").is_empty());
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let payload = json!({"namespace": "videos"});
        let messages = validation_messages(&payload, &search_contract()).expect("contract compiles");
        assert_eq!(messages, vec!["query: 'query' is a required property".to_string()]);
    }

    #[test]
    fn every_violation_is_reported_in_path_order() {
        let payload = json!({"top_k": 0, "query": 7});
        let violations = validate_payload(&payload, &search_contract()).expect("contract compiles");

        let paths: Vec<String> = violations.iter().map(|violation| violation.display_path()).collect();
        assert_eq!(paths, vec!["namespace", "query", "top_k"]);
    }

    #[test]
    fn other_keywords_keep_path_prefix_and_validator_text() {
        let payload = json!({"query": 7, "namespace": "videos"});
        let violations = validate_payload(&payload, &search_contract()).expect("contract compiles");

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].display_path(), "query");
        assert!(violations[0].message.contains("string"), "message: {}", violations[0].message);
        assert!(!violations[0].message.contains("required property"));
        assert_eq!(violations[0].to_string(), format!("query: {}", violations[0].message));
    }

    #[test]
    fn root_level_violation_uses_root_marker() {
        let payload = json!(["not", "an", "object"]);
        let messages = validation_messages(&payload, &search_contract()).expect("contract compiles");

        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("<root>: "), "unexpected message: {}", messages[0]);
    }

    #[test]
    fn nested_array_paths_sort_numerically() {
        let contract = json!({
            "type": "object",
            "properties": {"items": {"type": "array", "items": {"type": "string"}}}
        });
        let mut items = vec![json!("ok"); 11];
        items[2] = json!(2);
        items[10] = json!(10);
        let payload = json!({ "items": items });

        let violations = validate_payload(&payload, &contract).expect("contract compiles");
        let paths: Vec<String> = violations.iter().map(|violation| violation.display_path()).collect();
        assert_eq!(paths, vec!["items/2", "items/10"]);
        assert_eq!(violations[0].path, vec![PathSegment::Key("items".into()), PathSegment::Index(2)]);
    }

    #[test]
    fn empty_and_null_contracts_accept_anything() {
        let payload = json!({"anything": [1, 2, 3]});
        assert!(validate_payload(&payload, &json!({})).expect("empty contract").is_empty());
        assert!(validate_payload(&payload, &serde_json::Value::Null).expect("null contract").is_empty());
    }

    #[test]
    fn unusable_contract_is_an_error() {
        let contract = json!({"type": 12});
        let error = validate_payload(&json!({}), &contract).expect_err("contract should not compile");
        assert!(error.to_string().starts_with("invalid input contract"), "unexpected error: {error}");
    }
}
