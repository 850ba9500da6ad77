//! Typed path expressions over JSON documents.
//!
//! A [`PathQuery`] is parsed once from a root-anchored expression such as
//! `$.video.segments[*].caption` and can then be evaluated against any
//! document. Evaluation never fails: a query either selects zero or more
//! nodes, in document order, or was rejected at parse time.
//!
//! ## Syntax
//!
//! | Form                    | Selects                                           |
//! |-------------------------|---------------------------------------------------|
//! | `$`                     | the document root                                 |
//! | `.name` / `['name']`    | member `name` of an object                        |
//! | `.*` / `[*]`            | every member value or array element               |
//! | `..name` / `..*`        | the same selector applied at every depth          |
//! | `[2]` / `[-1]`          | an array element, negative counts from the end    |
//! | `[1:3]` / `[::2]`       | an array slice with optional step                 |
//! | `[0,2]` / `['a','b']`   | a union of index or name selectors                |

use std::{fmt, str::FromStr};

use serde_json::Value;
use thiserror::Error;

/// Rejection of a malformed path expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at offset {offset}")]
pub struct PathQueryError {
    /// Byte offset into the expression where parsing stopped.
    pub offset: usize,
    pub reason: String,
}

/// A parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Child(Selector),
    Descendant(Selector),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Name(String),
    Wildcard,
    Index(i64),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
    },
    Union(Vec<Selector>),
}

/// Result of evaluating an expression against a document.
///
/// Parse failures are reported here rather than through `Result` so callers
/// handle every outcome in one `match`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome<'v> {
    /// The expression is valid but selected nothing.
    Empty,
    One(&'v Value),
    /// Two or more matches, in document order.
    Many(Vec<&'v Value>),
    Invalid(PathQueryError),
}

/// Parses `expression` and evaluates it against `document`.
pub fn evaluate<'v>(expression: &str, document: &'v Value) -> QueryOutcome<'v> {
    match PathQuery::parse(expression) {
        Ok(query) => {
            let mut matches = query.select(document);
            match matches.len() {
                0 => QueryOutcome::Empty,
                1 => QueryOutcome::One(matches.remove(0)),
                _ => QueryOutcome::Many(matches),
            }
        }
        Err(error) => QueryOutcome::Invalid(error),
    }
}

impl PathQuery {
    pub fn parse(expression: &str) -> Result<Self, PathQueryError> {
        let segments = Parser::new(expression).parse()?;
        Ok(Self {
            source: expression.to_string(),
            segments,
        })
    }

    /// The expression text this query was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Selects every node the query matches, in document order.
    pub fn select<'v>(&self, document: &'v Value) -> Vec<&'v Value> {
        let mut current = vec![document];
        for segment in &self.segments {
            let mut next = Vec::new();
            for node in current {
                match segment {
                    Segment::Child(selector) => selector.apply(node, &mut next),
                    Segment::Descendant(selector) => {
                        let mut visited = Vec::new();
                        collect_descendants_or_self(node, &mut visited);
                        for descendant in visited {
                            selector.apply(descendant, &mut next);
                        }
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            current = next;
        }
        current
    }
}

impl FromStr for PathQuery {
    type Err = PathQueryError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        Self::parse(expression)
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Selector {
    fn apply<'v>(&self, node: &'v Value, out: &mut Vec<&'v Value>) {
        match self {
            Selector::Name(name) => {
                if let Value::Object(map) = node
                    && let Some(value) = map.get(name)
                {
                    out.push(value);
                }
            }
            Selector::Wildcard => match node {
                Value::Array(items) => out.extend(items.iter()),
                Value::Object(map) => out.extend(map.values()),
                _ => {}
            },
            Selector::Index(index) => {
                if let Value::Array(items) = node
                    && let Some(position) = normalize_index(*index, items.len())
                {
                    out.push(&items[position]);
                }
            }
            Selector::Slice { start, end, step } => {
                if let Value::Array(items) = node {
                    out.extend(slice_positions(items.len(), *start, *end, *step).into_iter().map(|position| &items[position]));
                }
            }
            Selector::Union(selectors) => {
                for selector in selectors {
                    selector.apply(node, out);
                }
            }
        }
    }
}

fn collect_descendants_or_self<'v>(node: &'v Value, out: &mut Vec<&'v Value>) {
    out.push(node);
    match node {
        Value::Array(items) => items.iter().for_each(|item| collect_descendants_or_self(item, out)),
        Value::Object(map) => map.values().for_each(|value| collect_descendants_or_self(value, out)),
        _ => {}
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let position = if index < 0 { len + index } else { index };
    if (0..len).contains(&position) {
        usize::try_from(position).ok()
    } else {
        None
    }
}

fn slice_positions(len: usize, start: Option<i64>, end: Option<i64>, step: Option<i64>) -> Vec<usize> {
    let Ok(len) = i64::try_from(len) else {
        return Vec::new();
    };
    let step = step.unwrap_or(1);
    if step == 0 || len == 0 {
        return Vec::new();
    }
    let normalize = |bound: i64| if bound < 0 { len + bound } else { bound };

    let mut positions = Vec::new();
    if step > 0 {
        let lower = normalize(start.unwrap_or(0)).clamp(0, len);
        let upper = normalize(end.unwrap_or(len)).clamp(0, len);
        let mut position = lower;
        while position < upper {
            positions.push(position);
            match position.checked_add(step) {
                Some(next) => position = next,
                None => break,
            }
        }
    } else {
        let upper = normalize(start.unwrap_or(len - 1)).clamp(-1, len - 1);
        let lower = match end {
            Some(bound) => normalize(bound).clamp(-1, len - 1),
            None => -1,
        };
        let mut position = upper;
        while lower < position {
            positions.push(position);
            match position.checked_add(step) {
                Some(next) => position = next,
                None => break,
            }
        }
    }
    positions
        .into_iter()
        .filter_map(|position| usize::try_from(position).ok())
        .collect()
}

struct Parser<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, position: 0 }
    }

    fn parse(mut self) -> Result<Vec<Segment>, PathQueryError> {
        if !self.eat(b'$') {
            return Err(self.error("expression must start with '$'"));
        }

        let mut segments = Vec::new();
        while let Some(byte) = self.peek() {
            match byte {
                b'.' if self.peek_at(1) == Some(b'.') => {
                    self.position += 2;
                    let selector = match self.peek() {
                        Some(b'[') => self.parse_bracket()?,
                        Some(b'*') => {
                            self.position += 1;
                            Selector::Wildcard
                        }
                        _ => Selector::Name(self.parse_name()?),
                    };
                    segments.push(Segment::Descendant(selector));
                }
                b'.' => {
                    self.position += 1;
                    let selector = if self.eat(b'*') {
                        Selector::Wildcard
                    } else {
                        Selector::Name(self.parse_name()?)
                    };
                    segments.push(Segment::Child(selector));
                }
                b'[' => segments.push(Segment::Child(self.parse_bracket()?)),
                other => return Err(self.error(format!("unexpected character '{}'", other as char))),
            }
        }
        Ok(segments)
    }

    fn parse_name(&mut self) -> Result<String, PathQueryError> {
        let start = self.position;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'.' | b'[' | b']' | b'\'' | b'"' | b',' | b'*') || byte.is_ascii_whitespace() {
                break;
            }
            self.position += 1;
        }
        if start == self.position {
            return Err(self.error("expected a member name"));
        }
        Ok(self.source[start..self.position].to_string())
    }

    fn parse_bracket(&mut self) -> Result<Selector, PathQueryError> {
        if !self.eat(b'[') {
            return Err(self.error("expected '['"));
        }
        let mut selectors = Vec::new();
        loop {
            self.skip_whitespace();
            selectors.push(self.parse_selector()?);
            self.skip_whitespace();
            if self.eat(b',') {
                continue;
            }
            if self.eat(b']') {
                break;
            }
            return Err(match self.peek() {
                Some(byte) => self.error(format!("unexpected character '{}' in brackets", byte as char)),
                None => self.error("unterminated '['"),
            });
        }
        if selectors.len() == 1 {
            Ok(selectors.remove(0))
        } else {
            Ok(Selector::Union(selectors))
        }
    }

    fn parse_selector(&mut self) -> Result<Selector, PathQueryError> {
        match self.peek() {
            Some(b'*') => {
                self.position += 1;
                Ok(Selector::Wildcard)
            }
            Some(quote @ (b'\'' | b'"')) => Ok(Selector::Name(self.parse_quoted(quote)?)),
            Some(b'-' | b':' | b'0'..=b'9') => self.parse_index_or_slice(),
            Some(byte) => Err(self.error(format!("unexpected character '{}' in brackets", byte as char))),
            None => Err(self.error("unterminated '['")),
        }
    }

    fn parse_quoted(&mut self, quote: u8) -> Result<String, PathQueryError> {
        self.position += 1;
        let source = self.source;
        let mut text = String::new();
        let mut chars = source[self.position..].char_indices();
        while let Some((offset, character)) = chars.next() {
            match character {
                '\\' => match chars.next() {
                    Some((_, escaped)) => text.push(escaped),
                    None => break,
                },
                character if character as u32 == u32::from(quote) => {
                    self.position += offset + 1;
                    return Ok(text);
                }
                character => text.push(character),
            }
        }
        self.position = source.len();
        Err(self.error("unterminated string literal"))
    }

    fn parse_index_or_slice(&mut self) -> Result<Selector, PathQueryError> {
        let start = self.parse_optional_integer()?;
        self.skip_whitespace();
        if !self.eat(b':') {
            return match start {
                Some(index) => Ok(Selector::Index(index)),
                None => Err(self.error("expected an index")),
            };
        }
        self.skip_whitespace();
        let end = self.parse_optional_integer()?;
        self.skip_whitespace();
        let step = if self.eat(b':') {
            self.skip_whitespace();
            self.parse_optional_integer()?
        } else {
            None
        };
        Ok(Selector::Slice { start, end, step })
    }

    fn parse_optional_integer(&mut self) -> Result<Option<i64>, PathQueryError> {
        let start = self.position;
        self.eat(b'-');
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.position += 1;
        }
        let digits = &self.source[start..self.position];
        match digits {
            "" => Ok(None),
            "-" => Err(self.error("expected digits after '-'")),
            _ => digits
                .parse::<i64>()
                .map(Some)
                .map_err(|_| PathQueryError {
                    offset: start,
                    reason: format!("index '{digits}' is out of range"),
                }),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.peek_at(0)
    }

    fn peek_at(&self, distance: usize) -> Option<u8> {
        self.source.as_bytes().get(self.position + distance).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|byte| byte.is_ascii_whitespace()) {
            self.position += 1;
        }
    }

    fn error(&self, reason: impl Into<String>) -> PathQueryError {
        PathQueryError {
            offset: self.position,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PathQuery, QueryOutcome, evaluate};
    use serde_json::{Value, json};

    fn document() -> Value {
        json!({
            "query": "person at whiteboard",
            "video": {
                "title": "Standup",
                "segments": [
                    {"start": 0, "caption": "intro"},
                    {"start": 2, "caption": "demo"},
                    {"start": 4, "caption": "wrap"}
                ]
            },
            "fetch": {"skipped": true, "reason": "dry_run"}
        })
    }

    fn select(expression: &str) -> Vec<Value> {
        let document = document();
        PathQuery::parse(expression)
            .expect("valid expression")
            .select(&document)
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn dotted_members_select_nested_value() {
        assert_eq!(select("$.video.title"), vec![json!("Standup")]);
        assert_eq!(select("$['video']['title']"), vec![json!("Standup")]);
    }

    #[test]
    fn root_selects_whole_document() {
        assert_eq!(select("$"), vec![document()]);
    }

    #[test]
    fn wildcard_and_indexes_walk_arrays() {
        assert_eq!(
            select("$.video.segments[*].caption"),
            vec![json!("intro"), json!("demo"), json!("wrap")]
        );
        assert_eq!(select("$.video.segments[-1].caption"), vec![json!("wrap")]);
        assert_eq!(select("$.video.segments[0,2].start"), vec![json!(0), json!(4)]);
        assert!(select("$.video.segments[7]").is_empty());
    }

    #[test]
    fn slices_follow_start_end_step() {
        assert_eq!(select("$.video.segments[1:].start"), vec![json!(2), json!(4)]);
        assert_eq!(select("$.video.segments[::2].start"), vec![json!(0), json!(4)]);
        assert_eq!(select("$.video.segments[::-1].start"), vec![json!(4), json!(2), json!(0)]);
        assert!(select("$.video.segments[::0]").is_empty());
    }

    #[test]
    fn extreme_slice_bounds_never_overflow() {
        let items = json!({"items": [1, 2, 3, 4, 5]});
        let cases = [
            ("$.items[1::9223372036854775807]", vec![json!(2)]),
            ("$.items[-1::-9223372036854775808]", vec![json!(5)]),
            ("$.items[-9223372036854775808:9223372036854775807]", vec![json!(1), json!(2), json!(3), json!(4), json!(5)]),
            ("$.items[9223372036854775807:-9223372036854775808:-2]", vec![json!(5), json!(3), json!(1)]),
            ("$.items[-9223372036854775808::9223372036854775807]", vec![json!(1)]),
        ];
        for (expression, expected) in cases {
            let selected: Vec<Value> = PathQuery::parse(expression)
                .expect("valid expression")
                .select(&items)
                .into_iter()
                .cloned()
                .collect();
            assert_eq!(selected, expected, "selection for {expression}");
        }
    }

    #[test]
    fn recursive_descent_collects_in_document_order() {
        assert_eq!(select("$..caption"), vec![json!("intro"), json!("demo"), json!("wrap")]);
        assert_eq!(select("$..reason"), vec![json!("dry_run")]);
    }

    #[test]
    fn member_access_on_scalars_selects_nothing() {
        assert!(select("$.query.length").is_empty());
        assert!(select("$.video.title[0]").is_empty());
    }

    #[test]
    fn evaluate_classifies_match_counts() {
        let document = document();
        assert_eq!(evaluate("$.missing.path", &document), QueryOutcome::Empty);
        assert_eq!(evaluate("$.query", &document), QueryOutcome::One(&document["query"]));
        match evaluate("$..start", &document) {
            QueryOutcome::Many(matches) => assert_eq!(matches.len(), 3),
            other => panic!("expected many matches, got {other:?}"),
        }
    }

    #[test]
    fn malformed_expressions_report_offsets() {
        let document = document();
        for (expression, offset) in [("$.video[", 8), ("$.", 2), ("video", 0), ("$.a[-]", 5), ("$['open", 7)] {
            match evaluate(expression, &document) {
                QueryOutcome::Invalid(error) => assert_eq!(error.offset, offset, "offset for {expression}: {error}"),
                other => panic!("expected parse failure for {expression}, got {other:?}"),
            }
        }
    }

    #[test]
    fn quoted_names_allow_separators() {
        let document = json!({"a.b": {"c d": 1}});
        let query = PathQuery::parse("$['a.b'][\"c d\"]").expect("parse");
        assert_eq!(query.select(&document), vec![&json!(1)]);
        assert_eq!(query.to_string(), "$['a.b'][\"c d\"]");
    }
}
