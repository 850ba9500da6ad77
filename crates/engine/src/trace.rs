//! # Run Traces
//!
//! Every run produces exactly one trace document: one JSON object per line,
//! one line per step (or one line for a rejected payload). The recorder keeps
//! events in memory while the run progresses and writes the whole document
//! when the run ends.
//!
//! Trace files are named `<workflow-id>-<run-id>.jsonl`. Run identifiers start
//! with a UTC timestamp, so a directory listing sorts runs chronologically:
//!
//! ```text
//! traces/
//!   pipeline.semantic_search-20260114T091502Z-3f9c01ab.jsonl
//!   pipeline.semantic_search-20260114T093310Z-c01d77e2.jsonl
//! ```

use std::{
    fmt, fs,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{error::TraceError, executor::StepStatus};

/// Extension of trace documents.
pub const TRACE_FILE_EXTENSION: &str = "jsonl";

/// Sortable, unique identifier of one run: `YYYYMMDDTHHMMSSZ-xxxxxxxx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generates a run identifier for the current instant.
    pub fn generate() -> Self {
        Self::at(Utc::now())
    }

    /// Generates a run identifier for `instant` with a random disambiguator.
    pub fn at(instant: DateTime<Utc>) -> Self {
        let disambiguator = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", instant.format("%Y%m%dT%H%M%SZ"), &disambiguator[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One line of a trace document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub run_id: String,
    pub workflow_id: String,
    /// Step identifier, or `validation` for a rejected payload.
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    /// Absent when the phase aborted before completing.
    pub ended_at: Option<DateTime<Utc>>,
    /// Milliseconds between start and end, rounded to two decimals.
    pub latency_ms: Option<f64>,
    /// Resolved inputs (the raw payload for the validation event).
    pub inputs: Value,
    pub outputs: Value,
    pub error: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// The caller-supplied half of a [`TraceEvent`].
///
/// The recorder adds run and workflow identifiers and, for completed steps,
/// the end time and latency.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub inputs: Value,
    pub outputs: Value,
    pub error: Option<String>,
    pub notes: Vec<String>,
}

/// Accumulates the events of one run and writes them to disk.
///
/// A recorder belongs to exactly one run; it is never shared.
#[derive(Debug)]
pub struct TraceRecorder {
    run_id: RunId,
    workflow_id: String,
    trace_dir: PathBuf,
    events: Vec<TraceEvent>,
}

impl TraceRecorder {
    /// Creates a recorder with a freshly generated run identifier.
    pub fn new(workflow_id: impl Into<String>, trace_dir: impl Into<PathBuf>) -> Self {
        Self::with_run_id(workflow_id, trace_dir, RunId::generate())
    }

    pub fn with_run_id(workflow_id: impl Into<String>, trace_dir: impl Into<PathBuf>, run_id: RunId) -> Self {
        Self {
            run_id,
            workflow_id: workflow_id.into(),
            trace_dir: trace_dir.into(),
            events: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Location the trace is written to by [`flush`](Self::flush).
    pub fn path(&self) -> PathBuf {
        self.trace_dir.join(format!(
            "{}-{}.{TRACE_FILE_EXTENSION}",
            file_name_component(&self.workflow_id),
            self.run_id
        ))
    }

    /// Appends a completed event, ending now.
    pub fn record(&mut self, entry: TraceEntry) -> &TraceEvent {
        let ended_at = Utc::now();
        let latency_ms = latency_ms(entry.started_at, ended_at);
        self.push(entry, Some(ended_at), Some(latency_ms))
    }

    /// Appends an event for a phase that aborted: no end time and no latency.
    pub fn record_aborted(&mut self, entry: TraceEntry) -> &TraceEvent {
        self.push(entry, None, None)
    }

    fn push(&mut self, entry: TraceEntry, ended_at: Option<DateTime<Utc>>, latency_ms: Option<f64>) -> &TraceEvent {
        debug!(
            run_id = %self.run_id,
            step = %entry.step_id,
            status = %entry.status,
            latency_ms = latency_ms.unwrap_or_default(),
            notes = entry.notes.len(),
            "trace event recorded"
        );
        self.events.push(TraceEvent {
            run_id: self.run_id.to_string(),
            workflow_id: self.workflow_id.clone(),
            step_id: entry.step_id,
            status: entry.status,
            started_at: entry.started_at,
            ended_at,
            latency_ms,
            inputs: entry.inputs,
            outputs: entry.outputs,
            error: entry.error,
            notes: entry.notes,
        });
        let index = self.events.len() - 1;
        &self.events[index]
    }

    /// Writes every recorded event to [`path`](Self::path), one per line.
    ///
    /// Missing directories are created. The document is written to a temporary
    /// file and renamed into place, so readers never observe a partial trace;
    /// calling `flush` again replaces the file with the current events.
    pub fn flush(&self) -> Result<PathBuf, TraceError> {
        fs::create_dir_all(&self.trace_dir).map_err(|error| TraceError::io(&self.trace_dir, error))?;

        let path = self.path();
        let temp_path = self
            .trace_dir
            .join(format!(".{}-{}.tmp-{}", file_name_component(&self.workflow_id), self.run_id, std::process::id()));

        if let Err(error) = write_events(&temp_path, &self.events) {
            let _ = fs::remove_file(&temp_path);
            return Err(error);
        }
        fs::rename(&temp_path, &path).map_err(|error| {
            let _ = fs::remove_file(&temp_path);
            TraceError::io(&path, error)
        })?;

        info!(
            run_id = %self.run_id,
            workflow = %self.workflow_id,
            events = self.events.len(),
            path = %path.display(),
            "trace flushed"
        );
        Ok(path)
    }
}

/// Reads a trace document back into events. Blank lines are ignored.
pub fn read_trace_file(path: impl AsRef<Path>) -> Result<Vec<TraceEvent>, TraceError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|error| TraceError::io(path, error))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| serde_json::from_str(line).map_err(|source| TraceError::MalformedLine { line: index + 1, source }))
        .collect()
}

fn write_events(path: &Path, events: &[TraceEvent]) -> Result<(), TraceError> {
    let file = File::create(path).map_err(|error| TraceError::io(path, error))?;
    let mut writer = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n").map_err(|error| TraceError::io(path, error))?;
    }
    let file = writer.into_inner().map_err(|error| TraceError::io(path, error.into_error()))?;
    file.sync_all().map_err(|error| TraceError::io(path, error))?;
    Ok(())
}

fn latency_ms(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> f64 {
    let micros = (ended_at - started_at).num_microseconds().unwrap_or(i64::MAX).max(0);
    ((micros as f64 / 1000.0) * 100.0).round() / 100.0
}

/// Keeps workflow identifiers from escaping the trace directory.
fn file_name_component(workflow_id: &str) -> String {
    workflow_id
        .chars()
        .map(|character| if matches!(character, '/' | '\\' | ':') { '_' } else { character })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn entry(step_id: &str, status: StepStatus, started_at: DateTime<Utc>) -> TraceEntry {
        TraceEntry {
            step_id: step_id.to_string(),
            status,
            started_at,
            inputs: json!({"caption": null}),
            outputs: json!({"skipped": true, "reason": "dry_run"}),
            error: None,
            notes: vec!["caption: jsonpath '$.video.title' returned no results".to_string()],
        }
    }

    #[test]
    fn run_id_is_timestamp_plus_disambiguator() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 14, 9, 15, 2).single().expect("valid instant");
        let first = RunId::at(instant);
        let second = RunId::at(instant);

        assert!(first.as_str().starts_with("20260114T091502Z-"));
        assert_eq!(first.as_str().len(), "20260114T091502Z-".len() + 8);
        assert_ne!(first, second);
    }

    #[test]
    fn record_computes_end_and_rounded_latency() {
        let mut recorder = TraceRecorder::new("ingest", "unused");
        let started_at = Utc::now() - Duration::milliseconds(25);

        let event = recorder.record(entry("fetch", StepStatus::Skipped, started_at)).clone();

        let ended_at = event.ended_at.expect("end time");
        let latency = event.latency_ms.expect("latency");
        assert!(ended_at >= started_at);
        assert!(latency >= 25.0, "latency {latency}");
        assert_eq!((latency * 100.0).round() / 100.0, latency);
        assert_eq!(event.run_id, recorder.run_id().to_string());
        assert_eq!(event.workflow_id, "ingest");
    }

    #[test]
    fn aborted_events_have_no_end_or_latency() {
        let mut recorder = TraceRecorder::new("search", "unused");
        let event = recorder.record_aborted(entry("validation", StepStatus::Failed, Utc::now()));

        assert!(event.ended_at.is_none());
        assert!(event.latency_ms.is_none());
    }

    #[test]
    fn path_is_derived_from_workflow_and_run() {
        let run_id = RunId("20260114T091502Z-3f9c01ab".into());
        let recorder = TraceRecorder::with_run_id("pipeline.semantic_search", "traces", run_id);

        assert_eq!(
            recorder.path(),
            PathBuf::from("traces/pipeline.semantic_search-20260114T091502Z-3f9c01ab.jsonl")
        );
        let escaped = TraceRecorder::with_run_id("../etc", "traces", RunId("r".into()));
        assert_eq!(escaped.path(), PathBuf::from("traces/.._etc-r.jsonl"));
    }

    #[test]
    fn flush_round_trips_every_event() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut recorder = TraceRecorder::new("ingest", temp_dir.path().join("nested").join("traces"));
        recorder.record(entry("fetch", StepStatus::Skipped, Utc::now()));
        recorder.record(TraceEntry {
            error: Some("No executor provided".into()),
            notes: Vec::new(),
            ..entry("index", StepStatus::Pending, Utc::now())
        });
        recorder.record_aborted(entry("validation", StepStatus::Failed, Utc::now()));

        let path = recorder.flush().expect("flush");
        let parsed = read_trace_file(&path).expect("read trace");

        assert_eq!(parsed, recorder.events());
        let raw = fs::read_to_string(&path).expect("raw trace");
        assert_eq!(raw.lines().count(), 3);
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"status\":\"pending\""));
    }

    #[test]
    fn repeated_flush_overwrites_instead_of_appending() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let mut recorder = TraceRecorder::new("ingest", temp_dir.path());
        recorder.record(entry("fetch", StepStatus::Skipped, Utc::now()));
        let first = recorder.flush().expect("first flush");
        recorder.record(entry("index", StepStatus::Skipped, Utc::now()));
        let second = recorder.flush().expect("second flush");

        assert_eq!(first, second);
        assert_eq!(read_trace_file(&second).expect("read").len(), 2);
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .expect("list dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temporary files left behind: {leftovers:?}");
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("broken.jsonl");
        let mut recorder = TraceRecorder::new("ingest", temp_dir.path());
        let event = recorder.record(entry("fetch", StepStatus::Skipped, Utc::now())).clone();
        let good = serde_json::to_string(&event).expect("encode");
        fs::write(&path, format!("{good}\n\n{{not json\n")).expect("write");

        match read_trace_file(&path) {
            Err(TraceError::MalformedLine { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed line error, got {other:?}"),
        }
    }
}
