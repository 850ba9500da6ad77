use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use conduit_engine::{
    DispatchPolicy, DriverConfig, EchoExecutor, ExecutorRegistry, PipelineDriver, RunMode, WorkflowCatalog, load_workflow_file,
    read_trace_file,
};
use serde_json::{Value, json};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "conduit", version, about = "Run declarative data pipelines with validation and tracing")]
struct Cli {
    /// Workflow definition document (YAML or JSON).
    #[arg(long, env = "CONDUIT_CONFIG", default_value = "config/pipeline_config.yaml", global = true)]
    config: PathBuf,

    /// Directory trace documents are written to.
    #[arg(long, env = "CONDUIT_TRACE_DIR", default_value = "traces", global = true)]
    trace_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a payload and run a workflow.
    Run(RunArgs),
    /// List the workflows in the definition document.
    List,
    /// Summarize a trace document.
    Inspect {
        /// Path to a `.jsonl` trace.
        trace: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Workflow identifier.
    #[arg(long, visible_alias = "pipeline")]
    workflow: String,

    /// JSON file path or inline JSON. Defaults to the workflow's sample payload.
    #[arg(long)]
    payload: Option<String>,

    /// Skip execution and only validate and trace inputs (default).
    #[arg(long, conflicts_with = "live")]
    dry_run: bool,

    /// Dispatch steps to executors.
    #[arg(long)]
    live: bool,

    /// Wire the echo executor for every step, previewing live runs without side effects.
    #[arg(long)]
    echo: bool,

    /// Stop dispatching after the first failed or pending step.
    #[arg(long)]
    halt_on_fault: bool,
}

impl RunArgs {
    fn mode(&self) -> RunMode {
        if self.live && !self.dry_run { RunMode::Live } else { RunMode::DryRun }
    }

    fn dispatch_policy(&self) -> DispatchPolicy {
        if self.halt_on_fault {
            DispatchPolicy::HaltOnFault
        } else {
            DispatchPolicy::Continue
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match execute(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            let document = json!({"status": "failed", "errors": [format!("{error:#}")]});
            println!("{}", serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string()));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns whether the command succeeded.
fn execute(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Command::Run(args) => {
            let catalog = load_workflow_file(&cli.config)?;
            run_workflow_cmd(&catalog, &cli.trace_dir, args)
        }
        Command::List => {
            let catalog = load_workflow_file(&cli.config)?;
            print_json(&list_workflows(&catalog))?;
            Ok(true)
        }
        Command::Inspect { trace } => {
            print_json(&inspect_trace(trace)?)?;
            Ok(true)
        }
    }
}

fn run_workflow_cmd(catalog: &WorkflowCatalog, trace_dir: &Path, args: &RunArgs) -> Result<bool> {
    let sample_payload = catalog
        .get(&args.workflow)
        .and_then(|workflow| workflow.sample_payload.as_ref());
    let payload = load_payload_arg(args.payload.as_deref(), sample_payload)?;

    let mut executors = ExecutorRegistry::new();
    if args.echo {
        executors.set_fallback(Arc::new(EchoExecutor));
    }
    debug!(executors = ?executors, "executors wired");

    let driver = PipelineDriver::new(catalog)
        .with_executors(executors)
        .with_config(DriverConfig {
            trace_dir: trace_dir.to_path_buf(),
            dispatch_policy: args.dispatch_policy(),
        });
    let result = driver.run(&args.workflow, &payload, args.mode())?;
    info!(run_id = %result.run_id(), ok = result.is_ok(), "run complete");

    print_json(&serde_json::to_value(&result)?)?;
    Ok(result.is_ok())
}

/// Reads `--payload` as a file when the path exists, otherwise as inline JSON.
fn load_payload_arg(raw: Option<&str>, sample_payload: Option<&Value>) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(sample_payload.cloned().unwrap_or_else(|| json!({})));
    };
    let path = Path::new(raw);
    if path.exists() {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read payload file: {}", path.display()))?;
        return serde_json::from_str(&content).with_context(|| format!("payload file is not valid JSON: {}", path.display()));
    }
    serde_json::from_str(raw).context("payload is neither an existing file nor valid JSON")
}

fn list_workflows(catalog: &WorkflowCatalog) -> Value {
    let workflows: Vec<Value> = catalog
        .workflows
        .values()
        .map(|workflow| {
            json!({
                "id": workflow.id,
                "name": workflow.display_name(),
                "steps": workflow.steps.len(),
            })
        })
        .collect();
    Value::Array(workflows)
}

fn inspect_trace(path: &Path) -> Result<Value> {
    let events = read_trace_file(path)?;
    let steps: Vec<Value> = events
        .iter()
        .map(|event| {
            json!({
                "step_id": event.step_id,
                "status": event.status,
                "latency_ms": event.latency_ms,
                "error": event.error,
                "notes": event.notes.len(),
            })
        })
        .collect();
    let first = events.first();
    Ok(json!({
        "run_id": first.map(|event| event.run_id.as_str()),
        "workflow_id": first.map(|event| event.workflow_id.as_str()),
        "steps": steps,
    }))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
