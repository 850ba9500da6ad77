//! Execution primitives: ordering steps, the executor capability, and the
//! per-step dispatch decision.
//!
//! - `planning` turns declared dependencies into a single execution order
//! - `runner::StepExecutor` abstracts how a step's work is actually done
//! - `runner::ExecutorRegistry` maps steps and actions to executors
//! - `dispatch` applies the run mode and records faults as outcomes

pub mod dispatch;
pub mod planning;
pub mod runner;
pub mod types;

pub use dispatch::{DRY_RUN_REASON, HALTED_REASON, NO_EXECUTOR_MESSAGE, RunMode, dispatch_step, skipped_output};
pub use planning::{execution_order, order_steps_for_execution};
pub use runner::{EchoExecutor, ExecutorRegistry, StepExecutor};
pub use types::{StepOutcome, StepRequest, StepStatus};
