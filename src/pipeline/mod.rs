//! Orchestration engine: shared context, step sequencer, and the
//! ordered step implementations.

pub mod context;
pub mod runner;
pub mod steps;

pub use context::{FinalizeDisposition, PipelineContext, RunStatus, TraceEntry};
pub use runner::{Runner, RunnerError, Step, StepOutcome};
pub use steps::{build_default, build_local_state, build_runner};
