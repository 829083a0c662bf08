//! Step sequencer: an ordered list of named steps executed against one
//! shared context, short-circuiting on error or benign halt.
//!
//! One invocation is a single linear pass: PENDING → RUNNING(step i) →
//! RUNNING(step i+1) | HALTED_OK | FAILED. Terminal states are never
//! re-entered. Steps never raise across the boundary; they return a
//! tagged outcome and the runner is the only place that turns a failure
//! into invocation termination.

use async_trait::async_trait;
use thiserror::Error;

use crate::selector::IdleReason;

use super::context::{PipelineContext, RunStatus, TraceEntry};

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Proceed to the next step
    Continue,
    /// Stop the pipeline with overall status ok (idle outcomes)
    Halt { reason: IdleReason },
    /// Stop the pipeline with overall status error
    Fail { error: String },
}

/// A named pipeline step operating on the shared context
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome;
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("unknown step: {name}")]
    UnknownStep { name: String },
}

/// Executes the configured step list in order
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
}

/// Whether the pipeline may proceed after a step
enum Flow {
    Continue,
    Stop,
}

impl Runner {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    /// Names of the configured steps, in execution order
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order, honoring error/halt short-circuiting.
    pub async fn run_all(&self, ctx: &mut PipelineContext) {
        for step in &self.steps {
            if let Flow::Stop = self.execute(step.as_ref(), ctx).await {
                return;
            }
        }
        ctx.status = RunStatus::Ok;
    }

    /// Run a single named step in isolation (debug entry point).
    pub async fn run_only(
        &self,
        name: &str,
        ctx: &mut PipelineContext,
    ) -> Result<(), RunnerError> {
        let step = self
            .steps
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| RunnerError::UnknownStep {
                name: name.to_string(),
            })?;

        if let Flow::Continue = self.execute(step.as_ref(), ctx).await {
            ctx.status = RunStatus::Ok;
        }
        Ok(())
    }

    /// Run the ordered sequence, stopping right after the named step
    /// (debug entry point). Short-circuit rules apply along the way.
    pub async fn run_until(
        &self,
        name: &str,
        ctx: &mut PipelineContext,
    ) -> Result<(), RunnerError> {
        if !self.steps.iter().any(|s| s.name() == name) {
            return Err(RunnerError::UnknownStep {
                name: name.to_string(),
            });
        }

        for step in &self.steps {
            if let Flow::Stop = self.execute(step.as_ref(), ctx).await {
                return Ok(());
            }
            if step.name() == name {
                ctx.status = RunStatus::Ok;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Execute one step: mark it current, run it, append the trace
    /// entry, and translate its outcome into terminal status.
    async fn execute(&self, step: &dyn Step, ctx: &mut PipelineContext) -> Flow {
        let name = step.name();
        ctx.current_step = Some(name);
        tracing::debug!(invocation = %ctx.invocation_id, step = name, "running step");

        let outcome = step.run(ctx).await;

        let (ok, error) = match &outcome {
            StepOutcome::Continue | StepOutcome::Halt { .. } => (true, None),
            StepOutcome::Fail { error } => (false, Some(error.clone())),
        };
        ctx.trace.push(TraceEntry {
            step: name.to_string(),
            ok,
            error: error.clone(),
        });

        match outcome {
            StepOutcome::Continue => Flow::Continue,
            StepOutcome::Halt { reason } => {
                tracing::info!(invocation = %ctx.invocation_id, step = name, %reason, "pipeline idle");
                ctx.halt_reason = Some(reason);
                ctx.status = RunStatus::Ok;
                Flow::Stop
            }
            StepOutcome::Fail { error } => {
                tracing::warn!(invocation = %ctx.invocation_id, step = name, error, "step failed");
                ctx.error = Some(error);
                ctx.status = RunStatus::Error;
                Flow::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted step for sequencer tests
    struct Scripted {
        name: &'static str,
        outcome: StepOutcome,
    }

    #[async_trait]
    impl Step for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, ctx: &mut PipelineContext) -> StepOutcome {
            // Record visits through the selection field
            *ctx.selection.get_or_insert(0) += 1;
            self.outcome.clone()
        }
    }

    fn runner(outcomes: Vec<(&'static str, StepOutcome)>) -> Runner {
        Runner::new(
            outcomes
                .into_iter()
                .map(|(name, outcome)| Box::new(Scripted { name, outcome }) as Box<dyn Step>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn all_steps_continue_yields_ok() {
        let r = runner(vec![
            ("a", StepOutcome::Continue),
            ("b", StepOutcome::Continue),
        ]);
        let mut ctx = PipelineContext::new();
        r.run_all(&mut ctx).await;
        assert_eq!(ctx.status, RunStatus::Ok);
        assert_eq!(ctx.selection, Some(2));
        assert_eq!(ctx.trace.len(), 2);
        assert!(ctx.trace.iter().all(|t| t.ok));
    }

    #[tokio::test]
    async fn fail_short_circuits_with_error_status() {
        let r = runner(vec![
            ("a", StepOutcome::Continue),
            (
                "b",
                StepOutcome::Fail {
                    error: "boom".to_string(),
                },
            ),
            ("c", StepOutcome::Continue),
        ]);
        let mut ctx = PipelineContext::new();
        r.run_all(&mut ctx).await;
        assert_eq!(ctx.status, RunStatus::Error);
        assert_eq!(ctx.error.as_deref(), Some("boom"));
        // Step c never ran
        assert_eq!(ctx.selection, Some(2));
        assert_eq!(ctx.trace.len(), 2);
        assert!(!ctx.trace[1].ok);
    }

    #[tokio::test]
    async fn halt_is_ok_not_error() {
        let r = runner(vec![
            (
                "a",
                StepOutcome::Halt {
                    reason: IdleReason::NothingNew,
                },
            ),
            ("b", StepOutcome::Continue),
        ]);
        let mut ctx = PipelineContext::new();
        r.run_all(&mut ctx).await;
        assert_eq!(ctx.status, RunStatus::Ok);
        assert_eq!(ctx.halt_reason, Some(IdleReason::NothingNew));
        assert!(ctx.error.is_none());
        assert_eq!(ctx.selection, Some(1));
        // The halting step itself is recorded as ok
        assert!(ctx.trace[0].ok);
    }

    #[tokio::test]
    async fn run_only_executes_one_step() {
        let r = runner(vec![
            ("a", StepOutcome::Continue),
            ("b", StepOutcome::Continue),
        ]);
        let mut ctx = PipelineContext::new();
        r.run_only("b", &mut ctx).await.unwrap();
        assert_eq!(ctx.selection, Some(1));
        assert_eq!(ctx.status, RunStatus::Ok);
        assert_eq!(ctx.trace.len(), 1);
        assert_eq!(ctx.trace[0].step, "b");
    }

    #[tokio::test]
    async fn run_only_unknown_step_errors() {
        let r = runner(vec![("a", StepOutcome::Continue)]);
        let mut ctx = PipelineContext::new();
        assert!(matches!(
            r.run_only("zz", &mut ctx).await,
            Err(RunnerError::UnknownStep { .. })
        ));
    }

    #[tokio::test]
    async fn run_until_stops_after_named_step() {
        let r = runner(vec![
            ("a", StepOutcome::Continue),
            ("b", StepOutcome::Continue),
            ("c", StepOutcome::Continue),
        ]);
        let mut ctx = PipelineContext::new();
        r.run_until("b", &mut ctx).await.unwrap();
        assert_eq!(ctx.selection, Some(2));
        assert_eq!(ctx.status, RunStatus::Ok);
    }

    #[tokio::test]
    async fn run_until_honors_earlier_failure() {
        let r = runner(vec![
            (
                "a",
                StepOutcome::Fail {
                    error: "boom".to_string(),
                },
            ),
            ("b", StepOutcome::Continue),
        ]);
        let mut ctx = PipelineContext::new();
        r.run_until("b", &mut ctx).await.unwrap();
        assert_eq!(ctx.status, RunStatus::Error);
        assert_eq!(ctx.selection, Some(1));
    }

    #[tokio::test]
    async fn run_until_unknown_step_errors_before_running() {
        let r = runner(vec![("a", StepOutcome::Continue)]);
        let mut ctx = PipelineContext::new();
        assert!(matches!(
            r.run_until("zz", &mut ctx).await,
            Err(RunnerError::UnknownStep { .. })
        ));
        // Nothing executed
        assert_eq!(ctx.selection, None);
    }
}
