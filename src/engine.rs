//! Execution loop.
//!
//! Runs a [`CompiledPlan`] to completion, strictly in order and one action at a time:
//! each action is dispatched through the [`DispatchRegistry`], awaited, and handed to the
//! [`Recorder`] before the next one starts. Grid-point order is physical order, so
//! nothing is reordered or overlapped.
//!
//! What happens after a failed step is an explicit [`FailurePolicy`]. The default,
//! [`FailurePolicy::Continue`], records the failure and carries on. Continuing after a
//! failed stage move records later data against a position the stage never reached;
//! [`FailurePolicy::AbortOnMoveFailure`] stops the run at that point instead.
//!
//! An interrupt ends the run whatever the policy. Once a [`WaitInterrupt`] fires, every
//! later wait fails at once, so carrying on would take reads without settle time.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

use crate::action::{Action, ExecutionResult};
use crate::error::ScanResult;
use crate::instrument::WaitInterrupt;
use crate::recorder::Recorder;
use crate::registry::DispatchRegistry;
use crate::scan::CompiledPlan;

/// Behaviour of the loop after a failed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and run the next action.
    #[default]
    Continue,
    /// Stop after a failed `MoveStage` or `MoveToCoords`.
    AbortOnMoveFailure,
    /// Stop after any failed step.
    AbortOnAnyFailure,
}

impl FailurePolicy {
    /// True if a failed `action` ends the run under this policy.
    pub fn aborts_on(&self, action: &Action) -> bool {
        match self {
            FailurePolicy::Continue => false,
            FailurePolicy::AbortOnMoveFailure => action.action_type().is_motion(),
            FailurePolicy::AbortOnAnyFailure => true,
        }
    }
}

/// Outcome counts of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Actions dispatched and recorded.
    pub executed: usize,
    /// Successful steps.
    pub succeeded: usize,
    /// Failed steps.
    pub failed: usize,
    /// Index of the step that ended the run early: the failed step under an aborting
    /// policy, or the step in flight when the run was interrupted.
    pub aborted_at: Option<usize>,
}

impl RunSummary {
    /// True if every action of the plan ran.
    pub fn completed(&self) -> bool {
        self.aborted_at.is_none()
    }
}

/// Sequential plan runner.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLoop {
    policy: FailurePolicy,
    interrupt: Option<watch::Receiver<bool>>,
}

impl ExecutionLoop {
    /// Loop applying `policy` after failed steps.
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            interrupt: None,
        }
    }

    /// Stop the run as soon as `interrupt` fires.
    pub fn with_interrupt(mut self, interrupt: &WaitInterrupt) -> Self {
        self.interrupt = Some(interrupt.subscribe());
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Failure policy in effect.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run `plan` against `registry`, reporting every step to `recorder`.
    ///
    /// The plan is validated against the registry first, so a configuration error stops
    /// the run before any instrument is touched. An interrupt stops the run after the step
    /// in flight is recorded, or before the first step if it is already set.
    ///
    /// # Errors
    ///
    /// Configuration errors from plan validation. Step failures are never errors; they
    /// are recorded and counted in the returned [`RunSummary`].
    pub async fn run(
        &self,
        plan: &CompiledPlan,
        registry: &DispatchRegistry,
        recorder: &mut dyn Recorder,
    ) -> ScanResult<RunSummary> {
        registry.validate_plan(plan)?;
        info!(actions = plan.len(), policy = ?self.policy, "Starting run");

        let mut summary = RunSummary::default();
        if self.interrupted() {
            warn!("Interrupted before the first step, nothing executed");
            summary.aborted_at = Some(0);
            return Ok(summary);
        }
        for (step, action) in plan.iter().enumerate() {
            let span = info_span!("step", step, instrument = action.instrument());
            let result = registry.dispatch(action).instrument(span).await?;
            recorder.record(step, action, &result);

            summary.executed += 1;
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if self.interrupted() {
                warn!(step, %action, "Run interrupted, stopping");
                summary.aborted_at = Some(step);
                break;
            }
            if !result.success && self.policy.aborts_on(action) {
                error!(step, %action, policy = ?self.policy, "Step failed, aborting run");
                summary.aborted_at = Some(step);
                break;
            }
        }

        info!(
            executed = summary.executed,
            failed = summary.failed,
            completed = summary.completed(),
            "Run finished"
        );
        Ok(summary)
    }
}

/// Run `plan` with the default policy, calling `on_step` after every action.
///
/// # Errors
///
/// See [`ExecutionLoop::run`].
pub async fn run<F>(
    plan: &CompiledPlan,
    registry: &DispatchRegistry,
    mut on_step: F,
) -> ScanResult<RunSummary>
where
    F: FnMut(&Action, &ExecutionResult) + Send,
{
    let mut recorder =
        |_step: usize, action: &Action, result: &ExecutionResult| on_step(action, result);
    ExecutionLoop::default()
        .run(plan, registry, &mut recorder)
        .await
}
