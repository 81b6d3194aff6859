//! Instrument adapters.
//!
//! An adapter is the capability-bounded executor of one instrument's action vocabulary.
//! Every adapter declares the [`ActionType`]s it accepts and implements a fallible
//! [`InstrumentAdapter::try_execute`]. The provided [`InstrumentAdapter::execute`] is the
//! cross-instrument result protocol: a typed [`StepFailure`] is logged and collapsed into
//! `(false, [])`, so a driver fault is an ordinary failed step and never ends a scan.
//!
//! # Variants
//!
//! - [`SystemAdapter`]: `Wait`
//! - [`MotionStageAdapter`]: `MoveToCoords`, `MoveStage`
//! - [`OscilloscopeAdapter`]: `SET_ACQ_MODE`, `SET_ACQ_STATE`, `GET_DATA`, `GET_ACQ_PARAMS`
//!
//! Adapters reach hardware through the [`driver`] traits; [`mock`] provides simulated
//! drivers for tests and dry runs.

use async_trait::async_trait;
use tracing::warn;

use crate::action::{Action, ActionType, ExecutionResult, PayloadValue};
use crate::error::StepFailure;

pub mod driver;
pub mod mock;
pub mod oscilloscope;
pub mod stage;
pub mod system;

pub use driver::{AcquisitionMode, AcquisitionState, ScopeDriver, StageDriver};
pub use oscilloscope::OscilloscopeAdapter;
pub use stage::MotionStageAdapter;
pub use system::{SystemAdapter, WaitInterrupt};

/// Executor for one instrument's action vocabulary.
#[async_trait]
pub trait InstrumentAdapter: Send + Sync {
    /// Adapter class, e.g. `"MotionStage"`.
    fn kind(&self) -> &'static str;

    /// Action types this adapter accepts.
    fn capabilities(&self) -> &'static [ActionType];

    /// True if `action_type` is in the capability set.
    fn supports(&self, action_type: ActionType) -> bool {
        self.capabilities().contains(&action_type)
    }

    /// Run one action, reporting failures as typed errors.
    async fn try_execute(&self, action: &Action) -> Result<Vec<PayloadValue>, StepFailure>;

    /// Run one action under the boolean/payload result protocol.
    async fn execute(&self, action: &Action) -> ExecutionResult {
        match self.try_execute(action).await {
            Ok(payload) => ExecutionResult::ok(payload),
            Err(failure) => {
                warn!(
                    instrument = action.instrument(),
                    action_type = %action.action_type(),
                    error = %failure,
                    "Step failed"
                );
                ExecutionResult::failed()
            }
        }
    }
}
