//! System adapter: blocking waits.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::debug;

use crate::action::{Action, ActionType, PayloadValue};
use crate::error::StepFailure;

use super::InstrumentAdapter;

const CAPABILITIES: &[ActionType] = &[ActionType::Wait];

/// Handle that interrupts pending and future waits of a [`SystemAdapter`].
#[derive(Debug)]
pub struct WaitInterrupt {
    tx: watch::Sender<bool>,
}

impl WaitInterrupt {
    /// Interrupt the wait in progress and fail every wait until [`clear`](Self::clear).
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }

    /// Let waits run to completion again.
    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    /// True while waits are being interrupted.
    pub fn is_interrupted(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Executes `Wait` actions by sleeping on the tokio timer.
#[derive(Debug, Default)]
pub struct SystemAdapter {
    interrupt: Option<watch::Receiver<bool>>,
}

impl SystemAdapter {
    /// Adapter whose waits always run to completion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter plus the handle that interrupts its waits.
    pub fn interruptible() -> (Self, WaitInterrupt) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                interrupt: Some(rx),
            },
            WaitInterrupt { tx },
        )
    }

    async fn wait(&self, duration: Duration) -> Result<(), StepFailure> {
        let Some(rx) = &self.interrupt else {
            sleep(duration).await;
            return Ok(());
        };
        let mut rx = rx.clone();
        let already_interrupted = *rx.borrow_and_update();
        if already_interrupted {
            return Err(StepFailure::Interrupted);
        }

        let timer = sleep(duration);
        tokio::pin!(timer);
        let interrupted = tokio::select! {
            _ = &mut timer => return Ok(()),
            changed = rx.wait_for(|interrupted| *interrupted) => changed.is_ok(),
        };
        if interrupted {
            return Err(StepFailure::Interrupted);
        }
        // Interrupt handle dropped: nothing can interrupt this wait any more.
        timer.await;
        Ok(())
    }
}

#[async_trait]
impl InstrumentAdapter for SystemAdapter {
    fn kind(&self) -> &'static str {
        "System"
    }

    fn capabilities(&self) -> &'static [ActionType] {
        CAPABILITIES
    }

    async fn try_execute(&self, action: &Action) -> Result<Vec<PayloadValue>, StepFailure> {
        match action.action_type() {
            ActionType::Wait => {
                let seconds = action.float_param(0)?;
                let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
                    StepFailure::MalformedAction(format!(
                        "Wait needs a non-negative number of seconds, got {seconds}"
                    ))
                })?;
                debug!(seconds, "Waiting");
                self.wait(duration).await?;
                Ok(Vec::new())
            }
            other => Err(StepFailure::MalformedAction(format!(
                "System adapter cannot execute {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_wait_blocks_for_duration() {
        let system = SystemAdapter::new();
        let start = Instant::now();
        let result = system.execute(&Action::wait(0.5)).await;
        assert!(result.success);
        assert!(result.payload.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_wait_fails() {
        let (system, interrupt) = SystemAdapter::interruptible();
        let wait = Action::wait(60.0);
        let (result, _) = tokio::join!(system.execute(&wait), async {
            sleep(Duration::from_secs(1)).await;
            interrupt.interrupt();
        });
        assert!(!result.success);
        assert!(result.payload.is_empty());

        // Stays interrupted until cleared.
        assert!(!system.execute(&Action::wait(0.1)).await.success);
        interrupt.clear();
        assert!(system.execute(&Action::wait(0.1)).await.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_interrupt_handle_keeps_waiting() {
        let (system, interrupt) = SystemAdapter::interruptible();
        drop(interrupt);
        assert!(system.execute(&Action::wait(0.2)).await.success);
    }

    #[tokio::test]
    async fn test_negative_wait_is_malformed() {
        let system = SystemAdapter::new();
        let err = system.try_execute(&Action::wait(-1.0)).await.unwrap_err();
        assert!(matches!(err, StepFailure::MalformedAction(_)));
        assert!(!system.execute(&Action::wait(-1.0)).await.success);
    }
}
