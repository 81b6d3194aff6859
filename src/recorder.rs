//! Step recorders.
//!
//! The execution loop hands every executed step to a [`Recorder`] before it starts the
//! next one. Recorders are the hook point for live display, result storage and anything
//! else that wants to observe a run.
//!
//! - [`LogRecorder`]: one `tracing` event per step
//! - [`MemoryRecorder`]: keeps timestamped [`StepRecord`]s
//! - [`JsonLinesRecorder`]: writes each record as one JSON line
//!
//! Any `FnMut(usize, &Action, &ExecutionResult)` closure is a recorder as well.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{info, warn};

use crate::action::{Action, ExecutionResult, PayloadValue};

/// Observer of executed steps.
pub trait Recorder: Send {
    /// Called once per executed step, in plan order.
    fn record(&mut self, step: usize, action: &Action, result: &ExecutionResult);
}

impl<F> Recorder for F
where
    F: FnMut(usize, &Action, &ExecutionResult) + Send,
{
    fn record(&mut self, step: usize, action: &Action, result: &ExecutionResult) {
        self(step, action, result)
    }
}

fn payload_summary(payload: &[PayloadValue]) -> String {
    if payload.is_empty() {
        return "-".to_string();
    }
    payload
        .iter()
        .map(PayloadValue::summary)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Logs every step through `tracing`.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record(&mut self, step: usize, action: &Action, result: &ExecutionResult) {
        let status = if result.success { "Success" } else { "Failure" };
        info!(
            step,
            %action,
            status,
            payload = %payload_summary(&result.payload),
            "Step executed"
        );
    }
}

/// One recorded step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Position of the action in the plan.
    pub step: usize,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// Executed action.
    pub action: Action,
    /// Adapter result.
    pub result: ExecutionResult,
}

impl StepRecord {
    /// Record of `action` completed now.
    pub fn now(step: usize, action: &Action, result: &ExecutionResult) -> Self {
        Self {
            step,
            timestamp: Utc::now(),
            action: action.clone(),
            result: result.clone(),
        }
    }
}

/// Keeps every step in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    steps: Vec<StepRecord>,
}

impl MemoryRecorder {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded steps in execution order.
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True before the first step.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Recorded failures.
    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|record| !record.result.success)
    }

    /// Take the recorded steps, leaving the recorder empty.
    pub fn into_steps(self) -> Vec<StepRecord> {
        self.steps
    }
}

impl Recorder for MemoryRecorder {
    fn record(&mut self, step: usize, action: &Action, result: &ExecutionResult) {
        self.steps.push(StepRecord::now(step, action, result));
    }
}

/// Writes one JSON object per step.
///
/// Write errors are logged and do not interrupt the run.
pub struct JsonLinesRecorder<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesRecorder<W> {
    /// Recorder writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_record(&mut self, record: &StepRecord) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Recorder for JsonLinesRecorder<W> {
    fn record(&mut self, step: usize, action: &Action, result: &ExecutionResult) {
        let record = StepRecord::now(step, action, result);
        if let Err(err) = self.write_record(&record) {
            warn!(step, error = %err, "Failed to write step record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_log_recorder_reports_outcome() {
        let mut recorder = LogRecorder;
        recorder.record(
            3,
            &Action::get_data("ScanOsc", 2),
            &ExecutionResult::ok(vec![PayloadValue::Position(1.0)]),
        );
        recorder.record(4, &Action::wait(0.5), &ExecutionResult::failed());
        assert!(logs_contain("Step executed"));
        assert!(logs_contain("Success"));
        assert!(logs_contain("Failure"));
        assert!(logs_contain("GET_DATA"));
    }

    #[test]
    fn test_closure_is_a_recorder() {
        let mut seen = Vec::new();
        {
            let mut recorder = |step: usize, _: &Action, result: &ExecutionResult| {
                seen.push((step, result.success));
            };
            let r: &mut dyn Recorder = &mut recorder;
            r.record(0, &Action::wait(0.1), &ExecutionResult::done());
            r.record(1, &Action::wait(0.1), &ExecutionResult::failed());
        }
        assert_eq!(seen, vec![(0, true), (1, false)]);
    }

    #[test]
    fn test_memory_recorder_keeps_order() {
        let mut recorder = MemoryRecorder::new();
        recorder.record(0, &Action::wait(0.1), &ExecutionResult::done());
        recorder.record(1, &Action::get_data("ScanOsc", 2), &ExecutionResult::failed());

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.steps()[1].action, Action::get_data("ScanOsc", 2));
        assert_eq!(recorder.failures().count(), 1);
        assert!(recorder.steps()[0].timestamp <= recorder.steps()[1].timestamp);
    }

    #[test]
    fn test_json_lines_output() {
        let mut recorder = JsonLinesRecorder::new(Vec::new());
        recorder.record(
            0,
            &Action::move_stage("ScanStage", "X-Stage", 1.0),
            &ExecutionResult::ok(vec![PayloadValue::Position(1.0)]),
        );
        recorder.record(1, &Action::wait(0.5), &ExecutionResult::done());

        let text = String::from_utf8(recorder.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: StepRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.step, 0);
        assert_eq!(first.result.payload, vec![PayloadValue::Position(1.0)]);
    }

    #[test]
    fn test_payload_summary() {
        assert_eq!(payload_summary(&[]), "-");
        assert_eq!(
            payload_summary(&[PayloadValue::Position(2.0)]),
            "position 2"
        );
    }
}
