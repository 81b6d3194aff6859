//! Tests for running compiled plans through the execution loop.

use scan_daq::action::{Action, ActionType, ExecutionResult, PayloadValue};
use scan_daq::engine::{self, ExecutionLoop, FailurePolicy, RunSummary};
use scan_daq::instrument::mock::{MockScope, MockStage};
use scan_daq::instrument::{MotionStageAdapter, OscilloscopeAdapter, SystemAdapter};
use scan_daq::recorder::{JsonLinesRecorder, MemoryRecorder, StepRecord};
use scan_daq::registry::DispatchRegistry;
use scan_daq::scan::{compile, Axis, CompiledPlan, ScanConfig};
use std::sync::Arc;
use std::time::Duration;

fn line_scan() -> ScanConfig {
    ScanConfig::new(
        vec![Axis::X],
        [0.0; 3],
        [2.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        "ScanStage",
        "ScanOsc",
        0.5,
        100,
    )
}

async fn registry_with(
    system: SystemAdapter,
    stage: MockStage,
    scope: MockScope,
) -> DispatchRegistry {
    let mut registry = DispatchRegistry::with_system(system);
    let stage = MotionStageAdapter::new()
        .with_stage("X-Stage", Axis::X, Arc::new(stage))
        .and_then(|s| s.with_stage("Y-Stage", Axis::Y, Arc::new(MockStage::new())))
        .unwrap();
    registry.register("ScanStage", Arc::new(stage)).unwrap();
    let scope = OscilloscopeAdapter::connect("mock", Arc::new(scope))
        .await
        .unwrap();
    registry.register("ScanOsc", Arc::new(scope)).unwrap();
    registry
}

async fn registry(stage: MockStage, scope: MockScope) -> DispatchRegistry {
    registry_with(SystemAdapter::new(), stage, scope).await
}

async fn run_with(
    policy: FailurePolicy,
    plan: &CompiledPlan,
    registry: &DispatchRegistry,
) -> (RunSummary, Vec<StepRecord>) {
    let mut recorder = MemoryRecorder::new();
    let summary = ExecutionLoop::new(policy)
        .run(plan, registry, &mut recorder)
        .await
        .unwrap();
    (summary, recorder.into_steps())
}

#[tokio::test(start_paused = true)]
async fn test_every_step_recorded_once_in_order() {
    let plan = compile(&line_scan()).unwrap();
    let registry = registry(MockStage::new(), MockScope::new(8)).await;
    let (summary, steps) = run_with(FailurePolicy::Continue, &plan, &registry).await;

    assert_eq!(summary.executed, plan.len());
    assert_eq!(summary.succeeded, plan.len());
    assert!(summary.completed());
    assert_eq!(steps.len(), plan.len());
    for (i, (record, action)) in steps.iter().zip(plan.iter()).enumerate() {
        assert_eq!(record.step, i);
        assert_eq!(&record.action, action);
    }

    let waveforms = steps
        .iter()
        .filter(|r| matches!(r.result.payload.as_slice(), [PayloadValue::Waveform { .. }]))
        .count();
    assert_eq!(waveforms, 3);
}

#[tokio::test(start_paused = true)]
async fn test_step_failure_does_not_stop_run() {
    let plan = compile(&line_scan()).unwrap();
    let registry = registry(MockStage::new(), MockScope::new(8).fail_on_read(2)).await;
    let (summary, steps) = run_with(FailurePolicy::Continue, &plan, &registry).await;

    assert_eq!(summary.executed, plan.len());
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.aborted_at, None);

    let failed: Vec<&StepRecord> = steps.iter().filter(|r| !r.result.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].action.action_type(), ActionType::GetData);
    assert_eq!(failed[0].result, ExecutionResult::failed());
}

#[tokio::test(start_paused = true)]
async fn test_abort_on_move_failure_prevents_misregistered_reads() {
    let plan = compile(&line_scan()).unwrap();
    // Move #2 is the first stepping move, to X = 1
    let registry = registry(MockStage::new().fail_on_move(2), MockScope::new(8)).await;
    let (summary, steps) = run_with(FailurePolicy::AbortOnMoveFailure, &plan, &registry).await;

    let abort = summary.aborted_at.unwrap();
    assert_eq!(steps.len(), abort + 1);
    assert_eq!(steps[abort].action, Action::move_stage("ScanStage", "X-Stage", 1.0));
    assert!(!steps[abort].result.success);
    // Only the read at the start position happened
    let reads = steps
        .iter()
        .filter(|r| r.action.action_type() == ActionType::GetData)
        .count();
    assert_eq!(reads, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_on_move_failure_ignores_read_failures() {
    let plan = compile(&line_scan()).unwrap();
    let registry = registry(MockStage::new(), MockScope::new(8).fail_on_read(1)).await;
    let (summary, _) = run_with(FailurePolicy::AbortOnMoveFailure, &plan, &registry).await;
    assert!(summary.completed());
    assert_eq!(summary.failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_on_any_failure() {
    let plan = compile(&line_scan()).unwrap();
    let registry = registry(MockStage::new(), MockScope::new(8).fail_on_read(1)).await;
    let (summary, steps) = run_with(FailurePolicy::AbortOnAnyFailure, &plan, &registry).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, summary.executed - 1);
    let abort = summary.aborted_at.unwrap();
    assert_eq!(steps[abort].action.action_type(), ActionType::GetData);
}

#[tokio::test(start_paused = true)]
async fn test_grid_of_two_axes_visits_every_point() {
    let config = ScanConfig::new(
        vec![Axis::X, Axis::Y],
        [0.0; 3],
        [1.0, 2.0, 0.0],
        [1.0, 1.0, 0.0],
        "ScanStage",
        "ScanOsc",
        0.1,
        100,
    );
    let plan = compile(&config).unwrap();
    let registry = registry(MockStage::new(), MockScope::new(4)).await;

    let mut reads = 0;
    let summary = engine::run(&plan, &registry, |action, result| {
        assert!(result.success);
        if action.action_type() == ActionType::GetData {
            reads += 1;
        }
    })
    .await
    .unwrap();
    assert_eq!(reads, 6);
    assert_eq!(summary.executed, plan.len());
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_wait_ends_the_run() {
    let plan = CompiledPlan::new(vec![
        Action::wait(30.0),
        Action::move_stage("ScanStage", "X-Stage", 1.0),
    ]);
    let (system, interrupt) = SystemAdapter::interruptible();
    let registry = registry_with(system, MockStage::new(), MockScope::new(4)).await;
    let execution = ExecutionLoop::new(FailurePolicy::Continue).with_interrupt(&interrupt);

    let interrupter = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        interrupt.interrupt();
        interrupt
    });
    let mut recorder = MemoryRecorder::new();
    let summary = execution
        .run(&plan, &registry, &mut recorder)
        .await
        .unwrap();
    let _interrupt = interrupter.await.unwrap();

    assert_eq!(summary.aborted_at, Some(0));
    assert_eq!(summary.failed, 1);
    let steps = recorder.into_steps();
    assert_eq!(steps.len(), 1);
    assert!(!steps[0].result.success);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_stops_sweep_before_unsettled_reads() {
    let config = ScanConfig::new(
        vec![Axis::X],
        [0.0; 3],
        [4.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        "ScanStage",
        "ScanOsc",
        0.5,
        100,
    );
    let plan = compile(&config).unwrap();
    let (system, interrupt) = SystemAdapter::interruptible();
    let registry = registry_with(system, MockStage::new(), MockScope::new(4)).await;
    interrupt.interrupt();

    let mut recorder = MemoryRecorder::new();
    let summary = ExecutionLoop::default()
        .with_interrupt(&interrupt)
        .run(&plan, &registry, &mut recorder)
        .await
        .unwrap();

    assert!(!summary.completed());
    assert_eq!(summary.aborted_at, Some(0));
    assert_eq!(summary.executed, 0);
    assert!(recorder.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_mid_sweep_records_no_later_reads() {
    let config = ScanConfig::new(
        vec![Axis::X],
        [0.0; 3],
        [4.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        "ScanStage",
        "ScanOsc",
        0.5,
        100,
    );
    let plan = compile(&config).unwrap();
    let (system, interrupt) = SystemAdapter::interruptible();
    let registry = registry_with(system, MockStage::new(), MockScope::new(4)).await;
    let execution = ExecutionLoop::default().with_interrupt(&interrupt);

    let mut recorder = MemoryRecorder::new();
    let (summary, ()) = tokio::join!(execution.run(&plan, &registry, &mut recorder), async {
        // Lands during the settle wait after the first stepping move
        tokio::time::sleep(Duration::from_secs(1)).await;
        interrupt.interrupt();
    });
    let summary = summary.unwrap();
    let steps = recorder.into_steps();

    let abort = summary.aborted_at.unwrap();
    assert_eq!(steps.len(), abort + 1);
    assert_eq!(steps[abort].action.action_type(), ActionType::Wait);
    assert!(!steps[abort].result.success);
    let reads = steps
        .iter()
        .filter(|r| r.action.action_type() == ActionType::GetData)
        .count();
    assert_eq!(reads, 1);
}

#[tokio::test(start_paused = true)]
async fn test_json_lines_recorder_writes_each_step() {
    let plan = compile(&line_scan()).unwrap();
    let registry = registry(MockStage::new(), MockScope::new(4)).await;
    let mut recorder = JsonLinesRecorder::new(Vec::new());
    ExecutionLoop::default()
        .run(&plan, &registry, &mut recorder)
        .await
        .unwrap();

    let output = String::from_utf8(recorder.into_inner()).unwrap();
    let records: Vec<StepRecord> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), plan.len());
    assert_eq!(records.last().unwrap().action, *plan.actions().last().unwrap());
}
