//! Scan-plan compiler.
//!
//! Turns a [`ScanConfig`] into a flat [`CompiledPlan`]. The read sequence runs at every
//! grid point; each axis wraps the sequence of the axis nested inside it, so the first
//! listed axis ends up outermost and varies slowest.
//!
//! For one axis with inner actions `I` and `n` steps the expansion is
//!
//! ```text
//! MoveStage(start)
//! n × [ I, MoveStage(start + k·step), Wait(settle) ]    k = 1..=n
//! I
//! ```
//!
//! All coordinate arithmetic happens on integers scaled by `resolution`, so emitted
//! positions are exact multiples of `1/resolution` however many steps the sweep has.

use crate::action::Action;
use crate::error::{ScanError, ScanResult};

use super::config::{Axis, ScanConfig};
use super::plan::CompiledPlan;

/// Upper bound on the number of actions in one compiled plan.
///
/// Validation rejects any sweep whose plan would be longer, before anything is allocated.
pub const MAX_PLAN_LEN: usize = 10_000_000;

/// Integer-scaled sweep parameters of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSweep {
    /// Swept axis.
    pub axis: Axis,
    /// Start coordinate × resolution.
    pub start: i64,
    /// Step size × resolution.
    pub step: i64,
    /// Number of steps after the start position.
    pub steps: u64,
    /// Scale factor.
    pub resolution: i64,
}

impl AxisSweep {
    /// Scale the sweep parameters of `axis` in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Configuration`] if the axis has no coordinate index or a zero
    /// scaled step.
    pub fn for_axis(config: &ScanConfig, axis: Axis) -> ScanResult<Self> {
        let index = axis.index().ok_or_else(|| {
            ScanError::Configuration(format!("Axis {axis} has no coordinate index"))
        })?;
        let resolution = i64::from(config.resolution);
        let start = scale(config.start_coords[index], resolution);
        let stop = scale(config.stop_coords[index], resolution);
        let step = scale(config.step_size[index], resolution);
        if step == 0 {
            return Err(ScanError::Configuration(format!(
                "Axis {axis}: step size {} is below the resolution 1/{}",
                config.step_size[index], resolution
            )));
        }
        // Truncating division never steps past `stop`; a sign mismatch yields zero steps.
        let steps = u64::try_from((stop - start) / step).unwrap_or(0);
        Ok(Self {
            axis,
            start,
            step,
            steps,
            resolution,
        })
    }

    /// Number of grid positions along this axis.
    pub fn points(&self) -> u64 {
        self.steps + 1
    }

    /// Coordinate of grid index `k`.
    pub fn position(&self, k: u64) -> f64 {
        let scaled = self.start + self.step * k as i64;
        scaled as f64 / self.resolution as f64
    }
}

fn scale(value: f64, resolution: i64) -> i64 {
    (value * resolution as f64).round() as i64
}

/// Acquisition sequence executed at every grid point.
///
/// Stop the acquisition, let the reader settle, fetch the configured channel and resume.
pub fn read_sequence(config: &ScanConfig) -> Vec<Action> {
    let reader = config.reader_instrument.as_str();
    vec![
        Action::set_acq_state(reader, "STOP"),
        Action::wait(config.acquisition_settle),
        Action::get_data(reader, config.reader_channel),
        Action::set_acq_state(reader, "RUN"),
    ]
}

/// Wrap `inner` in a sweep of one axis.
pub fn expand_axis(config: &ScanConfig, sweep: &AxisSweep, inner: &[Action]) -> Vec<Action> {
    let stage = config.stage_instrument.as_str();
    let sub_stage = sweep.axis.stage_name();

    let capacity = block_len(sweep.steps, inner.len()).map_or(0, |len| len.min(MAX_PLAN_LEN));
    let mut actions = Vec::with_capacity(capacity);
    actions.push(Action::move_stage(stage, &sub_stage, sweep.position(0)));
    for k in 1..=sweep.steps {
        actions.extend_from_slice(inner);
        actions.push(Action::move_stage(stage, &sub_stage, sweep.position(k)));
        actions.push(Action::wait(config.settle_time));
    }
    actions.extend_from_slice(inner);
    actions
}

/// Actions emitted by a sweep of `steps` steps around `inner` actions, `None` on overflow.
fn block_len(steps: u64, inner: usize) -> Option<usize> {
    let steps = usize::try_from(steps).ok()?;
    steps
        .checked_add(1)?
        .checked_mul(inner)?
        .checked_add(steps.checked_mul(2)?)?
        .checked_add(1)
}

/// Plan length of a structurally valid `config`, bounded by [`MAX_PLAN_LEN`].
pub(crate) fn checked_plan_len(config: &ScanConfig) -> ScanResult<usize> {
    let mut len = read_sequence(config).len();
    for axis in config.axes.iter().rev() {
        let sweep = AxisSweep::for_axis(config, *axis)?;
        len = block_len(sweep.steps, len)
            .filter(|len| *len <= MAX_PLAN_LEN)
            .ok_or_else(|| {
                ScanError::Configuration(format!(
                    "Sweep exceeds {MAX_PLAN_LEN} actions (axis {axis} has {} steps)",
                    sweep.steps
                ))
            })?;
    }
    Ok(len)
}

/// Compile a sweep into its flat action sequence.
///
/// Axes are expanded innermost first: the last listed axis wraps the read sequence, and
/// every earlier axis wraps the expansion of the one after it. The function is pure; the
/// same config always yields an identical plan.
///
/// # Errors
///
/// Returns [`ScanError::Configuration`] if `config` fails validation, including a plan
/// longer than [`MAX_PLAN_LEN`].
pub fn compile(config: &ScanConfig) -> ScanResult<CompiledPlan> {
    config.validate()?;

    let mut actions = read_sequence(config);
    for axis in config.axes.iter().rev() {
        let sweep = AxisSweep::for_axis(config, *axis)?;
        actions = expand_axis(config, &sweep, &actions);
    }
    Ok(CompiledPlan::new(actions))
}

/// Grid points in visiting order, one coordinate per listed axis.
///
/// # Errors
///
/// Returns [`ScanError::Configuration`] if `config` fails validation.
pub fn grid_points(config: &ScanConfig) -> ScanResult<Vec<Vec<f64>>> {
    config.validate()?;

    let mut points: Vec<Vec<f64>> = vec![Vec::new()];
    for axis in &config.axes {
        let sweep = AxisSweep::for_axis(config, *axis)?;
        points = points
            .into_iter()
            .flat_map(|prefix| {
                (0..sweep.points()).map(move |k| {
                    let mut point = prefix.clone();
                    point.push(sweep.position(k));
                    point
                })
            })
            .collect();
    }
    Ok(points)
}

/// Number of actions [`compile`] emits for `config`.
///
/// # Errors
///
/// Returns [`ScanError::Configuration`] if `config` fails validation.
pub fn expected_len(config: &ScanConfig) -> ScanResult<usize> {
    config.validate()?;
    checked_plan_len(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionType, SYSTEM_INSTRUMENT};

    fn config(axes: Vec<Axis>, stop: [f64; 3], step: [f64; 3]) -> ScanConfig {
        ScanConfig::new(
            axes,
            [0.0, 0.0, 0.0],
            stop,
            step,
            "ScanStage",
            "ScanOsc",
            0.5,
            100,
        )
    }

    #[test]
    fn test_read_sequence_order() {
        let cfg = config(vec![Axis::X], [2.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let read = read_sequence(&cfg);
        let types: Vec<_> = read.iter().map(Action::action_type).collect();
        assert_eq!(
            types,
            vec![
                ActionType::SetAcqState,
                ActionType::Wait,
                ActionType::GetData,
                ActionType::SetAcqState,
            ]
        );
        assert_eq!(read[1].instrument(), SYSTEM_INSTRUMENT);
        assert_eq!(read[2].int_param(0).ok(), Some(2));
    }

    #[test]
    fn test_single_axis_expansion_shape() {
        let cfg = config(vec![Axis::X], [2.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let sweep = AxisSweep::for_axis(&cfg, Axis::X).unwrap();
        assert_eq!(sweep.steps, 2);

        let inner = vec![Action::get_data("ScanOsc", 1)];
        let actions = expand_axis(&cfg, &sweep, &inner);
        let expected = vec![
            Action::move_stage("ScanStage", "X-Stage", 0.0),
            Action::get_data("ScanOsc", 1),
            Action::move_stage("ScanStage", "X-Stage", 1.0),
            Action::wait(0.5),
            Action::get_data("ScanOsc", 1),
            Action::move_stage("ScanStage", "X-Stage", 2.0),
            Action::wait(0.5),
            Action::get_data("ScanOsc", 1),
        ];
        assert_eq!(actions, expected);
    }

    #[test]
    fn test_zero_span_axis_reads_once() {
        let cfg = config(vec![Axis::Y], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        let plan = compile(&cfg).unwrap();
        assert_eq!(plan.len(), 1 + read_sequence(&cfg).len());
        assert_eq!(plan.read_block_count(), 1);
    }

    #[test]
    fn test_uneven_span_does_not_overshoot_stop() {
        let cfg = config(vec![Axis::X], [2.5, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let plan = compile(&cfg).unwrap();
        let positions = plan.positions("X-Stage");
        assert_eq!(positions, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sign_mismatch_yields_zero_steps_in_expansion() {
        let mut cfg = config(vec![Axis::X], [2.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        cfg.step_size = [-1.0, 0.0, 0.0];
        let sweep = AxisSweep::for_axis(&cfg, Axis::X).unwrap();
        assert_eq!(sweep.steps, 0);
        assert_eq!(expand_axis(&cfg, &sweep, &read_sequence(&cfg)).len(), 5);
        assert!(compile(&cfg).is_err());
    }

    #[test]
    fn test_expected_len_matches_compile() {
        let cfg = config(
            vec![Axis::Z, Axis::X, Axis::Y],
            [2.0, 3.0, 1.0],
            [1.0, 1.5, 0.5],
        );
        let plan = compile(&cfg).unwrap();
        assert_eq!(plan.len(), expected_len(&cfg).unwrap());
        assert_eq!(plan.read_block_count(), 3 * 3 * 3);
    }

    #[test]
    fn test_block_len_overflow() {
        assert_eq!(block_len(2, 4), Some(15));
        assert_eq!(block_len(0, 4), Some(5));
        assert_eq!(block_len(u64::MAX, 4), None);
        assert_eq!(block_len(10_000_000, usize::MAX / 2), None);
    }

    #[test]
    fn test_oversized_sweep_is_rejected_not_allocated() {
        let mut cfg = config(
            vec![Axis::X, Axis::Y, Axis::Z],
            [1.0e7, 1.0e7, 1.0e7],
            [1.0, 1.0, 1.0],
        );
        cfg.resolution = 10;
        let err = expected_len(&cfg).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("exceeds"));
        assert!(compile(&cfg).unwrap_err().is_configuration());
        assert!(grid_points(&cfg).is_err());
    }

    #[test]
    fn test_plan_len_cap_boundary() {
        // 1 + 4 * (n + 1) + 2n actions for a single axis
        let mut cfg = config(vec![Axis::X], [0.0; 3], [1.0, 0.0, 0.0]);
        cfg.resolution = 10;
        cfg.stop_coords[0] = 1_000_000.0;
        assert_eq!(checked_plan_len(&cfg).unwrap(), 6_000_005);
        cfg.stop_coords[0] = 2_000_000.0;
        assert!(checked_plan_len(&cfg).is_err());
    }

    #[test]
    fn test_grid_points_outer_axis_slowest() {
        let cfg = config(vec![Axis::X, Axis::Y], [1.0, 1.0, 0.0], [1.0, 1.0, 0.0]);
        let points = grid_points(&cfg).unwrap();
        assert_eq!(
            points,
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
            ]
        );
    }
}
